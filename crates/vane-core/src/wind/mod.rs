//! Wind acquisition: pulse counting, direction sampling and the cycle state machine

pub mod controller;
pub mod direction;
pub mod pulse;

pub use controller::{AggregationJob, CycleAccumulator, CycleState, SamplingController};
pub use direction::{DirectionSampler, circ_avg};
pub use pulse::PulseCounter;
