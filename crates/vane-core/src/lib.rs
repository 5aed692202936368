//! Hardware-independent core library for the vane weather-station node
//!
//! This crate contains the wind telemetry acquisition and reporting engine:
//! the debounced pulse counter, the direction sampler with its circular-mean
//! filter, the sampling cycle state machine, the hourly report aggregator and
//! the publish policy that shares the transport with the image subsystem.
//!
//! Everything that touches real hardware (ADC, GPIO, modem, camera) sits
//! behind the traits in [`sensors`], [`transport`], [`clock`] and
//! [`indicator`], so the crate compiles on both the embedded target and a
//! desktop host (for the simulator and tests).

#![no_std]

pub mod clock;
pub mod config;
pub mod engine;
pub mod indicator;
pub mod report;
pub mod sensors;
pub mod transport;
pub mod wind;
