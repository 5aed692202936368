//! Async ADC sharing
//!
//! The direction sampler (sampling task) and the health report (publish
//! worker) both read the same ADC peripheral. Each gets its own
//! [`SharedAdc`] handle onto one mutex-protected ADC, so a conversion started
//! by one task is never interleaved with the other's.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::Mutex;

use super::{Adc, AdcChannel, SensorError};

/// ADC handle backed by Embassy's async `Mutex`.
///
/// The lock is held across the conversion's await point and yields to the
/// executor while another task owns the ADC.
///
/// # Example
///
/// ```ignore
/// use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
/// use embassy_sync::mutex::Mutex;
/// use static_cell::StaticCell;
///
/// static ADC_BUS: StaticCell<Mutex<CriticalSectionRawMutex, BoardAdc>> = StaticCell::new();
///
/// let adc = ADC_BUS.init(Mutex::new(BoardAdc::new()));
///
/// let for_vane = SharedAdc::new(adc);
/// let for_health = SharedAdc::new(adc);
/// ```
pub struct SharedAdc<'a, T> {
    adc: &'a Mutex<CriticalSectionRawMutex, T>,
}

impl<'a, T> SharedAdc<'a, T> {
    #[inline]
    pub const fn new(adc: &'a Mutex<CriticalSectionRawMutex, T>) -> Self {
        Self { adc }
    }
}

impl<T> Clone for SharedAdc<'_, T> {
    fn clone(&self) -> Self {
        Self { adc: self.adc }
    }
}

impl<T> Adc for SharedAdc<'_, T>
where
    T: Adc,
{
    #[inline]
    async fn init(&mut self) -> Result<(), SensorError> {
        let mut adc = self.adc.lock().await;
        adc.init().await
    }

    #[inline]
    async fn read_millivolts(&mut self, channel: AdcChannel) -> Result<u16, SensorError> {
        let mut adc = self.adc.lock().await;
        adc.read_millivolts(channel).await
    }
}
