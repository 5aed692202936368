//! Status LED
//!
//! The node has a three-colour LED. The sampling task lights it green while a
//! window is open and turns it off when the window closes. Indication is
//! fire-and-forget: a failing pin is ignored.

use embedded_hal::digital::OutputPin;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndicatorColor {
    Off,
    Red,
    Green,
    Blue,
    Magenta,
    Cyan,
    Yellow,
}

impl IndicatorColor {
    /// Which of the red, green and blue LEDs are lit for this colour
    pub const fn channels(self) -> (bool, bool, bool) {
        match self {
            Self::Off => (false, false, false),
            Self::Red => (true, false, false),
            Self::Green => (false, true, false),
            Self::Blue => (false, false, true),
            Self::Magenta => (true, false, true),
            Self::Cyan => (false, true, true),
            Self::Yellow => (true, true, false),
        }
    }
}

pub trait StatusIndicator {
    fn set_indicator(&mut self, color: IndicatorColor);
}

/// Indicator driven by three active-high LED pins
pub struct RgbIndicator<R, G, B> {
    red: R,
    green: G,
    blue: B,
}

impl<R, G, B> RgbIndicator<R, G, B>
where
    R: OutputPin,
    G: OutputPin,
    B: OutputPin,
{
    pub fn new(red: R, green: G, blue: B) -> Self {
        let mut indicator = Self { red, green, blue };
        indicator.set_indicator(IndicatorColor::Off);
        indicator
    }

    pub fn release(self) -> (R, G, B) {
        (self.red, self.green, self.blue)
    }
}

fn drive<P: OutputPin>(pin: &mut P, on: bool) {
    let _ = if on { pin.set_high() } else { pin.set_low() };
}

impl<R, G, B> StatusIndicator for RgbIndicator<R, G, B>
where
    R: OutputPin,
    G: OutputPin,
    B: OutputPin,
{
    fn set_indicator(&mut self, color: IndicatorColor) {
        let (red, green, blue) = color.channels();
        drive(&mut self.red, red);
        drive(&mut self.green, green);
        drive(&mut self.blue, blue);
    }
}
