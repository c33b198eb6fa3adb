//! Alert policy: how close is too close, and what the driver sees.

use core::fmt::Write;

use embedded_hal::{delay::DelayNs, digital::OutputPin};
use embedded_hal_async::delay::DelayNs as DelayNsAsync;

use crate::error::Error;

/// Length of each on and off phase while flashing.
pub const FLASH_PHASE_MS: u32 = 250;

/// Width of a rendered [`format_reading`] line.
pub const READING_LEN: usize = 16;

/// Distance band the last reading fell into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AlertTier {
    /// 5 cm or less: everything flashes and the buzzer sounds.
    Stop,
    /// 6 to 10 cm.
    Near,
    /// 11 to 15 cm.
    Close,
    /// 16 to 20 cm.
    Far,
    /// More than 20 cm.
    Clear,
}

impl AlertTier {
    pub const fn from_distance(cm: u16) -> Self {
        match cm {
            0..=5 => AlertTier::Stop,
            6..=10 => AlertTier::Near,
            11..=15 => AlertTier::Close,
            16..=20 => AlertTier::Far,
            _ => AlertTier::Clear,
        }
    }

    /// Pin pattern while the tier is shown. For [`AlertTier::Stop`] this is
    /// the "on" phase of the flash.
    pub const fn indicators(self) -> Indicators {
        match self {
            AlertTier::Stop => Indicators {
                red: true,
                green: true,
                blue: true,
                buzzer: true,
            },
            AlertTier::Near => Indicators::leds(true, true, true),
            AlertTier::Close => Indicators::leds(true, true, false),
            AlertTier::Far => Indicators::leds(true, false, false),
            AlertTier::Clear => Indicators::OFF,
        }
    }

    pub const fn flashes(self) -> bool {
        matches!(self, AlertTier::Stop)
    }

    /// Text for the second display row.
    pub const fn banner(self) -> &'static str {
        match self {
            AlertTier::Stop => "STOP",
            _ => "    ",
        }
    }
}

/// Levels of the three indicator LEDs and the buzzer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Indicators {
    pub red: bool,
    pub green: bool,
    pub blue: bool,
    pub buzzer: bool,
}

impl Indicators {
    pub const OFF: Self = Self::leds(false, false, false);

    const fn leds(red: bool, green: bool, blue: bool) -> Self {
        Self {
            red,
            green,
            blue,
            buzzer: false,
        }
    }
}

/// Render the first display row, e.g. `Distance=25 cm`.
pub fn format_reading(cm: u16) -> heapless::String<READING_LEN> {
    let mut line = heapless::String::new();
    // 9 + at most 5 digits + 2 always fits
    let _ = write!(line, "Distance={:<3}cm", cm);
    line
}

/// Three indicator LEDs and a buzzer on plain output pins.
pub struct AlertPanel<RED, GREEN, BLUE, BUZZER> {
    red: RED,
    green: GREEN,
    blue: BLUE,
    buzzer: BUZZER,
}

impl<RED, GREEN, BLUE, BUZZER> AlertPanel<RED, GREEN, BLUE, BUZZER>
where
    RED: OutputPin,
    GREEN: OutputPin,
    BLUE: OutputPin,
    BUZZER: OutputPin,
{
    pub fn new(red: RED, green: GREEN, blue: BLUE, buzzer: BUZZER) -> Self {
        Self {
            red,
            green,
            blue,
            buzzer,
        }
    }

    pub fn apply(&mut self, indicators: Indicators) -> Result<(), Error> {
        set(&mut self.red, indicators.red)?;
        set(&mut self.green, indicators.green)?;
        set(&mut self.blue, indicators.blue)?;
        set(&mut self.buzzer, indicators.buzzer)
    }

    /// Show one tier. A flashing tier runs one full on/off period before
    /// returning, the others just set the pins.
    pub fn present<D: DelayNs>(&mut self, tier: AlertTier, delay: &mut D) -> Result<(), Error> {
        self.apply(tier.indicators())?;
        if tier.flashes() {
            delay.delay_ms(FLASH_PHASE_MS);
            self.apply(Indicators::OFF)?;
            delay.delay_ms(FLASH_PHASE_MS);
        }
        Ok(())
    }

    /// Same as [`present`](Self::present), awaiting the flash phases.
    pub async fn present_async<D: DelayNsAsync>(
        &mut self,
        tier: AlertTier,
        delay: &mut D,
    ) -> Result<(), Error> {
        self.apply(tier.indicators())?;
        if tier.flashes() {
            delay.delay_ms(FLASH_PHASE_MS).await;
            self.apply(Indicators::OFF)?;
            delay.delay_ms(FLASH_PHASE_MS).await;
        }
        Ok(())
    }
}

fn set<P: OutputPin>(pin: &mut P, on: bool) -> Result<(), Error> {
    let result = if on { pin.set_high() } else { pin.set_low() };
    result.map_err(|_| Error::Indicator)
}
