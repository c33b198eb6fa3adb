//! Echo timing state machine.
//!
//! One measurement cycle is a 10us trigger pulse followed by two captures on
//! the echo line: the rising edge restarts the capture counter, the falling
//! edge latches the pulse width in ticks. [`EchoState`] is the half that
//! runs in interrupt context; [`EchoTimer`] is the half the application
//! calls.

use core::sync::atomic::{AtomicU16, AtomicU8, Ordering};

use embassy_sync::{blocking_mutex::raw::CriticalSectionRawMutex, signal::Signal};
use embedded_hal::{delay::DelayNs, digital::OutputPin};
use embedded_hal_async::delay::DelayNs as DelayNsAsync;
use futures::{select_biased, FutureExt};
use libm::{round, sqrt};

use crate::capture::{
    CaptureConfig, CaptureControl, CaptureTimer, CaptureUnit, Edge, EdgeObserver, TimeBase,
};
use crate::error::Error;

/// Capture setup for the echo line: 0.5us ticks, first edge rising.
pub const ECHO_CAPTURE: CaptureConfig = CaptureConfig {
    time_base: TimeBase::Div8,
    initial_edge: Edge::Rising,
};

/// Length of the trigger pulse in microseconds.
pub const TRIGGER_PULSE_US: u32 = 10;

pub trait Now {
    // The time elapsed since startup in microseconds
    fn now_micros(&self) -> u64;
}

/// The configuration for the sensor.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Config {
    /// Give up on a cycle after this many microseconds. `None` waits forever.
    pub echo_timeout_us: Option<u32>,
    /// Ambient temperature for speed of sound compensation. `None` uses the
    /// fixed 340 m/s conversion.
    pub temperature_celsius: Option<f64>,
}

/// Convert an echo pulse width in 0.5us ticks to centimeters at 340 m/s,
/// rounded to the nearest centimeter.
///
/// `ticks * 0.5us * 34000 cm/s / 2` is `ticks * 0.0085`; the `+ 5000` adds
/// the half centimeter before truncating.
pub const fn distance_cm(ticks: u16) -> u16 {
    ((ticks as u32 * 85 + 5000) / 10000) as u16
}

/// Speed of sound in meters per second, adjusted for temperature.
pub fn speed_of_sound(temperature_celsius: f64) -> f64 {
    331.5 * sqrt(1.0 + (temperature_celsius / 273.15))
}

/// Like [`distance_cm`], with the speed of sound taken at `temperature_celsius`.
pub fn distance_cm_at(ticks: u16, temperature_celsius: f64) -> u16 {
    let seconds = f64::from(ticks) / f64::from(ECHO_CAPTURE.time_base.ticks_per_second());
    round(speed_of_sound(temperature_celsius) * 100.0 * seconds / 2.0) as u16
}

/// Progress of the current measurement cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CycleState {
    AwaitingTrigger,
    EchoStarted,
    EchoComplete,
}

impl CycleState {
    const fn from_edge_count(count: u8) -> Self {
        match count {
            0 => CycleState::AwaitingTrigger,
            1 => CycleState::EchoStarted,
            _ => CycleState::EchoComplete,
        }
    }
}

/// Measurement cycle state shared between the capture interrupt and the
/// caller of [`EchoTimer`].
///
/// Only the capture interrupt advances the edge count. The caller resets it
/// once it has observed a complete cycle, or when it gives up on one.
pub struct EchoState {
    edge_count: AtomicU8,
    high_time: AtomicU16,
    complete: Signal<CriticalSectionRawMutex, u16>,
}

impl EchoState {
    pub const fn new() -> Self {
        Self {
            edge_count: AtomicU8::new(0),
            high_time: AtomicU16::new(0),
            complete: Signal::new(),
        }
    }

    pub fn cycle(&self) -> CycleState {
        CycleState::from_edge_count(self.edge_count())
    }

    pub fn edge_count(&self) -> u8 {
        self.edge_count.load(Ordering::Acquire)
    }

    /// Width of the last echo pulse. Only meaningful once the cycle is complete.
    pub fn high_time_ticks(&self) -> u16 {
        self.high_time.load(Ordering::Acquire)
    }

    /// Consume a complete cycle, returning its pulse width.
    fn take(&self) -> Option<u16> {
        if self.edge_count() != 2 {
            return None;
        }
        critical_section::with(|_| {
            if self.edge_count.load(Ordering::Acquire) != 2 {
                return None;
            }
            let ticks = self.high_time.load(Ordering::Relaxed);
            self.edge_count.store(0, Ordering::Release);
            self.complete.reset();
            Some(ticks)
        })
    }

    /// Drop whatever the current cycle has seen so far.
    fn abandon(&self) {
        critical_section::with(|_| {
            self.edge_count.store(0, Ordering::Release);
            self.complete.reset();
        });
    }

    /// Abandon the cycle because its echo never completed.
    fn time_out(&self) -> Error {
        warn!("no echo, abandoning cycle in state {:?}", self.cycle());
        self.abandon();
        Error::Timeout
    }

    async fn next_result(&self) -> u16 {
        loop {
            self.complete.wait().await;
            if let Some(ticks) = self.take() {
                return ticks;
            }
            trace!("stale completion dropped");
        }
    }
}

impl Default for EchoState {
    fn default() -> Self {
        Self::new()
    }
}

impl EdgeObserver for EchoState {
    fn on_edge_captured(&self, capture: &mut dyn CaptureControl) {
        critical_section::with(|_| match self.edge_count.load(Ordering::Relaxed) {
            0 => {
                if capture.edge_polarity() == Edge::Falling {
                    // tail of an abandoned cycle, wait for the next echo start
                    capture.set_edge_polarity(Edge::Rising);
                    trace!("stray falling edge dropped");
                    return;
                }
                capture.reset_counter();
                capture.set_edge_polarity(Edge::Falling);
                self.edge_count.store(1, Ordering::Release);
            }
            1 => {
                let ticks = capture.read_captured_value();
                self.high_time.store(ticks, Ordering::Relaxed);
                capture.reset_counter();
                capture.set_edge_polarity(Edge::Rising);
                self.edge_count.store(2, Ordering::Release);
                self.complete.signal(ticks);
            }
            _ => warn!("edge ignored, cycle already complete"),
        });
    }
}

/// The ultrasonic sensor driver, measuring through a [`CaptureUnit`].
///
/// # Note
///
/// With the default [`Config`] a missing echo blocks `read_distance` and
/// `measure` forever. Set `echo_timeout_us` to get [`Error::Timeout`] instead.
pub struct EchoTimer<'a, TRIGPIN, CLOCK, DELAY> {
    trigger: TRIGPIN,
    state: &'a EchoState,
    config: Config,
    clock: CLOCK,
    delay: DELAY,
}

impl<'a, TRIGPIN, CLOCK, DELAY> EchoTimer<'a, TRIGPIN, CLOCK, DELAY>
where
    TRIGPIN: OutputPin,
    CLOCK: Now,
    DELAY: DelayNs,
{
    /// Requires the trigger pin and the cycle state the capture unit will
    /// report into.
    /// Requires a clock that will provide the time in microseconds via the `Now` trait,
    /// only consulted when a timeout is configured.
    pub fn new(
        trigger: TRIGPIN,
        state: &'a EchoState,
        config: Config,
        clock: CLOCK,
        delay: DELAY,
    ) -> Self {
        Self {
            trigger,
            state,
            config,
            clock,
            delay,
        }
    }

    /// Register with the capture unit, arm it for the echo line and park the
    /// trigger line low.
    pub fn init<T: CaptureTimer>(&mut self, capture: &mut CaptureUnit<'a, T>) -> Result<(), Error> {
        capture.set_callback(Some(self.state));
        capture.init(ECHO_CAPTURE);
        self.state.abandon();
        self.trigger.set_low().map_err(|_| Error::Trigger)?;
        debug!("echo timer ready, timeout {:?} us", self.config.echo_timeout_us);
        Ok(())
    }

    /// Send the 10us pulse that starts a sensor burst.
    pub fn trigger_pulse(&mut self) -> Result<(), Error> {
        self.trigger.set_high().map_err(|_| Error::Trigger)?;
        DelayNs::delay_us(&mut self.delay, TRIGGER_PULSE_US);
        self.trigger.set_low().map_err(|_| Error::Trigger)
    }

    /// Trigger a measurement and spin until the echo has been timed.
    /// Returns the distance in centimeters.
    pub fn read_distance(&mut self) -> Result<u16, Error> {
        // a late echo of a timed out cycle must not answer this trigger
        self.state.abandon();
        self.trigger_pulse()?;
        let deadline = self
            .config
            .echo_timeout_us
            .map(|timeout| self.clock.now_micros() + u64::from(timeout));

        let ticks = loop {
            if let Some(ticks) = self.state.take() {
                break ticks;
            }
            if let Some(deadline) = deadline {
                if self.clock.now_micros() >= deadline {
                    return Err(self.state.time_out());
                }
            }
            core::hint::spin_loop();
        };
        Ok(self.distance(ticks))
    }

    /// Convert a pulse width according to the configured conversion.
    pub fn distance(&self, ticks: u16) -> u16 {
        match self.config.temperature_celsius {
            None => distance_cm(ticks),
            Some(temperature) => distance_cm_at(ticks, temperature),
        }
    }

    /// The configuration measurements currently run with.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Replace the configuration. Takes effect from the next measurement.
    pub fn set_config(&mut self, config: Config) {
        self.config = config;
    }
}

impl<'a, TRIGPIN, CLOCK, DELAY> EchoTimer<'a, TRIGPIN, CLOCK, DELAY>
where
    TRIGPIN: OutputPin,
    CLOCK: Now,
    DELAY: DelayNs + DelayNsAsync,
{
    /// Trigger a measurement and wait for the capture unit to report the
    /// echo. Returns the distance in centimeters.
    pub async fn measure(&mut self) -> Result<u16, Error> {
        self.state.abandon();

        // Either block for or wait for 10us, depending on active feature flag
        #[cfg(feature = "blocking_trigger")]
        self.trigger_pulse()?;
        #[cfg(not(feature = "blocking_trigger"))]
        {
            self.trigger.set_high().map_err(|_| Error::Trigger)?;
            DelayNsAsync::delay_us(&mut self.delay, TRIGGER_PULSE_US).await;
            self.trigger.set_low().map_err(|_| Error::Trigger)?;
        }

        let state = self.state;
        let ticks = match self.config.echo_timeout_us {
            None => state.next_result().await,
            Some(timeout) => select_biased! {
                ticks = state.next_result().fuse() => ticks,
                _ = DelayNsAsync::delay_us(&mut self.delay, timeout).fuse() => {
                    return Err(state.time_out());
                }
            },
        };
        Ok(self.distance(ticks))
    }
}
