//! Simulated capture timer and embedded-hal doubles for host tests.

use core::cell::{Cell, RefCell};

use embedded_hal::{
    delay::DelayNs,
    digital::{ErrorKind, ErrorType, OutputPin},
};
use embedded_hal_async::delay::DelayNs as DelayNsAsync;

use crate::capture::{CaptureTimer, CaptureUnit, Edge, TimeBase};
use crate::echo::Now;

/// Register model of a 16-bit input-capture timer.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SimTimer {
    pub input_mode: bool,
    pub interrupt_enabled: bool,
    /// `None` while the clock is stopped.
    pub time_base: Option<TimeBase>,
    pub edge: Option<Edge>,
    pub counter: u16,
    pub captured: u16,
}

impl SimTimer {
    /// Let `ticks` timer ticks elapse.
    pub fn advance(&mut self, ticks: u16) {
        if self.time_base.is_some() {
            self.counter = self.counter.wrapping_add(ticks);
        }
    }

    /// A signal transition on the capture pin. Returns whether it latched.
    pub fn edge_arrives(&mut self, edge: Edge) -> bool {
        if self.interrupt_enabled && self.edge == Some(edge) {
            self.captured = self.counter;
            true
        } else {
            false
        }
    }
}

impl CaptureTimer for SimTimer {
    fn start(&mut self, time_base: TimeBase, edge: Edge) {
        self.input_mode = true;
        self.time_base = Some(time_base);
        self.edge = Some(edge);
        self.counter = 0;
        self.captured = 0;
        self.interrupt_enabled = true;
    }

    fn select_edge(&mut self, edge: Edge) {
        self.edge = Some(edge);
    }

    fn captured(&self) -> u16 {
        self.captured
    }

    fn counter(&self) -> u16 {
        self.counter
    }

    fn clear_counter(&mut self) {
        self.counter = 0;
    }

    fn stop(&mut self) {
        *self = SimTimer {
            input_mode: self.input_mode,
            ..SimTimer::default()
        };
    }
}

/// Deliver an edge to the unit the way the peripheral would: latch, then
/// raise the capture interrupt.
pub fn inject(unit: &mut CaptureUnit<'_, SimTimer>, edge: Edge) -> bool {
    let latched = unit.timer_mut().edge_arrives(edge);
    if latched {
        unit.on_capture();
    }
    latched
}

/// A full echo pulse `high_ticks` long.
pub fn echo(unit: &mut CaptureUnit<'_, SimTimer>, high_ticks: u16) {
    inject(unit, Edge::Rising);
    unit.timer_mut().advance(high_ticks);
    inject(unit, Edge::Falling);
}

/// How the simulated sensor answers a trigger pulse.
#[derive(Debug, Clone, Copy)]
pub enum Response {
    Silent,
    /// Echo rises but never falls.
    Stuck,
    Echo(u16),
}

/// Trigger pin wired to a simulated sensor: the falling edge of the trigger
/// pulse makes the sensor answer on the capture unit.
pub struct SensorPin<'u, 'a> {
    unit: &'u RefCell<CaptureUnit<'a, SimTimer>>,
    responses: &'u [Response],
    fired: Cell<usize>,
    high: bool,
    pub pulses: usize,
}

impl<'u, 'a> SensorPin<'u, 'a> {
    pub fn new(unit: &'u RefCell<CaptureUnit<'a, SimTimer>>, responses: &'u [Response]) -> Self {
        Self {
            unit,
            responses,
            fired: Cell::new(0),
            high: false,
            pulses: 0,
        }
    }

    fn respond(&self) {
        let index = self.fired.get();
        self.fired.set(index + 1);
        let mut unit = self.unit.borrow_mut();
        // sensor burst and flight time before the echo rises
        unit.timer_mut().advance(900);
        match self.responses.get(index).copied().unwrap_or(Response::Silent) {
            Response::Silent => {}
            Response::Stuck => {
                inject(&mut unit, Edge::Rising);
            }
            Response::Echo(ticks) => echo(&mut unit, ticks),
        }
    }
}

impl ErrorType for SensorPin<'_, '_> {
    type Error = ErrorKind;
}

impl OutputPin for SensorPin<'_, '_> {
    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.high = true;
        Ok(())
    }

    fn set_low(&mut self) -> Result<(), Self::Error> {
        if self.high {
            self.pulses += 1;
            self.respond();
        }
        self.high = false;
        Ok(())
    }
}

/// Output pin recording its level.
#[derive(Debug, Default)]
pub struct PinMock {
    pub high: bool,
    pub rises: usize,
}

impl ErrorType for PinMock {
    type Error = ErrorKind;
}

impl OutputPin for PinMock {
    fn set_high(&mut self) -> Result<(), Self::Error> {
        if !self.high {
            self.rises += 1;
        }
        self.high = true;
        Ok(())
    }

    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.high = false;
        Ok(())
    }
}

/// Output pin that always fails.
pub struct BrokenPin;

impl ErrorType for BrokenPin {
    type Error = ErrorKind;
}

impl OutputPin for BrokenPin {
    fn set_high(&mut self) -> Result<(), Self::Error> {
        Err(ErrorKind::Other)
    }

    fn set_low(&mut self) -> Result<(), Self::Error> {
        Err(ErrorKind::Other)
    }
}

/// Delay that returns immediately and remembers what it was asked for.
#[derive(Debug, Default)]
pub struct DelayMock {
    pub total_ns: u64,
}

impl DelayNs for DelayMock {
    fn delay_ns(&mut self, ns: u32) {
        self.total_ns += u64::from(ns);
    }
}

impl DelayNsAsync for DelayMock {
    async fn delay_ns(&mut self, ns: u32) {
        self.total_ns += u64::from(ns);
    }
}

/// Clock that moves forward one microsecond every time it is read.
#[derive(Debug, Default)]
pub struct ClockMock {
    now: Cell<u64>,
}

impl Now for ClockMock {
    fn now_micros(&self) -> u64 {
        let now = self.now.get();
        self.now.set(now + 1);
        now
    }
}
