//! Input-capture unit.
//!
//! A free-running counter that latches its value into a capture register when
//! the selected edge shows up on the capture input, then notifies the
//! registered [`EdgeObserver`]. The register-level work is delegated to a
//! [`CaptureTimer`] supplied by the HAL.

/// Frequency of the clock feeding the capture timer prescaler.
pub const REFERENCE_CLOCK_HZ: u32 = 16_000_000;

/// Prescaler applied to [`REFERENCE_CLOCK_HZ`] to obtain the tick rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TimeBase {
    Div1,
    Div8,
    Div64,
    Div256,
    Div1024,
}

impl TimeBase {
    pub const fn prescaler(self) -> u32 {
        match self {
            TimeBase::Div1 => 1,
            TimeBase::Div8 => 8,
            TimeBase::Div64 => 64,
            TimeBase::Div256 => 256,
            TimeBase::Div1024 => 1024,
        }
    }

    /// Counter increments per second.
    pub const fn ticks_per_second(self) -> u32 {
        REFERENCE_CLOCK_HZ / self.prescaler()
    }
}

/// Signal transition that latches the counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Edge {
    Falling,
    Rising,
}

impl Edge {
    pub const fn opposite(self) -> Self {
        match self {
            Edge::Falling => Edge::Rising,
            Edge::Rising => Edge::Falling,
        }
    }
}

/// The configuration for the capture unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CaptureConfig {
    pub time_base: TimeBase,
    pub initial_edge: Edge,
}

/// Register-level access to a capture-capable timer peripheral.
pub trait CaptureTimer {
    /// Put the capture pin in input mode, run the counter in normal
    /// (free-running) mode at `time_base`, latch on `edge`, zero the counter
    /// and the capture register and enable the capture interrupt.
    fn start(&mut self, time_base: TimeBase, edge: Edge);

    /// Select the edge that latches the next capture.
    fn select_edge(&mut self, edge: Edge);

    /// Value of the capture register.
    fn captured(&self) -> u16;

    /// Current value of the free-running counter.
    fn counter(&self) -> u16;

    fn clear_counter(&mut self);

    /// Disable the capture interrupt, stop the clock and zero all registers.
    fn stop(&mut self);
}

/// What an [`EdgeObserver`] may do to the capture unit from interrupt context.
pub trait CaptureControl {
    fn set_edge_polarity(&mut self, edge: Edge);
    fn edge_polarity(&self) -> Edge;
    fn read_captured_value(&self) -> u16;
    fn reset_counter(&mut self);
}

/// Receiver of capture notifications.
///
/// Called synchronously from the capture interrupt, so implementations must
/// do O(1) work and be shareable with the thread that registered them.
pub trait EdgeObserver: Sync {
    fn on_edge_captured(&self, capture: &mut dyn CaptureControl);
}

/// The capture unit, owning the timer and the observer slot.
pub struct CaptureUnit<'a, T> {
    timer: T,
    observer: Option<&'a dyn EdgeObserver>,
    edge: Edge,
    armed: bool,
}

impl<'a, T> CaptureUnit<'a, T>
where
    T: CaptureTimer,
{
    /// Wrap a timer. Nothing is configured until [`CaptureUnit::init`].
    pub const fn new(timer: T) -> Self {
        Self {
            timer,
            observer: None,
            edge: Edge::Rising,
            armed: false,
        }
    }

    /// Configure the timer and arm the capture interrupt.
    pub fn init(&mut self, config: CaptureConfig) {
        self.edge = config.initial_edge;
        self.timer.start(config.time_base, config.initial_edge);
        self.armed = true;
        debug!(
            "capture armed: {} ticks/s, {:?} edge",
            config.time_base.ticks_per_second(),
            config.initial_edge
        );
    }

    /// Register the notification target, replacing any previous one.
    /// `None` disables notification.
    pub fn set_callback(&mut self, observer: Option<&'a dyn EdgeObserver>) {
        self.observer = observer;
    }

    pub fn has_callback(&self) -> bool {
        self.observer.is_some()
    }

    /// Select the edge for the next capture.
    pub fn set_edge_polarity(&mut self, edge: Edge) {
        self.edge = edge;
        self.timer.select_edge(edge);
    }

    pub fn edge_polarity(&self) -> Edge {
        self.edge
    }

    /// Last latched counter value. Stale until the first capture of a cycle.
    pub fn read_captured_value(&self) -> u16 {
        self.timer.captured()
    }

    pub fn counter(&self) -> u16 {
        self.timer.counter()
    }

    /// Restart the free-running counter from zero.
    pub fn reset_counter(&mut self) {
        self.timer.clear_counter();
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Disarm the interrupt, zero the registers and drop the observer.
    pub fn shutdown(&mut self) {
        self.timer.stop();
        self.armed = false;
        self.observer = None;
        self.edge = Edge::Rising;
        debug!("capture stopped");
    }

    /// Capture interrupt entry point.
    ///
    /// Call from the interrupt handler (or the task standing in for it) after
    /// the timer latched a value.
    pub fn on_capture(&mut self) {
        if !self.armed {
            return;
        }
        let Some(observer) = self.observer else {
            return;
        };
        observer.on_edge_captured(self);
    }

    pub fn timer(&self) -> &T {
        &self.timer
    }

    pub fn timer_mut(&mut self) -> &mut T {
        &mut self.timer
    }
}

impl<T> CaptureControl for CaptureUnit<'_, T>
where
    T: CaptureTimer,
{
    fn set_edge_polarity(&mut self, edge: Edge) {
        CaptureUnit::set_edge_polarity(self, edge);
    }

    fn edge_polarity(&self) -> Edge {
        CaptureUnit::edge_polarity(self)
    }

    fn read_captured_value(&self) -> u16 {
        CaptureUnit::read_captured_value(self)
    }

    fn reset_counter(&mut self) {
        CaptureUnit::reset_counter(self);
    }
}
