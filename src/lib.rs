//! # parking_sensor
//!
//! A no-std distance sensor core for HC-SR04 style ultrasonic sensors whose
//! echo line is wired to a timer input-capture channel.
//!
//! The [`capture::CaptureUnit`] wraps the timer: it latches the free-running
//! counter on the selected edge and notifies an [`capture::EdgeObserver`] from
//! the capture interrupt. The [`echo::EchoTimer`] sends the trigger pulse,
//! lets its [`echo::EchoState`] time the echo pulse from two captures and
//! converts the pulse width to centimeters. [`alert`] maps a distance to the
//! indicator pattern of a parking aid.
//!
//! ## Features
//!
//! - `blocking_trigger`: (Default) The async `measure` busy-waits the 10us
//!   trigger pulse instead of awaiting it. The async delay adds a few
//!   microseconds of management which makes the pulse less accurate.
//! - `defmt`: Log through `defmt` and derive `defmt::Format` for public types.
//!
//! # Example
//!
//! ```rust, ignore
//! use parking_sensor::{CaptureUnit, Config, EchoState, EchoTimer, Now};
//!
//! static ECHO: EchoState = EchoState::new();
//!
//! let mut capture = CaptureUnit::new(timer);
//! let mut sensor = EchoTimer::new(trigger, &ECHO, Config::default(), clock, delay);
//! sensor.init(&mut capture)?;
//!
//! // the capture interrupt handler calls `capture.on_capture()`
//!
//! loop {
//!     let distance = sensor.read_distance()?;
//! }
//! ```

#![cfg_attr(not(test), no_std)]

// This mod MUST go first, so that the others see its macros.
pub(crate) mod fmt;

pub mod alert;
pub mod capture;
pub mod echo;
pub mod error;

#[cfg(test)]
mod sim;

pub use alert::{format_reading, AlertPanel, AlertTier, Indicators};
pub use capture::{
    CaptureConfig, CaptureControl, CaptureTimer, CaptureUnit, Edge, EdgeObserver, TimeBase,
};
pub use echo::{distance_cm, distance_cm_at, Config, CycleState, EchoState, EchoTimer, Now};
pub use error::Error;
