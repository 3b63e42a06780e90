//! Shared utilities for the Obol service-node subsystem.

pub mod logging;
pub mod time;

pub use logging::init_tracing;
pub use time::{Clock, ManualClock, SystemClock};
