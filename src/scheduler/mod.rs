//! The main coordinator/dispatch loop (C6).

pub mod core;
pub mod recovery;

pub use core::{JobOutcome, ScheduleEvent, SchedulerCore, SchedulerHandle, SchedulerMetrics};
