//! The optimizing-job controller (C8).

pub mod algorithm;
pub mod controller;

pub use controller::{OptimizingController, OptimizingStatus};
