pub mod client;
pub mod config;
pub mod container;
pub mod domain;
pub mod error;
pub mod group;
pub mod id;
pub mod logging;
pub mod optimizing;
pub mod repository;
pub mod scheduler;
pub mod wire;

pub use error::{Error, Result};
