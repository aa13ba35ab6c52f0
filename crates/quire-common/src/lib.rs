//! Shared plumbing for the quire crates: errors, configuration, telemetry and
//! timing helpers.

pub mod config;
pub mod error;
pub mod perf;
#[cfg(feature = "telemetry")]
pub mod telemetry;

pub use crate::config::{Config, FileStore, Loader, Saver};
pub use crate::error::{ParseError, QuireError, SerDeError};
