//! Shared utilities: errors, logging, metrics

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::{HistoCrcError, Result};
pub use logging::{init_logging, LogConfig, LogLevel};
pub use metrics::{ConfusionMatrix, Metrics};
