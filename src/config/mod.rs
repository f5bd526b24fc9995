//! Configuration module for the periscope binary.
//!
//! Provides YAML-based configuration loading and validation for:
//! - Application settings (interval, command timeout, retry policy, output)
//! - The ordered collector list

mod app;
mod collector;
mod validation;

pub use app::{AppConfig, MIN_INTERVAL};
pub use collector::CollectorsConfig;
pub use validation::{parse_duration, ConfigError};
