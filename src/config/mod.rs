//! Desired-set configuration.
//!
//! Desired sets are YAML files naming a queue, its store options and the
//! jobs that should exist on it.

mod error;
mod yaml;

pub use error::ConfigError;
pub use yaml::{DesiredSet, YamlLoader};
