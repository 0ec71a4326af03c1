//! Errors raised while loading desired-set files.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur when loading desired sets.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A desired-set file could not be read.
    #[error("failed to read file '{path}': {source}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A desired-set directory could not be listed.
    #[error("failed to read directory '{path}': {source}")]
    DirReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A directory load was pointed at something else.
    #[error("'{0}' is not a directory")]
    NotADirectory(PathBuf),

    /// Inline YAML did not describe a desired set.
    #[error("YAML parse error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// A desired-set file did not parse.
    #[error("YAML parse error in '{path}': {source}")]
    YamlFileError {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// The set names no queue.
    #[error("desired set has an empty queue name")]
    EmptyQueue,
}
