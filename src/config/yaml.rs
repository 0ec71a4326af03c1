//! YAML desired-set files.
//!
//! A file names a queue, how to reach it, and the jobs that should exist
//! there:
//!
//! ```yaml
//! queue: notifications
//! prune: true
//! store:
//!   backend: sqlite
//!   path: ./queue.db
//! jobs:
//!   - name: digest
//!     data: { _version: "1.2.0", template: daily }
//!     options:
//!       id: daily-digest
//!       repeat: { cron: "0 9 * * *", tz: Europe/Paris }
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::error::ConfigError;
use crate::core::job::JobConfig;
use crate::store::StoreOptions;

/// A queue and the jobs it should hold.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DesiredSet {
    /// Queue name passed to the connector.
    pub queue: String,
    /// Delete jobs absent from `jobs`.
    #[serde(default)]
    pub prune: bool,
    /// Connector options, forwarded verbatim.
    #[serde(default)]
    pub store: StoreOptions,
    /// Desired jobs. Job-level checks are left to the validator.
    #[serde(default)]
    pub jobs: Vec<JobConfig>,
    /// File the set was loaded from.
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

/// Loader for desired-set files.
pub struct YamlLoader;

impl YamlLoader {
    /// Load a desired set from a file.
    pub fn load_desired_set(path: impl AsRef<Path>) -> Result<DesiredSet, ConfigError> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|source| ConfigError::FileReadError {
                path: path.to_path_buf(),
                source,
            })?;
        let mut set: DesiredSet =
            serde_yaml::from_str(&content).map_err(|source| ConfigError::YamlFileError {
                path: path.to_path_buf(),
                source,
            })?;
        Self::check_desired_set(&set)?;
        set.source = Some(path.to_path_buf());
        Ok(set)
    }

    /// Parse a desired set from a YAML string.
    pub fn parse_desired_set(yaml: &str) -> Result<DesiredSet, ConfigError> {
        let set: DesiredSet = serde_yaml::from_str(yaml)?;
        Self::check_desired_set(&set)?;
        Ok(set)
    }

    /// Load every `.yaml`/`.yml` file in a directory, sorted by file name.
    pub fn load_desired_sets_from_directory(
        dir: impl AsRef<Path>,
    ) -> Result<Vec<DesiredSet>, ConfigError> {
        let dir = dir.as_ref();

        if !dir.is_dir() {
            return Err(ConfigError::NotADirectory(dir.to_path_buf()));
        }

        let read_dir_err = |source: std::io::Error| ConfigError::DirReadError {
            path: dir.to_path_buf(),
            source,
        };

        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir).map_err(read_dir_err)? {
            let path = entry.map_err(read_dir_err)?.path();
            if path.is_file()
                && let Some(ext) = path.extension()
                && (ext == "yaml" || ext == "yml")
            {
                paths.push(path);
            }
        }
        paths.sort();

        paths.iter().map(Self::load_desired_set).collect()
    }

    /// Load a file, or every desired-set file of a directory.
    pub fn load_path(path: impl AsRef<Path>) -> Result<Vec<DesiredSet>, ConfigError> {
        let path = path.as_ref();
        if path.is_dir() {
            Self::load_desired_sets_from_directory(path)
        } else {
            Ok(vec![Self::load_desired_set(path)?])
        }
    }

    fn check_desired_set(set: &DesiredSet) -> Result<(), ConfigError> {
        if set.queue.trim().is_empty() {
            return Err(ConfigError::EmptyQueue);
        }
        Ok(())
    }
}
