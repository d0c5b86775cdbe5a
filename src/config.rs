//! Runtime configuration of a simulation.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Cannot read configuration file '{path}': {message}")]
    Io { path: String, message: String },
    #[error("Invalid configuration: {0}")]
    Parse(String),
    #[error("Cannot start worker pool: {0}")]
    ThreadPool(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulationConfig {
    /// Evaluate independent targets of `get_many` in parallel.
    pub parallel: bool,
    /// Size of a dedicated worker pool. `None` uses the global rayon pool.
    pub worker_threads: Option<usize>,
    /// Legislation file replacing the bundled reference parameters.
    pub legislation_path: Option<PathBuf>,
    /// Validate formula and parameter coverage at this date when a
    /// tax-benefit system is loaded.
    pub coverage_date: Option<NaiveDate>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self { parallel: true, worker_threads: None, legislation_path: None, coverage_date: None }
    }
}

impl SimulationConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Reads a JSON file. Relative legislation paths are resolved against the
    /// directory holding the configuration file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        let mut config = Self::from_json_str(&text)?;
        if let (Some(legislation), Some(dir)) = (&config.legislation_path, path.parent()) {
            if legislation.is_relative() {
                config.legislation_path = Some(dir.join(legislation));
            }
        }
        Ok(config)
    }

    pub(crate) fn thread_pool(&self) -> Result<Option<rayon::ThreadPool>, ConfigError> {
        match self.worker_threads {
            Some(n) if self.parallel => rayon::ThreadPoolBuilder::new()
                .num_threads(n)
                .thread_name(|i| format!("fisca-worker-{}", i))
                .build()
                .map(Some)
                .map_err(|e| ConfigError::ThreadPool(e.to_string())),
            _ => Ok(None),
        }
    }
}
