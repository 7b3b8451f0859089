//! Configuration of a run, as read from a TOML file.
//!
//! Every field has a default, so an empty file (or no file at all) is a valid configuration:
//!
//! ```toml
//! lower = 0.0
//! upper = 1.0
//! dimensions = 3
//! samples = 10_000_000
//! workers = 8
//! seed = 12345
//! backend = "processes"
//! bind = "127.0.0.1:0"
//! timeout = 60
//! ```

use crate::core::error::Error;
use crate::core::{IntegrationRequest, DEFAULT_SEED};
use crate::reduce::{Reducer, ThreadReducer, DEFAULT_TIMEOUT};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

/// How the workers of a run are executed.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// All workers are threads of one process.
    Threads,
    /// Every worker is a process of its own.
    Processes,
}

impl FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "threads" => Ok(Self::Threads),
            "processes" => Ok(Self::Processes),
            _ => Err(format!(
                "unknown backend '{}', expected 'threads' or 'processes'",
                s
            )),
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Threads => write!(f, "threads"),
            Self::Processes => write!(f, "processes"),
        }
    }
}

/// Parameters of a run.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    /// Lower bound of every coordinate.
    pub lower: f64,
    /// Upper bound of every coordinate.
    pub upper: f64,
    /// Number of dimensions of the hypercube.
    pub dimensions: u32,
    /// Total number of samples.
    pub samples: u64,
    /// Number of workers (threads or processes).
    pub workers: u32,
    /// Global seed.
    pub seed: u64,
    /// How the workers are executed.
    pub backend: Backend,
    /// Address the coordinator listens on when the workers are processes.
    pub bind: String,
    /// Seconds worker processes keep trying to reach the coordinator, and seconds the
    /// coordinator waits for all of them to connect.
    pub timeout: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            lower: 0.0,
            upper: 1.0,
            dimensions: 3,
            samples: 1_000_000,
            workers: ThreadReducer::with_available_cores().workers(),
            seed: DEFAULT_SEED,
            backend: Backend::Threads,
            bind: "127.0.0.1:0".to_string(),
            timeout: DEFAULT_TIMEOUT.as_secs(),
        }
    }
}

impl RunConfig {
    /// Parse a configuration from TOML.
    ///
    /// # Errors
    ///
    /// Fails on malformed TOML or unknown keys.
    pub fn from_toml(s: &str) -> Result<Self, Error> {
        Ok(toml::from_str(s)?)
    }

    /// Read the configuration file at `path`.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be read or parsed.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        Self::from_toml(&fs::read_to_string(path)?)
    }

    /// Validate the integration parameters of this configuration.
    ///
    /// # Errors
    ///
    /// Fails if the bounds, dimensions or samples are invalid, or if there are no workers.
    pub fn request(&self) -> Result<IntegrationRequest, Error> {
        if self.workers == 0 {
            return Err(Error::InvalidWorkerCount(
                "at least one worker is required".to_string(),
            ));
        }

        Ok(
            IntegrationRequest::new(self.lower, self.upper, self.dimensions, self.samples)?
                .with_seed(self.seed),
        )
    }
}
