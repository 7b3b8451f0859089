//! The error type shared by all integrators and reducers.

use thiserror::Error;

/// Everything that can go wrong while setting up or running an integration.
#[derive(Debug, Error)]
pub enum Error {
    /// The integration domain is empty, inverted or not finite.
    #[error("invalid bounds [{lower}, {upper}): the upper bound must be finite and larger than the lower one")]
    InvalidBounds {
        /// Requested lower bound.
        lower: f64,
        /// Requested upper bound.
        upper: f64,
    },

    /// The hypercube has zero dimensions.
    #[error("invalid dimension: at least one dimension is required")]
    InvalidDimension,

    /// No samples were requested.
    #[error("invalid sample count: at least one sample is required")]
    InvalidSampleCount,

    /// No workers, or a worker ordinal that does not fit the number of workers.
    #[error("invalid worker count: {0}")]
    InvalidWorkerCount(String),

    /// A worker could not finish its share of the samples. This aborts the whole integration.
    #[error("worker {worker} failed: {reason}")]
    WorkerFailure {
        /// Ordinal (thread index or rank) of the failing worker.
        worker: u32,
        /// What happened.
        reason: String,
    },

    /// The reduced statistics do not account for exactly the requested number of samples.
    #[error("expected {expected} integrand calls, but the workers reported {actual}")]
    SampleMismatch {
        /// Number of requested samples.
        expected: u64,
        /// Number of calls found in the reduced statistics.
        actual: u64,
    },

    /// A collective message arrived that does not fit the reduction in progress.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Socket or file I/O failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A collective message could not be encoded or decoded.
    #[error(transparent)]
    Codec(#[from] serde_json::Error),

    /// A configuration file could not be parsed.
    #[error(transparent)]
    Config(#[from] toml::de::Error),
}
