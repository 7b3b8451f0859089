//! The core module
pub mod error;
pub mod estimators;

use crate::core::error::Error;
use serde::{Deserialize, Serialize};

/// The seed used when the caller does not choose one.
pub const DEFAULT_SEED: u64 = 12345;

/// Odd multiplier spreading consecutive worker ordinals over all 64 bits of a seed.
const SEED_MULTIPLIER: u64 = 0x9e37_79b9_7f4a_7c15;

/// Integrand trait
///
/// The integrand must be a pure function of the point: it is called concurrently from several
/// workers and its values must not depend on the order in which the points are visited.
pub trait Integrand: Send + Sync {
    /// Call the integrand with a point `x` of the hypercube.
    fn call(&self, x: &[f64]) -> f64;
}

impl<F> Integrand for F
where
    F: Fn(&[f64]) -> f64 + Send + Sync,
{
    fn call(&self, x: &[f64]) -> f64 {
        self(x)
    }
}

/// The Gaussian kernel $f(x_1, \ldots, x_d) = \exp \left( -\sum_{i=1}^d x_i^2 \right)$.
///
/// Over $[0, 1)^d$ its integral is $\left( \frac{\sqrt{\pi}}{2} \mathrm{erf}(1) \right)^d$, for
/// example $0.746824...$ for $d = 1$ and $0.416538...$ for $d = 3$.
#[derive(Clone, Copy, Debug, Default)]
pub struct Gaussian;

impl Integrand for Gaussian {
    fn call(&self, x: &[f64]) -> f64 {
        (-x.iter().map(|xi| xi * xi).sum::<f64>()).exp()
    }
}

/// Everything needed to estimate an integral over the hypercube $[a, b)^d$.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct IntegrationRequest {
    lower: f64,
    upper: f64,
    dimensions: u32,
    samples: u64,
    seed: u64,
}

impl IntegrationRequest {
    /// Request an integration over `[lower, upper)^dimensions` with `samples` integrand
    /// evaluations in total, using [`DEFAULT_SEED`].
    ///
    /// # Errors
    ///
    /// Fails if the bounds are not finite, `upper <= lower` or the volume of the hypercube is
    /// not representable, if `dimensions` is zero or if `samples` is zero.
    pub fn new(lower: f64, upper: f64, dimensions: u32, samples: u64) -> Result<Self, Error> {
        if !lower.is_finite() || !upper.is_finite() || upper <= lower {
            return Err(Error::InvalidBounds { lower, upper });
        }

        if dimensions == 0 {
            return Err(Error::InvalidDimension);
        }

        if !volume(lower, upper, dimensions).is_finite() {
            return Err(Error::InvalidBounds { lower, upper });
        }

        if samples == 0 {
            return Err(Error::InvalidSampleCount);
        }

        Ok(Self {
            lower,
            upper,
            dimensions,
            samples,
            seed: DEFAULT_SEED,
        })
    }

    /// Replace the global seed the worker seeds are derived from.
    #[must_use]
    pub const fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Returns the lower bound of every coordinate.
    pub const fn lower(&self) -> f64 {
        self.lower
    }

    /// Returns the upper bound of every coordinate.
    pub const fn upper(&self) -> f64 {
        self.upper
    }

    /// Returns the number of dimensions of the hypercube.
    pub const fn dimensions(&self) -> u32 {
        self.dimensions
    }

    /// Returns the total number of samples.
    pub const fn samples(&self) -> u64 {
        self.samples
    }

    /// Returns the global seed.
    pub const fn seed(&self) -> u64 {
        self.seed
    }

    /// Returns the volume $(b - a)^d$ of the hypercube.
    pub fn volume(&self) -> f64 {
        volume(self.lower, self.upper, self.dimensions)
    }
}

fn volume(lower: f64, upper: f64, dimensions: u32) -> f64 {
    (upper - lower).powf(f64::from(dimensions))
}

/// The half-open range `start..end` of sample indices assigned to a single worker.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct WorkerRange {
    /// First sample index of the worker.
    pub start: u64,
    /// One past the last sample index of the worker.
    pub end: u64,
}

impl WorkerRange {
    /// Compute the range of worker `ordinal` (zero-based) when `samples` samples are shared by
    /// `workers` workers.
    ///
    /// Every worker gets `samples / workers` samples, and the first `samples % workers` workers
    /// one more. If there are fewer samples than workers the trailing ranges are empty.
    ///
    /// # Errors
    ///
    /// Fails if `workers` is zero or `ordinal` is not smaller than `workers`.
    pub fn for_worker(samples: u64, workers: u32, ordinal: u32) -> Result<Self, Error> {
        if workers == 0 {
            return Err(no_workers());
        }

        if ordinal >= workers {
            return Err(Error::InvalidWorkerCount(format!(
                "worker {} does not exist among {} workers",
                ordinal, workers
            )));
        }

        let base = samples / u64::from(workers);
        let remainder = samples % u64::from(workers);
        let ordinal = u64::from(ordinal);

        // the first `remainder` workers carry one extra sample
        let start = base * ordinal + ordinal.min(remainder);
        let len = if ordinal < remainder { base + 1 } else { base };

        Ok(Self {
            start,
            end: start + len,
        })
    }

    /// Returns the number of samples in this range.
    pub const fn len(&self) -> u64 {
        self.end - self.start
    }

    /// Returns `true` if the worker owning this range has nothing to do.
    pub const fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Split `samples` samples into `workers` contiguous, non-overlapping ranges that cover
/// `0..samples` without gaps. The range of worker `i` is at index `i`.
///
/// # Errors
///
/// Fails if `workers` is zero.
pub fn partition(samples: u64, workers: u32) -> Result<Vec<WorkerRange>, Error> {
    if workers == 0 {
        return Err(no_workers());
    }

    (0..workers)
        .map(|ordinal| WorkerRange::for_worker(samples, workers, ordinal))
        .collect()
}

fn no_workers() -> Error {
    Error::InvalidWorkerCount("at least one worker is required".to_string())
}

/// Derive the seed of worker `ordinal` from the global `seed`.
///
/// The map is injective in `ordinal` for a fixed `seed`, so no two workers of the same run share
/// a random number stream.
pub const fn worker_seed(seed: u64, ordinal: u32) -> u64 {
    seed ^ SEED_MULTIPLIER.wrapping_mul(ordinal as u64)
}
