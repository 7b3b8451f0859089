//! Plain integrator
use crate::core::error::Error;
use crate::core::estimators::*;
use crate::core::*;
use crate::reduce::{Reducer, ThreadReducer};

use rand::distributions::{Distribution, Uniform};
use rand::SeedableRng;
use rand_pcg::Pcg64;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// The state owned by a single worker: its random number generator and a buffer for the point
/// that is sampled next.
#[derive(Clone, Debug)]
pub struct WorkerContext {
    ordinal: u32,
    rng: Pcg64,
    coordinate: Uniform<f64>,
    x: Vec<f64>,
}

impl WorkerContext {
    /// Create the context of worker `ordinal`, seeding its generator from the seed of `request`.
    pub fn new(request: &IntegrationRequest, ordinal: u32) -> Self {
        Self {
            ordinal,
            rng: Pcg64::seed_from_u64(worker_seed(request.seed(), ordinal)),
            coordinate: Uniform::new(request.lower(), request.upper()),
            x: vec![0.0; request.dimensions() as usize],
        }
    }

    /// Returns the ordinal of the worker owning this context.
    pub const fn ordinal(&self) -> u32 {
        self.ordinal
    }

    /// Sample a new point, uniformly distributed in the hypercube.
    pub fn sample(&mut self) -> &[f64] {
        let Self {
            rng, coordinate, x, ..
        } = self;
        x.iter_mut().for_each(|v| *v = coordinate.sample(rng));
        x
    }

    /// Evaluate `integrand` once for every sample in `range` and return the sums of the values
    /// and of their squares.
    pub fn accumulate<I: Integrand + ?Sized>(
        &mut self,
        range: WorkerRange,
        integrand: &I,
    ) -> PartialStatistics<f64> {
        (range.start..range.end).fold(PartialStatistics::default(), |mut acc, _| {
            // sample a new point and evaluate the integrand
            let value = integrand.call(self.sample());
            acc.update(value);
            acc
        })
    }
}

/// The result of an integration together with diagnostics about how it was obtained.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Report {
    result: IntegrationResult,
    workers: u32,
    elapsed: Duration,
}

impl Report {
    /// Returns the estimate.
    pub const fn result(&self) -> &IntegrationResult {
        &self.result
    }

    /// Returns the number of workers the samples were shared by.
    pub const fn workers(&self) -> u32 {
        self.workers
    }

    /// Returns the wall-clock time spent sampling and reducing.
    pub const fn elapsed(&self) -> Duration {
        self.elapsed
    }
}

/// Integrate `integrand` as described by `request`, sharing the samples among the workers of
/// `reducer`.
///
/// Worker $i$ of $W$ evaluates the integrand for the samples in
/// [`WorkerRange::for_worker`]`(N, W, i)`, drawing its points from a generator seeded with
/// [`worker_seed`]`(seed, i)`. The result therefore only depends on the request and the number
/// of workers, not on the kind of reducer or on the scheduling of the workers.
///
/// # Errors
///
/// Fails if the reducer has no workers or the reduction fails. With a distributed reducer every
/// rank returns the same report.
pub fn integrate<I, R>(
    request: &IntegrationRequest,
    integrand: &I,
    reducer: &mut R,
) -> Result<Report, Error>
where
    I: Integrand + ?Sized,
    R: Reducer,
{
    let workers = reducer.workers();
    let ranges = partition(request.samples(), workers)?;

    let start = Instant::now();

    let total = reducer.reduce(|ordinal| {
        let range = ranges[ordinal as usize];
        let mut context = WorkerContext::new(request, ordinal);

        debug!(
            ordinal,
            start = range.start,
            end = range.end,
            seed = worker_seed(request.seed(), ordinal),
            "worker started"
        );

        context.accumulate(range, integrand)
    })?;

    let elapsed = start.elapsed();
    let result = IntegrationResult::new(&total, request)?;

    info!(
        workers,
        elapsed = ?elapsed,
        integral = result.integral(),
        standard_error = result.standard_error(),
        "integration finished"
    );

    Ok(Report {
        result,
        workers,
        elapsed,
    })
}

/// Estimate the integral of the [`Gaussian`] kernel over `[lower, upper)^dimensions` with
/// `samples` samples, shared by `workers` threads.
///
/// # Errors
///
/// Fails if any of the arguments is invalid or a worker thread panics.
pub fn estimate(
    lower: f64,
    upper: f64,
    dimensions: u32,
    samples: u64,
    workers: u32,
    seed: u64,
) -> Result<Report, Error> {
    let request = IntegrationRequest::new(lower, upper, dimensions, samples)?.with_seed(seed);
    let mut reducer = ThreadReducer::new(workers)?;

    integrate(&request, &Gaussian, &mut reducer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_samples_stay_in_the_hypercube() {
        let request = IntegrationRequest::new(-2.0, 3.0, 4, 1).unwrap();
        let mut context = WorkerContext::new(&request, 0);

        for _ in 0..10_000 {
            let x = context.sample();
            assert_eq!(x.len(), 4);
            assert!(x.iter().all(|&v| (-2.0..3.0).contains(&v)));
        }
    }

    #[test]
    fn test_samples_are_uniform() {
        const CALLS: u32 = 200_000;

        let request = IntegrationRequest::new(1.0, 3.0, 2, 1).unwrap();
        let mut context = WorkerContext::new(&request, 5);

        let (sum, sumsq) = (0..CALLS).fold((0.0, 0.0), |(s, s2), _| {
            let v = context.sample()[1];
            (s + v, s2 + v * v)
        });
        let mean = sum / f64::from(CALLS);
        let var = sumsq / f64::from(CALLS) - mean * mean;

        // U(1, 3) has mean 2 and variance 1/3
        assert_approx_eq!(mean, 2.0, 0.01);
        assert_approx_eq!(var, 1.0 / 3.0, 0.01);
    }

    #[test]
    fn test_streams_are_reproducible() {
        let request = IntegrationRequest::new(0.0, 1.0, 3, 1).unwrap();
        let mut first = WorkerContext::new(&request, 3);
        let mut second = WorkerContext::new(&request, 3);
        let mut other = WorkerContext::new(&request, 4);
        assert_eq!(other.ordinal(), 4);

        for _ in 0..100 {
            let x = first.sample().to_vec();
            assert_eq!(x, second.sample());
            assert_ne!(x, other.sample());
        }
    }

    #[test]
    fn test_empty_range() {
        let request = IntegrationRequest::new(0.0, 1.0, 3, 1).unwrap();
        let mut context = WorkerContext::new(&request, 7);
        let stats = context.accumulate(WorkerRange { start: 3, end: 3 }, &Gaussian);

        assert_eq!(stats, PartialStatistics::default());
    }

    #[test]
    fn test_accumulate_counts_calls() {
        let request = IntegrationRequest::new(0.0, 1.0, 2, 1).unwrap();
        let mut context = WorkerContext::new(&request, 0);
        let stats = context.accumulate(WorkerRange { start: 10, end: 110 }, &|_: &[f64]| 2.0);

        assert_eq!(stats, PartialStatistics::new(200.0, 400.0, 100));
    }

    #[test]
    fn test_estimate_one_dimension() {
        let report = estimate(0.0, 1.0, 1, 100_000, 4, DEFAULT_SEED).unwrap();
        let result = report.result();

        assert_eq!(report.workers(), 4);
        assert_eq!(result.volume(), 1.0);
        assert!((result.integral() - 0.746_824_132_812_427).abs() < 5.0 * result.standard_error());
    }
}
