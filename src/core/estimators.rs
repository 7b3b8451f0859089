//! This module contains everything related to estimators.
use crate::core::error::Error;
use crate::core::IntegrationRequest;

use num_traits::{Float, FromPrimitive};
use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign, Mul};

/// Basic estimators, like the mean, variance, and the standard deviation.
pub trait BasicEstimators<T: Float> {
    /// Returns the mean value.
    fn mean(&self) -> T;

    /// Returns the variance, $V$.
    fn var(&self) -> T;

    /// Returns the standard deviation, $\sigma = \sqrt{V}$.
    fn std(&self) -> T {
        self.var().sqrt()
    }
}

/// More estimators.
pub trait Estimators<T: Float>: BasicEstimators<T> {
    /// Returns the number of times, $N$, the integrand has been called.
    fn calls(&self) -> u64;
}

/// First and second moment of the integrand values seen by one worker, or, after the reduction,
/// by all workers together.
///
/// Partial statistics are added element-wise, so combining the contributions of several workers
/// is a plain sum. The sum is associative only up to floating-point rounding, which is why the
/// reducers always add them in the order of the worker ordinals.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
pub struct PartialStatistics<T> {
    sum: T,
    sumsq: T,
    calls: u64,
}

impl<T> PartialStatistics<T> {
    /// Constructor.
    pub const fn new(sum: T, sumsq: T, calls: u64) -> Self {
        Self { sum, sumsq, calls }
    }
}

impl<T: Copy> PartialStatistics<T> {
    /// Returns $\sum_j f_j$.
    pub fn sum(&self) -> T {
        self.sum
    }

    /// Returns $\sum_j f_j^2$.
    pub fn sumsq(&self) -> T {
        self.sumsq
    }
}

impl<T: AddAssign + Copy + Mul<Output = T>> PartialStatistics<T> {
    /// Fold the integrand value `value` into the running sums.
    pub fn update(&mut self, value: T) {
        self.calls += 1;
        self.sum += value;
        self.sumsq += value * value;
    }
}

impl<T: Float> Default for PartialStatistics<T> {
    fn default() -> Self {
        Self {
            sum: T::zero(),
            sumsq: T::zero(),
            calls: 0,
        }
    }
}

impl<T: Add<Output = T>> Add for PartialStatistics<T> {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self {
            sum: self.sum + other.sum,
            sumsq: self.sumsq + other.sumsq,
            calls: self.calls + other.calls,
        }
    }
}

impl<T: AddAssign> AddAssign for PartialStatistics<T> {
    fn add_assign(&mut self, other: Self) {
        self.sum += other.sum;
        self.sumsq += other.sumsq;
        self.calls += other.calls;
    }
}

impl<T: Float + FromPrimitive> PartialStatistics<T> {
    fn calls_as_float(&self) -> T {
        T::from_u64(self.calls).unwrap_or_else(T::nan)
    }
}

impl<T> BasicEstimators<T> for PartialStatistics<T>
where
    T: Float + FromPrimitive,
{
    fn mean(&self) -> T {
        self.sum / self.calls_as_float()
    }

    /// The variance of the integrand values, $\langle f^2 \rangle - \langle f \rangle^2$.
    ///
    /// Cancellation can push the difference slightly below zero for (nearly) constant
    /// integrands; the result is clamped to zero in that case.
    fn var(&self) -> T {
        let calls = self.calls_as_float();
        let mean = self.sum / calls;
        (self.sumsq / calls - mean * mean).max(T::zero())
    }
}

impl<T> Estimators<T> for PartialStatistics<T>
where
    T: Float + FromPrimitive,
{
    fn calls(&self) -> u64 {
        self.calls
    }
}

/// The final estimate of an integral over a hypercube.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
pub struct IntegrationResult {
    integral: f64,
    standard_error: f64,
    variance: f64,
    volume: f64,
}

impl IntegrationResult {
    /// Turns the reduced statistics of all workers into an estimate for the integral requested
    /// by `request`.
    ///
    /// With $N$ samples, $\langle f \rangle$ the mean and $V$ the variance of the integrand values
    /// and $\mathrm{vol} = (b - a)^d$ the volume of the hypercube, the integral is estimated by
    /// $\mathrm{vol} \langle f \rangle$ with the standard error $\mathrm{vol} \sqrt{V / N}$.
    ///
    /// # Errors
    ///
    /// Fails if the request has no samples or an empty domain, or if `total` does not contain
    /// exactly as many calls as samples were requested.
    pub fn new(total: &PartialStatistics<f64>, request: &IntegrationRequest) -> Result<Self, Error> {
        if request.samples() == 0 {
            return Err(Error::InvalidSampleCount);
        }

        let (lower, upper) = (request.lower(), request.upper());

        // also rejects NaN
        if !(upper > lower) {
            return Err(Error::InvalidBounds { lower, upper });
        }

        if total.calls() != request.samples() {
            return Err(Error::SampleMismatch {
                expected: request.samples(),
                actual: total.calls(),
            });
        }

        let volume = request.volume();
        let variance = total.var();

        Ok(Self {
            integral: total.mean() * volume,
            standard_error: volume * (variance / total.calls_as_float()).sqrt(),
            variance,
            volume,
        })
    }

    /// Returns the estimate of the integral.
    pub fn integral(&self) -> f64 {
        self.integral
    }

    /// Returns the estimated standard error of `integral`.
    pub fn standard_error(&self) -> f64 {
        self.standard_error
    }

    /// Returns the variance of the integrand values. Never negative.
    pub fn variance(&self) -> f64 {
        self.variance
    }

    /// Returns the volume of the hypercube.
    pub fn volume(&self) -> f64 {
        self.volume
    }
}
