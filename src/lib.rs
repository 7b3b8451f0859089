#![warn(clippy::all, clippy::cargo, clippy::nursery, clippy::pedantic)]
#![warn(missing_docs)]

//! The crate `hypermc` estimates integrals over hypercubes with [Monte Carlo integration],
//! sharing the samples among several workers. The workers are either threads of a single
//! process or processes that may run on different machines.
//!
//! # Features
//!
//! - **Two execution strategies, one algorithm**. Whether the workers are threads or processes
//! only changes how their partial results are combined, see [`reduce::Reducer`]. The partitioning
//! of the samples, the random number streams and the estimators are the same.
//! - **Reproducibility**. Every worker draws its points from its own PCG-64 generator, seeded
//! from the global seed and the ordinal of the worker. For a given seed and number of workers the
//! results are bit-identical from run to run, and identical between threads and processes.
//! - **No lost samples**. The total number of samples is split into contiguous ranges whose
//! lengths differ by at most one; the reduced statistics are checked to contain exactly as many
//! integrand calls as were requested.
//!
//! # What is ...?
//!
//! Given
//!
//! $$ I = \int_a^b \mathrm{d} x_1 \cdots \int_a^b \mathrm{d} x_d \, f(x_1, x_2, \ldots, x_d) $$
//!
//! we approximate $I$ using PLAIN Monte Carlo integration with
//!
//! $$ I \approx \frac{(b - a)^d}{N} \sum_{j=1}^N f \left( x_1^{(j)}, x_2^{(j)}, \ldots,
//! x_d^{(j)} \right) $$
//!
//! where for each $j$ the arguments are uniformly distributed in $[a, b)$. We use the following
//! terms:
//!
//! - the number of *calls* or the *sample size* is $N$, the number of times the integrand is
//! evaluated,
//! - the *integrand* is the function $f$; by default the Gaussian kernel
//! $\exp(-\sum_i x_i^2)$,
//! - a *worker* is a thread or a process evaluating the integrand for a contiguous slice of the
//! $N$ samples,
//! - the *partial statistics* of a worker are the sums of the integrand values and of their
//! squares over its slice.
//!
//! [Monte Carlo integration]: https://en.wikipedia.org/wiki/Monte_Carlo_integration

pub mod config;
pub mod core;
pub mod integrators;
pub mod reduce;

pub use crate::core::error::Error;
pub use crate::core::*;
pub use crate::integrators::plain::{estimate, integrate, Report};
