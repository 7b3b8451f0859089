//! Reduction of the partial statistics of all workers into one total.
//!
//! The estimator only needs one capability from its execution environment: run the local
//! accumulation of every worker and return the sum of their [`PartialStatistics`]. How the
//! workers are started and how their results travel to the coordinating point is up to the
//! [`Reducer`]:
//!
//! - [`ThreadReducer`] runs every worker on its own thread in the current process and adds up
//! the results after joining them,
//! - [`TcpReducer`] runs one worker per process and combines the results of all processes with a
//! collective sum over TCP.
//!
//! Both add the contributions in the order of the worker ordinals, so that for a fixed seed and
//! number of workers they produce bit-identical totals.

pub mod distributed;
pub mod threads;

pub use distributed::{TcpReducer, DEFAULT_TIMEOUT};
pub use threads::ThreadReducer;

use crate::core::error::Error;
use crate::core::estimators::PartialStatistics;

/// Runs workers and reduces their partial statistics.
pub trait Reducer {
    /// Returns the number of workers taking part in the reduction, across all threads or
    /// processes.
    fn workers(&self) -> u32;

    /// Call `worker` with the ordinal of every worker this reducer is responsible for and return
    /// the sum of the partial statistics of *all* workers.
    ///
    /// This blocks until every worker has contributed. A worker that cannot contribute makes the
    /// whole reduction fail.
    ///
    /// # Errors
    ///
    /// Returns [`Error::WorkerFailure`] if a worker crashed or disconnected, or a transport error
    /// if the partial statistics could not be exchanged.
    fn reduce<F>(&mut self, worker: F) -> Result<PartialStatistics<f64>, Error>
    where
        F: Fn(u32) -> PartialStatistics<f64> + Sync;
}

/// Add `partials`, which must be sorted by worker ordinal, starting from zero.
pub(crate) fn sum_in_order<I>(partials: I) -> PartialStatistics<f64>
where
    I: IntoIterator<Item = PartialStatistics<f64>>,
{
    partials
        .into_iter()
        .fold(PartialStatistics::default(), |acc, p| acc + p)
}
