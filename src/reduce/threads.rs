//! Shared-memory reduction: one scoped thread per worker.
use crate::core::error::Error;
use crate::core::estimators::PartialStatistics;
use crate::reduce::{sum_in_order, Reducer};

use crossbeam as cb;
use std::any::Any;
use tracing::debug;

/// Runs all workers on threads of the current process.
#[derive(Clone, Debug)]
pub struct ThreadReducer {
    workers: u32,
}

impl ThreadReducer {
    /// Use `workers` threads.
    ///
    /// # Errors
    ///
    /// Fails if `workers` is zero.
    pub fn new(workers: u32) -> Result<Self, Error> {
        if workers == 0 {
            return Err(Error::InvalidWorkerCount(
                "at least one worker thread is required".to_string(),
            ));
        }

        Ok(Self { workers })
    }

    /// Use as many threads as there are logical cores.
    pub fn with_available_cores() -> Self {
        Self {
            workers: u32::try_from(num_cpus::get()).unwrap_or(u32::MAX).max(1),
        }
    }
}

impl Reducer for ThreadReducer {
    fn workers(&self) -> u32 {
        self.workers
    }

    fn reduce<F>(&mut self, worker: F) -> Result<PartialStatistics<f64>, Error>
    where
        F: Fn(u32) -> PartialStatistics<f64> + Sync,
    {
        let worker = &worker;

        let partials = cb::thread::scope(|s| {
            let handles = (0..self.workers)
                .map(|ordinal| (ordinal, s.spawn(move |_| worker(ordinal))))
                .collect::<Vec<_>>();

            // wait for all threads; the results stay in the order of the ordinals
            handles
                .into_iter()
                .map(|(ordinal, handle)| {
                    handle.join().map_err(|payload| Error::WorkerFailure {
                        worker: ordinal,
                        reason: panic_message(payload.as_ref()),
                    })
                })
                .collect::<Vec<_>>()
        })
        .map_err(|payload| Error::WorkerFailure {
            worker: 0,
            reason: panic_message(payload.as_ref()),
        })?
        .into_iter()
        .collect::<Result<Vec<_>, _>>()?;

        debug!(workers = self.workers, "all worker threads joined");

        Ok(sum_in_order(partials))
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        format!("worker thread panicked: {}", msg)
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        format!("worker thread panicked: {}", msg)
    } else {
        "worker thread panicked".to_string()
    }
}
