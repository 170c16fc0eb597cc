//! Bounded decode fan-out.
//!
//! [`DecodeGate`] runs blocking decode closures on tokio's blocking pool with at
//! most N in flight. `dispatch` waits for a permit before spawning, so a
//! producer that reads faster than workers decode is held back instead of
//! buffering the whole file in memory.
//!
//! Finished tasks are pruned on every dispatch so the task set stays at most N
//! long. Results are collected in completion order; callers sort afterwards.
//!
//! The first failed task closes the gate: its error is returned once, and any
//! later `dispatch` fails with [`Error::GateClosed`] instead of admitting work.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};

use crate::{Error, Result};

pub struct DecodeGate<T> {
    semaphore: Arc<Semaphore>,
    tasks: JoinSet<Result<T>>,
    results: Vec<T>,
}

impl<T: Send + 'static> DecodeGate<T> {
    pub fn new(max_in_flight: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_in_flight.max(1))),
            tasks: JoinSet::new(),
            results: Vec::new(),
        }
    }

    /// Spawn `work` once a permit is available.
    ///
    /// Returns the first error of any task that has already finished.
    pub async fn dispatch<F>(&mut self, work: F) -> Result<()>
    where
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| Error::GateClosed)?;

        self.tasks.spawn_blocking(move || {
            let _permit = permit;
            work()
        });

        while let Some(joined) = self.tasks.try_join_next() {
            self.collect(joined)?;
        }
        Ok(())
    }

    /// Wait for every outstanding task and return all results
    pub async fn finish(mut self) -> Result<Vec<T>> {
        while let Some(joined) = self.tasks.join_next().await {
            self.collect(joined)?;
        }
        Ok(self.results)
    }

    fn collect(&mut self, joined: std::result::Result<Result<T>, JoinError>) -> Result<()> {
        match joined.map_err(Error::from).and_then(|result| result) {
            Ok(value) => {
                self.results.push(value);
                Ok(())
            }
            Err(e) => {
                self.semaphore.close();
                Err(e)
            }
        }
    }
}
