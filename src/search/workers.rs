//! Bounded worker pool for brute-force scans.
//!
//! Scans run on a dedicated rayon pool, separate from the async runtime, so a
//! large scan never stalls request handling. Scans cannot be cancelled: a
//! caller deadline only discards a late result.

use std::time::Duration;

use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::error::{EngineError, EngineResult};

pub struct SearchWorkers {
    pool: rayon::ThreadPool,
}

impl SearchWorkers {
    /// Builds a pool with `threads` workers; `0` means one per CPU.
    pub fn new(threads: usize) -> EngineResult<Self> {
        let threads = if threads == 0 {
            num_cpus::get()
        } else {
            threads
        };

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("search-worker-{i}"))
            .build()
            .map_err(|e| EngineError::WorkerUnavailable {
                reason: e.to_string(),
            })?;

        debug!(threads, "Started search worker pool");
        Ok(Self { pool })
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Runs `job` on the pool and awaits its result.
    ///
    /// With a deadline, a job still running when it passes yields
    /// [`EngineError::DeadlineExceeded`]; the job itself runs to completion.
    pub async fn run<T, F>(&self, deadline: Option<Duration>, job: F) -> EngineResult<T>
    where
        F: FnOnce() -> EngineResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        self.pool.spawn(move || {
            // The receiver is gone when the caller gave up waiting.
            let _ = tx.send(job());
        });

        let received = match deadline {
            Some(limit) => match tokio::time::timeout(limit, rx).await {
                Ok(received) => received,
                Err(_) => {
                    let millis = limit.as_millis() as u64;
                    warn!(millis, "Search exceeded its deadline, discarding result");
                    return Err(EngineError::DeadlineExceeded { millis });
                }
            },
            None => rx.await,
        };

        received.map_err(|_| EngineError::WorkerUnavailable {
            reason: "search worker stopped before returning a result".to_string(),
        })?
    }
}

impl std::fmt::Debug for SearchWorkers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchWorkers")
            .field("threads", &self.threads())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_runs_job_on_pool() {
        let workers = SearchWorkers::new(2).unwrap();
        assert_eq!(workers.threads(), 2);

        let name = workers
            .run(None, || {
                Ok(std::thread::current().name().unwrap_or_default().to_string())
            })
            .await
            .unwrap();
        assert!(name.starts_with("search-worker-"));
    }

    #[tokio::test]
    async fn test_job_errors_propagate() {
        let workers = SearchWorkers::new(1).unwrap();
        let result: EngineResult<()> = workers
            .run(None, || Err(EngineError::not_found("p1")))
            .await;
        assert!(matches!(result, Err(EngineError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_late_result_is_discarded() {
        let workers = SearchWorkers::new(1).unwrap();
        let result = workers
            .run(Some(Duration::from_millis(10)), || {
                std::thread::sleep(Duration::from_millis(200));
                Ok(1)
            })
            .await;
        assert!(matches!(
            result,
            Err(EngineError::DeadlineExceeded { millis: 10 })
        ));
    }
}
