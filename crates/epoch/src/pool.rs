//! Bounded worker pool for pairing computations.

use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::error::EpochError;

/// Runs CPU-bound jobs on the blocking thread pool, at most `workers` at a time.
///
/// Cloning is cheap; clones share the same bound.
#[derive(Debug, Clone)]
pub struct CryptoPool {
    permits: Arc<Semaphore>,
    workers: usize,
}

impl CryptoPool {
    pub fn new(workers: usize) -> Self {
        let workers = workers.max(1);
        Self {
            permits: Arc::new(Semaphore::new(workers)),
            workers,
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Jobs currently holding a worker slot.
    pub fn busy(&self) -> usize {
        self.workers - self.permits.available_permits()
    }

    pub async fn run<F, T>(&self, job: F) -> Result<T, EpochError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| EpochError::Pool("pool closed".into()))?;

        let result = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            job()
        })
        .await;

        result.map_err(|e| EpochError::Pool(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_run_returns_result() {
        let pool = CryptoPool::new(2);
        let value = pool.run(|| 6 * 7).await.unwrap();
        assert_eq!(value, 42);
        assert_eq!(pool.busy(), 0);
    }

    #[tokio::test]
    async fn test_zero_workers_clamped() {
        assert_eq!(CryptoPool::new(0).workers(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrency_bounded() {
        let pool = CryptoPool::new(2);
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let jobs: Vec<_> = (0..8)
            .map(|_| {
                let pool = pool.clone();
                let active = Arc::clone(&active);
                let peak = Arc::clone(&peak);
                tokio::spawn(async move {
                    pool.run(move || {
                        let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        std::thread::sleep(Duration::from_millis(20));
                        active.fetch_sub(1, Ordering::SeqCst);
                    })
                    .await
                })
            })
            .collect();

        for job in jobs {
            job.await.unwrap().unwrap();
        }
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_panicking_job_reported() {
        let pool = CryptoPool::new(1);
        let result = pool.run(|| -> u32 { panic!("boom") }).await;
        assert!(matches!(result, Err(EpochError::Pool(_))));

        // The slot is returned after a panic.
        assert_eq!(pool.run(|| 1).await.unwrap(), 1);
    }
}
