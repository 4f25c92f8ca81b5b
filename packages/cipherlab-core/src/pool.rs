//! # Crypto Worker Pool
//!
//! RSA key generation and RSA operations are CPU-bound. They run on tokio's
//! blocking threads, never on the async workers that accept requests.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        WORKER POOL                                      │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  request ──► acquire permit (Semaphore, max_concurrent_ops)            │
//! │                   │                                                     │
//! │                   ▼                                                     │
//! │             spawn_blocking(task)  ── permit released when task ends    │
//! │                   │                                                     │
//! │                   ▼                                                     │
//! │             Result<T>  (JoinError → WorkerUnavailable)                 │
//! │                                                                         │
//! │  Key generation is additionally bounded by keygen_timeout and fails   │
//! │  TimedOut instead of waiting forever.                                  │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A timed-out key generation keeps its thread and permit until the
//! computation returns; only the caller stops waiting.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;

use crate::error::{Error, Result};

/// Bounded pool for blocking crypto work
#[derive(Debug, Clone)]
pub struct CryptoPool {
    permits: Arc<Semaphore>,
    keygen_timeout: Duration,
}

impl CryptoPool {
    /// Create a pool running at most `max_concurrent` tasks at once
    pub fn new(max_concurrent: usize, keygen_timeout: Duration) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            keygen_timeout,
        }
    }

    /// Permits currently free
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Key generation budget
    pub fn keygen_timeout(&self) -> Duration {
        self.keygen_timeout
    }

    /// Run `task` on a blocking thread once a permit is free
    pub async fn run<F, T>(&self, task: F) -> Result<T>
    where
        F: FnOnce() -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| Error::WorkerUnavailable("crypto pool is closed".into()))?;

        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            task()
        })
        .await?
    }

    /// Run a key generation task under the keygen timeout
    pub async fn run_keygen<F, T>(&self, task: F) -> Result<T>
    where
        F: FnOnce() -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        match tokio::time::timeout(self.keygen_timeout, self.run(task)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!("Key generation exceeded {:?}", self.keygen_timeout);
                Err(Error::TimedOut(format!(
                    "key generation exceeded {} ms",
                    self.keygen_timeout.as_millis()
                )))
            }
        }
    }

    /// Stop handing out permits; queued and future tasks fail
    pub fn close(&self) {
        self.permits.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_run_returns_task_result() {
        let pool = CryptoPool::new(2, Duration::from_secs(1));
        let value = tokio_test::assert_ok!(pool.run(|| Ok(21 * 2)).await);
        assert_eq!(value, 42);

        let err = pool
            .run(|| -> Result<()> { Err(Error::DecryptionFailed) })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DecryptionFailed));
        assert_eq!(pool.available(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrency_is_bounded() {
        let pool = CryptoPool::new(1, Duration::from_secs(5));
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let pool = pool.clone();
            let running = running.clone();
            let peak = peak.clone();
            handles.push(tokio::spawn(async move {
                pool.run(move || {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    std::thread::sleep(Duration::from_millis(20));
                    running.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                })
                .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_keygen_timeout() {
        let pool = CryptoPool::new(1, Duration::from_millis(10));
        let err = pool
            .run_keygen(|| {
                std::thread::sleep(Duration::from_millis(200));
                Ok(())
            })
            .await
            .unwrap_err();

        assert!(matches!(err, Error::TimedOut(_)));
        assert!(err.is_recoverable());
    }

    #[tokio::test]
    async fn test_panicking_task_is_worker_unavailable() {
        let pool = CryptoPool::new(1, Duration::from_secs(1));
        let err = pool
            .run(|| -> Result<()> { panic!("boom") })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::WorkerUnavailable(_)));
        assert_eq!(pool.available(), 1);
    }

    #[tokio::test]
    async fn test_closed_pool() {
        let pool = CryptoPool::new(1, Duration::from_secs(1));
        pool.close();
        assert!(matches!(
            pool.run(|| Ok(())).await,
            Err(Error::WorkerUnavailable(_))
        ));
    }
}
