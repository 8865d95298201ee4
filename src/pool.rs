//! Bounded worker pools for blocking method execution
//!
//! Jobs run on tokio's blocking threads, gated by a semaphore sized at startup.
//! Submission never blocks: a job waiting for a permit sits in the semaphore
//! queue, which has no upper bound. Dropping the future returned by
//! [`WorkerPool::submit`] abandons the wait only; the job still runs to completion
//! and its result is discarded.

use std::{any::Any, sync::Arc};

use async_trait::async_trait;
use thiserror::Error;
use tokio::{sync::Semaphore, task::JoinError};

use crate::errors::MethodResult;

pub type Job = Box<dyn FnOnce() -> MethodResult + Send + 'static>;

/// Which pool a blocking method is submitted to; chosen at registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolKind {
    /// IO-bound work.
    Io,
    /// CPU-bound work.
    Cpu,
}

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("worker pool '{0}' is closed")]
    Closed(&'static str),
    #[error("worker panicked: {0}")]
    Panicked(String),
    #[error("worker task was cancelled")]
    Cancelled,
}

#[async_trait]
pub trait WorkerPool: Send + Sync {
    async fn submit(&self, job: Job) -> Result<MethodResult, PoolError>;
}

#[derive(Debug)]
pub struct BoundedPool {
    name: &'static str,
    permits: Arc<Semaphore>,
}

impl BoundedPool {
    pub fn new(name: &'static str, size: usize) -> Self {
        Self {
            name,
            permits: Arc::new(Semaphore::new(size)),
        }
    }

    /// Workers currently not running a job.
    pub fn idle_workers(&self) -> usize {
        self.permits.available_permits()
    }
}

#[async_trait]
impl WorkerPool for BoundedPool {
    async fn submit(&self, job: Job) -> Result<MethodResult, PoolError> {
        let permits = Arc::clone(&self.permits);
        let name = self.name;

        // Detached from the caller so that an abandoned wait does not stop the job.
        let handle = tokio::spawn(async move {
            let permit = permits
                .acquire_owned()
                .await
                .map_err(|_| PoolError::Closed(name))?;
            tokio::task::spawn_blocking(move || {
                let _permit = permit;
                job()
            })
            .await
            .map_err(join_error)
        });

        handle.await.map_err(join_error)?
    }
}

/// The two process-wide pools shared by every dispatch.
#[derive(Clone)]
pub struct WorkerPools {
    pub io: Arc<dyn WorkerPool>,
    pub cpu: Arc<dyn WorkerPool>,
}

impl WorkerPools {
    pub fn new(io: Arc<dyn WorkerPool>, cpu: Arc<dyn WorkerPool>) -> Self {
        Self { io, cpu }
    }

    pub fn bounded(io_size: usize, cpu_size: usize) -> Self {
        Self::new(
            Arc::new(BoundedPool::new("io", io_size)),
            Arc::new(BoundedPool::new("cpu", cpu_size)),
        )
    }

    pub fn get(&self, kind: PoolKind) -> &Arc<dyn WorkerPool> {
        match kind {
            PoolKind::Io => &self.io,
            PoolKind::Cpu => &self.cpu,
        }
    }
}

fn join_error(err: JoinError) -> PoolError {
    if err.is_panic() {
        PoolError::Panicked(panic_message(err.into_panic()))
    } else {
        PoolError::Cancelled
    }
}

pub(crate) fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::{AtomicBool, AtomicUsize, Ordering},
        time::Duration,
    };

    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn submit_returns_job_result() {
        let pool = BoundedPool::new("io", 2);
        let result = pool
            .submit(Box::new(|| Ok(json!(42))))
            .await
            .expect("pool runs job");
        assert_eq!(result.expect("job succeeds"), json!(42));
        assert_eq!(pool.idle_workers(), 2);
    }

    #[tokio::test]
    async fn panicking_job_is_reported() {
        let pool = BoundedPool::new("cpu", 1);
        let err = pool
            .submit(Box::new(|| panic!("worker exploded")))
            .await
            .expect_err("panic surfaces as pool error");
        assert!(matches!(err, PoolError::Panicked(message) if message == "worker exploded"));
    }

    #[tokio::test]
    async fn closed_pool_names_itself() {
        let pool = BoundedPool::new("io", 1);
        pool.permits.close();
        let err = pool
            .submit(Box::new(|| Ok(json!(null))))
            .await
            .expect_err("closed pool rejects jobs");
        assert!(matches!(err, PoolError::Closed("io")));
        assert_eq!(err.to_string(), "worker pool 'io' is closed");
    }

    #[tokio::test]
    async fn pool_size_bounds_concurrency() {
        let pool = Arc::new(BoundedPool::new("io", 1));
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let job = |running: Arc<AtomicUsize>, peak: Arc<AtomicUsize>| -> Job {
            Box::new(move || {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(30));
                running.fetch_sub(1, Ordering::SeqCst);
                Ok(json!(null))
            })
        };

        let (first, second) = tokio::join!(
            pool.submit(job(running.clone(), peak.clone())),
            pool.submit(job(running.clone(), peak.clone())),
        );
        assert!(first.is_ok() && second.is_ok());
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn abandoned_wait_lets_job_finish() {
        let pool = BoundedPool::new("io", 1);
        let finished = Arc::new(AtomicBool::new(false));
        let flag = finished.clone();

        let waited = tokio::time::timeout(
            Duration::from_millis(10),
            pool.submit(Box::new(move || {
                std::thread::sleep(Duration::from_millis(80));
                flag.store(true, Ordering::SeqCst);
                Ok(json!(null))
            })),
        )
        .await;
        assert!(waited.is_err());

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(finished.load(Ordering::SeqCst));
    }
}
