//! # Worker Pools
//!
//! Named, bounded executors for business dispatch.
//!
//! Service methods are plain synchronous closures. Running them on the I/O tasks
//! would let one slow method stall every connection on that worker, so the server
//! hands them to a [`WorkerPool`], which runs at most `size` of them at once on
//! tokio's blocking threads.
//!
//! [`WorkerPools`] tracks pools by name so that shutdown can drain all of them.

use crate::error::{Result, RpcError};
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

/// Dispatch concurrency when none is configured: twice the available cores
pub fn default_pool_size() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get() * 2)
        .unwrap_or(2)
}

/// Bounded executor running closures on blocking threads
#[derive(Debug)]
pub struct WorkerPool {
    name: String,
    size: usize,
    permits: Arc<Semaphore>,
    shut_down: AtomicBool,
}

impl WorkerPool {
    pub fn new(name: impl Into<String>, size: usize) -> Self {
        let size = size.max(1);
        Self {
            name: name.into(),
            size,
            permits: Arc::new(Semaphore::new(size)),
            shut_down: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of tasks currently holding a slot
    pub fn in_flight(&self) -> usize {
        self.size.saturating_sub(self.permits.available_permits())
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    /// Run `task` once a slot is free and wait for its result.
    pub async fn execute<F, T>(&self, task: F) -> Result<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        if self.is_shut_down() {
            return Err(RpcError::Transport(format!(
                "worker pool {} is shut down",
                self.name
            )));
        }

        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| RpcError::Transport(format!("worker pool {} is shut down", self.name)))?;

        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            task()
        })
        .await
        .map_err(|e| RpcError::Invocation(format!("worker task failed: {e}")))
    }

    /// Stop accepting work and wait up to `grace` for in-flight tasks.
    ///
    /// Returns `true` when every task finished inside the grace period.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        self.shut_down.store(true, Ordering::Release);
        let all = u32::try_from(self.size).unwrap_or(u32::MAX);

        let drained = matches!(
            tokio::time::timeout(grace, self.permits.acquire_many(all)).await,
            Ok(Ok(_))
        );
        self.permits.close();

        if drained {
            info!(pool = %self.name, "Worker pool terminated");
        } else {
            warn!(pool = %self.name, in_flight = self.in_flight(), "Worker pool never terminated, abandoning tasks");
        }
        drained
    }
}

/// Registry of named worker pools
#[derive(Debug, Default)]
pub struct WorkerPools {
    pools: DashMap<String, Arc<WorkerPool>>,
}

impl WorkerPools {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the pool named `name`, creating it (or replacing a shut-down one) with `size` slots.
    pub fn get_or_create(&self, name: &str, size: usize) -> Arc<WorkerPool> {
        let mut entry = self
            .pools
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(WorkerPool::new(name, size)));

        if entry.is_shut_down() {
            debug!(pool = %name, "Recreating shut-down worker pool");
            *entry = Arc::new(WorkerPool::new(name, size));
        }
        entry.value().clone()
    }

    pub fn len(&self) -> usize {
        self.pools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }

    /// Shut every pool down concurrently, each bounded by `grace`.
    pub async fn shutdown_all(&self, grace: Duration) -> bool {
        info!(pools = self.pools.len(), "Shutting down all worker pools");
        let pools: Vec<Arc<WorkerPool>> = self.pools.iter().map(|p| p.value().clone()).collect();
        let results =
            futures::future::join_all(pools.iter().map(|pool| pool.shutdown(grace))).await;
        results.into_iter().all(|ok| ok)
    }
}
