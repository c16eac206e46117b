//! Worker pool every backend call runs on.
//!
//! The pool is either a dedicated multi-threaded runtime owned by the
//! dispatcher or a handle onto a runtime the embedder already runs. Work is
//! always spawned onto it, so callers never do storage I/O on their own task.

use std::future::Future;
use std::time::Duration;

use storage_access_types::{StorageError, StorageResult};
use tokio::runtime::{Builder, Handle, Runtime};
use tokio::task::JoinError;

/// Thread name of pool workers.
pub const WORKER_THREAD_NAME: &str = "storage-worker";

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Execution context for storage operations.
#[derive(Debug)]
pub struct WorkerPool {
    handle: Handle,
    runtime: Option<Runtime>,
}

impl WorkerPool {
    /// Build a dedicated runtime. `None` uses one worker per core.
    pub fn new(worker_threads: Option<usize>) -> StorageResult<Self> {
        let mut builder = Builder::new_multi_thread();
        builder.thread_name(WORKER_THREAD_NAME).enable_all();
        if let Some(threads) = worker_threads {
            builder.worker_threads(threads.max(1));
        }
        let runtime = builder
            .build()
            .map_err(|e| StorageError::Io(format!("failed to start worker pool: {e}")))?;
        tracing::debug!(?worker_threads, "worker pool started");
        Ok(Self {
            handle: runtime.handle().clone(),
            runtime: Some(runtime),
        })
    }

    /// Run on a runtime owned by someone else.
    pub fn from_handle(handle: Handle) -> Self {
        Self {
            handle,
            runtime: None,
        }
    }

    /// Run on the runtime of the calling task.
    pub fn current() -> StorageResult<Self> {
        Handle::try_current()
            .map(Self::from_handle)
            .map_err(|e| StorageError::Unsupported(format!("no tokio runtime: {e}")))
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    /// True when the pool owns its runtime.
    pub fn is_owned(&self) -> bool {
        self.runtime.is_some()
    }

    /// Drive a future to completion from synchronous code.
    ///
    /// Must not be called from inside a runtime.
    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        match &self.runtime {
            Some(runtime) => runtime.block_on(future),
            None => self.handle.block_on(future),
        }
    }

    /// Spawn `future` on the pool and wait for it.
    pub async fn run<F, T>(&self, future: F) -> StorageResult<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        self.handle.spawn(future).await.map_err(join_error)
    }

    /// Run blocking filesystem work on the pool's blocking lane.
    pub async fn run_blocking<F, T>(&self, f: F) -> StorageResult<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        self.handle.spawn_blocking(f).await.map_err(join_error)
    }

    /// Shut the owned runtime down, waiting briefly for in-flight work.
    ///
    /// A borrowed runtime is left alone.
    pub fn shutdown(mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_timeout(SHUTDOWN_TIMEOUT);
            tracing::debug!("worker pool stopped");
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            // Blocking shutdown panics inside an async context.
            if Handle::try_current().is_ok() {
                runtime.shutdown_background();
            } else {
                runtime.shutdown_timeout(SHUTDOWN_TIMEOUT);
            }
        }
    }
}

pub(crate) fn join_error(err: JoinError) -> StorageError {
    if err.is_panic() {
        StorageError::Io(format!("storage task panicked: {err}"))
    } else {
        StorageError::Io(format!("storage task cancelled: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_owned_pool_runs_on_named_workers() {
        let pool = WorkerPool::new(Some(2)).unwrap();
        assert!(pool.is_owned());
        let name = pool
            .block_on(pool.run(async { std::thread::current().name().map(str::to_string) }))
            .unwrap();
        assert_eq!(name.as_deref(), Some(WORKER_THREAD_NAME));
        pool.shutdown();
    }

    #[test]
    fn test_run_blocking() {
        let pool = WorkerPool::new(Some(1)).unwrap();
        let value = pool.block_on(pool.run_blocking(|| 40 + 2)).unwrap();
        assert_eq!(value, 42);
        pool.shutdown();
    }

    #[tokio::test]
    async fn test_current_handle() {
        let pool = WorkerPool::current().unwrap();
        assert!(!pool.is_owned());
        assert_eq!(pool.run(async { 7 }).await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_panics_surface_as_io() {
        let pool = WorkerPool::current().unwrap();
        let err = pool
            .run_blocking(|| -> u32 { panic!("boom") })
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Io(_)));
    }

    #[test]
    fn test_current_outside_runtime() {
        assert!(WorkerPool::current().is_err());
    }
}
