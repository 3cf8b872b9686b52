//! Asynchronous worker pool for engine requests.
//!
//! [`WorkerPool`] owns the senders of every worker. Page and cursor requests
//! always go to worker 0, so one task owns the pool cursor of this process
//! and its pages are served in order. Block requests are distributed
//! round-robin over the remaining workers, and only share worker 0 when the
//! pool has a single worker.

use crate::server::{pool::request::WorkRequest, service::error::ApiError, service::handler::Lifecycle};
use core::time::Duration;
use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};
use tokio::{
    sync::{mpsc, oneshot},
    time::{sleep, timeout},
};
use tokio_util::sync::CancellationToken;

/// Worker that owns the pool cursor.
pub const CURSOR_WORKER: usize = 0;

/// A cooperative pool of asynchronous workers that process [`WorkRequest`]s.
pub struct WorkerPool {
    workers: Vec<mpsc::Sender<WorkRequest>>,
    next_worker: AtomicUsize,
    shutdown_token: CancellationToken,
    shutdown_timeout: Duration,
    lifecycle: Arc<Lifecycle>,
}

impl WorkerPool {
    pub const fn new(
        workers: Vec<mpsc::Sender<WorkRequest>>,
        shutdown_token: CancellationToken,
        shutdown_timeout: Duration,
        lifecycle: Arc<Lifecycle>,
    ) -> Self {
        Self {
            workers,
            next_worker: AtomicUsize::new(0),
            shutdown_token,
            shutdown_timeout,
            lifecycle,
        }
    }

    /// Returns the index of the next worker to receive block work
    /// (round-robin, skipping [`CURSOR_WORKER`] when another worker exists).
    pub fn next_worker_index(&self) -> usize {
        let ticket = self.next_worker.fetch_add(1, Ordering::Relaxed);
        match self.workers.len() {
            0 | 1 => CURSOR_WORKER,
            n => CURSOR_WORKER + 1 + ticket % (n - 1),
        }
    }

    /// Sends a [`WorkRequest`] to the next worker in the pool.
    ///
    /// # Errors
    ///
    /// - [`ApiError::ServiceShutdown`] once shutdown began.
    /// - [`ApiError::ChannelError`] if the worker's channel is closed.
    pub async fn send_to_next_worker(&self, request: WorkRequest) -> Result<(), ApiError> {
        self.send_to_worker(self.next_worker_index(), request).await
    }

    /// Sends a [`WorkRequest`] to the worker owning the pool cursor.
    pub async fn send_to_cursor_worker(&self, request: WorkRequest) -> Result<(), ApiError> {
        self.send_to_worker(CURSOR_WORKER, request).await
    }

    async fn send_to_worker(&self, worker_idx: usize, request: WorkRequest) -> Result<(), ApiError> {
        if self.shutdown_token.is_cancelled() {
            return Err(ApiError::ServiceShutdown);
        }

        match self.workers[worker_idx].send(request).await {
            Ok(()) => Ok(()),
            Err(_) => Err(ApiError::ChannelError {
                context: format!("Worker {worker_idx} channel closed"),
            }),
        }
    }

    /// Gracefully shuts down all workers in the pool.
    ///
    /// - Refuses new requests.
    /// - Waits up to the shutdown timeout for in-flight requests to drain.
    /// - Cancels the shared [`CancellationToken`] to abandon remaining work.
    /// - Sends a [`WorkRequest::Shutdown`] to each worker and waits (up to 3
    ///   seconds per worker) for the acknowledgements.
    pub async fn shutdown(&self) {
        // === Phase 0: Stop accepting new requests ===
        #[cfg(feature = "tracing")]
        tracing::info!("Refusing new requests");
        self.lifecycle.begin_shutdown();

        // === Phase 1: Wait for in-flight requests to drain ===
        #[cfg(feature = "tracing")]
        tracing::info!(
            "Draining in-flight requests ({} active)",
            self.lifecycle.in_flight()
        );
        let drain_result = timeout(self.shutdown_timeout, async {
            while self.lifecycle.in_flight() > 0 {
                sleep(Duration::from_millis(100)).await;
            }
        })
        .await;

        match drain_result {
            Ok(()) => {
                #[cfg(feature = "tracing")]
                tracing::debug!("All in-flight requests drained successfully");
            }
            Err(_) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(
                    "Graceful drain timed out ({} requests still active)",
                    self.lifecycle.in_flight()
                );
            }
        }

        // === Phase 2: Cancel any remaining work ===
        #[cfg(feature = "tracing")]
        tracing::debug!("Cancelling remaining work via shutdown token");
        self.shutdown_token.cancel();

        // === Phase 3: Notify workers to shut down ===
        #[cfg(feature = "tracing")]
        tracing::debug!("Notifying all workers to shut down");
        let mut shutdown_handles = Vec::with_capacity(self.workers.len());

        for (i, worker) in self.workers.iter().enumerate() {
            let (tx, rx) = oneshot::channel();
            if let Err(_e) = worker.send(WorkRequest::Shutdown { response: tx }).await {
                #[cfg(feature = "tracing")]
                tracing::error!("Failed to send shutdown to worker {i}: {_e}");
            } else {
                shutdown_handles.push((i, rx));
            }
        }

        let timeout_futures = shutdown_handles.into_iter().map(|(_i, rx)| async move {
            match timeout(Duration::from_secs(3), rx).await {
                Ok(Ok(())) => {
                    #[cfg(feature = "tracing")]
                    tracing::trace!("Worker {_i} shutdown acknowledged");
                }
                Ok(Err(_e)) => {
                    #[cfg(feature = "tracing")]
                    tracing::error!("Worker {_i} returned error: {_e}");
                }
                Err(_) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!("Worker {_i} shutdown timed out");
                }
            }
        });

        futures::future::join_all(timeout_futures).await;

        #[cfg(feature = "tracing")]
        tracing::info!("Worker pool shutdown complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(workers: usize) -> (WorkerPool, Vec<mpsc::Receiver<WorkRequest>>) {
        let (senders, receivers): (Vec<_>, Vec<_>) = (0..workers).map(|_| mpsc::channel(1)).unzip();
        let pool = WorkerPool::new(
            senders,
            CancellationToken::new(),
            Duration::from_secs(1),
            Arc::new(Lifecycle::default()),
        );
        (pool, receivers)
    }

    #[test]
    fn block_work_skips_the_cursor_worker() {
        let (pool, _receivers) = pool(4);
        let picked: Vec<usize> = (0..6).map(|_| pool.next_worker_index()).collect();
        assert_eq!(picked, vec![1, 2, 3, 1, 2, 3]);
    }

    #[test]
    fn single_worker_serves_everything() {
        let (pool, _receivers) = pool(1);
        assert_eq!(pool.next_worker_index(), CURSOR_WORKER);
        assert_eq!(pool.next_worker_index(), CURSOR_WORKER);
    }
}
