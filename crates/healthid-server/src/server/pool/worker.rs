use crate::server::{
    pool::request::{BlockOwner, WorkRequest},
    service::config::Engine,
};
use core::future::Future;
use healthid::{Error, Result};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

/// Worker task processing [`WorkRequest`] messages against the shared
/// [`Engine`].
///
/// Runs until a [`WorkRequest::Shutdown`] arrives or every sender is dropped.
/// Work still running when `cancelled` fires is abandoned: the caller
/// receives [`Error::StoreUnavailable`] and writes already dispatched stay
/// in the store.
pub async fn worker_loop(
    worker_id: usize,
    mut rx: mpsc::Receiver<WorkRequest>,
    engine: Arc<Engine>,
    cancelled: CancellationToken,
) {
    #[cfg(feature = "tracing")]
    tracing::trace!("Worker {worker_id} started");

    while let Some(work) = rx.recv().await {
        match work {
            WorkRequest::Block {
                owner,
                start,
                count,
                actor,
                response,
            } => {
                let issue = async {
                    match &owner {
                        BlockOwner::Mci => engine.issue_mci_block(start, count, &actor).await,
                        BlockOwner::Organization(code) => {
                            engine.issue_org_block(code, start, count, &actor).await
                        }
                    }
                };
                let result = run_cancellable(&cancelled, issue).await;
                reply(worker_id, response, result);
            }
            WorkRequest::Generate { actor, response } => {
                let result = run_cancellable(&cancelled, engine.issue_all(&actor)).await;
                reply(worker_id, response, result);
            }
            WorkRequest::Page { size, response } => {
                let result = run_cancellable(&cancelled, engine.issue_pool_page(size)).await;
                reply(worker_id, response, result);
            }
            WorkRequest::ResetCursor { response } => {
                let result = run_cancellable(&cancelled, engine.reset_cursor()).await;
                reply(worker_id, response, result);
            }
            WorkRequest::Shutdown { response } => {
                #[cfg(feature = "tracing")]
                tracing::debug!("Worker {worker_id} received shutdown signal");

                if response.send(()).is_err() {
                    #[cfg(feature = "tracing")]
                    tracing::error!("Worker {worker_id} failed to acknowledge shutdown");
                }
                break;
            }
        }
    }

    #[cfg(feature = "tracing")]
    tracing::trace!("Worker {worker_id} stopped");
}

async fn run_cancellable<T>(
    cancelled: &CancellationToken,
    work: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::select! {
        biased;
        () = cancelled.cancelled() => Err(Error::StoreUnavailable {
            context: "service is shutting down".to_string(),
        }),
        result = work => result,
    }
}

fn reply<T>(_worker_id: usize, response: oneshot::Sender<Result<T>>, result: Result<T>) {
    if response.send(result).is_err() {
        #[cfg(feature = "tracing")]
        tracing::debug!("Worker {_worker_id} finished a request whose caller went away");
    }
}
