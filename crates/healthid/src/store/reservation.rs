use core::{future::Future, time::Duration};
use std::sync::Arc;

use tokio::time::timeout;
use tokio_util::task::TaskTracker;

use crate::{
    block::{BlockKey, GeneratedBlock},
    checksum::Hid,
    error::{Result, StoreError},
    pool::{CursorRecord, PoolEntry},
    store::{Store, StoreResult},
};

/// Default bound on a single synchronous store call.
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(5);

/// How long a mutating call waits for the backend.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Durability {
    /// Dispatch the write and return immediately. Failures are only visible
    /// in logs.
    #[default]
    FireAndForget,
    /// Wait for the backend to acknowledge the write.
    Synchronous,
}

/// What a mutating call observed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The write changed the store.
    Applied,
    /// The write was a no-op: the row already existed (inserts) or was
    /// already gone (updates and deletes).
    Unchanged,
    /// Fire-and-forget: the write was handed to the runtime and its outcome
    /// is unknown to the caller.
    Dispatched,
}

impl WriteOutcome {
    const fn from_applied(applied: bool) -> Self {
        if applied { Self::Applied } else { Self::Unchanged }
    }
}

/// A [`Store`] backend plus the call discipline the engine relies on.
///
/// - Every synchronous call is bounded by a timeout and fails with
///   [`StoreError::Timeout`] on expiry instead of blocking.
/// - Mutations take a [`Durability`]. Fire-and-forget writes are spawned on
///   the current tokio runtime and tracked, so [`ReservationStore::settle`]
///   can wait for them during shutdown.
/// - Nothing is retried here. A retried write could land twice.
pub struct ReservationStore<S> {
    backend: Arc<S>,
    timeout: Duration,
    pending: TaskTracker,
}

impl<S> Clone for ReservationStore<S> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            timeout: self.timeout,
            pending: self.pending.clone(),
        }
    }
}

impl<S: Store> ReservationStore<S> {
    pub fn new(backend: S, timeout: Duration) -> Self {
        Self::from_arc(Arc::new(backend), timeout)
    }

    pub fn from_arc(backend: Arc<S>, timeout: Duration) -> Self {
        Self {
            backend,
            timeout,
            pending: TaskTracker::new(),
        }
    }

    pub fn backend(&self) -> &S {
        &self.backend
    }

    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Number of fire-and-forget writes still in flight.
    pub fn pending_writes(&self) -> usize {
        self.pending.len()
    }

    /// Waits until every fire-and-forget write dispatched so far completed.
    pub async fn settle(&self) {
        self.pending.close();
        self.pending.wait().await;
        self.pending.reopen();
    }

    async fn bounded<T>(
        &self,
        operation: &'static str,
        fut: impl Future<Output = StoreResult<T>>,
    ) -> StoreResult<T> {
        match timeout(self.timeout, fut).await {
            Ok(res) => res,
            Err(_) => Err(StoreError::Timeout {
                operation,
                millis: self.timeout.as_millis() as u64,
            }),
        }
    }

    /// Runs a mutation under the requested durability.
    ///
    /// `op` builds the backend call from an owned handle so the future can
    /// outlive the caller on the fire-and-forget path.
    async fn write<F, Fut>(
        &self,
        operation: &'static str,
        durability: Durability,
        op: F,
    ) -> Result<WriteOutcome>
    where
        F: FnOnce(Arc<S>) -> Fut + Send + 'static,
        Fut: Future<Output = StoreResult<bool>> + Send + 'static,
    {
        match durability {
            Durability::Synchronous => {
                let applied = self.bounded(operation, op(Arc::clone(&self.backend))).await?;
                Ok(WriteOutcome::from_applied(applied))
            }
            Durability::FireAndForget => {
                let fut = op(Arc::clone(&self.backend));
                let limit = self.timeout;
                self.pending.spawn(async move {
                    match timeout(limit, fut).await {
                        Ok(Ok(_)) => {}
                        Ok(Err(_e)) => {
                            #[cfg(feature = "tracing")]
                            tracing::warn!("Fire-and-forget {operation} failed: {_e}");
                        }
                        Err(_) => {
                            #[cfg(feature = "tracing")]
                            tracing::warn!("Fire-and-forget {operation} timed out");
                        }
                    }
                });
                Ok(WriteOutcome::Dispatched)
            }
        }
    }

    /// Seeds one pool entry without overwriting an existing one.
    pub async fn insert_if_absent(
        &self,
        entry: PoolEntry,
        durability: Durability,
    ) -> Result<WriteOutcome> {
        self.write("insert_if_absent", durability, move |backend| async move {
            backend.insert_entry_if_absent(entry).await
        })
        .await
    }

    /// Seeds a batch of pool entries without overwriting existing ones.
    ///
    /// On the synchronous path, returns how many entries were new.
    pub async fn insert_all_if_absent(
        &self,
        entries: Vec<PoolEntry>,
        durability: Durability,
    ) -> Result<Option<usize>> {
        match durability {
            Durability::Synchronous => {
                let inserted = self
                    .bounded("insert_all_if_absent", self.backend.insert_entries_if_absent(entries))
                    .await?;
                Ok(Some(inserted))
            }
            Durability::FireAndForget => {
                self.write("insert_all_if_absent", durability, move |backend| async move {
                    backend.insert_entries_if_absent(entries).await.map(|_| true)
                })
                .await?;
                Ok(None)
            }
        }
    }

    /// Records a block summary, at most once per [`BlockKey`].
    pub async fn insert_summary(
        &self,
        block: GeneratedBlock,
        durability: Durability,
    ) -> Result<WriteOutcome> {
        self.write("insert_summary", durability, move |backend| async move {
            backend.insert_block_if_absent(block).await
        })
        .await
    }

    pub async fn update_entry(
        &self,
        entry: PoolEntry,
        durability: Durability,
    ) -> Result<WriteOutcome> {
        self.write("update_entry", durability, move |backend| async move {
            backend.update_entry(entry).await
        })
        .await
    }

    pub async fn delete_entry(&self, hid: Hid, durability: Durability) -> Result<WriteOutcome> {
        self.write("delete_entry", durability, move |backend| async move {
            backend.delete_entry(&hid).await
        })
        .await
    }

    pub async fn delete_block(&self, key: BlockKey, durability: Durability) -> Result<WriteOutcome> {
        self.write("delete_block", durability, move |backend| async move {
            backend.delete_block(&key).await
        })
        .await
    }

    pub async fn find_entry(&self, hid: &Hid) -> Result<Option<PoolEntry>> {
        Ok(self.bounded("find_entry", self.backend.find_entry(hid)).await?)
    }

    pub async fn find_block(&self, key: &BlockKey) -> Result<Option<GeneratedBlock>> {
        Ok(self.bounded("find_block", self.backend.find_block(key)).await?)
    }

    pub async fn scan_entries(
        &self,
        partition: &str,
        after: Option<&Hid>,
        limit: usize,
    ) -> Result<Vec<PoolEntry>> {
        Ok(self
            .bounded("scan_entries", self.backend.scan_entries(partition, after, limit))
            .await?)
    }

    pub async fn blocks_in_series(&self, owner: &str, series_no: u64) -> Result<Vec<GeneratedBlock>> {
        Ok(self
            .bounded("blocks_in_series", self.backend.blocks_in_series(owner, series_no))
            .await?)
    }

    pub async fn load_cursor(&self, partition: &str) -> Result<CursorRecord> {
        Ok(self.bounded("load_cursor", self.backend.load_cursor(partition)).await?)
    }

    pub async fn compare_and_set_cursor(
        &self,
        partition: &str,
        expected_version: u64,
        marker: Option<Hid>,
    ) -> Result<bool> {
        Ok(self
            .bounded(
                "compare_and_set_cursor",
                self.backend
                    .compare_and_set_cursor(partition, expected_version, marker),
            )
            .await?)
    }
}
