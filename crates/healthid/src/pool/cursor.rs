use parking_lot::Mutex;

use crate::{
    checksum::Hid,
    error::{Error, Result, ValidationError},
    pool::PoolEntry,
    store::{Durability, ReservationStore, Store, WriteOutcome},
};

/// Default number of entries scanned per page.
pub const DEFAULT_PAGE_SIZE: usize = 10_000;

/// Default number of compare-and-set attempts before a page request gives up.
pub const DEFAULT_CURSOR_RETRIES: u32 = 16;

/// A resumable, forward-only iterator over one partition of the pool.
///
/// The position lives in the store as a versioned
/// [`CursorRecord`](crate::CursorRecord), not in this value. Any number of
/// cursors (in one process or many) may share a partition: a page is only
/// handed out after the cursor moved the persisted marker past it with a
/// compare-and-set, so two cursors never serve the same entry.
///
/// Scan order is the store's `(token, hid)` order. It is stable but unrelated
/// to numeric HID order.
pub struct PoolCursor<S> {
    store: ReservationStore<S>,
    partition: String,
    max_attempts: u32,
    last_served: Mutex<Option<Hid>>,
}

impl<S: Store> PoolCursor<S> {
    pub fn new(store: ReservationStore<S>, partition: impl Into<String>) -> Self {
        Self {
            store,
            partition: partition.into(),
            max_attempts: DEFAULT_CURSOR_RETRIES,
            last_served: Mutex::new(None),
        }
    }

    /// Bounds how many compare-and-set attempts one call makes. Zero is
    /// treated as one.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn partition(&self) -> &str {
        &self.partition
    }

    /// The marker this cursor most recently observed or wrote.
    pub fn last_served(&self) -> Option<Hid> {
        self.last_served.lock().clone()
    }

    /// Returns the next unserved, unused entries after the persisted marker.
    ///
    /// At most `page_size` entries are scanned; entries already marked used
    /// are skipped, so a page can be shorter than `page_size`.
    ///
    /// # Errors
    ///
    /// - [`ValidationError::InvalidPageSize`] if `page_size` is zero.
    /// - [`Error::PoolExhausted`] if nothing is left after the marker.
    /// - [`Error::CursorContention`] if other cursors kept winning the
    ///   compare-and-set.
    /// - [`Error::StoreUnavailable`] on a store failure. The marker is left
    ///   where it was, unless the failure came after the compare-and-set.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(level = "debug", skip(self), fields(partition = %self.partition))
    )]
    pub async fn next_page(&self, page_size: usize) -> Result<Vec<PoolEntry>> {
        if page_size == 0 {
            return Err(ValidationError::InvalidPageSize.into());
        }

        let mut conflicts = 0;
        loop {
            let record = self.store.load_cursor(&self.partition).await?;
            let scanned = self
                .store
                .scan_entries(&self.partition, record.marker.as_ref(), page_size)
                .await?;

            let Some(last) = scanned.last() else {
                *self.last_served.lock() = record.marker;
                return Err(Error::PoolExhausted);
            };
            let marker = last.hid.clone();

            let advanced = self
                .store
                .compare_and_set_cursor(&self.partition, record.version, Some(marker.clone()))
                .await?;
            if !advanced {
                conflicts += 1;
                if conflicts >= self.max_attempts {
                    #[cfg(feature = "tracing")]
                    tracing::warn!("Cursor gave up after {conflicts} conflicting updates");
                    return Err(Error::CursorContention {
                        attempts: conflicts,
                    });
                }
                tokio::task::yield_now().await;
                continue;
            }

            *self.last_served.lock() = Some(marker);
            let page: Vec<PoolEntry> = scanned.into_iter().filter(|e| !e.is_used).collect();
            if page.is_empty() {
                // Every scanned entry was already used; keep scanning.
                continue;
            }

            #[cfg(feature = "tracing")]
            tracing::debug!("Served {} entries", page.len());
            return Ok(page);
        }
    }

    /// Clears the persisted marker so the next page starts from the
    /// beginning of the partition.
    ///
    /// # Errors
    ///
    /// [`Error::CursorContention`] or [`Error::StoreUnavailable`], as for
    /// [`PoolCursor::next_page`].
    pub async fn reset_cursor(&self) -> Result<()> {
        for _ in 0..self.max_attempts {
            let record = self.store.load_cursor(&self.partition).await?;
            if self
                .store
                .compare_and_set_cursor(&self.partition, record.version, None)
                .await?
            {
                *self.last_served.lock() = None;
                #[cfg(feature = "tracing")]
                tracing::info!("Cursor of {} reset", self.partition);
                return Ok(());
            }
            tokio::task::yield_now().await;
        }
        Err(Error::CursorContention {
            attempts: self.max_attempts,
        })
    }

    /// Deletes the entry for `hid`. Deleting a missing entry is a no-op.
    pub async fn remove_entry(&self, hid: &Hid, durability: Durability) -> Result<WriteOutcome> {
        self.store.delete_entry(hid.clone(), durability).await
    }

    /// Flags the entry for `hid` as used at `used_at`.
    ///
    /// A missing or already-used entry is left untouched and reported as
    /// [`WriteOutcome::Unchanged`].
    pub async fn mark_consumed(
        &self,
        hid: &Hid,
        used_at: u64,
        durability: Durability,
    ) -> Result<WriteOutcome> {
        let Some(mut entry) = self.store.find_entry(hid).await? else {
            return Ok(WriteOutcome::Unchanged);
        };
        if entry.is_used {
            return Ok(WriteOutcome::Unchanged);
        }
        entry.mark_used(used_at);
        self.store.update_entry(entry, durability).await
    }
}
