use core::future::Future;

use crate::{
    block::{BlockKey, GeneratedBlock},
    checksum::Hid,
    error::StoreError,
    pool::{CursorRecord, PoolEntry},
};

pub type StoreResult<T> = Result<T, StoreError>;

/// Backend contract for the records the engine persists.
///
/// Every method is a single-row operation (or a bounded scan), so a failure
/// never leaves a record half-written. Implementations must make the
/// conditional methods atomic with respect to each other.
pub trait Store: Send + Sync + 'static {
    /// Inserts `entry` unless an entry with the same HID exists.
    ///
    /// Returns `true` if the entry was inserted.
    fn insert_entry_if_absent(
        &self,
        entry: PoolEntry,
    ) -> impl Future<Output = StoreResult<bool>> + Send;

    /// Batch form of [`Store::insert_entry_if_absent`].
    ///
    /// Returns how many entries were newly inserted.
    fn insert_entries_if_absent(
        &self,
        entries: Vec<PoolEntry>,
    ) -> impl Future<Output = StoreResult<usize>> + Send;

    fn find_entry(&self, hid: &Hid) -> impl Future<Output = StoreResult<Option<PoolEntry>>> + Send;

    /// Replaces an existing entry. Returns `false` if the entry is gone.
    fn update_entry(&self, entry: PoolEntry) -> impl Future<Output = StoreResult<bool>> + Send;

    /// Returns `false` if the entry was already gone.
    fn delete_entry(&self, hid: &Hid) -> impl Future<Output = StoreResult<bool>> + Send;

    /// Up to `limit` entries of `partition` strictly after `after` in
    /// `(token, hid)` order, or from the beginning if `after` is `None`.
    fn scan_entries(
        &self,
        partition: &str,
        after: Option<&Hid>,
        limit: usize,
    ) -> impl Future<Output = StoreResult<Vec<PoolEntry>>> + Send;

    /// Inserts `block` unless a summary with the same [`BlockKey`] exists.
    fn insert_block_if_absent(
        &self,
        block: GeneratedBlock,
    ) -> impl Future<Output = StoreResult<bool>> + Send;

    fn find_block(
        &self,
        key: &BlockKey,
    ) -> impl Future<Output = StoreResult<Option<GeneratedBlock>>> + Send;

    fn delete_block(&self, key: &BlockKey) -> impl Future<Output = StoreResult<bool>> + Send;

    /// Summaries recorded for `owner` in the sub-block `series_no`, ordered by
    /// `begins_at`.
    fn blocks_in_series(
        &self,
        owner: &str,
        series_no: u64,
    ) -> impl Future<Output = StoreResult<Vec<GeneratedBlock>>> + Send;

    /// Current cursor of `partition`; the default record if none was written.
    fn load_cursor(&self, partition: &str)
    -> impl Future<Output = StoreResult<CursorRecord>> + Send;

    /// Sets the marker of `partition` and bumps its version, but only if the
    /// stored version still equals `expected_version`.
    ///
    /// Returns `false` when another writer got there first.
    fn compare_and_set_cursor(
        &self,
        partition: &str,
        expected_version: u64,
        marker: Option<Hid>,
    ) -> impl Future<Output = StoreResult<bool>> + Send;
}
