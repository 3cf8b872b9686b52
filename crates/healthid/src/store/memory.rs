use core::{ops::Bound, time::Duration};
use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
};

use parking_lot::Mutex;

use crate::{
    block::{BlockKey, GeneratedBlock},
    checksum::Hid,
    error::StoreError,
    pool::{CursorRecord, PoolEntry},
    store::{Store, StoreResult, Token},
};

#[derive(Default)]
struct State {
    entries: HashMap<Hid, PoolEntry>,
    // partition -> scan order
    partitions: HashMap<String, BTreeSet<(Token, Hid)>>,
    blocks: BTreeMap<BlockKey, GeneratedBlock>,
    cursors: HashMap<String, CursorRecord>,
}

impl State {
    fn index(&mut self, entry: &PoolEntry) {
        self.partitions
            .entry(entry.allocated_for.clone())
            .or_default()
            .insert((Token::of(&entry.hid), entry.hid.clone()));
    }

    fn unindex(&mut self, entry: &PoolEntry) {
        if let Some(set) = self.partitions.get_mut(&entry.allocated_for) {
            set.remove(&(Token::of(&entry.hid), entry.hid.clone()));
        }
    }

    fn insert_entry(&mut self, entry: PoolEntry) -> bool {
        if self.entries.contains_key(&entry.hid) {
            return false;
        }
        self.index(&entry);
        self.entries.insert(entry.hid.clone(), entry);
        true
    }
}

struct Inner {
    state: Mutex<State>,
    available: AtomicBool,
    latency_ms: AtomicU64,
}

/// In-process [`Store`] backend.
///
/// Clones share the same data. Conditional operations are atomic because
/// every operation runs under one mutex.
///
/// For tests, [`MemoryStore::set_available`] and [`MemoryStore::set_latency`]
/// simulate a partitioned or slow replica.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::default()),
                available: AtomicBool::new(true),
                latency_ms: AtomicU64::new(0),
            }),
        }
    }

    /// While unavailable, every operation fails with
    /// [`StoreError::Unavailable`].
    pub fn set_available(&self, available: bool) {
        self.inner.available.store(available, Ordering::SeqCst);
    }

    /// Delays every operation by `latency` before it touches the data.
    pub fn set_latency(&self, latency: Duration) {
        self.inner
            .latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn entry_count(&self) -> usize {
        self.inner.state.lock().entries.len()
    }

    pub fn block_count(&self) -> usize {
        self.inner.state.lock().blocks.len()
    }

    async fn gate(&self) -> StoreResult<()> {
        let latency = self.inner.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        if self.inner.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("replica unreachable".to_string()))
        }
    }
}

impl Store for MemoryStore {
    async fn insert_entry_if_absent(&self, entry: PoolEntry) -> StoreResult<bool> {
        self.gate().await?;
        Ok(self.inner.state.lock().insert_entry(entry))
    }

    async fn insert_entries_if_absent(&self, entries: Vec<PoolEntry>) -> StoreResult<usize> {
        self.gate().await?;
        let mut state = self.inner.state.lock();
        Ok(entries
            .into_iter()
            .map(|entry| usize::from(state.insert_entry(entry)))
            .sum())
    }

    async fn find_entry(&self, hid: &Hid) -> StoreResult<Option<PoolEntry>> {
        self.gate().await?;
        Ok(self.inner.state.lock().entries.get(hid).cloned())
    }

    async fn update_entry(&self, entry: PoolEntry) -> StoreResult<bool> {
        self.gate().await?;
        let mut state = self.inner.state.lock();
        let Some(old) = state.entries.get(&entry.hid).cloned() else {
            return Ok(false);
        };
        if old.allocated_for != entry.allocated_for {
            state.unindex(&old);
            state.index(&entry);
        }
        state.entries.insert(entry.hid.clone(), entry);
        Ok(true)
    }

    async fn delete_entry(&self, hid: &Hid) -> StoreResult<bool> {
        self.gate().await?;
        let mut state = self.inner.state.lock();
        match state.entries.remove(hid) {
            Some(entry) => {
                state.unindex(&entry);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn scan_entries(
        &self,
        partition: &str,
        after: Option<&Hid>,
        limit: usize,
    ) -> StoreResult<Vec<PoolEntry>> {
        self.gate().await?;
        let state = self.inner.state.lock();
        let Some(set) = state.partitions.get(partition) else {
            return Ok(Vec::new());
        };
        let lower = match after {
            Some(hid) => Bound::Excluded((Token::of(hid), hid.clone())),
            None => Bound::Unbounded,
        };
        Ok(set
            .range((lower, Bound::Unbounded))
            .take(limit)
            .filter_map(|(_, hid)| state.entries.get(hid).cloned())
            .collect())
    }

    async fn insert_block_if_absent(&self, block: GeneratedBlock) -> StoreResult<bool> {
        self.gate().await?;
        let mut state = self.inner.state.lock();
        let key = block.key();
        if state.blocks.contains_key(&key) {
            return Ok(false);
        }
        state.blocks.insert(key, block);
        Ok(true)
    }

    async fn find_block(&self, key: &BlockKey) -> StoreResult<Option<GeneratedBlock>> {
        self.gate().await?;
        Ok(self.inner.state.lock().blocks.get(key).cloned())
    }

    async fn delete_block(&self, key: &BlockKey) -> StoreResult<bool> {
        self.gate().await?;
        Ok(self.inner.state.lock().blocks.remove(key).is_some())
    }

    async fn blocks_in_series(&self, owner: &str, series_no: u64) -> StoreResult<Vec<GeneratedBlock>> {
        self.gate().await?;
        let state = self.inner.state.lock();
        let from = BlockKey {
            owner: owner.to_string(),
            begins_at: 0,
            ends_at: 0,
        };
        Ok(state
            .blocks
            .range(from..)
            .take_while(|(key, _)| key.owner == owner)
            .filter(|(_, block)| block.series_no == series_no)
            .map(|(_, block)| block.clone())
            .collect())
    }

    async fn load_cursor(&self, partition: &str) -> StoreResult<CursorRecord> {
        self.gate().await?;
        Ok(self
            .inner
            .state
            .lock()
            .cursors
            .get(partition)
            .cloned()
            .unwrap_or_default())
    }

    async fn compare_and_set_cursor(
        &self,
        partition: &str,
        expected_version: u64,
        marker: Option<Hid>,
    ) -> StoreResult<bool> {
        self.gate().await?;
        let mut state = self.inner.state.lock();
        let cursor = state.cursors.entry(partition.to_string()).or_default();
        if cursor.version != expected_version {
            return Ok(false);
        }
        cursor.marker = marker;
        cursor.version += 1;
        Ok(true)
    }
}
