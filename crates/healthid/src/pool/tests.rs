use core::time::Duration;
use std::{collections::HashSet, sync::Arc};

use futures::future::join_all;

use crate::{
    Durability, Error, Hid, MemoryStore, PoolCursor, PoolEntry, ReservationStore, Store,
    ValidationError, WriteOutcome,
};

fn hid(n: u64) -> Hid {
    Hid::format(n, 6).unwrap()
}

async fn seeded(partition: &str, numbers: core::ops::Range<u64>) -> (MemoryStore, ReservationStore<MemoryStore>) {
    let store = MemoryStore::new();
    store
        .insert_entries_if_absent(numbers.map(|n| PoolEntry::new(hid(n), partition, 1)).collect())
        .await
        .unwrap();
    let reservations = ReservationStore::new(store.clone(), Duration::from_secs(1));
    (store, reservations)
}

async fn drain(cursor: &PoolCursor<MemoryStore>, page_size: usize) -> Vec<Hid> {
    let mut served = Vec::new();
    loop {
        match cursor.next_page(page_size).await {
            Ok(page) => served.extend(page.into_iter().map(|e| e.hid)),
            Err(Error::PoolExhausted) => return served,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
}

#[tokio::test]
async fn empty_pool_is_exhausted() {
    let (_, reservations) = seeded("MCI", 0..0).await;
    let cursor = PoolCursor::new(reservations, "MCI");
    assert_eq!(cursor.next_page(10).await, Err(Error::PoolExhausted));
    assert_eq!(cursor.last_served(), None);
}

#[tokio::test]
async fn zero_page_size_is_rejected() {
    let (_, reservations) = seeded("MCI", 0..10).await;
    let cursor = PoolCursor::new(reservations, "MCI");
    assert_eq!(
        cursor.next_page(0).await,
        Err(Error::Validation(ValidationError::InvalidPageSize))
    );
}

#[tokio::test]
async fn pages_advance_monotonically_until_exhausted() {
    let (store, reservations) = seeded("MCI", 0..25).await;
    let cursor = PoolCursor::new(reservations, "MCI");

    let first = cursor.next_page(10).await.unwrap();
    let second = cursor.next_page(10).await.unwrap();
    let third = cursor.next_page(10).await.unwrap();
    assert_eq!((first.len(), second.len(), third.len()), (10, 10, 5));
    assert_eq!(cursor.next_page(10).await, Err(Error::PoolExhausted));

    // Pages come back in the store's scan order.
    let order = store.scan_entries("MCI", None, 100).await.unwrap();
    let served: Vec<_> = first.into_iter().chain(second).chain(third).collect();
    assert_eq!(served, order);
    assert_eq!(cursor.last_served(), Some(order[24].hid.clone()));
}

#[tokio::test]
async fn reset_starts_over() {
    let (_, reservations) = seeded("MCI", 0..5).await;
    let cursor = PoolCursor::new(reservations, "MCI");

    let before = drain(&cursor, 2).await;
    assert_eq!(before.len(), 5);

    cursor.reset_cursor().await.unwrap();
    assert_eq!(cursor.last_served(), None);
    let after = drain(&cursor, 2).await;
    assert_eq!(before, after);
}

#[tokio::test]
async fn position_survives_a_new_cursor_instance() {
    let (_, reservations) = seeded("MCI", 0..20).await;
    let first = PoolCursor::new(reservations.clone(), "MCI");
    let page = first.next_page(8).await.unwrap();

    let resumed = PoolCursor::new(reservations, "MCI");
    let rest = drain(&resumed, 8).await;
    assert_eq!(rest.len(), 12);
    assert!(page.iter().all(|e| !rest.contains(&e.hid)));
}

#[tokio::test]
async fn used_entries_are_skipped() {
    let (store, reservations) = seeded("MCI", 0..6).await;
    let order = store.scan_entries("MCI", None, 10).await.unwrap();
    let cursor = PoolCursor::new(reservations, "MCI");

    // The whole first page is used, so the cursor moves on to the next one.
    for entry in &order[..3] {
        cursor
            .mark_consumed(&entry.hid, 9, Durability::Synchronous)
            .await
            .unwrap();
    }
    let page = cursor.next_page(3).await.unwrap();
    assert_eq!(page, order[3..].to_vec());
}

#[tokio::test]
async fn partitions_are_independent() {
    let store = MemoryStore::new();
    for n in 0..4 {
        store.insert_entry_if_absent(PoolEntry::new(hid(n), "MCI", 1)).await.unwrap();
        store.insert_entry_if_absent(PoolEntry::new(hid(100 + n), "ORG", 1)).await.unwrap();
    }
    let reservations = ReservationStore::new(store, Duration::from_secs(1));
    let mci = PoolCursor::new(reservations.clone(), "MCI");
    let org = PoolCursor::new(reservations, "ORG");

    let served = drain(&mci, 10).await;
    assert!(served.iter().all(|h| h.number().unwrap() < 100));
    assert_eq!(drain(&org, 10).await.len(), 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_cursors_never_serve_an_entry_twice() {
    let (_, reservations) = seeded("MCI", 0..2_000).await;

    let cursors: Vec<_> = (0..8)
        .map(|_| Arc::new(PoolCursor::new(reservations.clone(), "MCI").with_max_attempts(10_000)))
        .collect();
    let tasks = cursors.into_iter().map(|cursor| {
        tokio::spawn(async move { drain(&cursor, 17).await })
    });

    let mut seen = HashSet::new();
    let mut total = 0;
    for served in join_all(tasks).await {
        for hid in served.unwrap() {
            total += 1;
            assert!(seen.insert(hid), "entry served twice");
        }
    }
    assert_eq!(total, 2_000);
}

#[tokio::test]
async fn contention_is_reported_after_bounded_attempts() {
    struct Stubborn(MemoryStore);

    impl Store for Stubborn {
        async fn insert_entry_if_absent(&self, entry: PoolEntry) -> crate::StoreResult<bool> {
            self.0.insert_entry_if_absent(entry).await
        }
        async fn insert_entries_if_absent(&self, entries: Vec<PoolEntry>) -> crate::StoreResult<usize> {
            self.0.insert_entries_if_absent(entries).await
        }
        async fn find_entry(&self, hid: &Hid) -> crate::StoreResult<Option<PoolEntry>> {
            self.0.find_entry(hid).await
        }
        async fn update_entry(&self, entry: PoolEntry) -> crate::StoreResult<bool> {
            self.0.update_entry(entry).await
        }
        async fn delete_entry(&self, hid: &Hid) -> crate::StoreResult<bool> {
            self.0.delete_entry(hid).await
        }
        async fn scan_entries(
            &self,
            partition: &str,
            after: Option<&Hid>,
            limit: usize,
        ) -> crate::StoreResult<Vec<PoolEntry>> {
            self.0.scan_entries(partition, after, limit).await
        }
        async fn insert_block_if_absent(&self, block: crate::GeneratedBlock) -> crate::StoreResult<bool> {
            self.0.insert_block_if_absent(block).await
        }
        async fn find_block(&self, key: &crate::BlockKey) -> crate::StoreResult<Option<crate::GeneratedBlock>> {
            self.0.find_block(key).await
        }
        async fn delete_block(&self, key: &crate::BlockKey) -> crate::StoreResult<bool> {
            self.0.delete_block(key).await
        }
        async fn blocks_in_series(
            &self,
            owner: &str,
            series_no: u64,
        ) -> crate::StoreResult<Vec<crate::GeneratedBlock>> {
            self.0.blocks_in_series(owner, series_no).await
        }
        async fn load_cursor(&self, partition: &str) -> crate::StoreResult<crate::CursorRecord> {
            self.0.load_cursor(partition).await
        }
        async fn compare_and_set_cursor(
            &self,
            _partition: &str,
            _expected_version: u64,
            _marker: Option<Hid>,
        ) -> crate::StoreResult<bool> {
            Ok(false)
        }
    }

    let store = MemoryStore::new();
    store.insert_entry_if_absent(PoolEntry::new(hid(1), "MCI", 1)).await.unwrap();
    let reservations = ReservationStore::new(Stubborn(store), Duration::from_secs(1));
    let cursor = PoolCursor::new(reservations, "MCI").with_max_attempts(3);

    let err = cursor.next_page(5).await.unwrap_err();
    assert_eq!(err, Error::CursorContention { attempts: 3 });
    assert!(err.is_transient());
    assert_eq!(cursor.last_served(), None);
}

#[tokio::test]
async fn remove_and_mark_are_idempotent() {
    let (store, reservations) = seeded("MCI", 0..3).await;
    let cursor = PoolCursor::new(reservations, "MCI");
    let target = hid(1);

    assert_eq!(
        cursor.mark_consumed(&target, 50, Durability::Synchronous).await.unwrap(),
        WriteOutcome::Applied
    );
    assert_eq!(
        cursor.mark_consumed(&target, 60, Durability::Synchronous).await.unwrap(),
        WriteOutcome::Unchanged
    );
    let entry = store.find_entry(&target).await.unwrap().unwrap();
    assert!(entry.is_used);
    assert_eq!(entry.used_at, Some(50));

    assert_eq!(
        cursor.remove_entry(&target, Durability::Synchronous).await.unwrap(),
        WriteOutcome::Applied
    );
    assert_eq!(
        cursor.remove_entry(&target, Durability::Synchronous).await.unwrap(),
        WriteOutcome::Unchanged
    );
    assert_eq!(
        cursor.mark_consumed(&target, 70, Durability::Synchronous).await.unwrap(),
        WriteOutcome::Unchanged
    );
    assert_eq!(store.entry_count(), 2);
}
