use core::ops::Range;
use std::sync::Arc;

use crate::{
    block::GeneratedBlock,
    checksum::Hid,
    error::{Error, Result},
    pool::PoolEntry,
    series::{OwnerClass, SeriesRegistry, ValidatedRange},
    store::{Durability, ReservationStore, Store},
    time::TimeSource,
};

/// Number of pool entries written per backend call while seeding a block.
pub const DEFAULT_SEED_BATCH: usize = 10_000;

/// Turns validated requests into contiguous HID blocks.
///
/// For every number in the validated range the allocator seeds a pool entry
/// into the owner's partition, then records one [`GeneratedBlock`] summary.
/// Both writes are insert-if-absent, so a retried request converges on the
/// same rows instead of duplicating them.
///
/// The allocator keeps no mutable state of its own: consumption of a
/// sub-block is derived from the summaries already in the store. The summary
/// is therefore always written synchronously, whatever the requested
/// [`Durability`]; only pool seeding may be fire-and-forget.
pub struct BlockAllocator<S, T> {
    registry: Arc<SeriesRegistry>,
    store: ReservationStore<S>,
    clock: T,
    seed_batch: usize,
}

impl<S, T> BlockAllocator<S, T>
where
    S: Store,
    T: TimeSource,
{
    pub fn new(registry: Arc<SeriesRegistry>, store: ReservationStore<S>, clock: T) -> Self {
        Self {
            registry,
            store,
            clock,
            seed_batch: DEFAULT_SEED_BATCH,
        }
    }

    /// Overrides how many entries are written per seeding call. Zero is
    /// treated as one.
    pub fn with_seed_batch(mut self, seed_batch: usize) -> Self {
        self.seed_batch = seed_batch.max(1);
        self
    }

    pub fn registry(&self) -> &SeriesRegistry {
        &self.registry
    }

    pub const fn store(&self) -> &ReservationStore<S> {
        &self.store
    }

    /// Generates up to `count` HIDs for `owner`, starting at the sub-block
    /// that begins at `start`.
    ///
    /// The request is validated twice: once without touching the store, so
    /// malformed requests fail fast, and again against the blocks already
    /// recorded in the sub-block.
    ///
    /// # Errors
    ///
    /// - [`Error::UnknownOwner`] if `owner` has no series.
    /// - [`Error::Validation`] if the request is rejected; nothing is written.
    /// - [`Error::StoreUnavailable`] if a synchronous store call fails,
    ///   including the summary write. Entries seeded before the failure stay
    ///   in the pool.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(level = "debug", skip(self, remark))
    )]
    pub async fn generate_block(
        &self,
        owner: &str,
        expected: OwnerClass,
        start: u64,
        count: u64,
        remark: String,
        durability: Durability,
    ) -> Result<GeneratedBlock> {
        let series = self.registry.resolve_series(owner)?;
        self.registry
            .validate_request(series, expected, start, count, core::iter::empty::<Range<u64>>())?;

        let consumed = self.store.blocks_in_series(series.owner(), start).await?;
        let range = self.registry.validate_request(
            series,
            expected,
            start,
            count,
            consumed.iter().map(GeneratedBlock::range),
        )?;

        #[cfg(feature = "tracing")]
        tracing::debug!(
            "Allocating [{}, {}) in series {} of {}",
            range.begins_at,
            range.ends_at,
            range.series_no,
            range.owner
        );

        let generated_at = self.clock.current_millis();
        self.seed(&range, series.width(), generated_at, durability)
            .await?;

        let block = GeneratedBlock {
            series_no: range.series_no,
            owner: range.owner.clone(),
            begins_at: range.begins_at,
            ends_at: range.ends_at,
            total_generated: range.actual_count(),
            remark,
            generated_at,
        };
        self.store
            .insert_summary(block.clone(), Durability::Synchronous)
            .await?;

        #[cfg(feature = "tracing")]
        if range.is_partial() {
            tracing::info!(
                "Series {} of {} clamped request for {} HIDs to {}",
                range.series_no,
                range.owner,
                range.requested_count,
                range.actual_count()
            );
        }

        Ok(block)
    }

    /// Summaries already recorded for `owner` in the sub-block `series_no`.
    pub async fn blocks_in_series(&self, owner: &str, series_no: u64) -> Result<Vec<GeneratedBlock>> {
        let series = self.registry.resolve_series(owner)?;
        self.store.blocks_in_series(series.owner(), series_no).await
    }

    async fn seed(
        &self,
        range: &ValidatedRange,
        width: u32,
        generated_at: u64,
        durability: Durability,
    ) -> Result<()> {
        let mut batch = Vec::with_capacity(self.seed_batch.min(range.actual_count() as usize));
        for n in range.range() {
            let hid = Hid::format(n, width).ok_or_else(|| Error::InvalidConfig {
                reason: format!("{n} does not fit the {width}-digit width of {}", range.owner),
            })?;
            batch.push(PoolEntry::new(hid, range.owner.as_str(), generated_at));
            if batch.len() == self.seed_batch {
                let full = core::mem::replace(&mut batch, Vec::with_capacity(self.seed_batch));
                self.store.insert_all_if_absent(full, durability).await?;
            }
        }
        if !batch.is_empty() {
            self.store.insert_all_if_absent(batch, durability).await?;
        }
        Ok(())
    }
}
