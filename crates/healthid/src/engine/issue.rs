use std::sync::Arc;

use crate::{
    block::{BlockAllocator, GeneratedBlock},
    checksum::Hid,
    directory::{Actor, FacilityDirectory},
    engine::EngineConfig,
    error::{Error, Result, ValidationError},
    pool::{PoolCursor, PoolEntry},
    series::{OwnerClass, SeriesRegistry},
    store::{ReservationStore, Store, WriteOutcome},
    time::TimeSource,
};

/// Outcome of a block request, as reported to the caller.
///
/// A request clamped by the remaining capacity of its sub-block is still a
/// success: `actual_count < requested_count` and the remark says so.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct IssuedBlock {
    pub series_no: u64,
    pub owner: String,
    pub begins_at: u64,
    pub ends_at: u64,
    pub requested_count: u64,
    pub actual_count: u64,
    pub remark: String,
}

impl IssuedBlock {
    fn new(block: &GeneratedBlock, requested_count: u64) -> Self {
        let actual_count = block.total_generated;
        let remark = if actual_count < requested_count {
            format!(
                "Can generate only {actual_count} HIDs, because series exhausted. Use another series."
            )
        } else {
            format!("Generated {actual_count} HIDs.")
        };
        Self {
            series_no: block.series_no,
            owner: block.owner.clone(),
            begins_at: block.begins_at,
            ends_at: block.ends_at,
            requested_count,
            actual_count,
            remark,
        }
    }

    pub const fn is_partial(&self) -> bool {
        self.actual_count < self.requested_count
    }
}

/// The allocation engine: block issuance for every owner, paging over the
/// MCI pool, and the pool-entry lifecycle.
///
/// All methods take `&self`; the engine is meant to be shared behind an
/// [`Arc`] by concurrent request workers.
pub struct HidEngine<S, D, T> {
    registry: Arc<SeriesRegistry>,
    allocator: BlockAllocator<S, Arc<T>>,
    cursor: PoolCursor<S>,
    store: ReservationStore<S>,
    directory: D,
    clock: Arc<T>,
    config: EngineConfig,
}

impl<S, D, T> HidEngine<S, D, T>
where
    S: Store,
    D: FacilityDirectory,
    T: TimeSource,
{
    pub fn new(
        registry: SeriesRegistry,
        store: S,
        directory: D,
        clock: T,
        config: EngineConfig,
    ) -> Self {
        let registry = Arc::new(registry);
        let clock = Arc::new(clock);
        let store = ReservationStore::new(store, config.store_timeout);
        let allocator = BlockAllocator::new(Arc::clone(&registry), store.clone(), Arc::clone(&clock))
            .with_seed_batch(config.seed_batch);
        let cursor = PoolCursor::new(store.clone(), registry.mci_code())
            .with_max_attempts(config.cursor_retries);
        Self {
            registry,
            allocator,
            cursor,
            store,
            directory,
            clock,
            config,
        }
    }

    pub fn registry(&self) -> &SeriesRegistry {
        &self.registry
    }

    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub const fn store(&self) -> &ReservationStore<S> {
        &self.store
    }

    /// Issues a block for any configured owner, routing to the MCI or the
    /// organization path by the owner's class.
    pub async fn issue_block(
        &self,
        owner: &str,
        start: u64,
        count: u64,
        actor: &Actor,
    ) -> Result<IssuedBlock> {
        match self.registry.resolve_series(owner)?.class() {
            OwnerClass::Mci => self.issue_mci_block(start, count, actor).await,
            OwnerClass::Organization => self.issue_org_block(owner, start, count, actor).await,
        }
    }

    /// Issues a block from the MCI series.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(level = "info", skip(self, actor), fields(actor = %actor.id))
    )]
    pub async fn issue_mci_block(&self, start: u64, count: u64, actor: &Actor) -> Result<IssuedBlock> {
        let owner = self.registry.mci_code();
        self.allocate(owner, OwnerClass::Mci, start, count, actor).await
    }

    /// Issues a block from the series of organization `org_code`.
    ///
    /// # Errors
    ///
    /// - [`ValidationError::OwnerClassMismatch`] if `org_code` is the MCI code.
    /// - [`Error::InvalidOwner`] if the facility directory does not know
    ///   `org_code`.
    /// - Anything [`BlockAllocator::generate_block`] returns.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(level = "info", skip(self, actor), fields(actor = %actor.id))
    )]
    pub async fn issue_org_block(
        &self,
        org_code: &str,
        start: u64,
        count: u64,
        actor: &Actor,
    ) -> Result<IssuedBlock> {
        if self.registry.is_mci(org_code) {
            return Err(ValidationError::OwnerClassMismatch {
                owner: org_code.to_string(),
                expected: OwnerClass::Organization,
                actual: OwnerClass::Mci,
            }
            .into());
        }

        if self.directory.find(org_code).await.is_none() {
            #[cfg(feature = "tracing")]
            tracing::warn!("Rejected block request for unregistered facility {org_code}");
            return Err(Error::InvalidOwner {
                owner: org_code.to_string(),
            });
        }

        self.allocate(org_code, OwnerClass::Organization, start, count, actor)
            .await
    }

    /// Issues the largest block the policy allows from the first MCI
    /// sub-block that still has capacity.
    ///
    /// No count is requested, so a block clamped by its sub-block is reported
    /// as fully generated.
    ///
    /// # Errors
    ///
    /// - [`ValidationError::SeriesExhausted`] for the last sub-block if every
    ///   sub-block of the MCI series is consumed.
    /// - Anything [`BlockAllocator::generate_block`] returns.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(level = "info", skip(self, actor), fields(actor = %actor.id))
    )]
    pub async fn issue_all(&self, actor: &Actor) -> Result<IssuedBlock> {
        let mci = self.registry.mci();
        let count = self.registry.max_hids_per_request();
        let mut series_no = mci.start();
        loop {
            let attempt = self
                .allocator
                .generate_block(
                    mci.owner(),
                    OwnerClass::Mci,
                    series_no,
                    count,
                    actor.remark(),
                    self.config.durability,
                )
                .await;
            match attempt {
                Ok(block) => {
                    let issued = IssuedBlock::new(&block, block.total_generated);
                    #[cfg(feature = "tracing")]
                    tracing::info!("{} {}", issued.owner, issued.remark);
                    return Ok(issued);
                }
                Err(Error::Validation(ValidationError::SeriesExhausted { .. }))
                    if mci.sub_block_end(series_no) < mci.end() =>
                {
                    series_no = mci.sub_block_end(series_no);
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn allocate(
        &self,
        owner: &str,
        class: OwnerClass,
        start: u64,
        count: u64,
        actor: &Actor,
    ) -> Result<IssuedBlock> {
        let block = self
            .allocator
            .generate_block(owner, class, start, count, actor.remark(), self.config.durability)
            .await?;
        let issued = IssuedBlock::new(&block, count);

        #[cfg(feature = "tracing")]
        tracing::info!("{} {}", issued.owner, issued.remark);

        Ok(issued)
    }

    /// The next page of unused MCI pool HIDs. A `page_size` of `None` uses
    /// the configured default.
    pub async fn issue_pool_page(&self, page_size: Option<usize>) -> Result<Vec<Hid>> {
        let page = self
            .cursor
            .next_page(page_size.unwrap_or(self.config.page_size))
            .await?;
        Ok(page.into_iter().map(|entry| entry.hid).collect())
    }

    pub async fn reset_cursor(&self) -> Result<()> {
        self.cursor.reset_cursor().await
    }

    /// The last pool entry handed out by this engine's cursor.
    pub fn last_served(&self) -> Option<Hid> {
        self.cursor.last_served()
    }

    /// # Errors
    ///
    /// [`Error::HidNotFound`] if no pool entry exists for `hid`.
    pub async fn find_entry(&self, hid: &Hid) -> Result<PoolEntry> {
        self.store
            .find_entry(hid)
            .await?
            .ok_or_else(|| Error::HidNotFound {
                hid: hid.to_string(),
            })
    }

    /// Flags `hid` as used now. Idempotent.
    pub async fn mark_used(&self, hid: &Hid) -> Result<WriteOutcome> {
        self.cursor
            .mark_consumed(hid, self.clock.current_millis(), self.config.durability)
            .await
    }

    /// Deletes the pool entry for `hid`. Idempotent.
    pub async fn remove_entry(&self, hid: &Hid) -> Result<WriteOutcome> {
        self.cursor.remove_entry(hid, self.config.durability).await
    }

    pub async fn blocks_in_series(&self, owner: &str, series_no: u64) -> Result<Vec<GeneratedBlock>> {
        self.allocator.blocks_in_series(owner, series_no).await
    }

    /// Waits for every fire-and-forget write dispatched so far.
    pub async fn settle(&self) {
        self.store.settle().await;
    }
}
