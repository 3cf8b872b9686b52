use core::time::Duration;

use crate::{
    block::DEFAULT_SEED_BATCH,
    pool::{DEFAULT_CURSOR_RETRIES, DEFAULT_PAGE_SIZE},
    store::{DEFAULT_STORE_TIMEOUT, Durability},
};

/// Tunables of a [`HidEngine`](crate::HidEngine).
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct EngineConfig {
    /// Durability of every mutation the engine issues.
    pub durability: Durability,
    /// Page size used when a caller does not ask for one.
    pub page_size: usize,
    /// Compare-and-set attempts per cursor call.
    pub cursor_retries: u32,
    /// Bound on each synchronous store call.
    pub store_timeout: Duration,
    /// Pool entries written per call while seeding a block.
    pub seed_batch: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            durability: Durability::default(),
            page_size: DEFAULT_PAGE_SIZE,
            cursor_retries: DEFAULT_CURSOR_RETRIES,
            store_timeout: DEFAULT_STORE_TIMEOUT,
            seed_batch: DEFAULT_SEED_BATCH,
        }
    }
}
