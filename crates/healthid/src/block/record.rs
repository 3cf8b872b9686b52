use core::ops::Range;

/// Identity of a block summary: one logical allocation per owner and range.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BlockKey {
    pub owner: String,
    pub begins_at: u64,
    pub ends_at: u64,
}

/// Summary of one allocation event. Written once, never updated.
///
/// Invariants: `begins_at < ends_at <= series.end()` and
/// `ends_at - begins_at == total_generated`.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GeneratedBlock {
    /// First number of the sub-block the range was drawn from.
    pub series_no: u64,
    pub owner: String,
    pub begins_at: u64,
    /// Exclusive.
    pub ends_at: u64,
    pub total_generated: u64,
    /// Audit pass-through describing who asked for the block.
    pub remark: String,
    /// Milliseconds since the UNIX epoch.
    pub generated_at: u64,
}

impl GeneratedBlock {
    pub fn key(&self) -> BlockKey {
        BlockKey {
            owner: self.owner.clone(),
            begins_at: self.begins_at,
            ends_at: self.ends_at,
        }
    }

    pub const fn range(&self) -> Range<u64> {
        self.begins_at..self.ends_at
    }
}
