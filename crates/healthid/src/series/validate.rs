use core::ops::Range;

use crate::{
    error::ValidationError,
    series::{OwnerClass, Series, SeriesRegistry},
};

/// A request that passed validation, clamped to the capacity left in its
/// sub-block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidatedRange {
    pub owner: String,
    pub class: OwnerClass,
    pub series_no: u64,
    pub begins_at: u64,
    /// Exclusive.
    pub ends_at: u64,
    pub requested_count: u64,
}

impl ValidatedRange {
    /// Number of HIDs the range actually covers.
    pub const fn actual_count(&self) -> u64 {
        self.ends_at - self.begins_at
    }

    /// Whether clamping produced fewer HIDs than were requested.
    pub const fn is_partial(&self) -> bool {
        self.actual_count() < self.requested_count
    }

    pub const fn range(&self) -> Range<u64> {
        self.begins_at..self.ends_at
    }
}

impl SeriesRegistry {
    /// Validates a request for `count` HIDs starting at the sub-block
    /// `start`, skipping the ranges already `consumed` in that sub-block.
    ///
    /// The result is a pure function of the arguments and the registry
    /// policy.
    ///
    /// # Errors
    ///
    /// - [`ValidationError::OwnerClassMismatch`] if `series` is not of the
    ///   `expected` class.
    /// - [`ValidationError::EmptyRequest`] if `count` is zero.
    /// - [`ValidationError::CountExceedsPolicyLimit`] if `count` is above the
    ///   per-request maximum.
    /// - [`ValidationError::StartNotInSeries`] if `start` is outside the
    ///   series or not the first number of a sub-block.
    /// - [`ValidationError::SeriesExhausted`] if nothing is left in the
    ///   sub-block.
    pub fn validate_request<I>(
        &self,
        series: &Series,
        expected: OwnerClass,
        start: u64,
        count: u64,
        consumed: I,
    ) -> Result<ValidatedRange, ValidationError>
    where
        I: IntoIterator<Item = Range<u64>>,
    {
        if series.class() != expected {
            return Err(ValidationError::OwnerClassMismatch {
                owner: series.owner().to_string(),
                expected,
                actual: series.class(),
            });
        }

        if count == 0 {
            return Err(ValidationError::EmptyRequest);
        }

        if count > self.max_hids_per_request() {
            return Err(ValidationError::CountExceedsPolicyLimit {
                requested: count,
                limit: self.max_hids_per_request(),
            });
        }

        if !series.contains(start) || series.series_no(start) != start {
            return Err(ValidationError::StartNotInSeries {
                owner: series.owner().to_string(),
                class: series.class(),
                start,
            });
        }

        let series_no = start;
        let sub_block_end = series.sub_block_end(series_no);

        let mut taken: Vec<Range<u64>> = consumed
            .into_iter()
            .filter(|r| r.start < r.end && r.start < sub_block_end && r.end > series_no)
            .collect();
        taken.sort_unstable_by_key(|r| r.start);

        let mut begins_at = series_no;
        for r in &taken {
            if r.start <= begins_at && begins_at < r.end {
                begins_at = r.end;
            }
        }

        if begins_at >= sub_block_end {
            return Err(ValidationError::SeriesExhausted {
                owner: series.owner().to_string(),
                series_no,
            });
        }

        // Stop short of the next block recorded further along the sub-block.
        let next_taken = taken
            .iter()
            .map(|r| r.start)
            .filter(|&s| s > begins_at)
            .min()
            .unwrap_or(sub_block_end);

        let ends_at = begins_at
            .saturating_add(count)
            .min(sub_block_end)
            .min(next_taken);

        Ok(ValidatedRange {
            owner: series.owner().to_string(),
            class: series.class(),
            series_no,
            begins_at,
            ends_at,
            requested_count: count,
        })
    }
}
