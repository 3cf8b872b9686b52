//! Error types for the HID allocation engine.
//!
//! Every failure path returns a distinguishable variant so the caller can
//! choose between retrying, surfacing to an operator, or surfacing to the end
//! user:
//!
//! - [`ValidationError`]: the request itself is wrong. Never retried.
//! - [`Error::PoolExhausted`]: the pre-generated pool has nothing left to
//!   serve. Expected in steady state; replenishment is external.
//! - [`Error::StoreUnavailable`]: transient infrastructure fault. Safe to retry
//!   with backoff at the calling layer. The engine itself never retries a
//!   write.
//! - [`Error::UnknownOwner`] / [`Error::InvalidOwner`]: configuration or
//!   facility directory mismatch.

use crate::series::OwnerClass;

pub type Result<T, E = Error> = core::result::Result<T, E>;

/// A request that can never succeed as submitted.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// The start is outside the owner's series or not on a sub-block boundary.
    #[error("{}", start_not_in_series(*class, *start))]
    StartNotInSeries {
        owner: String,
        class: OwnerClass,
        start: u64,
    },

    /// More HIDs were requested than a single call may issue.
    #[error("Total HIDs should not be more than {limit} (requested {requested})")]
    CountExceedsPolicyLimit { requested: u64, limit: u64 },

    /// An MCI request was routed through the organization path or vice versa.
    #[error("{}", owner_class_mismatch(owner, *expected, *actual))]
    OwnerClassMismatch {
        owner: String,
        expected: OwnerClass,
        actual: OwnerClass,
    },

    /// Zero HIDs were requested.
    #[error("Total HIDs should be greater than 0")]
    EmptyRequest,

    /// Every number in the addressed sub-block has already been generated.
    #[error("Series {series_no} of {owner} is exhausted. Use another series.")]
    SeriesExhausted { owner: String, series_no: u64 },

    /// A pool page of size zero was requested.
    #[error("Page size should be greater than 0")]
    InvalidPageSize,
}

fn start_not_in_series(class: OwnerClass, start: u64) -> String {
    match class {
        OwnerClass::Mci => format!("{start} not for MCI"),
        OwnerClass::Organization => format!("{start} series is not valid."),
    }
}

fn owner_class_mismatch(owner: &str, expected: OwnerClass, actual: OwnerClass) -> String {
    match (expected, actual) {
        (OwnerClass::Organization, OwnerClass::Mci) => {
            "This endpoint is not for MCI. To generate HIDs for MCI use /generateBlock endpoint"
                .to_string()
        }
        _ => format!("{owner} is an {actual} owner, but the request expected an {expected} owner"),
    }
}

/// Failure reported by a [`Store`](crate::Store) backend.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The backend could not be reached or rejected the operation.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The operation did not complete within the configured bound.
    #[error("store operation `{operation}` timed out after {millis}ms")]
    Timeout { operation: &'static str, millis: u64 },
}

/// Unified error type for the allocation engine.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("Invalid request: {0}")]
    Validation(#[from] ValidationError),

    /// No unserved entries remain past the cursor.
    #[error("Health ID pool is exhausted")]
    PoolExhausted,

    #[error("Store unavailable: {context}")]
    StoreUnavailable { context: String },

    /// No series is configured for the owner code.
    #[error("Unknown owner: {owner}")]
    UnknownOwner { owner: String },

    /// The facility directory does not know the organization.
    #[error("Invalid Organization:- {owner}")]
    InvalidOwner { owner: String },

    /// The HID is not present in the store.
    #[error("Health ID {hid} not found")]
    HidNotFound { hid: String },

    /// Other cursors kept advancing the shared marker between our read and
    /// our compare-and-set.
    #[error("Cursor contention: gave up after {attempts} attempts")]
    CursorContention { attempts: u32 },

    /// The series configuration is inconsistent.
    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },
}

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        Self::StoreUnavailable {
            context: err.to_string(),
        }
    }
}

impl Error {
    /// Whether the calling layer may retry the operation with backoff.
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::StoreUnavailable { .. } | Self::CursorContention { .. }
        )
    }
}
