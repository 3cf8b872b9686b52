use core::{fmt, ops::Range};
use std::collections::HashMap;

use crate::{
    checksum::digit_width,
    error::{Error, Result},
};

/// Default cap on HIDs issued by a single request.
pub const DEFAULT_MAX_HIDS_PER_REQUEST: u64 = 2_000_000;

/// Default size of the sub-blocks a series is divided into.
pub const DEFAULT_SUB_BLOCK_SIZE: u64 = 10_000_000;

/// Whether an owner is the central registry or an organization.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum OwnerClass {
    Mci,
    Organization,
}

impl fmt::Display for OwnerClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mci => f.write_str("MCI"),
            Self::Organization => f.write_str("organization"),
        }
    }
}

/// The contiguous numeric range `[start, end)` one owner may draw HIDs from.
///
/// A series is divided into sub-blocks of `sub_block_size` numbers, counted
/// from `start`. Requests address a sub-block by its first number (the
/// series number) and consumption is tracked per sub-block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Series {
    owner: String,
    class: OwnerClass,
    start: u64,
    end: u64,
    sub_block_size: u64,
}

impl Series {
    /// Creates a series for `owner` covering `range`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if the range is empty or the sub-block
    /// size is zero.
    pub fn new(
        owner: impl Into<String>,
        class: OwnerClass,
        range: Range<u64>,
        sub_block_size: u64,
    ) -> Result<Self> {
        let owner = owner.into();
        if range.start >= range.end {
            return Err(Error::InvalidConfig {
                reason: format!(
                    "series for {owner} is empty ({}..{})",
                    range.start, range.end
                ),
            });
        }
        if sub_block_size == 0 {
            return Err(Error::InvalidConfig {
                reason: format!("sub-block size for {owner} must be greater than 0"),
            });
        }
        Ok(Self {
            owner,
            class,
            start: range.start,
            end: range.end,
            sub_block_size,
        })
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub const fn class(&self) -> OwnerClass {
        self.class
    }

    pub const fn start(&self) -> u64 {
        self.start
    }

    /// Exclusive end of the series.
    pub const fn end(&self) -> u64 {
        self.end
    }

    pub const fn sub_block_size(&self) -> u64 {
        self.sub_block_size
    }

    /// Digits in the numeric part of every HID drawn from this series.
    pub const fn width(&self) -> u32 {
        digit_width(self.end - 1)
    }

    pub const fn contains(&self, n: u64) -> bool {
        self.start <= n && n < self.end
    }

    /// First number of the sub-block containing `n`.
    ///
    /// `n` must lie inside the series.
    pub const fn series_no(&self, n: u64) -> u64 {
        self.start + (n - self.start) / self.sub_block_size * self.sub_block_size
    }

    /// Exclusive end of the sub-block starting at `series_no`, clamped to the
    /// end of the series.
    pub const fn sub_block_end(&self, series_no: u64) -> u64 {
        let end = series_no.saturating_add(self.sub_block_size);
        if end < self.end { end } else { self.end }
    }

    fn overlaps(&self, other: &Self) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// Static series configuration, supplied once at process start.
#[derive(Clone, Debug)]
pub struct SeriesConfig {
    /// Owner code under which the central registry is known.
    pub mci_code: String,
    pub mci_range: Range<u64>,
    /// `(organization code, range)` pairs.
    pub organizations: Vec<(String, Range<u64>)>,
    pub sub_block_size: u64,
    pub max_hids_per_request: u64,
}

/// Maps owner codes to their series and enforces per-request policy.
#[derive(Clone, Debug)]
pub struct SeriesRegistry {
    mci: Series,
    organizations: HashMap<String, Series>,
    max_hids_per_request: u64,
}

impl SeriesRegistry {
    /// Builds the registry, rejecting empty or overlapping ranges and
    /// duplicate owner codes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] describing the first inconsistency
    /// found.
    pub fn new(config: SeriesConfig) -> Result<Self> {
        if config.max_hids_per_request == 0 {
            return Err(Error::InvalidConfig {
                reason: "max HIDs per request must be greater than 0".to_string(),
            });
        }

        let mci = Series::new(
            config.mci_code,
            OwnerClass::Mci,
            config.mci_range,
            config.sub_block_size,
        )?;

        let mut organizations: HashMap<String, Series> = HashMap::new();
        for (code, range) in config.organizations {
            if code == mci.owner || organizations.contains_key(&code) {
                return Err(Error::InvalidConfig {
                    reason: format!("duplicate owner code {code}"),
                });
            }
            let series = Series::new(
                code.clone(),
                OwnerClass::Organization,
                range,
                config.sub_block_size,
            )?;
            if let Some(other) = core::iter::once(&mci)
                .chain(organizations.values())
                .find(|other| other.overlaps(&series))
            {
                return Err(Error::InvalidConfig {
                    reason: format!(
                        "series for {} ({}..{}) overlaps series for {} ({}..{})",
                        series.owner, series.start, series.end, other.owner, other.start, other.end
                    ),
                });
            }
            organizations.insert(code, series);
        }

        Ok(Self {
            mci,
            organizations,
            max_hids_per_request: config.max_hids_per_request,
        })
    }

    /// The central registry's series.
    pub const fn mci(&self) -> &Series {
        &self.mci
    }

    pub fn mci_code(&self) -> &str {
        &self.mci.owner
    }

    pub fn is_mci(&self, owner: &str) -> bool {
        self.mci.owner == owner
    }

    pub const fn max_hids_per_request(&self) -> u64 {
        self.max_hids_per_request
    }

    /// Looks up the series configured for `owner`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownOwner`] if `owner` is neither the MCI code nor
    /// a configured organization.
    pub fn resolve_series(&self, owner: &str) -> Result<&Series> {
        if self.is_mci(owner) {
            return Ok(&self.mci);
        }
        self.organizations
            .get(owner)
            .ok_or_else(|| Error::UnknownOwner {
                owner: owner.to_string(),
            })
    }

    pub fn organizations(&self) -> impl Iterator<Item = &Series> {
        self.organizations.values()
    }
}
