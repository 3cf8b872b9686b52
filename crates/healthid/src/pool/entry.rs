use crate::checksum::Hid;

/// One pre-generated HID sitting in the shared pool.
///
/// Only `is_used` and `used_at` ever change after the entry is written.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PoolEntry {
    pub hid: Hid,
    /// Milliseconds since the UNIX epoch.
    pub generated_at: u64,
    /// Owner code of the pool partition the entry belongs to.
    pub allocated_for: String,
    pub used_at: Option<u64>,
    pub is_used: bool,
}

impl PoolEntry {
    pub fn new(hid: Hid, allocated_for: impl Into<String>, generated_at: u64) -> Self {
        Self {
            hid,
            generated_at,
            allocated_for: allocated_for.into(),
            used_at: None,
            is_used: false,
        }
    }

    pub fn mark_used(&mut self, used_at: u64) {
        self.is_used = true;
        self.used_at = Some(used_at);
    }
}

/// Persisted position of a pool cursor.
///
/// `version` increases by one on every successful update; writers advance
/// the marker only when the version they read is still current.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CursorRecord {
    /// Last entry served, or `None` to scan from the beginning.
    pub marker: Option<Hid>,
    pub version: u64,
}
