use core::{fmt, str::FromStr};

use crate::checksum::{compute_check_digit, digit_width, is_valid};

/// Returned when a string is not a checksum-valid HID.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{0:?} is not a valid Health ID")]
pub struct InvalidHid(pub String);

/// A checksum-validated Health ID: a zero-padded decimal number followed by
/// its Luhn check digit.
///
/// A `Hid` can only be obtained through [`Hid::format`] or by parsing a
/// string that passes [`is_valid`], so every value upholds the checksum
/// invariant.
///
/// Ordering is lexicographic on the digits, which matches numeric order for
/// HIDs of equal width.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Hid(String);

impl Hid {
    /// Formats `number` zero-padded to `width` digits and appends its check
    /// digit.
    ///
    /// Returns `None` if `number` needs more than `width` digits.
    ///
    /// # Example
    ///
    /// ```
    /// use healthid::Hid;
    ///
    /// let hid = Hid::format(1000, 6).unwrap();
    /// assert_eq!(hid.as_str(), "0010009");
    /// assert_eq!(hid.number(), Some(1000));
    /// assert!(Hid::format(1_000_000, 6).is_none());
    /// ```
    pub fn format(number: u64, width: u32) -> Option<Self> {
        if digit_width(number) > width {
            return None;
        }
        let check = compute_check_digit(number);
        Some(Self(format!(
            "{number:0width$}{check}",
            width = width as usize
        )))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// The numeric part, without the check digit.
    ///
    /// `None` if the payload does not fit a `u64`.
    pub fn number(&self) -> Option<u64> {
        self.payload().parse().ok()
    }

    pub fn check_digit(&self) -> u8 {
        self.0.as_bytes()[self.0.len() - 1] - b'0'
    }

    fn payload(&self) -> &str {
        &self.0[..self.0.len() - 1]
    }
}

impl FromStr for Hid {
    type Err = InvalidHid;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if is_valid(s) {
            Ok(Self(s.to_owned()))
        } else {
            Err(InvalidHid(s.to_owned()))
        }
    }
}

impl fmt::Display for Hid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Hid {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for Hid {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&self.0)
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for Hid {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
