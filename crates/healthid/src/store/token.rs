use crate::checksum::Hid;

/// Position of a HID in the store's intrinsic scan order.
///
/// Tokens are a hash of the HID, so scan order is stable but unrelated to
/// numeric order. Ties are broken by the HID itself, which makes
/// `(token, hid)` a total order over entries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Token(pub u64);

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

impl Token {
    /// FNV-1a over the HID's digits.
    pub fn of(hid: &Hid) -> Self {
        let hash = hid
            .as_str()
            .bytes()
            .fold(FNV_OFFSET, |h, b| (h ^ u64::from(b)).wrapping_mul(FNV_PRIME));
        Self(hash)
    }
}
