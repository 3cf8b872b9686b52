mod hid;
mod luhn;

pub use hid::*;
pub use luhn::*;
