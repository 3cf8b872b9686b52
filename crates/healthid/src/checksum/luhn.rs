//! Luhn mod-10 check digit over decimal payloads.
//!
//! The scheme detects every single-digit substitution and every adjacent
//! transposition except `09 <-> 90`. It is an entry-error detector, not a
//! cryptographic checksum.

/// Computes the Luhn check digit for the decimal digits of `number`.
///
/// Leading zeros do not change the result, so a zero-padded payload shares
/// its check digit with the bare number.
///
/// # Example
///
/// ```
/// use healthid::compute_check_digit;
///
/// assert_eq!(compute_check_digit(7_992_739_871), 3);
/// ```
pub const fn compute_check_digit(number: u64) -> u8 {
    let mut n = number;
    let mut sum = 0_u64;
    let mut double = true;
    loop {
        let d = n % 10;
        sum += luhn_term(d, double);
        double = !double;
        n /= 10;
        if n == 0 {
            break;
        }
    }
    ((10 - sum % 10) % 10) as u8
}

/// Returns `true` when `hid` is all decimal digits and its last digit is the
/// Luhn check digit of the digits before it.
///
/// Empty and single-character input is invalid: there is no payload to
/// check.
///
/// # Example
///
/// ```
/// use healthid::is_valid;
///
/// assert!(is_valid("79927398713"));
/// assert!(!is_valid("79927398710"));
/// assert!(!is_valid("7992739871a"));
/// ```
pub fn is_valid(hid: &str) -> bool {
    let bytes = hid.as_bytes();
    if bytes.len() < 2 || !bytes.iter().all(u8::is_ascii_digit) {
        return false;
    }
    let (payload, check) = bytes.split_at(bytes.len() - 1);
    check_digit_of(payload) == check[0] - b'0'
}

/// Luhn check digit for a payload of ASCII decimal digits.
///
/// Non-digit bytes must be rejected by the caller.
pub(crate) fn check_digit_of(payload: &[u8]) -> u8 {
    let sum: u64 = payload
        .iter()
        .rev()
        .enumerate()
        .map(|(i, b)| luhn_term(u64::from(b - b'0'), i % 2 == 0))
        .sum();
    ((10 - sum % 10) % 10) as u8
}

const fn luhn_term(digit: u64, double: bool) -> u64 {
    if double {
        let d = digit * 2;
        if d > 9 { d - 9 } else { d }
    } else {
        digit
    }
}

/// Number of decimal digits in `n` (`0` has one digit).
pub const fn digit_width(n: u64) -> u32 {
    match n.checked_ilog10() {
        Some(log) => log + 1,
        None => 1,
    }
}
