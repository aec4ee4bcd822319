//! Positional integer codec over a 64-symbol alphabet.
//!
//! This is **not** RFC 4648 base64: the alphabet order is
//! `0-9 a-z A-Z { }` and encoding is most-significant-symbol-first, chosen
//! purely so that positions and lengths serialize to short, sortable-looking
//! tokens in the index's position field. Zero encodes to the single symbol
//! `"0"`.

use crate::error::IndexError;

pub const ALPHABET: &[u8; 64] =
    b"0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ{}";

fn digit_value(c: u8) -> Option<u64> {
    ALPHABET.iter().position(|&b| b == c).map(|i| i as u64)
}

/// Encode a non-negative integer into the 64-symbol alphabet, MSB first.
pub fn int_to_b64(mut n: u64) -> String {
    if n == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while n > 0 {
        digits.push(ALPHABET[(n % 64) as usize]);
        n /= 64;
    }
    digits.reverse();
    String::from_utf8(digits).expect("alphabet is ascii")
}

/// Decode a string produced by [`int_to_b64`] back into an integer.
pub fn b64_to_int(s: &str) -> Result<u64, IndexError> {
    if s.is_empty() {
        return Err(IndexError::MalformedIndex(s.to_string()));
    }
    let mut n: u64 = 0;
    for &c in s.as_bytes() {
        let d = digit_value(c).ok_or_else(|| IndexError::MalformedIndex(s.to_string()))?;
        n = n
            .checked_mul(64)
            .and_then(|n| n.checked_add(d))
            .ok_or_else(|| IndexError::MalformedIndex(s.to_string()))?;
    }
    Ok(n)
}
