//! Comparison of the request body against the signed body hash

use sha2::{Digest, Sha256};
use subtle::{Choice, ConstantTimeEq};

/// Whether the SHA-256 of `raw_body` matches the hex digest claimed by the token.
///
/// `raw_body` must be the unmodified request body. The comparison takes the same
/// time wherever the first differing character is.
pub fn body_hash_matches(raw_body: &[u8], expected_hex: &str) -> bool {
    let actual_hex = hex::encode(Sha256::digest(raw_body));
    fixed_time_eq(actual_hex.as_bytes(), expected_hex.as_bytes())
}

/// Compares every element when lengths agree. Different lengths return early,
/// since the digest length is public.
fn fixed_time_eq<T: ConstantTimeEq>(actual: &[T], expected: &[T]) -> bool {
    if actual.len() != expected.len() {
        return false;
    }
    actual
        .iter()
        .zip(expected)
        .fold(Choice::from(1), |equal, (a, e)| equal & a.ct_eq(e))
        .into()
}
