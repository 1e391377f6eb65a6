use md5::{Digest, Md5};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::GoxError;

const ALNUM: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Lowercase hex MD5 digest of `input`.
#[must_use]
pub fn md5_hex(input: &str) -> String {
    hex::encode(Md5::digest(input.as_bytes()))
}

/// Random `[a-zA-Z0-9]` string of `len` characters. Not for secrets.
#[must_use]
pub fn rand_str(len: usize) -> String {
    (0..len)
        .map(|_| char::from(ALNUM[fastrand::usize(..ALNUM.len())]))
        .collect()
}

/// A uniformly chosen element, `None` for an empty slice.
#[must_use]
pub fn pick_random<T>(items: &[T]) -> Option<&T> {
    if items.is_empty() {
        return None;
    }
    items.get(fastrand::usize(..items.len()))
}

/// # Errors
///
/// Returns [`GoxError::Decode`] when `value` cannot be represented as JSON
/// (for example a map with non-string keys).
pub fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, GoxError> {
    Ok(serde_json::to_vec(value)?)
}

/// # Errors
///
/// Returns [`GoxError::Decode`] when `bytes` is not valid JSON for `T`.
pub fn from_json<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, GoxError> {
    Ok(serde_json::from_slice(bytes)?)
}
