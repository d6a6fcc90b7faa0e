//! TTL bucketing: coarse freshness without per-entry expiry timers.
//!
//! A TTL is folded into the cache key as a hex bucket prefix. The bucket id
//! advances once per TTL window, offset per URL by `crc32(url) % ttl` so
//! different URLs roll over at different wall-clock instants and the origin
//! never sees a synchronized stampede. Old-bucket entries stay in the cache
//! unreferenced until LRU pressure reclaims them.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::FetchError;

/// Prefix used when no TTL applies: the key is stable until evicted.
pub const NO_TTL_PREFIX: &str = ":";

fn unix_now() -> i64 {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(d) => i64::try_from(d.as_secs()).unwrap_or(i64::MAX),
        Err(_) => 0,
    }
}

/// Bucket prefix for `url` at an explicit timestamp. Exposed for tests and
/// for callers that need reproducible keys.
#[must_use]
pub fn prefix_at(url: &str, ttl: u64, now: i64) -> String {
    if ttl == 0 {
        return NO_TTL_PREFIX.to_string();
    }
    let ttl = i64::try_from(ttl).unwrap_or(i64::MAX);
    let offset = i64::from(crc32fast::hash(url.as_bytes())) % ttl;
    let id = (now + offset) / ttl;
    format!("{id:x}:")
}

/// Bucket prefix for `url` with `ttl` seconds of freshness, evaluated now.
#[must_use]
pub fn prefix(url: &str, ttl: u64) -> String {
    prefix_at(url, ttl, unix_now())
}

/// Split a full cache key back into its bucket token and inner key.
/// The generator uses this to recover the query the dispatcher encoded.
pub fn split(key: &str) -> Result<(&str, &str), FetchError> {
    key.split_once(':')
        .ok_or_else(|| FetchError::BadKey(key.to_string()))
}

/// Time block for cooperating clients pinning their own `_t` parameter:
/// same formula as [`prefix_at`] but over arbitrary bytes, in decimal.
#[must_use]
pub fn time_block(ttl: u32, data: &[u8]) -> u32 {
    if ttl == 0 {
        return 0;
    }
    let offset = crc32fast::hash(data) % ttl;
    (u32::try_from(unix_now()).unwrap_or(u32::MAX).wrapping_add(offset)) / ttl
}
