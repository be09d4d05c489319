//! Resource surrogate id codec.
//!
//! A surrogate id is the number of milliseconds since 0001-01-01T00:00:00Z,
//! expressed in 100ns ticks and shifted left by three bits. The low
//! `80_000` values of every millisecond are reserved as a uniquifier for
//! resources written within the same millisecond.

use chrono::{DateTime, DurationRound, TimeDelta, Utc};

use crate::error::SearchError;

/// Surrogate id units per millisecond (10,000 ticks, shifted by 3 bits).
pub const IDS_PER_MILLISECOND: i64 = 10_000 << 3;

/// Milliseconds between 0001-01-01 and the Unix epoch.
const EPOCH_OFFSET_MS: i64 = 62_135_596_800_000;

/// Largest millisecond count whose whole uniquifier range fits in an `i64`.
const MAX_MS: i64 = i64::MAX / IDS_PER_MILLISECOND - 1;

/// The earliest representable last-updated instant (0001-01-01T00:00:00Z).
pub fn min_last_updated() -> DateTime<Utc> {
    ms_to_datetime(0).unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// The latest representable last-updated instant.
pub fn max_last_updated() -> DateTime<Utc> {
    ms_to_datetime(MAX_MS).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Truncates `value` to millisecond precision.
pub fn truncate_to_millisecond(value: DateTime<Utc>) -> DateTime<Utc> {
    value
        .duration_trunc(TimeDelta::milliseconds(1))
        .unwrap_or(value)
}

/// Encodes a last-updated instant as the smallest surrogate id of its millisecond.
pub fn last_updated_to_surrogate_id(value: DateTime<Utc>) -> Result<i64, SearchError> {
    let ms = value.timestamp_millis() + EPOCH_OFFSET_MS;
    if !(0..=MAX_MS).contains(&ms) {
        return Err(SearchError::DateOutOfRange {
            value: value.to_rfc3339(),
        });
    }
    Ok(ms * IDS_PER_MILLISECOND)
}

/// Decodes a surrogate id back to the millisecond it was assigned in.
///
/// Returns `None` for ids that fall outside the representable date range.
pub fn surrogate_id_to_last_updated(surrogate_id: i64) -> Option<DateTime<Utc>> {
    let ms = surrogate_id.div_euclid(IDS_PER_MILLISECOND);
    if !(0..=MAX_MS).contains(&ms) {
        return None;
    }
    ms_to_datetime(ms)
}

fn ms_to_datetime(ms: i64) -> Option<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(ms - EPOCH_OFFSET_MS)
}
