//! FILETIME conversion: 100-nanosecond ticks since 1601-01-01 UTC.

use chrono::{DateTime, Utc};

/// Ticks between 1601-01-01 and the Unix epoch.
const UNIX_EPOCH_TICKS: i64 = 116_444_736_000_000_000;

/// Decode a FILETIME tick count. Zero means "absent".
pub fn from_filetime(ticks: u64) -> Option<DateTime<Utc>> {
    if ticks == 0 {
        return None;
    }
    let micros = (ticks as i64 - UNIX_EPOCH_TICKS) / 10;
    DateTime::from_timestamp_micros(micros)
}

/// Decode the common 8-byte little-endian column form.
pub fn from_filetime_bytes(bytes: &[u8]) -> Option<DateTime<Utc>> {
    let array: [u8; 8] = bytes.try_into().ok()?;
    from_filetime(u64::from_le_bytes(array))
}

/// Encode a timestamp as FILETIME ticks.
pub fn to_filetime(time: DateTime<Utc>) -> i64 {
    time.timestamp_micros() * 10 + UNIX_EPOCH_TICKS
}
