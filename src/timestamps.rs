//! Conversion between framework times and stored column values.
//!
//! Columns are `TIMESTAMP(3)` without time zone. Everything written is first
//! shifted to UTC and truncated to whole milliseconds, so a value read back
//! compares equal to the value that was stored.

use time::{Duration, OffsetDateTime, PrimitiveDateTime, UtcOffset};

/// UTC, millisecond precision.
pub fn normalize(ts: OffsetDateTime) -> OffsetDateTime {
    let utc = ts.to_offset(UtcOffset::UTC);
    let sub_ms = i64::from(utc.nanosecond() % 1_000_000);
    utc - Duration::nanoseconds(sub_ms)
}

pub fn to_column(ts: OffsetDateTime) -> PrimitiveDateTime {
    let utc = normalize(ts);
    PrimitiveDateTime::new(utc.date(), utc.time())
}

pub fn from_column(ts: PrimitiveDateTime) -> OffsetDateTime {
    ts.assume_utc()
}

pub fn now() -> OffsetDateTime {
    normalize(OffsetDateTime::now_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn normalize_shifts_to_utc_and_drops_sub_millisecond_digits() {
        let ts = datetime!(2024-03-01 10:00:00.123456789 +02:00);
        let n = normalize(ts);
        assert_eq!(n.offset(), UtcOffset::UTC);
        assert_eq!(n, datetime!(2024-03-01 08:00:00.123 UTC));
    }

    #[test]
    fn column_roundtrip_preserves_the_instant() {
        let ts = datetime!(2030-12-31 23:59:59.999 -05:00);
        let back = from_column(to_column(ts));
        assert_eq!(back, ts);
        assert_eq!(back.offset(), UtcOffset::UTC);
    }

    #[test]
    fn now_has_millisecond_precision() {
        assert_eq!(now().nanosecond() % 1_000_000, 0);
    }
}
