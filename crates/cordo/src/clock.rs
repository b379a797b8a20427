//! Timestamp formatting.
//!
//! Every persisted and wire-visible timestamp is UTC, millisecond precision,
//! ISO-8601 with a trailing `Z` (e.g. `2026-08-01T09:30:00.123Z`).

use chrono::{DateTime, SecondsFormat, Utc};

/// Current time in the canonical format.
pub fn now_ts() -> String {
    format_ts(Utc::now())
}

/// Format an arbitrary instant in the canonical format.
pub fn format_ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_format_has_millis_and_z() {
        let ts = now_ts();
        assert!(ts.ends_with('Z'), "expected trailing Z: {ts}");
        // 2026-08-01T09:30:00.123Z
        assert_eq!(ts.len(), 24, "unexpected length: {ts}");
    }

    #[test]
    fn formatted_timestamps_sort_chronologically() {
        let early = format_ts(DateTime::from_timestamp(1_700_000_000, 0).unwrap());
        let late = format_ts(DateTime::from_timestamp(1_700_000_001, 0).unwrap());
        assert!(early < late);
    }
}
