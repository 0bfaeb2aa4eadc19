//! Calendar partitioning
//!
//! Maps a UTC instant to a wall-clock month/year bucket in a fixed IANA
//! timezone. The bucket names the mirror partition file and the display
//! timestamp formats mirror lines. Instants near month boundaries bucket by
//! local wall-clock, not UTC: 07:10 UTC on the 1st is still the last day of
//! the prior month in a UTC-8 zone.

use chrono::{DateTime, Datelike, Utc};
use chrono_tz::Tz;
use tracing::warn;

/// Fallback zone when the configured timezone string does not parse
pub const DEFAULT_TIMEZONE: Tz = chrono_tz::America::Los_Angeles;

const MONTH_NAMES: [&str; 12] = [
    "january",
    "february",
    "march",
    "april",
    "may",
    "june",
    "july",
    "august",
    "september",
    "october",
    "november",
    "december",
];

/// Parse an IANA zone name, falling back to [`DEFAULT_TIMEZONE`]
pub fn resolve_timezone(name: &str) -> Tz {
    match name.parse::<Tz>() {
        Ok(tz) => tz,
        Err(_) => {
            warn!(timezone = name, "Unknown IANA timezone, using default");
            DEFAULT_TIMEZONE
        }
    }
}

/// Month/year partition label (`january-2026`) for an instant in `tz`
pub fn month_partition(instant: DateTime<Utc>, tz: Tz) -> String {
    let local = instant.with_timezone(&tz);
    let month = MONTH_NAMES[local.month0() as usize];
    format!("{}-{}", month, local.year())
}

/// File name for one partition: `<prefix>-<month>-<year>.txt`
pub fn partition_file_name(prefix: &str, partition: &str) -> String {
    format!("{}-{}.txt", prefix, partition)
}

/// Human-readable local timestamp for a mirror line
pub fn display_timestamp(instant: DateTime<Utc>, tz: Tz) -> String {
    instant
        .with_timezone(&tz)
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}
