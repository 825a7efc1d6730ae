//! Zone serial allocation.
//!
//! Serials use the `YYYYMMDDnn` convention: the date the zone last changed
//! followed by a two-digit change counter. The next serial is always
//! recomputed from the zone text on disk, never from memory, so the
//! sequence stays monotonic across process restarts.

use chrono::NaiveDate;
use regex::Regex;
use std::sync::LazyLock;

/// Marker appended to the serial line so it can be found and rewritten
/// without a full zone parse.
pub const SERIAL_MARKER: &str = "; Serial (dynamically generated)";

/// Match: "                 2024060105 ; Serial (dynamically generated)"
static SERIAL_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(\d+)\s*; Serial \(dynamically generated\)\s*$")
        .expect("Invalid serial line regex")
});

/// Extract the current serial from zone text, if a marker line is present
/// and its value parses.
pub fn parse_serial(zone: &str) -> Option<u64> {
    zone.lines()
        .find_map(|line| SERIAL_LINE.captures(line))
        .and_then(|caps| caps[1].parse().ok())
}

/// Compute the next serial for a zone given its current text and today's
/// date.
///
/// If the existing serial is a 10-digit value dated today, the trailing
/// counter is incremented, wrapping 99 back to 01. Any other case (a
/// serial from a previous day, a malformed value, or no serial at all)
/// starts a fresh sequence at `<today>01`. A missing serial is therefore
/// not an error, just "no prior serial".
pub fn next_serial(zone: &str, today: NaiveDate) -> u64 {
    let date_part: u64 = today
        .format("%Y%m%d")
        .to_string()
        .parse()
        .expect("date formats as digits");

    if let Some(current) = parse_serial(zone) {
        if current / 100 == date_part {
            let counter = current % 100 + 1;
            // 99 wraps to 01, skipping 00 so the serial always moves forward
            // within the day per zone-transfer comparison rules.
            let counter = if counter > 99 { 1 } else { counter };
            return date_part * 100 + counter;
        }
    }

    date_part * 100 + 1
}
