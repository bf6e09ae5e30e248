//! Time-window filtering of log entries.
//!
//! A window admits entries whose write time satisfies
//! `start_inclusive <= write_time < end_exclusive`. Unset bounds are kept as
//! `None` rather than folded into sentinel values, so configuration probes can
//! tell "not configured" apart from "configured as zero".
//!
//! Bounds are configured from strings that are either epoch milliseconds
//! (`"1334092861010"`) or local date-times (`"2012-4-10T14:21:01.01"`). In the
//! textual form the digits after the dot are a millisecond count, so `.01`
//! means 1 ms and `.5` means 5 ms.

use crate::config::Properties;
use chrono::{NaiveDateTime, TimeZone};
use chrono_tz::Tz;
use walplayer_core::{LogEntry, ReplayError, Result};

/// Date-time layout accepted for textual bounds (fraction handled separately).
const DATE_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Replay time window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeWindow {
    /// Earliest admitted write time (milliseconds since epoch)
    pub start_inclusive: Option<i64>,
    /// First write time past the window (milliseconds since epoch)
    pub end_exclusive: Option<i64>,
}

impl TimeWindow {
    /// Window with no bounds.
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Window with the given bounds.
    pub fn new(start_inclusive: Option<i64>, end_exclusive: Option<i64>) -> Self {
        TimeWindow {
            start_inclusive,
            end_exclusive,
        }
    }

    /// Effective lower bound; an unset start means 0.
    pub fn start(&self) -> i64 {
        self.start_inclusive.unwrap_or(0)
    }

    /// Effective upper bound; an unset end means unbounded.
    pub fn end(&self) -> i64 {
        self.end_exclusive.unwrap_or(i64::MAX)
    }

    /// Whether `timestamp` falls inside the window.
    pub fn contains(&self, timestamp: i64) -> bool {
        let below_end = match self.end_exclusive {
            Some(end) => timestamp < end,
            None => true,
        };
        timestamp >= self.start() && below_end
    }

    /// Reject windows whose start lies after their end.
    pub fn validate(&self) -> Result<()> {
        if let (Some(start), Some(end)) = (self.start_inclusive, self.end_exclusive) {
            if start > end {
                return Err(ReplayError::config(format!(
                    "start time {} is after end time {}",
                    start, end
                )));
            }
        }
        Ok(())
    }
}

/// Admits entries whose write time lies inside a [`TimeWindow`].
#[derive(Debug, Clone, Default)]
pub struct TimeRangeFilter {
    window: TimeWindow,
}

impl TimeRangeFilter {
    /// Create a filter for a window.
    pub fn new(window: TimeWindow) -> Self {
        TimeRangeFilter { window }
    }

    /// The configured window.
    pub fn window(&self) -> &TimeWindow {
        &self.window
    }

    /// Whether the entry's write time is inside the window.
    pub fn admit(&self, entry: &LogEntry) -> bool {
        self.window.contains(entry.write_time())
    }
}

/// Parse an optional bound.
///
/// An absent value yields `Ok(None)`; nothing is defaulted.
pub fn configure_bound(key: &str, raw: Option<&str>, tz: Tz) -> Result<Option<i64>> {
    raw.map(|value| parse_time(key, value, tz)).transpose()
}

/// Rewrite a time property in place as epoch milliseconds.
///
/// If `key` is absent from `properties` nothing is written and the key stays
/// absent.
pub fn setup_time(properties: &mut Properties, key: &str, tz: Tz) -> Result<()> {
    let Some(raw) = properties.get(key) else {
        return Ok(());
    };
    let millis = parse_time(key, raw, tz)?;
    properties.insert(key.to_string(), millis.to_string());
    Ok(())
}

/// Parse epoch milliseconds (optionally negative) or a local date-time in `tz`.
pub fn parse_time(key: &str, raw: &str, tz: Tz) -> Result<i64> {
    let value = raw.trim();
    if value.is_empty() {
        return Err(ReplayError::invalid_time(key, raw, "empty value"));
    }

    let digits = value.strip_prefix('-').unwrap_or(value);
    if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
        return value
            .parse::<i64>()
            .map_err(|e| ReplayError::invalid_time(key, raw, e.to_string()));
    }

    let (date_time, millis) = split_millis(value).map_err(|e| ReplayError::invalid_time(key, raw, e))?;
    let naive = NaiveDateTime::parse_from_str(date_time, DATE_TIME_FORMAT).map_err(|e| {
        ReplayError::invalid_time(key, raw, format!("expected yyyy-M-dTH:m:s[.SSS]: {}", e))
    })?;
    let local = tz.from_local_datetime(&naive).earliest().ok_or_else(|| {
        ReplayError::invalid_time(key, raw, format!("local time does not exist in {}", tz))
    })?;

    Ok(local.timestamp_millis() + millis)
}

fn split_millis(value: &str) -> std::result::Result<(&str, i64), String> {
    let Some((date_time, fraction)) = value.rsplit_once('.') else {
        return Ok((value, 0));
    };
    if fraction.is_empty() || fraction.len() > 3 || !fraction.bytes().all(|b| b.is_ascii_digit()) {
        return Err(format!("invalid millisecond field {:?}", fraction));
    }
    let millis = fraction
        .parse::<i64>()
        .map_err(|e| format!("invalid millisecond field {:?}: {}", fraction, e))?;
    Ok((date_time, millis))
}
