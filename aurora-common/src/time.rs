//! Timestamp utilities
//!
//! Inventory documents store timestamps as naive local wall-clock strings
//! (`YYYY-MM-DD HH:MM:SS`); events carry UTC timestamps.

use chrono::{DateTime, NaiveDateTime, Utc};

/// Wire format of inventory timestamps
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Current local wall-clock time truncated to whole seconds
pub fn local_now() -> NaiveDateTime {
    let now = chrono::Local::now().naive_local();
    parse_datetime(&format_datetime(&now)).unwrap_or(now)
}

/// Format a timestamp in the inventory wire format
pub fn format_datetime(value: &NaiveDateTime) -> String {
    value.format(DATETIME_FORMAT).to_string()
}

/// Parse a timestamp in the inventory wire format
pub fn parse_datetime(value: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value.trim(), DATETIME_FORMAT).ok()
}
