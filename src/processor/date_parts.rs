use anyhow::{Result, anyhow};
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, NaiveTime};

/// Calendar components derived from a single event timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateParts {
    pub date: NaiveDate,
    pub year: i32,
    /// 1-12.
    pub month: u32,
    /// ISO 8601 week number.
    pub week: u32,
    /// Day of month.
    pub day: u32,
}

impl DateParts {
    pub fn from_timestamp(ts: NaiveDateTime) -> Self {
        let date = ts.date();
        DateParts {
            date,
            year: date.year(),
            month: date.month(),
            week: date.iso_week().week(),
            day: date.day(),
        }
    }
}

/// Parses an event timestamp in the formats the raw feeds actually carry.
///
/// Tries RFC 3339 first (offsets are normalized to UTC), then the common
/// separator variants, then a bare date taken as midnight.
pub fn parse_timestamp(raw: &str) -> Result<NaiveDateTime> {
    let raw = raw.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.naive_utc());
    }

    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
        return Ok(dt);
    }

    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Ok(dt);
    }

    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Ok(date.and_time(NaiveTime::MIN));
    }

    Err(anyhow!("unrecognized timestamp format: '{}'", raw))
}
