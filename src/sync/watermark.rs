// ABOUTME: Watermark type for timestamp-based sync - the last change-timestamp seen per table
// ABOUTME: Converts between MySQL wire values and an ordered chrono timestamp

use anyhow::{bail, Context, Result};
use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};
use mysql_async::Value;
use std::fmt;

/// The last change-timestamp known to be synchronized for a table.
///
/// Rows with a change-timestamp strictly greater than the watermark still need
/// to be transferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Watermark(NaiveDateTime);

impl Watermark {
    pub fn new(timestamp: NaiveDateTime) -> Self {
        Self(timestamp)
    }

    pub fn timestamp(&self) -> NaiveDateTime {
        self.0
    }

    /// Decode a change-timestamp column value.
    ///
    /// Returns `Ok(None)` for SQL NULL and for MySQL's zero date
    /// `0000-00-00 00:00:00`, which sorts below every real timestamp and never
    /// matches `> watermark`. Binary-protocol results arrive as `Value::Date`;
    /// text-protocol results arrive as `Value::Bytes`.
    pub fn from_value(value: &Value) -> Result<Option<Self>> {
        match value {
            Value::NULL => Ok(None),
            Value::Date(0, 0, 0, 0, 0, 0, 0) => Ok(None),
            Value::Date(year, month, day, hour, minute, second, micros) => {
                let date = NaiveDate::from_ymd_opt(*year as i32, *month as u32, *day as u32)
                    .with_context(|| {
                        format!("Invalid date {:04}-{:02}-{:02}", year, month, day)
                    })?;
                let timestamp = date
                    .and_hms_micro_opt(*hour as u32, *minute as u32, *second as u32, *micros)
                    .with_context(|| {
                        format!(
                            "Invalid time {:02}:{:02}:{:02}.{:06}",
                            hour, minute, second, micros
                        )
                    })?;
                Ok(Some(Self(timestamp)))
            }
            Value::Bytes(bytes) => {
                let text = std::str::from_utf8(bytes).context("Timestamp is not valid UTF-8")?;
                if is_zero_date(text) {
                    return Ok(None);
                }
                Self::parse(text).map(Some)
            }
            other => bail!("Expected a timestamp value, got {:?}", other),
        }
    }

    /// Parse `YYYY-MM-DD HH:MM:SS[.ffffff]`, the format MySQL renders timestamps in.
    pub fn parse(text: &str) -> Result<Self> {
        let timestamp = NaiveDateTime::parse_from_str(text.trim(), "%Y-%m-%d %H:%M:%S%.f")
            .with_context(|| format!("Invalid timestamp '{}'", text))?;
        Ok(Self(timestamp))
    }

    /// Drop sub-second digits beyond `digits` (0-6), matching a `TIMESTAMP(digits)`
    /// column. Truncation never moves the watermark past a fetched row.
    pub fn truncate_to_precision(&self, digits: u32) -> Self {
        let digits = digits.min(6);
        let step = 10u32.pow(6 - digits);
        let micros = self.0.nanosecond() / 1_000;
        let kept = micros - micros % step;
        match self.0.with_nanosecond(kept * 1_000) {
            Some(timestamp) => Self(timestamp),
            None => *self,
        }
    }

    /// Encode as a statement parameter.
    pub fn to_value(&self) -> Value {
        let ts = self.0;
        Value::Date(
            ts.year() as u16,
            ts.month() as u8,
            ts.day() as u8,
            ts.hour() as u8,
            ts.minute() as u8,
            ts.second() as u8,
            ts.nanosecond() / 1_000,
        )
    }
}

impl From<NaiveDateTime> for Watermark {
    fn from(timestamp: NaiveDateTime) -> Self {
        Self(timestamp)
    }
}

impl fmt::Display for Watermark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d %H:%M:%S%.f"))
    }
}

fn is_zero_date(text: &str) -> bool {
    let text = text.trim();
    text.starts_with("0000-00-00") && text.chars().all(|c| matches!(c, '0' | '-' | ':' | '.' | ' '))
}

/// Highest change-timestamp among `rows`, reading the value at `column_index`.
///
/// NULL and zero-date timestamps are skipped. Returns `Ok(None)` when no row carries a timestamp.
pub fn max_watermark<'a, I>(rows: I, column_index: usize) -> Result<Option<Watermark>>
where
    I: IntoIterator<Item = &'a Vec<Value>>,
{
    let mut max: Option<Watermark> = None;
    for row in rows {
        let value = row
            .get(column_index)
            .with_context(|| format!("Row has no column at index {}", column_index))?;
        if let Some(candidate) = Watermark::from_value(value)? {
            if max.map_or(true, |current| candidate > current) {
                max = Some(candidate);
            }
        }
    }
    Ok(max)
}
