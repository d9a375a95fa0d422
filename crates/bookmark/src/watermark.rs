//! Watermark values and their persisted text encoding.

use anyhow::Context;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Format used to persist timestamp bookmarks and to render them into SQL.
///
/// The fractional part is only written when it is non-zero, so whole-second
/// bookmarks look like `2024-01-01 00:00:00`.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// The type of a stream's watermark column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WatermarkKind {
    /// Monotonic integer such as an auto-increment id.
    Int,
    /// Timezone-naive timestamp such as `updated_at`.
    Timestamp,
}

impl WatermarkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WatermarkKind::Int => "int",
            WatermarkKind::Timestamp => "timestamp",
        }
    }
}

impl fmt::Display for WatermarkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WatermarkKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "int" => Ok(WatermarkKind::Int),
            "timestamp" => Ok(WatermarkKind::Timestamp),
            other => anyhow::bail!("Watermark kind '{other}' not supported; use int or timestamp"),
        }
    }
}

/// A high-water mark value.
///
/// Watermarks of the same kind are totally ordered. Comparing an `Int` with a
/// `Timestamp` orders by variant, which never happens for a single stream
/// because [`crate::Bookmarks`] always parses with the stream's kind.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Watermark {
    Int(i64),
    Timestamp(NaiveDateTime),
}

impl Watermark {
    /// Parse a persisted bookmark scalar as the given kind.
    pub fn parse(kind: WatermarkKind, s: &str) -> anyhow::Result<Self> {
        let s = s.trim();
        match kind {
            WatermarkKind::Int => s
                .parse::<i64>()
                .map(Watermark::Int)
                .with_context(|| format!("Invalid int watermark: '{s}'")),
            WatermarkKind::Timestamp => parse_timestamp(s).map(Watermark::Timestamp),
        }
    }

    pub fn kind(&self) -> WatermarkKind {
        match self {
            Watermark::Int(_) => WatermarkKind::Int,
            Watermark::Timestamp(_) => WatermarkKind::Timestamp,
        }
    }

    /// The single-line text stored in a bookmark object.
    pub fn to_bookmark_string(&self) -> String {
        match self {
            Watermark::Int(v) => v.to_string(),
            Watermark::Timestamp(ts) => ts.format(TIMESTAMP_FORMAT).to_string(),
        }
    }

    /// Render as a SQL literal for a `column > literal` predicate.
    pub fn to_sql_literal(&self) -> String {
        match self {
            Watermark::Int(v) => v.to_string(),
            Watermark::Timestamp(_) => format!("'{}'", self.to_bookmark_string()),
        }
    }
}

impl fmt::Display for Watermark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_bookmark_string())
    }
}

/// Parse a timestamp in any of the formats bookmarks have been written in.
///
/// Accepts `YYYY-MM-DD HH:MM:SS[.f]`, the `T`-separated variant, RFC 3339
/// (converted to UTC and made naive) and a bare date (midnight).
pub fn parse_timestamp(s: &str) -> anyhow::Result<NaiveDateTime> {
    let s = s.trim();
    for format in [
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
    ] {
        if let Ok(ts) = NaiveDateTime::parse_from_str(s, format) {
            return Ok(ts);
        }
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Ok(ts.naive_utc());
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Ok(date.and_time(NaiveTime::MIN));
    }
    anyhow::bail!("Invalid timestamp watermark: '{s}'")
}
