//! Core record types.
//!
//! This module provides:
//! - [`RecordId`] — Store-assigned, monotonic identifier
//! - [`LogLevel`] — Severity carried by every stored record
//! - [`LevelFilter`] — Level selection for queries, including the `All` sentinel
//! - [`NewRecord`] — Fields of a record before the store assigns an id
//! - [`LogRecord`] — An immutable stored record

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Maximum length of a device id or process name, in characters.
pub const MAX_NAME_LEN: usize = 50;

/// Maximum length of a tag, in characters.
pub const MAX_TAG_LEN: usize = 23;

/// Maximum length of a message, in characters.
pub const MAX_MESSAGE_LEN: usize = 256;

/// Unique identifier for a stored record.
///
/// Ids are assigned on insert and strictly increase, so ordering by id is
/// insertion order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordId(pub u64);

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Log severity levels, ordered from most to least verbose.
///
/// The discriminants are the wire ordinals sent by devices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum LogLevel {
    /// Most verbose output
    Verbose = 2,
    /// Debugging information
    Debug = 3,
    /// General information
    Info = 4,
    /// Warning conditions
    Warning = 5,
    /// Error conditions
    Error = 6,
}

impl LogLevel {
    /// All storable levels, most verbose first.
    pub const ALL: [Self; 5] = [
        Self::Verbose,
        Self::Debug,
        Self::Info,
        Self::Warning,
        Self::Error,
    ];

    /// Returns the wire ordinal of this level.
    #[must_use]
    pub const fn ordinal(self) -> i64 {
        self as i64
    }

    /// Returns the short label used when printing records.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Verbose => "V",
            Self::Debug => "D",
            Self::Info => "I",
            Self::Warning => "W",
            Self::Error => "E",
        }
    }
}

impl TryFrom<i64> for LogLevel {
    type Error = StoreError;

    fn try_from(value: i64) -> Result<Self, StoreError> {
        match value {
            2 => Ok(Self::Verbose),
            3 => Ok(Self::Debug),
            4 => Ok(Self::Info),
            5 => Ok(Self::Warning),
            6 => Ok(Self::Error),
            other => Err(StoreError::InvalidRecord(format!(
                "log level {other} is outside 2..=6"
            ))),
        }
    }
}

impl From<LogLevel> for i64 {
    fn from(level: LogLevel) -> Self {
        level.ordinal()
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Verbose => "VERBOSE",
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
        };
        f.write_str(name)
    }
}

/// Level selection for a query.
///
/// `All` is a filter-only sentinel (ordinal 1) and is never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum LevelFilter {
    /// No level constraint.
    #[default]
    All,
    /// Only records with exactly this level.
    Exact(LogLevel),
}

impl LevelFilter {
    /// Returns the ordinal of this selection (1 for `All`).
    #[must_use]
    pub const fn ordinal(self) -> i64 {
        match self {
            Self::All => 1,
            Self::Exact(level) => level.ordinal(),
        }
    }

    /// Returns the constrained level, or `None` for `All`.
    #[must_use]
    pub const fn level(self) -> Option<LogLevel> {
        match self {
            Self::All => None,
            Self::Exact(level) => Some(level),
        }
    }
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        Self::Exact(level)
    }
}

impl TryFrom<i64> for LevelFilter {
    type Error = StoreError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        if value == 1 {
            return Ok(Self::All);
        }
        LogLevel::try_from(value).map(Self::Exact)
    }
}

impl std::str::FromStr for LevelFilter {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ALL" | "1" => Ok(Self::All),
            "VERBOSE" | "V" | "2" => Ok(Self::Exact(LogLevel::Verbose)),
            "DEBUG" | "D" | "3" => Ok(Self::Exact(LogLevel::Debug)),
            "INFO" | "I" | "4" => Ok(Self::Exact(LogLevel::Info)),
            "WARNING" | "WARN" | "W" | "5" => Ok(Self::Exact(LogLevel::Warning)),
            "ERROR" | "E" | "6" => Ok(Self::Exact(LogLevel::Error)),
            other => Err(StoreError::InvalidRecord(format!("unknown log level: {other}"))),
        }
    }
}

/// Fields of a record that has not been stored yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRecord {
    /// Device identity
    pub user_id: String,
    /// Process name under the device
    pub process_name: String,
    /// Severity
    pub log_level: LogLevel,
    /// Short label, at most [`MAX_TAG_LEN`] characters
    pub tag: String,
    /// Epoch milliseconds reported by the device
    pub time_millis: i64,
    /// Message body, at most [`MAX_MESSAGE_LEN`] characters
    pub message: String,
}

impl NewRecord {
    /// Creates a new record, truncating fields that exceed their limits.
    #[must_use]
    pub fn new(
        user_id: impl Into<String>,
        process_name: impl Into<String>,
        log_level: LogLevel,
        tag: impl Into<String>,
        time_millis: i64,
        message: impl Into<String>,
    ) -> Self {
        Self {
            user_id: truncate_chars(user_id.into(), MAX_NAME_LEN),
            process_name: truncate_chars(process_name.into(), MAX_NAME_LEN),
            log_level,
            tag: truncate_chars(tag.into(), MAX_TAG_LEN),
            time_millis,
            message: truncate_chars(message.into(), MAX_MESSAGE_LEN),
        }
    }

    /// Attaches a store-assigned id.
    #[must_use]
    pub fn into_record(self, id: RecordId) -> LogRecord {
        LogRecord {
            id,
            user_id: self.user_id,
            process_name: self.process_name,
            log_level: self.log_level,
            tag: self.tag,
            time_millis: self.time_millis,
            message: self.message,
        }
    }
}

/// A stored log record. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    /// Store-assigned identifier
    pub id: RecordId,
    /// Device identity
    pub user_id: String,
    /// Process name under the device
    pub process_name: String,
    /// Severity
    pub log_level: LogLevel,
    /// Short label
    pub tag: String,
    /// Epoch milliseconds reported by the device
    pub time_millis: i64,
    /// Message body
    pub message: String,
}

impl LogRecord {
    /// Returns the device timestamp, if it is representable.
    #[must_use]
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.time_millis).single()
    }
}

impl std::fmt::Display for LogRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let time = self.timestamp().map_or_else(
            || self.time_millis.to_string(),
            |ts| ts.format("%Y-%m-%d %H:%M:%S%.3f").to_string(),
        );
        write!(
            f,
            "{time} {}/{} {} {}: {}",
            self.user_id,
            self.process_name,
            self.log_level.as_str(),
            self.tag,
            self.message
        )
    }
}

/// Truncates `value` to at most `max` characters on a char boundary.
fn truncate_chars(mut value: String, max: usize) -> String {
    if let Some((idx, _)) = value.char_indices().nth(max) {
        value.truncate(idx);
    }
    value
}
