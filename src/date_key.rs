//! Canonical `YYYY-MM-DD` keys for day records.
//!
//! Accepts epoch seconds (local time), calendar dates, naive date-times and
//! zoned date-times. Every accepted value maps to exactly one key.

use std::fmt;

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::DateKeyError;

const KEY_FORMAT: &str = "%Y-%m-%d";

/// A canonical `YYYY-MM-DD` string identifying one day's record.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DateKey(String);

impl DateKey {
    pub fn from_date(date: NaiveDate) -> Self {
        Self(date.format(KEY_FORMAT).to_string())
    }

    /// Today's key in the given timezone.
    pub fn today_in(tz: Tz) -> Self {
        Self::from_date(Utc::now().with_timezone(&tz).date_naive())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The calendar date this key names.
    pub fn date(&self) -> NaiveDate {
        // Construction always goes through a NaiveDate or a validated parse.
        NaiveDate::parse_from_str(&self.0, KEY_FORMAT).unwrap_or_default()
    }
}

impl fmt::Display for DateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for DateKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for DateKey {
    type Error = DateKeyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        NaiveDate::parse_from_str(&value, KEY_FORMAT)
            .map(Self::from_date)
            .map_err(|_| DateKeyError::UnsupportedType(format!("not a YYYY-MM-DD key: {value:?}")))
    }
}

impl From<DateKey> for String {
    fn from(key: DateKey) -> Self {
        key.0
    }
}

/// Heterogeneous date-like input.
#[derive(Debug, Clone, Copy)]
pub enum DateLike {
    /// Epoch seconds, interpreted in local time.
    Timestamp(f64),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Zoned(DateTime<Tz>),
}

impl DateLike {
    /// Convert an untyped JSON value. Only numbers (epoch seconds) are date-like.
    pub fn from_json(value: &serde_json::Value) -> Result<Self, DateKeyError> {
        match value {
            serde_json::Value::Number(n) => n
                .as_f64()
                .map(DateLike::Timestamp)
                .ok_or_else(|| DateKeyError::OutOfRange(n.to_string())),
            other => Err(DateKeyError::UnsupportedType(json_type_name(other).to_string())),
        }
    }
}

fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

impl From<NaiveDate> for DateLike {
    fn from(value: NaiveDate) -> Self {
        DateLike::Date(value)
    }
}

impl From<NaiveDateTime> for DateLike {
    fn from(value: NaiveDateTime) -> Self {
        DateLike::DateTime(value)
    }
}

impl From<DateTime<Tz>> for DateLike {
    fn from(value: DateTime<Tz>) -> Self {
        DateLike::Zoned(value)
    }
}

impl From<i64> for DateLike {
    fn from(value: i64) -> Self {
        DateLike::Timestamp(value as f64)
    }
}

impl From<f64> for DateLike {
    fn from(value: f64) -> Self {
        DateLike::Timestamp(value)
    }
}

/// Normalize a date-like value to its canonical key.
pub fn to_date_key(value: impl Into<DateLike>) -> Result<DateKey, DateKeyError> {
    match value.into() {
        DateLike::Date(date) => Ok(DateKey::from_date(date)),
        DateLike::DateTime(dt) => Ok(DateKey::from_date(dt.date())),
        DateLike::Zoned(dt) => Ok(DateKey::from_date(dt.date_naive())),
        DateLike::Timestamp(secs) => {
            if !secs.is_finite() {
                return Err(DateKeyError::OutOfRange(secs.to_string()));
            }
            let whole = secs.floor();
            let nanos = ((secs - whole) * 1e9) as u32;
            match Local.timestamp_opt(whole as i64, nanos) {
                chrono::LocalResult::Single(dt) => Ok(DateKey::from_date(dt.date_naive())),
                chrono::LocalResult::Ambiguous(earliest, _) => {
                    Ok(DateKey::from_date(earliest.date_naive()))
                }
                chrono::LocalResult::None => Err(DateKeyError::OutOfRange(secs.to_string())),
            }
        }
    }
}
