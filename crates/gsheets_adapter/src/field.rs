//! Typed columns and the provider's encodings for each type.
//!
//! Values arrive in three shapes:
//!
//! - Query results from the visualization endpoint, where dates are
//!   `"Date(2018,0,1)"` strings (zero indexed months), times are
//!   `[h, m, s, ms]` arrays and numbers are json numbers.
//! - Unformatted values from the values endpoint, where dates, datetimes
//!   and times are serial day numbers counted from 1899-12-30.
//! - User entered text sent on writes, which the provider parses the same
//!   way it parses text typed into a cell.

use std::cmp::Ordering;
use std::fmt;

use chrono::{
    DateTime, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, Offset, SubsecRound, TimeDelta,
    TimeZone,
};
use chrono_tz::Tz;
use gsheets_error::{DbError, Result};
use serde_json::Value as JsonValue;

use crate::filter::FilterKind;

const USER_ENTERED_DATETIME_FORMAT: &str = "%m/%d/%Y %H:%M:%S";
const ISO_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M:%S";

const MILLIS_PER_DAY: f64 = 86_400_000.0;

/// Day zero for serial date numbers.
fn serial_epoch() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(1899, 12, 30)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or_default()
}

/// A typed cell value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Float(f64),
    Boolean(bool),
    Date(NaiveDate),
    DateTime(DateTime<Tz>),
    TimeOfDay(NaiveTime),
}

impl Value {
    fn type_name(&self) -> &'static str {
        match self {
            Value::String(_) => "string",
            Value::Float(_) => "number",
            Value::Boolean(_) => "boolean",
            Value::Date(_) => "date",
            Value::DateTime(_) => "datetime",
            Value::TimeOfDay(_) => "timeofday",
        }
    }

    /// Compare two values of the same type.
    ///
    /// Returns None for values of different types, or for NaN floats.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
            (Value::Boolean(a), Value::Boolean(b)) => Some(a.cmp(b)),
            (Value::Date(a), Value::Date(b)) => Some(a.cmp(b)),
            (Value::DateTime(a), Value::DateTime(b)) => Some(a.cmp(b)),
            (Value::TimeOfDay(a), Value::TimeOfDay(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    /// Json representation used for display purposes.
    pub fn to_json(&self) -> JsonValue {
        match self {
            Value::String(s) => JsonValue::String(s.clone()),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            Value::Boolean(b) => JsonValue::Bool(*b),
            other => JsonValue::String(other.to_string()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "{s}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Boolean(v) => write!(f, "{v}"),
            Value::Date(v) => write!(f, "{}", v.format(DATE_FORMAT)),
            Value::DateTime(v) => write!(f, "{}", v.to_rfc3339()),
            Value::TimeOfDay(v) => write!(f, "{v}"),
        }
    }
}

/// Whether the engine may request ordering on a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    /// Column can't be ordered by the provider.
    None,
    /// Any requested ordering is applied by the provider.
    Any,
}

/// The type of a column along with the provider specific encodings for it.
///
/// Resolved once per column when the schema is built.
#[derive(Debug, Clone, PartialEq)]
pub enum TypedField {
    String,
    Float,
    Boolean,
    Date,
    /// Datetimes are wall clock values in the spreadsheet's timezone. If the
    /// timezone isn't known, UTC is assumed.
    DateTime {
        timezone: Option<Tz>,
    },
    TimeOfDay,
}

impl TypedField {
    /// Get the field for a column type reported by the query endpoint.
    ///
    /// Unknown types are treated as strings.
    pub fn from_provider_type(type_name: &str, timezone: Option<Tz>) -> Self {
        match type_name {
            "string" => TypedField::String,
            "number" => TypedField::Float,
            "boolean" => TypedField::Boolean,
            "date" => TypedField::Date,
            "datetime" => TypedField::DateTime { timezone },
            "timeofday" => TypedField::TimeOfDay,
            _ => TypedField::String,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            TypedField::String => "string",
            TypedField::Float => "number",
            TypedField::Boolean => "boolean",
            TypedField::Date => "date",
            TypedField::DateTime { .. } => "datetime",
            TypedField::TimeOfDay => "timeofday",
        }
    }

    /// Filters that can be pushed down to the provider for this field.
    pub fn supported_filters(&self) -> &'static [FilterKind] {
        match self {
            TypedField::String | TypedField::Boolean => &[FilterKind::Equal],
            _ => &[FilterKind::Range],
        }
    }

    pub fn supports_filter(&self, kind: FilterKind) -> bool {
        match kind {
            // Equality is a degenerate range.
            FilterKind::Equal => !self.supported_filters().is_empty(),
            kind => self.supported_filters().contains(&kind),
        }
    }

    pub fn order(&self) -> Order {
        Order::Any
    }

    /// Pushed down filters are applied exactly, the engine doesn't need to
    /// filter rows again.
    pub fn is_exact(&self) -> bool {
        true
    }

    fn timezone(&self) -> Tz {
        match self {
            TypedField::DateTime {
                timezone: Some(tz),
            } => *tz,
            _ => Tz::UTC,
        }
    }

    fn parse_error(&self, raw: &JsonValue) -> DbError {
        DbError::new("Failed to parse cell value")
            .with_field("type", self.type_name())
            .with_field("value", raw)
    }

    fn type_mismatch(&self, value: &Value) -> DbError {
        DbError::new("Value does not match column type")
            .with_field("expected", self.type_name())
            .with_field("got", value.type_name())
    }

    /// Parse a raw provider value.
    ///
    /// Accepts the query endpoint's encoding as well as the user entered text
    /// produced by `format`.
    pub fn parse(&self, raw: &JsonValue) -> Result<Option<Value>> {
        if raw.is_null() {
            return Ok(None);
        }

        let value = match (self, raw) {
            (TypedField::String, JsonValue::String(s)) => Value::String(s.clone()),
            (TypedField::String, JsonValue::Number(n)) => Value::String(n.to_string()),
            (TypedField::String, JsonValue::Bool(b)) => Value::String(b.to_string()),

            (TypedField::Float, JsonValue::Number(n)) => {
                Value::Float(n.as_f64().ok_or_else(|| self.parse_error(raw))?)
            }
            (TypedField::Float, JsonValue::String(s)) => {
                let s = s.trim();
                if s.is_empty() {
                    return Ok(None);
                }
                Value::Float(s.parse().map_err(|_| self.parse_error(raw))?)
            }

            (TypedField::Boolean, JsonValue::Bool(b)) => Value::Boolean(*b),
            (TypedField::Boolean, JsonValue::String(s)) => {
                match s.trim().to_ascii_lowercase().as_str() {
                    "true" => Value::Boolean(true),
                    "false" => Value::Boolean(false),
                    "" => return Ok(None),
                    _ => return Err(self.parse_error(raw)),
                }
            }

            (TypedField::Date, JsonValue::String(s)) => {
                let date = match parse_date_literal(s) {
                    Some(parts) => date_from_literal(&parts),
                    None => NaiveDate::parse_from_str(s.trim(), DATE_FORMAT).ok(),
                };
                Value::Date(date.ok_or_else(|| self.parse_error(raw))?)
            }

            (TypedField::DateTime { .. }, JsonValue::String(s)) => {
                let naive = match parse_date_literal(s) {
                    Some(parts) => datetime_from_literal(&parts),
                    None => NaiveDateTime::parse_from_str(s.trim(), USER_ENTERED_DATETIME_FORMAT)
                        .or_else(|_| NaiveDateTime::parse_from_str(s.trim(), ISO_DATETIME_FORMAT))
                        .ok(),
                };
                let naive = naive.ok_or_else(|| self.parse_error(raw))?;
                Value::DateTime(self.localize(naive).ok_or_else(|| self.parse_error(raw))?)
            }

            (TypedField::TimeOfDay, JsonValue::Array(parts)) => {
                let parts: Option<Vec<u32>> = parts
                    .iter()
                    .map(|p| p.as_u64().and_then(|p| u32::try_from(p).ok()))
                    .collect();
                let time = parts.and_then(|parts| match parts.as_slice() {
                    [h, m, s] => NaiveTime::from_hms_opt(*h, *m, *s),
                    [h, m, s, ms] => NaiveTime::from_hms_milli_opt(*h, *m, *s, *ms),
                    _ => None,
                });
                Value::TimeOfDay(time.ok_or_else(|| self.parse_error(raw))?)
            }
            (TypedField::TimeOfDay, JsonValue::String(s)) => {
                let time = NaiveTime::parse_from_str(s.trim(), "%H:%M:%S%.f")
                    .map_err(|_| self.parse_error(raw))?;
                Value::TimeOfDay(time)
            }

            _ => return Err(self.parse_error(raw)),
        };

        Ok(Some(value))
    }

    /// Format a value as user entered text for the values endpoints.
    ///
    /// Nulls are written as empty cells.
    pub fn format(&self, value: Option<&Value>) -> Result<JsonValue> {
        let value = match value {
            Some(value) => value,
            None => return Ok(JsonValue::String(String::new())),
        };

        let formatted = match (self, value) {
            (TypedField::String, Value::String(s)) => JsonValue::String(s.clone()),
            (TypedField::Float, Value::Float(f)) => serde_json::Number::from_f64(*f)
                .map(JsonValue::Number)
                .ok_or_else(|| {
                    DbError::new("Cannot write non-finite number").with_field("value", f)
                })?,
            (TypedField::Boolean, Value::Boolean(b)) => JsonValue::Bool(*b),
            (TypedField::Date, Value::Date(d)) => {
                JsonValue::String(d.format(DATE_FORMAT).to_string())
            }
            // The provider has no notion of timezones for cell values, so
            // values are converted to the sheet's timezone.
            (TypedField::DateTime { .. }, Value::DateTime(dt)) => JsonValue::String(
                dt.with_timezone(&self.timezone())
                    .format(USER_ENTERED_DATETIME_FORMAT)
                    .to_string(),
            ),
            (TypedField::TimeOfDay, Value::TimeOfDay(t)) => {
                JsonValue::String(t.format(TIME_FORMAT).to_string())
            }
            (_, value) => return Err(self.type_mismatch(value)),
        };

        Ok(formatted)
    }

    /// Quote a value as a literal in the query language.
    pub fn quote(&self, value: &Value) -> Result<String> {
        let quoted = match (self, value) {
            (TypedField::String, Value::String(s)) => quote_string(s)?,
            (TypedField::Float, Value::Float(f)) => {
                if !f.is_finite() {
                    return Err(DbError::new("Cannot quote non-finite number").with_field("value", f));
                }
                f.to_string()
            }
            (TypedField::Boolean, Value::Boolean(b)) => b.to_string(),
            (TypedField::Date, Value::Date(d)) => format!("date '{}'", d.format(DATE_FORMAT)),
            (TypedField::DateTime { .. }, Value::DateTime(dt)) => {
                let local = dt.with_timezone(&self.timezone()).naive_local();
                format!("datetime '{}'", local.format("%Y-%m-%d %H:%M:%S%.3f"))
            }
            (TypedField::TimeOfDay, Value::TimeOfDay(t)) => {
                format!("timeofday '{}'", t.format("%H:%M:%S%.3f"))
            }
            (_, value) => return Err(self.type_mismatch(value)),
        };

        Ok(quoted)
    }

    /// Check if an unformatted cell from the values endpoint holds the
    /// expected value.
    ///
    /// Missing cells, nulls and empty strings all match a null. Temporal
    /// values are compared at millisecond precision.
    pub fn matches_unformatted(&self, expected: Option<&Value>, raw: Option<&JsonValue>) -> bool {
        let raw = match raw {
            None | Some(JsonValue::Null) => None,
            Some(JsonValue::String(s)) if s.is_empty() => None,
            Some(raw) => Some(raw),
        };

        match (expected, raw) {
            (None, None) => true,
            (Some(expected), Some(raw)) => match self.decode_unformatted(raw) {
                Some(actual) => same_value(expected, &actual),
                None => false,
            },
            _ => false,
        }
    }

    fn decode_unformatted(&self, raw: &JsonValue) -> Option<Value> {
        match (self, raw) {
            (TypedField::Date, JsonValue::Number(n)) => {
                let days = TimeDelta::try_days(n.as_f64()?.floor() as i64)?;
                let date = serial_epoch().date().checked_add_signed(days)?;
                Some(Value::Date(date))
            }
            (TypedField::DateTime { .. }, JsonValue::Number(n)) => {
                let naive = serial_to_naive(n.as_f64()?)?;
                Some(Value::DateTime(self.localize(naive)?))
            }
            (TypedField::TimeOfDay, JsonValue::Number(n)) => {
                let millis = (n.as_f64()?.fract() * MILLIS_PER_DAY).round() as i64;
                let millis = millis.rem_euclid(MILLIS_PER_DAY as i64);
                let secs = u32::try_from(millis / 1000).ok()?;
                let nanos = u32::try_from(millis % 1000).ok()? * 1_000_000;
                NaiveTime::from_num_seconds_from_midnight_opt(secs, nanos).map(Value::TimeOfDay)
            }
            _ => self.parse(raw).ok().flatten(),
        }
    }

    /// Get the value as the provider stores it after writing the output of
    /// `format`.
    ///
    /// Datetimes and times lose their fractional seconds.
    pub fn as_written(&self, value: Value) -> Value {
        match (self, value) {
            (TypedField::DateTime { .. }, Value::DateTime(dt)) => {
                Value::DateTime(dt.trunc_subsecs(0))
            }
            (TypedField::TimeOfDay, Value::TimeOfDay(t)) => Value::TimeOfDay(t.trunc_subsecs(0)),
            (_, value) => value,
        }
    }

    /// Interpret a wall clock time in the sheet's timezone.
    ///
    /// Ambiguous times resolve to the earlier instant. Times skipped by a
    /// daylight saving transition are shifted forward by the size of the gap.
    fn localize(&self, naive: NaiveDateTime) -> Option<DateTime<Tz>> {
        let tz = self.timezone();
        match tz.from_local_datetime(&naive) {
            LocalResult::Single(dt) => Some(dt),
            LocalResult::Ambiguous(earliest, _) => Some(earliest),
            LocalResult::None => {
                // Offset in effect before the transition.
                let before = naive.checked_sub_signed(TimeDelta::days(1))?;
                let offset = tz.from_local_datetime(&before).earliest()?.offset().fix();
                let shift = TimeDelta::try_seconds(i64::from(offset.local_minus_utc()))?;
                let utc = naive.checked_sub_signed(shift)?;
                Some(tz.from_utc_datetime(&utc))
            }
        }
    }
}

/// Compare values, truncating temporal values to milliseconds.
fn same_value(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::DateTime(a), Value::DateTime(b)) => a.trunc_subsecs(3) == b.trunc_subsecs(3),
        (Value::TimeOfDay(a), Value::TimeOfDay(b)) => a.trunc_subsecs(3) == b.trunc_subsecs(3),
        (a, b) => a == b,
    }
}

fn serial_to_naive(serial: f64) -> Option<NaiveDateTime> {
    if !serial.is_finite() {
        return None;
    }
    let millis = TimeDelta::try_milliseconds((serial * MILLIS_PER_DAY).round() as i64)?;
    serial_epoch().checked_add_signed(millis)
}

/// Parse the numeric arguments out of a `Date(...)` literal.
fn parse_date_literal(s: &str) -> Option<Vec<i64>> {
    let inner = s.trim().strip_prefix("Date(")?.strip_suffix(')')?;
    inner
        .split(',')
        .map(|part| part.trim().parse::<i64>().ok())
        .collect()
}

/// Months in date literals are zero indexed.
fn date_from_literal(parts: &[i64]) -> Option<NaiveDate> {
    match parts {
        [y, m, d, ..] => NaiveDate::from_ymd_opt(
            i32::try_from(*y).ok()?,
            u32::try_from(m + 1).ok()?,
            u32::try_from(*d).ok()?,
        ),
        _ => None,
    }
}

fn datetime_from_literal(parts: &[i64]) -> Option<NaiveDateTime> {
    let date = date_from_literal(parts)?;
    let get = |idx: usize| -> Option<u32> {
        match parts.get(idx) {
            Some(v) => u32::try_from(*v).ok(),
            None => Some(0),
        }
    };
    let time = NaiveTime::from_hms_milli_opt(get(3)?, get(4)?, get(5)?, get(6)?)?;
    Some(date.and_time(time))
}

/// Quote a string literal.
///
/// The query language has no escape sequences, so a string containing a
/// single quote is wrapped in double quotes instead.
fn quote_string(s: &str) -> Result<String> {
    if !s.contains('\'') {
        Ok(format!("'{s}'"))
    } else if !s.contains('"') {
        Ok(format!("\"{s}\""))
    } else {
        Err(DbError::new("Cannot quote string containing both single and double quotes")
            .with_field("value", s))
    }
}
