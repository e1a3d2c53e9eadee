//! Cell values and column types

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use arrow::datatypes::{DataType, TimeUnit};
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Offset, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{DpsError, Result};

/// Logical column types recognized by the engine
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ColumnType {
    Integer,
    Float,
    Boolean,
    Text,
    Categorical,
    Temporal {
        #[serde(default)]
        timezone: Option<String>,
    },
}

impl ColumnType {
    /// Naive temporal type (no timezone)
    pub fn temporal() -> Self {
        ColumnType::Temporal { timezone: None }
    }

    /// Arrow storage type for this column type
    pub fn to_arrow(&self) -> DataType {
        match self {
            ColumnType::Integer => DataType::Int64,
            ColumnType::Float => DataType::Float64,
            ColumnType::Boolean => DataType::Boolean,
            ColumnType::Text => DataType::Utf8,
            ColumnType::Categorical => {
                DataType::Dictionary(Box::new(DataType::Int32), Box::new(DataType::Utf8))
            }
            ColumnType::Temporal { timezone } => DataType::Timestamp(
                TimeUnit::Millisecond,
                timezone.as_ref().map(|tz| tz.as_str().into()),
            ),
        }
    }

    /// Map an arrow type onto the closest logical type
    pub fn from_arrow(data_type: &DataType) -> Result<Self> {
        Ok(match data_type {
            DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64 => ColumnType::Integer,
            DataType::Float16 | DataType::Float32 | DataType::Float64 => ColumnType::Float,
            DataType::Boolean => ColumnType::Boolean,
            DataType::Utf8 | DataType::LargeUtf8 | DataType::Null => ColumnType::Text,
            DataType::Dictionary(_, value) if matches!(value.as_ref(), DataType::Utf8 | DataType::LargeUtf8) => {
                ColumnType::Categorical
            }
            DataType::Timestamp(_, tz) => ColumnType::Temporal {
                timezone: tz.as_ref().map(|tz| tz.to_string()),
            },
            DataType::Date32 | DataType::Date64 => ColumnType::temporal(),
            other => {
                return Err(DpsError::InvalidOperation(format!(
                    "Unsupported column storage type {}",
                    other
                )))
            }
        })
    }

    /// Integer or floating
    pub fn is_numeric(&self) -> bool {
        matches!(self, ColumnType::Integer | ColumnType::Float)
    }

    /// Text or categorical
    pub fn is_textual(&self) -> bool {
        matches!(self, ColumnType::Text | ColumnType::Categorical)
    }

    pub fn is_temporal(&self) -> bool {
        matches!(self, ColumnType::Temporal { .. })
    }

    /// Short name used in messages and diagnostics
    pub fn name(&self) -> &'static str {
        match self {
            ColumnType::Integer => "integer",
            ColumnType::Float => "float",
            ColumnType::Boolean => "boolean",
            ColumnType::Text => "text",
            ColumnType::Categorical => "categorical",
            ColumnType::Temporal { .. } => "temporal",
        }
    }

    /// Timezone of a temporal column
    pub fn timezone(&self) -> Option<&str> {
        match self {
            ColumnType::Temporal { timezone } => timezone.as_deref(),
            _ => None,
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnType::Temporal { timezone: Some(tz) } => write!(f, "temporal[{}]", tz),
            other => f.write_str(other.name()),
        }
    }
}

/// A single cell value
///
/// Temporal cells hold milliseconds since the Unix epoch (UTC); the column
/// type carries the display timezone.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Timestamp(i64),
}

impl Value {
    pub fn is_null(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Float(f) => f.is_nan(),
            _ => false,
        }
    }

    /// Numeric view of the value
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) if !f.is_nan() => Some(*f),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Timestamp(ms) => Some(*ms),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Render the value as plain text, with `None` for nulls
    pub fn to_text(&self, timezone: Option<&str>) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Bool(b) => Some(if *b { "True".to_string() } else { "False".to_string() }),
            Value::Int(i) => Some(i.to_string()),
            Value::Float(f) if f.is_nan() => None,
            Value::Float(f) => Some(format_float(*f)),
            Value::Text(s) => Some(s.clone()),
            Value::Timestamp(ms) => Some(temporal::format_millis(*ms, timezone)),
        }
    }

    /// Total ordering used for sorting and group keys
    ///
    /// Nulls sort after everything; numbers compare numerically across
    /// integer and float; otherwise values of different kinds order by kind.
    pub fn cmp_total(&self, other: &Value) -> Ordering {
        match (self, other) {
            (a, b) if a.is_null() && b.is_null() => Ordering::Equal,
            (a, _) if a.is_null() => Ordering::Greater,
            (_, b) if b.is_null() => Ordering::Less,
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
            (Value::Timestamp(a), Value::Timestamp(b)) => a.cmp(b),
            (a, b) => match (a.numeric(), b.numeric()) {
                (Some(x), Some(y)) => x.total_cmp(&y),
                _ => a.rank().cmp(&b.rank()),
            },
        }
    }

    fn numeric(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Value::Bool(_) => 0,
            Value::Int(_) | Value::Float(_) => 1,
            Value::Timestamp(_) => 2,
            Value::Text(_) => 3,
            Value::Null => 4,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (a, b) if a.is_null() && b.is_null() => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => *a as f64 == *b,
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Timestamp(a), Value::Timestamp(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            v if v.is_null() => 0u8.hash(state),
            Value::Bool(b) => {
                1u8.hash(state);
                b.hash(state);
            }
            // Integers and integral floats must hash alike since they compare equal
            Value::Int(i) => {
                2u8.hash(state);
                (*i as f64).to_bits().hash(state);
            }
            Value::Float(f) => {
                2u8.hash(state);
                let normalized = if *f == 0.0 { 0.0 } else { *f };
                normalized.to_bits().hash(state);
            }
            Value::Text(s) => {
                3u8.hash(state);
                s.hash(state);
            }
            Value::Timestamp(ms) => {
                4u8.hash(state);
                ms.hash(state);
            }
            _ => 0u8.hash(state),
        }
    }
}

/// Format a float the way users expect to read it back
pub fn format_float(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{:.1}", value)
    } else {
        value.to_string()
    }
}

/// Literal values carried inside serialized operations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Literal {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<Literal>),
}

impl Literal {
    /// Convert to a cell value compatible with the given column type
    pub fn to_value(&self, column_type: &ColumnType) -> Option<Value> {
        match (self, column_type) {
            (Literal::Null, _) => Some(Value::Null),
            (Literal::List(_), _) => None,
            (lit, ColumnType::Integer) => match lit {
                Literal::Int(i) => Some(Value::Int(*i)),
                Literal::Float(f) if f.fract() == 0.0 => Some(Value::Int(*f as i64)),
                Literal::Float(f) => Some(Value::Float(*f)),
                Literal::Bool(b) => Some(Value::Int(*b as i64)),
                Literal::Text(s) => parse_number(s),
                _ => None,
            },
            (lit, ColumnType::Float) => match lit {
                Literal::Int(i) => Some(Value::Float(*i as f64)),
                Literal::Float(f) => Some(Value::Float(*f)),
                Literal::Bool(b) => Some(Value::Float(*b as i64 as f64)),
                Literal::Text(s) => s.trim().parse::<f64>().ok().map(Value::Float),
                _ => None,
            },
            (lit, ColumnType::Boolean) => match lit {
                Literal::Bool(b) => Some(Value::Bool(*b)),
                Literal::Int(i) => Some(Value::Bool(*i != 0)),
                Literal::Text(s) => parse_bool(s).map(Value::Bool),
                _ => None,
            },
            (lit, ColumnType::Text | ColumnType::Categorical) => match lit {
                Literal::Text(s) => Some(Value::Text(s.clone())),
                Literal::Int(i) => Some(Value::Text(i.to_string())),
                Literal::Float(f) => Some(Value::Text(format_float(*f))),
                Literal::Bool(b) => Some(Value::Text(if *b { "True" } else { "False" }.to_string())),
                _ => None,
            },
            (lit, ColumnType::Temporal { timezone }) => match lit {
                Literal::Text(s) => temporal::parse_millis(s, timezone.as_deref()).map(Value::Timestamp),
                Literal::Int(ms) => Some(Value::Timestamp(*ms)),
                _ => None,
            },
        }
    }

    /// Items of a list literal; a scalar is treated as a one-element list
    pub fn items(&self) -> Vec<&Literal> {
        match self {
            Literal::List(items) => items.iter().collect(),
            other => vec![other],
        }
    }

    /// Display form used in descriptions
    pub fn describe(&self) -> String {
        match self {
            Literal::Null => "null".to_string(),
            Literal::Bool(b) => b.to_string(),
            Literal::Int(i) => i.to_string(),
            Literal::Float(f) => format_float(*f),
            Literal::Text(s) => format!("'{}'", s),
            Literal::List(items) => format!(
                "[{}]",
                items.iter().map(Literal::describe).collect::<Vec<_>>().join(", ")
            ),
        }
    }
}

impl From<&str> for Literal {
    fn from(value: &str) -> Self {
        Literal::Text(value.to_string())
    }
}

impl From<i64> for Literal {
    fn from(value: i64) -> Self {
        Literal::Int(value)
    }
}

impl From<f64> for Literal {
    fn from(value: f64) -> Self {
        Literal::Float(value)
    }
}

/// Parse an integer first, then a float
pub fn parse_number(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if let Ok(i) = trimmed.parse::<i64>() {
        return Some(Value::Int(i));
    }
    trimmed.parse::<f64>().ok().filter(|f| !f.is_nan()).map(Value::Float)
}

/// Parse common boolean spellings
pub fn parse_bool(text: &str) -> Option<bool> {
    match text.trim().to_lowercase().as_str() {
        "true" | "t" | "yes" | "y" | "1" => Some(true),
        "false" | "f" | "no" | "n" | "0" => Some(false),
        _ => None,
    }
}

/// Timestamp parsing, formatting and calendar helpers
pub mod temporal {
    use super::*;
    use chrono_tz::Tz;

    const DATETIME_FORMATS: &[&str] = &[
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M",
        "%Y/%m/%d %H:%M:%S",
        "%d/%m/%Y %H:%M:%S",
    ];

    const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%d/%m/%Y", "%d.%m.%Y", "%Y%m%d"];

    /// A column timezone: a fixed offset or an IANA zone with DST rules
    #[derive(Debug, Clone, Copy, PartialEq)]
    pub enum Zone {
        Fixed(FixedOffset),
        Named(Tz),
    }

    impl Zone {
        pub fn local(&self, utc: &DateTime<Utc>) -> NaiveDateTime {
            match self {
                Zone::Fixed(offset) => utc.with_timezone(offset).naive_local(),
                Zone::Named(tz) => utc.with_timezone(tz).naive_local(),
            }
        }

        /// Epoch milliseconds of a wall-clock time
        ///
        /// A time repeated by a DST fold resolves to the earlier instant; a time
        /// skipped by a DST gap has none.
        pub fn resolve(&self, naive: &NaiveDateTime) -> Option<i64> {
            match self {
                Zone::Fixed(offset) => offset.from_local_datetime(naive).earliest().map(|dt| dt.timestamp_millis()),
                Zone::Named(tz) => tz.from_local_datetime(naive).earliest().map(|dt| dt.timestamp_millis()),
            }
        }
    }

    /// Resolve a timezone name: `UTC`, an offset like `+05:30`, or an IANA name
    pub fn zone_for(timezone: Option<&str>) -> Zone {
        let utc = Zone::Fixed(Utc.fix());
        let Some(tz) = timezone.map(str::trim) else { return utc };
        if tz.eq_ignore_ascii_case("utc") || tz == "Z" {
            return utc;
        }
        if let Some(offset) = parse_offset(tz) {
            return Zone::Fixed(offset);
        }
        match tz.parse::<Tz>() {
            Ok(named) => Zone::Named(named),
            Err(_) => {
                tracing::warn!("Unknown timezone '{}'; treating as UTC", tz);
                utc
            }
        }
    }

    /// Parse `+HH:MM`, `-HHMM` or `+HH`
    fn parse_offset(text: &str) -> Option<FixedOffset> {
        let text = text.strip_prefix("UTC").unwrap_or(text);
        let (sign, rest) = match text.chars().next()? {
            '+' => (1, &text[1..]),
            '-' => (-1, &text[1..]),
            _ => return None,
        };
        let digits: String = rest.chars().filter(|c| *c != ':').collect();
        if !digits.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        let (hours, minutes) = match digits.len() {
            2 => (digits.parse::<i32>().ok()?, 0),
            4 => (digits[..2].parse::<i32>().ok()?, digits[2..].parse::<i32>().ok()?),
            _ => return None,
        };
        FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
    }

    /// Parse a timestamp string into epoch milliseconds
    ///
    /// Strings without an explicit offset are interpreted in `timezone`.
    pub fn parse_millis(text: &str, timezone: Option<&str>) -> Option<i64> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
            return Some(dt.timestamp_millis());
        }
        let zone = zone_for(timezone);
        for format in DATETIME_FORMATS {
            if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
                return zone.resolve(&naive);
            }
        }
        for format in DATE_FORMATS {
            if let Ok(date) = NaiveDate::parse_from_str(text, format) {
                return zone.resolve(&date.and_hms_opt(0, 0, 0)?);
            }
        }
        None
    }

    /// Local wall-clock time of a timestamp in the column's timezone
    pub fn to_local(ms: i64, timezone: Option<&str>) -> Option<NaiveDateTime> {
        let utc = Utc.timestamp_millis_opt(ms).single()?;
        Some(zone_for(timezone).local(&utc))
    }

    /// Epoch milliseconds of a local wall-clock time in the given timezone
    pub fn from_local(naive: NaiveDateTime, timezone: Option<&str>) -> Option<i64> {
        zone_for(timezone).resolve(&naive)
    }

    /// `YYYY-MM-DD HH:MM:SS` rendering, dropping the time part at midnight
    pub fn format_millis(ms: i64, timezone: Option<&str>) -> String {
        match to_local(ms, timezone) {
            Some(local) => {
                if local.time() == chrono::NaiveTime::MIN {
                    local.format("%Y-%m-%d").to_string()
                } else if local.nanosecond() != 0 {
                    local.format("%Y-%m-%d %H:%M:%S%.3f").to_string()
                } else {
                    local.format("%Y-%m-%d %H:%M:%S").to_string()
                }
            }
            None => ms.to_string(),
        }
    }
}
