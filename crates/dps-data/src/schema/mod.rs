//! Column type detection for text sources

use ahash::AHashSet;
use dps_core::table::{parse_number, temporal};
use dps_core::{ColumnType, Value};

use crate::config::NullConfig;

/// Decimal and thousands separators of a text source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NumberFormat {
    pub decimal: char,
    pub thousands: Option<char>,
}

impl Default for NumberFormat {
    fn default() -> Self {
        Self {
            decimal: '.',
            thousands: None,
        }
    }
}

impl NumberFormat {
    /// Rewrite a localized number into Rust's parse syntax
    pub fn normalize<'a>(&self, text: &'a str) -> std::borrow::Cow<'a, str> {
        let text = text.trim();
        if self.decimal == '.' && self.thousands.is_none() {
            return std::borrow::Cow::Borrowed(text);
        }
        let mut out = String::with_capacity(text.len());
        for c in text.chars() {
            if Some(c) == self.thousands {
                continue;
            }
            out.push(if c == self.decimal { '.' } else { c });
        }
        std::borrow::Cow::Owned(out)
    }
}

/// Schema detector for analyzing sampled text and choosing column types
pub struct SchemaDetector {
    sample_size: usize,
    nulls: NullConfig,
    numbers: NumberFormat,
}

/// Detected layout of a text source
#[derive(Debug, Clone)]
pub struct SchemaInfo {
    pub columns: Vec<(String, ColumnType)>,
    pub column_stats: Vec<ColumnStats>,
}

/// Statistics about a sampled column
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnStats {
    pub null_count: usize,
    pub distinct_count: usize,
    pub is_unique: bool,
}

impl SchemaDetector {
    pub fn new() -> Self {
        Self {
            sample_size: 1000,
            nulls: NullConfig::default(),
            numbers: NumberFormat::default(),
        }
    }

    pub fn with_sample_size(mut self, size: usize) -> Self {
        self.sample_size = size.max(1);
        self
    }

    pub fn with_nulls(mut self, nulls: NullConfig) -> Self {
        self.nulls = nulls;
        self
    }

    pub fn with_number_format(mut self, numbers: NumberFormat) -> Self {
        self.numbers = numbers;
        self
    }

    pub fn sample_size(&self) -> usize {
        self.sample_size
    }

    /// Detect column types from sampled rows
    pub fn detect_from_samples(&self, headers: &[String], samples: &[Vec<String>]) -> SchemaInfo {
        let samples = &samples[..samples.len().min(self.sample_size)];
        let mut columns = Vec::with_capacity(headers.len());
        let mut column_stats = Vec::with_capacity(headers.len());

        for (col_idx, header) in headers.iter().enumerate() {
            let (dtype, stats) = self.analyze_column(samples, col_idx);
            columns.push((header.clone(), dtype));
            column_stats.push(stats);
        }

        SchemaInfo { columns, column_stats }
    }

    /// Analyze a single column
    ///
    /// Candidates are tried in order: boolean, integer, float, temporal, and
    /// text when nothing else fits every non-null sample.
    fn analyze_column(&self, samples: &[Vec<String>], col_idx: usize) -> (ColumnType, ColumnStats) {
        let mut null_count = 0;
        let mut distinct = AHashSet::new();
        let mut non_null = 0;
        let mut is_bool = true;
        let mut is_int = true;
        let mut is_float = true;
        let mut is_temporal = true;

        for row in samples {
            let value = match row.get(col_idx) {
                Some(v) if !self.nulls.is_null(v) => v.trim(),
                _ => {
                    null_count += 1;
                    continue;
                }
            };
            non_null += 1;
            distinct.insert(value.to_string());

            if is_bool && !(value.eq_ignore_ascii_case("true") || value.eq_ignore_ascii_case("false")) {
                is_bool = false;
            }
            let number = self.numbers.normalize(value);
            if is_int && number.parse::<i64>().is_err() {
                is_int = false;
            }
            if is_float && number.parse::<f64>().is_err() {
                is_float = false;
            }
            if is_temporal && temporal::parse_millis(value, None).is_none() {
                is_temporal = false;
            }
        }

        let dtype = if non_null == 0 {
            ColumnType::Text
        } else if is_bool {
            ColumnType::Boolean
        } else if is_int {
            ColumnType::Integer
        } else if is_float {
            ColumnType::Float
        } else if is_temporal {
            ColumnType::temporal()
        } else {
            ColumnType::Text
        };

        let stats = ColumnStats {
            null_count,
            distinct_count: distinct.len(),
            is_unique: distinct.len() == non_null,
        };
        (dtype, stats)
    }

    /// Convert one text cell to a value of the detected type
    ///
    /// Cells that do not parse become null.
    pub fn parse_cell(&self, text: &str, dtype: &ColumnType) -> Value {
        if self.nulls.is_null(text) {
            return Value::Null;
        }
        match dtype {
            ColumnType::Boolean => dps_core::table::parse_bool(text).map(Value::Bool).unwrap_or(Value::Null),
            ColumnType::Integer => match parse_number(&self.numbers.normalize(text)) {
                Some(Value::Int(i)) => Value::Int(i),
                _ => Value::Null,
            },
            ColumnType::Float => parse_number(&self.numbers.normalize(text))
                .and_then(|v| v.as_f64())
                .map(Value::Float)
                .unwrap_or(Value::Null),
            ColumnType::Temporal { timezone } => temporal::parse_millis(text, timezone.as_deref())
                .map(Value::Timestamp)
                .unwrap_or(Value::Null),
            ColumnType::Text | ColumnType::Categorical => Value::Text(text.to_string()),
        }
    }
}

impl Default for SchemaDetector {
    fn default() -> Self {
        Self::new()
    }
}
