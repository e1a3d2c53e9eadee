//! JSON source: record arrays or column-oriented objects

use std::path::Path;

use async_trait::async_trait;
use dps_core::table::temporal;
use dps_core::{
    Column, ColumnType, DpsError, FileFormat, ProgressReporter, Result, SourceAdapter, SourceDescriptor, Table, Value,
};
use serde_json::{Map, Value as JsonValue};

/// Loads `[{col: value}, ...]` or `{col: {index: value}}` documents
#[derive(Debug, Clone, Default)]
pub struct JsonSource;

impl JsonSource {
    pub fn read_path(&self, path: &Path, progress: &ProgressReporter) -> Result<Table> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            DpsError::SourceUnavailable(format!("Cannot open {}: {}", path.display(), e))
        })?;
        progress.check_cancelled()?;
        let table = self.read_str(&text)?;
        progress.report(100, format!("Loaded {} rows", table.num_rows()));
        Ok(table)
    }

    pub fn read_str(&self, text: &str) -> Result<Table> {
        let document: JsonValue = serde_json::from_str(text)?;
        let (names, rows) = match document {
            JsonValue::Array(records) => Self::records(records)?,
            JsonValue::Object(columns) => Self::columns(columns)?,
            other => {
                return Err(DpsError::InvalidOperation(format!(
                    "Expected a JSON array or object, found {}",
                    json_kind(&other)
                )))
            }
        };

        let row_count = rows.len();
        let columns = names
            .into_iter()
            .enumerate()
            .map(|(idx, name)| {
                let cells: Vec<&JsonValue> = rows.iter().map(|r| &r[idx]).collect();
                column_from_json(name, &cells)
            })
            .collect();
        Table::from_columns_with_rows(columns, row_count)
    }

    fn records(records: Vec<JsonValue>) -> Result<(Vec<String>, Vec<Vec<JsonValue>>)> {
        let mut names: Vec<String> = Vec::new();
        let mut objects = Vec::with_capacity(records.len());
        for record in records {
            let JsonValue::Object(object) = record else {
                return Err(DpsError::InvalidOperation("Every JSON record must be an object".into()));
            };
            for key in object.keys() {
                if !names.contains(key) {
                    names.push(key.clone());
                }
            }
            objects.push(object);
        }
        let rows = objects
            .into_iter()
            .map(|mut object| {
                names
                    .iter()
                    .map(|n| object.remove(n).unwrap_or(JsonValue::Null))
                    .collect()
            })
            .collect();
        Ok((names, rows))
    }

    fn columns(columns: Map<String, JsonValue>) -> Result<(Vec<String>, Vec<Vec<JsonValue>>)> {
        let mut index: Vec<String> = Vec::new();
        for value in columns.values() {
            let JsonValue::Object(cells) = value else {
                return Err(DpsError::InvalidOperation("Column-oriented JSON needs an object per column".into()));
            };
            for key in cells.keys() {
                if !index.contains(key) {
                    index.push(key.clone());
                }
            }
        }
        let names: Vec<String> = columns.keys().cloned().collect();
        let rows = index
            .iter()
            .map(|key| {
                columns
                    .values()
                    .map(|cells| cells.get(key).cloned().unwrap_or(JsonValue::Null))
                    .collect()
            })
            .collect();
        Ok((names, rows))
    }
}

fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "a boolean",
        JsonValue::Number(_) => "a number",
        JsonValue::String(_) => "a string",
        JsonValue::Array(_) => "an array",
        JsonValue::Object(_) => "an object",
    }
}

/// Pick the narrowest type holding every non-null cell
fn column_from_json(name: String, cells: &[&JsonValue]) -> Column {
    let present: Vec<&JsonValue> = cells.iter().copied().filter(|c| !c.is_null()).collect();
    let dtype = if present.is_empty() {
        ColumnType::Text
    } else if present.iter().all(|c| c.is_boolean()) {
        ColumnType::Boolean
    } else if present.iter().all(|c| c.is_i64()) {
        ColumnType::Integer
    } else if present.iter().all(|c| c.is_number()) {
        ColumnType::Float
    } else if present
        .iter()
        .all(|c| c.as_str().and_then(|s| temporal::parse_millis(s, None)).is_some())
    {
        ColumnType::temporal()
    } else {
        ColumnType::Text
    };

    let values = cells
        .iter()
        .map(|cell| match (cell, &dtype) {
            (JsonValue::Null, _) => Value::Null,
            (JsonValue::Bool(b), ColumnType::Boolean) => Value::Bool(*b),
            (JsonValue::Number(n), ColumnType::Integer) => n.as_i64().map(Value::Int).unwrap_or(Value::Null),
            (JsonValue::Number(n), ColumnType::Float) => n.as_f64().map(Value::Float).unwrap_or(Value::Null),
            (JsonValue::String(s), ColumnType::Temporal { .. }) => {
                temporal::parse_millis(s, None).map(Value::Timestamp).unwrap_or(Value::Null)
            }
            (JsonValue::String(s), _) => Value::Text(s.clone()),
            (other, _) => Value::Text(other.to_string()),
        })
        .collect();
    Column::new(name, dtype, values)
}

#[async_trait]
impl SourceAdapter for JsonSource {
    fn name(&self) -> &str {
        "json"
    }

    fn handles(&self, descriptor: &SourceDescriptor) -> bool {
        matches!(descriptor, SourceDescriptor::LocalFile { format: FileFormat::Json, .. })
    }

    async fn load(&self, descriptor: &SourceDescriptor, progress: &ProgressReporter) -> Result<Table> {
        let SourceDescriptor::LocalFile { path, .. } = descriptor else {
            return Err(DpsError::InvalidOperation(format!("json source cannot load {}", descriptor)));
        };
        let path = path.clone();
        let progress = progress.clone();
        tokio::task::spawn_blocking(move || JsonSource.read_path(&path, &progress))
            .await
            .map_err(|e| DpsError::SourceUnavailable(format!("JSON reader stopped: {}", e)))?
    }
}
