//! Data export to CSV, JSON and Excel

use std::io::Write;
use std::path::Path;

use dps_core::{Column, DpsError, Result, Table, Value};
use rust_xlsxwriter::Workbook;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value as JsonValue};

/// Export options for data files
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportOptions {
    /// Write the row position as a leading `index` column
    pub include_index: bool,
}

/// Export format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportFormat {
    Csv,
    Json,
    Excel,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
            ExportFormat::Excel => "xlsx",
        }
    }

    pub fn filter_name(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "CSV File",
            ExportFormat::Json => "JSON File",
            ExportFormat::Excel => "Excel Workbook",
        }
    }

    /// Guess the format from a file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()?.to_ascii_lowercase().as_str() {
            "csv" | "txt" => Some(ExportFormat::Csv),
            "json" => Some(ExportFormat::Json),
            "xlsx" => Some(ExportFormat::Excel),
            _ => None,
        }
    }
}

/// Write `table` to `path` in the given format
pub fn export_table(table: &Table, path: &Path, format: ExportFormat, options: &ExportOptions) -> Result<()> {
    match format {
        ExportFormat::Csv => {
            let file = std::fs::File::create(path)?;
            write_csv(table, std::io::BufWriter::new(file), options)?;
        }
        ExportFormat::Json => {
            let text = serde_json::to_string_pretty(&to_json(table, options)?)?;
            std::fs::write(path, text)?;
        }
        ExportFormat::Excel => write_excel(table, path, options)?,
    }
    tracing::info!("Exported {} rows to {}", table.num_rows(), path.display());
    Ok(())
}

fn cell_text(column: &Column, row: usize) -> String {
    column.values[row].to_text(column.dtype.timezone()).unwrap_or_default()
}

pub fn write_csv<W: Write>(table: &Table, writer: W, options: &ExportOptions) -> Result<()> {
    let columns = table.columns()?;
    let mut out = csv::Writer::from_writer(writer);
    let csv_err = |e: csv::Error| DpsError::Csv(e.to_string());

    let mut header: Vec<String> = Vec::with_capacity(columns.len() + 1);
    if options.include_index {
        header.push(String::new());
    }
    header.extend(columns.iter().map(|c| c.name.clone()));
    out.write_record(&header).map_err(csv_err)?;

    for row in 0..table.num_rows() {
        let mut record: Vec<String> = Vec::with_capacity(header.len());
        if options.include_index {
            record.push(row.to_string());
        }
        record.extend(columns.iter().map(|c| cell_text(c, row)));
        out.write_record(&record).map_err(csv_err)?;
    }
    out.flush()?;
    Ok(())
}

fn json_cell(value: &Value, timezone: Option<&str>) -> JsonValue {
    match value {
        v if v.is_null() => JsonValue::Null,
        Value::Bool(b) => JsonValue::Bool(*b),
        Value::Int(i) => JsonValue::Number((*i).into()),
        Value::Float(f) => Number::from_f64(*f).map(JsonValue::Number).unwrap_or(JsonValue::Null),
        other => other.to_text(timezone).map(JsonValue::String).unwrap_or(JsonValue::Null),
    }
}

/// Records (`[{col: value}]`), or `{col: {index: value}}` with the index on
pub fn to_json(table: &Table, options: &ExportOptions) -> Result<JsonValue> {
    let columns = table.columns()?;
    if options.include_index {
        let mut object = Map::new();
        for column in &columns {
            let tz = column.dtype.timezone();
            let cells: Map<String, JsonValue> = column
                .values
                .iter()
                .enumerate()
                .map(|(i, v)| (i.to_string(), json_cell(v, tz)))
                .collect();
            object.insert(column.name.clone(), JsonValue::Object(cells));
        }
        return Ok(JsonValue::Object(object));
    }

    let records = (0..table.num_rows())
        .map(|row| {
            let record: Map<String, JsonValue> = columns
                .iter()
                .map(|c| (c.name.clone(), json_cell(&c.values[row], c.dtype.timezone())))
                .collect();
            JsonValue::Object(record)
        })
        .collect();
    Ok(JsonValue::Array(records))
}

fn write_excel(table: &Table, path: &Path, options: &ExportOptions) -> Result<()> {
    let xlsx_err = |e: rust_xlsxwriter::XlsxError| DpsError::Io(std::io::Error::other(e.to_string()));
    let columns = table.columns()?;
    let offset: u16 = if options.include_index { 1 } else { 0 };
    if table.num_rows() >= 1_048_576 || columns.len() + offset as usize > 16_384 {
        return Err(DpsError::InvalidOperation("Table is too large for an Excel sheet".into()));
    }

    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    if options.include_index {
        worksheet.write_string(0, 0, "index").map_err(xlsx_err)?;
    }
    for (c, column) in columns.iter().enumerate() {
        let col = c as u16 + offset;
        worksheet.write_string(0, col, &column.name).map_err(xlsx_err)?;
        let tz = column.dtype.timezone();
        for (r, value) in column.values.iter().enumerate() {
            let row = r as u32 + 1;
            match value {
                v if v.is_null() => {}
                Value::Int(i) => {
                    worksheet.write_number(row, col, *i as f64).map_err(xlsx_err)?;
                }
                Value::Float(f) => {
                    worksheet.write_number(row, col, *f).map_err(xlsx_err)?;
                }
                Value::Bool(b) => {
                    worksheet.write_boolean(row, col, *b).map_err(xlsx_err)?;
                }
                other => {
                    let text = other.to_text(tz).unwrap_or_default();
                    worksheet.write_string(row, col, &text).map_err(xlsx_err)?;
                }
            }
        }
    }
    if options.include_index {
        for r in 0..table.num_rows() {
            worksheet.write_number(r as u32 + 1, 0, r as f64).map_err(xlsx_err)?;
        }
    }
    workbook.save(path).map_err(xlsx_err)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::test_support::*;
    use dps_core::table::table_from;
    use dps_core::ColumnType;
    use tempfile::TempDir;

    fn sample() -> Table {
        table_from(vec![
            ("n", ColumnType::Integer, ints(&[Some(1), None])),
            ("f", ColumnType::Float, floats(&[Some(2.0), Some(0.5)])),
            ("s", ColumnType::Text, texts(&[Some("a,b"), Some("c")])),
        ])
        .unwrap()
    }

    #[test]
    fn test_csv_with_and_without_index() {
        let mut bytes = Vec::new();
        write_csv(&sample(), &mut bytes, &ExportOptions::default()).unwrap();
        assert_eq!(String::from_utf8(bytes).unwrap(), "n,f,s\n1,2.0,\"a,b\"\n,0.5,c\n");

        let mut bytes = Vec::new();
        write_csv(&sample(), &mut bytes, &ExportOptions { include_index: true }).unwrap();
        assert!(String::from_utf8(bytes).unwrap().starts_with(",n,f,s\n0,1,"));
    }

    #[test]
    fn test_json_orientations() {
        let records = to_json(&sample(), &ExportOptions::default()).unwrap();
        assert_eq!(records[0]["n"], serde_json::json!(1));
        assert_eq!(records[1]["n"], JsonValue::Null);
        assert_eq!(records[1]["s"], serde_json::json!("c"));

        let columns = to_json(&sample(), &ExportOptions { include_index: true }).unwrap();
        assert_eq!(columns["f"]["1"], serde_json::json!(0.5));
    }

    #[test]
    fn test_export_files() {
        let dir = TempDir::new().unwrap();
        for format in [ExportFormat::Csv, ExportFormat::Json, ExportFormat::Excel] {
            let path = dir.path().join(format!("out.{}", format.extension()));
            export_table(&sample(), &path, format, &ExportOptions::default()).unwrap();
            assert!(path.exists());
            assert_eq!(ExportFormat::from_path(&path), Some(format));
        }
    }
}
