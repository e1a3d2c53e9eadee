//! Delimited text source

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use async_trait::async_trait;
use csv::ReaderBuilder;
use dps_core::{
    Column, DpsError, FileFormat, ProgressReporter, Result, SourceAdapter, SourceDescriptor, Table, TextOptions,
};

use crate::config::NullConfig;
use crate::schema::{NumberFormat, SchemaDetector};

/// Rows between progress reports and cancellation checks
const CHUNK_SIZE: usize = 10_000;

/// Loads CSV and TSV files into a table
#[derive(Debug, Clone)]
pub struct CsvSource {
    nulls: NullConfig,
    sample_rows: usize,
}

impl CsvSource {
    pub fn new(nulls: NullConfig, sample_rows: usize) -> Self {
        Self { nulls, sample_rows }
    }

    /// Read a file synchronously
    pub fn read_path(&self, path: &Path, options: &TextOptions, progress: &ProgressReporter) -> Result<Table> {
        let file = File::open(path).map_err(|e| {
            DpsError::SourceUnavailable(format!("Cannot open {}: {}", path.display(), e))
        })?;
        let total_bytes = file.metadata().ok().map(|m| m.len());
        self.read_from(BufReader::new(file), total_bytes, options, progress)
    }

    /// Read delimited text from any reader
    pub fn read_from<R: Read>(
        &self,
        reader: R,
        total_bytes: Option<u64>,
        options: &TextOptions,
        progress: &ProgressReporter,
    ) -> Result<Table> {
        let delimiter = u8::try_from(options.delimiter)
            .map_err(|_| DpsError::InvalidOperation(format!("Delimiter {:?} is not a single byte", options.delimiter)))?;
        let mut csv_reader = ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(options.has_header)
            .flexible(true)
            .from_reader(reader);

        let mut headers: Vec<String> = if options.has_header {
            csv_reader.headers()?.iter().map(|h| h.trim().to_string()).collect()
        } else {
            Vec::new()
        };

        let mut rows: Vec<Vec<String>> = Vec::new();
        for (idx, result) in csv_reader.records().enumerate() {
            let record = result?;
            rows.push(record.iter().map(|s| s.to_string()).collect());

            if (idx + 1) % CHUNK_SIZE == 0 {
                progress.check_cancelled()?;
                if let Some(total) = total_bytes.filter(|t| *t > 0) {
                    let read = record.position().map_or(0, |p| p.byte());
                    let percent = (read.saturating_mul(90) / total).min(90) as u8;
                    progress.report(percent, format!("Read {} rows", idx + 1));
                }
            }
        }
        progress.check_cancelled()?;

        let width = rows.iter().map(Vec::len).max().unwrap_or(0).max(headers.len());
        if headers.len() < width {
            for i in headers.len()..width {
                headers.push(format!("col_{}", i + 1));
            }
        }
        dedup_headers(&mut headers);

        let detector = SchemaDetector::new()
            .with_sample_size(self.sample_rows)
            .with_nulls(self.nulls.clone())
            .with_number_format(NumberFormat {
                decimal: options.decimal,
                thousands: options.thousands,
            });
        let schema = detector.detect_from_samples(&headers, &rows);
        progress.report(95, "Converting columns");

        let columns = schema
            .columns
            .into_iter()
            .enumerate()
            .map(|(col_idx, (name, dtype))| {
                let values = rows
                    .iter()
                    .map(|row| match row.get(col_idx) {
                        Some(cell) => detector.parse_cell(cell, &dtype),
                        None => dps_core::Value::Null,
                    })
                    .collect();
                Column::new(name, dtype, values)
            })
            .collect();

        let table = Table::from_columns_with_rows(columns, rows.len())?;
        progress.report(100, format!("Loaded {} rows", table.num_rows()));
        Ok(table)
    }
}

impl Default for CsvSource {
    fn default() -> Self {
        Self::new(NullConfig::default(), crate::config::settings::DEFAULT_SAMPLE_ROWS)
    }
}

/// Make blank or repeated header names unique the way spreadsheet tools do
fn dedup_headers(headers: &mut [String]) {
    let mut seen = ahash::AHashSet::new();
    for (i, header) in headers.iter_mut().enumerate() {
        if header.is_empty() {
            *header = format!("col_{}", i + 1);
        }
        let base = header.clone();
        let mut n = 1;
        while !seen.insert(header.clone()) {
            *header = format!("{}.{}", base, n);
            n += 1;
        }
    }
}

#[async_trait]
impl SourceAdapter for CsvSource {
    fn name(&self) -> &str {
        "csv"
    }

    fn handles(&self, descriptor: &SourceDescriptor) -> bool {
        matches!(
            descriptor,
            SourceDescriptor::LocalFile { format: FileFormat::Csv | FileFormat::Tsv, .. }
        )
    }

    async fn load(&self, descriptor: &SourceDescriptor, progress: &ProgressReporter) -> Result<Table> {
        let SourceDescriptor::LocalFile { path, .. } = descriptor else {
            return Err(DpsError::InvalidOperation(format!("csv source cannot load {}", descriptor)));
        };
        let options = descriptor.text_options();
        let path = path.clone();
        let source = self.clone();
        let progress = progress.clone();
        tokio::task::spawn_blocking(move || source.read_path(&path, &options, &progress))
            .await
            .map_err(|e| DpsError::SourceUnavailable(format!("CSV reader stopped: {}", e)))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dps_core::{ColumnType, Value};
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn read(text: &str, options: &TextOptions) -> Table {
        CsvSource::default()
            .read_from(text.as_bytes(), None, options, &ProgressReporter::detached())
            .unwrap()
    }

    #[test]
    fn test_basic_read() {
        let table = read("x,y\n1,a\n2,b\n3,a\n", &TextOptions::default());
        assert_eq!(table.num_rows(), 3);
        assert_eq!(table.column_type("x").unwrap(), ColumnType::Integer);
        assert_eq!(table.column("y").unwrap().values[1], Value::Text("b".into()));
    }

    #[test]
    fn test_semicolon_with_decimal_comma() {
        let options = TextOptions {
            delimiter: ';',
            decimal: ',',
            thousands: Some('.'),
            has_header: true,
        };
        let table = read("name;price\nA;1.234,50\nB;\n", &options);
        let price = table.column("price").unwrap();
        assert_eq!(price.dtype, ColumnType::Float);
        assert_eq!(price.values, vec![Value::Float(1234.5), Value::Null]);
    }

    #[test]
    fn test_ragged_rows_and_headers() {
        let options = TextOptions {
            has_header: false,
            ..TextOptions::default()
        };
        let table = read("1,2\n3\n", &options);
        assert_eq!(table.column_names(), vec!["col_1", "col_2"]);
        assert_eq!(table.column("col_2").unwrap().values, vec![Value::Int(2), Value::Null]);

        let table = read("a,a,\n1,2,3\n", &TextOptions::default());
        assert_eq!(table.column_names(), vec!["a", "a.1", "col_3"]);
    }

    #[test]
    fn test_reads_past_progress_chunks() {
        let mut text = String::from("n\n");
        for i in 0..(CHUNK_SIZE * 2 + 5) {
            text.push_str(&format!("{}\n", i));
        }
        let table = CsvSource::default()
            .read_from(
                text.as_bytes(),
                Some(text.len() as u64),
                &TextOptions::default(),
                &ProgressReporter::detached(),
            )
            .unwrap();
        assert_eq!(table.num_rows(), CHUNK_SIZE * 2 + 5);
        assert_eq!(table.column("n").unwrap().values[CHUNK_SIZE], Value::Int(CHUNK_SIZE as i64));
    }

    #[test]
    fn test_cancelled_before_read() {
        let reporter = ProgressReporter::detached();
        reporter.token().cancel();
        let err = CsvSource::default()
            .read_from("x\n1\n".as_bytes(), None, &TextOptions::default(), &reporter)
            .unwrap_err();
        assert!(matches!(err, DpsError::Cancelled));
    }

    #[tokio::test]
    async fn test_adapter_loads_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "when,amount").unwrap();
        writeln!(file, "2024-01-05,10").unwrap();
        writeln!(file, "2024-02-03,30").unwrap();

        let source = CsvSource::default();
        let descriptor = SourceDescriptor::csv(file.path());
        assert!(source.handles(&descriptor));
        let table = source.load(&descriptor, &ProgressReporter::detached()).await.unwrap();
        assert_eq!(table.column_type("when").unwrap(), ColumnType::temporal());
        assert_eq!(table.num_rows(), 2);
    }

    #[tokio::test]
    async fn test_missing_file_is_unavailable() {
        let descriptor = SourceDescriptor::csv("/definitely/not/here.csv");
        let err = CsvSource::default()
            .load(&descriptor, &ProgressReporter::detached())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), dps_core::ErrorKind::SourceUnavailable);
    }
}
