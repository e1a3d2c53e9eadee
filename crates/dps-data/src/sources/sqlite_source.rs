//! SQLite source: one read-only query against a database file

use std::path::PathBuf;

use async_trait::async_trait;
use dps_core::table::temporal;
use dps_core::{Column, ColumnType, DpsError, ProgressReporter, Result, SourceAdapter, SourceDescriptor, Table, Value};
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};

/// Rows between cancellation checks
const CHUNK_SIZE: usize = 5_000;

/// Runs a single `SELECT` (or `WITH ... SELECT`) and materializes the result
#[derive(Debug, Clone, Default)]
pub struct SqliteSource;

/// Raw cell as read from SQLite, before a column type is chosen
#[derive(Debug, Clone)]
enum Cell {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl SqliteSource {
    /// Database path named by a connection string
    ///
    /// Accepts `sqlite:///abs/path`, `sqlite://rel/path` or a plain path.
    pub fn database_path(connection_string: &str) -> PathBuf {
        let trimmed = connection_string.trim();
        let path = trimmed
            .strip_prefix("sqlite:///")
            .map(|rest| format!("/{}", rest))
            .or_else(|| trimmed.strip_prefix("sqlite://").map(str::to_string))
            .unwrap_or_else(|| trimmed.to_string());
        PathBuf::from(path)
    }

    /// Reject anything that is not exactly one read-only query
    pub fn validate_query(query: &str) -> Result<String> {
        let trimmed = query.trim().trim_end_matches(';').trim();
        if trimmed.is_empty() {
            return Err(DpsError::QueryFailed("Query is empty".into()));
        }
        if trimmed.contains(';') {
            return Err(DpsError::QueryFailed("Only a single statement is allowed".into()));
        }
        let first = trimmed
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_ascii_uppercase();
        if first != "SELECT" && first != "WITH" {
            return Err(DpsError::QueryFailed("Only read-only SELECT queries are allowed".into()));
        }
        Ok(trimmed.to_string())
    }

    /// Execute the query synchronously
    pub fn query(&self, connection_string: &str, query: &str, progress: &ProgressReporter) -> Result<Table> {
        let query = Self::validate_query(query)?;
        let path = Self::database_path(connection_string);
        if !path.exists() {
            return Err(DpsError::SourceUnavailable(format!("Database {} does not exist", path.display())));
        }
        let conn = Connection::open_with_flags(&path, OpenFlags::SQLITE_OPEN_READ_ONLY)
            .map_err(|e| DpsError::SourceUnavailable(format!("Failed to open SQLite database: {}", e)))?;
        progress.report(5, "Connected");

        let mut stmt = conn
            .prepare(&query)
            .map_err(|e| DpsError::QueryFailed(format!("Failed to prepare query: {}", e)))?;
        if !stmt.readonly() {
            return Err(DpsError::QueryFailed("Only read-only SELECT queries are allowed".into()));
        }

        let names: Vec<String> = stmt.column_names().into_iter().map(str::to_string).collect();
        let declared: Vec<Option<String>> = stmt
            .columns()
            .iter()
            .map(|c| c.decl_type().map(|t| t.to_ascii_uppercase()))
            .collect();
        let width = names.len();

        let mut cells: Vec<Vec<Cell>> = vec![Vec::new(); width];
        let mut rows = stmt
            .query([])
            .map_err(|e| DpsError::QueryFailed(format!("Failed to execute query: {}", e)))?;
        let mut row_count = 0;
        while let Some(row) = rows
            .next()
            .map_err(|e| DpsError::QueryFailed(format!("Failed to fetch row: {}", e)))?
        {
            for (col_idx, column) in cells.iter_mut().enumerate() {
                let value = row
                    .get_ref(col_idx)
                    .map_err(|e| DpsError::QueryFailed(format!("Failed to read column value: {}", e)))?;
                column.push(match value {
                    ValueRef::Null => Cell::Null,
                    ValueRef::Integer(i) => Cell::Integer(i),
                    ValueRef::Real(f) => Cell::Real(f),
                    ValueRef::Text(bytes) => Cell::Text(String::from_utf8_lossy(bytes).into_owned()),
                    ValueRef::Blob(_) => Cell::Null,
                });
            }
            row_count += 1;
            if row_count % CHUNK_SIZE == 0 {
                progress.check_cancelled()?;
                progress.report(50, format!("Fetched {} rows", row_count));
            }
        }
        progress.check_cancelled()?;

        let columns = names
            .into_iter()
            .zip(cells)
            .zip(declared)
            .map(|((name, column), declared)| build_column(name, column, declared.as_deref()))
            .collect();
        let table = Table::from_columns_with_rows(columns, row_count)?;
        progress.report(100, format!("Loaded {} rows", row_count));
        Ok(table)
    }
}

/// Choose a column type from the declared type and the values seen
fn build_column(name: String, cells: Vec<Cell>, declared: Option<&str>) -> Column {
    let present = || cells.iter().filter(|c| !matches!(c, Cell::Null));
    let declared = declared.unwrap_or_default();

    let dtype = if declared.contains("BOOL") && present().all(|c| matches!(c, Cell::Integer(0 | 1))) {
        ColumnType::Boolean
    } else if present().all(|c| matches!(c, Cell::Integer(_))) && present().next().is_some() {
        ColumnType::Integer
    } else if present().all(|c| matches!(c, Cell::Integer(_) | Cell::Real(_))) && present().next().is_some() {
        ColumnType::Float
    } else if (declared.contains("DATE") || declared.contains("TIME"))
        && present().all(|c| matches!(c, Cell::Text(s) if temporal::parse_millis(s, None).is_some()))
    {
        ColumnType::temporal()
    } else {
        ColumnType::Text
    };

    let values = cells
        .into_iter()
        .map(|cell| match (cell, &dtype) {
            (Cell::Null, _) => Value::Null,
            (Cell::Integer(i), ColumnType::Boolean) => Value::Bool(i != 0),
            (Cell::Integer(i), ColumnType::Integer) => Value::Int(i),
            (Cell::Integer(i), ColumnType::Float) => Value::Float(i as f64),
            (Cell::Real(f), ColumnType::Float) => Value::Float(f),
            (Cell::Text(s), ColumnType::Temporal { .. }) => {
                temporal::parse_millis(&s, None).map(Value::Timestamp).unwrap_or(Value::Null)
            }
            (Cell::Text(s), _) => Value::Text(s),
            (Cell::Integer(i), _) => Value::Text(i.to_string()),
            (Cell::Real(f), _) => Value::Text(dps_core::table::format_float(f)),
        })
        .collect();
    Column::new(name, dtype, values)
}

#[async_trait]
impl SourceAdapter for SqliteSource {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn handles(&self, descriptor: &SourceDescriptor) -> bool {
        matches!(descriptor, SourceDescriptor::Database { .. })
    }

    async fn load(&self, descriptor: &SourceDescriptor, progress: &ProgressReporter) -> Result<Table> {
        let SourceDescriptor::Database { connection_string, query } = descriptor else {
            return Err(DpsError::InvalidOperation(format!("sqlite source cannot load {}", descriptor)));
        };
        let (connection_string, query) = (connection_string.clone(), query.clone());
        let progress = progress.clone();
        tokio::task::spawn_blocking(move || SqliteSource.query(&connection_string, &query, &progress))
            .await
            .map_err(|e| DpsError::SourceUnavailable(format!("SQLite reader stopped: {}", e)))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_db(dir: &TempDir) -> PathBuf {
        let path = dir.path().join("sales.db");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE sales (id INTEGER, region TEXT, amount REAL, sold_on DATE, paid BOOLEAN);
             INSERT INTO sales VALUES (1, 'north', 10.5, '2024-01-05', 1);
             INSERT INTO sales VALUES (2, 'south', 20, '2024-01-20', 0);
             INSERT INTO sales VALUES (3, NULL, NULL, NULL, NULL);",
        )
        .unwrap();
        path
    }

    #[test]
    fn test_query_types() {
        let dir = TempDir::new().unwrap();
        let path = sample_db(&dir);
        let conn = format!("sqlite://{}", path.display());
        let table = SqliteSource
            .query(&conn, "SELECT * FROM sales ORDER BY id;", &ProgressReporter::detached())
            .unwrap();
        assert_eq!(table.num_rows(), 3);
        assert_eq!(table.column_type("id").unwrap(), ColumnType::Integer);
        assert_eq!(table.column_type("amount").unwrap(), ColumnType::Float);
        assert_eq!(table.column_type("region").unwrap(), ColumnType::Text);
        assert!(table.column_type("sold_on").unwrap().is_temporal());
        assert_eq!(table.column_type("paid").unwrap(), ColumnType::Boolean);
        assert_eq!(table.column("amount").unwrap().values[1], Value::Float(20.0));
    }

    #[test]
    fn test_rejects_writes_and_batches() {
        assert!(SqliteSource::validate_query("DELETE FROM sales").is_err());
        assert!(SqliteSource::validate_query("SELECT 1; DROP TABLE sales").is_err());
        assert!(SqliteSource::validate_query("  with t as (select 1) select * from t ; ").is_ok());
    }

    #[test]
    fn test_connection_strings() {
        assert_eq!(SqliteSource::database_path("sqlite:///tmp/a.db"), PathBuf::from("/tmp/a.db"));
        assert_eq!(SqliteSource::database_path("sqlite://data/a.db"), PathBuf::from("data/a.db"));
        assert_eq!(SqliteSource::database_path("a.db"), PathBuf::from("a.db"));
    }

    #[test]
    fn test_missing_database() {
        let err = SqliteSource
            .query("/no/such.db", "SELECT 1", &ProgressReporter::detached())
            .unwrap_err();
        assert_eq!(err.kind(), dps_core::ErrorKind::SourceUnavailable);
    }
}
