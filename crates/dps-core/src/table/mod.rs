//! The engine's rectangular table: an arrow record batch with value semantics

mod column;
mod value;

pub use column::Column;
pub use value::{format_float, parse_bool, parse_number, temporal, ColumnType, Literal, Value};

use std::sync::Arc;

use arrow::array::{ArrayRef, BooleanArray, UInt64Array};
use arrow::compute::{filter_record_batch, take};
use arrow::datatypes::{Field, Schema, SchemaRef};
use arrow::record_batch::{RecordBatch, RecordBatchOptions};

use crate::error::{DpsError, Result};

/// A rectangular, column-named collection of typed values
///
/// Cloning is cheap: arrow buffers are immutable and shared, so snapshots
/// held by the history engine can never observe later edits.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    batch: RecordBatch,
}

impl Table {
    /// A table with no columns and no rows
    pub fn empty() -> Self {
        Self {
            batch: RecordBatch::new_empty(Arc::new(Schema::empty())),
        }
    }

    /// Wrap a record batch, normalizing every column to its canonical storage
    pub fn from_batch(batch: RecordBatch) -> Result<Self> {
        let schema = batch.schema();
        let columns = schema
            .fields()
            .iter()
            .zip(batch.columns())
            .map(|(field, array)| Column::from_array(field.name().clone(), array))
            .collect::<Result<Vec<_>>>()?;
        Self::from_columns_with_rows(columns, batch.num_rows())
    }

    /// Build a table from materialized columns
    pub fn from_columns(columns: Vec<Column>) -> Result<Self> {
        let rows = columns.first().map(Column::len).unwrap_or(0);
        Self::from_columns_with_rows(columns, rows)
    }

    /// Build a table, keeping `rows` even when there are no columns
    pub fn from_columns_with_rows(columns: Vec<Column>, rows: usize) -> Result<Self> {
        let mut seen = ahash::AHashSet::new();
        for column in &columns {
            if !seen.insert(column.name.as_str()) {
                return Err(DpsError::NameConflict(column.name.clone()));
            }
            if column.len() != rows {
                return Err(DpsError::InvalidOperation(format!(
                    "Column '{}' has {} rows, expected {}",
                    column.name,
                    column.len(),
                    rows
                )));
            }
        }

        let fields: Vec<Field> = columns
            .iter()
            .map(|c| Field::new(c.name.as_str(), c.dtype.to_arrow(), true))
            .collect();
        let arrays = columns
            .iter()
            .map(Column::to_array)
            .collect::<Result<Vec<ArrayRef>>>()?;

        let options = RecordBatchOptions::new().with_row_count(Some(rows));
        let batch = RecordBatch::try_new_with_options(Arc::new(Schema::new(fields)), arrays, &options)?;
        Ok(Self { batch })
    }

    /// The underlying record batch
    pub fn batch(&self) -> &RecordBatch {
        &self.batch
    }

    pub fn into_batch(self) -> RecordBatch {
        self.batch
    }

    pub fn schema(&self) -> SchemaRef {
        self.batch.schema()
    }

    pub fn num_rows(&self) -> usize {
        self.batch.num_rows()
    }

    pub fn num_columns(&self) -> usize {
        self.batch.num_columns()
    }

    pub fn is_empty(&self) -> bool {
        self.num_rows() == 0
    }

    /// Column names in order
    pub fn column_names(&self) -> Vec<String> {
        self.batch.schema().fields().iter().map(|f| f.name().clone()).collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.batch.schema().index_of(name).is_ok()
    }

    /// Index of a column, or `UnknownColumn`
    pub fn column_index(&self, name: &str) -> Result<usize> {
        self.batch
            .schema()
            .index_of(name)
            .map_err(|_| DpsError::UnknownColumn(name.to_string()))
    }

    /// Fail with `UnknownColumn` for the first name that does not exist
    pub fn require_columns<S: AsRef<str>>(&self, names: &[S]) -> Result<()> {
        for name in names {
            self.column_index(name.as_ref())?;
        }
        Ok(())
    }

    /// Logical type of a column
    pub fn column_type(&self, name: &str) -> Result<ColumnType> {
        let idx = self.column_index(name)?;
        ColumnType::from_arrow(self.batch.schema().field(idx).data_type())
    }

    /// `(name, type)` for every column
    pub fn schema_summary(&self) -> Result<Vec<(String, ColumnType)>> {
        self.batch
            .schema()
            .fields()
            .iter()
            .map(|f| Ok((f.name().clone(), ColumnType::from_arrow(f.data_type())?)))
            .collect()
    }

    /// Materialize one column
    pub fn column(&self, name: &str) -> Result<Column> {
        let idx = self.column_index(name)?;
        Column::from_array(name, self.batch.column(idx))
    }

    /// Materialize every column
    pub fn columns(&self) -> Result<Vec<Column>> {
        let schema = self.batch.schema();
        schema
            .fields()
            .iter()
            .zip(self.batch.columns())
            .map(|(field, array)| Column::from_array(field.name().clone(), array))
            .collect()
    }

    /// Values of one row, in column order
    pub fn row(&self, index: usize) -> Result<Vec<Value>> {
        if index >= self.num_rows() {
            return Err(DpsError::NotFound(format!("row {}", index)));
        }
        let sliced = Table {
            batch: self.batch.slice(index, 1),
        };
        Ok(sliced
            .columns()?
            .into_iter()
            .map(|mut c| c.values.pop().unwrap_or(Value::Null))
            .collect())
    }

    /// Keep rows where `mask` is true
    pub fn filter_rows(&self, mask: &[bool]) -> Result<Table> {
        if mask.len() != self.num_rows() {
            return Err(DpsError::InvalidOperation(format!(
                "Row mask has {} entries for {} rows",
                mask.len(),
                self.num_rows()
            )));
        }
        if self.num_columns() == 0 {
            let kept = mask.iter().filter(|m| **m).count();
            return Self::from_columns_with_rows(Vec::new(), kept);
        }
        let predicate = BooleanArray::from(mask.to_vec());
        Ok(Table {
            batch: filter_record_batch(&self.batch, &predicate)?,
        })
    }

    /// Gather rows by index, in the given order (repeats allowed)
    pub fn take_rows(&self, indices: &[usize]) -> Result<Table> {
        if let Some(bad) = indices.iter().find(|i| **i >= self.num_rows()) {
            return Err(DpsError::NotFound(format!("row {}", bad)));
        }
        if self.num_columns() == 0 {
            return Self::from_columns_with_rows(Vec::new(), indices.len());
        }
        let index_array = UInt64Array::from(indices.iter().map(|i| *i as u64).collect::<Vec<_>>());
        let arrays = self
            .batch
            .columns()
            .iter()
            .map(|array| take(array.as_ref(), &index_array, None))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let options = RecordBatchOptions::new().with_row_count(Some(indices.len()));
        Ok(Table {
            batch: RecordBatch::try_new_with_options(self.batch.schema(), arrays, &options)?,
        })
    }

    /// First `n` rows
    pub fn head(&self, n: usize) -> Table {
        let n = n.min(self.num_rows());
        Table {
            batch: self.batch.slice(0, n),
        }
    }

    /// Human-readable grid rendering
    pub fn pretty(&self) -> Result<String> {
        Ok(arrow::util::pretty::pretty_format_batches(&[self.batch.clone()])?.to_string())
    }
}

impl Default for Table {
    fn default() -> Self {
        Self::empty()
    }
}

/// Build a table from `(name, type, values)` triples
///
/// Mostly useful for tests and scratch tables.
pub fn table_from(columns: Vec<(&str, ColumnType, Vec<Value>)>) -> Result<Table> {
    Table::from_columns(
        columns
            .into_iter()
            .map(|(name, dtype, values)| Column::new(name, dtype, values))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Table {
        table_from(vec![
            ("x", ColumnType::Integer, vec![Value::Int(1), Value::Int(2), Value::Int(3)]),
            (
                "y",
                ColumnType::Text,
                vec![Value::Text("a".into()), Value::Text("b".into()), Value::Text("a".into())],
            ),
        ])
        .unwrap()
    }

    #[test]
    fn test_filter_and_take() {
        let table = sample();
        let filtered = table.filter_rows(&[true, false, true]).unwrap();
        assert_eq!(filtered.num_rows(), 2);
        assert_eq!(filtered.column("x").unwrap().values, vec![Value::Int(1), Value::Int(3)]);

        let taken = table.take_rows(&[2, 0]).unwrap();
        assert_eq!(taken.column("x").unwrap().values, vec![Value::Int(3), Value::Int(1)]);
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let err = table_from(vec![
            ("x", ColumnType::Integer, vec![]),
            ("x", ColumnType::Integer, vec![]),
        ])
        .unwrap_err();
        assert!(matches!(err, DpsError::NameConflict(_)));
    }

    #[test]
    fn test_zero_column_table_keeps_rows() {
        let table = Table::from_columns_with_rows(Vec::new(), 4).unwrap();
        assert_eq!(table.num_rows(), 4);
        assert_eq!(table.filter_rows(&[true, false, true, false]).unwrap().num_rows(), 2);
    }

    #[test]
    fn test_row_and_unknown_column() {
        let table = sample();
        assert_eq!(table.row(1).unwrap(), vec![Value::Int(2), Value::Text("b".into())]);
        assert!(matches!(table.column("nope"), Err(DpsError::UnknownColumn(_))));
    }

    #[test]
    fn test_value_semantics_on_clone() {
        let table = sample();
        let snapshot = table.clone();
        let changed = table.filter_rows(&[false, false, true]).unwrap();
        assert_eq!(snapshot, sample());
        assert_ne!(changed, snapshot);
    }
}
