//! Blank tables for starting from scratch

use async_trait::async_trait;
use dps_core::{Column, ColumnType, DpsError, ProgressReporter, Result, SourceAdapter, SourceDescriptor, Table};

#[derive(Debug, Clone, Default)]
pub struct ScratchSource;

impl ScratchSource {
    /// A `rows x cols` table of empty text cells
    ///
    /// Missing names default to `col_1..col_n`.
    pub fn build(rows: usize, cols: usize, names: &[String]) -> Result<Table> {
        if names.len() > cols {
            return Err(DpsError::InvalidOperation(format!(
                "{} names given for {} columns",
                names.len(),
                cols
            )));
        }
        let columns = (0..cols)
            .map(|i| {
                let name = names.get(i).cloned().unwrap_or_else(|| format!("col_{}", i + 1));
                Column::nulls(name, ColumnType::Text, rows)
            })
            .collect();
        Table::from_columns_with_rows(columns, rows)
    }
}

#[async_trait]
impl SourceAdapter for ScratchSource {
    fn name(&self) -> &str {
        "scratch"
    }

    fn handles(&self, descriptor: &SourceDescriptor) -> bool {
        matches!(descriptor, SourceDescriptor::Scratch { .. })
    }

    async fn load(&self, descriptor: &SourceDescriptor, progress: &ProgressReporter) -> Result<Table> {
        let SourceDescriptor::Scratch { rows, cols, names } = descriptor else {
            return Err(DpsError::InvalidOperation(format!("scratch source cannot load {}", descriptor)));
        };
        let table = Self::build(*rows, *cols, names)?;
        progress.report(100, "Created blank table");
        Ok(table)
    }
}
