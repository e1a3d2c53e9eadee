//! Arrow IPC encoding of tables, used by the subset cache and project blobs

use std::collections::HashMap;
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use arrow::compute::concat_batches;
use arrow::datatypes::Schema;
use arrow::ipc::reader::StreamReader;
use arrow::ipc::writer::StreamWriter;
use dps_core::{DpsError, Result, Table};

/// Schema metadata key holding the row count, for tables without columns
const ROWS_KEY: &str = "dps.rows";

pub fn to_ipc_bytes(table: &Table) -> Result<Vec<u8>> {
    let batch = table.batch();
    let metadata = HashMap::from([(ROWS_KEY.to_string(), table.num_rows().to_string())]);
    let schema = Arc::new(Schema::new_with_metadata(batch.schema().fields().clone(), metadata));
    let batch = batch.clone().with_schema(schema.clone())?;

    let mut bytes = Vec::new();
    {
        let mut writer = StreamWriter::try_new(&mut bytes, &schema)?;
        if table.num_columns() > 0 {
            writer.write(&batch)?;
        }
        writer.finish()?;
    }
    Ok(bytes)
}

pub fn from_ipc_bytes(bytes: &[u8]) -> Result<Table> {
    let reader = StreamReader::try_new(Cursor::new(bytes), None)?;
    let schema = reader.schema();
    let rows = schema
        .metadata()
        .get(ROWS_KEY)
        .and_then(|r| r.parse::<usize>().ok())
        .ok_or_else(|| DpsError::CorruptedProject("table blob has no row count".into()))?;
    let batches = reader.collect::<std::result::Result<Vec<_>, _>>()?;

    if schema.fields().is_empty() {
        return Table::from_columns_with_rows(Vec::new(), rows);
    }
    let plain = Arc::new(Schema::new(schema.fields().clone()));
    let batch = concat_batches(&plain, batches.iter())?;
    if batch.num_rows() != rows {
        return Err(DpsError::CorruptedProject(format!(
            "table blob holds {} rows, expected {}",
            batch.num_rows(),
            rows
        )));
    }
    Table::from_batch(batch)
}

pub fn write_ipc_file(table: &Table, path: &Path) -> Result<()> {
    std::fs::write(path, to_ipc_bytes(table)?)?;
    Ok(())
}

pub fn read_ipc_file(path: &Path) -> Result<Table> {
    from_ipc_bytes(&std::fs::read(path)?)
}
