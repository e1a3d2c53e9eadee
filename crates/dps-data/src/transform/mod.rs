//! Operation application
//!
//! Every operation is a pure function from an input table to a new table.
//! Validation happens before any work, so a failed operation never yields a
//! partial result.

pub mod aggregate;
pub mod clean;
pub mod columns;
pub mod datetime;
pub mod expr;
pub mod filter;
pub mod merge;
pub mod numeric;
pub mod reshape;
pub mod sort;

use ahash::AHashMap;
use dps_core::{Column, DpsError, Operation, Result, Table};

/// Resolves table references used by `merge`
pub trait TableResolver {
    fn resolve(&self, reference: &str) -> Result<Table>;
}

/// Resolver for pipelines that never merge
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTables;

impl TableResolver for NoTables {
    fn resolve(&self, reference: &str) -> Result<Table> {
        Err(DpsError::NotFound(format!("table '{}'", reference)))
    }
}

impl TableResolver for AHashMap<String, Table> {
    fn resolve(&self, reference: &str) -> Result<Table> {
        self.get(reference)
            .cloned()
            .ok_or_else(|| DpsError::NotFound(format!("table '{}'", reference)))
    }
}

/// Result of applying one operation
#[derive(Debug, Clone, PartialEq)]
pub struct Applied {
    pub table: Table,
    /// Cells that could not be converted and became null
    pub invalid_cells: usize,
}

impl Applied {
    fn clean(table: Table) -> Self {
        Self { table, invalid_cells: 0 }
    }
}

/// Apply one operation to `table`
pub fn apply(table: &Table, operation: &Operation, tables: &dyn TableResolver) -> Result<Applied> {
    let table = match operation {
        Operation::Filter { column, condition, value } => {
            let spec = dps_core::FilterSpec {
                column: column.clone(),
                condition: *condition,
                value: value.clone(),
            };
            filter::apply_filters(table, std::slice::from_ref(&spec), dps_core::Combine::All)?
        }
        Operation::FilterAdvanced { conditions, combine } => filter::apply_filters(table, conditions, *combine)?,
        Operation::DropDuplicates => clean::drop_duplicates(table)?,
        Operation::DropMissing { columns } => clean::drop_missing(table, columns.as_deref())?,
        Operation::FillMissing { column, method, value } => {
            clean::fill_missing(table, column.as_deref(), *method, value.as_ref())?
        }
        Operation::DropColumn { columns: names } => columns::drop_columns(table, names)?,
        Operation::RenameColumn { old, new } => columns::rename_column(table, old, new)?,
        Operation::DuplicateColumn { column, new_name } => columns::duplicate_column(table, column, new_name)?,
        Operation::ChangeType { column, target } => return columns::change_type(table, column, target),
        Operation::TextOp { column, transform } => columns::text_op(table, column, *transform)?,
        Operation::SplitColumn { column, delimiter, new_columns } => {
            columns::split_column(table, column, delimiter, new_columns)?
        }
        Operation::RegexReplace { column, pattern, replacement } => {
            columns::regex_replace(table, column, pattern, replacement)?
        }
        Operation::ExtractDateComponent { column, component } => {
            datetime::extract_component(table, column, *component)?
        }
        Operation::DateDifference { start, end, unit, new_name } => {
            datetime::date_difference(table, start, end, *unit, new_name.as_deref())?
        }
        Operation::BinColumn { column, new_name, method, bins, labels } => {
            numeric::bin_column(table, column, new_name, method, *bins, labels.as_deref())?
        }
        Operation::Normalize { columns, method } => numeric::normalize(table, columns, *method)?,
        Operation::ComputedColumn { new_name, expression } => expr::computed_column(table, new_name, expression)?,
        Operation::Aggregate { group_by, spec, date_grouping } => {
            aggregate::aggregate(table, group_by, spec, date_grouping.as_ref())?
        }
        Operation::Melt { id_vars, value_vars, var_name, value_name } => {
            reshape::melt(table, id_vars, value_vars, var_name, value_name)?
        }
        Operation::Pivot { index, columns, values, agg_func } => {
            reshape::pivot(table, index, columns, values, *agg_func)?
        }
        Operation::Merge { right, how, left_on, right_on, suffixes } => {
            let right_table = tables.resolve(right)?;
            merge::merge(table, &right_table, *how, left_on, right_on, suffixes)?
        }
        Operation::Sort { column, ascending } => sort::sort_by(table, column, *ascending)?,
    };
    Ok(Applied::clean(table))
}

/// Apply a sequence of operations to a baseline
pub fn replay<'a, I>(baseline: &Table, operations: I, tables: &dyn TableResolver) -> Result<Table>
where
    I: IntoIterator<Item = &'a Operation>,
{
    let mut current = baseline.clone();
    for operation in operations {
        current = apply(&current, operation, tables)?.table;
    }
    Ok(current)
}

/// Replace a column of the same name in place, or append it
pub(crate) fn put_column(columns: &mut Vec<Column>, column: Column) {
    match columns.iter_mut().find(|c| c.name == column.name) {
        Some(slot) => *slot = column,
        None => columns.push(column),
    }
}

/// Rebuild a table with the same row count
pub(crate) fn rebuild(table: &Table, columns: Vec<Column>) -> Result<Table> {
    Table::from_columns_with_rows(columns, table.num_rows())
}

/// Fail with `NameConflict` when `name` is already a column
pub(crate) fn require_free_name(table: &Table, name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(DpsError::InvalidOperation("Column name cannot be empty".into()));
    }
    if table.has_column(name) {
        return Err(DpsError::NameConflict(name.to_string()));
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod test_support {
    use dps_core::table::table_from;
    use dps_core::{ColumnType, Table, Value};

    pub fn ints(values: &[Option<i64>]) -> Vec<Value> {
        values.iter().map(|v| v.map(Value::Int).unwrap_or(Value::Null)).collect()
    }

    pub fn floats(values: &[Option<f64>]) -> Vec<Value> {
        values.iter().map(|v| v.map(Value::Float).unwrap_or(Value::Null)).collect()
    }

    pub fn texts(values: &[Option<&str>]) -> Vec<Value> {
        values
            .iter()
            .map(|v| v.map(|s| Value::Text(s.to_string())).unwrap_or(Value::Null))
            .collect()
    }

    /// `x = [1, 2, 3]`, `y = ["a", "b", "a"]`
    pub fn xy() -> Table {
        table_from(vec![
            ("x", ColumnType::Integer, ints(&[Some(1), Some(2), Some(3)])),
            ("y", ColumnType::Text, texts(&[Some("a"), Some("b"), Some("a")])),
        ])
        .unwrap()
    }
}
