//! Wide/long reshaping

use ahash::AHashMap;
use dps_core::{AggFunc, Column, ColumnType, DpsError, Result, Table, Value};

use super::aggregate::{group_rows, reduce, result_type};

/// Unpivot `value_vars` into `(var_name, value_name)` pairs
///
/// Rows are stacked one variable at a time. With no `value_vars`, every
/// column that is not an id column is melted.
pub fn melt(
    table: &Table,
    id_vars: &[String],
    value_vars: &[String],
    var_name: &str,
    value_name: &str,
) -> Result<Table> {
    table.require_columns(id_vars)?;
    table.require_columns(value_vars)?;
    if var_name.is_empty() || value_name.is_empty() {
        return Err(DpsError::InvalidOperation("Melt column names cannot be empty".into()));
    }
    if var_name == value_name {
        return Err(DpsError::NameConflict(value_name.to_string()));
    }
    if let Some(clash) = id_vars.iter().find(|id| *id == var_name || *id == value_name) {
        return Err(DpsError::NameConflict(clash.clone()));
    }

    let melted: Vec<String> = if value_vars.is_empty() {
        table
            .column_names()
            .into_iter()
            .filter(|name| !id_vars.contains(name))
            .collect()
    } else {
        value_vars.to_vec()
    };
    if melted.is_empty() {
        return Err(DpsError::InvalidOperation("No columns to melt".into()));
    }

    let ids = id_vars.iter().map(|n| table.column(n)).collect::<Result<Vec<_>>>()?;
    let sources = melted.iter().map(|n| table.column(n)).collect::<Result<Vec<_>>>()?;
    let value_type = common_type(sources.iter().map(|c| &c.dtype));

    let rows = table.num_rows();
    let total = rows * sources.len();
    let mut columns: Vec<Column> = ids
        .iter()
        .map(|id| {
            let values = id.values.iter().cloned().cycle().take(total).collect();
            Column::new(id.name.clone(), id.dtype.clone(), values)
        })
        .collect();

    let mut names = Vec::with_capacity(total);
    let mut values = Vec::with_capacity(total);
    for source in &sources {
        names.extend(std::iter::repeat(Value::Text(source.name.clone())).take(rows));
        let tz = source.dtype.timezone();
        values.extend(source.values.iter().map(|v| coerce(v, tz, &value_type)));
    }
    columns.push(Column::new(var_name, ColumnType::Text, names));
    columns.push(Column::new(value_name, value_type, values));
    Table::from_columns_with_rows(columns, total)
}

/// Narrowest type that holds every input type
fn common_type<'a>(mut types: impl Iterator<Item = &'a ColumnType>) -> ColumnType {
    let Some(first) = types.next() else {
        return ColumnType::Text;
    };
    types.fold(first.clone(), |acc, t| {
        if acc == *t {
            acc
        } else if acc.is_numeric() && t.is_numeric() {
            ColumnType::Float
        } else {
            ColumnType::Text
        }
    })
}

fn coerce(value: &Value, timezone: Option<&str>, target: &ColumnType) -> Value {
    match target {
        ColumnType::Float => value.as_f64().map(Value::Float).unwrap_or(Value::Null),
        ColumnType::Text | ColumnType::Categorical => {
            value.to_text(timezone).map(Value::Text).unwrap_or(Value::Null)
        }
        _ => value.clone(),
    }
}

/// Spread distinct `columns` values into new columns holding `agg_func(values)`
///
/// Index values and column labels are sorted; missing combinations are null
/// and rows with a null index or column value are skipped.
pub fn pivot(table: &Table, index: &str, columns: &str, values: &str, agg_func: AggFunc) -> Result<Table> {
    let index_col = table.column(index)?;
    let label_col = table.column(columns)?;
    let value_col = table.column(values)?;
    if agg_func.requires_numeric() && !value_col.dtype.is_numeric() {
        return Err(DpsError::type_mismatch(values, "numeric", value_col.dtype.name()));
    }

    let label_tz = label_col.dtype.timezone().map(str::to_string);
    let groups = group_rows(&[index_col.clone(), label_col], table.num_rows());

    // Distinct labels in value order; equal display strings share a column
    let mut distinct: Vec<&Value> = groups.iter().map(|(key, _)| &key[1]).collect();
    distinct.sort_by(|a, b| a.cmp_total(b));
    let mut labels: Vec<String> = Vec::new();
    for value in distinct {
        let label = value.to_text(label_tz.as_deref()).unwrap_or_default();
        if !labels.contains(&label) {
            labels.push(label);
        }
    }

    let mut index_values: Vec<Value> = Vec::new();
    let mut cells: AHashMap<(usize, usize), Value> = AHashMap::new();
    for (key, rows) in &groups {
        // groups arrive sorted by index first
        if index_values.last() != Some(&key[0]) {
            index_values.push(key[0].clone());
        }
        let label = key[1].to_text(label_tz.as_deref()).unwrap_or_default();
        let Some(slot) = labels.iter().position(|l| *l == label) else { continue };
        let row_cells: Vec<&Value> = rows.iter().map(|r| &value_col.values[*r]).collect();
        cells.insert(
            (index_values.len() - 1, slot),
            reduce(&row_cells, agg_func, &value_col.dtype),
        );
    }

    let out_type = result_type(agg_func, &value_col.dtype);
    let mut out = vec![Column::new(index, index_col.dtype.clone(), index_values.clone())];
    for (slot, label) in labels.into_iter().enumerate() {
        let values = (0..index_values.len())
            .map(|i| cells.get(&(i, slot)).cloned().unwrap_or(Value::Null))
            .collect();
        out.push(Column::new(label, out_type.clone(), values));
    }
    Table::from_columns_with_rows(out, index_values.len())
}
