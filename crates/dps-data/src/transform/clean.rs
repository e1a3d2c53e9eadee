//! Duplicate and missing-value handling

use ahash::{AHashMap, AHashSet};
use dps_core::{Column, ColumnType, DpsError, ErrorKind, FillMethod, Literal, Result, Table, Value};
use tracing::debug;

use super::rebuild;

/// Drop repeated rows, keeping the first occurrence
pub fn drop_duplicates(table: &Table) -> Result<Table> {
    let columns = table.columns()?;
    let mut seen = AHashSet::with_capacity(table.num_rows());
    let mask: Vec<bool> = (0..table.num_rows())
        .map(|row| {
            let key: Vec<&Value> = columns.iter().map(|c| &c.values[row]).collect();
            seen.insert(key)
        })
        .collect();
    table.filter_rows(&mask)
}

/// Drop rows with a null in any of `columns` (every column when `None`)
pub fn drop_missing(table: &Table, columns: Option<&[String]>) -> Result<Table> {
    let selected = match columns {
        Some(names) => {
            table.require_columns(names)?;
            names.iter().map(|n| table.column(n)).collect::<Result<Vec<_>>>()?
        }
        None => table.columns()?,
    };
    let mask: Vec<bool> = (0..table.num_rows())
        .map(|row| selected.iter().all(|c| !c.values[row].is_null()))
        .collect();
    table.filter_rows(&mask)
}

/// Fill nulls in one column, or in every column the method applies to
pub fn fill_missing(table: &Table, column: Option<&str>, method: FillMethod, value: Option<&Literal>) -> Result<Table> {
    if method == FillMethod::Constant && value.is_none() {
        return Err(DpsError::InvalidOperation("Constant fill needs a value".into()));
    }
    let times = if method == FillMethod::Time {
        Some(time_axis(table, column)?)
    } else {
        None
    };

    let mut columns = table.columns()?;
    match column {
        Some(name) => {
            let idx = table.column_index(name)?;
            let filled = fill_column(&columns[idx], method, value, times.as_deref())?;
            columns[idx] = filled;
        }
        None => {
            for slot in columns.iter_mut() {
                // Columns the method cannot apply to are left alone
                match fill_column(slot, method, value, times.as_deref()) {
                    Ok(filled) => *slot = filled,
                    Err(err) if err.kind() == ErrorKind::TypeMismatch => {
                        debug!(column = %slot.name, method = ?method, "Skipping fill: {}", err);
                    }
                    Err(err) => return Err(err),
                }
            }
        }
    }
    rebuild(table, columns)
}

/// Epoch milliseconds of the first temporal column, other than the one being filled
fn time_axis(table: &Table, filling: Option<&str>) -> Result<Vec<Option<f64>>> {
    for (name, dtype) in table.schema_summary()? {
        if dtype.is_temporal() && Some(name.as_str()) != filling {
            let column = table.column(&name)?;
            return Ok(column.values.iter().map(|v| v.as_i64().map(|ms| ms as f64)).collect());
        }
    }
    Err(DpsError::InvalidOperation("Time interpolation needs a temporal column".into()))
}

fn fill_column(column: &Column, method: FillMethod, value: Option<&Literal>, times: Option<&[Option<f64>]>) -> Result<Column> {
    if column.null_count() == 0 {
        return Ok(column.clone());
    }
    match method {
        FillMethod::Prev => Ok(carry(column, false)),
        FillMethod::Next => Ok(carry(column, true)),
        FillMethod::Constant => {
            let literal = value.ok_or_else(|| DpsError::InvalidOperation("Constant fill needs a value".into()))?;
            let fill = literal
                .to_value(&column.dtype)
                .filter(|v| !v.is_null())
                .ok_or_else(|| DpsError::type_mismatch(&column.name, column.dtype.name(), literal.describe()))?;
            let values = column
                .values
                .iter()
                .map(|v| if v.is_null() { fill.clone() } else { v.clone() })
                .collect();
            Ok(Column::new(column.name.clone(), column.dtype.clone(), values))
        }
        FillMethod::Mean | FillMethod::Median => {
            column.require_numeric()?;
            let present = column.numeric_values();
            let fill = if method == FillMethod::Mean {
                mean(&present)
            } else {
                median(&present)
            };
            Ok(numeric_fill(column, |_| fill))
        }
        FillMethod::Mode => {
            let fill = mode(&column.values);
            let values = column
                .values
                .iter()
                .map(|v| match (&fill, v.is_null()) {
                    (Some(m), true) => m.clone(),
                    _ => v.clone(),
                })
                .collect();
            Ok(Column::new(column.name.clone(), column.dtype.clone(), values))
        }
        FillMethod::Linear => {
            column.require_numeric()?;
            let positions: Vec<Option<f64>> = (0..column.len()).map(|i| Some(i as f64)).collect();
            let filled = interpolate(&column.values, &positions);
            Ok(numeric_fill(column, |row| filled[row]))
        }
        FillMethod::Time => {
            column.require_numeric()?;
            let times = times.ok_or_else(|| DpsError::InvalidOperation("Time interpolation needs a temporal column".into()))?;
            let filled = interpolate(&column.values, times);
            Ok(numeric_fill(column, |row| filled[row]))
        }
    }
}

/// Forward (or backward) carry of the last seen value
fn carry(column: &Column, backward: bool) -> Column {
    let mut values = column.values.clone();
    let mut last: Option<Value> = None;
    let order: Box<dyn Iterator<Item = usize>> = if backward {
        Box::new((0..values.len()).rev())
    } else {
        Box::new(0..values.len())
    };
    for i in order {
        if values[i].is_null() {
            if let Some(v) = &last {
                values[i] = v.clone();
            }
        } else {
            last = Some(values[i].clone());
        }
    }
    Column::new(column.name.clone(), column.dtype.clone(), values)
}

/// Replace nulls with computed floats; integer columns become float
fn numeric_fill(column: &Column, fill: impl Fn(usize) -> Option<f64>) -> Column {
    let values = column
        .values
        .iter()
        .enumerate()
        .map(|(row, v)| match v.as_f64() {
            Some(x) => Value::Float(x),
            None => fill(row).map(Value::Float).unwrap_or(Value::Null),
        })
        .collect();
    Column::new(column.name.clone(), ColumnType::Float, values)
}

/// Interpolate nulls against `positions`
///
/// Gaps between two known points are filled linearly; trailing nulls take the
/// last known value and leading nulls stay null. Rows without a position are
/// never anchors or targets.
fn interpolate(values: &[Value], positions: &[Option<f64>]) -> Vec<Option<f64>> {
    let known: Vec<(usize, f64, f64)> = values
        .iter()
        .zip(positions)
        .enumerate()
        .filter_map(|(i, (v, p))| Some((i, (*p)?, v.as_f64()?)))
        .collect();

    let mut out: Vec<Option<f64>> = values.iter().map(Value::as_f64).collect();
    // first anchor at or after `row`
    let mut next = 0;
    for (row, slot) in out.iter_mut().enumerate() {
        while next < known.len() && known[next].0 < row {
            next += 1;
        }
        if slot.is_some() {
            continue;
        }
        let Some(pos) = positions[row] else { continue };
        let before = next.checked_sub(1).map(|k| &known[k]);
        let after = known.get(next);
        *slot = match (before, after) {
            (Some(&(_, p0, v0)), Some(&(_, p1, v1))) => {
                if p1 == p0 {
                    Some(v0)
                } else {
                    Some(v0 + (v1 - v0) * (pos - p0) / (p1 - p0))
                }
            }
            (Some(&(_, _, v0)), None) => Some(v0),
            _ => None,
        };
    }
    out
}

pub(crate) fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

pub(crate) fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    Some(if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    })
}

/// Most frequent non-null value; ties go to the value seen first
pub(crate) fn mode(values: &[Value]) -> Option<Value> {
    let mut counts: AHashMap<&Value, (usize, usize)> = AHashMap::new();
    for (i, v) in values.iter().enumerate().filter(|(_, v)| !v.is_null()) {
        counts.entry(v).or_insert((0, i)).0 += 1;
    }
    counts
        .into_iter()
        .max_by(|(_, (ca, fa)), (_, (cb, fb))| ca.cmp(cb).then(fb.cmp(fa)))
        .map(|(v, _)| v.clone())
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use dps_core::table::table_from;

    fn gappy() -> Table {
        table_from(vec![
            ("a", ColumnType::Float, floats(&[None, Some(1.0), None, Some(3.0), None])),
            ("s", ColumnType::Text, texts(&[Some("b"), None, Some("a"), Some("a"), Some("b")])),
        ])
        .unwrap()
    }

    #[test]
    fn test_drop_duplicates_keeps_first() {
        let table = table_from(vec![
            ("x", ColumnType::Integer, ints(&[Some(1), Some(1), Some(2), Some(1)])),
            ("y", ColumnType::Text, texts(&[Some("a"), Some("a"), Some("a"), Some("b")])),
        ])
        .unwrap();
        let out = drop_duplicates(&table).unwrap();
        assert_eq!(out.column("x").unwrap().values, ints(&[Some(1), Some(2), Some(1)]));
    }

    #[test]
    fn test_drop_missing_subset() {
        let out = drop_missing(&gappy(), Some(&["s".to_string()])).unwrap();
        assert_eq!(out.num_rows(), 4);
        let out = drop_missing(&gappy(), None).unwrap();
        assert_eq!(out.num_rows(), 1);
    }

    #[test]
    fn test_prev_and_next() {
        let out = fill_missing(&gappy(), Some("a"), FillMethod::Prev, None).unwrap();
        assert_eq!(out.column("a").unwrap().values, floats(&[None, Some(1.0), Some(1.0), Some(3.0), Some(3.0)]));
        let out = fill_missing(&gappy(), Some("a"), FillMethod::Next, None).unwrap();
        assert_eq!(out.column("a").unwrap().values, floats(&[Some(1.0), Some(1.0), Some(3.0), Some(3.0), None]));
    }

    #[test]
    fn test_linear_keeps_leading_nulls() {
        let out = fill_missing(&gappy(), Some("a"), FillMethod::Linear, None).unwrap();
        assert_eq!(out.column("a").unwrap().values, floats(&[None, Some(1.0), Some(2.0), Some(3.0), Some(3.0)]));
    }

    #[test]
    fn test_linear_long_alternating_gaps() {
        let n = 200_000;
        let values: Vec<Option<f64>> = (0..n).map(|i| (i % 2 == 0).then_some(i as f64)).collect();
        let table = table_from(vec![("v", ColumnType::Float, floats(&values))]).unwrap();
        let out = fill_missing(&table, Some("v"), FillMethod::Linear, None).unwrap();
        let filled = &out.column("v").unwrap().values;
        assert_eq!(filled[1], Value::Float(1.0));
        assert_eq!(filled[n / 2 + 1], Value::Float((n / 2 + 1) as f64));
        // trailing null carries the last anchor
        assert_eq!(filled[n - 1], Value::Float((n - 2) as f64));
        assert_eq!(out.column("v").unwrap().null_count(), 0);
    }

    #[test]
    fn test_mean_all_columns_skips_text() {
        let out = fill_missing(&gappy(), None, FillMethod::Mean, None).unwrap();
        assert_eq!(out.column("a").unwrap().null_count(), 0);
        assert_eq!(out.column("s").unwrap().values, gappy().column("s").unwrap().values);
    }

    #[test]
    fn test_mean_median_need_numbers() {
        let out = fill_missing(&gappy(), Some("a"), FillMethod::Mean, None).unwrap();
        assert_eq!(out.column("a").unwrap().values[0], Value::Float(2.0));
        let err = fill_missing(&gappy(), Some("s"), FillMethod::Median, None).unwrap_err();
        assert_eq!(err.kind(), dps_core::ErrorKind::TypeMismatch);
    }

    #[test]
    fn test_mode_ties_first_seen() {
        let out = fill_missing(&gappy(), Some("s"), FillMethod::Mode, None).unwrap();
        assert_eq!(out.column("s").unwrap().values[1], Value::Text("b".into()));
    }

    #[test]
    fn test_constant_all_columns_skips_incompatible() {
        let out = fill_missing(&gappy(), None, FillMethod::Constant, Some(&Literal::Int(0))).unwrap();
        assert_eq!(out.column("a").unwrap().null_count(), 0);
        assert_eq!(out.column("s").unwrap().values[1], Value::Text("0".into()));
        assert!(fill_missing(&gappy(), None, FillMethod::Constant, None).is_err());
    }

    #[test]
    fn test_time_interpolation_weights_by_time() {
        let table = table_from(vec![
            (
                "t",
                ColumnType::temporal(),
                vec![Value::Timestamp(0), Value::Timestamp(1_000), Value::Timestamp(4_000)],
            ),
            ("v", ColumnType::Float, floats(&[Some(0.0), None, Some(8.0)])),
        ])
        .unwrap();
        let out = fill_missing(&table, Some("v"), FillMethod::Time, None).unwrap();
        assert_eq!(out.column("v").unwrap().values[1], Value::Float(2.0));
    }

    #[test]
    fn test_integer_linear_becomes_float() {
        let table = table_from(vec![("n", ColumnType::Integer, ints(&[Some(1), None, Some(3)]))]).unwrap();
        let out = fill_missing(&table, Some("n"), FillMethod::Linear, None).unwrap();
        assert_eq!(out.column_type("n").unwrap(), ColumnType::Float);
        assert_eq!(out.column("n").unwrap().values[1], Value::Float(2.0));
    }
}
