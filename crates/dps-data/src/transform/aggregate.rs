//! Group-by aggregation

use ahash::AHashSet;
use dps_core::{AggFunc, Column, ColumnType, DateFreq, DpsError, Result, Table, Value};
use indexmap::IndexMap;
use statrs::statistics::Statistics;

use super::clean::median;
use super::datetime::bucket_start;

/// Group `table` by `group_by` and reduce each spec column
///
/// Output holds the group columns followed by one column per spec entry,
/// named after its source column. Groups are sorted by key and rows with a
/// null key are dropped. Temporal group columns listed in `date_grouping`
/// are first truncated to the start of their period.
pub fn aggregate(
    table: &Table,
    group_by: &[String],
    spec: &IndexMap<String, AggFunc>,
    date_grouping: Option<&IndexMap<String, DateFreq>>,
) -> Result<Table> {
    table.require_columns(group_by)?;
    if spec.is_empty() {
        return Err(DpsError::InvalidOperation("Aggregation needs at least one column".into()));
    }

    let mut key_columns = Vec::with_capacity(group_by.len());
    for name in group_by {
        let mut column = table.column(name)?;
        if let Some(freq) = date_grouping.and_then(|g| g.get(name)) {
            column = bucketed(column, *freq)?;
        }
        key_columns.push(column);
    }
    if let Some(grouping) = date_grouping {
        for (name, _) in grouping {
            if !group_by.contains(name) {
                table.column_index(name)?;
                return Err(DpsError::InvalidOperation(format!(
                    "Date grouping column '{}' is not a group-by column",
                    name
                )));
            }
        }
    }

    let mut value_columns = Vec::with_capacity(spec.len());
    for (name, func) in spec {
        if group_by.contains(name) {
            return Err(DpsError::InvalidOperation(format!(
                "'{}' cannot be both grouped and aggregated",
                name
            )));
        }
        let column = table.column(name)?;
        if func.requires_numeric() && !column.dtype.is_numeric() {
            return Err(DpsError::type_mismatch(name, "numeric", column.dtype.name()));
        }
        value_columns.push((column, *func));
    }

    let groups = if group_by.is_empty() {
        vec![(Vec::new(), (0..table.num_rows()).collect())]
    } else {
        group_rows(&key_columns, table.num_rows())
    };

    let mut columns: Vec<Column> = key_columns
        .iter()
        .enumerate()
        .map(|(k, source)| {
            let values = groups.iter().map(|(key, _)| key[k].clone()).collect();
            Column::new(source.name.clone(), source.dtype.clone(), values)
        })
        .collect();
    for (source, func) in &value_columns {
        let values = groups
            .iter()
            .map(|(_, rows)| {
                let cells: Vec<&Value> = rows.iter().map(|r| &source.values[*r]).collect();
                reduce(&cells, *func, &source.dtype)
            })
            .collect();
        columns.push(Column::new(source.name.clone(), result_type(*func, &source.dtype), values));
    }
    Table::from_columns_with_rows(columns, groups.len())
}

/// `aggregate` limited to the first `limit` groups
pub fn aggregate_preview(
    table: &Table,
    group_by: &[String],
    spec: &IndexMap<String, AggFunc>,
    date_grouping: Option<&IndexMap<String, DateFreq>>,
    limit: usize,
) -> Result<Table> {
    Ok(aggregate(table, group_by, spec, date_grouping)?.head(limit))
}

fn bucketed(column: Column, freq: DateFreq) -> Result<Column> {
    if !column.dtype.is_temporal() {
        return Err(DpsError::type_mismatch(&column.name, "temporal", column.dtype.name()));
    }
    let tz = column.dtype.timezone();
    let values = column
        .values
        .iter()
        .map(|v| match v {
            Value::Timestamp(ms) => bucket_start(*ms, freq, tz).map(Value::Timestamp).unwrap_or(Value::Null),
            _ => Value::Null,
        })
        .collect();
    Ok(Column::new(column.name.clone(), column.dtype.clone(), values))
}

/// Row indices per distinct key, sorted by key; rows with any null key are skipped
pub(crate) fn group_rows(keys: &[Column], rows: usize) -> Vec<(Vec<Value>, Vec<usize>)> {
    let mut groups: IndexMap<Vec<Value>, Vec<usize>> = IndexMap::new();
    for row in 0..rows {
        let key: Vec<Value> = keys.iter().map(|c| c.values[row].clone()).collect();
        if key.iter().any(Value::is_null) {
            continue;
        }
        groups.entry(key).or_default().push(row);
    }
    let mut groups: Vec<_> = groups.into_iter().collect();
    groups.sort_by(|(a, _), (b, _)| {
        a.iter()
            .zip(b)
            .map(|(x, y)| x.cmp_total(y))
            .find(|o| o.is_ne())
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    groups
}

/// Type of the column `func` produces from a `dtype` input
pub(crate) fn result_type(func: AggFunc, dtype: &ColumnType) -> ColumnType {
    match func {
        AggFunc::Sum if *dtype == ColumnType::Integer => ColumnType::Integer,
        AggFunc::Sum | AggFunc::Mean | AggFunc::Median | AggFunc::Std | AggFunc::Var => ColumnType::Float,
        AggFunc::Count | AggFunc::Nunique => ColumnType::Integer,
        AggFunc::Min | AggFunc::Max | AggFunc::First | AggFunc::Last => dtype.clone(),
    }
}

/// Reduce the cells of one group; nulls are ignored
pub(crate) fn reduce(cells: &[&Value], func: AggFunc, dtype: &ColumnType) -> Value {
    let present: Vec<&Value> = cells.iter().copied().filter(|v| !v.is_null()).collect();
    let numbers = || present.iter().filter_map(|v| v.as_f64()).collect::<Vec<f64>>();
    match func {
        AggFunc::Sum if *dtype == ColumnType::Integer => present
            .iter()
            .filter_map(|v| v.as_i64())
            .try_fold(0i64, |acc, x| acc.checked_add(x))
            .map(Value::Int)
            .unwrap_or(Value::Null),
        AggFunc::Sum => Value::Float(numbers().iter().sum()),
        AggFunc::Mean => {
            let xs = numbers();
            if xs.is_empty() {
                Value::Null
            } else {
                Value::Float(xs.iter().mean())
            }
        }
        AggFunc::Median => median(&numbers()).map(Value::Float).unwrap_or(Value::Null),
        AggFunc::Std | AggFunc::Var => {
            let xs = numbers();
            if xs.len() < 2 {
                Value::Null
            } else if func == AggFunc::Std {
                Value::Float(xs.iter().std_dev())
            } else {
                Value::Float(xs.iter().variance())
            }
        }
        AggFunc::Min => present
            .iter()
            .min_by(|a, b| a.cmp_total(b))
            .map(|v| (*v).clone())
            .unwrap_or(Value::Null),
        AggFunc::Max => present
            .iter()
            .max_by(|a, b| a.cmp_total(b))
            .map(|v| (*v).clone())
            .unwrap_or(Value::Null),
        AggFunc::Count => Value::Int(present.len() as i64),
        AggFunc::First => present.first().map(|v| (*v).clone()).unwrap_or(Value::Null),
        AggFunc::Last => present.last().map(|v| (*v).clone()).unwrap_or(Value::Null),
        AggFunc::Nunique => Value::Int(present.iter().collect::<AHashSet<_>>().len() as i64),
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use dps_core::table::table_from;
    use dps_core::ErrorKind;

    fn sales() -> Table {
        table_from(vec![
            ("region", ColumnType::Text, texts(&[Some("b"), Some("a"), Some("b"), None, Some("a")])),
            ("units", ColumnType::Integer, ints(&[Some(3), Some(1), Some(5), Some(7), None])),
            ("price", ColumnType::Float, floats(&[Some(1.0), Some(2.0), Some(4.0), Some(8.0), Some(6.0)])),
        ])
        .unwrap()
    }

    fn spec(entries: &[(&str, AggFunc)]) -> IndexMap<String, AggFunc> {
        entries.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_group_sum_and_mean() {
        let out = aggregate(
            &sales(),
            &["region".to_string()],
            &spec(&[("units", AggFunc::Sum), ("price", AggFunc::Mean)]),
            None,
        )
        .unwrap();
        assert_eq!(out.column_names(), vec!["region", "units", "price"]);
        assert_eq!(out.column("region").unwrap().values, texts(&[Some("a"), Some("b")]));
        assert_eq!(out.column_type("units").unwrap(), ColumnType::Integer);
        assert_eq!(out.column("units").unwrap().values, ints(&[Some(1), Some(8)]));
        assert_eq!(out.column("price").unwrap().values, floats(&[Some(4.0), Some(2.5)]));
    }

    #[test]
    fn test_count_first_and_std() {
        let out = aggregate(
            &sales(),
            &["region".to_string()],
            &spec(&[("units", AggFunc::Count), ("price", AggFunc::Std)]),
            None,
        )
        .unwrap();
        assert_eq!(out.column("units").unwrap().values, ints(&[Some(1), Some(2)]));
        let std = out.column("price").unwrap().values;
        assert!((std[0].as_f64().unwrap() - 8f64.sqrt()).abs() < 1e-12);

        let out = aggregate(&sales(), &["region".to_string()], &spec(&[("units", AggFunc::Last)]), None).unwrap();
        assert_eq!(out.column("units").unwrap().values, ints(&[Some(1), Some(5)]));
    }

    #[test]
    fn test_no_group_by_single_row() {
        let out = aggregate(&sales(), &[], &spec(&[("units", AggFunc::Sum), ("region", AggFunc::Nunique)]), None).unwrap();
        assert_eq!(out.num_rows(), 1);
        assert_eq!(out.column("units").unwrap().values, ints(&[Some(16)]));
        assert_eq!(out.column("region").unwrap().values, ints(&[Some(2)]));
    }

    #[test]
    fn test_validation_errors() {
        let err = aggregate(&sales(), &["region".to_string()], &spec(&[("region", AggFunc::Sum)]), None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidOperation);
        let err = aggregate(&sales(), &[], &spec(&[("region", AggFunc::Mean)]), None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TypeMismatch);

        let grouping: IndexMap<String, DateFreq> = [("region".to_string(), DateFreq::Month)].into_iter().collect();
        let err = aggregate(
            &sales(),
            &["region".to_string()],
            &spec(&[("units", AggFunc::Sum)]),
            Some(&grouping),
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TypeMismatch);
    }

    #[test]
    fn test_monthly_buckets() {
        // 2024-01-05, 2024-01-20, 2024-02-04
        let table = table_from(vec![
            (
                "when",
                ColumnType::temporal(),
                vec![
                    Value::Timestamp(1_704_412_800_000),
                    Value::Timestamp(1_705_708_800_000),
                    Value::Timestamp(1_707_004_800_000),
                ],
            ),
            ("n", ColumnType::Integer, ints(&[Some(1), Some(2), Some(4)])),
        ])
        .unwrap();
        let grouping: IndexMap<String, DateFreq> = [("when".to_string(), DateFreq::Month)].into_iter().collect();
        let out = aggregate(&table, &["when".to_string()], &spec(&[("n", AggFunc::Sum)]), Some(&grouping)).unwrap();
        assert_eq!(
            out.column("when").unwrap().values,
            vec![Value::Timestamp(1_704_067_200_000), Value::Timestamp(1_706_745_600_000)]
        );
        assert_eq!(out.column("n").unwrap().values, ints(&[Some(3), Some(4)]));
    }

    #[test]
    fn test_preview_limits_groups() {
        let out = aggregate_preview(&sales(), &["region".to_string()], &spec(&[("units", AggFunc::Max)]), None, 1).unwrap();
        assert_eq!(out.num_rows(), 1);
        assert_eq!(out.column("units").unwrap().values, ints(&[Some(1)]));
    }
}
