//! Row filters shared by the `filter` operations and subsets

use std::cmp::Ordering;

use ahash::AHashSet;
use dps_core::{Column, Combine, DpsError, FilterCondition, FilterSpec, Literal, Result, Table, Value};

/// Keep the rows of `table` satisfying the combined filters
///
/// An empty table is returned as-is.
pub fn apply_filters(table: &Table, specs: &[FilterSpec], combine: Combine) -> Result<Table> {
    if table.num_rows() == 0 {
        return Ok(table.clone());
    }
    let mask = row_mask(table, specs, combine)?;
    table.filter_rows(&mask)
}

/// Check that every filter names an existing column
pub fn validate_filters(table: &Table, specs: &[FilterSpec]) -> Result<()> {
    for spec in specs {
        table.column_index(&spec.column)?;
    }
    Ok(())
}

/// Evaluate the combined filters row by row
pub fn row_mask(table: &Table, specs: &[FilterSpec], combine: Combine) -> Result<Vec<bool>> {
    let rows = table.num_rows();
    if specs.is_empty() {
        return Ok(vec![true; rows]);
    }

    let mut combined = match combine {
        Combine::All => vec![true; rows],
        Combine::Any => vec![false; rows],
    };
    for spec in specs {
        let column = table.column(&spec.column)?;
        let mask = spec_mask(&column, spec)?;
        for (acc, hit) in combined.iter_mut().zip(mask) {
            *acc = match combine {
                Combine::All => *acc && hit,
                Combine::Any => *acc || hit,
            };
        }
    }
    Ok(combined)
}

/// Evaluate one filter against a column; nulls never match a comparison
pub fn spec_mask(column: &Column, spec: &FilterSpec) -> Result<Vec<bool>> {
    let dtype = &column.dtype;
    let timezone = dtype.timezone();

    let mask = match spec.condition {
        FilterCondition::Contains => {
            let needle = literal_text(&spec.value);
            column
                .values
                .iter()
                .map(|cell| cell.to_text(timezone).map(|t| t.contains(&needle)).unwrap_or(false))
                .collect()
        }
        FilterCondition::In => {
            let wanted: AHashSet<Value> = spec
                .value
                .items()
                .into_iter()
                .filter_map(|item| item.to_value(dtype))
                .filter(|v| !v.is_null())
                .collect();
            column
                .values
                .iter()
                .map(|cell| !cell.is_null() && wanted.contains(cell))
                .collect()
        }
        FilterCondition::Eq | FilterCondition::Ne => {
            let equal = spec.condition == FilterCondition::Eq;
            match spec.value.to_value(dtype) {
                Some(Value::Null) => column.values.iter().map(|cell| cell.is_null() == equal).collect(),
                Some(target) => column
                    .values
                    .iter()
                    .map(|cell| !cell.is_null() && ((cell == &target) == equal))
                    .collect(),
                // A literal the column can never hold: nothing is equal to it
                None => column.values.iter().map(|cell| !cell.is_null() && !equal).collect(),
            }
        }
        FilterCondition::Gt | FilterCondition::Lt | FilterCondition::Ge | FilterCondition::Le => {
            let target = spec
                .value
                .to_value(dtype)
                .filter(|v| !v.is_null())
                .ok_or_else(|| DpsError::type_mismatch(&column.name, dtype.name(), spec.value.describe()))?;
            let accept: fn(Ordering) -> bool = match spec.condition {
                FilterCondition::Gt => |o| o == Ordering::Greater,
                FilterCondition::Lt => |o| o == Ordering::Less,
                FilterCondition::Ge => |o| o != Ordering::Less,
                _ => |o| o != Ordering::Greater,
            };
            column
                .values
                .iter()
                .map(|cell| !cell.is_null() && accept(cell.cmp_total(&target)))
                .collect()
        }
    };
    Ok(mask)
}

fn literal_text(literal: &Literal) -> String {
    match literal {
        Literal::Text(s) => s.clone(),
        Literal::Null => String::new(),
        other => other.to_value(&dps_core::ColumnType::Text)
            .and_then(|v| v.to_text(None))
            .unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use dps_core::table::table_from;
    use dps_core::ColumnType;

    #[test]
    fn test_equality_filter() {
        let spec = FilterSpec::new("y", FilterCondition::Eq, "a");
        let out = apply_filters(&xy(), &[spec], Combine::All).unwrap();
        assert_eq!(out.column("x").unwrap().values, ints(&[Some(1), Some(3)]));
    }

    #[test]
    fn test_any_unions_rows() {
        let specs = vec![
            FilterSpec::new("x", FilterCondition::Eq, 1i64),
            FilterSpec::new("x", FilterCondition::Ge, 3i64),
        ];
        let out = apply_filters(&xy(), &specs, Combine::Any).unwrap();
        assert_eq!(out.column("x").unwrap().values, ints(&[Some(1), Some(3)]));
        let out = apply_filters(&xy(), &specs, Combine::All).unwrap();
        assert_eq!(out.num_rows(), 0);
    }

    #[test]
    fn test_nulls_never_match() {
        let table = table_from(vec![("v", ColumnType::Integer, ints(&[Some(1), None, Some(3)]))]).unwrap();
        let ne = FilterSpec::new("v", FilterCondition::Ne, 1i64);
        assert_eq!(row_mask(&table, &[ne], Combine::All).unwrap(), vec![false, false, true]);
        let is_null = FilterSpec::new("v", FilterCondition::Eq, Literal::Null);
        assert_eq!(row_mask(&table, &[is_null], Combine::All).unwrap(), vec![false, true, false]);
    }

    #[test]
    fn test_contains_is_case_sensitive() {
        let table = table_from(vec![("s", ColumnType::Text, texts(&[Some("Apple"), Some("apple pie"), None]))]).unwrap();
        let spec = FilterSpec::new("s", FilterCondition::Contains, "apple");
        assert_eq!(row_mask(&table, &[spec], Combine::All).unwrap(), vec![false, true, false]);
    }

    #[test]
    fn test_in_list() {
        let spec = FilterSpec::new(
            "x",
            FilterCondition::In,
            Literal::List(vec![Literal::Int(1), Literal::Float(2.0), Literal::Text("zzz".into())]),
        );
        assert_eq!(row_mask(&xy(), &[spec], Combine::All).unwrap(), vec![true, true, false]);
    }

    #[test]
    fn test_temporal_comparison() {
        let days = vec![
            Value::Timestamp(1_704_412_800_000), // 2024-01-05
            Value::Timestamp(1_707_004_800_000), // 2024-02-04
        ];
        let table = table_from(vec![("d", ColumnType::temporal(), days)]).unwrap();
        let spec = FilterSpec::new("d", FilterCondition::Gt, "2024-01-31");
        assert_eq!(row_mask(&table, &[spec], Combine::All).unwrap(), vec![false, true]);
    }

    #[test]
    fn test_ordering_needs_convertible_literal() {
        let spec = FilterSpec::new("x", FilterCondition::Gt, "abc");
        let err = apply_filters(&xy(), &[spec], Combine::All).unwrap_err();
        assert_eq!(err.kind(), dps_core::ErrorKind::TypeMismatch);
    }

    #[test]
    fn test_empty_table_never_errors() {
        let empty = xy().filter_rows(&[false, false, false]).unwrap();
        let spec = FilterSpec::new("missing", FilterCondition::Eq, 1i64);
        assert_eq!(apply_filters(&empty, &[spec], Combine::All).unwrap().num_rows(), 0);
    }

    #[test]
    fn test_unknown_column() {
        let spec = FilterSpec::new("nope", FilterCondition::Eq, 1i64);
        let err = apply_filters(&xy(), &[spec], Combine::All).unwrap_err();
        assert_eq!(err.kind(), dps_core::ErrorKind::UnknownColumn);
    }
}
