//! Key-based joins between two tables

use ahash::{AHashMap, AHashSet};
use dps_core::{Column, ColumnType, DpsError, JoinHow, Result, Table, Value};

type KeyIndex = AHashMap<Vec<Value>, Vec<usize>>;

/// Join `left` and `right` on paired key columns
///
/// Null keys never match. Key pairs with the same name are coalesced into a
/// single column; other overlapping names get `suffixes`. Row order follows
/// the left table (then unmatched right rows for outer joins), or the right
/// table for right joins.
pub fn merge(
    left: &Table,
    right: &Table,
    how: JoinHow,
    left_on: &[String],
    right_on: &[String],
    suffixes: &(String, String),
) -> Result<Table> {
    if left_on.is_empty() || left_on.len() != right_on.len() {
        return Err(DpsError::InvalidOperation(format!(
            "Join needs matching key lists ({} left, {} right)",
            left_on.len(),
            right_on.len()
        )));
    }
    let left_keys = left_on.iter().map(|n| left.column(n)).collect::<Result<Vec<_>>>()?;
    let right_keys = right_on.iter().map(|n| right.column(n)).collect::<Result<Vec<_>>>()?;
    for (l, r) in left_keys.iter().zip(&right_keys) {
        if !keys_compatible(&l.dtype, &r.dtype) {
            return Err(DpsError::type_mismatch(&r.name, l.dtype.name(), r.dtype.name()));
        }
    }

    let pairs = match_rows(&left_keys, &right_keys, left.num_rows(), right.num_rows(), how);
    let left_idx: Vec<Option<usize>> = pairs.iter().map(|p| p.0).collect();
    let right_idx: Vec<Option<usize>> = pairs.iter().map(|p| p.1).collect();

    let coalesced: AHashSet<&str> = left_on
        .iter()
        .zip(right_on)
        .filter(|(l, r)| l == r)
        .map(|(l, _)| l.as_str())
        .collect();
    let left_names: AHashSet<String> = left.column_names().into_iter().collect();
    let right_names: AHashSet<String> = right.column_names().into_iter().collect();

    let mut columns = Vec::new();
    for column in left.columns()? {
        if coalesced.contains(column.name.as_str()) {
            let partner = right.column(&column.name)?;
            columns.push(coalesce(&column, &partner, &left_idx, &right_idx));
            continue;
        }
        let name = if right_names.contains(&column.name) {
            format!("{}{}", column.name, suffixes.0)
        } else {
            column.name.clone()
        };
        columns.push(Column::new(name, column.dtype.clone(), gather(&column.values, &left_idx)));
    }
    for column in right.columns()? {
        if coalesced.contains(column.name.as_str()) {
            continue;
        }
        let name = if left_names.contains(&column.name) {
            format!("{}{}", column.name, suffixes.1)
        } else {
            column.name.clone()
        };
        columns.push(Column::new(name, column.dtype.clone(), gather(&column.values, &right_idx)));
    }
    Table::from_columns_with_rows(columns, pairs.len())
}

fn keys_compatible(left: &ColumnType, right: &ColumnType) -> bool {
    left == right
        || (left.is_numeric() && right.is_numeric())
        || (left.is_textual() && right.is_textual())
        || (left.is_temporal() && right.is_temporal())
}

fn key_index(keys: &[Column], rows: usize) -> KeyIndex {
    let mut index = KeyIndex::new();
    for row in 0..rows {
        if let Some(key) = row_key(keys, row) {
            index.entry(key).or_default().push(row);
        }
    }
    index
}

fn row_key(keys: &[Column], row: usize) -> Option<Vec<Value>> {
    let key: Vec<Value> = keys.iter().map(|c| c.values[row].clone()).collect();
    if key.iter().any(Value::is_null) {
        None
    } else {
        Some(key)
    }
}

fn match_rows(
    left_keys: &[Column],
    right_keys: &[Column],
    left_rows: usize,
    right_rows: usize,
    how: JoinHow,
) -> Vec<(Option<usize>, Option<usize>)> {
    let mut pairs = Vec::new();
    if how == JoinHow::Right {
        let index = key_index(left_keys, left_rows);
        for r in 0..right_rows {
            match row_key(right_keys, r).and_then(|k| index.get(&k)) {
                Some(matches) => pairs.extend(matches.iter().map(|l| (Some(*l), Some(r)))),
                None => pairs.push((None, Some(r))),
            }
        }
        return pairs;
    }

    let index = key_index(right_keys, right_rows);
    let mut matched_right = vec![false; right_rows];
    for l in 0..left_rows {
        match row_key(left_keys, l).and_then(|k| index.get(&k)) {
            Some(matches) => {
                for r in matches {
                    matched_right[*r] = true;
                    pairs.push((Some(l), Some(*r)));
                }
            }
            None if how != JoinHow::Inner => pairs.push((Some(l), None)),
            None => {}
        }
    }
    if how == JoinHow::Outer {
        pairs.extend(
            matched_right
                .iter()
                .enumerate()
                .filter(|(_, m)| !**m)
                .map(|(r, _)| (None, Some(r))),
        );
    }
    pairs
}

fn gather(values: &[Value], index: &[Option<usize>]) -> Vec<Value> {
    index
        .iter()
        .map(|i| i.map(|i| values[i].clone()).unwrap_or(Value::Null))
        .collect()
}

/// One key column taking the left value where present, else the right
fn coalesce(left: &Column, right: &Column, left_idx: &[Option<usize>], right_idx: &[Option<usize>]) -> Column {
    let dtype = if left.dtype != right.dtype && left.dtype.is_numeric() && right.dtype.is_numeric() {
        ColumnType::Float
    } else {
        left.dtype.clone()
    };
    let values = left_idx
        .iter()
        .zip(right_idx)
        .map(|(l, r)| {
            let value = match (l, r) {
                (Some(l), _) => left.values[*l].clone(),
                (None, Some(r)) => right.values[*r].clone(),
                (None, None) => Value::Null,
            };
            match (&dtype, value.as_f64()) {
                (ColumnType::Float, Some(x)) => Value::Float(x),
                _ => value,
            }
        })
        .collect();
    Column::new(left.name.clone(), dtype, values)
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use dps_core::table::table_from;
    use dps_core::ErrorKind;

    fn people() -> Table {
        table_from(vec![
            ("id", ColumnType::Integer, ints(&[Some(1), Some(2), Some(3), None])),
            ("name", ColumnType::Text, texts(&[Some("ann"), Some("bo"), Some("cy"), Some("dee")])),
        ])
        .unwrap()
    }

    fn orders() -> Table {
        table_from(vec![
            ("id", ColumnType::Integer, ints(&[Some(2), Some(4), Some(2), None])),
            ("name", ColumnType::Text, texts(&[Some("x"), Some("y"), Some("z"), Some("w")])),
        ])
        .unwrap()
    }

    fn merged(how: JoinHow) -> Table {
        let on = vec!["id".to_string()];
        merge(&people(), &orders(), how, &on, &on, &("_x".into(), "_y".into())).unwrap()
    }

    #[test]
    fn test_inner_join_suffixes() {
        let out = merged(JoinHow::Inner);
        assert_eq!(out.column_names(), vec!["id", "name_x", "name_y"]);
        assert_eq!(out.column("id").unwrap().values, ints(&[Some(2), Some(2)]));
        assert_eq!(out.column("name_y").unwrap().values, texts(&[Some("x"), Some("z")]));
    }

    #[test]
    fn test_left_join_keeps_null_keys_unmatched() {
        let out = merged(JoinHow::Left);
        assert_eq!(out.num_rows(), 5);
        assert_eq!(
            out.column("name_y").unwrap().values,
            texts(&[None, Some("x"), Some("z"), None, None])
        );
    }

    #[test]
    fn test_outer_and_right_order() {
        let out = merged(JoinHow::Outer);
        assert_eq!(out.num_rows(), 7);
        assert_eq!(
            out.column("id").unwrap().values,
            ints(&[Some(1), Some(2), Some(2), Some(3), None, Some(4), None])
        );

        let out = merged(JoinHow::Right);
        assert_eq!(out.column("id").unwrap().values, ints(&[Some(2), Some(4), Some(2), None]));
        assert_eq!(out.column("name_x").unwrap().values, texts(&[Some("bo"), None, Some("bo"), None]));
    }

    #[test]
    fn test_int_float_keys_match() {
        let right = table_from(vec![
            ("key", ColumnType::Float, floats(&[Some(3.0)])),
            ("score", ColumnType::Float, floats(&[Some(9.5)])),
        ])
        .unwrap();
        let out = merge(
            &people(),
            &right,
            JoinHow::Inner,
            &["id".to_string()],
            &["key".to_string()],
            &("_l".into(), "_r".into()),
        )
        .unwrap();
        assert_eq!(out.column_names(), vec!["id", "name", "key", "score"]);
        assert_eq!(out.column("name").unwrap().values, texts(&[Some("cy")]));
    }

    #[test]
    fn test_incompatible_keys() {
        let err = merge(
            &people(),
            &orders(),
            JoinHow::Inner,
            &["id".to_string()],
            &["name".to_string()],
            &("_x".into(), "_y".into()),
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TypeMismatch);
    }
}
