//! Column-level edits: drop, rename, retype and text manipulation

use dps_core::table::{parse_bool, parse_number, temporal};
use dps_core::{Column, ColumnType, DpsError, Result, Table, TextTransform, Value};
use regex::Regex;

use super::{put_column, rebuild, require_free_name, Applied};

pub fn drop_columns(table: &Table, names: &[String]) -> Result<Table> {
    table.require_columns(names)?;
    let kept = table
        .columns()?
        .into_iter()
        .filter(|c| !names.contains(&c.name))
        .collect();
    rebuild(table, kept)
}

pub fn rename_column(table: &Table, old: &str, new: &str) -> Result<Table> {
    table.column_index(old)?;
    if old == new {
        return Ok(table.clone());
    }
    require_free_name(table, new)?;
    let columns = table
        .columns()?
        .into_iter()
        .map(|mut c| {
            if c.name == old {
                c.name = new.to_string();
            }
            c
        })
        .collect();
    rebuild(table, columns)
}

pub fn duplicate_column(table: &Table, column: &str, new_name: &str) -> Result<Table> {
    let mut copy = table.column(column)?;
    require_free_name(table, new_name)?;
    copy.name = new_name.to_string();
    let mut columns = table.columns()?;
    columns.push(copy);
    rebuild(table, columns)
}

/// Convert a column to `target`
///
/// Cells that cannot be represented become null and are counted. A column
/// with no non-null values is left untouched.
pub fn change_type(table: &Table, column: &str, target: &ColumnType) -> Result<Applied> {
    let source = table.column(column)?;
    if source.null_count() == source.len() {
        return Ok(Applied {
            table: table.clone(),
            invalid_cells: 0,
        });
    }

    let tz = source.dtype.timezone().map(str::to_string);
    let mut invalid = 0;
    let values = source
        .values
        .iter()
        .map(|v| {
            if v.is_null() {
                return Value::Null;
            }
            match convert(v, tz.as_deref(), target) {
                Some(converted) => converted,
                None => {
                    invalid += 1;
                    Value::Null
                }
            }
        })
        .collect();

    if invalid > 0 {
        tracing::warn!("{} value(s) in '{}' could not be converted to {}", invalid, column, target);
    }
    let mut columns = table.columns()?;
    put_column(&mut columns, Column::new(column, target.clone(), values));
    Ok(Applied {
        table: rebuild(table, columns)?,
        invalid_cells: invalid,
    })
}

fn convert(value: &Value, source_tz: Option<&str>, target: &ColumnType) -> Option<Value> {
    match target {
        ColumnType::Integer => match value {
            Value::Int(i) => Some(Value::Int(*i)),
            Value::Float(f) if f.fract() == 0.0 && f.abs() < 9.2e18 => Some(Value::Int(*f as i64)),
            Value::Bool(b) => Some(Value::Int(*b as i64)),
            Value::Text(s) => match parse_number(s)? {
                Value::Int(i) => Some(Value::Int(i)),
                Value::Float(f) if f.fract() == 0.0 && f.abs() < 9.2e18 => Some(Value::Int(f as i64)),
                _ => None,
            },
            Value::Timestamp(ms) => Some(Value::Int(*ms)),
            _ => None,
        },
        ColumnType::Float => match value {
            Value::Text(s) => parse_number(s)?.as_f64().map(Value::Float),
            Value::Timestamp(ms) => Some(Value::Float(*ms as f64)),
            other => other.as_f64().map(Value::Float),
        },
        ColumnType::Boolean => match value {
            Value::Bool(b) => Some(Value::Bool(*b)),
            Value::Int(i) => Some(Value::Bool(*i != 0)),
            Value::Float(f) => Some(Value::Bool(*f != 0.0)),
            Value::Text(s) => parse_bool(s).map(Value::Bool),
            _ => None,
        },
        ColumnType::Text | ColumnType::Categorical => value.to_text(source_tz).map(Value::Text),
        ColumnType::Temporal { timezone } => match value {
            Value::Timestamp(ms) => Some(Value::Timestamp(*ms)),
            Value::Text(s) => temporal::parse_millis(s, timezone.as_deref()).map(Value::Timestamp),
            Value::Int(ms) => Some(Value::Timestamp(*ms)),
            Value::Float(f) if f.is_finite() => Some(Value::Timestamp(*f as i64)),
            _ => None,
        },
    }
}

fn require_textual(column: &Column) -> Result<()> {
    if column.dtype.is_textual() {
        Ok(())
    } else {
        Err(DpsError::type_mismatch(&column.name, "text", column.dtype.name()))
    }
}

/// Map every non-null text cell through `f`, keeping the column type
fn map_text(column: &Column, f: impl Fn(&str) -> String) -> Column {
    let values = column
        .values
        .iter()
        .map(|v| match v {
            Value::Text(s) => Value::Text(f(s)),
            other => other.clone(),
        })
        .collect();
    Column::new(column.name.clone(), column.dtype.clone(), values)
}

pub fn text_op(table: &Table, column: &str, transform: TextTransform) -> Result<Table> {
    let source = table.column(column)?;
    require_textual(&source)?;
    let mapped = match transform {
        TextTransform::Strip => map_text(&source, |s| s.trim().to_string()),
        TextTransform::Lstrip => map_text(&source, |s| s.trim_start().to_string()),
        TextTransform::Rstrip => map_text(&source, |s| s.trim_end().to_string()),
        TextTransform::Lower => map_text(&source, str::to_lowercase),
        TextTransform::Upper => map_text(&source, str::to_uppercase),
        TextTransform::Title => map_text(&source, title_case),
        TextTransform::Capitalize => map_text(&source, capitalize),
    };
    let mut columns = table.columns()?;
    put_column(&mut columns, mapped);
    rebuild(table, columns)
}

/// Uppercase the first letter of every alphabetic run, lowercase the rest
fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_word = false;
    for ch in text.chars() {
        if ch.is_alphabetic() {
            if in_word {
                out.extend(ch.to_lowercase());
            } else {
                out.extend(ch.to_uppercase());
            }
            in_word = true;
        } else {
            out.push(ch);
            in_word = false;
        }
    }
    out
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

/// Split a text column on a literal delimiter into the named columns
///
/// The last new column receives the unsplit remainder; rows with fewer parts
/// get nulls. The source column is kept.
pub fn split_column(table: &Table, column: &str, delimiter: &str, new_columns: &[String]) -> Result<Table> {
    let source = table.column(column)?;
    require_textual(&source)?;
    if delimiter.is_empty() {
        return Err(DpsError::InvalidOperation("Split delimiter cannot be empty".into()));
    }
    if new_columns.is_empty() {
        return Err(DpsError::InvalidOperation("Split needs at least one new column".into()));
    }
    for (i, name) in new_columns.iter().enumerate() {
        require_free_name(table, name)?;
        if new_columns[..i].contains(name) {
            return Err(DpsError::NameConflict(name.clone()));
        }
    }

    let mut parts: Vec<Vec<Value>> = vec![Vec::with_capacity(source.len()); new_columns.len()];
    for value in &source.values {
        let pieces: Vec<String> = match value {
            Value::Text(s) => s.splitn(new_columns.len(), delimiter).map(str::to_string).collect(),
            _ => Vec::new(),
        };
        let mut pieces = pieces.into_iter();
        for slot in parts.iter_mut() {
            slot.push(pieces.next().map(Value::Text).unwrap_or(Value::Null));
        }
    }

    let mut columns = table.columns()?;
    for (name, values) in new_columns.iter().zip(parts) {
        columns.push(Column::new(name.clone(), ColumnType::Text, values));
    }
    rebuild(table, columns)
}

/// Replace every match of `pattern`; `$1`, `${name}` refer to capture groups
pub fn regex_replace(table: &Table, column: &str, pattern: &str, replacement: &str) -> Result<Table> {
    let source = table.column(column)?;
    require_textual(&source)?;
    let regex = Regex::new(pattern)
        .map_err(|e| DpsError::InvalidOperation(format!("Invalid pattern '{}': {}", pattern, e)))?;
    let mapped = map_text(&source, |s| regex.replace_all(s, replacement).into_owned());
    let mut columns = table.columns()?;
    put_column(&mut columns, mapped);
    rebuild(table, columns)
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use dps_core::table::table_from;
    use dps_core::ErrorKind;

    #[test]
    fn test_drop_and_rename() {
        let out = drop_columns(&xy(), &["x".to_string()]).unwrap();
        assert_eq!(out.column_names(), vec!["y"]);
        assert_eq!(out.num_rows(), 3);

        let out = rename_column(&xy(), "x", "id").unwrap();
        assert_eq!(out.column_names(), vec!["id", "y"]);

        let err = rename_column(&xy(), "x", "y").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NameConflict);
        let err = drop_columns(&xy(), &["nope".to_string()]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownColumn);
    }

    #[test]
    fn test_duplicate_appends() {
        let out = duplicate_column(&xy(), "y", "y2").unwrap();
        assert_eq!(out.column_names(), vec!["x", "y", "y2"]);
        assert_eq!(out.column("y2").unwrap().values, out.column("y").unwrap().values);
        assert!(duplicate_column(&xy(), "y", "x").is_err());
    }

    #[test]
    fn test_change_type_counts_invalid() {
        let table = table_from(vec![(
            "v",
            ColumnType::Text,
            texts(&[Some("1"), Some("2.5"), Some("x"), None]),
        )])
        .unwrap();
        let applied = change_type(&table, "v", &ColumnType::Float).unwrap();
        assert_eq!(applied.invalid_cells, 1);
        assert_eq!(
            applied.table.column("v").unwrap().values,
            floats(&[Some(1.0), Some(2.5), None, None])
        );

        let applied = change_type(&table, "v", &ColumnType::Integer).unwrap();
        assert_eq!(applied.invalid_cells, 2);
        assert_eq!(applied.table.column_type("v").unwrap(), ColumnType::Integer);
    }

    #[test]
    fn test_change_type_all_null_is_noop() {
        let table = table_from(vec![("v", ColumnType::Text, texts(&[None, None]))]).unwrap();
        let applied = change_type(&table, "v", &ColumnType::Integer).unwrap();
        assert_eq!(applied.table, table);
    }

    #[test]
    fn test_change_type_to_temporal() {
        let table = table_from(vec![("d", ColumnType::Text, texts(&[Some("2024-01-05"), Some("soon")]))]).unwrap();
        let applied = change_type(&table, "d", &ColumnType::temporal()).unwrap();
        assert_eq!(applied.invalid_cells, 1);
        assert_eq!(
            applied.table.column("d").unwrap().values[0],
            Value::Timestamp(1_704_412_800_000)
        );
    }

    #[test]
    fn test_text_transforms() {
        let table = table_from(vec![("s", ColumnType::Text, texts(&[Some("  hello wORLD "), None]))]).unwrap();
        let out = text_op(&table, "s", TextTransform::Strip).unwrap();
        assert_eq!(out.column("s").unwrap().values[0], Value::Text("hello wORLD".into()));
        let out = text_op(&out, "s", TextTransform::Title).unwrap();
        assert_eq!(out.column("s").unwrap().values[0], Value::Text("Hello World".into()));
        let out = text_op(&out, "s", TextTransform::Capitalize).unwrap();
        assert_eq!(out.column("s").unwrap().values[0], Value::Text("Hello world".into()));
        assert!(out.column("s").unwrap().values[1].is_null());

        let err = text_op(&xy(), "x", TextTransform::Upper).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TypeMismatch);
    }

    #[test]
    fn test_split_pads_with_nulls() {
        let table = table_from(vec![("full", ColumnType::Text, texts(&[Some("a-b-c"), Some("d"), None]))]).unwrap();
        let out = split_column(&table, "full", "-", &["p".to_string(), "q".to_string()]).unwrap();
        assert_eq!(out.column_names(), vec!["full", "p", "q"]);
        assert_eq!(out.column("p").unwrap().values, texts(&[Some("a"), Some("d"), None]));
        assert_eq!(out.column("q").unwrap().values, texts(&[Some("b-c"), None, None]));
    }

    #[test]
    fn test_regex_replace_with_groups() {
        let table = table_from(vec![("s", ColumnType::Text, texts(&[Some("2024-01"), Some("none")]))]).unwrap();
        let out = regex_replace(&table, "s", r"(\d+)-(\d+)", "$2/$1").unwrap();
        assert_eq!(out.column("s").unwrap().values, texts(&[Some("01/2024"), Some("none")]));

        let err = regex_replace(&table, "s", "(", "").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidOperation);
    }
}
