//! Calendar component extraction, date differences and period bucketing

use chrono::{Datelike, Duration, NaiveDate, Timelike};
use dps_core::table::temporal;
use dps_core::{Column, ColumnType, DateComponent, DateFreq, DiffUnit, DpsError, Result, Table, Value};

use super::{rebuild, require_free_name};

fn require_temporal(column: &Column) -> Result<()> {
    if column.dtype.is_temporal() {
        Ok(())
    } else {
        Err(DpsError::type_mismatch(&column.name, "temporal", column.dtype.name()))
    }
}

/// Add `{column}_{component}` holding an integer calendar field
///
/// Fields are read in the column's timezone. Weekday counts from Monday = 0
/// and week is the ISO week number.
pub fn extract_component(table: &Table, column: &str, component: DateComponent) -> Result<Table> {
    let source = table.column(column)?;
    require_temporal(&source)?;
    let tz = source.dtype.timezone();
    let name = component.column_name(column);
    require_free_name(table, &name)?;
    let values = source
        .values
        .iter()
        .map(|v| match v {
            Value::Timestamp(ms) => temporal::to_local(*ms, tz)
                .map(|local| Value::Int(component_of(&local, component)))
                .unwrap_or(Value::Null),
            _ => Value::Null,
        })
        .collect();

    let mut columns = table.columns()?;
    columns.push(Column::new(name, ColumnType::Integer, values));
    rebuild(table, columns)
}

fn component_of(local: &chrono::NaiveDateTime, component: DateComponent) -> i64 {
    match component {
        DateComponent::Year => local.year() as i64,
        DateComponent::Quarter => ((local.month() - 1) / 3 + 1) as i64,
        DateComponent::Month => local.month() as i64,
        DateComponent::Week => local.iso_week().week() as i64,
        DateComponent::Day => local.day() as i64,
        DateComponent::Hour => local.hour() as i64,
        DateComponent::Minute => local.minute() as i64,
        DateComponent::Second => local.second() as i64,
        DateComponent::Weekday => local.weekday().num_days_from_monday() as i64,
    }
}

/// Add `end - start` expressed in `unit` as a float column
pub fn date_difference(table: &Table, start: &str, end: &str, unit: DiffUnit, new_name: Option<&str>) -> Result<Table> {
    let start_col = table.column(start)?;
    let end_col = table.column(end)?;
    require_temporal(&start_col)?;
    require_temporal(&end_col)?;

    let name = match new_name {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => unit.column_name(start, end),
    };
    require_free_name(table, &name)?;
    let values = start_col
        .values
        .iter()
        .zip(&end_col.values)
        .map(|(s, e)| match (s, e) {
            (Value::Timestamp(s), Value::Timestamp(e)) => {
                Value::Float((i128::from(*e) - i128::from(*s)) as f64 / unit.millis())
            }
            _ => Value::Null,
        })
        .collect();

    let mut columns = table.columns()?;
    columns.push(Column::new(name, ColumnType::Float, values));
    rebuild(table, columns)
}

/// Start of the period containing `ms`, in the given timezone
pub(crate) fn bucket_start(ms: i64, freq: DateFreq, timezone: Option<&str>) -> Option<i64> {
    let local = temporal::to_local(ms, timezone)?;
    let date = local.date();
    let start = match freq {
        DateFreq::Year => NaiveDate::from_ymd_opt(date.year(), 1, 1)?,
        DateFreq::Quarter => NaiveDate::from_ymd_opt(date.year(), (date.month() - 1) / 3 * 3 + 1, 1)?,
        DateFreq::Month => NaiveDate::from_ymd_opt(date.year(), date.month(), 1)?,
        DateFreq::Week => date - Duration::days(date.weekday().num_days_from_monday() as i64),
        DateFreq::Day => date,
    };
    temporal::from_local(start.and_hms_opt(0, 0, 0)?, timezone)
}
