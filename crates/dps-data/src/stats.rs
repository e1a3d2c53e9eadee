//! Per-column summary statistics for the preview panel

use ahash::AHashSet;
use dps_core::{ColumnType, Result, Table, Value};
use itertools::{Itertools, MinMaxResult};
use rayon::prelude::*;
use serde::Serialize;
use statrs::statistics::Statistics;

use crate::transform::numeric::quantile_sorted;

/// Summary of one column
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnSummary {
    pub name: String,
    pub dtype: ColumnType,
    /// Non-null cells
    pub count: usize,
    pub null_count: usize,
    /// Distinct non-null values
    pub unique_count: usize,
    pub numeric: Option<NumericSummary>,
    pub text: Option<TextSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NumericSummary {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    /// Sample standard deviation; NaN with fewer than two values
    pub std: f64,
    pub q25: f64,
    pub median: f64,
    pub q75: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextSummary {
    pub min_length: usize,
    pub max_length: usize,
    pub avg_length: f64,
}

/// Summarize every column of `table`
pub fn describe(table: &Table) -> Result<Vec<ColumnSummary>> {
    let summaries = table
        .columns()?
        .into_par_iter()
        .map(|column| {
            let present: Vec<&Value> = column.values.iter().filter(|v| !v.is_null()).collect();
            let unique: AHashSet<&Value> = present.iter().copied().collect();

            let numeric = if column.dtype.is_numeric() {
                numeric_summary(column.numeric_values())
            } else {
                None
            };
            let text = if column.dtype.is_textual() {
                text_summary(&present)
            } else {
                None
            };

            ColumnSummary {
                count: present.len(),
                null_count: column.len() - present.len(),
                unique_count: unique.len(),
                name: column.name,
                dtype: column.dtype,
                numeric,
                text,
            }
        })
        .collect();
    Ok(summaries)
}

fn numeric_summary(values: Vec<f64>) -> Option<NumericSummary> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values;
    sorted.sort_by(f64::total_cmp);

    Some(NumericSummary {
        min: sorted[0],
        max: sorted[sorted.len() - 1],
        mean: sorted.iter().mean(),
        std: sorted.iter().std_dev(),
        q25: quantile_sorted(&sorted, 0.25),
        median: quantile_sorted(&sorted, 0.5),
        q75: quantile_sorted(&sorted, 0.75),
    })
}

fn text_summary(values: &[&Value]) -> Option<TextSummary> {
    let lengths: Vec<usize> = values
        .iter()
        .filter_map(|v| v.as_str())
        .map(|s| s.chars().count())
        .collect();
    let (min_length, max_length) = match lengths.iter().copied().minmax() {
        MinMaxResult::NoElements => return None,
        MinMaxResult::OneElement(n) => (n, n),
        MinMaxResult::MinMax(lo, hi) => (lo, hi),
    };
    Some(TextSummary {
        min_length,
        max_length,
        avg_length: lengths.iter().sum::<usize>() as f64 / lengths.len() as f64,
    })
}

/// Render summaries as an aligned text block
pub fn render(summaries: &[ColumnSummary]) -> String {
    let width = summaries.iter().map(|s| s.name.len()).max().unwrap_or(0).max(6);
    let mut out = format!(
        "{:<width$}  {:<11}  {:>7}  {:>6}  {:>6}  {:>10}  {:>10}  {:>10}  {:>10}\n",
        "column", "type", "count", "nulls", "unique", "min", "mean", "median", "max"
    );
    for s in summaries {
        let (min, mean, median, max) = match &s.numeric {
            Some(n) => (
                fmt_stat(n.min),
                fmt_stat(n.mean),
                fmt_stat(n.median),
                fmt_stat(n.max),
            ),
            None => Default::default(),
        };
        out.push_str(&format!(
            "{:<width$}  {:<11}  {:>7}  {:>6}  {:>6}  {:>10}  {:>10}  {:>10}  {:>10}\n",
            s.name, s.dtype, s.count, s.null_count, s.unique_count, min, mean, median, max
        ));
    }
    out
}

fn fmt_stat(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{:.4}", value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::test_support::*;
    use dps_core::table::table_from;

    #[test]
    fn test_describe_numeric_and_text() {
        let table = table_from(vec![
            ("n", ColumnType::Integer, ints(&[Some(1), Some(2), Some(3), Some(4), None])),
            ("s", ColumnType::Text, texts(&[Some("a"), Some("bb"), Some("a"), None, None])),
        ])
        .unwrap();
        let summary = describe(&table).unwrap();

        let n = &summary[0];
        assert_eq!(n.count, 4);
        assert_eq!(n.null_count, 1);
        assert_eq!(n.unique_count, 4);
        let stats = n.numeric.as_ref().unwrap();
        assert_eq!(stats.min, 1.0);
        assert_eq!(stats.max, 4.0);
        assert_eq!(stats.mean, 2.5);
        assert_eq!(stats.median, 2.5);
        assert_eq!(stats.q25, 1.75);
        assert_eq!(stats.q75, 3.25);
        assert!(n.text.is_none());

        let s = &summary[1];
        assert_eq!(s.count, 3);
        assert_eq!(s.null_count, 2);
        assert_eq!(s.unique_count, 2);
        assert!(s.numeric.is_none());
        let text = s.text.as_ref().unwrap();
        assert_eq!((text.min_length, text.max_length), (1, 2));
    }

    #[test]
    fn test_all_null_numeric_column_has_no_stats() {
        let table = table_from(vec![("f", ColumnType::Float, floats(&[None, None]))]).unwrap();
        let summary = describe(&table).unwrap();
        assert_eq!(summary[0].count, 0);
        assert!(summary[0].numeric.is_none());
    }

    #[test]
    fn test_render_lists_every_column() {
        let rendered = render(&describe(&xy()).unwrap());
        assert_eq!(rendered.lines().count(), 3);
        assert!(rendered.lines().nth(1).unwrap().starts_with("x "));
    }
}
