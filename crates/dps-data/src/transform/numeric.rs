//! Binning and normalization of numeric columns

use dps_core::{BinMethod, Column, ColumnType, DpsError, NormalizeMethod, Result, Table, Value};
use statrs::statistics::Statistics;

use super::{put_column, rebuild, require_free_name};

/// Bin a numeric column into a categorical one
///
/// Intervals are right-closed, except the first which also includes its lower
/// edge. Values outside the edges become null.
pub fn bin_column(
    table: &Table,
    column: &str,
    new_name: &str,
    method: &BinMethod,
    bins: usize,
    labels: Option<&[String]>,
) -> Result<Table> {
    let source = table.column(column)?;
    source.require_numeric()?;
    require_free_name(table, new_name)?;

    let present = source.numeric_values();
    let edges = match method {
        BinMethod::Uniform => {
            require_bins(bins)?;
            uniform_edges(&present, bins)
        }
        BinMethod::Quantile => {
            require_bins(bins)?;
            quantile_edges(&present, bins)
        }
        BinMethod::Custom { edges } => {
            if edges.len() < 2 || edges.windows(2).any(|w| w[0] >= w[1]) {
                return Err(DpsError::InvalidOperation(
                    "Bin edges must be at least two strictly increasing values".into(),
                ));
            }
            edges.clone()
        }
    };

    let bin_count = edges.len().saturating_sub(1);
    let names: Vec<String> = match labels {
        Some(given) if given.len() != bin_count => {
            return Err(DpsError::InvalidOperation(format!(
                "{} label(s) given for {} bin(s)",
                given.len(),
                bin_count
            )))
        }
        Some(given) => given.to_vec(),
        None => interval_labels(&edges),
    };

    let values = source
        .values
        .iter()
        .map(|v| {
            v.as_f64()
                .and_then(|x| bin_index(&edges, x))
                .map(|i| Value::Text(names[i].clone()))
                .unwrap_or(Value::Null)
        })
        .collect();

    let mut columns = table.columns()?;
    columns.push(Column::new(new_name, ColumnType::Categorical, values));
    rebuild(table, columns)
}

fn require_bins(bins: usize) -> Result<()> {
    if bins == 0 {
        Err(DpsError::InvalidOperation("Bin count must be at least 1".into()))
    } else {
        Ok(())
    }
}

/// `bins + 1` evenly spaced edges over the data range; a constant column gets one bin
fn uniform_edges(values: &[f64], bins: usize) -> Vec<f64> {
    let Some((min, max)) = range(values) else {
        return Vec::new();
    };
    if min == max {
        return vec![min, max];
    }
    let step = (max - min) / bins as f64;
    let mut edges: Vec<f64> = (0..bins).map(|i| min + step * i as f64).collect();
    edges.push(max);
    edges
}

/// Equal-frequency edges with duplicates removed
fn quantile_edges(values: &[f64], bins: usize) -> Vec<f64> {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    if sorted.is_empty() {
        return Vec::new();
    }
    let mut edges: Vec<f64> = Vec::with_capacity(bins + 1);
    for i in 0..=bins {
        let q = quantile_sorted(&sorted, i as f64 / bins as f64);
        if edges.last() != Some(&q) {
            edges.push(q);
        }
    }
    if edges.len() == 1 {
        edges.push(edges[0]);
    }
    edges
}

fn range(values: &[f64]) -> Option<(f64, f64)> {
    let mut iter = values.iter().copied();
    let first = iter.next()?;
    Some(iter.fold((first, first), |(lo, hi), x| (lo.min(x), hi.max(x))))
}

/// Linear-interpolation quantile of already sorted values
pub(crate) fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    if sorted.len() == 1 {
        return sorted[0];
    }
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    let weight = pos - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * weight
}

fn bin_index(edges: &[f64], x: f64) -> Option<usize> {
    if edges.len() < 2 || x < edges[0] || x > edges[edges.len() - 1] {
        return None;
    }
    Some(edges.windows(2).position(|w| x <= w[1]).unwrap_or(edges.len() - 2))
}

fn interval_labels(edges: &[f64]) -> Vec<String> {
    edges
        .windows(2)
        .enumerate()
        .map(|(i, w)| {
            let open = if i == 0 { '[' } else { '(' };
            format!("{}{}, {}]", open, format_edge(w[0]), format_edge(w[1]))
        })
        .collect()
}

fn format_edge(x: f64) -> String {
    let text = format!("{:.3}", x);
    let text = text.trim_end_matches('0').trim_end_matches('.');
    if text == "-0" {
        "0".to_string()
    } else {
        text.to_string()
    }
}

/// Rescale numeric columns in place; results are floats
pub fn normalize(table: &Table, names: &[String], method: NormalizeMethod) -> Result<Table> {
    if names.is_empty() {
        return Err(DpsError::InvalidOperation("No columns to normalize".into()));
    }
    let mut columns = table.columns()?;
    for name in names {
        let source = table.column(name)?;
        source.require_numeric()?;
        let values = match method {
            NormalizeMethod::MinMax => min_max(&source.values),
            NormalizeMethod::Standard => standard(&source.values),
            NormalizeMethod::Quantile => rank_scaled(&source.values),
        };
        put_column(&mut columns, Column::new(name.clone(), ColumnType::Float, values));
    }
    rebuild(table, columns)
}

fn min_max(values: &[Value]) -> Vec<Value> {
    let present: Vec<f64> = values.iter().filter_map(Value::as_f64).collect();
    let Some((min, max)) = range(&present) else {
        return vec![Value::Null; values.len()];
    };
    let span = max - min;
    values
        .iter()
        .map(|v| match v.as_f64() {
            Some(_) if span == 0.0 => Value::Float(0.0),
            Some(x) => Value::Float((x - min) / span),
            None => Value::Null,
        })
        .collect()
}

fn standard(values: &[Value]) -> Vec<Value> {
    let present: Vec<f64> = values.iter().filter_map(Value::as_f64).collect();
    let mean = present.iter().mean();
    let std = if present.len() > 1 { present.iter().std_dev() } else { 0.0 };
    values
        .iter()
        .map(|v| match v.as_f64() {
            Some(_) if std == 0.0 || !std.is_finite() => Value::Float(0.0),
            Some(x) => Value::Float((x - mean) / std),
            None => Value::Null,
        })
        .collect()
}

/// Average rank scaled into `[0, 1]`
fn rank_scaled(values: &[Value]) -> Vec<Value> {
    let mut order: Vec<(usize, f64)> = values
        .iter()
        .enumerate()
        .filter_map(|(i, v)| v.as_f64().map(|x| (i, x)))
        .collect();
    order.sort_by(|a, b| a.1.total_cmp(&b.1));

    let n = order.len();
    let mut out = vec![Value::Null; values.len()];
    let mut start = 0;
    while start < n {
        let mut end = start;
        while end + 1 < n && order[end + 1].1 == order[start].1 {
            end += 1;
        }
        // zero-based average rank of the tie run
        let rank = (start + end) as f64 / 2.0;
        let scaled = if n > 1 { rank / (n - 1) as f64 } else { 0.0 };
        for &(row, _) in &order[start..=end] {
            out[row] = Value::Float(scaled);
        }
        start = end + 1;
    }
    out
}
