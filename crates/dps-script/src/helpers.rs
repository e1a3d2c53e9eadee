//! Python helper functions emitted on demand
//!
//! Each helper reproduces one engine behavior that pandas does not offer
//! directly (null handling in filters, interval labels, null-safe joins...).
//! A script only carries the helpers its operations use.

use crate::writer::Import;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Helper {
    DetectDates,
    ColumnValue,
    FilterMask,
    TimeAxis,
    Interpolate,
    FillMissing,
    ChangeType,
    Split,
    NonZero,
    Finite,
    Bin,
    Normalize,
    Aggregate,
    Pivot,
    Merge,
    PlotFrame,
}

impl Helper {
    /// Other helpers this one calls
    pub fn requires(&self) -> &'static [Helper] {
        match self {
            Helper::FilterMask => &[Helper::ColumnValue],
            Helper::FillMissing => &[Helper::ColumnValue, Helper::TimeAxis, Helper::Interpolate],
            _ => &[],
        }
    }

    pub fn imports(&self) -> &'static [Import] {
        match self {
            Helper::TimeAxis
            | Helper::Interpolate
            | Helper::Finite
            | Helper::Bin
            | Helper::Normalize
            | Helper::Pivot => &[Import::Numpy, Import::Pandas],
            _ => &[Import::Pandas],
        }
    }

    pub fn source(&self) -> &'static str {
        match self {
            Helper::DetectDates => DETECT_DATES,
            Helper::ColumnValue => COLUMN_VALUE,
            Helper::FilterMask => FILTER_MASK,
            Helper::TimeAxis => TIME_AXIS,
            Helper::Interpolate => INTERPOLATE,
            Helper::FillMissing => FILL_MISSING,
            Helper::ChangeType => CHANGE_TYPE,
            Helper::Split => SPLIT,
            Helper::NonZero => NON_ZERO,
            Helper::Finite => FINITE,
            Helper::Bin => BIN,
            Helper::Normalize => NORMALIZE,
            Helper::Aggregate => AGGREGATE,
            Helper::Pivot => PIVOT,
            Helper::Merge => MERGE,
            Helper::PlotFrame => PLOT_FRAME,
        }
    }
}

const DETECT_DATES: &str = r#"def _detect_dates(df):
    """Parse text columns whose every value reads as a date."""
    for name in df.columns:
        column = df[name]
        if not (pd.api.types.is_string_dtype(column) or column.dtype == object):
            continue
        present = column.dropna()
        if present.empty:
            continue
        try:
            pd.to_datetime(present, errors="raise")
        except (ValueError, TypeError, OverflowError):
            continue
        df[name] = pd.to_datetime(column, errors="coerce")
    return df"#;

const COLUMN_VALUE: &str = r#"def _column_value(column, value):
    """Coerce a literal to the type held by a column."""
    if value is None:
        return None
    if pd.api.types.is_datetime64_any_dtype(column):
        stamp = pd.Timestamp(value)
        if column.dt.tz is not None and stamp.tzinfo is None:
            stamp = stamp.tz_localize(column.dt.tz)
        return stamp
    if pd.api.types.is_bool_dtype(column):
        if isinstance(value, str):
            return value.strip().lower() in ("true", "t", "yes", "y", "1")
        return bool(value)
    if pd.api.types.is_numeric_dtype(column) and isinstance(value, str):
        return float(value)
    return value"#;

const FILTER_MASK: &str = r#"def _filter_mask(df, name, condition, value):
    """Rows where `name <condition> value` holds; nulls never match."""
    column = df[name]
    present = column.notna()
    if condition == "contains":
        needle = "" if value is None else str(value)
        hits = column.astype("string").str.contains(needle, regex=False)
        return hits.fillna(False).astype(bool)
    if condition == "in":
        wanted = value if isinstance(value, list) else [value]
        wanted = [_column_value(column, item) for item in wanted if item is not None]
        return (column.isin(wanted).fillna(False) & present).astype(bool)
    if value is None:
        if condition == "==":
            return column.isna()
        if condition == "!=":
            return present
        raise ValueError(f"cannot compare {name} {condition} null")
    value = _column_value(column, value)
    if condition == "==":
        hits = column == value
    elif condition == "!=":
        hits = column != value
    elif condition == ">":
        hits = column > value
    elif condition == "<":
        hits = column < value
    elif condition == ">=":
        hits = column >= value
    else:
        hits = column <= value
    return (hits.fillna(False).astype(bool) & present).astype(bool)"#;

const TIME_AXIS: &str = r#"def _time_axis(df, filling):
    """Epoch milliseconds of the first temporal column other than `filling`."""
    for name in df.columns:
        if name != filling and pd.api.types.is_datetime64_any_dtype(df[name]):
            stamps = df[name]
            millis = (stamps - pd.Timestamp(0, tz=stamps.dt.tz)).dt.total_seconds() * 1000
            return millis.to_numpy(dtype="float64", na_value=np.nan)
    raise ValueError("Time interpolation needs a temporal column")"#;

const INTERPOLATE: &str = r#"def _interpolate(series, positions=None):
    """Fill interior gaps linearly; trailing nulls take the last value."""
    values = series.to_numpy(dtype="float64", na_value=np.nan)
    if positions is None:
        positions = np.arange(len(values), dtype="float64")
    anchors = np.flatnonzero(~np.isnan(values) & ~np.isnan(positions))
    out = values.copy()
    for row in np.flatnonzero(np.isnan(values)):
        if np.isnan(positions[row]):
            continue
        before = anchors[anchors < row]
        after = anchors[anchors > row]
        if before.size and after.size:
            i, j = before[-1], after[0]
            if positions[j] == positions[i]:
                out[row] = values[i]
            else:
                share = (positions[row] - positions[i]) / (positions[j] - positions[i])
                out[row] = values[i] + (values[j] - values[i]) * share
        elif before.size:
            out[row] = values[before[-1]]
    return pd.Series(out, index=series.index, dtype="Float64")"#;

const FILL_MISSING: &str = r#"def _fill_missing(df, column, method, value=None):
    """Fill nulls in one column, or in every column the method applies to."""
    names = [column] if column is not None else list(df.columns)
    times = _time_axis(df, column) if method == "time" else None
    for name in names:
        series = df[name]
        if not series.isna().any():
            continue
        numeric = pd.api.types.is_numeric_dtype(series) and not pd.api.types.is_bool_dtype(series)
        if method in ("mean", "median", "linear", "time") and not numeric:
            if column is not None:
                raise TypeError(f"{name} is not numeric")
            continue
        if method == "prev":
            df[name] = series.ffill()
        elif method == "next":
            df[name] = series.bfill()
        elif method == "constant":
            try:
                df[name] = series.fillna(_column_value(series, value))
            except (TypeError, ValueError):
                if column is not None:
                    raise
        elif method == "mean":
            df[name] = series.astype("Float64").fillna(series.mean())
        elif method == "median":
            df[name] = series.astype("Float64").fillna(series.median())
        elif method == "mode":
            counts = series.dropna().value_counts(sort=False)
            if not counts.empty:
                df[name] = series.fillna(counts.idxmax())
        elif method == "linear":
            df[name] = _interpolate(series)
        else:
            df[name] = _interpolate(series, times)
    return df"#;

const CHANGE_TYPE: &str = r#"_TRUE = ("true", "t", "yes", "y", "1")
_FALSE = ("false", "f", "no", "n", "0")


def _change_type(series, target, timezone=None):
    """Convert a column; values that cannot be represented become null."""
    if series.isna().all():
        return series
    if target in ("integer", "float"):
        if pd.api.types.is_datetime64_any_dtype(series):
            numeric = (series - pd.Timestamp(0, tz=series.dt.tz)) // pd.Timedelta(milliseconds=1)
        elif pd.api.types.is_bool_dtype(series):
            numeric = series.astype("Int64")
        elif pd.api.types.is_numeric_dtype(series):
            numeric = series
        else:
            numeric = pd.to_numeric(series.astype("string").str.strip(), errors="coerce")
        numeric = numeric.astype("Float64")
        if target == "float":
            return numeric
        whole = (numeric % 1 == 0).fillna(False).astype(bool)
        return numeric.where(whole).astype("Int64")
    if target == "boolean":
        if pd.api.types.is_numeric_dtype(series) and not pd.api.types.is_bool_dtype(series):
            return (series != 0).astype("boolean").where(series.notna())
        text = series.astype("string").str.strip().str.lower()
        flags = {word: True for word in _TRUE}
        flags.update({word: False for word in _FALSE})
        return text.map(flags).astype("boolean")
    if target == "temporal":
        if pd.api.types.is_datetime64_any_dtype(series):
            stamps = series
        elif pd.api.types.is_numeric_dtype(series):
            stamps = pd.to_datetime(series, unit="ms", errors="coerce", utc=timezone is not None)
        else:
            stamps = pd.to_datetime(series, errors="coerce", utc=timezone is not None)
        if timezone is not None:
            stamps = stamps.dt.tz_convert(timezone)
        return stamps
    text = series.astype("string")
    return text.astype("category") if target == "categorical" else text"#;

const SPLIT: &str = r#"def _split(df, name, delimiter, new_columns):
    """Split on a literal delimiter; the last column keeps the remainder."""
    parts = df[name].astype("string").str.split(delimiter, n=len(new_columns) - 1, expand=True, regex=False)
    for i, new_name in enumerate(new_columns):
        if i in parts.columns:
            df[new_name] = parts[i]
        else:
            df[new_name] = pd.Series(pd.NA, index=df.index, dtype="string")
    return df"#;

const NON_ZERO: &str = r#"def _nonzero(divisor):
    """Null out zero divisors so division and modulo yield null."""
    if isinstance(divisor, pd.Series):
        return divisor.mask((divisor == 0).fillna(False).astype(bool))
    return pd.NA if divisor == 0 else divisor"#;

const FINITE: &str = r#"def _finite(values):
    """Turn infinities and NaN produced by arithmetic into nulls."""
    if isinstance(values, pd.Series) and pd.api.types.is_float_dtype(values):
        raw = values.to_numpy(dtype="float64", na_value=np.nan)
        return values.astype("Float64").mask(~np.isfinite(raw))
    return values"#;

const BIN: &str = r#"def _quantile(ordered, q):
    if len(ordered) == 1:
        return float(ordered[0])
    pos = min(max(q, 0.0), 1.0) * (len(ordered) - 1)
    lower, upper = int(np.floor(pos)), int(np.ceil(pos))
    return float(ordered[lower] + (ordered[upper] - ordered[lower]) * (pos - lower))


def _edge(x):
    text = f"{x:.3f}".rstrip("0").rstrip(".")
    return "0" if text == "-0" else text


def _bin(series, method, bins=0, edges=None, labels=None):
    """Right-closed intervals; the first also includes its lower edge."""
    values = series.astype("Float64")
    ordered = np.sort(values.dropna().to_numpy(dtype="float64"))
    if method == "uniform":
        edges = []
        if ordered.size:
            low, high = float(ordered[0]), float(ordered[-1])
            if low == high:
                edges = [low, high]
            else:
                step = (high - low) / bins
                edges = [low + step * i for i in range(bins)] + [high]
    elif method == "quantile":
        edges = []
        if ordered.size:
            for i in range(bins + 1):
                q = _quantile(ordered, i / bins)
                if not edges or edges[-1] != q:
                    edges.append(q)
            if len(edges) == 1:
                edges.append(edges[0])
    if labels is None:
        labels = [
            ("[" if i == 0 else "(") + _edge(edges[i]) + ", " + _edge(edges[i + 1]) + "]"
            for i in range(len(edges) - 1)
        ]

    def assign(x):
        if len(edges) < 2 or x < edges[0] or x > edges[-1]:
            return pd.NA
        for i in range(len(edges) - 1):
            if x <= edges[i + 1]:
                return labels[i]
        return labels[-1]

    return values.map(assign, na_action="ignore").astype("category")"#;

const NORMALIZE: &str = r#"def _normalize(series, method):
    values = series.astype("Float64")
    present = values.dropna()
    zeros = values.where(values.isna(), 0.0)
    if method == "min_max":
        if present.empty:
            return values
        low, high = present.min(), present.max()
        if high == low:
            return zeros
        return (values - low) / (high - low)
    if method == "standard":
        std = present.std(ddof=1) if len(present) > 1 else 0.0
        if not std or not np.isfinite(std):
            return zeros
        return (values - present.mean()) / std
    if len(present) < 2:
        return zeros
    return (values.rank(method="average") - 1) / (len(present) - 1)"#;

const AGGREGATE: &str = r#"_PERIODS = {"year": "Y", "quarter": "Q", "month": "M", "week": "W-SUN", "day": "D"}


def _period_start(stamps, freq):
    """Start of the calendar period containing each timestamp."""
    tz = stamps.dt.tz
    local = stamps.dt.tz_localize(None) if tz is not None else stamps
    start = local.dt.to_period(_PERIODS[freq]).dt.start_time
    return start.dt.tz_localize(tz) if tz is not None else start


def _aggregate(df, group_by, spec, date_grouping=None):
    """Grouped summary named after the source columns, sorted by key."""
    keys = df[group_by].copy()
    for name, freq in (date_grouping or {}).items():
        keys[name] = _period_start(keys[name], freq)
    if not group_by:
        row = {name: df[name].agg(func) for name, func in spec.items()}
        return pd.DataFrame([row])
    frame = pd.concat([keys, df[list(spec)]], axis=1)
    grouped = frame.groupby(group_by, sort=True, dropna=True)
    result = grouped.agg(**{name: (name, func) for name, func in spec.items()})
    return result.reset_index()"#;

const PIVOT: &str = r#"def _label(value):
    if isinstance(value, (bool, np.bool_)):
        return "true" if value else "false"
    if isinstance(value, pd.Timestamp):
        if value == value.normalize():
            return value.strftime("%Y-%m-%d")
        return value.strftime("%Y-%m-%d %H:%M:%S")
    if isinstance(value, float) and value.is_integer():
        return str(int(value))
    return str(value)


def _pivot(df, index, columns, values, func):
    """One row per index value and one column per distinct label."""
    frame = df[[index, columns, values]].dropna(subset=[index, columns])
    grouped = frame.groupby([index, columns], sort=True)[values].agg(func)
    wide = grouped.unstack(columns)
    wide.columns = [_label(label) for label in wide.columns]
    return wide.reset_index()"#;

const MERGE: &str = r#"def _suffixed(frame, other, keep, suffix):
    overlap = [c for c in frame.columns if c in other.columns and c not in keep]
    return frame.rename(columns={c: c + suffix for c in overlap})


def _merge(left, right, how, left_on, right_on, suffixes):
    """Key join in which null keys never match."""
    shared = [l for l, r in zip(left_on, right_on) if l == r]
    left = left.assign(_left_row=range(len(left)))
    right = right.assign(_right_row=range(len(right)))
    left_ok = left[left_on].notna().all(axis=1)
    right_ok = right[right_on].notna().all(axis=1)
    merged = left[left_ok].merge(
        right[right_ok], how=how, left_on=left_on, right_on=right_on, suffixes=suffixes, sort=False
    )
    parts = [merged]
    if how in ("left", "outer"):
        parts.append(_suffixed(left[~left_ok], right, shared, suffixes[0]))
    if how in ("right", "outer"):
        parts.append(_suffixed(right[~right_ok], left, shared, suffixes[1]))
    merged = pd.concat(parts, ignore_index=True)
    order = ["_right_row", "_left_row"] if how == "right" else ["_left_row", "_right_row"]
    merged = merged.sort_values(order, na_position="last", kind="stable")
    return merged.drop(columns=["_left_row", "_right_row"]).reset_index(drop=True)"#;

const PLOT_FRAME: &str = r#"def _plain(frame):
    """Numpy-backed copy of a frame for plotting libraries."""
    out = frame.copy()
    for name in out.columns:
        column = out[name]
        if pd.api.types.is_bool_dtype(column) or pd.api.types.is_string_dtype(column):
            out[name] = column.astype(object).where(column.notna(), None)
        elif pd.api.types.is_numeric_dtype(column):
            out[name] = column.astype("float64")
    return out"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_helper_defines_its_function() {
        let helpers = [
            (Helper::DetectDates, "def _detect_dates("),
            (Helper::FilterMask, "def _filter_mask("),
            (Helper::FillMissing, "def _fill_missing("),
            (Helper::Bin, "def _bin("),
            (Helper::Aggregate, "def _aggregate("),
            (Helper::Pivot, "def _pivot("),
            (Helper::Merge, "def _merge("),
        ];
        for (helper, signature) in helpers {
            assert!(helper.source().contains(signature), "{:?}", helper);
        }
    }

    #[test]
    fn test_helper_sources_use_spaces() {
        let all = [
            Helper::DetectDates,
            Helper::ColumnValue,
            Helper::FilterMask,
            Helper::TimeAxis,
            Helper::Interpolate,
            Helper::FillMissing,
            Helper::ChangeType,
            Helper::Split,
            Helper::NonZero,
            Helper::Finite,
            Helper::Bin,
            Helper::Normalize,
            Helper::Aggregate,
            Helper::Pivot,
            Helper::Merge,
            Helper::PlotFrame,
        ];
        for helper in all {
            assert!(!helper.source().contains('\t'));
        }
    }
}
