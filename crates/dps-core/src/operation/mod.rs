//! Reproducible semantic operations and the log that records them

mod log;

pub use log::OperationLog;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::table::{ColumnType, Literal};

/// Comparison used by a filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FilterCondition {
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = "contains")]
    Contains,
    #[serde(rename = "in")]
    In,
}

impl FilterCondition {
    pub fn symbol(&self) -> &'static str {
        match self {
            FilterCondition::Eq => "==",
            FilterCondition::Ne => "!=",
            FilterCondition::Gt => ">",
            FilterCondition::Lt => "<",
            FilterCondition::Ge => ">=",
            FilterCondition::Le => "<=",
            FilterCondition::Contains => "contains",
            FilterCondition::In => "in",
        }
    }
}

/// A single `column <condition> value` test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterSpec {
    pub column: String,
    pub condition: FilterCondition,
    pub value: Literal,
}

impl FilterSpec {
    pub fn new(column: impl Into<String>, condition: FilterCondition, value: impl Into<Literal>) -> Self {
        Self {
            column: column.into(),
            condition,
            value: value.into(),
        }
    }

    pub fn describe(&self) -> String {
        format!("{} {} {}", self.column, self.condition.symbol(), self.value.describe())
    }
}

/// How several filters are combined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Combine {
    /// Every filter must hold (AND)
    #[default]
    All,
    /// At least one filter holds (OR)
    Any,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FillMethod {
    Prev,
    Next,
    Linear,
    Time,
    Constant,
    Mean,
    Median,
    Mode,
}

impl FillMethod {
    pub fn name(&self) -> &'static str {
        match self {
            FillMethod::Prev => "prev",
            FillMethod::Next => "next",
            FillMethod::Linear => "linear",
            FillMethod::Time => "time",
            FillMethod::Constant => "constant",
            FillMethod::Mean => "mean",
            FillMethod::Median => "median",
            FillMethod::Mode => "mode",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextTransform {
    Strip,
    Lstrip,
    Rstrip,
    Lower,
    Upper,
    Title,
    Capitalize,
}

impl TextTransform {
    pub fn name(&self) -> &'static str {
        match self {
            TextTransform::Strip => "strip",
            TextTransform::Lstrip => "lstrip",
            TextTransform::Rstrip => "rstrip",
            TextTransform::Lower => "lower",
            TextTransform::Upper => "upper",
            TextTransform::Title => "title",
            TextTransform::Capitalize => "capitalize",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateComponent {
    Year,
    Quarter,
    Month,
    Week,
    Day,
    Hour,
    Minute,
    Second,
    Weekday,
}

impl DateComponent {
    pub fn name(&self) -> &'static str {
        match self {
            DateComponent::Year => "year",
            DateComponent::Quarter => "quarter",
            DateComponent::Month => "month",
            DateComponent::Week => "week",
            DateComponent::Day => "day",
            DateComponent::Hour => "hour",
            DateComponent::Minute => "minute",
            DateComponent::Second => "second",
            DateComponent::Weekday => "weekday",
        }
    }

    /// Name of the column an extraction from `source` creates
    pub fn column_name(&self, source: &str) -> String {
        format!("{}_{}", source, self.name())
    }
}

/// Unit for date differences
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffUnit {
    Seconds,
    Minutes,
    Hours,
    Days,
    Weeks,
}

impl DiffUnit {
    pub fn millis(&self) -> f64 {
        match self {
            DiffUnit::Seconds => 1_000.0,
            DiffUnit::Minutes => 60_000.0,
            DiffUnit::Hours => 3_600_000.0,
            DiffUnit::Days => 86_400_000.0,
            DiffUnit::Weeks => 604_800_000.0,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            DiffUnit::Seconds => "seconds",
            DiffUnit::Minutes => "minutes",
            DiffUnit::Hours => "hours",
            DiffUnit::Days => "days",
            DiffUnit::Weeks => "weeks",
        }
    }

    /// Default result column for `end - start`
    pub fn column_name(&self, start: &str, end: &str) -> String {
        format!("{}_minus_{}_{}", end, start, self.name())
    }
}

/// Bucketing frequency for temporal group-by columns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateFreq {
    Year,
    Quarter,
    Month,
    Week,
    Day,
}

impl DateFreq {
    pub fn name(&self) -> &'static str {
        match self {
            DateFreq::Year => "year",
            DateFreq::Quarter => "quarter",
            DateFreq::Month => "month",
            DateFreq::Week => "week",
            DateFreq::Day => "day",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinMethod {
    /// Equal-width intervals over `[min, max]`
    Uniform,
    /// Equal-frequency cuts
    Quantile,
    /// Caller-supplied, strictly increasing edges
    Custom { edges: Vec<f64> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NormalizeMethod {
    MinMax,
    Standard,
    Quantile,
}

impl NormalizeMethod {
    pub fn name(&self) -> &'static str {
        match self {
            NormalizeMethod::MinMax => "min_max",
            NormalizeMethod::Standard => "standard",
            NormalizeMethod::Quantile => "quantile",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggFunc {
    Sum,
    Mean,
    Median,
    Min,
    Max,
    Count,
    Std,
    Var,
    First,
    Last,
    Nunique,
}

impl AggFunc {
    pub fn name(&self) -> &'static str {
        match self {
            AggFunc::Sum => "sum",
            AggFunc::Mean => "mean",
            AggFunc::Median => "median",
            AggFunc::Min => "min",
            AggFunc::Max => "max",
            AggFunc::Count => "count",
            AggFunc::Std => "std",
            AggFunc::Var => "var",
            AggFunc::First => "first",
            AggFunc::Last => "last",
            AggFunc::Nunique => "nunique",
        }
    }

    /// Whether the function only makes sense on numeric input
    pub fn requires_numeric(&self) -> bool {
        matches!(
            self,
            AggFunc::Sum | AggFunc::Mean | AggFunc::Median | AggFunc::Std | AggFunc::Var
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinHow {
    Inner,
    Left,
    Right,
    Outer,
}

impl JoinHow {
    pub fn name(&self) -> &'static str {
        match self {
            JoinHow::Inner => "inner",
            JoinHow::Left => "left",
            JoinHow::Right => "right",
            JoinHow::Outer => "outer",
        }
    }
}

fn default_suffixes() -> (String, String) {
    ("_x".to_string(), "_y".to_string())
}

fn default_true() -> bool {
    true
}

/// A reproducible semantic step
///
/// Each variant carries a fixed set of fields; operations are deterministic
/// given an input table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    Filter {
        column: String,
        condition: FilterCondition,
        value: Literal,
    },
    FilterAdvanced {
        conditions: Vec<FilterSpec>,
        #[serde(default)]
        combine: Combine,
    },
    DropDuplicates,
    DropMissing {
        #[serde(default)]
        columns: Option<Vec<String>>,
    },
    FillMissing {
        /// `None` fills every applicable column
        #[serde(default)]
        column: Option<String>,
        method: FillMethod,
        #[serde(default)]
        value: Option<Literal>,
    },
    DropColumn {
        columns: Vec<String>,
    },
    RenameColumn {
        old: String,
        new: String,
    },
    DuplicateColumn {
        column: String,
        new_name: String,
    },
    ChangeType {
        column: String,
        target: ColumnType,
    },
    TextOp {
        column: String,
        transform: TextTransform,
    },
    SplitColumn {
        column: String,
        delimiter: String,
        new_columns: Vec<String>,
    },
    RegexReplace {
        column: String,
        pattern: String,
        replacement: String,
    },
    ExtractDateComponent {
        column: String,
        component: DateComponent,
    },
    DateDifference {
        start: String,
        end: String,
        unit: DiffUnit,
        #[serde(default)]
        new_name: Option<String>,
    },
    BinColumn {
        column: String,
        new_name: String,
        method: BinMethod,
        #[serde(default)]
        bins: usize,
        #[serde(default)]
        labels: Option<Vec<String>>,
    },
    Normalize {
        columns: Vec<String>,
        method: NormalizeMethod,
    },
    ComputedColumn {
        new_name: String,
        expression: String,
    },
    Aggregate {
        group_by: Vec<String>,
        spec: IndexMap<String, AggFunc>,
        #[serde(default)]
        date_grouping: Option<IndexMap<String, DateFreq>>,
    },
    Melt {
        id_vars: Vec<String>,
        #[serde(default)]
        value_vars: Vec<String>,
        var_name: String,
        value_name: String,
    },
    Pivot {
        index: String,
        columns: String,
        values: String,
        agg_func: AggFunc,
    },
    Merge {
        /// Reference to a table registered with the session
        right: String,
        how: JoinHow,
        left_on: Vec<String>,
        right_on: Vec<String>,
        #[serde(default = "default_suffixes")]
        suffixes: (String, String),
    },
    Sort {
        column: String,
        #[serde(default = "default_true")]
        ascending: bool,
    },
}

impl Operation {
    /// Stable snake_case kind name
    pub fn kind(&self) -> &'static str {
        match self {
            Operation::Filter { .. } => "filter",
            Operation::FilterAdvanced { .. } => "filter_advanced",
            Operation::DropDuplicates => "drop_duplicates",
            Operation::DropMissing { .. } => "drop_missing",
            Operation::FillMissing { .. } => "fill_missing",
            Operation::DropColumn { .. } => "drop_column",
            Operation::RenameColumn { .. } => "rename_column",
            Operation::DuplicateColumn { .. } => "duplicate_column",
            Operation::ChangeType { .. } => "change_type",
            Operation::TextOp { .. } => "text_op",
            Operation::SplitColumn { .. } => "split_column",
            Operation::RegexReplace { .. } => "regex_replace",
            Operation::ExtractDateComponent { .. } => "extract_date_component",
            Operation::DateDifference { .. } => "date_difference",
            Operation::BinColumn { .. } => "bin_column",
            Operation::Normalize { .. } => "normalize",
            Operation::ComputedColumn { .. } => "computed_column",
            Operation::Aggregate { .. } => "aggregate",
            Operation::Melt { .. } => "melt",
            Operation::Pivot { .. } => "pivot",
            Operation::Merge { .. } => "merge",
            Operation::Sort { .. } => "sort",
        }
    }

    /// One-line description for history lists
    pub fn describe(&self) -> String {
        match self {
            Operation::Filter { column, condition, value } => {
                format!("Filter {} {} {}", column, condition.symbol(), value.describe())
            }
            Operation::FilterAdvanced { conditions, combine } => {
                let joiner = match combine {
                    Combine::All => " AND ",
                    Combine::Any => " OR ",
                };
                format!(
                    "Filter {}",
                    conditions.iter().map(FilterSpec::describe).collect::<Vec<_>>().join(joiner)
                )
            }
            Operation::DropDuplicates => "Drop duplicate rows".to_string(),
            Operation::DropMissing { columns: None } => "Drop rows with missing values".to_string(),
            Operation::DropMissing { columns: Some(cols) } => {
                format!("Drop rows with missing values in {}", cols.join(", "))
            }
            Operation::FillMissing { column, method, .. } => format!(
                "Fill missing values in {} ({})",
                column.as_deref().unwrap_or("all columns"),
                method.name()
            ),
            Operation::DropColumn { columns } => format!("Drop column(s) {}", columns.join(", ")),
            Operation::RenameColumn { old, new } => format!("Rename {} to {}", old, new),
            Operation::DuplicateColumn { column, new_name } => format!("Duplicate {} as {}", column, new_name),
            Operation::ChangeType { column, target } => format!("Change type of {} to {}", column, target),
            Operation::TextOp { column, transform } => format!("Apply {} to {}", transform.name(), column),
            Operation::SplitColumn { column, delimiter, new_columns } => format!(
                "Split {} on '{}' into {}",
                column,
                delimiter,
                new_columns.join(", ")
            ),
            Operation::RegexReplace { column, pattern, .. } => format!("Replace /{}/ in {}", pattern, column),
            Operation::ExtractDateComponent { column, component } => {
                format!("Extract {} from {}", component.name(), column)
            }
            Operation::DateDifference { start, end, unit, .. } => {
                format!("Difference {} - {} in {}", end, start, unit.name())
            }
            Operation::BinColumn { column, new_name, .. } => format!("Bin {} into {}", column, new_name),
            Operation::Normalize { columns, method } => {
                format!("Normalize {} ({})", columns.join(", "), method.name())
            }
            Operation::ComputedColumn { new_name, expression } => format!("Compute {} = {}", new_name, expression),
            Operation::Aggregate { group_by, spec, .. } => format!(
                "Aggregate {} by {}",
                spec.iter()
                    .map(|(col, func)| format!("{}({})", func.name(), col))
                    .collect::<Vec<_>>()
                    .join(", "),
                group_by.join(", ")
            ),
            Operation::Melt { id_vars, .. } => format!("Melt keeping {}", id_vars.join(", ")),
            Operation::Pivot { index, columns, values, agg_func } => format!(
                "Pivot {}({}) by {} x {}",
                agg_func.name(),
                values,
                index,
                columns
            ),
            Operation::Merge { right, how, .. } => format!("Merge with {} ({})", right, how.name()),
            Operation::Sort { column, ascending } => format!(
                "Sort by {} {}",
                column,
                if *ascending { "ascending" } else { "descending" }
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_json_shape() {
        let op = Operation::Filter {
            column: "y".into(),
            condition: FilterCondition::Eq,
            value: Literal::from("a"),
        };
        let json = serde_json::to_value(&op).unwrap();
        assert_eq!(json["op"], "filter");
        assert_eq!(json["condition"], "==");
        assert_eq!(json["value"], "a");
    }

    #[test]
    fn test_defaults_on_read() {
        let op: Operation = serde_json::from_str(r#"{"op":"sort","column":"x"}"#).unwrap();
        assert_eq!(op, Operation::Sort { column: "x".into(), ascending: true });

        let op: Operation = serde_json::from_str(
            r#"{"op":"merge","right":"other","how":"left","left_on":["id"],"right_on":["id"]}"#,
        )
        .unwrap();
        match op {
            Operation::Merge { suffixes, .. } => assert_eq!(suffixes, ("_x".to_string(), "_y".to_string())),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_every_kind_round_trips() {
        let mut spec = IndexMap::new();
        spec.insert("amount".to_string(), AggFunc::Sum);
        let mut grouping = IndexMap::new();
        grouping.insert("date".to_string(), DateFreq::Month);
        let ops = vec![
            Operation::DropDuplicates,
            Operation::ChangeType { column: "a".into(), target: ColumnType::temporal() },
            Operation::BinColumn {
                column: "a".into(),
                new_name: "b".into(),
                method: BinMethod::Custom { edges: vec![0.0, 1.0] },
                bins: 1,
                labels: None,
            },
            Operation::Aggregate {
                group_by: vec!["date".into()],
                spec,
                date_grouping: Some(grouping),
            },
        ];
        for op in ops {
            let text = serde_json::to_string(&op).unwrap();
            let back: Operation = serde_json::from_str(&text).unwrap();
            assert_eq!(back, op);
        }
    }

    #[test]
    fn test_describe() {
        let op = Operation::RenameColumn { old: "x".into(), new: "z".into() };
        assert_eq!(op.describe(), "Rename x to z");
        assert_eq!(op.kind(), "rename_column");
    }
}
