//! pandas statements for each recorded operation

use dps_core::{BinMethod, Combine, FilterSpec, Operation, OperationLog, Result, SourceDescriptor};
use dps_data::transform::expr::{parse_expr, BinOp, Expr};
use indexmap::IndexMap;

use crate::helpers::Helper;
use crate::quote;
use crate::source;
use crate::writer::Script;

/// Merge references in first-use order
pub fn references(log: &OperationLog) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for operation in log.iter() {
        if let Operation::Merge { right, .. } = operation {
            if !names.contains(right) {
                names.push(right.clone());
            }
        }
    }
    names
}

/// Load every referenced right-hand table, returning the variable for each
///
/// References without a known source are read from `<name>.csv` next to the
/// script.
pub fn load_references(
    script: &mut Script,
    names: &[String],
    sources: &IndexMap<String, SourceDescriptor>,
) -> IndexMap<String, String> {
    let mut variables = IndexMap::new();
    for (i, name) in names.iter().enumerate() {
        let variable = format!("right_{}", i + 1);
        script.comment(format!("Table {}", name));
        match sources.get(name) {
            Some(descriptor) => source::load(script, &variable, descriptor),
            None => {
                let file = fallback_file(name);
                script.comment(format!("Export '{}' to {} before running", name, file));
                let fallback = SourceDescriptor::csv(file);
                source::load(script, &variable, &fallback);
            }
        }
        variables.insert(name.clone(), variable);
    }
    variables
}

/// File name used for a reference with no recorded source
pub fn fallback_file(reference: &str) -> String {
    let slug: String = reference
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    format!("{}.csv", slug)
}

/// Emit every operation of `log` against `df`
pub fn apply_all(script: &mut Script, log: &OperationLog, tables: &IndexMap<String, String>) -> Result<()> {
    for (i, operation) in log.iter().enumerate() {
        script.comment(format!("{}. {}", i + 1, operation.describe()));
        apply(script, operation, tables)?;
    }
    Ok(())
}

fn apply(script: &mut Script, operation: &Operation, tables: &IndexMap<String, String>) -> Result<()> {
    match operation {
        Operation::Filter { column, condition, value } => {
            let spec = FilterSpec {
                column: column.clone(),
                condition: *condition,
                value: value.clone(),
            };
            let mask = filter_mask(script, std::slice::from_ref(&spec), Combine::All);
            script.line(format!("df = df[{}].reset_index(drop=True)", mask));
        }
        Operation::FilterAdvanced { conditions, combine } => {
            let mask = filter_mask(script, conditions, *combine);
            script.line(format!("df = df[{}].reset_index(drop=True)", mask));
        }
        Operation::DropDuplicates => {
            script.line("df = df.drop_duplicates().reset_index(drop=True)");
        }
        Operation::DropMissing { columns } => match columns {
            Some(columns) => script.line(format!(
                "df = df.dropna(subset={}).reset_index(drop=True)",
                quote::list(columns)
            )),
            None => script.line("df = df.dropna().reset_index(drop=True)"),
        },
        Operation::FillMissing { column, method, value } => {
            script.helper(Helper::FillMissing);
            let value = value.as_ref().map(quote::literal).unwrap_or_else(|| "None".to_string());
            script.line(format!(
                "df = _fill_missing(df, {}, {}, {})",
                quote::optional(column.as_deref()),
                quote::string(method.name()),
                value
            ));
        }
        Operation::DropColumn { columns } => {
            script.line(format!("df = df.drop(columns={})", quote::list(columns)));
        }
        Operation::RenameColumn { old, new } => {
            script.line(format!(
                "df = df.rename(columns={{{}: {}}})",
                quote::string(old),
                quote::string(new)
            ));
        }
        Operation::DuplicateColumn { column, new_name } => {
            script.line(format!("df[{}] = df[{}].copy()", quote::string(new_name), quote::string(column)));
        }
        Operation::ChangeType { column, target } => {
            script.helper(Helper::ChangeType);
            let col = quote::string(column);
            script.line(format!(
                "df[{c}] = _change_type(df[{c}], {}, {})",
                quote::string(target.name()),
                quote::optional(target.timezone()),
                c = col
            ));
        }
        Operation::TextOp { column, transform } => {
            let col = quote::string(column);
            script.line(format!("df[{c}] = df[{c}].astype(\"string\").str.{}()", transform.name(), c = col));
        }
        Operation::SplitColumn { column, delimiter, new_columns } => {
            script.helper(Helper::Split);
            script.line(format!(
                "df = _split(df, {}, {}, {})",
                quote::string(column),
                quote::string(delimiter),
                quote::list(new_columns)
            ));
        }
        Operation::RegexReplace { column, pattern, replacement } => {
            let col = quote::string(column);
            script.line(format!(
                "df[{c}] = df[{c}].astype(\"string\").str.replace({}, {}, regex=True)",
                quote::string(pattern),
                quote::string(&python_replacement(replacement)),
                c = col
            ));
        }
        Operation::ExtractDateComponent { column, component } => {
            use dps_core::DateComponent;
            let accessor = match component {
                DateComponent::Week => "dt.isocalendar().week".to_string(),
                DateComponent::Weekday => "dt.weekday".to_string(),
                other => format!("dt.{}", other.name()),
            };
            script.line(format!(
                "df[{}] = df[{}].{}.astype(\"Int64\")",
                quote::string(&component.column_name(column)),
                quote::string(column),
                accessor
            ));
        }
        Operation::DateDifference { start, end, unit, new_name } => {
            let name = match new_name {
                Some(name) if !name.is_empty() => name.clone(),
                _ => unit.column_name(start, end),
            };
            script.line(format!(
                "df[{}] = ((df[{}] - df[{}]).dt.total_seconds() / {}).astype(\"Float64\")",
                quote::string(&name),
                quote::string(end),
                quote::string(start),
                quote::float(unit.millis() / 1000.0)
            ));
        }
        Operation::BinColumn { column, new_name, method, bins, labels } => {
            script.helper(Helper::Bin);
            let (method_name, edges) = match method {
                BinMethod::Uniform => ("uniform", "None".to_string()),
                BinMethod::Quantile => ("quantile", "None".to_string()),
                BinMethod::Custom { edges } => {
                    let edges: Vec<String> = edges.iter().map(|e| quote::float(*e)).collect();
                    ("custom", format!("[{}]", edges.join(", ")))
                }
            };
            let labels = labels.as_deref().map(quote::list).unwrap_or_else(|| "None".to_string());
            script.line(format!(
                "df[{}] = _bin(df[{}], {}, bins={}, edges={}, labels={})",
                quote::string(new_name),
                quote::string(column),
                quote::string(method_name),
                bins,
                edges,
                labels
            ));
        }
        Operation::Normalize { columns, method } => {
            script.helper(Helper::Normalize);
            script.line(format!("for name in {}:", quote::list(columns)));
            script.indent();
            script.line(format!("df[name] = _normalize(df[name], {})", quote::string(method.name())));
            script.dedent();
        }
        Operation::ComputedColumn { new_name, expression } => {
            let expr = parse_expr(expression)?;
            script.helper(Helper::Finite);
            let mut rendered = render_expr(script, &expr);
            if expr.columns().is_empty() {
                rendered = format!("pd.Series({}, index=df.index)", rendered);
            }
            script.line(format!("df[{}] = _finite({})", quote::string(new_name), rendered));
        }
        Operation::Aggregate { group_by, spec, date_grouping } => {
            script.helper(Helper::Aggregate);
            let spec: Vec<String> = spec
                .iter()
                .map(|(column, func)| format!("{}: {}", quote::string(column), quote::string(func.name())))
                .collect();
            let grouping = match date_grouping {
                Some(grouping) if !grouping.is_empty() => {
                    let entries: Vec<String> = grouping
                        .iter()
                        .map(|(column, freq)| format!("{}: {}", quote::string(column), quote::string(freq.name())))
                        .collect();
                    format!("{{{}}}", entries.join(", "))
                }
                _ => "None".to_string(),
            };
            script.line(format!(
                "df = _aggregate(df, {}, {{{}}}, {})",
                quote::list(group_by),
                spec.join(", "),
                grouping
            ));
        }
        Operation::Melt { id_vars, value_vars, var_name, value_name } => {
            let value_vars = if value_vars.is_empty() {
                String::new()
            } else {
                format!(", value_vars={}", quote::list(value_vars))
            };
            script.line(format!(
                "df = df.melt(id_vars={}{}, var_name={}, value_name={})",
                quote::list(id_vars),
                value_vars,
                quote::string(var_name),
                quote::string(value_name)
            ));
        }
        Operation::Pivot { index, columns, values, agg_func } => {
            script.helper(Helper::Pivot);
            script.line(format!(
                "df = _pivot(df, {}, {}, {}, {})",
                quote::string(index),
                quote::string(columns),
                quote::string(values),
                quote::string(agg_func.name())
            ));
        }
        Operation::Merge { right, how, left_on, right_on, suffixes } => {
            script.helper(Helper::Merge);
            let variable = tables
                .get(right)
                .cloned()
                .unwrap_or_else(|| format!("pd.read_csv({})", quote::string(&fallback_file(right))));
            script.line(format!(
                "df = _merge(df, {}, {}, {}, {}, ({}, {}))",
                variable,
                quote::string(how.name()),
                quote::list(left_on),
                quote::list(right_on),
                quote::string(&suffixes.0),
                quote::string(&suffixes.1)
            ));
        }
        Operation::Sort { column, ascending } => {
            script.line(format!(
                "df = df.sort_values({}, ascending={}, kind=\"stable\", na_position=\"last\").reset_index(drop=True)",
                quote::string(column),
                quote::boolean(*ascending)
            ));
        }
    }
    Ok(())
}

/// Boolean mask expression for a set of filters
pub fn filter_mask(script: &mut Script, specs: &[FilterSpec], combine: Combine) -> String {
    script.helper(Helper::FilterMask);
    if specs.is_empty() {
        return "pd.Series(True, index=df.index)".to_string();
    }
    let parts: Vec<String> = specs
        .iter()
        .map(|spec| {
            format!(
                "_filter_mask(df, {}, {}, {})",
                quote::string(&spec.column),
                quote::string(spec.condition.symbol()),
                quote::literal(&spec.value)
            )
        })
        .collect();
    if parts.len() == 1 {
        return parts.into_iter().collect();
    }
    let joiner = match combine {
        Combine::All => " & ",
        Combine::Any => " | ",
    };
    let wrapped: Vec<String> = parts.into_iter().map(|p| format!("({})", p)).collect();
    wrapped.join(joiner)
}

fn render_expr(script: &mut Script, expr: &Expr) -> String {
    match expr {
        Expr::Column(name) => format!("df[{}]", quote::string(name)),
        Expr::Int(i) => i.to_string(),
        Expr::Float(f) => quote::float(*f),
        Expr::Neg(inner) => format!("(-{})", render_expr(script, inner)),
        Expr::Binary { op, lhs, rhs } => {
            let lhs = render_expr(script, lhs);
            let rhs = render_expr(script, rhs);
            match op {
                BinOp::Add => format!("({} + {})", lhs, rhs),
                BinOp::Sub => format!("({} - {})", lhs, rhs),
                BinOp::Mul => format!("({} * {})", lhs, rhs),
                BinOp::Div => {
                    script.helper(Helper::NonZero);
                    format!("({} / _nonzero({}))", lhs, rhs)
                }
                BinOp::Rem => {
                    script.helper(Helper::NonZero);
                    format!("({} % _nonzero({}))", lhs, rhs)
                }
            }
        }
    }
}

/// Translate `$1`, `${name}` and `$$` group references to Python's `\g<...>`
pub fn python_replacement(replacement: &str) -> String {
    let chars: Vec<char> = replacement.chars().collect();
    let mut out = String::with_capacity(replacement.len());
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '\\' => out.push_str("\\\\"),
            '$' if chars.get(i + 1) == Some(&'$') => {
                out.push('$');
                i += 1;
            }
            '$' if chars.get(i + 1) == Some(&'{') => {
                match chars[i + 2..].iter().position(|c| *c == '}') {
                    Some(len) => {
                        let name: String = chars[i + 2..i + 2 + len].iter().collect();
                        out.push_str(&format!("\\g<{}>", name));
                        i += len + 2;
                    }
                    None => out.push('$'),
                }
            }
            '$' => {
                let name: String = chars[i + 1..]
                    .iter()
                    .take_while(|c| c.is_ascii_alphanumeric() || **c == '_')
                    .collect();
                if name.is_empty() {
                    out.push('$');
                } else {
                    out.push_str(&format!("\\g<{}>", name));
                    i += name.len();
                }
            }
            other => out.push(other),
        }
        i += 1;
    }
    out
}
