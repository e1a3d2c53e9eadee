//! Standalone Python script generation
//!
//! Turns a source descriptor, an operation log and a plot configuration into a
//! pandas/matplotlib program that rebuilds the processed table (and optionally
//! the figure) without DataPlot Studio. Generation is a pure function of its
//! inputs apart from the timestamp in the header.

pub mod helpers;
pub mod operations;
pub mod plot;
pub mod quote;
pub mod source;
pub mod writer;

use std::path::Path;

use chrono::{Local, NaiveDateTime};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use dps_core::{DpsError, OperationLog, PlotConfig, Result, SourceDescriptor, Subset};

use writer::{Import, Script};

/// File the processed table is written to
pub const DATA_OUTPUT: &str = "processed_data.csv";
/// File the figure is saved to
pub const PLOT_OUTPUT: &str = "plot.png";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportMode {
    #[default]
    Data,
    DataAndPlot,
}

/// Everything a script is generated from
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptRequest {
    pub source: SourceDescriptor,
    #[serde(default)]
    pub operations: OperationLog,
    #[serde(default)]
    pub plot: PlotConfig,
    #[serde(default)]
    pub mode: ExportMode,
    /// Sources for the right-hand tables named by merges
    #[serde(default)]
    pub references: IndexMap<String, SourceDescriptor>,
    /// Subset definitions a plot may select rows from
    #[serde(default)]
    pub subsets: Vec<Subset>,
}

impl ScriptRequest {
    pub fn new(source: SourceDescriptor, operations: OperationLog) -> Self {
        Self {
            source,
            operations,
            plot: PlotConfig::default(),
            mode: ExportMode::Data,
            references: IndexMap::new(),
            subsets: Vec::new(),
        }
    }

    pub fn with_plot(mut self, plot: PlotConfig) -> Self {
        self.plot = plot;
        self.mode = ExportMode::DataAndPlot;
        self
    }
}

/// Generate the script, stamped with the current local time
pub fn emit(request: &ScriptRequest) -> Result<String> {
    emit_at(request, Local::now().naive_local())
}

/// Generate the script with a fixed header timestamp
pub fn emit_at(request: &ScriptRequest, generated: NaiveDateTime) -> Result<String> {
    if request.mode == ExportMode::DataAndPlot && request.plot.is_empty() {
        return Err(DpsError::InvalidOperation(
            "Cannot export a plot script without plot columns".to_string(),
        ));
    }

    let mut body = Script::new();
    body.comment("Load data");
    source::load(&mut body, "df", &request.source);

    let names = operations::references(&request.operations);
    let tables = if names.is_empty() {
        IndexMap::new()
    } else {
        body.blank();
        body.comment("Tables referenced by merges");
        operations::load_references(&mut body, &names, &request.references)
    };

    if !request.operations.is_empty() {
        body.blank();
        body.comment("Operations");
        operations::apply_all(&mut body, &request.operations, &tables)?;
    }

    body.blank();
    body.comment("Processed data");
    body.line(format!("df.to_csv({}, index=False)", quote::string(DATA_OUTPUT)));
    body.line(format!("print(f\"Wrote {{len(df)}} rows to {}\")", DATA_OUTPUT));

    if request.mode == ExportMode::DataAndPlot {
        body.blank();
        body.comment(format!("Plot ({})", request.plot.plot_type.name()));
        plot::emit(&mut body, &request.plot, &request.subsets, PLOT_OUTPUT)?;
        body.line(format!("print(\"Saved plot to {}\")", PLOT_OUTPUT));
    }

    let script = assemble(&body, generated);
    debug!(
        operations = request.operations.len(),
        bytes = script.len(),
        "Generated script"
    );
    Ok(script)
}

/// Generate the script and write it to `path`
pub fn write_script(path: &Path, request: &ScriptRequest) -> Result<()> {
    let script = emit(request)?;
    std::fs::write(path, script)?;
    info!("Wrote script to {}", path.display());
    Ok(())
}

fn assemble(body: &Script, generated: NaiveDateTime) -> String {
    let mut out = String::new();
    out.push_str("# Generated by DataPlot Studio\n");
    out.push_str(&format!("# Created: {}\n", generated.format("%Y-%m-%d %H:%M:%S")));
    out.push('\n');

    let (stdlib, external): (Vec<&Import>, Vec<&Import>) = body.imports().partition(|i| i.is_stdlib());
    for group in [stdlib, external] {
        if group.is_empty() {
            continue;
        }
        for import in group {
            out.push_str(import.statement());
            out.push('\n');
        }
        out.push('\n');
    }

    for helper in body.helpers() {
        out.push('\n');
        out.push_str(helper.source().trim_matches('\n'));
        out.push_str("\n\n");
    }
    if body.helpers().next().is_some() {
        out.push('\n');
    }

    out.push_str(body.body());
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use dps_core::plot::PlotType;
    use dps_core::{FilterCondition, Literal, Operation};
    use std::path::PathBuf;

    fn at(hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 1)
            .and_then(|d| d.and_hms_opt(hour, 30, 0))
            .unwrap()
    }

    fn filter_then_rename() -> ScriptRequest {
        let log = OperationLog::from(vec![
            Operation::Filter {
                column: "x".into(),
                condition: FilterCondition::Gt,
                value: Literal::Int(1),
            },
            Operation::RenameColumn {
                old: "x".into(),
                new: "z".into(),
            },
        ]);
        ScriptRequest::new(SourceDescriptor::csv(PathBuf::from("in.csv")), log)
    }

    fn strip_header(script: &str) -> String {
        script.lines().skip(2).collect::<Vec<_>>().join("\n")
    }

    #[test]
    fn test_filter_rename_script() {
        let script = emit_at(&filter_then_rename(), at(9)).unwrap();
        assert!(script.starts_with("# Generated by DataPlot Studio\n# Created: 2024-05-01 09:30:00\n"));
        assert!(script.contains("import pandas as pd\n"));
        assert!(script.contains("\"in.csv\","));
        assert!(script.contains("# 1. Filter x > 1"));
        assert!(script.contains("df = df[_filter_mask(df, \"x\", \">\", 1)].reset_index(drop=True)"));
        assert!(script.contains("df = df.rename(columns={\"x\": \"z\"})"));
        assert!(script.contains("df.to_csv(\"processed_data.csv\", index=False)"));
        assert!(script.contains("def _filter_mask(df, name, condition, value):"));
        assert!(!script.contains("matplotlib"));
        assert!(!script.contains("plot.png"));
    }

    #[test]
    fn test_output_is_deterministic() {
        let request = filter_then_rename();
        assert_eq!(emit_at(&request, at(9)).unwrap(), emit_at(&request, at(9)).unwrap());

        let first = emit_at(&request, at(9)).unwrap();
        let second = emit_at(&request, at(17)).unwrap();
        assert_ne!(first, second);
        assert_eq!(strip_header(&first), strip_header(&second));
        assert_eq!(strip_header(&emit(&request).unwrap()), strip_header(&first));
    }

    #[test]
    fn test_helpers_come_before_their_use() {
        let script = emit_at(&filter_then_rename(), at(9)).unwrap();
        let defined = script.find("def _filter_mask").unwrap();
        let used = script.find("df = df[_filter_mask").unwrap();
        assert!(defined < used);
        let imports = script.find("import pandas as pd").unwrap();
        assert!(imports < defined);
    }

    #[test]
    fn test_plot_mode_imports_follow_config() {
        let mut config = PlotConfig::new(PlotType::Scatter);
        config.basic.x = Some("x".into());
        config.basic.y = vec!["y".into()];
        let request = filter_then_rename().with_plot(config.clone());
        let plain = emit_at(&request, at(9)).unwrap();
        assert!(plain.contains("import matplotlib.pyplot as plt"));
        assert!(plain.contains("fig.savefig(\"plot.png\", dpi=100)"));
        assert!(!plain.contains("from scipy import stats"));
        assert!(!plain.contains("import matplotlib.dates as mdates"));

        config.analysis.regression = true;
        config.axes.x.datetime_format = Some("%Y".into());
        let fitted = emit_at(&filter_then_rename().with_plot(config), at(9)).unwrap();
        assert!(fitted.contains("from scipy import stats\n"));
        assert!(fitted.contains("import matplotlib.dates as mdates\n"));
    }

    #[test]
    fn test_plot_mode_requires_channels() {
        let mut request = filter_then_rename();
        request.mode = ExportMode::DataAndPlot;
        let err = emit_at(&request, at(9)).unwrap_err();
        assert_eq!(err.kind(), dps_core::ErrorKind::InvalidOperation);
    }

    #[test]
    fn test_stdlib_imports_grouped_first() {
        let request = ScriptRequest::new(
            SourceDescriptor::Database {
                connection_string: "shop.db".into(),
                query: "SELECT * FROM orders".into(),
            },
            OperationLog::new(),
        );
        let script = emit_at(&request, at(9)).unwrap();
        assert!(script.contains("import sqlite3\n\nimport pandas as pd\n"));
    }

    #[test]
    fn test_write_script() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("pipeline.py");
        write_script(&path, &filter_then_rename()).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("df.to_csv(\"processed_data.csv\", index=False)"));
    }

    fn pandas_available() -> bool {
        let check = "import sys, pandas; sys.exit(0 if int(pandas.__version__.split('.')[0]) >= 2 else 1)";
        std::process::Command::new("python3")
            .args(["-c", check])
            .output()
            .map(|out| out.status.success())
            .unwrap_or(false)
    }

    fn open(dir: &Path, file: &Path) -> dps_data::Session {
        let settings = dps_data::SessionSettings {
            cache_root: Some(dir.to_path_buf()),
            ..Default::default()
        };
        let mut session = dps_data::Session::new(settings).unwrap();
        session.load_source(SourceDescriptor::csv(file)).unwrap();
        session
    }

    #[test]
    fn test_script_rebuilds_engine_table() {
        if !pandas_available() {
            eprintln!("skipping: python3 with pandas 2 is not available");
            return;
        }
        let dir = tempfile::TempDir::new().unwrap();
        let input = dir.path().join("in.csv");
        let regions = dir.path().join("regions.csv");
        std::fs::write(&input, "x,y,d\n1,apple,4\n2,berry,0\n3,apple,2\n5,cherry,\n0,berry,1\n").unwrap();
        std::fs::write(&regions, "y,region\napple,north\nberry,south\n").unwrap();

        let log = OperationLog::from(vec![
            Operation::Filter {
                column: "x".into(),
                condition: FilterCondition::Gt,
                value: Literal::Int(0),
            },
            Operation::ComputedColumn {
                new_name: "ratio".into(),
                expression: "x / d".into(),
            },
            Operation::BinColumn {
                column: "x".into(),
                new_name: "band".into(),
                method: dps_core::BinMethod::Uniform,
                bins: 2,
                labels: None,
            },
            Operation::RenameColumn {
                old: "x".into(),
                new: "z".into(),
            },
            Operation::Merge {
                right: "regions".into(),
                how: dps_core::JoinHow::Left,
                left_on: vec!["y".into()],
                right_on: vec!["y".into()],
                suffixes: ("_x".into(), "_y".into()),
            },
        ]);

        let mut engine = open(dir.path(), &input);
        let right = open(dir.path(), &regions).current().unwrap().clone();
        engine.register_table("regions", right).unwrap();
        for operation in log.iter() {
            engine.apply(operation.clone()).unwrap();
        }

        let mut request = ScriptRequest::new(SourceDescriptor::csv(&input), log);
        request.references.insert("regions".into(), SourceDescriptor::csv(&regions));
        let script = dir.path().join("pipeline.py");
        write_script(&script, &request).unwrap();

        let run = std::process::Command::new("python3")
            .arg(&script)
            .current_dir(dir.path())
            .output()
            .unwrap();
        assert!(run.status.success(), "{}", String::from_utf8_lossy(&run.stderr));

        let replayed = open(dir.path(), &dir.path().join(DATA_OUTPUT));
        let expected = engine.current().unwrap();
        let produced = replayed.current().unwrap();
        assert_eq!(produced.column_names(), expected.column_names());
        assert_eq!(produced.num_rows(), 4);
        for name in expected.column_names() {
            assert_eq!(
                produced.column(&name).unwrap().values,
                expected.column(&name).unwrap().values,
                "column {}",
                name
            );
        }
    }

    #[test]
    fn test_request_from_json() {
        let request: ScriptRequest = serde_json::from_value(serde_json::json!({
            "source": {"kind": "Scratch", "rows": 2, "cols": 1, "names": []}
        }))
        .unwrap();
        assert_eq!(request.mode, ExportMode::Data);
        assert!(request.operations.is_empty());
    }
}
