//! `dps`: headless front end for the DataPlot Studio engine

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use indexmap::IndexMap;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use dps_core::{OperationLog, PlotConfig, ProgressReporter, SourceDescriptor, Subset};
use dps_data::export::{export_table, ExportFormat, ExportOptions};
use dps_data::project::Project;
use dps_data::{stats, Session, SessionSettings, SourceRegistry};
use dps_script::{operations::fallback_file, ExportMode, ScriptRequest};

mod inputs;

use inputs::{parse_named, read_json, read_operations, reference_descriptor, SourceArgs};

#[derive(Parser, Debug)]
#[command(name = "dps", version, about = "Batch runs of DataPlot Studio pipelines")]
struct Cli {
    /// Session settings JSON
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Directory for the subset cache
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,

    /// Keep at most this many undo steps
    #[arg(long, global = true)]
    max_history: Option<usize>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Apply an operation log to a source and export the result
    Run(RunArgs),
    /// Write a standalone Python script that rebuilds a pipeline
    EmitScript(EmitArgs),
    /// Print column statistics for a source, optionally after an operation log
    Describe(DescribeArgs),
    /// Summarize a saved project
    Inspect {
        project: PathBuf,
    },
}

#[derive(Args, Debug)]
struct RunArgs {
    #[command(flatten)]
    source: SourceArgs,

    /// Operation log JSON
    #[arg(long)]
    ops: Option<PathBuf>,

    /// Auxiliary table for merges, as NAME=PATH
    #[arg(long = "table", value_parser = parse_named)]
    tables: Vec<(String, PathBuf)>,

    /// Where to write the processed table
    #[arg(long, short)]
    output: PathBuf,

    /// Output format; defaults to the output extension
    #[arg(long, value_enum)]
    format: Option<FormatArg>,

    /// Write the row position as a leading column
    #[arg(long)]
    include_index: bool,

    /// Also save the session as a project
    #[arg(long)]
    save_project: Option<PathBuf>,

    /// Replace an existing project file
    #[arg(long, requires = "save_project")]
    overwrite: bool,
}

#[derive(Args, Debug)]
struct EmitArgs {
    #[command(flatten)]
    source: SourceArgs,

    /// Take source, operations, plot and subsets from a project
    #[arg(long, conflicts_with_all = ["file", "descriptor", "database"])]
    project: Option<PathBuf>,

    /// Operation log JSON
    #[arg(long)]
    ops: Option<PathBuf>,

    /// Plot configuration JSON; implies data-and-plot mode
    #[arg(long)]
    plot: Option<PathBuf>,

    /// Subset definitions JSON (an array)
    #[arg(long)]
    subsets: Option<PathBuf>,

    /// Source of a table named by a merge, as NAME=PATH
    #[arg(long = "table", value_parser = parse_named)]
    tables: Vec<(String, PathBuf)>,

    #[arg(long, value_enum)]
    mode: Option<ModeArg>,

    /// Write merge tables the script cannot load itself as CSV next to it
    #[arg(long)]
    export_references: bool,

    #[arg(long, short, default_value = "pipeline.py")]
    output: PathBuf,
}

#[derive(Args, Debug)]
struct DescribeArgs {
    #[command(flatten)]
    source: SourceArgs,

    #[arg(long)]
    ops: Option<PathBuf>,

    #[arg(long = "table", value_parser = parse_named)]
    tables: Vec<(String, PathBuf)>,

    /// Print JSON instead of a table
    #[arg(long)]
    json: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum FormatArg {
    Csv,
    Json,
    Excel,
}

impl From<FormatArg> for ExportFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Csv => ExportFormat::Csv,
            FormatArg::Json => ExportFormat::Json,
            FormatArg::Excel => ExportFormat::Excel,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum ModeArg {
    Data,
    DataAndPlot,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match &cli.command {
        Command::Run(args) => run(&cli, args),
        Command::EmitScript(args) => emit_script(&cli, args),
        Command::Describe(args) => describe(&cli, args),
        Command::Inspect { project } => inspect(project),
    }
}

fn open_session(cli: &Cli) -> Result<Session> {
    let mut settings = match &cli.settings {
        Some(path) => SessionSettings::load(path).with_context(|| format!("Loading settings {}", path.display()))?,
        None => SessionSettings::default(),
    };
    if let Some(dir) = &cli.cache_dir {
        settings.cache_root = Some(dir.clone());
    }
    if cli.max_history.is_some() {
        settings.max_history_depth = cli.max_history;
    }
    Ok(Session::new(settings)?)
}

/// Load the baseline, register merge tables, then replay `ops`
fn build(session: &mut Session, source: &SourceArgs, ops: Option<&Path>, tables: &[(String, PathBuf)]) -> Result<()> {
    let descriptor = source.descriptor()?;
    session
        .load_source(descriptor.clone())
        .with_context(|| format!("Loading {}", descriptor))?;

    if !tables.is_empty() {
        let registry = SourceRegistry::with_defaults(session.settings());
        for (name, path) in tables {
            let descriptor = reference_descriptor(path)?;
            let table = session
                .tasks()
                .block_on(registry.load(&descriptor, &ProgressReporter::detached()))
                .with_context(|| format!("Loading table '{}' from {}", name, path.display()))?;
            session.register_table(name, table)?;
        }
    }

    if let Some(path) = ops {
        let log = read_operations(path)?;
        for (i, operation) in log.iter().enumerate() {
            session
                .apply(operation.clone())
                .with_context(|| format!("Step {}: {}", i + 1, operation.describe()))?;
        }
        info!("Applied {} operations", log.len());
    }
    Ok(())
}

fn run(cli: &Cli, args: &RunArgs) -> Result<()> {
    let mut session = open_session(cli)?;
    build(&mut session, &args.source, args.ops.as_deref(), &args.tables)?;

    let format = match args.format {
        Some(format) => format.into(),
        None => ExportFormat::from_path(&args.output)
            .ok_or_else(|| anyhow!("Cannot tell the export format of {}; pass --format", args.output.display()))?,
    };
    let options = ExportOptions {
        include_index: args.include_index,
    };
    session.export_data(&args.output, format, &options)?;

    if let Some(path) = &args.save_project {
        session.save_project(path, args.overwrite)?;
    }

    let table = session.current()?;
    println!(
        "{} rows x {} columns -> {}",
        table.num_rows(),
        table.num_columns(),
        args.output.display()
    );
    Ok(())
}

fn emit_script(cli: &Cli, args: &EmitArgs) -> Result<()> {
    let mut references: IndexMap<String, SourceDescriptor> = IndexMap::new();
    for (name, path) in &args.tables {
        references.insert(name.clone(), reference_descriptor(path)?);
    }

    let mut request = match &args.project {
        Some(path) => project_request(cli, path, args)?,
        None => {
            let operations = match &args.ops {
                Some(path) => read_operations(path)?,
                None => OperationLog::new(),
            };
            ScriptRequest::new(args.source.descriptor()?, operations)
        }
    };
    request.references.extend(references);

    if let Some(path) = &args.plot {
        let value: serde_json::Value = read_json(path)?;
        request.plot = PlotConfig::from_value(value).with_context(|| format!("Reading plot {}", path.display()))?;
        request.mode = ExportMode::DataAndPlot;
    }
    if let Some(path) = &args.subsets {
        request.subsets = read_json::<Vec<Subset>>(path)?;
    }
    if let Some(mode) = args.mode {
        request.mode = match mode {
            ModeArg::Data => ExportMode::Data,
            ModeArg::DataAndPlot => ExportMode::DataAndPlot,
        };
    }

    dps_script::write_script(&args.output, &request)?;
    println!("Wrote {}", args.output.display());
    Ok(())
}

/// Script inputs recorded in a project
fn project_request(cli: &Cli, path: &Path, args: &EmitArgs) -> Result<ScriptRequest> {
    let mut session = open_session(cli)?;
    session
        .load_project(path)
        .with_context(|| format!("Loading project {}", path.display()))?;
    let source = session
        .source()
        .cloned()
        .ok_or_else(|| anyhow!("Project {} does not record its source", path.display()))?;
    let operations = session.store()?.log().clone();

    let mut request = ScriptRequest::new(source, operations);
    request.subsets = session.subsets().export();
    if !session.plot().is_empty() {
        request.plot = session.plot().clone();
        request.mode = ExportMode::DataAndPlot;
    }

    if args.export_references {
        let dir = args.output.parent().unwrap_or_else(|| Path::new("."));
        for name in dps_script::operations::references(&request.operations) {
            if args.tables.iter().any(|(table, _)| *table == name) {
                continue;
            }
            let Some(saved) = name
                .strip_prefix("aggregation:")
                .and_then(|agg| session.aggregations().list().into_iter().find(|a| a.name == agg))
            else {
                warn!("No table recorded for merge reference '{}'", name);
                continue;
            };
            let target = dir.join(fallback_file(&name));
            export_table(&saved.result, &target, ExportFormat::Csv, &ExportOptions::default())?;
            info!("Wrote merge table '{}' to {}", name, target.display());
        }
    }
    Ok(request)
}

fn describe(cli: &Cli, args: &DescribeArgs) -> Result<()> {
    let mut session = open_session(cli)?;
    build(&mut session, &args.source, args.ops.as_deref(), &args.tables)?;
    let summaries = session.describe()?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
    } else {
        print!("{}", stats::render(&summaries));
    }
    Ok(())
}

fn inspect(path: &Path) -> Result<()> {
    let project = Project::load(path).with_context(|| format!("Loading project {}", path.display()))?;

    match &project.source {
        Some(source) => println!("Source: {}", source),
        None => println!("Source: (not recorded)"),
    }
    println!(
        "Table: {} rows x {} columns (baseline {} rows)",
        project.current.num_rows(),
        project.current.num_columns(),
        project.baseline.num_rows()
    );

    println!("Operations: {}", project.operations.len());
    for (i, operation) in project.operations.iter().enumerate() {
        println!("  {:>3}. {}", i + 1, operation.describe());
    }

    println!("Subsets: {}", project.subsets.len());
    for subset in &project.subsets {
        let filters: Vec<String> = subset.filters.iter().map(|f| f.describe()).collect();
        println!("  {} [{}]", subset.name, filters.join(", "));
    }

    println!("Saved aggregations: {}", project.aggregations.len());
    for saved in &project.aggregations {
        println!(
            "  {} by {} ({} rows)",
            saved.name,
            saved.group_by.join(", "),
            saved.result.num_rows()
        );
    }

    if project.plot.is_empty() {
        println!("Plot: none");
    } else {
        println!(
            "Plot: {} of {}",
            project.plot.plot_type.name(),
            project.plot.referenced_columns().join(", ")
        );
    }
    Ok(())
}
