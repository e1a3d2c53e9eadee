//! Turning command-line arguments into engine inputs

use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use clap::Args;
use serde::de::DeserializeOwned;

use dps_core::{FileFormat, OperationLog, SourceDescriptor, TextOptions};

/// Where the baseline table comes from
#[derive(Args, Debug, Clone, Default)]
pub struct SourceArgs {
    /// Local data file; the format follows the extension
    #[arg(long, conflicts_with_all = ["descriptor", "database"])]
    pub file: Option<PathBuf>,

    /// JSON source descriptor
    #[arg(long, conflicts_with = "database")]
    pub descriptor: Option<PathBuf>,

    /// Database connection string (a SQLite path or sqlite:// URL)
    #[arg(long, requires = "query")]
    pub database: Option<String>,

    /// The single SELECT to run against --database
    #[arg(long)]
    pub query: Option<String>,

    /// Field delimiter for delimited text
    #[arg(long)]
    pub delimiter: Option<char>,

    /// Decimal separator
    #[arg(long)]
    pub decimal: Option<char>,

    /// Thousands separator
    #[arg(long)]
    pub thousands: Option<char>,

    /// The first row holds data, not column names
    #[arg(long)]
    pub no_header: bool,
}

impl SourceArgs {
    pub fn is_given(&self) -> bool {
        self.file.is_some() || self.descriptor.is_some() || self.database.is_some()
    }

    pub fn descriptor(&self) -> Result<SourceDescriptor> {
        if let Some(path) = &self.file {
            return self.file_descriptor(path);
        }
        if let Some(path) = &self.descriptor {
            return read_json(path);
        }
        if let (Some(connection_string), Some(query)) = (&self.database, &self.query) {
            return Ok(SourceDescriptor::Database {
                connection_string: connection_string.clone(),
                query: query.clone(),
            });
        }
        bail!("No source given; pass --file, --descriptor or --database")
    }

    fn file_descriptor(&self, path: &Path) -> Result<SourceDescriptor> {
        let format = FileFormat::from_extension(path)
            .ok_or_else(|| anyhow!("Cannot tell the format of {}", path.display()))?;
        let defaults = TextOptions::default();
        let options = TextOptions {
            delimiter: self.delimiter.unwrap_or(defaults.delimiter),
            decimal: self.decimal.unwrap_or(defaults.decimal),
            thousands: self.thousands,
            has_header: !self.no_header,
        };
        Ok(SourceDescriptor::LocalFile {
            path: path.to_path_buf(),
            format,
            options,
        })
    }
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = std::fs::read_to_string(path).with_context(|| format!("Reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Parsing {}", path.display()))
}

pub fn read_operations(path: &Path) -> Result<OperationLog> {
    let text = std::fs::read_to_string(path).with_context(|| format!("Reading {}", path.display()))?;
    OperationLog::from_json(&text).with_context(|| format!("Parsing operation log {}", path.display()))
}

/// Split a `name=path` argument
pub fn parse_named(value: &str) -> Result<(String, PathBuf), String> {
    let (name, path) = value
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=PATH, got '{}'", value))?;
    let name = name.trim();
    if name.is_empty() || path.is_empty() {
        return Err(format!("expected NAME=PATH, got '{}'", value));
    }
    Ok((name.to_string(), PathBuf::from(path)))
}

/// Descriptor for an auxiliary table given on the command line
///
/// A `.json` path is read as a source descriptor; anything else is a data file.
pub fn reference_descriptor(path: &Path) -> Result<SourceDescriptor> {
    let is_descriptor = path
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.ends_with(".source.json"));
    if is_descriptor {
        return read_json(path);
    }
    SourceArgs::default().file_descriptor(path)
}
