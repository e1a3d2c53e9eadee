//! Descriptors identifying where a baseline table came from

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::table::Table;
use crate::task::ProgressReporter;

/// On-disk formats a local file source can have
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileFormat {
    Csv,
    Tsv,
    Excel,
    Json,
    Parquet,
}

impl FileFormat {
    /// Guess the format from a file extension
    pub fn from_extension(path: &std::path::Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        match ext.as_str() {
            "csv" | "txt" => Some(FileFormat::Csv),
            "tsv" | "tab" => Some(FileFormat::Tsv),
            "xlsx" | "xls" | "xlsm" => Some(FileFormat::Excel),
            "json" => Some(FileFormat::Json),
            "parquet" | "pq" => Some(FileFormat::Parquet),
            _ => None,
        }
    }
}

fn default_delimiter() -> char {
    ','
}

fn default_decimal() -> char {
    '.'
}

fn default_true() -> bool {
    true
}

/// Parsing options for delimited text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextOptions {
    #[serde(default = "default_delimiter")]
    pub delimiter: char,
    #[serde(default = "default_decimal")]
    pub decimal: char,
    #[serde(default)]
    pub thousands: Option<char>,
    #[serde(default = "default_true")]
    pub has_header: bool,
}

impl Default for TextOptions {
    fn default() -> Self {
        Self {
            delimiter: default_delimiter(),
            decimal: default_decimal(),
            thousands: None,
            has_header: true,
        }
    }
}

/// Where the baseline table came from, and how to load it again
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum SourceDescriptor {
    LocalFile {
        path: PathBuf,
        format: FileFormat,
        #[serde(default)]
        options: TextOptions,
    },
    Sheet {
        sheet_id: String,
        #[serde(default)]
        sheet_name: Option<String>,
        #[serde(default)]
        gid: Option<String>,
        #[serde(default = "default_delimiter")]
        delimiter: char,
        #[serde(default = "default_decimal")]
        decimal: char,
        #[serde(default)]
        thousands: Option<char>,
    },
    Database {
        connection_string: String,
        query: String,
    },
    Scratch {
        rows: usize,
        cols: usize,
        #[serde(default)]
        names: Vec<String>,
    },
}

impl SourceDescriptor {
    /// A local CSV file with default parsing options
    pub fn csv(path: impl Into<PathBuf>) -> Self {
        SourceDescriptor::LocalFile {
            path: path.into(),
            format: FileFormat::Csv,
            options: TextOptions::default(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            SourceDescriptor::LocalFile { .. } => "LocalFile",
            SourceDescriptor::Sheet { .. } => "Sheet",
            SourceDescriptor::Database { .. } => "Database",
            SourceDescriptor::Scratch { .. } => "Scratch",
        }
    }

    /// Text parsing options implied by the descriptor
    pub fn text_options(&self) -> TextOptions {
        match self {
            SourceDescriptor::LocalFile { format: FileFormat::Tsv, options, .. } => TextOptions {
                delimiter: '\t',
                ..options.clone()
            },
            SourceDescriptor::LocalFile { options, .. } => options.clone(),
            SourceDescriptor::Sheet { delimiter, decimal, thousands, .. } => TextOptions {
                delimiter: *delimiter,
                decimal: *decimal,
                thousands: *thousands,
                has_header: true,
            },
            _ => TextOptions::default(),
        }
    }

    /// CSV export URL for a sheet descriptor
    ///
    /// A numeric grid id takes precedence over a sheet name.
    pub fn sheet_export_url(&self) -> Option<String> {
        let SourceDescriptor::Sheet { sheet_id, sheet_name, gid, .. } = self else {
            return None;
        };
        let base = format!("https://docs.google.com/spreadsheets/d/{}", sheet_id);
        Some(match (gid, sheet_name) {
            (Some(gid), _) => format!("{}/export?format=csv&gid={}", base, gid),
            (None, Some(name)) => format!("{}/gviz/tq?tqx=out:csv&sheet={}", base, percent_encode(name)),
            (None, None) => format!("{}/export?format=csv", base),
        })
    }
}

fn percent_encode(text: &str) -> String {
    let mut out = String::new();
    for byte in text.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => out.push(byte as char),
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

impl fmt::Display for SourceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceDescriptor::LocalFile { path, format, .. } => {
                write!(f, "{} ({:?})", path.display(), format)
            }
            SourceDescriptor::Sheet { sheet_id, sheet_name, .. } => match sheet_name {
                Some(name) => write!(f, "sheet {} / {}", sheet_id, name),
                None => write!(f, "sheet {}", sheet_id),
            },
            SourceDescriptor::Database { connection_string, .. } => write!(f, "database {}", connection_string),
            SourceDescriptor::Scratch { rows, cols, .. } => write!(f, "scratch {}x{}", rows, cols),
        }
    }
}

/// A loader for one family of source descriptors
///
/// Adapters run on the worker pool. They report progress through the reporter
/// and check its cancellation token between chunks.
#[async_trait::async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Short adapter name for logs
    fn name(&self) -> &str;

    /// Whether this adapter can load `descriptor`
    fn handles(&self, descriptor: &SourceDescriptor) -> bool;

    /// Load the baseline table
    async fn load(&self, descriptor: &SourceDescriptor, progress: &ProgressReporter) -> Result<Table>;
}
