//! Project bundles on disk
//!
//! A project is two files: `<name>.dps`, pretty JSON with the source
//! descriptor, operation log, subset definitions, aggregation specs and plot
//! config; and `<name>.dps.data`, a binary blob holding the current table,
//! the baseline and every saved aggregation result as Arrow IPC streams.
//!
//! Blob layout: the magic `DPSDATA1`, a little-endian `u32` entry count, then
//! per entry a `u32` name length, the UTF-8 name, a `u64` payload length and
//! the payload.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use dps_core::{DpsError, OperationLog, PlotConfig, Result, SourceDescriptor, Subset, Table};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tempfile::NamedTempFile;

use crate::aggregation::{AggregationSpec, SavedAggregation};
use crate::ipc::{from_ipc_bytes, to_ipc_bytes};

/// Newest schema version this build reads and the one it writes
pub const SCHEMA_VERSION: u32 = 2;

pub const PROJECT_EXTENSION: &str = "dps";

const BLOB_MAGIC: &[u8; 8] = b"DPSDATA1";
const CURRENT_ENTRY: &str = "current";
const BASELINE_ENTRY: &str = "baseline";
const AGGREGATION_PREFIX: &str = "aggregation:";

/// Everything a project file restores
#[derive(Debug, Clone, PartialEq)]
pub struct Project {
    pub source: Option<SourceDescriptor>,
    pub operations: OperationLog,
    pub baseline: Table,
    pub current: Table,
    pub subsets: Vec<Subset>,
    pub aggregations: Vec<SavedAggregation>,
    pub plot: PlotConfig,
}

/// On-disk metadata document
#[derive(Debug, Serialize, Deserialize)]
struct Manifest {
    schema_version: u32,
    #[serde(default)]
    saved_at: Option<DateTime<Utc>>,
    #[serde(default)]
    source: Option<SourceDescriptor>,
    #[serde(default)]
    operations: OperationLog,
    #[serde(default)]
    subsets: Vec<Subset>,
    #[serde(default)]
    saved_aggregations: Vec<AggregationSpec>,
    #[serde(default)]
    plot_config: JsonValue,
    data: DataRef,
}

#[derive(Debug, Serialize, Deserialize)]
struct DataRef {
    file: String,
    rows: usize,
    columns: usize,
}

/// Path of the companion data blob for `path`
pub fn data_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".data");
    PathBuf::from(name)
}

impl Project {
    /// Write the project; fails with `NameConflict` if `path` exists
    pub fn save(&self, path: &Path) -> Result<()> {
        if path.exists() {
            return Err(DpsError::NameConflict(path.display().to_string()));
        }
        self.write(path)
    }

    /// Write the project, replacing any existing files
    pub fn overwrite(&self, path: &Path) -> Result<()> {
        self.write(path)
    }

    fn write(&self, path: &Path) -> Result<()> {
        let blob_path = data_path(path);
        let blob_name = blob_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| DpsError::InvalidOperation(format!("Invalid project path {}", path.display())))?;

        let manifest = Manifest {
            schema_version: SCHEMA_VERSION,
            saved_at: Some(Utc::now()),
            source: self.source.clone(),
            operations: self.operations.clone(),
            subsets: self.subsets.clone(),
            saved_aggregations: self.aggregations.iter().map(SavedAggregation::spec).collect(),
            plot_config: self.plot.to_value()?,
            data: DataRef {
                file: blob_name,
                rows: self.current.num_rows(),
                columns: self.current.num_columns(),
            },
        };
        let json = serde_json::to_vec_pretty(&manifest)?;
        let blob = self.encode_blob()?;

        let dir = parent_dir(path);
        std::fs::create_dir_all(dir)?;

        // Blob first, manifest second; both land by rename.
        let blob_tmp = write_temp(dir, &blob)?;
        let manifest_tmp = write_temp(dir, &json)?;
        blob_tmp.persist(&blob_path).map_err(|e| DpsError::Io(e.error))?;
        manifest_tmp.persist(path).map_err(|e| DpsError::Io(e.error))?;

        tracing::info!(
            "Saved project {} ({} operations, {} subsets, {} aggregations)",
            path.display(),
            self.operations.len(),
            self.subsets.len(),
            self.aggregations.len()
        );
        Ok(())
    }

    fn encode_blob(&self) -> Result<Vec<u8>> {
        let mut entries = vec![
            (CURRENT_ENTRY.to_string(), to_ipc_bytes(&self.current)?),
            (BASELINE_ENTRY.to_string(), to_ipc_bytes(&self.baseline)?),
        ];
        for saved in &self.aggregations {
            entries.push((format!("{}{}", AGGREGATION_PREFIX, saved.name), to_ipc_bytes(&saved.result)?));
        }

        let mut out = Vec::with_capacity(entries.iter().map(|(_, b)| b.len() + 64).sum());
        out.extend_from_slice(BLOB_MAGIC);
        out.extend_from_slice(&(entries.len() as u32).to_le_bytes());
        for (name, bytes) in &entries {
            out.extend_from_slice(&(name.len() as u32).to_le_bytes());
            out.extend_from_slice(name.as_bytes());
            out.extend_from_slice(&(bytes.len() as u64).to_le_bytes());
            out.extend_from_slice(bytes);
        }
        Ok(out)
    }

    /// Read a project written by this or an older version
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let raw: JsonValue = serde_json::from_str(&text)
            .map_err(|e| DpsError::CorruptedProject(format!("{}: {}", path.display(), e)))?;
        let manifest = upgrade(raw)?;

        let blob_path = parent_dir(path).join(&manifest.data.file);
        let blob = std::fs::read(&blob_path).map_err(|e| {
            DpsError::CorruptedProject(format!("cannot read data file {}: {}", blob_path.display(), e))
        })?;
        let mut tables = decode_blob(&blob)?;

        let current = tables
            .shift_remove(CURRENT_ENTRY)
            .ok_or_else(|| DpsError::CorruptedProject("data file has no current table".into()))?;
        if current.num_rows() != manifest.data.rows || current.num_columns() != manifest.data.columns {
            return Err(DpsError::CorruptedProject(format!(
                "data file holds {}x{}, metadata says {}x{}",
                current.num_rows(),
                current.num_columns(),
                manifest.data.rows,
                manifest.data.columns
            )));
        }
        // Version 1 bundles carried no baseline; the saved table stands in.
        let baseline = tables.shift_remove(BASELINE_ENTRY).unwrap_or_else(|| current.clone());

        let mut aggregations = Vec::with_capacity(manifest.saved_aggregations.len());
        for spec in manifest.saved_aggregations {
            let key = format!("{}{}", AGGREGATION_PREFIX, spec.name);
            let result = tables.shift_remove(&key).ok_or_else(|| {
                DpsError::CorruptedProject(format!("data file has no result for aggregation '{}'", spec.name))
            })?;
            aggregations.push(SavedAggregation::from_spec(spec, result));
        }

        let plot = PlotConfig::from_value(manifest.plot_config)
            .map_err(|e| DpsError::CorruptedProject(e.to_string()))?;

        tracing::info!("Loaded project {}", path.display());
        Ok(Self {
            source: manifest.source,
            operations: manifest.operations,
            baseline,
            current,
            subsets: manifest.subsets,
            aggregations,
            plot,
        })
    }
}

/// Bring an older manifest up to the current schema
fn upgrade(mut raw: JsonValue) -> Result<Manifest> {
    let version = raw
        .get("schema_version")
        .and_then(JsonValue::as_u64)
        .ok_or_else(|| DpsError::CorruptedProject("missing schema_version".into()))? as u32;
    if version > SCHEMA_VERSION {
        return Err(DpsError::UnsupportedSchemaVersion {
            found: version,
            supported: SCHEMA_VERSION,
        });
    }

    if version < 2 {
        if let Some(object) = raw.as_object_mut() {
            if let Some(plot) = object.remove("plot") {
                object.insert("plot_config".into(), plot);
            }
            object.insert("saved_aggregations".into(), JsonValue::Array(Vec::new()));
            object.insert("schema_version".into(), JsonValue::from(SCHEMA_VERSION));
        }
        tracing::info!("Upgraded project from schema version {}", version);
    }

    serde_json::from_value(raw).map_err(|e| DpsError::CorruptedProject(e.to_string()))
}

fn decode_blob(bytes: &[u8]) -> Result<IndexMap<String, Table>> {
    let mut reader = BlobReader { bytes, pos: 0 };
    if reader.take(BLOB_MAGIC.len())? != BLOB_MAGIC {
        return Err(DpsError::CorruptedProject("data file has the wrong header".into()));
    }
    let count = reader.u32()?;
    let mut tables = IndexMap::new();
    for _ in 0..count {
        let name_len = reader.u32()? as usize;
        let name = std::str::from_utf8(reader.take(name_len)?)
            .map_err(|_| DpsError::CorruptedProject("entry name is not UTF-8".into()))?
            .to_string();
        let len = usize::try_from(reader.u64()?)
            .map_err(|_| DpsError::CorruptedProject("entry too large".into()))?;
        let table = from_ipc_bytes(reader.take(len)?)
            .map_err(|e| DpsError::CorruptedProject(format!("entry '{}': {}", name, e)))?;
        tables.insert(name, table);
    }
    if reader.pos != bytes.len() {
        return Err(DpsError::CorruptedProject("trailing bytes in data file".into()));
    }
    Ok(tables)
}

struct BlobReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> BlobReader<'a> {
    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.bytes.len())
            .ok_or_else(|| DpsError::CorruptedProject("data file is truncated".into()))?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u32(&mut self) -> Result<u32> {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(self.take(4)?);
        Ok(u32::from_le_bytes(buf))
    }

    fn u64(&mut self) -> Result<u64> {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(self.take(8)?);
        Ok(u64::from_le_bytes(buf))
    }
}

fn parent_dir(path: &Path) -> &Path {
    path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
}

fn write_temp(dir: &Path, bytes: &[u8]) -> Result<NamedTempFile> {
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    Ok(tmp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::aggregate::aggregate;
    use crate::transform::test_support::*;
    use dps_core::{AggFunc, Combine, ErrorKind, FilterCondition, FilterSpec, Literal, Operation, PlotType};
    use tempfile::TempDir;

    fn sample() -> Project {
        let baseline = xy();
        let operations = OperationLog::from(vec![Operation::Filter {
            column: "x".into(),
            condition: FilterCondition::Gt,
            value: Literal::Int(1),
        }]);
        let current = crate::transform::replay(&baseline, &operations, &crate::transform::NoTables).unwrap();
        let spec: IndexMap<String, AggFunc> = [("x".to_string(), AggFunc::Sum)].into_iter().collect();
        let result = aggregate(&baseline, &["y".to_string()], &spec, None).unwrap();
        let saved = SavedAggregation {
            name: "by y".into(),
            description: "totals".into(),
            group_by: vec!["y".into()],
            spec,
            date_grouping: None,
            created_at: Utc::now(),
            result,
        };
        let mut plot = PlotConfig::new(PlotType::Scatter);
        plot.basic.x = Some("x".into());
        Project {
            source: Some(SourceDescriptor::csv("in.csv")),
            operations,
            baseline,
            current,
            subsets: vec![Subset::new(
                "hi",
                "",
                vec![FilterSpec::new("x", FilterCondition::Gt, Literal::Int(1))],
                Combine::All,
            )],
            aggregations: vec![saved],
            plot,
        }
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("study.dps");
        let project = sample();
        project.save(&path).unwrap();
        assert!(data_path(&path).exists());

        let loaded = Project::load(&path).unwrap();
        assert_eq!(loaded, project);
    }

    #[test]
    fn test_save_refuses_to_clobber() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("study.dps");
        let project = sample();
        project.save(&path).unwrap();
        assert_eq!(project.save(&path).unwrap_err().kind(), ErrorKind::NameConflict);
        project.overwrite(&path).unwrap();
        assert_eq!(Project::load(&path).unwrap(), project);
    }

    #[test]
    fn test_newer_version_is_refused() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("future.dps");
        sample().save(&path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let bumped = text.replacen("\"schema_version\": 2", "\"schema_version\": 9", 1);
        std::fs::write(&path, bumped).unwrap();

        match Project::load(&path).unwrap_err() {
            DpsError::UnsupportedSchemaVersion { found, supported } => {
                assert_eq!((found, supported), (9, SCHEMA_VERSION));
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn test_version_one_is_upgraded() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("old.dps");
        let current = xy();
        let blob = Project {
            source: None,
            operations: OperationLog::new(),
            baseline: current.clone(),
            current: current.clone(),
            subsets: Vec::new(),
            aggregations: Vec::new(),
            plot: PlotConfig::default(),
        }
        .encode_blob()
        .unwrap();
        std::fs::write(dir.path().join("old.dps.data"), blob).unwrap();
        let manifest = serde_json::json!({
            "schema_version": 1,
            "operations": [],
            "subsets": [],
            "plot": {"plot_type": "bar", "unknown_key": true},
            "data": {"file": "old.dps.data", "rows": 3, "columns": 2}
        });
        std::fs::write(&path, manifest.to_string()).unwrap();

        let loaded = Project::load(&path).unwrap();
        assert_eq!(loaded.current, current);
        assert!(loaded.aggregations.is_empty());
        assert_eq!(loaded.plot.plot_type, PlotType::Bar);
    }

    #[test]
    fn test_damaged_blob_is_corrupted_project() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("study.dps");
        sample().save(&path).unwrap();
        let blob = std::fs::read(data_path(&path)).unwrap();
        std::fs::write(data_path(&path), &blob[..blob.len() / 2]).unwrap();
        assert_eq!(Project::load(&path).unwrap_err().kind(), ErrorKind::CorruptedProject);

        std::fs::write(data_path(&path), b"NOTDATA!").unwrap();
        assert_eq!(Project::load(&path).unwrap_err().kind(), ErrorKind::CorruptedProject);
    }
}
