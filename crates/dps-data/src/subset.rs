//! Subset manager: named filters evaluated on demand, with an on-disk cache

use std::path::{Path, PathBuf};

use ahash::{AHashSet, RandomState};
use chrono::{DateTime, Utc};
use dps_core::table::temporal;
use dps_core::{Combine, DpsError, FilterCondition, FilterSpec, Literal, Result, Subset, Table, Value};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tempfile::TempDir;

use crate::ipc;
use crate::transform::filter;

/// Rows produced by evaluating a subset
#[derive(Debug, Clone)]
pub struct SubsetView {
    pub table: Table,
    pub from_cache: bool,
    /// Set when the result could not be cached; the rows are still valid
    pub cache_error: Option<String>,
}

/// Summary of one subset for listings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubsetInfo {
    pub name: String,
    pub description: String,
    pub filter_count: usize,
    pub combine: Combine,
    pub created_at: DateTime<Utc>,
    pub cached_row_count: Option<usize>,
    pub cached: bool,
}

/// Owns subset definitions and the session's cache directory
///
/// The cache directory is removed when the manager is dropped.
#[derive(Debug)]
pub struct SubsetManager {
    subsets: IndexMap<String, Subset>,
    cache_dir: TempDir,
}

impl SubsetManager {
    /// Create a manager with a fresh cache directory under `cache_root`
    /// (the OS temp dir when `None`)
    pub fn new(cache_root: Option<&Path>) -> Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("dps-subsets-");
        let cache_dir = match cache_root {
            Some(root) => {
                std::fs::create_dir_all(root)?;
                builder.tempdir_in(root)?
            }
            None => builder.tempdir()?,
        };
        tracing::debug!("Subset cache at {}", cache_dir.path().display());
        Ok(Self {
            subsets: IndexMap::new(),
            cache_dir,
        })
    }

    pub fn cache_dir(&self) -> &Path {
        self.cache_dir.path()
    }

    pub fn create(
        &mut self,
        name: &str,
        description: &str,
        filters: Vec<FilterSpec>,
        combine: Combine,
    ) -> Result<&Subset> {
        if name.trim().is_empty() {
            return Err(DpsError::InvalidOperation("Subset name cannot be empty".into()));
        }
        if self.subsets.contains_key(name) {
            return Err(DpsError::NameConflict(name.to_string()));
        }
        let subset = Subset::new(name, description, filters, combine);
        tracing::info!("Created subset '{}'", name);
        Ok(self.subsets.entry(name.to_string()).or_insert(subset))
    }

    /// Replace a subset's definition; its cache is dropped
    pub fn update(
        &mut self,
        name: &str,
        description: Option<&str>,
        filters: Vec<FilterSpec>,
        combine: Combine,
    ) -> Result<&Subset> {
        self.invalidate(name);
        let subset = self
            .subsets
            .get_mut(name)
            .ok_or_else(|| DpsError::NotFound(format!("subset '{}'", name)))?;
        if let Some(description) = description {
            subset.description = description.to_string();
        }
        subset.filters = filters;
        subset.combine = combine;
        subset.cached_row_count = None;
        Ok(subset)
    }

    pub fn delete(&mut self, name: &str) -> Result<Subset> {
        let removed = self
            .subsets
            .shift_remove(name)
            .ok_or_else(|| DpsError::NotFound(format!("subset '{}'", name)))?;
        self.invalidate(name);
        Ok(removed)
    }

    pub fn get(&self, name: &str) -> Result<&Subset> {
        self.subsets
            .get(name)
            .ok_or_else(|| DpsError::NotFound(format!("subset '{}'", name)))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.subsets.contains_key(name)
    }

    /// Subsets in creation order
    pub fn list(&self) -> Vec<&Subset> {
        self.subsets.values().collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.subsets.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.subsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subsets.is_empty()
    }

    pub fn info(&self, name: &str) -> Result<SubsetInfo> {
        let subset = self.get(name)?;
        Ok(SubsetInfo {
            name: subset.name.clone(),
            description: subset.description.clone(),
            filter_count: subset.filters.len(),
            combine: subset.combine,
            created_at: subset.created_at,
            cached_row_count: subset.cached_row_count,
            cached: self.is_cached(name),
        })
    }

    pub fn is_cached(&self, name: &str) -> bool {
        self.cache_path(name).exists()
    }

    /// Evaluate a subset against `table`
    ///
    /// With `use_cache`, a cached result is returned when present. A fresh
    /// result is written back to the cache; a failed write is reported in
    /// `cache_error` and logged, not returned as an error.
    pub fn apply(&mut self, table: &Table, name: &str, use_cache: bool) -> Result<SubsetView> {
        let subset = self.get(name)?.clone();
        let path = self.cache_path(name);

        if use_cache && path.exists() {
            match ipc::read_ipc_file(&path) {
                Ok(cached) => {
                    tracing::debug!("Subset '{}' served from cache", name);
                    return Ok(SubsetView {
                        table: cached,
                        from_cache: true,
                        cache_error: None,
                    });
                }
                Err(e) => tracing::warn!("Ignoring unreadable cache for subset '{}': {}", name, e),
            }
        }

        let rows = filter::apply_filters(table, &subset.filters, subset.combine)?;
        if let Some(entry) = self.subsets.get_mut(name) {
            entry.cached_row_count = Some(rows.num_rows());
        }

        let cache_error = match ipc::write_ipc_file(&rows, &path) {
            Ok(()) => None,
            Err(e) => {
                let err = DpsError::CacheWriteFailed(format!("subset '{}': {}", name, e));
                tracing::warn!("{}", err);
                let _ = std::fs::remove_file(&path);
                Some(err.to_string())
            }
        };
        Ok(SubsetView {
            table: rows,
            from_cache: false,
            cache_error,
        })
    }

    /// One `column == value` subset per distinct non-null value
    ///
    /// Names are `{prefix}{value}` (prefix defaults to `{column}_`); names that
    /// already exist are skipped. Returns the names created.
    pub fn create_from_unique_values(&mut self, table: &Table, column: &str, prefix: Option<&str>) -> Result<Vec<String>> {
        let source = table.column(column)?;
        let prefix = prefix.map(str::to_string).unwrap_or_else(|| format!("{}_", column));
        let tz = source.dtype.timezone();

        let mut seen: AHashSet<&Value> = AHashSet::new();
        let mut distinct: Vec<&Value> = source
            .values
            .iter()
            .filter(|v| !v.is_null() && seen.insert(*v))
            .collect();
        distinct.sort_by(|a, b| a.cmp_total(b));

        let mut created = Vec::new();
        for value in distinct {
            let Some(text) = value.to_text(tz) else { continue };
            let name = format!("{}{}", prefix, text);
            if self.contains(&name) {
                continue;
            }
            let spec = FilterSpec::new(column, FilterCondition::Eq, literal_of(value, tz));
            let description = format!("{} == {}", column, text);
            self.create(&name, &description, vec![spec], Combine::All)?;
            created.push(name);
        }
        Ok(created)
    }

    fn invalidate(&self, name: &str) {
        let path = self.cache_path(name);
        if path.exists() {
            if let Err(e) = std::fs::remove_file(&path) {
                tracing::warn!("Could not remove cache for subset '{}': {}", name, e);
            }
        }
    }

    /// Drop every cached result; returns how many files were removed
    pub fn clear_cache(&mut self) -> usize {
        let mut removed = 0;
        for name in self.subsets.keys() {
            let path = self.cache_path(name);
            if path.exists() && std::fs::remove_file(&path).is_ok() {
                removed += 1;
            }
        }
        for subset in self.subsets.values_mut() {
            subset.cached_row_count = None;
        }
        if removed > 0 {
            tracing::debug!("Cleared {} subset cache file(s)", removed);
        }
        removed
    }

    /// Definitions for persistence
    pub fn export(&self) -> Vec<Subset> {
        self.subsets.values().cloned().collect()
    }

    /// Replace every definition, e.g. from a loaded project
    pub fn import(&mut self, subsets: Vec<Subset>) -> Result<()> {
        let mut incoming = IndexMap::new();
        for subset in subsets {
            if incoming.contains_key(&subset.name) {
                return Err(DpsError::NameConflict(subset.name));
            }
            incoming.insert(subset.name.clone(), subset);
        }
        self.clear_cache();
        self.subsets = incoming;
        Ok(())
    }

    /// `<slug>-<hash>.arrow`; the hash keeps distinct names apart after slugging
    fn cache_path(&self, name: &str) -> PathBuf {
        let slug: String = name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .take(40)
            .collect();
        let hash = RandomState::with_seeds(0x5d, 0x17, 0x2b, 0x9e).hash_one(name);
        self.cache_dir.path().join(format!("{}-{:016x}.arrow", slug, hash))
    }
}

fn literal_of(value: &Value, timezone: Option<&str>) -> Literal {
    match value {
        Value::Null => Literal::Null,
        Value::Bool(b) => Literal::Bool(*b),
        Value::Int(i) => Literal::Int(*i),
        Value::Float(f) => Literal::Float(*f),
        Value::Text(s) => Literal::Text(s.clone()),
        Value::Timestamp(ms) => Literal::Text(temporal::format_millis(*ms, timezone)),
    }
}
