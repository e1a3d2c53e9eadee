//! Saved aggregations: named group-by specs that own their result table

use chrono::{DateTime, Utc};
use dps_core::{AggFunc, DateFreq, DpsError, Result, Table};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::transform::aggregate::aggregate;

/// A named grouped summary and its materialized result
///
/// The result is a copy taken at save (or reapply) time, so it stays valid
/// however the live table changes afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct SavedAggregation {
    pub name: String,
    pub description: String,
    pub group_by: Vec<String>,
    pub spec: IndexMap<String, AggFunc>,
    pub date_grouping: Option<IndexMap<String, DateFreq>>,
    pub created_at: DateTime<Utc>,
    pub result: Table,
}

/// Serializable part of a saved aggregation; the result travels separately
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub group_by: Vec<String>,
    pub spec: IndexMap<String, AggFunc>,
    #[serde(default)]
    pub date_grouping: Option<IndexMap<String, DateFreq>>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub row_count: usize,
}

impl SavedAggregation {
    pub fn spec(&self) -> AggregationSpec {
        AggregationSpec {
            name: self.name.clone(),
            description: self.description.clone(),
            group_by: self.group_by.clone(),
            spec: self.spec.clone(),
            date_grouping: self.date_grouping.clone(),
            created_at: self.created_at,
            row_count: self.result.num_rows(),
        }
    }

    pub fn from_spec(spec: AggregationSpec, result: Table) -> Self {
        Self {
            name: spec.name,
            description: spec.description,
            group_by: spec.group_by,
            spec: spec.spec,
            date_grouping: spec.date_grouping,
            created_at: spec.created_at,
            result,
        }
    }
}

#[derive(Debug, Default)]
pub struct AggregationManager {
    saved: IndexMap<String, SavedAggregation>,
}

impl AggregationManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a copy of `result` under a new name
    pub fn save(
        &mut self,
        name: &str,
        description: &str,
        group_by: Vec<String>,
        spec: IndexMap<String, AggFunc>,
        date_grouping: Option<IndexMap<String, DateFreq>>,
        result: &Table,
    ) -> Result<&SavedAggregation> {
        if name.trim().is_empty() {
            return Err(DpsError::InvalidOperation("Aggregation name cannot be empty".into()));
        }
        if self.saved.contains_key(name) {
            return Err(DpsError::NameConflict(name.to_string()));
        }
        let entry = SavedAggregation {
            name: name.to_string(),
            description: description.to_string(),
            group_by,
            spec,
            date_grouping,
            created_at: Utc::now(),
            result: result.clone(),
        };
        tracing::info!("Saved aggregation '{}' ({} rows)", name, result.num_rows());
        Ok(self.saved.entry(name.to_string()).or_insert(entry))
    }

    pub fn get(&self, name: &str) -> Result<&SavedAggregation> {
        self.saved
            .get(name)
            .ok_or_else(|| DpsError::NotFound(format!("aggregation '{}'", name)))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.saved.contains_key(name)
    }

    pub fn list(&self) -> Vec<&SavedAggregation> {
        self.saved.values().collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.saved.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.saved.len()
    }

    pub fn is_empty(&self) -> bool {
        self.saved.is_empty()
    }

    pub fn delete(&mut self, name: &str) -> Result<SavedAggregation> {
        self.saved
            .shift_remove(name)
            .ok_or_else(|| DpsError::NotFound(format!("aggregation '{}'", name)))
    }

    pub fn clear(&mut self) {
        self.saved.clear();
    }

    /// Recompute a saved aggregation against `table` and store the new result
    ///
    /// On failure the stored result is left as it was.
    pub fn reapply(&mut self, name: &str, table: &Table) -> Result<&SavedAggregation> {
        let entry = self
            .saved
            .get_mut(name)
            .ok_or_else(|| DpsError::NotFound(format!("aggregation '{}'", name)))?;
        entry.result = aggregate(table, &entry.group_by, &entry.spec, entry.date_grouping.as_ref())?;
        Ok(entry)
    }

    /// Every saved aggregation, results included
    pub fn export(&self) -> Vec<SavedAggregation> {
        self.saved.values().cloned().collect()
    }

    /// Replace the saved set, e.g. from a loaded project
    pub fn import(&mut self, entries: Vec<SavedAggregation>) -> Result<()> {
        let mut incoming = IndexMap::new();
        for entry in entries {
            if incoming.contains_key(&entry.name) {
                return Err(DpsError::NameConflict(entry.name));
            }
            incoming.insert(entry.name.clone(), entry);
        }
        self.saved = incoming;
        Ok(())
    }
}
