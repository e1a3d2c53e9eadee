//! Subset definitions: named, parameterized filters over the current table

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::operation::{Combine, FilterSpec};

/// A named filter definition
///
/// Subsets own no rows; they are evaluated on demand against whatever table
/// is current.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subset {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub filters: Vec<FilterSpec>,
    #[serde(default)]
    pub combine: Combine,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    /// Row count from the last evaluation, if any
    #[serde(default)]
    pub cached_row_count: Option<usize>,
}

impl Subset {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        filters: Vec<FilterSpec>,
        combine: Combine,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            filters,
            combine,
            created_at: Utc::now(),
            cached_row_count: None,
        }
    }
}
