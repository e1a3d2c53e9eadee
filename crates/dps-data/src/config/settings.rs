//! Session-wide settings

use std::path::{Path, PathBuf};

use dps_core::{DpsError, Result, DEFAULT_LOG_CAPACITY};
use serde::{Deserialize, Serialize};

use super::NullConfig;

/// Rows sampled for type detection when reading text sources
pub const DEFAULT_SAMPLE_ROWS: usize = 5000;

/// Settings for one session; every field has a default
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Undo depth bound; `None` keeps every step
    pub max_history_depth: Option<usize>,

    /// Activity log ring size
    pub log_capacity: usize,

    /// Parent directory for the subset cache; `None` uses the OS temp dir
    pub cache_root: Option<PathBuf>,

    pub worker_threads: usize,

    pub null_config: NullConfig,

    pub csv_sample_rows: usize,

    /// Drop every subset cache after each change to the current table
    pub auto_invalidate_subset_caches: bool,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            max_history_depth: None,
            log_capacity: DEFAULT_LOG_CAPACITY,
            cache_root: None,
            worker_threads: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            null_config: NullConfig::default(),
            csv_sample_rows: DEFAULT_SAMPLE_ROWS,
            auto_invalidate_subset_caches: true,
        }
    }
}

impl SessionSettings {
    /// Read settings from a JSON file; unknown keys are ignored
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let settings: SessionSettings = serde_json::from_str(&text)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.log_capacity == 0 {
            return Err(DpsError::InvalidOperation("log_capacity must be positive".into()));
        }
        if self.worker_threads == 0 {
            return Err(DpsError::InvalidOperation("worker_threads must be positive".into()));
        }
        if self.csv_sample_rows == 0 {
            return Err(DpsError::InvalidOperation("csv_sample_rows must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"max_history_depth": 20, "theme": "dark"}"#).unwrap();

        let settings = SessionSettings::load(&path).unwrap();
        assert_eq!(settings.max_history_depth, Some(20));
        assert_eq!(settings.log_capacity, 1000);
        assert_eq!(settings.csv_sample_rows, 5000);
        assert!(settings.auto_invalidate_subset_caches);
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        let settings = SessionSettings {
            log_capacity: 50,
            auto_invalidate_subset_caches: false,
            ..SessionSettings::default()
        };
        settings.save(&path).unwrap();
        assert_eq!(SessionSettings::load(&path).unwrap(), settings);
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"log_capacity": 0}"#).unwrap();
        assert!(SessionSettings::load(&path).is_err());
    }
}
