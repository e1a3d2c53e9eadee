//! Source adapters and the registry that dispatches to them

pub mod csv_source;
pub mod json_source;
pub mod scratch_source;
pub mod sqlite_source;

pub use csv_source::CsvSource;
pub use json_source::JsonSource;
pub use scratch_source::ScratchSource;
pub use sqlite_source::SqliteSource;

use std::sync::Arc;

use dps_core::{DpsError, FileFormat, ProgressReporter, Result, SourceAdapter, SourceDescriptor, Table};

use crate::config::SessionSettings;

/// Dispatches a descriptor to the first adapter that handles it
#[derive(Clone, Default)]
pub struct SourceRegistry {
    adapters: Vec<Arc<dyn SourceAdapter>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every in-process adapter
    pub fn with_defaults(settings: &SessionSettings) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(CsvSource::new(
            settings.null_config.clone(),
            settings.csv_sample_rows,
        )));
        registry.register(Arc::new(JsonSource));
        registry.register(Arc::new(SqliteSource));
        registry.register(Arc::new(ScratchSource));
        registry
    }

    pub fn register(&mut self, adapter: Arc<dyn SourceAdapter>) {
        self.adapters.push(adapter);
    }

    pub fn adapter_for(&self, descriptor: &SourceDescriptor) -> Result<Arc<dyn SourceAdapter>> {
        self.adapters
            .iter()
            .find(|a| a.handles(descriptor))
            .cloned()
            .ok_or_else(|| DpsError::SourceUnavailable(unsupported(descriptor)))
    }

    pub async fn load(&self, descriptor: &SourceDescriptor, progress: &ProgressReporter) -> Result<Table> {
        let adapter = self.adapter_for(descriptor)?;
        tracing::info!("Loading {} with the {} adapter", descriptor, adapter.name());
        progress.check_cancelled()?;
        adapter.load(descriptor, progress).await
    }
}

impl std::fmt::Debug for SourceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.adapters.iter().map(|a| a.name())).finish()
    }
}

fn unsupported(descriptor: &SourceDescriptor) -> String {
    match descriptor {
        SourceDescriptor::Sheet { .. } => match descriptor.sheet_export_url() {
            Some(url) => format!("No sheet downloader is available; export the sheet from {} and load it as CSV", url),
            None => "No sheet downloader is available".to_string(),
        },
        SourceDescriptor::LocalFile { format: format @ (FileFormat::Excel | FileFormat::Parquet), .. } => {
            format!("No reader is available for {:?} files", format)
        }
        other => format!("No adapter can load {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_dispatch_scratch() {
        let registry = SourceRegistry::with_defaults(&SessionSettings::default());
        let descriptor = SourceDescriptor::Scratch { rows: 2, cols: 3, names: Vec::new() };
        let table = registry.load(&descriptor, &ProgressReporter::detached()).await.unwrap();
        assert_eq!(table.num_columns(), 3);
    }

    #[tokio::test]
    async fn test_sheet_is_unavailable() {
        let registry = SourceRegistry::with_defaults(&SessionSettings::default());
        let descriptor = SourceDescriptor::Sheet {
            sheet_id: "abc".into(),
            sheet_name: None,
            gid: Some("7".into()),
            delimiter: ',',
            decimal: '.',
            thousands: None,
        };
        let err = registry.load(&descriptor, &ProgressReporter::detached()).await.unwrap_err();
        assert_eq!(err.kind(), dps_core::ErrorKind::SourceUnavailable);
        assert!(err.to_string().contains("gid=7"));
    }
}
