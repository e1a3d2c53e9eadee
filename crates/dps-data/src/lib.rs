//! The DataPlot Studio engine
//!
//! Operation application, the table store with its history, subsets with an
//! on-disk cache, saved aggregations, source adapters, export, statistics,
//! project files, and the `Session` that ties them together.

pub mod aggregation;
pub mod config;
pub mod export;
pub mod ipc;
pub mod project;
pub mod schema;
pub mod session;
pub mod sources;
pub mod stats;
pub mod store;
pub mod subset;
pub mod transform;

pub use aggregation::{AggregationManager, AggregationSpec, SavedAggregation};
pub use config::{NullConfig, SessionSettings};
pub use export::{export_table, ExportFormat, ExportOptions};
pub use project::{Project, SCHEMA_VERSION};
pub use schema::SchemaDetector;
pub use session::Session;
pub use sources::{CsvSource, JsonSource, ScratchSource, SourceRegistry, SqliteSource};
pub use stats::{describe, ColumnSummary};
pub use store::{StoreState, TableStore};
pub use subset::{SubsetInfo, SubsetManager, SubsetView};
pub use transform::{apply, replay, Applied, NoTables, TableResolver};
