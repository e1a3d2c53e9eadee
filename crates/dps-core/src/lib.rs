//! Core model for the DataPlot Studio engine
//!
//! Values and tables, the operation vocabulary and its log, the history
//! engine, source descriptors, the plot configuration model, and the shared
//! plumbing (errors, activity log, events, worker tasks) the engine and its
//! front ends build on.

pub mod activity;
pub mod error;
pub mod events;
pub mod history;
pub mod operation;
pub mod plot;
pub mod source;
pub mod subset;
pub mod table;
pub mod task;

// Re-export commonly used types
pub use activity::{ActivityLog, LogEntry, LogLevel, TimestampStyle, DEFAULT_LOG_CAPACITY};
pub use error::{DpsError, ErrorKind, Result};
pub use events::EventBus;
pub use history::HistoryEngine;
pub use operation::{
    AggFunc, BinMethod, Combine, DateComponent, DateFreq, DiffUnit, FillMethod, FilterCondition, FilterSpec,
    JoinHow, NormalizeMethod, Operation, OperationLog, TextTransform,
};
pub use plot::{PlotConfig, PlotType};
pub use source::{FileFormat, SourceAdapter, SourceDescriptor, TextOptions};
pub use subset::Subset;
pub use table::{Column, ColumnType, Literal, Table, Value};
pub use task::{CancellationToken, Progress, ProgressReporter, TaskEvent, TaskHandle, TaskPool, Ticket};
