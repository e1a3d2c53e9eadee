//! The editing session
//!
//! `Session` owns every engine component for one open dataset: the table
//! store, subset and aggregation managers, the plot config, the activity log,
//! the event bus and the worker pool. Front ends hold one session and route
//! every change through it, so derived views stay consistent with the current
//! table.

use std::path::{Path, PathBuf};

use ahash::AHashMap;
use dps_core::events::SessionEvent;
use dps_core::{
    ActivityLog, AggFunc, Combine, DateFreq, DpsError, EventBus, FilterSpec, Operation, PlotConfig, Result,
    SourceDescriptor, Table, TaskHandle, TaskPool, Ticket,
};
use indexmap::IndexMap;

use crate::aggregation::{AggregationManager, SavedAggregation};
use crate::config::SessionSettings;
use crate::export::{export_table, ExportFormat, ExportOptions};
use crate::project::Project;
use crate::sources::SourceRegistry;
use crate::stats::{describe, ColumnSummary};
use crate::store::{StoreState, TableStore};
use crate::subset::{SubsetManager, SubsetView};
use crate::transform::aggregate::{aggregate, aggregate_preview};
use crate::transform::filter::validate_filters;
use crate::transform::{Applied, TableResolver};

/// Worker slot for imports and refreshes; a newer load supersedes older ones
pub const IMPORT_SLOT: &str = "import";
/// Worker slot for background aggregations
pub const AGGREGATE_SLOT: &str = "aggregate";

/// Prefix under which saved aggregations can be merged
pub const AGGREGATION_REF_PREFIX: &str = "aggregation:";

/// Merge references resolved against the session's side tables
struct SessionTables<'a> {
    tables: &'a AHashMap<String, Table>,
    aggregations: &'a AggregationManager,
}

impl TableResolver for SessionTables<'_> {
    fn resolve(&self, reference: &str) -> Result<Table> {
        if let Some(name) = reference.strip_prefix(AGGREGATION_REF_PREFIX) {
            return Ok(self.aggregations.get(name)?.result.clone());
        }
        self.tables.resolve(reference)
    }
}

pub struct Session {
    settings: SessionSettings,
    activity: ActivityLog,
    events: EventBus,
    tasks: TaskPool,
    sources: SourceRegistry,
    source: Option<SourceDescriptor>,
    store: Option<TableStore>,
    subsets: SubsetManager,
    aggregations: AggregationManager,
    plot: PlotConfig,
    tables: AHashMap<String, Table>,
    project_path: Option<PathBuf>,
}

impl Session {
    pub fn new(settings: SessionSettings) -> Result<Self> {
        settings.validate()?;
        let tasks = TaskPool::new(settings.worker_threads)?;
        let subsets = SubsetManager::new(settings.cache_root.as_deref())?;
        Ok(Self {
            activity: ActivityLog::new(settings.log_capacity),
            events: EventBus::new(),
            sources: SourceRegistry::with_defaults(&settings),
            tasks,
            source: None,
            store: None,
            subsets,
            aggregations: AggregationManager::new(),
            plot: PlotConfig::default(),
            tables: AHashMap::new(),
            project_path: None,
            settings,
        })
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn activity(&self) -> &ActivityLog {
        &self.activity
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn tasks(&self) -> &TaskPool {
        &self.tasks
    }

    pub fn sources_mut(&mut self) -> &mut SourceRegistry {
        &mut self.sources
    }

    pub fn source(&self) -> Option<&SourceDescriptor> {
        self.source.as_ref()
    }

    pub fn project_path(&self) -> Option<&Path> {
        self.project_path.as_deref()
    }

    pub fn has_table(&self) -> bool {
        self.store.is_some()
    }

    pub fn store(&self) -> Result<&TableStore> {
        self.store
            .as_ref()
            .ok_or_else(|| DpsError::NotFound("no table is loaded".into()))
    }

    pub fn current(&self) -> Result<&Table> {
        Ok(self.store()?.current())
    }

    pub fn subsets(&self) -> &SubsetManager {
        &self.subsets
    }

    pub fn aggregations(&self) -> &AggregationManager {
        &self.aggregations
    }

    pub fn plot(&self) -> &PlotConfig {
        &self.plot
    }

    /// Replace the plot config after validating it
    pub fn set_plot(&mut self, plot: PlotConfig) -> Result<()> {
        plot.validate()?;
        self.plot = plot;
        Ok(())
    }

    // ---- Loading -------------------------------------------------------

    /// Start loading `descriptor` on the worker pool
    ///
    /// Any load still running becomes stale; pass the finished result to
    /// [`Session::complete_load`].
    pub fn begin_load(&self, descriptor: &SourceDescriptor) -> TaskHandle<Table> {
        let registry = self.sources.clone();
        let descriptor = descriptor.clone();
        self.tasks.spawn(IMPORT_SLOT, move |reporter| async move {
            registry.load(&descriptor, &reporter).await
        })
    }

    /// Install the outcome of a load started with [`Session::begin_load`]
    ///
    /// Returns `Ok(false)` when a newer load superseded this one and the
    /// result was discarded.
    pub fn complete_load(&mut self, ticket: Ticket, descriptor: SourceDescriptor, outcome: Result<Table>) -> Result<bool> {
        if !self.tasks.is_current(&ticket) {
            tracing::debug!("Discarding stale load of {}", descriptor);
            return Ok(false);
        }
        let table = outcome.map_err(|e| self.report(&format!("Loading {}", descriptor), e))?;
        self.install(descriptor, table);
        Ok(true)
    }

    /// Load a source and wait for it; for headless callers
    pub fn load_source(&mut self, descriptor: SourceDescriptor) -> Result<()> {
        let handle = self.begin_load(&descriptor);
        let ticket = handle.ticket();
        let outcome = handle.wait(|p| tracing::debug!("{}% {}", p.percent, p.message));
        self.complete_load(ticket, descriptor, outcome).map(|_| ())
    }

    /// Use an in-memory table as the baseline
    pub fn load_table(&mut self, descriptor: SourceDescriptor, table: Table) {
        self.tasks.supersede(IMPORT_SLOT);
        self.install(descriptor, table);
    }

    fn install(&mut self, descriptor: SourceDescriptor, table: Table) {
        self.activity.success(format!(
            "Loaded {} ({} rows, {} columns)",
            descriptor,
            table.num_rows(),
            table.num_columns()
        ));
        self.events.publish(SessionEvent::SourceLoaded {
            source_label: descriptor.to_string(),
            row_count: table.num_rows(),
            column_count: table.num_columns(),
        });
        self.store = Some(TableStore::new(table, self.settings.max_history_depth));
        self.source = Some(descriptor);
        self.project_path = None;
        self.table_changed();
    }

    /// Reload the baseline from the stored descriptor and replay the log
    ///
    /// On failure the current state is kept.
    pub fn refresh_from_source(&mut self) -> Result<()> {
        let descriptor = self
            .source
            .clone()
            .ok_or_else(|| DpsError::NotFound("no source to refresh from".into()))?;
        self.store()?;

        let handle = self.begin_load(&descriptor);
        let ticket = handle.ticket();
        let outcome = handle.wait(|p| tracing::debug!("{}% {}", p.percent, p.message));
        if !self.tasks.is_current(&ticket) {
            return Err(DpsError::Cancelled);
        }
        let baseline = outcome.map_err(|e| self.report("Refresh", e))?;

        let resolver = SessionTables {
            tables: &self.tables,
            aggregations: &self.aggregations,
        };
        let rebased = match self.store.as_mut() {
            Some(store) => store.rebase(baseline, &resolver),
            None => Err(DpsError::NotFound("no table is loaded".into())),
        };
        rebased.map_err(|e| self.report("Refresh", e))?;

        let rows = self.current()?.num_rows();
        self.activity.success(format!("Refreshed from {} ({} rows)", descriptor, rows));
        self.table_changed();
        Ok(())
    }

    // ---- Editing -------------------------------------------------------

    /// Commit one operation against the current table
    pub fn apply(&mut self, operation: Operation) -> Result<Applied> {
        let description = operation.describe();
        let resolver = SessionTables {
            tables: &self.tables,
            aggregations: &self.aggregations,
        };
        let applied = match self.store.as_mut() {
            Some(store) => store.apply(operation, &resolver),
            None => Err(DpsError::NotFound("no table is loaded".into())),
        };
        let applied = applied.map_err(|e| self.report(&description, e))?;

        if applied.invalid_cells > 0 {
            self.activity.warning(format!(
                "{}: {} value(s) could not be converted and became empty",
                description, applied.invalid_cells
            ));
        }
        self.activity.info(description);
        self.table_changed();
        Ok(applied)
    }

    pub fn undo(&mut self) -> bool {
        let moved = self.store.as_mut().is_some_and(TableStore::undo);
        if moved {
            self.activity.info("Undo");
            self.history_moved();
        }
        moved
    }

    pub fn redo(&mut self) -> bool {
        let moved = self.store.as_mut().is_some_and(TableStore::redo);
        if moved {
            self.activity.info("Redo");
            self.history_moved();
        }
        moved
    }

    pub fn jump_to(&mut self, index: usize) -> Result<()> {
        let store = self
            .store
            .as_mut()
            .ok_or_else(|| DpsError::NotFound("no table is loaded".into()))?;
        if store.history_index() == index {
            return Ok(());
        }
        store.jump_to(index)?;
        self.history_moved();
        Ok(())
    }

    /// Discard every edit and return to the baseline; callers confirm first
    pub fn reset(&mut self) -> Result<()> {
        let store = self
            .store
            .as_mut()
            .ok_or_else(|| DpsError::NotFound("no table is loaded".into()))?;
        store.reset();
        self.activity.warning("Reset to the original data");
        self.table_changed();
        Ok(())
    }

    /// Make a table available to `merge` under `name`
    pub fn register_table(&mut self, name: &str, table: Table) -> Result<()> {
        if name.trim().is_empty() || name.starts_with(AGGREGATION_REF_PREFIX) {
            return Err(DpsError::InvalidOperation(format!("'{}' cannot name a table", name)));
        }
        self.tables.insert(name.to_string(), table);
        Ok(())
    }

    pub fn registered_tables(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.keys().cloned().collect();
        names.sort();
        names
    }

    fn history_moved(&mut self) {
        if let Some(store) = &self.store {
            self.events.publish(SessionEvent::HistoryMoved {
                index: store.history_index(),
                can_undo: store.can_undo(),
                can_redo: store.can_redo(),
            });
        }
        self.table_changed();
    }

    fn table_changed(&mut self) {
        if self.settings.auto_invalidate_subset_caches {
            let removed = self.subsets.clear_cache();
            if removed > 0 {
                self.events.publish(SessionEvent::SubsetCachesCleared { removed });
            }
        }
        if let Some(store) = &self.store {
            self.events.publish(SessionEvent::TableChanged {
                row_count: store.current().num_rows(),
                column_count: store.current().num_columns(),
                history_index: store.history_index(),
            });
        }
    }

    /// Record a failure in the activity log and hand the error back
    fn report(&self, action: &str, error: DpsError) -> DpsError {
        if !error.is_silent() {
            self.activity.error(format!("{} failed: {}", action, error));
        }
        error
    }

    // ---- Subsets -------------------------------------------------------

    pub fn create_subset(&mut self, name: &str, description: &str, filters: Vec<FilterSpec>, combine: Combine) -> Result<()> {
        if let Some(table) = self.store.as_ref().map(TableStore::current) {
            validate_filters(table, &filters)?;
        }
        self.subsets.create(name, description, filters, combine)?;
        self.activity.info(format!("Created subset '{}'", name));
        Ok(())
    }

    pub fn update_subset(
        &mut self,
        name: &str,
        description: Option<&str>,
        filters: Vec<FilterSpec>,
        combine: Combine,
    ) -> Result<()> {
        if let Some(table) = self.store.as_ref().map(TableStore::current) {
            validate_filters(table, &filters)?;
        }
        self.subsets.update(name, description, filters, combine)?;
        self.activity.info(format!("Updated subset '{}'", name));
        Ok(())
    }

    pub fn delete_subset(&mut self, name: &str) -> Result<()> {
        self.subsets.delete(name)?;
        self.activity.info(format!("Deleted subset '{}'", name));
        Ok(())
    }

    /// Rows of the current table selected by subset `name`
    pub fn apply_subset(&mut self, name: &str, use_cache: bool) -> Result<SubsetView> {
        let table = self
            .store
            .as_ref()
            .map(TableStore::current)
            .ok_or_else(|| DpsError::NotFound("no table is loaded".into()))?;
        let view = self.subsets.apply(table, name, use_cache)?;
        if let Some(reason) = &view.cache_error {
            self.activity.warning(reason.clone());
        }
        Ok(view)
    }

    pub fn subsets_from_unique_values(&mut self, column: &str, prefix: Option<&str>) -> Result<Vec<String>> {
        let table = self
            .store
            .as_ref()
            .map(TableStore::current)
            .ok_or_else(|| DpsError::NotFound("no table is loaded".into()))?;
        let created = self.subsets.create_from_unique_values(table, column, prefix)?;
        self.activity.info(format!("Created {} subset(s) from '{}'", created.len(), column));
        Ok(created)
    }

    pub fn clear_subset_caches(&mut self) -> usize {
        let removed = self.subsets.clear_cache();
        self.events.publish(SessionEvent::SubsetCachesCleared { removed });
        removed
    }

    // ---- Aggregations --------------------------------------------------

    /// Grouped summary of the current table, capped at `limit` rows, without committing it
    pub fn preview_aggregation(
        &self,
        group_by: &[String],
        spec: &IndexMap<String, AggFunc>,
        date_grouping: Option<&IndexMap<String, DateFreq>>,
        limit: usize,
    ) -> Result<Table> {
        aggregate_preview(self.current()?, group_by, spec, date_grouping, limit)
    }

    /// Compute a grouped summary of the current table on the worker pool
    pub fn begin_aggregation(
        &self,
        group_by: Vec<String>,
        spec: IndexMap<String, AggFunc>,
        date_grouping: Option<IndexMap<String, DateFreq>>,
    ) -> Result<TaskHandle<Table>> {
        let table = self.current()?.clone();
        Ok(self.tasks.spawn_blocking(AGGREGATE_SLOT, move |reporter| {
            reporter.report(0, "Aggregating");
            let result = aggregate(&table, &group_by, &spec, date_grouping.as_ref())?;
            reporter.report(100, format!("{} groups", result.num_rows()));
            Ok(result)
        }))
    }

    /// Aggregate the current table and keep the result under `name`
    pub fn save_aggregation(
        &mut self,
        name: &str,
        description: &str,
        group_by: Vec<String>,
        spec: IndexMap<String, AggFunc>,
        date_grouping: Option<IndexMap<String, DateFreq>>,
    ) -> Result<&SavedAggregation> {
        if self.aggregations.contains(name) {
            return Err(DpsError::NameConflict(name.to_string()));
        }
        let result = aggregate(self.current()?, &group_by, &spec, date_grouping.as_ref())?;
        self.activity.success(format!("Saved aggregation '{}' ({} rows)", name, result.num_rows()));
        self.aggregations
            .save(name, description, group_by, spec, date_grouping, &result)
    }

    /// Recompute a saved aggregation against the current table
    pub fn reapply_aggregation(&mut self, name: &str) -> Result<&SavedAggregation> {
        let table = self
            .store
            .as_ref()
            .map(TableStore::current)
            .ok_or_else(|| DpsError::NotFound("no table is loaded".into()))?;
        self.aggregations.reapply(name, table)
    }

    pub fn delete_aggregation(&mut self, name: &str) -> Result<()> {
        self.aggregations.delete(name)?;
        self.activity.info(format!("Deleted aggregation '{}'", name));
        Ok(())
    }

    // ---- Inspection and export -----------------------------------------

    pub fn describe(&self) -> Result<Vec<ColumnSummary>> {
        describe(self.current()?)
    }

    pub fn export_data(&self, path: &Path, format: ExportFormat, options: &ExportOptions) -> Result<()> {
        export_table(self.current()?, path, format, options).map_err(|e| self.report("Export", e))?;
        self.activity.success(format!("Exported data to {}", path.display()));
        Ok(())
    }

    // ---- Projects ------------------------------------------------------

    /// Snapshot of everything a project file stores
    pub fn to_project(&self) -> Result<Project> {
        let store = self.store()?;
        Ok(Project {
            source: self.source.clone(),
            operations: store.log().clone(),
            baseline: store.baseline().clone(),
            current: store.current().clone(),
            subsets: self.subsets.export(),
            aggregations: self.aggregations.export(),
            plot: self.plot.clone(),
        })
    }

    /// Save the project; `overwrite` must be confirmed by the caller
    pub fn save_project(&mut self, path: &Path, overwrite: bool) -> Result<()> {
        let project = self.to_project()?;
        let saved = if overwrite {
            project.overwrite(path)
        } else {
            project.save(path)
        };
        saved.map_err(|e| self.report("Saving project", e))?;
        self.project_path = Some(path.to_path_buf());
        self.activity.success(format!("Saved project {}", path.display()));
        Ok(())
    }

    /// Load a project, replacing the session state
    ///
    /// Undo history is not part of a project and starts empty. On failure the
    /// session is left as it was.
    pub fn load_project(&mut self, path: &Path) -> Result<()> {
        let project = Project::load(path).map_err(|e| self.report("Loading project", e))?;

        let mut aggregations = AggregationManager::new();
        aggregations.import(project.aggregations)?;
        self.subsets.import(project.subsets)?;
        self.aggregations = aggregations;

        let mut store = TableStore::new(project.baseline.clone(), self.settings.max_history_depth);
        store.restore(
            project.baseline,
            StoreState {
                table: project.current,
                log: project.operations,
            },
        );
        self.store = Some(store);
        self.source = project.source;
        self.plot = project.plot;
        self.project_path = Some(path.to_path_buf());
        self.tasks.supersede(IMPORT_SLOT);

        self.activity.success(format!("Loaded project {}", path.display()));
        self.events.publish(SessionEvent::ProjectLoaded {
            path: path.display().to_string(),
        });
        self.table_changed();
        Ok(())
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("source", &self.source)
            .field("rows", &self.store.as_ref().map(|s| s.current().num_rows()))
            .field("subsets", &self.subsets.len())
            .field("aggregations", &self.aggregations.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::test_support::*;
    use dps_core::table::table_from;
    use dps_core::events::EventKind;
    use dps_core::{ColumnType, ErrorKind, FilterCondition, JoinHow, Literal, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    const JAN_5: i64 = 1_704_412_800_000;
    const JAN_20: i64 = 1_705_708_800_000;
    const FEB_3: i64 = 1_706_918_400_000;

    fn session_with(table: Table) -> (Session, TempDir) {
        let dir = TempDir::new().unwrap();
        let settings = SessionSettings {
            cache_root: Some(dir.path().to_path_buf()),
            worker_threads: 1,
            ..SessionSettings::default()
        };
        let mut session = Session::new(settings).unwrap();
        session.load_table(SourceDescriptor::csv("in.csv"), table);
        (session, dir)
    }

    fn sales() -> Table {
        table_from(vec![
            (
                "date",
                ColumnType::temporal(),
                vec![Value::Timestamp(JAN_5), Value::Timestamp(JAN_20), Value::Timestamp(FEB_3)],
            ),
            ("amount", ColumnType::Integer, ints(&[Some(10), Some(20), Some(30)])),
        ])
        .unwrap()
    }

    fn monthly() -> (Vec<String>, IndexMap<String, AggFunc>, Option<IndexMap<String, DateFreq>>) {
        (
            vec!["date".to_string()],
            [("amount".to_string(), AggFunc::Sum)].into_iter().collect(),
            Some([("date".to_string(), DateFreq::Month)].into_iter().collect()),
        )
    }

    fn filter(column: &str, condition: FilterCondition, value: Literal) -> Operation {
        Operation::Filter {
            column: column.into(),
            condition,
            value,
        }
    }

    #[test]
    fn test_filter_undo_redo_roundtrip() {
        let (mut session, _dir) = session_with(xy());
        session.apply(filter("y", FilterCondition::Eq, "a".into())).unwrap();

        let expected = table_from(vec![
            ("x", ColumnType::Integer, ints(&[Some(1), Some(3)])),
            ("y", ColumnType::Text, texts(&[Some("a"), Some("a")])),
        ])
        .unwrap();
        assert_eq!(session.current().unwrap(), &expected);
        assert_eq!(session.store().unwrap().log().len(), 1);

        assert!(session.undo());
        assert_eq!(session.current().unwrap(), &xy());
        assert_eq!(session.store().unwrap().log().len(), 0);
        assert_eq!(session.store().unwrap().redo_len(), 1);

        assert!(session.redo());
        assert_eq!(session.current().unwrap(), &expected);
    }

    #[test]
    fn test_undo_without_history_is_false() {
        let (mut session, _dir) = session_with(xy());
        assert!(!session.undo());
        assert!(!session.redo());
    }

    #[test]
    fn test_aggregate_with_month_grouping() {
        let (mut session, _dir) = session_with(sales());
        let (group_by, spec, date_grouping) = monthly();
        session
            .apply(Operation::Aggregate {
                group_by,
                spec,
                date_grouping,
            })
            .unwrap();

        let current = session.current().unwrap();
        assert_eq!(current.num_rows(), 2);
        assert_eq!(current.column("amount").unwrap().values, ints(&[Some(30), Some(30)]));
        let dates = current.column("date").unwrap().values;
        assert_eq!(dates[0], Value::Timestamp(1_704_067_200_000));
        assert_eq!(dates[1], Value::Timestamp(1_706_745_600_000));
    }

    #[test]
    fn test_subset_cache_invalidated_on_update() {
        let (mut session, _dir) = session_with(xy());
        let gt = |n| vec![FilterSpec::new("x", FilterCondition::Gt, Literal::Int(n))];
        session.create_subset("hi", "", gt(1), Combine::All).unwrap();

        let first = session.apply_subset("hi", true).unwrap();
        assert_eq!(first.table.num_rows(), 2);
        assert!(session.subsets().is_cached("hi"));

        session.update_subset("hi", None, gt(2), Combine::All).unwrap();
        assert!(!session.subsets().is_cached("hi"));
        let second = session.apply_subset("hi", true).unwrap();
        assert!(!second.from_cache);
        assert_eq!(second.table.num_rows(), 1);
    }

    #[test]
    fn test_edits_invalidate_subset_caches() {
        let (mut session, _dir) = session_with(xy());
        let cleared = Arc::new(AtomicUsize::new(0));
        let counter = cleared.clone();
        session
            .events()
            .subscribe(EventKind::SubsetCachesCleared, move |event| {
                if let SessionEvent::SubsetCachesCleared { removed } = event {
                    counter.fetch_add(*removed, Ordering::SeqCst);
                }
            });

        session
            .create_subset("a", "", vec![FilterSpec::new("y", FilterCondition::Eq, "a")], Combine::All)
            .unwrap();
        session.apply_subset("a", true).unwrap();
        assert!(session.subsets().is_cached("a"));

        session.apply(Operation::Sort { column: "x".into(), ascending: false }).unwrap();
        assert!(!session.subsets().is_cached("a"));
        assert_eq!(cleared.load(Ordering::SeqCst), 1);

        let view = session.apply_subset("a", true).unwrap();
        assert_eq!(view.table.column("x").unwrap().values, ints(&[Some(3), Some(1)]));
    }

    #[test]
    fn test_saved_aggregation_survives_mutation() {
        let (mut session, _dir) = session_with(sales());
        let (group_by, spec, date_grouping) = monthly();
        let saved = session
            .save_aggregation("A", "monthly totals", group_by, spec, date_grouping)
            .unwrap()
            .result
            .clone();
        assert_eq!(saved.num_rows(), 2);

        session.apply(Operation::DropColumn { columns: vec!["amount".into()] }).unwrap();
        assert!(!session.current().unwrap().has_column("amount"));
        assert_eq!(session.aggregations().get("A").unwrap().result, saved);

        let err = session.reapply_aggregation("A").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownColumn);
        assert_eq!(session.aggregations().get("A").unwrap().result, saved);
    }

    #[test]
    fn test_computed_column_propagates_nulls() {
        let table = table_from(vec![
            ("a", ColumnType::Integer, ints(&[Some(1), None, Some(3)])),
            ("b", ColumnType::Integer, ints(&[Some(10), Some(20), None])),
        ])
        .unwrap();
        let (mut session, _dir) = session_with(table);
        session
            .apply(Operation::ComputedColumn {
                new_name: "c".into(),
                expression: "a+b".into(),
            })
            .unwrap();
        assert_eq!(session.current().unwrap().column("c").unwrap().values, ints(&[Some(11), None, None]));
    }

    #[test]
    fn test_failed_edit_leaves_state_and_logs() {
        let (mut session, _dir) = session_with(xy());
        let changes = Arc::new(AtomicUsize::new(0));
        let counter = changes.clone();
        session.events().subscribe(EventKind::TableChanged, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let err = session
            .apply(Operation::RenameColumn { old: "nope".into(), new: "z".into() })
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownColumn);
        assert_eq!(session.current().unwrap(), &xy());
        assert!(!session.store().unwrap().can_undo());
        assert_eq!(changes.load(Ordering::SeqCst), 0);
        let last = session.activity().entries().pop().unwrap();
        assert_eq!(last.level, dps_core::LogLevel::Error);
    }

    #[test]
    fn test_merge_with_saved_aggregation() {
        let (mut session, _dir) = session_with(xy());
        let spec: IndexMap<String, AggFunc> = [("x".to_string(), AggFunc::Sum)].into_iter().collect();
        session
            .save_aggregation("totals", "", vec!["y".into()], spec, None)
            .unwrap();
        session
            .apply(Operation::Merge {
                right: "aggregation:totals".into(),
                how: JoinHow::Left,
                left_on: vec!["y".into()],
                right_on: vec!["y".into()],
                suffixes: ("".into(), "_total".into()),
            })
            .unwrap();
        let current = session.current().unwrap();
        assert_eq!(current.column("x_total").unwrap().values, ints(&[Some(4), Some(2), Some(4)]));

        assert!(session.register_table("aggregation:x", xy()).is_err());
        session.register_table("lookup", xy()).unwrap();
        assert_eq!(session.registered_tables(), vec!["lookup".to_string()]);
    }

    #[test]
    fn test_jump_and_reset() {
        let (mut session, _dir) = session_with(xy());
        session.apply(filter("x", FilterCondition::Gt, Literal::Int(1))).unwrap();
        session.apply(Operation::DropColumn { columns: vec!["y".into()] }).unwrap();

        session.jump_to(0).unwrap();
        assert_eq!(session.current().unwrap(), &xy());
        session.jump_to(2).unwrap();
        assert_eq!(session.current().unwrap().column_names(), vec!["x"]);
        assert_eq!(session.jump_to(5).unwrap_err().kind(), ErrorKind::NotFound);

        session.reset().unwrap();
        assert_eq!(session.current().unwrap(), &xy());
        assert!(!session.store().unwrap().can_redo());
    }

    #[test]
    fn test_load_and_refresh_from_csv() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("in.csv");
        std::fs::write(&path, "x,y\n1,a\n2,b\n3,a\n").unwrap();

        let settings = SessionSettings {
            cache_root: Some(dir.path().join("cache")),
            worker_threads: 1,
            ..SessionSettings::default()
        };
        let mut session = Session::new(settings).unwrap();
        session.load_source(SourceDescriptor::csv(&path)).unwrap();
        assert_eq!(session.current().unwrap().num_rows(), 3);

        session.apply(filter("x", FilterCondition::Gt, Literal::Int(1))).unwrap();
        assert_eq!(session.current().unwrap().num_rows(), 2);

        std::fs::write(&path, "x,y\n1,a\n2,b\n3,a\n4,c\n").unwrap();
        session.refresh_from_source().unwrap();
        assert_eq!(session.store().unwrap().baseline().num_rows(), 4);
        assert_eq!(session.current().unwrap().num_rows(), 3);
        assert_eq!(session.store().unwrap().log().len(), 1);

        std::fs::write(&path, "q\n1\n").unwrap();
        assert!(session.refresh_from_source().is_err());
        assert_eq!(session.current().unwrap().num_rows(), 3);
    }

    #[test]
    fn test_missing_source_fails_without_state() {
        let dir = TempDir::new().unwrap();
        let settings = SessionSettings {
            cache_root: Some(dir.path().to_path_buf()),
            worker_threads: 1,
            ..SessionSettings::default()
        };
        let mut session = Session::new(settings).unwrap();
        let err = session
            .load_source(SourceDescriptor::csv(dir.path().join("missing.csv")))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SourceUnavailable);
        assert!(!session.has_table());
    }

    #[test]
    fn test_project_roundtrip_through_session() {
        let (mut session, dir) = session_with(sales());
        let (group_by, spec, date_grouping) = monthly();
        session.save_aggregation("A", "", group_by, spec, date_grouping).unwrap();
        session
            .create_subset("big", "", vec![FilterSpec::new("amount", FilterCondition::Ge, Literal::Int(20))], Combine::All)
            .unwrap();
        session.apply(filter("amount", FilterCondition::Gt, Literal::Int(10))).unwrap();

        let path = dir.path().join("study.dps");
        session.save_project(&path, false).unwrap();
        assert_eq!(session.save_project(&path, false).unwrap_err().kind(), ErrorKind::NameConflict);

        let (mut other, _other_dir) = session_with(xy());
        other.load_project(&path).unwrap();
        assert_eq!(other.current().unwrap(), session.current().unwrap());
        assert_eq!(other.store().unwrap().log(), session.store().unwrap().log());
        assert_eq!(other.store().unwrap().baseline(), &sales());
        assert_eq!(other.subsets().names(), vec!["big".to_string()]);
        assert_eq!(
            other.aggregations().get("A").unwrap().result,
            session.aggregations().get("A").unwrap().result
        );
        assert!(!other.store().unwrap().can_undo());

        other.reset().unwrap();
        assert_eq!(other.current().unwrap(), &sales());
    }

    #[test]
    fn test_background_aggregation() {
        let (session, _dir) = session_with(sales());
        let (group_by, spec, date_grouping) = monthly();
        let preview = session
            .preview_aggregation(&group_by, &spec, date_grouping.as_ref(), 1)
            .unwrap();
        assert_eq!(preview.num_rows(), 1);

        let handle = session.begin_aggregation(group_by, spec, date_grouping).unwrap();
        let result = handle.wait(|_| {}).unwrap();
        assert_eq!(result.num_rows(), 2);
    }
}
