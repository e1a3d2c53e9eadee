//! The table store: baseline, current table, operation log and history

use dps_core::{
    AggFunc, BinMethod, ColumnType, Combine, DateComponent, DateFreq, DiffUnit, DpsError, FillMethod,
    FilterCondition, FilterSpec, HistoryEngine, JoinHow, Literal, NormalizeMethod, Operation, OperationLog,
    Result, Table, TextTransform,
};
use indexmap::IndexMap;

use crate::transform::{self, Applied, NoTables, TableResolver};

/// The current table together with the log that produced it
#[derive(Debug, Clone, PartialEq)]
pub struct StoreState {
    pub table: Table,
    pub log: OperationLog,
}

/// Owns the baseline and the current table; every edit goes through here
///
/// Edits are all-or-nothing: the operation runs against the current table
/// first and history is only recorded once it succeeded.
#[derive(Debug, Clone)]
pub struct TableStore {
    baseline: Table,
    state: StoreState,
    history: HistoryEngine<StoreState>,
}

impl TableStore {
    pub fn new(baseline: Table, max_history_depth: Option<usize>) -> Self {
        Self {
            state: StoreState {
                table: baseline.clone(),
                log: OperationLog::new(),
            },
            baseline,
            history: HistoryEngine::new(max_history_depth),
        }
    }

    pub fn baseline(&self) -> &Table {
        &self.baseline
    }

    pub fn current(&self) -> &Table {
        &self.state.table
    }

    pub fn log(&self) -> &OperationLog {
        &self.state.log
    }

    pub fn state(&self) -> &StoreState {
        &self.state
    }

    pub fn history_index(&self) -> usize {
        self.history.index()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn redo_len(&self) -> usize {
        self.history.redo_len()
    }

    /// Apply and commit one operation
    pub fn apply(&mut self, operation: Operation, tables: &dyn TableResolver) -> Result<Applied> {
        let applied = transform::apply(&self.state.table, &operation, tables)?;
        let next = StoreState {
            table: applied.table.clone(),
            log: {
                let mut log = self.state.log.clone();
                log.push(operation);
                log
            },
        };
        let previous = std::mem::replace(&mut self.state, next);
        self.history.record(previous);
        if let Some(op) = self.state.log.last() {
            tracing::info!("Applied {} ({} rows)", op.describe(), applied.table.num_rows());
        }
        Ok(applied)
    }

    /// Step back one edit; false when there is nothing to undo
    pub fn undo(&mut self) -> bool {
        self.history.undo(&mut self.state)
    }

    pub fn redo(&mut self) -> bool {
        self.history.redo(&mut self.state)
    }

    /// Move the history cursor to `index`
    pub fn jump_to(&mut self, index: usize) -> Result<()> {
        if self.history.jump_to(index, &mut self.state) {
            Ok(())
        } else {
            Err(DpsError::NotFound(format!(
                "history position {} (0..={})",
                index,
                self.history.len()
            )))
        }
    }

    /// Back to the baseline with an empty log and no history
    pub fn reset(&mut self) {
        self.state = StoreState {
            table: self.baseline.clone(),
            log: OperationLog::new(),
        };
        self.history.clear();
    }

    /// Replace everything, e.g. after loading a project; history is cleared
    pub fn restore(&mut self, baseline: Table, state: StoreState) {
        self.baseline = baseline;
        self.state = state;
        self.history.clear();
    }

    /// Swap in a new baseline and replay the log against it
    ///
    /// On failure nothing changes.
    pub fn rebase(&mut self, baseline: Table, tables: &dyn TableResolver) -> Result<()> {
        let table = transform::replay(&baseline, &self.state.log, tables)?;
        let log = self.state.log.clone();
        self.restore(baseline, StoreState { table, log });
        Ok(())
    }

    pub fn filter(&mut self, column: &str, condition: FilterCondition, value: impl Into<Literal>) -> Result<Applied> {
        self.apply(
            Operation::Filter {
                column: column.to_string(),
                condition,
                value: value.into(),
            },
            &NoTables,
        )
    }

    pub fn filter_advanced(&mut self, conditions: Vec<FilterSpec>, combine: Combine) -> Result<Applied> {
        self.apply(Operation::FilterAdvanced { conditions, combine }, &NoTables)
    }

    pub fn drop_duplicates(&mut self) -> Result<Applied> {
        self.apply(Operation::DropDuplicates, &NoTables)
    }

    pub fn drop_missing(&mut self, columns: Option<Vec<String>>) -> Result<Applied> {
        self.apply(Operation::DropMissing { columns }, &NoTables)
    }

    pub fn fill_missing(&mut self, column: Option<&str>, method: FillMethod, value: Option<Literal>) -> Result<Applied> {
        self.apply(
            Operation::FillMissing {
                column: column.map(str::to_string),
                method,
                value,
            },
            &NoTables,
        )
    }

    pub fn drop_columns(&mut self, columns: Vec<String>) -> Result<Applied> {
        self.apply(Operation::DropColumn { columns }, &NoTables)
    }

    pub fn rename_column(&mut self, old: &str, new: &str) -> Result<Applied> {
        self.apply(
            Operation::RenameColumn {
                old: old.to_string(),
                new: new.to_string(),
            },
            &NoTables,
        )
    }

    pub fn duplicate_column(&mut self, column: &str, new_name: &str) -> Result<Applied> {
        self.apply(
            Operation::DuplicateColumn {
                column: column.to_string(),
                new_name: new_name.to_string(),
            },
            &NoTables,
        )
    }

    /// Retype a column; `invalid_cells` counts values that became null
    pub fn change_type(&mut self, column: &str, target: ColumnType) -> Result<Applied> {
        self.apply(
            Operation::ChangeType {
                column: column.to_string(),
                target,
            },
            &NoTables,
        )
    }

    pub fn text_op(&mut self, column: &str, transform: TextTransform) -> Result<Applied> {
        self.apply(
            Operation::TextOp {
                column: column.to_string(),
                transform,
            },
            &NoTables,
        )
    }

    pub fn split_column(&mut self, column: &str, delimiter: &str, new_columns: Vec<String>) -> Result<Applied> {
        self.apply(
            Operation::SplitColumn {
                column: column.to_string(),
                delimiter: delimiter.to_string(),
                new_columns,
            },
            &NoTables,
        )
    }

    pub fn regex_replace(&mut self, column: &str, pattern: &str, replacement: &str) -> Result<Applied> {
        self.apply(
            Operation::RegexReplace {
                column: column.to_string(),
                pattern: pattern.to_string(),
                replacement: replacement.to_string(),
            },
            &NoTables,
        )
    }

    pub fn extract_date_component(&mut self, column: &str, component: DateComponent) -> Result<Applied> {
        self.apply(
            Operation::ExtractDateComponent {
                column: column.to_string(),
                component,
            },
            &NoTables,
        )
    }

    pub fn date_difference(&mut self, start: &str, end: &str, unit: DiffUnit, new_name: Option<&str>) -> Result<Applied> {
        self.apply(
            Operation::DateDifference {
                start: start.to_string(),
                end: end.to_string(),
                unit,
                new_name: new_name.map(str::to_string),
            },
            &NoTables,
        )
    }

    pub fn bin_column(
        &mut self,
        column: &str,
        new_name: &str,
        method: BinMethod,
        bins: usize,
        labels: Option<Vec<String>>,
    ) -> Result<Applied> {
        self.apply(
            Operation::BinColumn {
                column: column.to_string(),
                new_name: new_name.to_string(),
                method,
                bins,
                labels,
            },
            &NoTables,
        )
    }

    pub fn normalize(&mut self, columns: Vec<String>, method: NormalizeMethod) -> Result<Applied> {
        self.apply(Operation::Normalize { columns, method }, &NoTables)
    }

    pub fn computed_column(&mut self, new_name: &str, expression: &str) -> Result<Applied> {
        self.apply(
            Operation::ComputedColumn {
                new_name: new_name.to_string(),
                expression: expression.to_string(),
            },
            &NoTables,
        )
    }

    pub fn aggregate(
        &mut self,
        group_by: Vec<String>,
        spec: IndexMap<String, AggFunc>,
        date_grouping: Option<IndexMap<String, DateFreq>>,
    ) -> Result<Applied> {
        self.apply(
            Operation::Aggregate {
                group_by,
                spec,
                date_grouping,
            },
            &NoTables,
        )
    }

    pub fn melt(&mut self, id_vars: Vec<String>, value_vars: Vec<String>, var_name: &str, value_name: &str) -> Result<Applied> {
        self.apply(
            Operation::Melt {
                id_vars,
                value_vars,
                var_name: var_name.to_string(),
                value_name: value_name.to_string(),
            },
            &NoTables,
        )
    }

    pub fn pivot(&mut self, index: &str, columns: &str, values: &str, agg_func: AggFunc) -> Result<Applied> {
        self.apply(
            Operation::Pivot {
                index: index.to_string(),
                columns: columns.to_string(),
                values: values.to_string(),
                agg_func,
            },
            &NoTables,
        )
    }

    pub fn merge(
        &mut self,
        right: &str,
        how: JoinHow,
        left_on: Vec<String>,
        right_on: Vec<String>,
        suffixes: (String, String),
        tables: &dyn TableResolver,
    ) -> Result<Applied> {
        self.apply(
            Operation::Merge {
                right: right.to_string(),
                how,
                left_on,
                right_on,
                suffixes,
            },
            tables,
        )
    }

    pub fn sort(&mut self, column: &str, ascending: bool) -> Result<Applied> {
        self.apply(
            Operation::Sort {
                column: column.to_string(),
                ascending,
            },
            &NoTables,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::test_support::*;
    use dps_core::ErrorKind;

    #[test]
    fn test_failed_edit_leaves_state_alone() {
        let mut store = TableStore::new(xy(), None);
        store.filter("x", FilterCondition::Gt, 1i64).unwrap();
        let before = store.state().clone();

        let err = store.rename_column("nope", "z").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownColumn);
        assert_eq!(store.state(), &before);
        assert_eq!(store.history_index(), 1);
    }

    #[test]
    fn test_undo_all_returns_to_baseline() {
        let mut store = TableStore::new(xy(), None);
        store.sort("x", false).unwrap();
        store.duplicate_column("y", "y2").unwrap();
        store.filter("y", FilterCondition::Eq, "a").unwrap();

        while store.undo() {}
        assert_eq!(store.current(), &xy());
        assert!(store.log().is_empty());
        assert_eq!(store.redo_len(), 3);
        assert!(!store.undo());
    }

    #[test]
    fn test_undo_redo_restores_exact_state() {
        let mut store = TableStore::new(xy(), None);
        store.rename_column("x", "id").unwrap();
        let after = store.state().clone();
        assert!(store.undo());
        assert!(store.redo());
        assert_eq!(store.state(), &after);
    }

    #[test]
    fn test_log_replays_to_current() {
        let mut store = TableStore::new(xy(), None);
        store.computed_column("x2", "x * 2").unwrap();
        store.filter("x2", FilterCondition::Ge, 4i64).unwrap();
        store.text_op("y", TextTransform::Upper).unwrap();
        let replayed = transform::replay(store.baseline(), store.log(), &NoTables).unwrap();
        assert_eq!(&replayed, store.current());
    }

    #[test]
    fn test_jump_and_reset() {
        let mut store = TableStore::new(xy(), None);
        store.sort("y", true).unwrap();
        store.drop_columns(vec!["x".into()]).unwrap();
        store.jump_to(1).unwrap();
        assert_eq!(store.log().len(), 1);
        assert_eq!(store.jump_to(5).unwrap_err().kind(), ErrorKind::NotFound);

        store.reset();
        assert_eq!(store.current(), &xy());
        assert_eq!(store.history_len(), 0);
    }

    #[test]
    fn test_change_type_reports_invalid_cells() {
        let mut store = TableStore::new(xy(), None);
        let applied = store.change_type("y", ColumnType::Integer).unwrap();
        assert_eq!(applied.invalid_cells, 3);
        assert_eq!(store.log().len(), 1);
    }

    #[test]
    fn test_rebase_replays_log() {
        let mut store = TableStore::new(xy(), None);
        store.filter("y", FilterCondition::Eq, "b").unwrap();
        let bigger = dps_core::table::table_from(vec![
            ("x", ColumnType::Integer, ints(&[Some(7), Some(8)])),
            ("y", ColumnType::Text, texts(&[Some("b"), Some("b")])),
        ])
        .unwrap();
        store.rebase(bigger, &NoTables).unwrap();
        assert_eq!(store.current().num_rows(), 2);
        assert_eq!(store.history_index(), 0);

        let broken = dps_core::table::table_from(vec![("x", ColumnType::Integer, ints(&[Some(1)]))]).unwrap();
        assert!(store.rebase(broken, &NoTables).is_err());
        assert_eq!(store.current().num_rows(), 2);
    }
}
