//! Append-only record of committed operations

use serde::{Deserialize, Serialize};

use super::Operation;
use crate::error::Result;

/// Ordered sequence of operations applied to the baseline
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationLog {
    entries: Vec<Operation>,
}

impl OperationLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a committed operation
    pub fn push(&mut self, operation: Operation) {
        self.entries.push(operation);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Operation> {
        self.entries.iter()
    }

    pub fn entries(&self) -> &[Operation] {
        &self.entries
    }

    pub fn last(&self) -> Option<&Operation> {
        self.entries.last()
    }

    /// Pretty JSON array of operations
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

impl From<Vec<Operation>> for OperationLog {
    fn from(entries: Vec<Operation>) -> Self {
        Self { entries }
    }
}

impl<'a> IntoIterator for &'a OperationLog {
    type Item = &'a Operation;
    type IntoIter = std::slice::Iter<'a, Operation>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_json_round_trip() {
        let mut log = OperationLog::new();
        log.push(Operation::DropDuplicates);
        log.push(Operation::RenameColumn { old: "x".into(), new: "z".into() });

        let text = log.to_json().unwrap();
        assert!(text.trim_start().starts_with('['));
        assert_eq!(OperationLog::from_json(&text).unwrap(), log);
        assert_eq!(log.len(), 2);
    }
}
