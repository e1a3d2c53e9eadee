//! Undo/redo engine over full state snapshots

use std::collections::VecDeque;

/// Linear, navigable history of snapshots
///
/// The engine never holds the live state; callers pass it in on every
/// transition and get the restored state swapped in place. The cursor is the
/// number of undoable steps, so `index() == 0` means "at the oldest retained
/// state" (the baseline when the depth is unbounded).
#[derive(Debug, Clone)]
pub struct HistoryEngine<S> {
    undo: VecDeque<S>,
    redo: Vec<S>,
    max_depth: Option<usize>,
}

impl<S: Clone> HistoryEngine<S> {
    /// Create an engine; `None` keeps every step for the session
    pub fn new(max_depth: Option<usize>) -> Self {
        Self {
            undo: VecDeque::new(),
            redo: Vec::new(),
            max_depth,
        }
    }

    /// Record the state that is about to be replaced by an edit
    ///
    /// Clears the redo stack and drops the oldest entries beyond the bound.
    pub fn record(&mut self, previous: S) {
        self.redo.clear();
        self.undo.push_back(previous);
        if let Some(max) = self.max_depth {
            while self.undo.len() > max {
                self.undo.pop_front();
            }
        }
    }

    /// Step back; returns false when there is nothing to undo
    pub fn undo(&mut self, current: &mut S) -> bool {
        match self.undo.pop_back() {
            Some(previous) => {
                let now = std::mem::replace(current, previous);
                self.redo.push(now);
                true
            }
            None => false,
        }
    }

    /// Step forward; returns false when there is nothing to redo
    pub fn redo(&mut self, current: &mut S) -> bool {
        match self.redo.pop() {
            Some(next) => {
                let now = std::mem::replace(current, next);
                self.undo.push_back(now);
                true
            }
            None => false,
        }
    }

    /// Undo or redo repeatedly until the cursor equals `target`
    ///
    /// Returns false (and leaves the state alone) when `target` is outside
    /// `0..=index() + redo_len()`.
    pub fn jump_to(&mut self, target: usize, current: &mut S) -> bool {
        if target > self.len() {
            return false;
        }
        while self.index() > target {
            self.undo(current);
        }
        while self.index() < target {
            self.redo(current);
        }
        true
    }

    /// Current cursor position
    pub fn index(&self) -> usize {
        self.undo.len()
    }

    /// Total number of reachable positions beyond zero
    pub fn len(&self) -> usize {
        self.undo.len() + self.redo.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    pub fn redo_len(&self) -> usize {
        self.redo.len()
    }

    pub fn max_depth(&self) -> Option<usize> {
        self.max_depth
    }

    /// Forget every step
    pub fn clear(&mut self) {
        self.undo.clear();
        self.redo.clear();
    }
}
