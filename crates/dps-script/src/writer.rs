//! Line buffer and the import/helper bookkeeping shared by every section

use std::collections::BTreeSet;

use crate::helpers::Helper;

/// Modules a script may import, in the order they are written
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Import {
    Io,
    Sqlite3,
    Numpy,
    Pandas,
    Requests,
    Sqlalchemy,
    Matplotlib,
    MatplotlibDates,
    AnchoredText,
    Seaborn,
    ScipyStats,
}

impl Import {
    pub fn statement(&self) -> &'static str {
        match self {
            Import::Io => "import io",
            Import::Sqlite3 => "import sqlite3",
            Import::Numpy => "import numpy as np",
            Import::Pandas => "import pandas as pd",
            Import::Requests => "import requests",
            Import::Sqlalchemy => "from sqlalchemy import create_engine, text",
            Import::Matplotlib => "import matplotlib\nmatplotlib.use(\"Agg\")\nimport matplotlib.pyplot as plt",
            Import::MatplotlibDates => "import matplotlib.dates as mdates",
            Import::AnchoredText => "from matplotlib.offsetbox import AnchoredText",
            Import::Seaborn => "import seaborn as sns",
            Import::ScipyStats => "from scipy import stats",
        }
    }

    /// Whether the module ships with Python itself
    pub fn is_stdlib(&self) -> bool {
        matches!(self, Import::Io | Import::Sqlite3)
    }
}

/// Script text under construction
#[derive(Debug, Default)]
pub struct Script {
    out: String,
    depth: usize,
    imports: BTreeSet<Import>,
    helpers: BTreeSet<Helper>,
}

impl Script {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one line at the current indentation
    pub fn line(&mut self, text: impl AsRef<str>) {
        let text = text.as_ref();
        for part in text.split('\n') {
            if !part.is_empty() {
                for _ in 0..self.depth {
                    self.out.push_str("    ");
                }
                self.out.push_str(part);
            }
            self.out.push('\n');
        }
    }

    pub fn blank(&mut self) {
        if !self.out.is_empty() && !self.out.ends_with("\n\n") {
            self.out.push('\n');
        }
    }

    pub fn comment(&mut self, text: impl AsRef<str>) {
        // Comments carry user text; keep them on one line
        let flat = text.as_ref().replace(&['\n', '\r'][..], " ");
        self.line(format!("# {}", flat));
    }

    pub fn indent(&mut self) {
        self.depth += 1;
    }

    pub fn dedent(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    pub fn import(&mut self, import: Import) {
        self.imports.insert(import);
    }

    /// Request a helper function, and whatever it imports
    pub fn helper(&mut self, helper: Helper) {
        for dependency in helper.requires() {
            self.helper(*dependency);
        }
        for import in helper.imports() {
            self.imports.insert(*import);
        }
        self.helpers.insert(helper);
    }

    pub fn imports(&self) -> impl Iterator<Item = &Import> {
        self.imports.iter()
    }

    pub fn helpers(&self) -> impl Iterator<Item = &Helper> {
        self.helpers.iter()
    }

    pub fn body(&self) -> &str {
        &self.out
    }

    pub fn into_body(self) -> String {
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indentation_and_blank_lines() {
        let mut script = Script::new();
        script.line("if True:");
        script.indent();
        script.line("a = 1\nb = 2");
        script.dedent();
        script.blank();
        script.blank();
        script.comment("multi\nline");
        assert_eq!(script.body(), "if True:\n    a = 1\n    b = 2\n\n# multi line\n");
    }

    #[test]
    fn test_helpers_pull_in_their_imports() {
        let mut script = Script::new();
        script.helper(Helper::Finite);
        assert!(script.imports().any(|i| *i == Import::Numpy));
        assert!(script.helpers().any(|h| *h == Helper::Finite));
    }

    #[test]
    fn test_imports_are_ordered() {
        let mut script = Script::new();
        script.import(Import::Seaborn);
        script.import(Import::Pandas);
        script.import(Import::Io);
        let order: Vec<Import> = script.imports().copied().collect();
        assert_eq!(order, vec![Import::Io, Import::Pandas, Import::Seaborn]);
    }
}
