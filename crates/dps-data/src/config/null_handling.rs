//! Recognition of null spellings in text sources

use serde::{Deserialize, Serialize};

/// Which cell spellings count as missing when reading text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NullConfig {
    /// Spellings treated as null
    pub patterns: Vec<String>,

    /// Trim surrounding whitespace before matching
    pub trim_whitespace: bool,

    pub case_sensitive: bool,
}

impl Default for NullConfig {
    fn default() -> Self {
        Self {
            patterns: ["", "NA", "N/A", "NaN", "null", "None", "-"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            trim_whitespace: true,
            case_sensitive: false,
        }
    }
}

impl NullConfig {
    /// Only the empty cell is null
    pub fn empty_only() -> Self {
        Self {
            patterns: vec![String::new()],
            trim_whitespace: true,
            case_sensitive: true,
        }
    }

    pub fn is_null(&self, value: &str) -> bool {
        let value = if self.trim_whitespace { value.trim() } else { value };
        self.patterns.iter().any(|pattern| {
            if self.case_sensitive {
                value == pattern
            } else {
                value.eq_ignore_ascii_case(pattern)
            }
        })
    }

    pub fn add_pattern(&mut self, pattern: impl Into<String>) {
        let pattern = pattern.into();
        if !self.patterns.contains(&pattern) {
            self.patterns.push(pattern);
        }
    }

    pub fn remove_pattern(&mut self, pattern: &str) {
        self.patterns.retain(|p| p != pattern);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_patterns() {
        let config = NullConfig::default();
        assert!(config.is_null(""));
        assert!(config.is_null("  n/a "));
        assert!(config.is_null("NULL"));
        assert!(!config.is_null("0"));
    }

    #[test]
    fn test_case_sensitive() {
        let mut config = NullConfig::empty_only();
        config.add_pattern("MISSING");
        assert!(config.is_null("MISSING"));
        assert!(!config.is_null("missing"));
        config.remove_pattern("MISSING");
        assert!(!config.is_null("MISSING"));
    }
}
