//! Null value handling for data loading

use serde::{Deserialize, Serialize};

/// Null value configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NullConfig {
    /// Patterns to treat as null
    pub patterns: Vec<String>,

    /// Whether to trim whitespace before checking
    pub trim_whitespace: bool,

    /// Case sensitive matching
    pub case_sensitive: bool,
}

impl Default for NullConfig {
    fn default() -> Self {
        Self {
            patterns: vec![
                String::new(), // Empty string
                "NULL".to_string(),
                "N/A".to_string(),
            ],
            trim_whitespace: true,
            case_sensitive: false,
        }
    }
}

impl NullConfig {
    /// Check if a value should be treated as null
    pub fn is_null(&self, value: &str) -> bool {
        let test_value = if self.trim_whitespace { value.trim() } else { value };

        self.patterns.iter().any(|pattern| {
            if self.case_sensitive {
                test_value == pattern
            } else {
                test_value.eq_ignore_ascii_case(pattern)
            }
        })
    }

    /// Add a null pattern
    pub fn add_pattern(&mut self, pattern: String) {
        if !self.patterns.contains(&pattern) {
            self.patterns.push(pattern);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_patterns() {
        let config = NullConfig::default();
        assert!(config.is_null(""));
        assert!(config.is_null("  "));
        assert!(config.is_null("null"));
        assert!(config.is_null("n/a"));
        assert!(!config.is_null("0"));
        assert!(!config.is_null("none"));
    }

    #[test]
    fn test_case_sensitive_matching() {
        let config = NullConfig {
            case_sensitive: true,
            ..NullConfig::default()
        };
        assert!(config.is_null("NULL"));
        assert!(!config.is_null("null"));
    }

    #[test]
    fn test_pattern_management() {
        let mut config = NullConfig::default();
        config.add_pattern("-".to_string());
        config.add_pattern("-".to_string());
        assert_eq!(config.patterns.iter().filter(|p| *p == "-").count(), 1);
        assert!(config.is_null(" - "));
    }
}
