use std::collections::HashMap;

use ahash::AHashSet;
use dt_core::{Field, FieldType};

use crate::config::NullConfig;

/// Records sampled for type detection unless configured otherwise
pub const DEFAULT_SAMPLE_SIZE: usize = 1000;

/// Schema detector for analyzing records and determining column types
///
/// Rows are fed one at a time with [`observe_row`](Self::observe_row) so the
/// detector can run inside the provider's single analysis pass.
#[derive(Debug, Clone)]
pub struct SchemaDetector {
    sample_size: usize,
    sampled_rows: usize,
    columns: Vec<ColumnStats>,
}

/// Information about a detected schema
#[derive(Debug, Clone)]
pub struct SchemaInfo {
    pub fields: Vec<Field>,
    pub column_stats: Vec<ColumnStats>,
    pub sampled_rows: usize,
}

/// Statistics about a sampled column
#[derive(Debug, Clone)]
pub struct ColumnStats {
    pub null_count: usize,
    pub value_count: usize,
    is_int: bool,
    is_float: bool,
}

impl Default for ColumnStats {
    fn default() -> Self {
        Self {
            null_count: 0,
            value_count: 0,
            is_int: true,
            is_float: true,
        }
    }
}

impl ColumnStats {
    fn observe(&mut self, value: &str, null_config: &NullConfig) {
        if null_config.is_null(value) {
            self.null_count += 1;
            return;
        }

        self.value_count += 1;
        if self.is_int && value.parse::<i64>().is_err() {
            self.is_int = false;
        }
        if self.is_float && !value.parse::<f64>().map_or(false, f64::is_finite) {
            self.is_float = false;
        }
    }

    /// Type implied by the values seen so far
    pub fn inferred_type(&self) -> FieldType {
        if self.value_count == 0 {
            FieldType::Text
        } else if self.is_int {
            FieldType::Integer
        } else if self.is_float {
            FieldType::Real
        } else {
            FieldType::Text
        }
    }
}

impl SchemaDetector {
    /// Create a new schema detector
    pub fn new() -> Self {
        Self {
            sample_size: DEFAULT_SAMPLE_SIZE,
            sampled_rows: 0,
            columns: Vec::new(),
        }
    }

    /// Set the sample size for detection, 0 samples every row
    pub fn with_sample_size(mut self, size: usize) -> Self {
        self.sample_size = size;
        self
    }

    /// Whether further rows would still be sampled
    pub fn wants_more(&self) -> bool {
        self.sample_size == 0 || self.sampled_rows < self.sample_size
    }

    /// Feed one record; returns false once the sample is full
    pub fn observe_row<'a, I>(&mut self, values: I, null_config: &NullConfig) -> bool
    where
        I: IntoIterator<Item = &'a str>,
    {
        if !self.wants_more() {
            return false;
        }

        for (idx, value) in values.into_iter().enumerate() {
            if idx >= self.columns.len() {
                self.columns.resize_with(idx + 1, ColumnStats::default);
            }
            self.columns[idx].observe(value, null_config);
        }
        self.sampled_rows += 1;
        true
    }

    /// Build fields for the given headers from the sampled rows
    pub fn finish(mut self, headers: &[String], overrides: &HashMap<String, FieldType>) -> SchemaInfo {
        self.columns.resize_with(headers.len().max(self.columns.len()), ColumnStats::default);

        let fields = headers
            .iter()
            .zip(&self.columns)
            .map(|(name, stats)| {
                let field_type = overrides.get(name).copied().unwrap_or_else(|| stats.inferred_type());
                Field::new(name.clone(), field_type, stats.null_count > 0)
            })
            .collect();

        self.columns.truncate(headers.len());

        SchemaInfo {
            fields,
            column_stats: self.columns,
            sampled_rows: self.sampled_rows,
        }
    }
}

impl Default for SchemaDetector {
    fn default() -> Self {
        Self::new()
    }
}

/// Make header names unique by suffixing repeats with `_2`, `_3`, ...
pub fn unique_names(headers: &[String]) -> Vec<String> {
    let mut seen = AHashSet::new();
    headers
        .iter()
        .enumerate()
        .map(|(idx, raw)| {
            let base = if raw.is_empty() { format!("field_{}", idx + 1) } else { raw.clone() };
            let mut name = base.clone();
            let mut n = 2;
            while !seen.insert(name.clone()) {
                name = format!("{}_{}", base, n);
                n += 1;
            }
            name
        })
        .collect()
}

/// Default names for files without a header line
pub fn generated_names(count: usize) -> Vec<String> {
    (1..=count).map(|i| format!("field_{}", i)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn detect(mut detector: SchemaDetector, names: &[&str], rows: &[&[&str]]) -> SchemaInfo {
        for row in rows {
            if !detector.observe_row(row.iter().copied(), &NullConfig::default()) {
                break;
            }
        }
        detector.finish(&headers(names), &HashMap::new())
    }

    #[test]
    fn test_detects_integer_real_text() {
        let info = detect(
            SchemaDetector::new(),
            &["i", "r", "t", "empty"],
            &[&["1", "1.5", "a", ""], &["2", "2", "b", ""], &["-3", "1e3", "4", ""]],
        );

        let types: Vec<FieldType> = info.fields.iter().map(|f| f.field_type).collect();
        assert_eq!(types, vec![FieldType::Integer, FieldType::Real, FieldType::Text, FieldType::Text]);
        assert!(!info.fields[0].nullable);
        assert!(info.fields[3].nullable);
        assert_eq!(info.column_stats[3].value_count, 0);
    }

    #[test]
    fn test_nulls_do_not_break_numeric_columns() {
        let info = detect(SchemaDetector::new(), &["n"], &[&["1"], &["NULL"], &[""], &["7"]]);
        assert_eq!(info.fields[0].field_type, FieldType::Integer);
        assert_eq!(info.column_stats[0].null_count, 2);
    }

    #[test]
    fn test_sample_size_limits_rows() {
        // only the first row is sampled, so the column stays Integer
        let info = detect(SchemaDetector::new().with_sample_size(1), &["n"], &[&["1"], &["x"]]);
        assert_eq!(info.sampled_rows, 1);
        assert_eq!(info.fields[0].field_type, FieldType::Integer);
    }

    #[test]
    fn test_non_finite_numbers_are_text() {
        let info = detect(
            SchemaDetector::new(),
            &["word", "mixed", "r"],
            &[&["NaN", "1.5", "2"], &["inf", "infinity", "2.5"], &["-inf", "3", "1e3"]],
        );
        let types: Vec<FieldType> = info.fields.iter().map(|f| f.field_type).collect();
        assert_eq!(types, vec![FieldType::Text, FieldType::Text, FieldType::Real]);
    }

    #[test]
    fn test_overrides_win() {
        let mut detector = SchemaDetector::new();
        detector.observe_row(["12"], &NullConfig::default());
        let mut overrides = HashMap::new();
        overrides.insert("code".to_string(), FieldType::Text);
        let info = detector.finish(&headers(&["code"]), &overrides);
        assert_eq!(info.fields[0].field_type, FieldType::Text);
    }

    #[test]
    fn test_column_without_rows_is_text() {
        let info = SchemaDetector::new().finish(&headers(&["a", "b"]), &HashMap::new());
        assert_eq!(info.fields.len(), 2);
        assert!(info.fields.iter().all(|f| f.field_type == FieldType::Text));
    }

    #[test]
    fn test_unique_names() {
        let names = unique_names(&headers(&["a", "a", "", "a"]));
        assert_eq!(names, headers(&["a", "a_2", "field_3", "a_3"]));
        assert_eq!(generated_names(2), headers(&["field_1", "field_2"]));
    }
}
