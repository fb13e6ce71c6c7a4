//! Mapping of raw delimited records onto typed features

use std::fs::File;
use std::path::Path;

use csv::{ReaderBuilder, StringRecord, Trim};
use dt_core::{AttributeMap, AttributeSelection, AttributeValue, Field, Point};
use serde::Serialize;
use thiserror::Error;

use crate::config::NullConfig;
use crate::DataError;

/// Why a line could not become a feature
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
pub enum InvalidReason {
    #[error("expected {expected} fields, found {found}")]
    FieldCount { expected: usize, found: usize },

    #[error("X coordinate '{0}' is not a number")]
    BadX(String),

    #[error("Y coordinate '{0}' is not a number")]
    BadY(String),

    #[error("line is not valid UTF-8")]
    Encoding,
}

/// A source line that was skipped
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvalidLine {
    /// 1-based line number in the file
    pub line_number: u64,
    /// Line text rebuilt from its fields
    pub text: String,
    pub reason: InvalidReason,
}

/// How records of one file are laid out
#[derive(Debug, Clone)]
pub struct RecordLayout {
    pub fields: Vec<Field>,
    pub x_index: usize,
    pub y_index: usize,
    pub delimiter: u8,
    pub has_header: bool,
    pub null_config: NullConfig,
}

impl RecordLayout {
    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// Reader settings shared by every scan of the file.
    ///
    /// Records are read flexibly so that width mismatches surface as
    /// invalid lines instead of reader errors.
    pub fn reader_builder(delimiter: u8) -> ReaderBuilder {
        let mut builder = ReaderBuilder::new();
        builder
            .delimiter(delimiter)
            .has_headers(false)
            .flexible(true)
            .trim(Trim::All);
        builder
    }

    pub fn open_reader(&self, path: &Path) -> Result<csv::Reader<File>, DataError> {
        Ok(Self::reader_builder(self.delimiter).from_path(path)?)
    }

    /// Validate the record and extract its point
    pub fn point(&self, record: &StringRecord) -> Result<Point, InvalidReason> {
        if record.len() != self.field_count() {
            return Err(InvalidReason::FieldCount {
                expected: self.field_count(),
                found: record.len(),
            });
        }

        let x = parse_coordinate(&record[self.x_index]).ok_or_else(|| InvalidReason::BadX(record[self.x_index].to_string()))?;
        let y = parse_coordinate(&record[self.y_index]).ok_or_else(|| InvalidReason::BadY(record[self.y_index].to_string()))?;

        Ok(Point::new(x, y))
    }

    /// Typed value of one field
    pub fn value(&self, record: &StringRecord, position: usize) -> AttributeValue {
        match (record.get(position), self.fields.get(position)) {
            (Some(raw), Some(field)) if !self.null_config.is_null(raw) => AttributeValue::parse_as(field.field_type, raw),
            _ => AttributeValue::Null,
        }
    }

    /// Typed values for the selected positions
    pub fn attributes(&self, record: &StringRecord, selection: &AttributeSelection) -> AttributeMap {
        match selection {
            AttributeSelection::Empty => AttributeMap::new(),
            AttributeSelection::All => (0..self.field_count()).map(|pos| (pos, self.value(record, pos))).collect(),
            AttributeSelection::Only(positions) => positions
                .iter()
                .filter(|pos| **pos < self.field_count())
                .map(|&pos| (pos, self.value(record, pos)))
                .collect(),
        }
    }

    /// Rebuild the line text for diagnostics
    pub fn line_text(&self, record: &StringRecord) -> String {
        let delimiter = (self.delimiter as char).to_string();
        record.iter().collect::<Vec<_>>().join(&delimiter)
    }
}

fn parse_coordinate(raw: &str) -> Option<f64> {
    raw.parse::<f64>().ok().filter(|v| v.is_finite())
}
