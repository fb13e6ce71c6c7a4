//! Lazy, restartable iteration over the features of a delimited file

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use csv::StringRecord;
use dt_core::{AttributeSelection, Feature, FeatureId, Point, Rect};
use tracing::{debug, warn};

use super::analysis::encoding_error_line;
use super::record::RecordLayout;
use crate::DataError;

/// Forward cursor producing one feature per valid line
///
/// Identifiers count valid lines from 0, so they are the same for every
/// scan of an unchanged file, whatever filter is applied.
pub struct FeatureCursor {
    path: PathBuf,
    layout: Arc<RecordLayout>,
    reader: csv::Reader<File>,
    record: StringRecord,
    next_id: FeatureId,
}

impl FeatureCursor {
    /// Open the file positioned at the first data line
    pub fn open(path: &Path, layout: Arc<RecordLayout>) -> Result<Self, DataError> {
        let reader = Self::open_reader(path, &layout)?;
        Ok(Self {
            path: path.to_path_buf(),
            layout,
            reader,
            record: StringRecord::new(),
            next_id: 0,
        })
    }

    fn open_reader(path: &Path, layout: &RecordLayout) -> Result<csv::Reader<File>, DataError> {
        let mut reader = layout.open_reader(path)?;
        if layout.has_header {
            let mut header = StringRecord::new();
            reader.read_record(&mut header)?;
        }
        Ok(reader)
    }

    /// Reposition to the first data line
    pub fn reset(&mut self) -> Result<(), DataError> {
        self.reader = Self::open_reader(&self.path, &self.layout)?;
        self.next_id = 0;
        Ok(())
    }

    pub fn layout(&self) -> &RecordLayout {
        &self.layout
    }

    /// Advance to the next valid line, returning its identifier and point
    fn advance(&mut self) -> Option<(FeatureId, Point)> {
        loop {
            match self.reader.read_record(&mut self.record) {
                Ok(true) => {
                    if let Ok(point) = self.layout.point(&self.record) {
                        let id = self.next_id;
                        self.next_id += 1;
                        return Some((id, point));
                    }
                }
                Ok(false) => return None,
                Err(err) => {
                    if encoding_error_line(&err).is_none() {
                        warn!("Stopping scan of {:?}: {}", self.path, err);
                        return None;
                    }
                }
            }
        }
    }

    /// Next feature inside `filter` (all features when `None`)
    pub fn next_feature(&mut self, filter: Option<&Rect>, attributes: &AttributeSelection) -> Option<Feature> {
        loop {
            let (id, point) = self.advance()?;
            if filter.map_or(true, |rect| rect.contains(&point)) {
                let attrs = self.layout.attributes(&self.record, attributes);
                return Some(Feature::new(id, point).with_attributes(attrs));
            }
        }
    }

    /// Scan forward to the feature with `id`
    pub fn seek_id(&mut self, id: FeatureId, attributes: &AttributeSelection) -> Option<Feature> {
        if id < self.next_id {
            if let Err(err) = self.reset() {
                warn!("Could not rewind {:?}: {}", self.path, err);
                return None;
            }
        }

        while let Some((current, point)) = self.advance() {
            if current == id {
                let attrs = self.layout.attributes(&self.record, attributes);
                return Some(Feature::new(id, point).with_attributes(attrs));
            }
        }

        debug!("Feature {} not found in {:?}", id, self.path);
        None
    }
}

impl Iterator for FeatureCursor {
    type Item = Feature;

    /// Unfiltered iteration with every attribute
    fn next(&mut self) -> Option<Feature> {
        self.next_feature(None, &AttributeSelection::All)
    }
}
