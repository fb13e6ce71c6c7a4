//! Delimited text data provider
//!
//! Exposes a delimited file as a collection of point features. The file is
//! analyzed once at construction; features are re-read lazily through a
//! single sequential cursor.

use std::sync::Arc;

use dt_core::{AttributeMap, AttributeSelection, Feature, FeatureId, FeatureSource, Field, Point, Rect};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::analysis::{FileAnalysis, FileStamp};
use super::cursor::FeatureCursor;
use super::record::{InvalidLine, RecordLayout};
use crate::cache::MinMaxCache;
use crate::config::ProviderConfig;

/// What the provider can do natively
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Capabilities {
    pub select_at_id: bool,
    pub add_features: bool,
    pub delete_features: bool,
    pub change_attribute_values: bool,
}

/// Sequential read state
#[derive(Default)]
struct CursorState {
    cursor: Option<FeatureCursor>,
    filter: Option<Rect>,
}

/// Point features read from a delimited text file
pub struct DelimitedTextProvider {
    config: ProviderConfig,
    source_name: String,
    /// `None` when the file could not be opened or understood
    analysis: RwLock<Option<FileAnalysis>>,
    state: Mutex<CursorState>,
    min_max: Mutex<MinMaxCache>,
}

impl DelimitedTextProvider {
    /// Open the file named by a connection string.
    ///
    /// Never fails: problems leave the provider invalid, and an invalid
    /// provider answers every query with an empty result.
    pub fn new(uri: &str) -> Self {
        match ProviderConfig::from_uri(uri) {
            Ok(config) => Self::with_config(config),
            Err(err) => {
                warn!("Invalid delimited text source '{}': {}", uri, err);
                let path = uri.split('?').next().unwrap_or(uri);
                Self::invalid(ProviderConfig::new(path))
            }
        }
    }

    /// Open the file described by `config`
    pub fn with_config(config: ProviderConfig) -> Self {
        let mut provider = Self::invalid(config);
        match FileAnalysis::run(&provider.config) {
            Ok(analysis) => {
                info!(
                    "Loaded {} features with {} fields from {:?}",
                    analysis.feature_count,
                    analysis.layout.field_count(),
                    provider.config.path
                );
                provider.analysis = RwLock::new(Some(analysis));
            }
            Err(err) => warn!("Delimited text source {:?} is invalid: {}", provider.config.path, err),
        }
        provider
    }

    fn invalid(config: ProviderConfig) -> Self {
        Self {
            source_name: config.file_name(),
            config,
            analysis: RwLock::new(None),
            state: Mutex::new(CursorState::default()),
            min_max: Mutex::new(MinMaxCache::new()),
        }
    }

    pub fn storage_type(&self) -> &'static str {
        "Delimited text file"
    }

    pub fn name(&self) -> &'static str {
        "delimitedtext"
    }

    pub fn description(&self) -> &'static str {
        "Delimited text data provider"
    }

    /// Always point geometry
    pub fn geometry_type(&self) -> &'static str {
        "Point"
    }

    pub fn capabilities(&self) -> Capabilities {
        Capabilities {
            select_at_id: true,
            add_features: false,
            delete_features: false,
            change_attribute_values: false,
        }
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    pub fn is_valid(&self) -> bool {
        self.analysis.read().is_some()
    }

    pub fn feature_count(&self) -> usize {
        self.analysis.read().as_ref().map_or(0, |a| a.feature_count)
    }

    pub fn field_count(&self) -> usize {
        self.analysis.read().as_ref().map_or(0, |a| a.layout.field_count())
    }

    pub fn fields(&self) -> Vec<Field> {
        self.analysis
            .read()
            .as_ref()
            .map(|a| a.layout.fields.clone())
            .unwrap_or_default()
    }

    /// Position of the field called `name`
    pub fn field_position(&self, name: &str) -> Option<usize> {
        self.analysis
            .read()
            .as_ref()
            .and_then(|a| a.layout.fields.iter().position(|f| f.name == name))
    }

    /// Bounding box of every valid feature, `None` without features
    pub fn extent(&self) -> Option<Rect> {
        self.analysis.read().as_ref().and_then(|a| a.extent)
    }

    /// Lines skipped during analysis
    pub fn invalid_lines(&self) -> Vec<InvalidLine> {
        self.analysis
            .read()
            .as_ref()
            .map(|a| a.invalid_lines.clone())
            .unwrap_or_default()
    }

    fn layout(&self) -> Option<Arc<RecordLayout>> {
        self.analysis.read().as_ref().map(|a| Arc::clone(&a.layout))
    }

    fn open_cursor(&self) -> Option<FeatureCursor> {
        let layout = self.layout()?;
        match FeatureCursor::open(&self.config.path, layout) {
            Ok(cursor) => Some(cursor),
            Err(err) => {
                warn!("Could not open {:?}: {}", self.config.path, err);
                None
            }
        }
    }

    /// Set the spatial filter (`None` clears it) and rewind.
    ///
    /// `use_intersect` only matters for extended geometries.
    pub fn select(&self, rect: Option<Rect>, _use_intersect: bool) {
        debug!("Selecting features in {:?}", rect);
        self.state.lock().filter = rect;
        self.rewind();
    }

    /// Clear the filter and rewind
    pub fn reset(&self) {
        self.state.lock().filter = None;
        self.rewind();
    }

    /// Rewind to the first feature, keeping the filter
    pub fn rewind(&self) {
        let mut state = self.state.lock();
        if let Some(cursor) = state.cursor.as_mut() {
            if let Err(err) = cursor.reset() {
                warn!("Could not rewind {:?}: {}", self.config.path, err);
                state.cursor = None;
            }
        }
    }

    /// Whether a point passes the active filter
    pub fn bounds_check(&self, x: f64, y: f64) -> bool {
        let state = self.state.lock();
        state
            .filter
            .as_ref()
            .map_or(true, |rect| rect.contains(&Point::new(x, y)))
    }

    /// Rewind and read the first feature passing the filter
    pub fn get_first_feature(&self, fetch_attributes: bool) -> Option<Feature> {
        self.rewind();
        self.get_next_feature(fetch_attributes)
    }

    pub fn get_next_feature(&self, fetch_attributes: bool) -> Option<Feature> {
        self.next_feature_with(&AttributeSelection::from_flag(fetch_attributes))
    }

    /// Next feature passing the filter, materializing only `attributes`
    pub fn next_feature_with(&self, attributes: &AttributeSelection) -> Option<Feature> {
        if !self.is_valid() {
            return None;
        }

        let mut state = self.state.lock();
        if state.cursor.is_none() {
            state.cursor = self.open_cursor();
        }
        let CursorState { cursor, filter } = &mut *state;
        cursor.as_mut()?.next_feature(filter.as_ref(), attributes)
    }

    /// Every attribute of feature `id`, found by a fresh scan
    pub fn get_feature_attributes(&self, id: FeatureId) -> Option<AttributeMap> {
        self.feature_at_id(id, &AttributeSelection::All).map(|f| f.attributes)
    }

    /// Feature `id`, ignoring the filter and leaving the cursor alone
    pub fn feature_at_id(&self, id: FeatureId, attributes: &AttributeSelection) -> Option<Feature> {
        self.open_cursor()?.seek_id(id, attributes)
    }

    /// Every feature inside `rect`, with all attributes
    pub fn identify(&self, rect: &Rect) -> Vec<Feature> {
        let Some(mut cursor) = self.open_cursor() else {
            return Vec::new();
        };
        let mut found = Vec::new();
        while let Some(feature) = cursor.next_feature(Some(rect), &AttributeSelection::All) {
            found.push(feature);
        }
        found
    }

    /// Textual minimum of column `position`
    pub fn min_value(&self, position: usize) -> Option<String> {
        self.ensure_statistics();
        self.min_max.lock().min(position).map(ToString::to_string)
    }

    /// Textual maximum of column `position`
    pub fn max_value(&self, position: usize) -> Option<String> {
        self.ensure_statistics();
        self.min_max.lock().max(position).map(ToString::to_string)
    }

    /// Number of full scans spent on statistics
    pub fn statistics_scans(&self) -> usize {
        self.min_max.lock().fill_count()
    }

    fn ensure_statistics(&self) {
        self.refresh_if_changed();

        let mut cache = self.min_max.lock();
        if !cache.is_dirty() {
            return;
        }

        let field_count = self.field_count();
        debug!("Scanning {:?} for column statistics", self.config.path);
        match self.open_cursor() {
            Some(cursor) => cache.fill(field_count, cursor.map(|f| f.attributes)),
            None => cache.fill(field_count, Vec::new()),
        }
    }

    /// Re-analyze the file if it changed on disk; returns whether it did
    pub fn refresh_if_changed(&self) -> bool {
        let mut analysis = self.analysis.write();
        let Some(current) = analysis.as_ref() else {
            return false;
        };

        match FileStamp::of(&self.config.path) {
            Ok(stamp) if stamp == current.stamp => return false,
            Ok(_) => info!("{:?} changed on disk, reloading", self.config.path),
            Err(err) => warn!("Lost access to {:?}: {}", self.config.path, err),
        }

        *analysis = match FileAnalysis::run(&self.config) {
            Ok(fresh) => Some(fresh),
            Err(err) => {
                warn!("Delimited text source {:?} is invalid: {}", self.config.path, err);
                None
            }
        };
        drop(analysis);

        self.state.lock().cursor = None;
        self.min_max.lock().invalidate();
        true
    }
}

impl FeatureSource for DelimitedTextProvider {
    fn source_name(&self) -> &str {
        &self.source_name
    }

    fn is_valid(&self) -> bool {
        DelimitedTextProvider::is_valid(self)
    }

    fn fields(&self) -> Vec<Field> {
        DelimitedTextProvider::fields(self)
    }

    fn feature_count(&self) -> usize {
        DelimitedTextProvider::feature_count(self)
    }

    fn extent(&self) -> Option<Rect> {
        DelimitedTextProvider::extent(self)
    }

    fn select(&self, rect: Option<Rect>, use_intersect: bool) {
        DelimitedTextProvider::select(self, rect, use_intersect)
    }

    fn rewind(&self) {
        DelimitedTextProvider::rewind(self)
    }

    fn next_feature(&self, attributes: &AttributeSelection) -> Option<Feature> {
        self.next_feature_with(attributes)
    }

    fn feature_at_id(&self, id: FeatureId, attributes: &AttributeSelection) -> Option<Feature> {
        DelimitedTextProvider::feature_at_id(self, id, attributes)
    }

    fn reload(&self) -> bool {
        self.refresh_if_changed()
    }
}
