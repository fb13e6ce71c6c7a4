//! Sortable attribute table model
//!
//! Maps feature identifiers to view rows through an [`IdentityIndex`],
//! serves cell reads from a feature cache and follows layer changes.

use std::fmt;
use std::sync::Arc;

use ahash::AHashMap;
use dt_core::{AttributeSelection, AttributeValue, Feature, FeatureId, Field, LayerEvent, Subscription, VectorLayer};
use dt_data::IdentityIndex;
use parking_lot::Mutex;
use tracing::{debug, info};

/// Notifications sent to views
#[derive(Debug, Clone, PartialEq)]
pub enum ModelEvent {
    /// Rows `first..=last` were appended
    RowsInserted { first: usize, last: usize },

    /// `row` was removed; `relocated` now occupies it
    RowsRemoved { row: usize, relocated: Option<FeatureId> },

    CellChanged { row: usize, column: usize },

    /// Row positions are about to be invalidated
    LayoutAboutToChange,

    LayoutChanged,

    /// Everything is gone
    Reset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortState {
    #[default]
    Unsorted,
    Sorting,
    Sorted { column: usize, order: SortOrder },
}

/// What a cell read is for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellRole {
    Display,
    Edit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alignment {
    Left,
    Right,
}

/// Where cell values come from
#[derive(Debug)]
enum FeatureCache {
    /// Only the last fetched feature
    SingleRow(Option<Feature>),
    /// Every feature, loaded with the index
    InMemory(AHashMap<FeatureId, Feature>),
}

impl FeatureCache {
    fn clear(&mut self) {
        match self {
            FeatureCache::SingleRow(row) => *row = None,
            FeatureCache::InMemory(features) => features.clear(),
        }
    }

    fn get_mut(&mut self, id: FeatureId) -> Option<&mut Feature> {
        match self {
            FeatureCache::SingleRow(row) => row.as_mut().filter(|f| f.id == id),
            FeatureCache::InMemory(features) => features.get_mut(&id),
        }
    }

    fn evict(&mut self, id: FeatureId) {
        match self {
            FeatureCache::SingleRow(row) => {
                if row.as_ref().map_or(false, |f| f.id == id) {
                    *row = None;
                }
            }
            FeatureCache::InMemory(features) => {
                features.remove(&id);
            }
        }
    }
}

type Listener = Box<dyn FnMut(&AttributeTableModel, &ModelEvent)>;

/// Table view model over a vector layer
pub struct AttributeTableModel {
    layer: Arc<dyn VectorLayer>,
    subscription: Subscription<LayerEvent>,
    index: IdentityIndex,
    fields: Vec<Field>,
    /// Field position shown in each column
    attributes: Vec<usize>,
    cache: Mutex<FeatureCache>,
    sort_state: SortState,
    listeners: Vec<Listener>,
}

impl AttributeTableModel {
    /// Model caching one feature at a time
    pub fn new(layer: Arc<dyn VectorLayer>) -> Self {
        Self::with_cache(layer, FeatureCache::SingleRow(None))
    }

    /// Model holding every feature in memory
    pub fn in_memory(layer: Arc<dyn VectorLayer>) -> Self {
        Self::with_cache(layer, FeatureCache::InMemory(AHashMap::new()))
    }

    fn with_cache(layer: Arc<dyn VectorLayer>, cache: FeatureCache) -> Self {
        let subscription = layer.subscribe();
        let mut model = Self {
            layer,
            subscription,
            index: IdentityIndex::new(),
            fields: Vec::new(),
            attributes: Vec::new(),
            cache: Mutex::new(cache),
            sort_state: SortState::Unsorted,
            listeners: Vec::new(),
        };
        model.rebuild();
        model
    }

    /// Register a view callback
    pub fn connect<F>(&mut self, listener: F)
    where
        F: FnMut(&AttributeTableModel, &ModelEvent) + 'static,
    {
        self.listeners.push(Box::new(listener));
    }

    fn emit(&mut self, event: ModelEvent) {
        let mut listeners = std::mem::take(&mut self.listeners);
        for listener in listeners.iter_mut() {
            listener(self, &event);
        }
        self.listeners = listeners;
    }

    pub fn layer(&self) -> &Arc<dyn VectorLayer> {
        &self.layer
    }

    pub fn is_in_memory(&self) -> bool {
        matches!(*self.cache.lock(), FeatureCache::InMemory(_))
    }

    /// Re-read identifiers and fields from the layer
    fn rebuild(&mut self) {
        self.fields = self.layer.fields();
        self.attributes = self.layer.attribute_list();

        let mut cache = self.cache.lock();
        cache.clear();

        let selection = match &*cache {
            FeatureCache::SingleRow(_) => AttributeSelection::Empty,
            FeatureCache::InMemory(_) => AttributeSelection::Only(self.attributes.clone()),
        };
        self.layer.select(selection, None);

        let mut ids = Vec::with_capacity(self.layer.feature_count());
        while let Some(feature) = self.layer.next_feature() {
            ids.push(feature.id);
            if let FeatureCache::InMemory(features) = &mut *cache {
                features.insert(feature.id, feature);
            }
        }
        drop(cache);

        self.index.load(ids);
        self.sort_state = SortState::Unsorted;
        info!("Loaded {} rows from layer '{}'", self.index.len(), self.layer.name());
    }

    /// Rebuild the model from the layer, bracketed by layout events
    pub fn load_layer(&mut self) {
        self.emit(ModelEvent::LayoutAboutToChange);
        self.rebuild();
        self.emit(ModelEvent::LayoutChanged);
    }

    pub fn row_count(&self) -> usize {
        self.index.len()
    }

    pub fn column_count(&self) -> usize {
        self.attributes.len()
    }

    pub fn id_to_row(&self, id: FeatureId) -> Option<usize> {
        self.index.id_to_row(id)
    }

    pub fn row_to_id(&self, row: usize) -> Option<FeatureId> {
        self.index.row_to_id(row)
    }

    /// Identifiers in row order
    pub fn row_ids(&self) -> &[FeatureId] {
        self.index.ids()
    }

    pub fn field_position(&self, column: usize) -> Option<usize> {
        self.attributes.get(column).copied()
    }

    pub fn header_label(&self, column: usize) -> Option<String> {
        let position = self.field_position(column)?;
        self.fields.get(position).map(|f| f.name.clone())
    }

    pub fn row_header(&self, row: usize) -> Option<String> {
        (row < self.row_count()).then(|| row.to_string())
    }

    pub fn column_alignment(&self, column: usize) -> Alignment {
        let numeric = self
            .field_position(column)
            .and_then(|position| self.fields.get(position))
            .map_or(false, |f| f.field_type.is_numeric());
        if numeric {
            Alignment::Right
        } else {
            Alignment::Left
        }
    }

    pub fn is_editable(&self) -> bool {
        self.layer.is_editable()
    }

    pub fn sort_state(&self) -> SortState {
        self.sort_state
    }

    /// Value shown at a cell, `None` for unknown cells or failed fetches
    pub fn cell_value(&self, row: usize, column: usize) -> Option<AttributeValue> {
        let id = self.index.row_to_id(row)?;
        let position = self.field_position(column)?;

        let mut cache = self.cache.lock();
        match &mut *cache {
            FeatureCache::SingleRow(slot) => {
                if slot.as_ref().map_or(true, |f| f.id != id) {
                    debug!("Fetching feature {} for row {}", id, row);
                    *slot = self
                        .layer
                        .feature_at_id(id, &AttributeSelection::Only(self.attributes.clone()));
                }
                slot.as_ref()?.attribute(position).cloned()
            }
            FeatureCache::InMemory(features) => features.get(&id)?.attribute(position).cloned(),
        }
    }

    /// Text of a cell for a given role
    pub fn cell_text(&self, row: usize, column: usize, role: CellRole) -> String {
        match (self.cell_value(row, column), role) {
            (None, CellRole::Display) => "ERROR".to_string(),
            (Some(AttributeValue::Null), CellRole::Display) => "NULL".to_string(),
            (None, CellRole::Edit) | (Some(AttributeValue::Null), CellRole::Edit) => String::new(),
            (Some(value), _) => value.to_string(),
        }
    }

    /// Write a cell through the layer
    pub fn set_cell_value(&mut self, row: usize, column: usize, value: AttributeValue) -> bool {
        self.process_layer_events();

        let (Some(id), Some(position)) = (self.index.row_to_id(row), self.field_position(column)) else {
            return false;
        };
        if !self.layer.is_editable() {
            return false;
        }

        // the edited feature becomes the cached row
        if let FeatureCache::SingleRow(slot) = &mut *self.cache.lock() {
            if slot.as_ref().map_or(true, |f| f.id != id) {
                debug!("Fetching feature {} for edit of row {}", id, row);
                *slot = self
                    .layer
                    .feature_at_id(id, &AttributeSelection::Only(self.attributes.clone()));
            }
        }

        if !self.layer.change_attribute_value(id, position, value.clone(), true) || !self.layer.is_modified() {
            return false;
        }

        // the echo carries the value as the layer stored it
        let mut stored = None;
        for event in self.subscription.drain() {
            match event {
                LayerEvent::AttributeValueChanged {
                    id: changed,
                    field,
                    value,
                } if stored.is_none() && changed == id && field == position => stored = Some(value),
                event => self.handle_layer_event(event),
            }
        }

        if let Some(feature) = self.cache.lock().get_mut(id) {
            feature.set_attribute(position, stored.unwrap_or(value));
        }

        if let Some(row) = self.index.id_to_row(id) {
            self.emit(ModelEvent::CellChanged { row, column });
        }
        true
    }

    /// Reorder rows by one column
    pub fn sort(&mut self, column: usize, order: SortOrder) -> bool {
        self.process_layer_events();

        let Some(position) = self.field_position(column) else {
            return false;
        };

        self.sort_state = SortState::Sorting;
        self.emit(ModelEvent::LayoutAboutToChange);

        self.layer.select(AttributeSelection::Only(vec![position]), None);
        // keys stay in scan order, so the stable sort breaks ties by it
        let mut keys: Vec<(FeatureId, AttributeValue)> = Vec::with_capacity(self.index.len());
        while let Some(mut feature) = self.layer.next_feature() {
            let value = feature.attributes.remove(&position).unwrap_or_default();
            keys.push((feature.id, value));
        }

        match order {
            SortOrder::Ascending => keys.sort_by(|a, b| a.1.compare(&b.1)),
            SortOrder::Descending => keys.sort_by(|a, b| b.1.compare(&a.1)),
        }

        self.index.load(keys.into_iter().map(|(id, _)| id));
        self.sort_state = SortState::Sorted { column, order };
        debug!("Sorted {} rows by column {} {:?}", self.index.len(), column, order);

        self.emit(ModelEvent::LayoutChanged);
        true
    }

    /// Exchange the rows of two features
    pub fn swap_rows(&mut self, a: FeatureId, b: FeatureId) -> bool {
        self.process_layer_events();

        if !self.index.contains(a) || !self.index.contains(b) {
            return false;
        }
        self.emit(ModelEvent::LayoutAboutToChange);
        self.index.swap(a, b);
        self.emit(ModelEvent::LayoutChanged);
        true
    }

    /// Apply every queued layer notification
    pub fn process_layer_events(&mut self) {
        for event in self.subscription.drain() {
            self.handle_layer_event(event);
        }
    }

    fn handle_layer_event(&mut self, event: LayerEvent) {
        match event {
            LayerEvent::FeatureAdded(id) => {
                if self.index.contains(id) {
                    return;
                }
                {
                    let mut cache = self.cache.lock();
                    if let FeatureCache::InMemory(features) = &mut *cache {
                        let selection = AttributeSelection::Only(self.attributes.clone());
                        if let Some(feature) = self.layer.feature_at_id(id, &selection) {
                            features.insert(id, feature);
                        }
                    }
                }
                let row = self.index.insert(id);
                self.emit(ModelEvent::RowsInserted { first: row, last: row });
            }
            LayerEvent::FeatureDeleted(id) => {
                self.cache.lock().evict(id);
                if let Some(removed) = self.index.remove(id) {
                    self.emit(ModelEvent::RowsRemoved {
                        row: removed.row,
                        relocated: removed.relocated,
                    });
                }
            }
            LayerEvent::AttributeValueChanged { id, field, value } => {
                if let Some(feature) = self.cache.lock().get_mut(id) {
                    feature.set_attribute(field, value);
                }
                let row = self.index.id_to_row(id);
                let column = self.attributes.iter().position(|&p| p == field);
                if let (Some(row), Some(column)) = (row, column) {
                    self.emit(ModelEvent::CellChanged { row, column });
                }
            }
            LayerEvent::LayerModified { geometry_only: true } => {}
            LayerEvent::LayerModified { geometry_only: false } => self.load_layer(),
            LayerEvent::LayerDeleted => {
                self.index.clear();
                self.cache.lock().clear();
                self.fields.clear();
                self.attributes.clear();
                self.sort_state = SortState::Unsorted;
                self.emit(ModelEvent::Reset);
            }
        }
    }
}

impl fmt::Debug for AttributeTableModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttributeTableModel")
            .field("layer", &self.layer.name())
            .field("rows", &self.index.len())
            .field("columns", &self.attributes.len())
            .field("sort_state", &self.sort_state)
            .finish()
    }
}
