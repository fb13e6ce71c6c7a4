//! Editable vector layer over a read-only feature source
//!
//! Edits live in an in-memory buffer until rolled back; the source is never
//! written to.

use std::collections::BTreeMap;
use std::sync::Arc;

use ahash::{AHashMap, AHashSet};
use dt_core::{
    AttributeMap, AttributeSelection, AttributeValue, EventBus, Feature, FeatureId, FeatureSource, Field, FieldType,
    LayerEvent, Point, Rect, Subscription, VectorLayer,
};
use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, info};

/// Errors of layer edit operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LayerError {
    #[error("Layer is not in editing mode")]
    NotEditable,

    #[error("Unknown feature: {0}")]
    UnknownFeature(FeatureId),

    #[error("Field index out of range: {0}")]
    FieldOutOfRange(usize),

    #[error("Value does not fit {expected} field {field}")]
    TypeMismatch { field: usize, expected: FieldType },
}

/// Pending, unsaved edits
#[derive(Debug, Default)]
struct EditBuffer {
    added: BTreeMap<FeatureId, Feature>,
    deleted: AHashSet<FeatureId>,
    changed: AHashMap<FeatureId, AttributeMap>,
}

impl EditBuffer {
    fn is_empty(&self) -> bool {
        self.added.is_empty() && self.deleted.is_empty() && self.changed.is_empty()
    }

    /// Overlay changed values on a feature read from the source
    fn apply(&self, feature: &mut Feature, attributes: &AttributeSelection) {
        if let Some(changes) = self.changed.get(&feature.id) {
            for (&position, value) in changes {
                if attributes.includes(position) {
                    feature.set_attribute(position, value.clone());
                }
            }
        }
    }
}

/// State of the iteration started by `select`
#[derive(Debug, Default)]
struct Iteration {
    attributes: AttributeSelection,
    rect: Option<Rect>,
    source_done: bool,
    /// Added features still to be yielded after the source is exhausted
    pending_added: Vec<FeatureId>,
}

#[derive(Debug)]
struct LayerState {
    editing: bool,
    buffer: EditBuffer,
    next_added_id: FeatureId,
    selection: AHashSet<FeatureId>,
    iteration: Iteration,
}

/// A [`VectorLayer`] reading from a [`FeatureSource`] with an edit buffer
pub struct EditableLayer {
    source: Arc<dyn FeatureSource>,
    state: Mutex<LayerState>,
    events: EventBus<LayerEvent>,
}

/// Keep only the requested attribute positions
fn project(feature: &Feature, attributes: &AttributeSelection) -> Feature {
    let kept = feature
        .attributes
        .iter()
        .filter(|(position, _)| attributes.includes(**position))
        .map(|(&position, value)| (position, value.clone()))
        .collect();
    Feature::new(feature.id, feature.geometry).with_attributes(kept)
}

impl EditableLayer {
    pub fn new(source: Arc<dyn FeatureSource>) -> Self {
        let next_added_id = source.feature_count() as FeatureId;
        info!("Created layer '{}' with {} features", source.source_name(), next_added_id);
        Self {
            source,
            state: Mutex::new(LayerState {
                editing: false,
                buffer: EditBuffer::default(),
                next_added_id,
                selection: AHashSet::new(),
                iteration: Iteration::default(),
            }),
            events: EventBus::new(),
        }
    }

    pub fn source(&self) -> &Arc<dyn FeatureSource> {
        &self.source
    }

    /// Open an editing session
    pub fn start_editing(&self) -> bool {
        let mut state = self.state.lock();
        if state.editing {
            return false;
        }
        state.editing = true;
        debug!("Editing started on '{}'", self.source.source_name());
        true
    }

    /// Discard every pending edit and close the editing session
    pub fn rollback(&self) -> Result<(), LayerError> {
        {
            let mut state = self.state.lock();
            if !state.editing {
                return Err(LayerError::NotEditable);
            }
            state.editing = false;
            state.buffer = EditBuffer::default();
            state.next_added_id = self.source.feature_count() as FeatureId;
        }
        debug!("Edits rolled back on '{}'", self.source.source_name());
        self.events.publish(LayerEvent::LayerModified { geometry_only: false });
        Ok(())
    }

    /// Add a feature to the edit buffer; returns its new identifier
    pub fn add_feature(&self, geometry: Point, attributes: AttributeMap) -> Result<FeatureId, LayerError> {
        let (id, renumbered) = {
            let mut state = self.state.lock();
            if !state.editing {
                return Err(LayerError::NotEditable);
            }
            let renumbered = self.renumber_added(&mut state);
            let id = state.next_added_id;
            state.next_added_id += 1;
            state
                .buffer
                .added
                .insert(id, Feature::new(id, geometry).with_attributes(attributes));
            (id, renumbered)
        };
        if renumbered {
            self.events.publish(LayerEvent::LayerModified { geometry_only: false });
        }
        self.events.publish(LayerEvent::FeatureAdded(id));
        Ok(id)
    }

    pub fn delete_feature(&self, id: FeatureId) -> Result<(), LayerError> {
        {
            let mut state = self.state.lock();
            if !state.editing {
                return Err(LayerError::NotEditable);
            }
            if !self.exists(&state, id) {
                return Err(LayerError::UnknownFeature(id));
            }
            if state.buffer.added.remove(&id).is_none() {
                state.buffer.deleted.insert(id);
                state.buffer.changed.remove(&id);
            }
            state.selection.remove(&id);
        }
        self.events.publish(LayerEvent::FeatureDeleted(id));
        Ok(())
    }

    /// Change one attribute in the edit buffer.
    ///
    /// The value is converted to the field's type first; the stored value is
    /// what the change notification carries.
    pub fn set_attribute(
        &self,
        id: FeatureId,
        field: usize,
        value: AttributeValue,
        emit_signal: bool,
    ) -> Result<(), LayerError> {
        let value = {
            let mut state = self.state.lock();
            if !state.editing {
                return Err(LayerError::NotEditable);
            }
            let expected = self
                .source
                .fields()
                .get(field)
                .map(|f| f.field_type)
                .ok_or(LayerError::FieldOutOfRange(field))?;
            if !self.exists(&state, id) {
                return Err(LayerError::UnknownFeature(id));
            }
            let value = value
                .coerce_to(expected)
                .ok_or(LayerError::TypeMismatch { field, expected })?;
            match state.buffer.added.get_mut(&id) {
                Some(feature) => feature.set_attribute(field, value.clone()),
                None => {
                    state.buffer.changed.entry(id).or_default().insert(field, value.clone());
                }
            }
            value
        };
        if emit_signal {
            self.events.publish(LayerEvent::AttributeValueChanged { id, field, value });
        }
        Ok(())
    }

    /// Select features; `clear_and_select` replaces the current selection
    pub fn select_features<I>(&self, ids: I, clear_and_select: bool)
    where
        I: IntoIterator<Item = FeatureId>,
    {
        let mut state = self.state.lock();
        if clear_and_select {
            state.selection.clear();
        }
        state.selection.extend(ids);
    }

    pub fn remove_selection(&self) {
        self.state.lock().selection.clear();
    }

    /// Re-read the source and tell dependents the content changed
    pub fn reload(&self) {
        if self.source.reload() {
            info!("Source of '{}' changed, reloading", self.source.source_name());
        }
        self.renumber_added(&mut self.state.lock());
        self.events.publish(LayerEvent::LayerModified { geometry_only: false });
    }

    /// Move buffered added features past identifiers the source now yields.
    ///
    /// A source that grew on disk hands out ids already given to added
    /// features; those get fresh ids so none is ever shared. Returns whether
    /// anything moved.
    fn renumber_added(&self, state: &mut LayerState) -> bool {
        let source_count = self.source.feature_count() as FeatureId;
        state.next_added_id = state.next_added_id.max(source_count);

        let colliding: Vec<FeatureId> = state.buffer.added.range(..source_count).map(|(&id, _)| id).collect();
        for old in &colliding {
            let Some(mut feature) = state.buffer.added.remove(old) else {
                continue;
            };
            let new = state.next_added_id;
            state.next_added_id += 1;
            feature.id = new;
            state.buffer.added.insert(new, feature);
            if state.selection.remove(old) {
                state.selection.insert(new);
            }
            debug!("Added feature {} renumbered to {}", old, new);
        }
        !colliding.is_empty()
    }

    /// Tear the layer down; dependents drop everything they hold
    pub fn delete_layer(&self) {
        {
            let mut state = self.state.lock();
            state.editing = false;
            state.buffer = EditBuffer::default();
            state.selection.clear();
            state.iteration = Iteration::default();
        }
        self.events.publish(LayerEvent::LayerDeleted);
    }

    fn exists(&self, state: &LayerState, id: FeatureId) -> bool {
        if state.buffer.added.contains_key(&id) {
            return true;
        }
        !state.buffer.deleted.contains(&id) && id < self.source.feature_count() as FeatureId
    }
}

impl VectorLayer for EditableLayer {
    fn name(&self) -> String {
        self.source.source_name().to_string()
    }

    fn fields(&self) -> Vec<Field> {
        self.source.fields()
    }

    fn feature_count(&self) -> usize {
        let state = self.state.lock();
        (self.source.feature_count() + state.buffer.added.len()).saturating_sub(state.buffer.deleted.len())
    }

    fn select(&self, attributes: AttributeSelection, rect: Option<Rect>) {
        let renumbered = {
            let mut state = self.state.lock();
            let renumbered = self.renumber_added(&mut state);
            let pending_added = state.buffer.added.keys().rev().copied().collect();
            state.iteration = Iteration {
                attributes,
                rect,
                source_done: false,
                pending_added,
            };
            renumbered
        };
        self.source.select(rect, false);
        if renumbered {
            self.events.publish(LayerEvent::LayerModified { geometry_only: false });
        }
    }

    fn next_feature(&self) -> Option<Feature> {
        let mut state = self.state.lock();

        while !state.iteration.source_done {
            match self.source.next_feature(&state.iteration.attributes) {
                Some(mut feature) => {
                    if state.buffer.deleted.contains(&feature.id) {
                        continue;
                    }
                    state.buffer.apply(&mut feature, &state.iteration.attributes);
                    return Some(feature);
                }
                None => state.iteration.source_done = true,
            }
        }

        while let Some(id) = state.iteration.pending_added.pop() {
            let Some(feature) = state.buffer.added.get(&id) else {
                continue;
            };
            if state.iteration.rect.map_or(true, |rect| rect.contains(&feature.geometry)) {
                return Some(project(feature, &state.iteration.attributes));
            }
        }
        None
    }

    fn feature_at_id(&self, id: FeatureId, attributes: &AttributeSelection) -> Option<Feature> {
        let state = self.state.lock();
        if let Some(feature) = state.buffer.added.get(&id) {
            return Some(project(feature, attributes));
        }
        if state.buffer.deleted.contains(&id) {
            return None;
        }
        let mut feature = self.source.feature_at_id(id, attributes)?;
        state.buffer.apply(&mut feature, attributes);
        Some(feature)
    }

    fn is_editable(&self) -> bool {
        self.state.lock().editing
    }

    fn is_modified(&self) -> bool {
        !self.state.lock().buffer.is_empty()
    }

    fn change_attribute_value(&self, id: FeatureId, field: usize, value: AttributeValue, emit_signal: bool) -> bool {
        match self.set_attribute(id, field, value, emit_signal) {
            Ok(()) => true,
            Err(err) => {
                debug!("Attribute change on feature {} rejected: {}", id, err);
                false
            }
        }
    }

    fn selected_feature_ids(&self) -> AHashSet<FeatureId> {
        self.state.lock().selection.clone()
    }

    fn subscribe(&self) -> Subscription<LayerEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dt_data::DelimitedTextProvider;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn layer(contents: &str) -> (NamedTempFile, EditableLayer) {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file.flush().unwrap();
        let provider = DelimitedTextProvider::new(&file.path().display().to_string());
        (file, EditableLayer::new(Arc::new(provider)))
    }

    fn scan_ids(layer: &EditableLayer) -> Vec<FeatureId> {
        layer.select(AttributeSelection::Empty, None);
        std::iter::from_fn(|| layer.next_feature()).map(|f| f.id).collect()
    }

    #[test]
    fn test_edits_require_session() {
        let (_file, layer) = layer("x,y,v\n1,1,a\n");
        assert!(!layer.is_editable());
        assert_eq!(layer.delete_feature(0), Err(LayerError::NotEditable));
        assert!(!layer.change_attribute_value(0, 2, "b".into(), true));
        assert_eq!(layer.rollback(), Err(LayerError::NotEditable));
    }

    #[test]
    fn test_change_attribute_overlays_source() {
        let (_file, layer) = layer("x,y,v\n1,1,a\n2,2,b\n");
        let events = layer.subscribe();
        layer.start_editing();

        assert!(layer.change_attribute_value(1, 2, "z".into(), true));
        assert!(layer.is_modified());
        assert_eq!(
            events.drain(),
            vec![LayerEvent::AttributeValueChanged {
                id: 1,
                field: 2,
                value: "z".into()
            }]
        );

        let feature = layer.feature_at_id(1, &AttributeSelection::All).unwrap();
        assert_eq!(feature.attribute(2), Some(&AttributeValue::Text("z".into())));

        assert_eq!(
            layer.set_attribute(1, 7, AttributeValue::Null, false),
            Err(LayerError::FieldOutOfRange(7))
        );
        assert_eq!(
            layer.set_attribute(9, 2, AttributeValue::Null, false),
            Err(LayerError::UnknownFeature(9))
        );
    }

    #[test]
    fn test_set_attribute_converts_to_field_type() {
        let (_file, layer) = layer("x,y,n,s\n1,1,5,a\n");
        let events = layer.subscribe();
        layer.start_editing();

        assert_eq!(
            layer.set_attribute(0, 2, "1a".into(), true),
            Err(LayerError::TypeMismatch {
                field: 2,
                expected: FieldType::Integer
            })
        );
        assert!(!layer.is_modified());
        assert!(events.drain().is_empty());

        layer.set_attribute(0, 2, "7".into(), true).unwrap();
        layer.set_attribute(0, 3, 9i64.into(), false).unwrap();
        assert_eq!(
            events.drain(),
            vec![LayerEvent::AttributeValueChanged {
                id: 0,
                field: 2,
                value: AttributeValue::Integer(7)
            }]
        );

        let feature = layer.feature_at_id(0, &AttributeSelection::All).unwrap();
        assert_eq!(feature.attribute(2), Some(&AttributeValue::Integer(7)));
        assert_eq!(feature.attribute(3), Some(&AttributeValue::Text("9".into())));
    }

    #[test]
    fn test_reload_keeps_added_ids_unique() {
        let (file, layer) = layer("x,y\n0,0\n1,1\n");
        layer.start_editing();
        let added = layer.add_feature(Point::new(5.0, 5.0), AttributeMap::new()).unwrap();
        assert_eq!(added, 2);
        layer.select_features(vec![added], true);

        let mut appended = std::fs::OpenOptions::new().append(true).open(file.path()).unwrap();
        appended.write_all(b"2,2\n").unwrap();
        appended.flush().unwrap();
        let events = layer.subscribe();
        layer.reload();

        assert_eq!(scan_ids(&layer), vec![0, 1, 2, 3]);
        assert_eq!(layer.feature_count(), 4);
        assert_eq!(layer.feature_at_id(3, &AttributeSelection::All).unwrap().geometry, Point::new(5.0, 5.0));
        assert!(layer.selected_feature_ids().contains(&3));
        assert_eq!(layer.add_feature(Point::new(6.0, 6.0), AttributeMap::new()), Ok(4));
        assert_eq!(
            events.drain().first(),
            Some(&LayerEvent::LayerModified { geometry_only: false })
        );
    }

    #[test]
    fn test_add_and_delete() {
        let (_file, layer) = layer("x,y\n1,1\n2,2\n");
        let events = layer.subscribe();
        layer.start_editing();

        let added = layer.add_feature(Point::new(5.0, 5.0), AttributeMap::new()).unwrap();
        assert_eq!(added, 2);
        layer.delete_feature(0).unwrap();

        assert_eq!(layer.feature_count(), 2);
        assert_eq!(scan_ids(&layer), vec![1, 2]);
        assert!(layer.feature_at_id(0, &AttributeSelection::All).is_none());
        assert_eq!(
            events.drain(),
            vec![LayerEvent::FeatureAdded(2), LayerEvent::FeatureDeleted(0)]
        );
        assert_eq!(layer.delete_feature(0), Err(LayerError::UnknownFeature(0)));
    }

    #[test]
    fn test_added_features_respect_rect() {
        let (_file, layer) = layer("x,y\n1,1\n");
        layer.start_editing();
        layer.add_feature(Point::new(50.0, 50.0), AttributeMap::new()).unwrap();

        layer.select(AttributeSelection::Empty, Some(Rect::new(0.0, 0.0, 10.0, 10.0)));
        let ids: Vec<FeatureId> = std::iter::from_fn(|| layer.next_feature()).map(|f| f.id).collect();
        assert_eq!(ids, vec![0]);
    }

    #[test]
    fn test_rollback_discards_edits() {
        let (_file, layer) = layer("x,y\n1,1\n2,2\n");
        let events = layer.subscribe();
        layer.start_editing();
        layer.delete_feature(1).unwrap();
        layer.rollback().unwrap();

        assert!(!layer.is_modified());
        assert!(!layer.is_editable());
        assert_eq!(scan_ids(&layer), vec![0, 1]);
        assert_eq!(
            events.drain().last(),
            Some(&LayerEvent::LayerModified { geometry_only: false })
        );
    }

    #[test]
    fn test_selection() {
        let (_file, layer) = layer("x,y\n1,1\n2,2\n3,3\n");
        layer.select_features(vec![0, 2], true);
        layer.select_features(vec![1], false);
        assert_eq!(layer.selected_feature_ids().len(), 3);

        layer.select_features(vec![2], true);
        let selected = layer.selected_feature_ids();
        assert_eq!(selected.len(), 1);
        assert!(selected.contains(&2));

        layer.remove_selection();
        assert!(layer.selected_feature_ids().is_empty());
    }

    #[test]
    fn test_delete_layer_publishes() {
        let (_file, layer) = layer("x,y\n1,1\n");
        let events = layer.subscribe();
        layer.delete_layer();
        assert_eq!(events.drain(), vec![LayerEvent::LayerDeleted]);
    }
}
