//! The layer collaborator consumed by table models

use ahash::AHashSet;

use crate::events::{LayerEvent, Subscription};
use crate::geometry::Rect;
use crate::value::{AttributeSelection, AttributeValue, Feature, FeatureId, Field};

/// A mutable data owner sitting on top of a feature source
///
/// The layer owns persistence and the editing session. Models read through
/// it, forward edits to it and follow its [`LayerEvent`]s.
pub trait VectorLayer: Send + Sync {
    /// Display name of the layer
    fn name(&self) -> String;

    /// Fields including pending edits
    fn fields(&self) -> Vec<Field>;

    /// Attribute positions shown by default, one per field
    fn attribute_list(&self) -> Vec<usize> {
        (0..self.fields().len()).collect()
    }

    /// Feature count including pending edits
    fn feature_count(&self) -> usize;

    /// Start an iteration over the layer
    fn select(&self, attributes: AttributeSelection, rect: Option<Rect>);

    /// Next feature of the iteration started by [`select`](Self::select)
    fn next_feature(&self) -> Option<Feature>;

    /// Random access by identifier
    fn feature_at_id(&self, id: FeatureId, attributes: &AttributeSelection) -> Option<Feature>;

    /// Whether an editing session is open
    fn is_editable(&self) -> bool;

    /// Whether the edit buffer holds unsaved changes
    fn is_modified(&self) -> bool;

    /// Change one attribute; returns false if nothing was changed
    fn change_attribute_value(&self, id: FeatureId, field: usize, value: AttributeValue, emit_signal: bool) -> bool;

    /// Identifiers of the currently selected features
    fn selected_feature_ids(&self) -> AHashSet<FeatureId>;

    /// Subscribe to layer notifications
    fn subscribe(&self) -> Subscription<LayerEvent>;
}
