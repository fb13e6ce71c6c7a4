//! Core functionality for the delimited-text feature platform
//!
//! This crate provides the fundamental value types, geometry primitives and
//! the traits shared by data providers, layers and table models.

pub mod events;
pub mod geometry;
pub mod layer;
pub mod value;

// Re-export commonly used types
pub use events::{EventBus, LayerEvent, Subscription};
pub use geometry::{ParseRectError, Point, Rect};
pub use layer::VectorLayer;
pub use value::{AttributeMap, AttributeSelection, AttributeValue, Feature, FeatureId, Field, FieldType};
pub use data::FeatureSource;

pub mod data {
    use crate::geometry::Rect;
    use crate::value::{AttributeSelection, Feature, FeatureId, Field};

    /// Trait for read-only feature sources
    ///
    /// Sources keep a single sequential cursor. Read methods take `&self`;
    /// implementations guard the cursor with interior locking.
    pub trait FeatureSource: Send + Sync {
        /// Short name of the source, usually the file name
        fn source_name(&self) -> &str;

        /// Whether the source could be opened and understood
        fn is_valid(&self) -> bool;

        /// Field definitions in attribute-position order
        fn fields(&self) -> Vec<Field>;

        /// Number of valid features, ignoring any spatial filter
        fn feature_count(&self) -> usize;

        /// Bounding box of all valid features
        fn extent(&self) -> Option<Rect>;

        /// Set (or clear with `None`) the spatial filter and rewind the cursor
        fn select(&self, rect: Option<Rect>, use_intersect: bool);

        /// Rewind the cursor to the first feature, keeping the filter
        fn rewind(&self);

        /// Next feature passing the active filter
        fn next_feature(&self, attributes: &AttributeSelection) -> Option<Feature>;

        /// Fetch one feature by identifier, ignoring the filter and leaving the cursor alone
        fn feature_at_id(&self, id: FeatureId, attributes: &AttributeSelection) -> Option<Feature>;

        /// Pick up changes to the underlying storage; returns whether anything changed
        fn reload(&self) -> bool {
            false
        }
    }
}
