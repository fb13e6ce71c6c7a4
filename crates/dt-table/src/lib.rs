//! Attribute table models over vector layers
//!
//! [`EditableLayer`] adds an edit buffer and change notifications to a
//! feature source; [`AttributeTableModel`] turns a layer into sortable rows.

pub mod filter;
pub mod layer;
pub mod model;

pub use filter::AttributeTableFilterModel;
pub use layer::{EditableLayer, LayerError};
pub use model::{Alignment, AttributeTableModel, CellRole, ModelEvent, SortOrder, SortState};
