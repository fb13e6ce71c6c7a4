//! Bidirectional mapping between feature identifiers and table rows

use ahash::AHashMap;
use dt_core::FeatureId;
use tracing::warn;

/// Outcome of removing an identifier from the index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemovedRow {
    /// Row the identifier occupied
    pub row: usize,
    /// Identifier moved from the last row into `row`, if any
    pub relocated: Option<FeatureId>,
}

/// Identifier ↔ row index
///
/// Rows are always `0..len()` with no gaps. Removal fills the hole with the
/// last row, so row order is not preserved across removals.
#[derive(Debug, Clone, Default)]
pub struct IdentityIndex {
    id_to_row: AHashMap<FeatureId, usize>,
    row_to_id: Vec<FeatureId>,
}

impl IdentityIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the contents with `ids` in row order; duplicates are skipped
    pub fn load<I>(&mut self, ids: I)
    where
        I: IntoIterator<Item = FeatureId>,
    {
        let mut id_to_row = AHashMap::new();
        let mut row_to_id = Vec::new();

        for id in ids {
            if id_to_row.contains_key(&id) {
                warn!("Duplicate feature id {} ignored", id);
                continue;
            }
            id_to_row.insert(id, row_to_id.len());
            row_to_id.push(id);
        }

        self.id_to_row = id_to_row;
        self.row_to_id = row_to_id;
    }

    /// Append `id` as a new last row; returns its row
    pub fn insert(&mut self, id: FeatureId) -> usize {
        if let Some(&row) = self.id_to_row.get(&id) {
            return row;
        }
        let row = self.row_to_id.len();
        self.id_to_row.insert(id, row);
        self.row_to_id.push(id);
        row
    }

    /// Remove `id`, moving the last row into its place
    pub fn remove(&mut self, id: FeatureId) -> Option<RemovedRow> {
        let row = self.id_to_row.remove(&id)?;
        let last = self.row_to_id.len() - 1;

        if row == last {
            self.row_to_id.pop();
            return Some(RemovedRow { row, relocated: None });
        }

        let moved = self.row_to_id[last];
        self.row_to_id.swap_remove(row);
        self.id_to_row.insert(moved, row);
        Some(RemovedRow {
            row,
            relocated: Some(moved),
        })
    }

    /// Exchange the rows of two identifiers
    pub fn swap(&mut self, a: FeatureId, b: FeatureId) -> bool {
        let (Some(row_a), Some(row_b)) = (self.id_to_row(a), self.id_to_row(b)) else {
            return false;
        };
        self.row_to_id.swap(row_a, row_b);
        self.id_to_row.insert(a, row_b);
        self.id_to_row.insert(b, row_a);
        true
    }

    pub fn id_to_row(&self, id: FeatureId) -> Option<usize> {
        self.id_to_row.get(&id).copied()
    }

    pub fn row_to_id(&self, row: usize) -> Option<FeatureId> {
        self.row_to_id.get(row).copied()
    }

    pub fn contains(&self, id: FeatureId) -> bool {
        self.id_to_row.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.row_to_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.row_to_id.is_empty()
    }

    /// Identifiers in row order
    pub fn ids(&self) -> &[FeatureId] {
        &self.row_to_id
    }

    pub fn clear(&mut self) {
        self.id_to_row.clear();
        self.row_to_id.clear();
    }

    /// Both directions agree and rows are contiguous
    pub fn check_consistency(&self) -> bool {
        self.id_to_row.len() == self.row_to_id.len()
            && self
                .row_to_id
                .iter()
                .enumerate()
                .all(|(row, id)| self.id_to_row.get(id) == Some(&row))
    }
}
