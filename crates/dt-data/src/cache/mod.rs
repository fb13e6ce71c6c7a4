//! Attribute statistics caching

use std::cmp::Ordering;

use dt_core::{AttributeMap, AttributeValue};

/// Smallest and largest non-null value of a column
#[derive(Debug, Clone, PartialEq)]
pub struct ValueRange {
    pub min: AttributeValue,
    pub max: AttributeValue,
}

/// Per-column min/max values over the full feature set
///
/// Starts dirty. A dirty cache must be refilled with one full scan before it
/// answers; it stays clean until [`invalidate`](Self::invalidate).
#[derive(Debug, Clone)]
pub struct MinMaxCache {
    ranges: Vec<Option<ValueRange>>,
    dirty: bool,
    fill_count: usize,
}

impl MinMaxCache {
    /// Create a new, dirty cache
    pub fn new() -> Self {
        Self {
            ranges: Vec::new(),
            dirty: true,
            fill_count: 0,
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Mark the cache stale
    pub fn invalidate(&mut self) {
        self.dirty = true;
    }

    /// Number of full scans consumed so far
    pub fn fill_count(&self) -> usize {
        self.fill_count
    }

    /// Rebuild the ranges from every feature's attributes
    pub fn fill<I>(&mut self, field_count: usize, features: I)
    where
        I: IntoIterator<Item = AttributeMap>,
    {
        let mut ranges: Vec<Option<ValueRange>> = vec![None; field_count];

        for attributes in features {
            for (&position, value) in &attributes {
                if value.is_null() || position >= field_count {
                    continue;
                }
                if let Some(range) = ranges[position].as_mut() {
                    if value.compare(&range.min) == Ordering::Less {
                        range.min = value.clone();
                    }
                    if value.compare(&range.max) == Ordering::Greater {
                        range.max = value.clone();
                    }
                } else {
                    ranges[position] = Some(ValueRange {
                        min: value.clone(),
                        max: value.clone(),
                    });
                }
            }
        }

        self.ranges = ranges;
        self.dirty = false;
        self.fill_count += 1;
    }

    /// Cached range of a column, `None` while dirty or without values
    pub fn range(&self, position: usize) -> Option<&ValueRange> {
        if self.dirty {
            return None;
        }
        self.ranges.get(position).and_then(Option::as_ref)
    }

    pub fn min(&self, position: usize) -> Option<&AttributeValue> {
        self.range(position).map(|r| &r.min)
    }

    pub fn max(&self, position: usize) -> Option<&AttributeValue> {
        self.range(position).map(|r| &r.max)
    }
}

impl Default for MinMaxCache {
    fn default() -> Self {
        Self::new()
    }
}
