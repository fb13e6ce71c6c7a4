//! Attribute values, fields and features

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::geometry::Point;

/// Stable feature identifier
pub type FeatureId = u64;

/// Attribute values keyed by field position
pub type AttributeMap = BTreeMap<usize, AttributeValue>;

/// Semantic type of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldType {
    Integer,
    Real,
    Text,
}

impl FieldType {
    /// Whether values of this type compare numerically
    pub fn is_numeric(&self) -> bool {
        matches!(self, FieldType::Integer | FieldType::Real)
    }

    pub fn name(&self) -> &'static str {
        match self {
            FieldType::Integer => "integer",
            FieldType::Real => "real",
            FieldType::Text => "text",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A named, typed column of a feature source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub field_type: FieldType,
    pub nullable: bool,
}

impl Field {
    pub fn new(name: impl Into<String>, field_type: FieldType, nullable: bool) -> Self {
        Self {
            name: name.into(),
            field_type,
            nullable,
        }
    }
}

/// A single attribute value
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    #[default]
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl AttributeValue {
    /// Convert raw text into a value of the given type.
    ///
    /// Text that does not parse as the column type becomes `Null`.
    pub fn parse_as(field_type: FieldType, raw: &str) -> Self {
        match field_type {
            FieldType::Integer => raw.parse::<i64>().map(AttributeValue::Integer).unwrap_or(AttributeValue::Null),
            FieldType::Real => raw.parse::<f64>().map(AttributeValue::Real).unwrap_or(AttributeValue::Null),
            FieldType::Text => AttributeValue::Text(raw.to_string()),
        }
    }

    /// Strict variant of [`parse_as`](Self::parse_as) for user input.
    ///
    /// Empty text is `Null`; text that does not fit the type is rejected.
    pub fn try_parse_as(field_type: FieldType, raw: &str) -> Option<Self> {
        if raw.is_empty() {
            return Some(AttributeValue::Null);
        }
        match Self::parse_as(field_type, raw) {
            AttributeValue::Null => None,
            value => Some(value),
        }
    }

    /// Fit a value into a column of the given type.
    ///
    /// Integers widen to reals, anything renders into text and text is
    /// parsed strictly into numbers. `None` when the value does not fit.
    pub fn coerce_to(self, field_type: FieldType) -> Option<Self> {
        use AttributeValue::*;

        match (field_type, self) {
            (_, Null) => Some(Null),
            (FieldType::Integer, Integer(v)) => Some(Integer(v)),
            (FieldType::Integer, Real(_)) => None,
            (FieldType::Real, Integer(v)) => Some(Real(v as f64)),
            (FieldType::Real, Real(v)) => Some(Real(v)),
            (FieldType::Text, Text(s)) => Some(Text(s)),
            (FieldType::Text, value) => Some(Text(value.to_string())),
            (numeric, Text(s)) => Self::try_parse_as(numeric, s.trim()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, AttributeValue::Null)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, AttributeValue::Integer(_) | AttributeValue::Real(_))
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttributeValue::Integer(v) => Some(*v as f64),
            AttributeValue::Real(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Type-aware ordering used for sorting and min/max statistics.
    ///
    /// Integers compare as `i64`, any other numeric pair as `f64`, nulls
    /// sort before everything and remaining pairs compare by string form.
    pub fn compare(&self, other: &Self) -> Ordering {
        use AttributeValue::*;

        match (self, other) {
            (Null, Null) => Ordering::Equal,
            (Null, _) => Ordering::Less,
            (_, Null) => Ordering::Greater,
            (Integer(a), Integer(b)) => a.cmp(b),
            (Integer(a), Real(b)) => (*a as f64).total_cmp(b),
            (Real(a), Integer(b)) => a.total_cmp(&(*b as f64)),
            (Real(a), Real(b)) => a.total_cmp(b),
            (Text(a), Text(b)) => a.cmp(b),
            (a, b) => a.to_string().cmp(&b.to_string()),
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Null => f.write_str("NULL"),
            AttributeValue::Integer(v) => write!(f, "{}", v),
            AttributeValue::Real(v) => write!(f, "{}", v),
            AttributeValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for AttributeValue {
    fn from(v: i64) -> Self {
        AttributeValue::Integer(v)
    }
}

impl From<f64> for AttributeValue {
    fn from(v: f64) -> Self {
        AttributeValue::Real(v)
    }
}

impl From<&str> for AttributeValue {
    fn from(v: &str) -> Self {
        AttributeValue::Text(v.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(v: String) -> Self {
        AttributeValue::Text(v)
    }
}

/// Which attribute positions a read should materialize
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AttributeSelection {
    /// Geometry and identifier only
    #[default]
    Empty,
    /// Every field
    All,
    /// The listed field positions
    Only(Vec<usize>),
}

impl AttributeSelection {
    pub fn from_flag(fetch_attributes: bool) -> Self {
        if fetch_attributes {
            AttributeSelection::All
        } else {
            AttributeSelection::Empty
        }
    }

    pub fn includes(&self, position: usize) -> bool {
        match self {
            AttributeSelection::Empty => false,
            AttributeSelection::All => true,
            AttributeSelection::Only(positions) => positions.contains(&position),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            AttributeSelection::Empty => true,
            AttributeSelection::All => false,
            AttributeSelection::Only(positions) => positions.is_empty(),
        }
    }
}

/// One parsed record: identifier, point geometry and attributes
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub id: FeatureId,
    pub geometry: Point,
    pub attributes: AttributeMap,
}

impl Feature {
    pub fn new(id: FeatureId, geometry: Point) -> Self {
        Self {
            id,
            geometry,
            attributes: AttributeMap::new(),
        }
    }

    pub fn with_attributes(mut self, attributes: AttributeMap) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn attribute(&self, position: usize) -> Option<&AttributeValue> {
        self.attributes.get(&position)
    }

    pub fn set_attribute(&mut self, position: usize, value: AttributeValue) {
        self.attributes.insert(position, value);
    }
}
