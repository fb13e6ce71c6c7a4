//! Provider configuration and connection-string parsing
//!
//! A provider is opened from a connection string of the form
//! `/path/to/file.txt?delimiter=|&xField=lon&yField=lat`. `nullValue=` adds a
//! null marker and `fieldType=name:integer` pins a column type; both repeat.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::PathBuf;

use dt_core::FieldType;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::null_handling::NullConfig;
use crate::schema::DEFAULT_SAMPLE_SIZE;
use crate::DataError;

const X_FIELD_NAMES: &[&str] = &["x", "lon", "long", "longitude", "easting"];
const Y_FIELD_NAMES: &[&str] = &["y", "lat", "latitude", "northing"];

/// Reference to a column by name or zero-based position
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldRef {
    Name(String),
    Position(usize),
}

impl FieldRef {
    /// Parse a connection string value; plain digits are positions
    pub fn parse(value: &str) -> Self {
        if !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(position) = value.parse() {
                return FieldRef::Position(position);
            }
        }
        FieldRef::Name(value.to_string())
    }

    /// Resolve against the header names
    pub fn resolve(&self, names: &[String]) -> Option<usize> {
        match self {
            FieldRef::Position(position) => (*position < names.len()).then_some(*position),
            FieldRef::Name(name) => names
                .iter()
                .position(|n| n == name)
                .or_else(|| names.iter().position(|n| n.eq_ignore_ascii_case(name))),
        }
    }

    fn to_uri_value(&self) -> String {
        match self {
            FieldRef::Name(name) => percent_encode(name),
            FieldRef::Position(position) => position.to_string(),
        }
    }
}

/// Configuration for a delimited text provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Path to the file
    pub path: PathBuf,

    /// Field delimiter
    pub delimiter: u8,

    /// Column holding X coordinates; auto-detected when unset
    pub x_field: Option<FieldRef>,

    /// Column holding Y coordinates; auto-detected when unset
    pub y_field: Option<FieldRef>,

    /// Whether the first record names the fields
    pub use_header: bool,

    /// Records sampled for type inference, 0 for all
    pub sample_size: usize,

    /// Field type overrides by name
    pub field_types: HashMap<String, FieldType>,

    /// Null handling configuration
    pub null_config: NullConfig,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::new(),
            delimiter: b',',
            x_field: None,
            y_field: None,
            use_header: true,
            sample_size: DEFAULT_SAMPLE_SIZE,
            field_types: HashMap::new(),
            null_config: NullConfig::default(),
        }
    }
}

impl ProviderConfig {
    /// Create a configuration for a path with default settings
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn with_coordinate_fields(mut self, x: FieldRef, y: FieldRef) -> Self {
        self.x_field = Some(x);
        self.y_field = Some(y);
        self
    }

    /// Parse a `path?key=value&...` connection string
    pub fn from_uri(uri: &str) -> Result<Self, DataError> {
        let (path, query) = match uri.split_once('?') {
            Some((path, query)) => (path, query),
            None => (uri, ""),
        };

        if path.trim().is_empty() {
            return Err(DataError::InvalidUri(format!("missing path in '{}'", uri)));
        }

        let mut config = Self::new(path);

        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let (key, raw_value) = pair
                .split_once('=')
                .ok_or_else(|| DataError::InvalidUri(format!("expected key=value, got '{}'", pair)))?;
            let value = percent_decode(raw_value)?;

            match key.to_ascii_lowercase().as_str() {
                "delimiter" => config.delimiter = parse_delimiter(&value)?,
                "xfield" => config.x_field = Some(FieldRef::parse(&value)),
                "yfield" => config.y_field = Some(FieldRef::parse(&value)),
                "useheader" => config.use_header = parse_flag(&value)?,
                "samplesize" => {
                    config.sample_size = value
                        .parse()
                        .map_err(|_| DataError::InvalidUri(format!("invalid sampleSize '{}'", value)))?;
                }
                "nullvalue" => config.null_config.add_pattern(value),
                "fieldtype" => {
                    let (name, field_type) = parse_field_type(&value)?;
                    config.field_types.insert(name, field_type);
                }
                other => debug!("Ignoring unknown connection string key '{}'", other),
            }
        }

        Ok(config)
    }

    /// Render the configuration back into a connection string
    pub fn to_uri(&self) -> String {
        let mut uri = format!("{}?delimiter={}", self.path.display(), encode_delimiter(self.delimiter));

        if let Some(x) = &self.x_field {
            let _ = write!(uri, "&xField={}", x.to_uri_value());
        }
        if let Some(y) = &self.y_field {
            let _ = write!(uri, "&yField={}", y.to_uri_value());
        }
        if !self.use_header {
            uri.push_str("&useHeader=no");
        }
        if self.sample_size != DEFAULT_SAMPLE_SIZE {
            let _ = write!(uri, "&sampleSize={}", self.sample_size);
        }

        let defaults = NullConfig::default();
        for pattern in self.null_config.patterns.iter().filter(|p| !defaults.patterns.contains(p)) {
            let _ = write!(uri, "&nullValue={}", percent_encode(pattern));
        }

        let mut overrides: Vec<_> = self.field_types.iter().collect();
        overrides.sort_by(|a, b| a.0.cmp(b.0));
        for (name, field_type) in overrides {
            let _ = write!(uri, "&fieldType={}", percent_encode(&format!("{}:{}", name, field_type)));
        }

        uri
    }

    /// Get the file name
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
            .to_string()
    }

    /// Resolve the X and Y column positions against the header names
    pub fn resolve_coordinates(&self, names: &[String]) -> Result<(usize, usize), DataError> {
        let x = resolve_axis(self.x_field.as_ref(), X_FIELD_NAMES, names)
            .ok_or_else(|| DataError::MissingCoordinateField(describe(self.x_field.as_ref(), "x")))?;
        let y = resolve_axis(self.y_field.as_ref(), Y_FIELD_NAMES, names)
            .ok_or_else(|| DataError::MissingCoordinateField(describe(self.y_field.as_ref(), "y")))?;
        Ok((x, y))
    }
}

fn resolve_axis(field: Option<&FieldRef>, candidates: &[&str], names: &[String]) -> Option<usize> {
    match field {
        Some(field) => field.resolve(names),
        None => candidates
            .iter()
            .find_map(|candidate| names.iter().position(|n| n.eq_ignore_ascii_case(candidate))),
    }
}

fn describe(field: Option<&FieldRef>, axis: &str) -> String {
    match field {
        Some(FieldRef::Name(name)) => name.clone(),
        Some(FieldRef::Position(position)) => format!("#{}", position),
        None => format!("<auto {}>", axis),
    }
}

fn parse_delimiter(value: &str) -> Result<u8, DataError> {
    match value {
        "\\t" | "\t" | "tab" => return Ok(b'\t'),
        "space" => return Ok(b' '),
        _ => {}
    }

    let mut bytes = value.bytes();
    match (bytes.next(), bytes.next()) {
        (Some(b), None) if b.is_ascii() && b != b'"' && b != b'\n' && b != b'\r' => Ok(b),
        _ => Err(DataError::InvalidUri(format!(
            "delimiter must be a single ASCII character, got '{}'",
            value
        ))),
    }
}

fn encode_delimiter(delimiter: u8) -> String {
    match delimiter {
        b'\t' => "tab".to_string(),
        b' ' => "space".to_string(),
        b => percent_encode(&(b as char).to_string()),
    }
}

/// `name:type`; the name may itself contain colons
fn parse_field_type(value: &str) -> Result<(String, FieldType), DataError> {
    let invalid = || DataError::InvalidUri(format!("expected fieldType=name:type, got '{}'", value));
    let (name, type_name) = value.rsplit_once(':').ok_or_else(invalid)?;
    let field_type = match type_name.to_ascii_lowercase().as_str() {
        "integer" | "int" => FieldType::Integer,
        "real" | "double" => FieldType::Real,
        "text" | "string" => FieldType::Text,
        _ => return Err(invalid()),
    };
    if name.is_empty() {
        return Err(invalid());
    }
    Ok((name.to_string(), field_type))
}

fn parse_flag(value: &str) -> Result<bool, DataError> {
    match value.to_ascii_lowercase().as_str() {
        "yes" | "true" | "1" => Ok(true),
        "no" | "false" | "0" => Ok(false),
        _ => Err(DataError::InvalidUri(format!("expected yes/no, got '{}'", value))),
    }
}

fn percent_decode(value: &str) -> Result<String, DataError> {
    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = value
                .get(i + 1..i + 3)
                .and_then(|h| u8::from_str_radix(h, 16).ok())
                .ok_or_else(|| DataError::InvalidUri(format!("bad percent escape in '{}'", value)))?;
            out.push(hex);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }

    String::from_utf8(out).map_err(|_| DataError::InvalidUri(format!("'{}' is not UTF-8", value)))
}

fn percent_encode(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for b in value.bytes() {
        if b.is_ascii_graphic() && !matches!(b, b'%' | b'&' | b'=' | b'?' | b'#') {
            out.push(b as char);
        } else {
            let _ = write!(out, "%{:02X}", b);
        }
    }
    out
}
