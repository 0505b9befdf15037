//! Documents and their metadata sidecars.
//!
//! Every content object `K` in the store may have a sidecar object at
//! `K.metadata.json`. The sidecar holds free-form attributes (`summary`,
//! `categories`, `tags`) plus the system-added `source_type` and
//! `created_at`, wrapped in a `metadataAttributes` envelope so that index
//! engines which understand that layout can read it directly.
//!
//! # Invariants
//!
//! - A sidecar lives and dies with its document: writes and deletes always
//!   address both keys.
//! - Reading never fails a caller: a missing or corrupt sidecar degrades to
//!   empty [`Metadata`] at the loader level.

use std::borrow::Cow;
use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Fixed suffix appended to a content key to address its sidecar.
pub const SIDECAR_SUFFIX: &str = ".metadata.json";

/// Envelope field some index engines expect around the attributes.
pub const ENVELOPE_KEY: &str = "metadataAttributes";

/// Sidecar key for a content key.
#[must_use]
pub fn sidecar_key(key: &str) -> String {
    format!("{key}{SIDECAR_SUFFIX}")
}

/// Returns `true` when `key` addresses a sidecar rather than content.
#[must_use]
pub fn is_sidecar_key(key: &str) -> bool {
    key.ends_with(SIDECAR_SUFFIX)
}

/// Derive the `source_type` tag from a filename: its lower-cased extension,
/// or `unknown` when it has none.
#[must_use]
pub fn source_type_for(filename: &str) -> String {
    match filename.rsplit_once('.') {
        Some((_, ext)) => ext.to_lowercase(),
        None => "unknown".to_string(),
    }
}

// ---------------------------------------------------------------------------
// Metadata
// ---------------------------------------------------------------------------

/// A single metadata attribute: a plain string or a list of strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaValue {
    Text(String),
    List(Vec<String>),
}

impl MetaValue {
    /// Flatten to the sidecar's string form (`a,b,c` for lists).
    #[must_use]
    pub fn joined(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::List(items) => items.join(","),
        }
    }

    /// Expand to individual values. Text values are split on commas since
    /// sidecars store lists flattened.
    #[must_use]
    pub fn values(&self) -> Vec<String> {
        match self {
            Self::Text(s) => s
                .split(',')
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(ToOwned::to_owned)
                .collect(),
            Self::List(items) => items
                .iter()
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .map(ToOwned::to_owned)
                .collect(),
        }
    }
}

impl From<&str> for MetaValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for MetaValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Vec<String>> for MetaValue {
    fn from(value: Vec<String>) -> Self {
        Self::List(value)
    }
}

/// Ordered attribute map attached to a document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metadata(BTreeMap<String, MetaValue>);

impl Metadata {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&MetaValue> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<MetaValue>) {
        self.0.insert(key.into(), value.into());
    }

    /// Builder-style insert, handy for constructing fixtures and oracle output.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<MetaValue>) -> Self {
        self.insert(key, value);
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &MetaValue)> {
        self.0.iter()
    }

    /// All values for a list-like attribute (`categories`, `tags`), whether
    /// stored as a list or as a comma-separated string.
    #[must_use]
    pub fn values_of(&self, key: &str) -> Vec<String> {
        self.0.get(key).map(MetaValue::values).unwrap_or_default()
    }

    /// The `summary` attribute, if present and non-empty.
    #[must_use]
    pub fn summary(&self) -> Option<String> {
        self.0
            .get("summary")
            .map(MetaValue::joined)
            .filter(|s| !s.trim().is_empty())
    }

    /// Build metadata from a JSON object, stringifying scalars.
    ///
    /// Accepts both the flat layout (`"tags": "a,b"`) and the typed attribute
    /// layout (`"tags": {"value": {"type": "STRING", "stringValue": "a,b"}}`).
    /// Nulls and unrecognised nested objects are dropped.
    #[must_use]
    pub fn from_json_object(object: &Map<String, Value>) -> Self {
        let mut out = Self::new();
        for (key, value) in object {
            if let Some(meta) = meta_value_from_json(value) {
                out.insert(key.clone(), meta);
            }
        }
        out
    }
}

impl FromIterator<(String, MetaValue)> for Metadata {
    fn from_iter<I: IntoIterator<Item = (String, MetaValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn meta_value_from_json(value: &Value) -> Option<MetaValue> {
    match value {
        Value::Array(items) => Some(MetaValue::List(
            items.iter().filter_map(scalar_to_string).collect(),
        )),
        Value::Object(typed) => {
            let inner = typed.get("value")?.as_object()?;
            ["stringValue", "numberValue", "booleanValue"]
                .iter()
                .find_map(|field| inner.get(*field).and_then(scalar_to_string))
                .map(MetaValue::Text)
        }
        other => scalar_to_string(other).map(MetaValue::Text),
    }
}

// ---------------------------------------------------------------------------
// Sidecar codec
// ---------------------------------------------------------------------------

/// Errors decoding a sidecar object.
#[derive(Debug, thiserror::Error)]
pub enum SidecarError {
    #[error("sidecar is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("sidecar root must be a JSON object")]
    NotAnObject,
}

/// Decode sidecar bytes into [`Metadata`], unwrapping the
/// `metadataAttributes` envelope when present.
///
/// # Errors
///
/// Returns [`SidecarError`] when the bytes are not a JSON object.
pub fn decode_sidecar(bytes: &[u8]) -> Result<Metadata, SidecarError> {
    let root: Value = serde_json::from_slice(bytes)?;
    let Value::Object(root) = root else {
        return Err(SidecarError::NotAnObject);
    };

    match root.get(ENVELOPE_KEY) {
        Some(Value::Object(attributes)) => Ok(Metadata::from_json_object(attributes)),
        _ => Ok(Metadata::from_json_object(&root)),
    }
}

/// Encode metadata as an enveloped sidecar.
///
/// List values are flattened to comma-separated strings and empty values are
/// skipped, since index engines reject empty attributes. `source_type` and
/// `created_at` are always appended last and win over caller-supplied keys.
///
/// # Errors
///
/// Returns an error only if JSON serialization fails.
pub fn encode_sidecar(
    metadata: &Metadata,
    source_type: &str,
    created_at: DateTime<Utc>,
) -> Result<Vec<u8>, serde_json::Error> {
    let mut attributes = Map::new();
    for (key, value) in metadata.iter() {
        let flat = value.joined();
        if !flat.is_empty() {
            attributes.insert(key.clone(), Value::String(flat));
        }
    }
    attributes.insert(
        "source_type".to_string(),
        Value::String(source_type.to_string()),
    );
    attributes.insert(
        "created_at".to_string(),
        Value::String(created_at.to_rfc3339_opts(SecondsFormat::Micros, true)),
    );

    let mut envelope = Map::new();
    envelope.insert(ENVELOPE_KEY.to_string(), Value::Object(attributes));
    serde_json::to_vec_pretty(&Value::Object(envelope))
}

// ---------------------------------------------------------------------------
// Document
// ---------------------------------------------------------------------------

/// A content object loaded from the store, paired with its sidecar metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub key: String,
    pub content: Vec<u8>,
    pub metadata: Metadata,
}

impl Document {
    #[must_use]
    pub fn new(key: impl Into<String>, content: impl Into<Vec<u8>>, metadata: Metadata) -> Self {
        Self {
            key: key.into(),
            content: content.into(),
            metadata,
        }
    }

    /// Content as text, replacing invalid UTF-8 sequences.
    #[must_use]
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.content)
    }

    /// Last path segment of the key.
    #[must_use]
    pub fn base_filename(&self) -> &str {
        self.key.rsplit('/').next().unwrap_or(&self.key)
    }
}
