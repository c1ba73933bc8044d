use serde::{Serialize, Deserialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use crate::core::error::{Error, ErrorKind, Result};

/// Collection identifier (a tick).
pub type CollectionId = u64;

/// Index identifier (a tick, unique within the database).
pub type IndexId = u64;

/// Stable handle to a stored document, shared by every index of a collection.
pub type DocRef = Arc<Document>;

pub const KEY_ATTRIBUTE: &str = "_key";
pub const REV_ATTRIBUTE: &str = "_rev";
pub const FROM_ATTRIBUTE: &str = "_from";
pub const TO_ATTRIBUTE: &str = "_to";

const MAX_KEY_LENGTH: usize = 254;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum CollectionType {
    #[default]
    Document,
    Edge,
}

impl From<CollectionType> for u32 {
    fn from(kind: CollectionType) -> u32 {
        match kind {
            CollectionType::Document => 2,
            CollectionType::Edge => 3,
        }
    }
}

impl TryFrom<u32> for CollectionType {
    type Error = Error;

    fn try_from(value: u32) -> Result<Self> {
        match value {
            2 => Ok(CollectionType::Document),
            3 => Ok(CollectionType::Edge),
            other => Err(Error::new(
                ErrorKind::UnknownCollectionType,
                format!("unknown collection type {}", other),
            )),
        }
    }
}

/// A stored document: its key, the revision tick it was written with, and
/// the decoded body (which carries `_key`, `_rev` and, for edges, `_from`
/// and `_to`).
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub key: String,
    pub rid: u64,
    pub body: Value,
}

impl Document {
    pub fn new(key: String, rid: u64, mut body: Value) -> Self {
        if let Value::Object(map) = &mut body {
            map.insert(KEY_ATTRIBUTE.to_string(), Value::String(key.clone()));
            map.insert(REV_ATTRIBUTE.to_string(), Value::String(rid.to_string()));
        }

        Document { key, rid, body }
    }

    /// Decoded value at a dotted attribute path, e.g. `address.city`.
    pub fn attribute(&self, path: &str) -> Option<&Value> {
        lookup_path(&self.body, path)
    }

    pub fn edge_from(&self) -> Option<&str> {
        self.attribute(FROM_ATTRIBUTE).and_then(Value::as_str)
    }

    pub fn edge_to(&self) -> Option<&str> {
        self.attribute(TO_ATTRIBUTE).and_then(Value::as_str)
    }
}

pub fn lookup_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(value, |current, part| current.as_object()?.get(part))
}

pub fn check_document_key(key: &str) -> Result<()> {
    let allowed = |c: char| c.is_ascii_alphanumeric() || "_-:.@()+,=;$!*'%".contains(c);

    if key.is_empty() || key.len() > MAX_KEY_LENGTH || !key.chars().all(allowed) {
        return Err(Error::new(ErrorKind::DocumentKeyBad, format!("illegal document key '{}'", key)));
    }

    Ok(())
}

/// A document attribute value with a total order, equality and hash, so it
/// can serve as an index key.
///
/// Order across types: null < bool < number < string < array < object.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShapedValue(pub Value);

impl ShapedValue {
    pub fn null() -> Self {
        ShapedValue(Value::Null)
    }

    pub fn is_null(&self) -> bool {
        self.0.is_null()
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }
}

impl From<Value> for ShapedValue {
    fn from(value: Value) -> Self {
        ShapedValue(value)
    }
}

impl fmt::Display for ShapedValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

fn number_of(value: &serde_json::Number) -> f64 {
    let n = value.as_f64().unwrap_or(0.0);
    // -0.0 and 0.0 are the same key
    if n == 0.0 { 0.0 } else { n }
}

pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => number_of(x).total_cmp(&number_of(y)),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => {
            for (left, right) in x.iter().zip(y.iter()) {
                let ord = compare_values(left, right);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        (Value::Object(x), Value::Object(y)) => {
            // serde_json maps iterate in key order
            for ((lk, lv), (rk, rv)) in x.iter().zip(y.iter()) {
                let ord = lk.cmp(rk).then_with(|| compare_values(lv, rv));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

fn hash_value<H: Hasher>(value: &Value, state: &mut H) {
    type_rank(value).hash(state);
    match value {
        Value::Null => {}
        Value::Bool(b) => b.hash(state),
        Value::Number(n) => number_of(n).to_bits().hash(state),
        Value::String(s) => s.hash(state),
        Value::Array(items) => {
            items.len().hash(state);
            for item in items {
                hash_value(item, state);
            }
        }
        Value::Object(map) => {
            map.len().hash(state);
            for (key, item) in map {
                key.hash(state);
                hash_value(item, state);
            }
        }
    }
}

impl PartialEq for ShapedValue {
    fn eq(&self, other: &Self) -> bool {
        compare_values(&self.0, &other.0) == Ordering::Equal
    }
}

impl Eq for ShapedValue {}

impl PartialOrd for ShapedValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ShapedValue {
    fn cmp(&self, other: &Self) -> Ordering {
        compare_values(&self.0, &other.0)
    }
}

impl Hash for ShapedValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        hash_value(&self.0, state)
    }
}
