use std::collections::HashSet;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::{IndexId, FROM_ATTRIBUTE, KEY_ATTRIBUTE, TO_ATTRIBUTE};

pub const DEFAULT_FULLTEXT_MIN_LENGTH: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexType {
    Primary,
    Edge,
    Hash,
    Skiplist,
    Geo1,
    Geo2,
    Fulltext,
    PriorityQueue,
    Bitarray,
    Cap,
}

impl IndexType {
    pub fn name(&self) -> &'static str {
        match self {
            IndexType::Primary => "primary",
            IndexType::Edge => "edge",
            IndexType::Hash => "hash",
            IndexType::Skiplist => "skiplist",
            IndexType::Geo1 => "geo1",
            IndexType::Geo2 => "geo2",
            IndexType::Fulltext => "fulltext",
            IndexType::PriorityQueue => "priorityqueue",
            IndexType::Bitarray => "bitarray",
            IndexType::Cap => "cap",
        }
    }
}

/// Serialized form of an index: what `to_json` produces and what the index
/// is rebuilt from when a collection is opened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexDefinition {
    #[serde(with = "index_id")]
    pub id: IndexId,
    #[serde(rename = "type")]
    pub kind: IndexType,
    #[serde(default)]
    pub fields: Vec<String>,
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    pub ignore_null: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geo_json: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constraint: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_substrings: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<Vec<Value>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub undefined: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<usize>,
}

impl IndexDefinition {
    fn base(kind: IndexType, fields: Vec<String>) -> Self {
        IndexDefinition {
            id: 0,
            kind,
            fields,
            unique: false,
            ignore_null: false,
            geo_json: None,
            constraint: None,
            min_length: None,
            index_substrings: None,
            values: None,
            undefined: None,
            size: None,
        }
    }

    pub fn primary() -> Self {
        IndexDefinition {
            unique: true,
            ..Self::base(IndexType::Primary, vec![KEY_ATTRIBUTE.to_string()])
        }
    }

    pub fn edge() -> Self {
        Self::base(IndexType::Edge, vec![FROM_ATTRIBUTE.to_string(), TO_ATTRIBUTE.to_string()])
    }

    pub fn hash(fields: &[&str], unique: bool, ignore_null: bool) -> Self {
        IndexDefinition {
            unique,
            ignore_null,
            ..Self::base(IndexType::Hash, to_strings(fields))
        }
    }

    pub fn skiplist(fields: &[&str], unique: bool) -> Self {
        IndexDefinition {
            unique,
            ..Self::base(IndexType::Skiplist, to_strings(fields))
        }
    }

    pub fn geo1(location: &str, geo_json: bool, constraint: bool, ignore_null: bool) -> Self {
        IndexDefinition {
            ignore_null,
            geo_json: Some(geo_json),
            constraint: Some(constraint),
            ..Self::base(IndexType::Geo1, vec![location.to_string()])
        }
    }

    pub fn geo2(latitude: &str, longitude: &str, constraint: bool, ignore_null: bool) -> Self {
        IndexDefinition {
            ignore_null,
            constraint: Some(constraint),
            ..Self::base(IndexType::Geo2, vec![latitude.to_string(), longitude.to_string()])
        }
    }

    pub fn fulltext(field: &str, min_length: usize, index_substrings: bool) -> Self {
        IndexDefinition {
            min_length: Some(min_length),
            index_substrings: Some(index_substrings),
            ..Self::base(IndexType::Fulltext, vec![field.to_string()])
        }
    }

    pub fn priority_queue(field: &str) -> Self {
        Self::base(IndexType::PriorityQueue, vec![field.to_string()])
    }

    pub fn bitarray(fields: &[&str], values: Vec<Vec<Value>>, undefined: bool) -> Self {
        IndexDefinition {
            values: Some(values),
            undefined: Some(undefined),
            ..Self::base(IndexType::Bitarray, to_strings(fields))
        }
    }

    pub fn cap(size: usize) -> Self {
        IndexDefinition {
            size: Some(size),
            ..Self::base(IndexType::Cap, Vec::new())
        }
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    pub fn from_json(json: &Value) -> Result<Self> {
        let definition: IndexDefinition = serde_json::from_value(json.clone())?;
        definition.validate()?;
        Ok(definition)
    }

    /// Same index apart from its id.
    pub fn same_as(&self, other: &IndexDefinition) -> bool {
        IndexDefinition { id: other.id, ..self.clone() } == *other
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: &str| {
            Err(Error::new(
                ErrorKind::InvalidArgument,
                format!("invalid {} index definition: {}", self.kind.name(), reason),
            ))
        };

        let distinct: HashSet<&String> = self.fields.iter().collect();
        if distinct.len() != self.fields.len() || self.fields.iter().any(|f| f.is_empty()) {
            return invalid("duplicate or empty attribute");
        }

        let field_count = self.fields.len();
        match self.kind {
            IndexType::Primary if self.fields != [KEY_ATTRIBUTE] => invalid("must cover _key"),
            IndexType::Edge if self.fields != [FROM_ATTRIBUTE, TO_ATTRIBUTE] => invalid("must cover _from and _to"),
            IndexType::Hash | IndexType::Skiplist if field_count == 0 => invalid("no attributes"),
            IndexType::Geo1 if field_count != 1 => invalid("expects one location attribute"),
            IndexType::Geo2 if field_count != 2 => invalid("expects latitude and longitude attributes"),
            IndexType::Fulltext if field_count != 1 => invalid("expects one attribute"),
            IndexType::Fulltext if self.min_length == Some(0) => invalid("minLength must be positive"),
            IndexType::PriorityQueue if field_count != 1 => invalid("expects one attribute"),
            IndexType::Bitarray => match &self.values {
                Some(values) if field_count > 0 && values.len() == field_count => {
                    if values.iter().any(|domain| domain.is_empty()) {
                        invalid("empty value list")
                    } else if self.unique {
                        invalid("cannot be unique")
                    } else {
                        Ok(())
                    }
                }
                _ => invalid("one value list per attribute required"),
            },
            IndexType::Cap => match self.size {
                Some(size) if size > 0 && field_count == 0 => Ok(()),
                _ => invalid("positive size required"),
            },
            IndexType::PriorityQueue | IndexType::Geo1 | IndexType::Geo2 | IndexType::Fulltext
                if self.unique =>
            {
                invalid("cannot be unique")
            }
            _ => Ok(()),
        }
    }
}

fn to_strings(fields: &[&str]) -> Vec<String> {
    fields.iter().map(|f| f.to_string()).collect()
}

/// Index ids travel as strings; numbers are accepted on input.
mod index_id {
    use serde::{Deserialize, Deserializer, Serializer};
    use serde::de::Error;

    pub fn serialize<S: Serializer>(id: &u64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&id.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Number(u64),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Text(text) => text.parse().map_err(D::Error::custom),
            Raw::Number(number) => Ok(number),
        }
    }
}
