use std::cmp::Ordering;
use serde_json::Value;
use crate::core::types::{compare_values, Document};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationOp {
    Eq,
    Lt,
    Le,
    Gt,
    Ge,
}

impl RelationOp {
    fn accepts(&self, ord: Ordering) -> bool {
        match self {
            RelationOp::Eq => ord == Ordering::Equal,
            RelationOp::Lt => ord == Ordering::Less,
            RelationOp::Le => ord != Ordering::Greater,
            RelationOp::Gt => ord == Ordering::Greater,
            RelationOp::Ge => ord != Ordering::Less,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeDirection {
    Outbound,
    Inbound,
    Any,
}

/// Query expression handed to indexes by the planner.
#[derive(Debug, Clone, PartialEq)]
pub enum IndexOperator {
    Compare { op: RelationOp, field: String, value: Value },
    And(Vec<IndexOperator>),
    Or(Vec<IndexOperator>),
    Edges { direction: EdgeDirection, vertex: String },
    /// Points within `radius` meters. `fields` names the location
    /// attribute, or the latitude and longitude attributes.
    Within { fields: Vec<String>, latitude: f64, longitude: f64, radius: f64 },
    /// The `limit` points closest to the given location.
    Near { fields: Vec<String>, latitude: f64, longitude: f64, limit: usize },
    /// Comma separated words, all of which must match.
    Fulltext { field: String, query: String },
    /// The `limit` documents with the smallest values of `field`.
    Top { field: String, limit: usize },
}

impl IndexOperator {
    pub fn compare(op: RelationOp, field: &str, value: Value) -> Self {
        IndexOperator::Compare { op, field: field.to_string(), value }
    }

    pub fn eq(field: &str, value: Value) -> Self {
        Self::compare(RelationOp::Eq, field, value)
    }

    pub fn within(fields: &[&str], latitude: f64, longitude: f64, radius: f64) -> Self {
        IndexOperator::Within {
            fields: fields.iter().map(|f| f.to_string()).collect(),
            latitude,
            longitude,
            radius,
        }
    }

    pub fn near(fields: &[&str], latitude: f64, longitude: f64, limit: usize) -> Self {
        IndexOperator::Near {
            fields: fields.iter().map(|f| f.to_string()).collect(),
            latitude,
            longitude,
            limit,
        }
    }

    pub fn top(field: &str, limit: usize) -> Self {
        IndexOperator::Top { field: field.to_string(), limit }
    }

    /// The comparisons of a plain conjunction (a single comparison counts).
    /// `None` for anything else.
    pub fn conjuncts(&self) -> Option<Vec<(RelationOp, &str, &Value)>> {
        match self {
            IndexOperator::Compare { op, field, value } => Some(vec![(*op, field.as_str(), value)]),
            IndexOperator::And(parts) => {
                let mut result = Vec::new();
                for part in parts {
                    result.extend(part.conjuncts()?);
                }
                Some(result)
            }
            _ => None,
        }
    }

    /// Residual check of comparison operators against a document. Operators
    /// that only an index can evaluate accept everything.
    pub fn matches(&self, doc: &Document) -> bool {
        match self {
            IndexOperator::Compare { op, field, value } => {
                let actual = doc.attribute(field).unwrap_or(&Value::Null);
                op.accepts(compare_values(actual, value))
            }
            IndexOperator::And(parts) => parts.iter().all(|part| part.matches(doc)),
            IndexOperator::Or(parts) => parts.iter().any(|part| part.matches(doc)),
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_conjuncts() {
        let op = IndexOperator::And(vec![
            IndexOperator::eq("a", json!(1)),
            IndexOperator::And(vec![IndexOperator::compare(RelationOp::Lt, "b", json!(5))]),
        ]);

        let parts = op.conjuncts().unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[1].0, RelationOp::Lt);

        let or = IndexOperator::Or(vec![IndexOperator::eq("a", json!(1))]);
        assert!(or.conjuncts().is_none());
    }

    #[test]
    fn test_matches() {
        let doc = Document::new("k".into(), 1, json!({"a": 3, "b": "x"}));

        assert!(IndexOperator::compare(RelationOp::Ge, "a", json!(3)).matches(&doc));
        assert!(!IndexOperator::compare(RelationOp::Gt, "a", json!(3)).matches(&doc));
        assert!(IndexOperator::eq("missing", json!(null)).matches(&doc));
        assert!(IndexOperator::Or(vec![
            IndexOperator::eq("a", json!(1)),
            IndexOperator::eq("b", json!("x")),
        ])
        .matches(&doc));
    }
}
