use std::collections::HashMap;
use crate::core::error::{Error, Result};
use crate::core::types::{DocRef, ShapedValue};
use crate::index::definition::IndexDefinition;
use crate::index::operator::IndexOperator;
use crate::index::query::{Challenge, ContextData, DocFilter, IndexIterator, QueryContext};
use crate::index::{equality_lookup, extract_values, IndexBase, IndexOps};

/// Exact match over an ordered tuple of attributes.
#[derive(Debug)]
pub struct HashIndex {
    base: IndexBase,
    buckets: HashMap<Vec<ShapedValue>, Vec<DocRef>>,
}

impl HashIndex {
    pub fn new(definition: &IndexDefinition) -> Self {
        HashIndex {
            base: IndexBase::from_definition(definition),
            buckets: HashMap::new(),
        }
    }
}

impl IndexOps for HashIndex {
    fn base(&self) -> &IndexBase {
        &self.base
    }

    fn insert(&mut self, doc: &DocRef) -> Result<()> {
        let Some(key) = extract_values(doc, &self.base.fields, self.base.ignore_null) else {
            return Ok(());
        };

        if self.base.unique {
            let taken = self
                .buckets
                .get(&key)
                .is_some_and(|bucket| bucket.iter().any(|other| other.key != doc.key));
            if taken {
                return Err(Error::unique_violated(self.base.iid));
            }
        }

        self.buckets.entry(key).or_default().push(doc.clone());
        Ok(())
    }

    fn remove(&mut self, doc: &DocRef) -> Result<()> {
        let Some(key) = extract_values(doc, &self.base.fields, self.base.ignore_null) else {
            return Ok(());
        };

        if let Some(bucket) = self.buckets.get_mut(&key) {
            bucket.retain(|other| other.key != doc.key);
            if bucket.is_empty() {
                self.buckets.remove(&key);
            }
        }
        Ok(())
    }

    fn challenge(&self, op: &IndexOperator) -> Challenge {
        let Some(key) = equality_lookup(op, &self.base.fields) else {
            return Challenge::unusable();
        };

        // null tuples were never indexed
        if self.base.ignore_null && key.iter().any(ShapedValue::is_null) {
            return Challenge::unusable();
        }

        let hits = self.buckets.get(&key).map_or(0, Vec::len);
        Challenge::usable(
            hits.max(1) as f64,
            QueryContext::new(self.base.iid, ContextData::Lookup(key)),
        )
    }

    fn execute<'a>(
        &'a self,
        op: &IndexOperator,
        context: &QueryContext,
        filter: Option<DocFilter<'a>>,
    ) -> Result<IndexIterator<'a>> {
        let ContextData::Lookup(key) = context.check_owner(self.base.iid)? else {
            return Err(Error::internal("hash index received a foreign query context"));
        };

        let residual = op.clone();
        let hits = self
            .buckets
            .get(key)
            .into_iter()
            .flatten()
            .filter(move |doc| residual.matches(doc))
            .cloned();

        Ok(IndexIterator::new(hits, filter))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ErrorKind;
    use crate::core::types::Document;
    use serde_json::{json, Value};
    use std::sync::Arc;

    fn doc(key: &str, body: Value) -> DocRef {
        Arc::new(Document::new(key.to_string(), 1, body))
    }

    fn lookup(index: &HashIndex, op: IndexOperator) -> Vec<String> {
        let challenge = index.challenge(&op);
        assert!(challenge.usable);
        let context = challenge.context.unwrap();
        let mut keys: Vec<_> = index.execute(&op, &context, None).unwrap().map(|d| d.key.clone()).collect();
        index.release(context);
        keys.sort();
        keys
    }

    #[test]
    fn test_unique_violation_leaves_index_unchanged() {
        let mut index = HashIndex::new(&IndexDefinition::hash(&["email"], true, false));
        index.insert(&doc("a", json!({"email": "x@y"}))).unwrap();

        let err = index.insert(&doc("b", json!({"email": "x@y"}))).unwrap_err();
        assert!(err.is(ErrorKind::UniqueConstraintViolated));

        assert_eq!(lookup(&index, IndexOperator::eq("email", json!("x@y"))), vec!["a"]);
        assert_eq!(index.buckets.len(), 1);
    }

    #[test]
    fn test_multi_attribute_lookup() {
        let mut index = HashIndex::new(&IndexDefinition::hash(&["a", "b"], false, false));
        index.insert(&doc("1", json!({"a": 1, "b": "x"}))).unwrap();
        index.insert(&doc("2", json!({"a": 1, "b": "x"}))).unwrap();
        index.insert(&doc("3", json!({"a": 1, "b": "y"}))).unwrap();

        let op = IndexOperator::And(vec![IndexOperator::eq("a", json!(1)), IndexOperator::eq("b", json!("x"))]);
        assert_eq!(lookup(&index, op), vec!["1", "2"]);

        // partial coverage is not enough
        assert!(!index.challenge(&IndexOperator::eq("a", json!(1))).usable);
    }

    #[test]
    fn test_null_placeholder_and_ignore_null() {
        let mut dense = HashIndex::new(&IndexDefinition::hash(&["a"], false, false));
        let mut sparse = HashIndex::new(&IndexDefinition::hash(&["a"], false, true));
        let missing = doc("m", json!({"other": 1}));

        dense.insert(&missing).unwrap();
        sparse.insert(&missing).unwrap();

        assert_eq!(lookup(&dense, IndexOperator::eq("a", json!(null))), vec!["m"]);
        assert!(sparse.buckets.is_empty());
        assert!(!sparse.challenge(&IndexOperator::eq("a", json!(null))).usable);
    }

    #[test]
    fn test_remove() {
        let mut index = HashIndex::new(&IndexDefinition::hash(&["a"], false, false));
        let d = doc("1", json!({"a": 5}));
        index.insert(&d).unwrap();
        index.remove(&d).unwrap();

        assert!(index.buckets.is_empty());
    }
}
