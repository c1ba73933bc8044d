use std::collections::VecDeque;
use crate::core::error::{Error, Result};
use crate::core::types::DocRef;
use crate::index::definition::IndexDefinition;
use crate::index::operator::IndexOperator;
use crate::index::query::{DocFilter, IndexIterator, QueryContext};
use crate::index::{IndexBase, IndexOps};

/// Bounds a collection to `size` documents. Tracks insertion order; the
/// collection evicts what [`CapConstraint::overflow`] reports after every
/// insert. Never answers queries.
#[derive(Debug)]
pub struct CapConstraint {
    base: IndexBase,
    size: usize,
    order: VecDeque<DocRef>,
}

impl CapConstraint {
    pub fn new(definition: &IndexDefinition) -> Self {
        CapConstraint {
            base: IndexBase::from_definition(definition),
            size: definition.size.unwrap_or(usize::MAX),
            order: VecDeque::new(),
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// The oldest documents that must go so that `live_count` drops to the
    /// ceiling.
    pub fn overflow(&self, live_count: usize) -> Vec<DocRef> {
        let excess = live_count.saturating_sub(self.size);
        self.order.iter().take(excess).cloned().collect()
    }
}

impl IndexOps for CapConstraint {
    fn base(&self) -> &IndexBase {
        &self.base
    }

    fn definition(&self) -> IndexDefinition {
        IndexDefinition {
            size: Some(self.size),
            ..self.base.definition()
        }
    }

    fn insert(&mut self, doc: &DocRef) -> Result<()> {
        self.order.push_back(doc.clone());
        Ok(())
    }

    fn remove(&mut self, doc: &DocRef) -> Result<()> {
        if let Some(position) = self.order.iter().position(|other| other.key == doc.key) {
            self.order.remove(position);
        }
        Ok(())
    }

    /// Updates keep the document's age.
    fn update(&mut self, doc: &DocRef, old: &DocRef) -> Result<()> {
        match self.order.iter_mut().find(|other| other.key == old.key) {
            Some(slot) => *slot = doc.clone(),
            None => self.order.push_back(doc.clone()),
        }
        Ok(())
    }

    fn has_cleanup(&self) -> bool {
        true
    }

    fn cleanup(&mut self) -> Result<()> {
        self.order.shrink_to_fit();
        Ok(())
    }

    fn execute<'a>(
        &'a self,
        _op: &IndexOperator,
        _context: &QueryContext,
        _filter: Option<DocFilter<'a>>,
    ) -> Result<IndexIterator<'a>> {
        Err(Error::internal("cap constraint cannot answer queries"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Document;
    use serde_json::json;
    use std::sync::Arc;

    fn doc(key: &str) -> DocRef {
        Arc::new(Document::new(key.to_string(), 1, json!({})))
    }

    #[test]
    fn test_overflow_reports_oldest() {
        let mut cap = CapConstraint::new(&IndexDefinition::cap(3));
        for key in ["a", "b", "c", "d", "e"] {
            cap.insert(&doc(key)).unwrap();
        }

        let evicted: Vec<_> = cap.overflow(5).iter().map(|d| d.key.clone()).collect();
        assert_eq!(evicted, vec!["a", "b"]);
        assert!(cap.overflow(3).is_empty());
    }

    #[test]
    fn test_update_keeps_position() {
        let mut cap = CapConstraint::new(&IndexDefinition::cap(1));
        let a = doc("a");
        cap.insert(&a).unwrap();
        cap.insert(&doc("b")).unwrap();
        cap.update(&doc("a"), &a).unwrap();

        assert_eq!(cap.overflow(2)[0].key, "a");
    }

    #[test]
    fn test_not_queryable() {
        let cap = CapConstraint::new(&IndexDefinition::cap(1));
        assert!(!cap.challenge(&IndexOperator::top("a", 1)).usable);
    }
}
