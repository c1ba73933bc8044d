use std::collections::HashMap;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::{DocRef, KEY_ATTRIBUTE};
use crate::index::definition::IndexDefinition;
use crate::index::operator::{IndexOperator, RelationOp};
use crate::index::query::{Challenge, ContextData, DocFilter, IndexIterator, QueryContext};
use crate::index::{IndexBase, IndexOps};

/// Unique `_key` lookup. Doubles as the collection's document store: every
/// live document is reachable from here.
#[derive(Debug)]
pub struct PrimaryIndex {
    base: IndexBase,
    documents: HashMap<String, DocRef>,
}

impl PrimaryIndex {
    pub fn new(definition: &IndexDefinition) -> Self {
        PrimaryIndex {
            base: IndexBase::from_definition(definition),
            documents: HashMap::new(),
        }
    }

    pub fn lookup(&self, key: &str) -> Option<&DocRef> {
        self.documents.get(key)
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn documents(&self) -> impl Iterator<Item = &DocRef> {
        self.documents.values()
    }

    /// Documents ordered by revision, oldest first.
    pub fn documents_by_revision(&self) -> Vec<DocRef> {
        let mut docs: Vec<DocRef> = self.documents.values().cloned().collect();
        docs.sort_by_key(|doc| doc.rid);
        docs
    }
}

impl IndexOps for PrimaryIndex {
    fn base(&self) -> &IndexBase {
        &self.base
    }

    fn insert(&mut self, doc: &DocRef) -> Result<()> {
        if self.documents.contains_key(&doc.key) {
            return Err(Error::new(
                ErrorKind::UniqueConstraintViolated,
                format!("document key '{}' already exists", doc.key),
            ));
        }

        self.documents.insert(doc.key.clone(), doc.clone());
        Ok(())
    }

    fn remove(&mut self, doc: &DocRef) -> Result<()> {
        match self.documents.remove(&doc.key) {
            Some(_) => Ok(()),
            None => Err(Error::new(
                ErrorKind::DocumentNotFound,
                format!("document '{}' not found", doc.key),
            )),
        }
    }

    fn update(&mut self, doc: &DocRef, old: &DocRef) -> Result<()> {
        if doc.key != old.key {
            return Err(Error::new(ErrorKind::InvalidArgument, "document key cannot change".into()));
        }

        match self.documents.get_mut(&doc.key) {
            Some(slot) => {
                *slot = doc.clone();
                Ok(())
            }
            None => Err(Error::new(
                ErrorKind::DocumentNotFound,
                format!("document '{}' not found", doc.key),
            )),
        }
    }

    fn challenge(&self, op: &IndexOperator) -> Challenge {
        match op {
            IndexOperator::Compare { op: RelationOp::Eq, field, value } if field == KEY_ATTRIBUTE => {
                match value.as_str() {
                    Some(key) => Challenge::usable(
                        1.0,
                        QueryContext::new(self.base.iid, ContextData::Key(key.to_string())),
                    ),
                    None => Challenge::unusable(),
                }
            }
            _ => Challenge::unusable(),
        }
    }

    fn execute<'a>(
        &'a self,
        _op: &IndexOperator,
        context: &QueryContext,
        filter: Option<DocFilter<'a>>,
    ) -> Result<IndexIterator<'a>> {
        match context.check_owner(self.base.iid)? {
            ContextData::Key(key) => Ok(IndexIterator::new(self.documents.get(key).cloned().into_iter(), filter)),
            other => Err(Error::internal(format!("primary index cannot execute {:?}", other))),
        }
    }
}
