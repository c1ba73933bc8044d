use std::ops::Bound;
use roaring::RoaringBitmap;
use crate::core::error::{Error, Result};
use crate::core::types::{DocRef, Document, IndexId, ShapedValue};
use crate::index::fulltext::FulltextTerm;
use crate::index::operator::EdgeDirection;
use crate::index::skiplist::KeyPart;

/// Caller supplied predicate applied to every document an index yields.
pub type DocFilter<'a> = &'a dyn Fn(&Document) -> bool;

/// Result of the challenge phase.
///
/// A usable challenge carries the context that must be handed back to
/// `release` once the query is done.
#[derive(Debug)]
pub struct Challenge {
    pub usable: bool,
    /// Estimated cost; lower is better.
    pub cost: f64,
    pub context: Option<QueryContext>,
}

impl Challenge {
    pub fn usable(cost: f64, context: QueryContext) -> Self {
        Challenge { usable: true, cost, context: Some(context) }
    }

    pub fn unusable() -> Self {
        Challenge { usable: false, cost: f64::INFINITY, context: None }
    }
}

/// Index specific state computed during the challenge and reused by
/// `execute`. Opaque to the planner.
#[derive(Debug)]
pub struct QueryContext {
    pub(crate) owner: IndexId,
    pub(crate) data: ContextData,
}

#[derive(Debug)]
pub(crate) enum ContextData {
    Key(String),
    Lookup(Vec<ShapedValue>),
    Range { lower: Vec<KeyPart>, upper: Bound<Vec<KeyPart>> },
    Edges { direction: EdgeDirection, vertex: String },
    Within { latitude: f64, longitude: f64, radius: f64 },
    Near { latitude: f64, longitude: f64, limit: usize },
    Terms(Vec<FulltextTerm>),
    Top(usize),
    Slots(RoaringBitmap),
}

impl QueryContext {
    pub(crate) fn new(owner: IndexId, data: ContextData) -> Self {
        QueryContext { owner, data }
    }

    pub(crate) fn check_owner(&self, iid: IndexId) -> Result<&ContextData> {
        if self.owner != iid {
            return Err(Error::internal(format!(
                "query context of index {} used with index {}",
                self.owner, iid
            )));
        }
        Ok(&self.data)
    }
}

/// Lazy, forward-only sequence of matching documents.
pub struct IndexIterator<'a> {
    inner: Box<dyn Iterator<Item = DocRef> + 'a>,
    filter: Option<DocFilter<'a>>,
}

impl<'a> IndexIterator<'a> {
    pub fn new(inner: impl Iterator<Item = DocRef> + 'a, filter: Option<DocFilter<'a>>) -> Self {
        IndexIterator { inner: Box::new(inner), filter }
    }

    /// At most `limit` documents, counted after the filter.
    pub fn limited(
        inner: impl Iterator<Item = DocRef> + 'a,
        filter: Option<DocFilter<'a>>,
        limit: usize,
    ) -> Self {
        let passing = inner.filter(move |doc| filter.is_none_or(|f| f(doc)));
        IndexIterator { inner: Box::new(passing.take(limit)), filter: None }
    }

    pub fn empty() -> Self {
        IndexIterator { inner: Box::new(std::iter::empty()), filter: None }
    }
}

impl Iterator for IndexIterator<'_> {
    type Item = DocRef;

    fn next(&mut self) -> Option<DocRef> {
        loop {
            let doc = self.inner.next()?;
            match self.filter {
                Some(filter) if !filter(&doc) => continue,
                _ => return Some(doc),
            }
        }
    }
}
