//! Secondary structures a collection maintains over its documents.
//!
//! Every index kind implements [`IndexOps`]; the collection keeps them in a
//! flat [`Index`] enum, primary index first. Queries go through three
//! phases: `challenge` (can this index answer the expression, and at what
//! cost), `execute` (lazy document sequence) and `release` (hand the
//! challenge context back, exactly once).

pub mod definition;
pub mod operator;
pub mod query;
pub mod primary;
pub mod edge;
pub mod hash;
pub mod skiplist;
pub mod geo;
pub mod fulltext;
pub mod priority_queue;
pub mod bitarray;
pub mod cap;

use serde_json::Value;
use crate::core::error::Result;
use crate::core::types::{DocRef, Document, IndexId, ShapedValue};

pub use definition::{IndexDefinition, IndexType};
pub use operator::{EdgeDirection, IndexOperator, RelationOp};
pub use query::{Challenge, DocFilter, IndexIterator, QueryContext};

use bitarray::BitarrayIndex;
use cap::CapConstraint;
use edge::EdgeIndex;
use fulltext::FulltextIndex;
use geo::GeoIndex;
use hash::HashIndex;
use primary::PrimaryIndex;
use priority_queue::PriorityQueueIndex;
use skiplist::SkiplistIndex;

/// Attributes shared by every index kind.
#[derive(Debug, Clone)]
pub struct IndexBase {
    pub iid: IndexId,
    pub kind: IndexType,
    pub fields: Vec<String>,
    pub unique: bool,
    pub ignore_null: bool,
}

impl IndexBase {
    pub fn from_definition(definition: &IndexDefinition) -> Self {
        IndexBase {
            iid: definition.id,
            kind: definition.kind,
            fields: definition.fields.clone(),
            unique: definition.unique,
            ignore_null: definition.ignore_null,
        }
    }

    /// Definition carrying only the shared attributes; kinds with extra
    /// options fill in the rest.
    pub fn definition(&self) -> IndexDefinition {
        IndexDefinition {
            id: self.iid,
            kind: self.kind,
            fields: self.fields.clone(),
            unique: self.unique,
            ignore_null: self.ignore_null,
            geo_json: None,
            constraint: None,
            min_length: None,
            index_substrings: None,
            values: None,
            undefined: None,
            size: None,
        }
    }
}

pub trait IndexOps {
    fn base(&self) -> &IndexBase;

    fn definition(&self) -> IndexDefinition {
        self.base().definition()
    }

    fn to_json(&self) -> Value {
        self.definition().to_json()
    }

    /// Adds a document. On error the index is left unchanged.
    fn insert(&mut self, doc: &DocRef) -> Result<()>;

    fn remove(&mut self, doc: &DocRef) -> Result<()>;

    /// Replaces `old` by `doc`. If the new version is rejected the old one
    /// is put back.
    fn update(&mut self, doc: &DocRef, old: &DocRef) -> Result<()> {
        self.remove(old)?;
        if let Err(e) = self.insert(doc) {
            self.insert(old)?;
            return Err(e);
        }
        Ok(())
    }

    fn has_cleanup(&self) -> bool {
        false
    }

    fn cleanup(&mut self) -> Result<()> {
        Ok(())
    }

    fn challenge(&self, _op: &IndexOperator) -> Challenge {
        Challenge::unusable()
    }

    fn execute<'a>(
        &'a self,
        op: &IndexOperator,
        context: &QueryContext,
        filter: Option<DocFilter<'a>>,
    ) -> Result<IndexIterator<'a>>;

    fn release(&self, context: QueryContext) {
        if context.owner != self.base().iid {
            tracing::warn!(index = self.base().iid, owner = context.owner, "released foreign query context");
        }
    }
}

#[derive(Debug)]
pub enum Index {
    Primary(PrimaryIndex),
    Edge(EdgeIndex),
    Hash(HashIndex),
    Skiplist(SkiplistIndex),
    Geo(GeoIndex),
    Fulltext(FulltextIndex),
    PriorityQueue(PriorityQueueIndex),
    Bitarray(BitarrayIndex),
    Cap(CapConstraint),
}

macro_rules! dispatch {
    ($index:expr, $inner:ident => $body:expr) => {
        match $index {
            Index::Primary($inner) => $body,
            Index::Edge($inner) => $body,
            Index::Hash($inner) => $body,
            Index::Skiplist($inner) => $body,
            Index::Geo($inner) => $body,
            Index::Fulltext($inner) => $body,
            Index::PriorityQueue($inner) => $body,
            Index::Bitarray($inner) => $body,
            Index::Cap($inner) => $body,
        }
    };
}

impl Index {
    /// Builds an empty index from a validated definition.
    pub fn create(definition: &IndexDefinition) -> Result<Index> {
        definition.validate()?;

        let index = match definition.kind {
            IndexType::Primary => Index::Primary(PrimaryIndex::new(definition)),
            IndexType::Edge => Index::Edge(EdgeIndex::new(definition)),
            IndexType::Hash => Index::Hash(HashIndex::new(definition)),
            IndexType::Skiplist => Index::Skiplist(SkiplistIndex::new(definition)),
            IndexType::Geo1 | IndexType::Geo2 => Index::Geo(GeoIndex::new(definition)),
            IndexType::Fulltext => Index::Fulltext(FulltextIndex::new(definition)),
            IndexType::PriorityQueue => Index::PriorityQueue(PriorityQueueIndex::new(definition)),
            IndexType::Bitarray => Index::Bitarray(BitarrayIndex::new(definition)),
            IndexType::Cap => Index::Cap(CapConstraint::new(definition)),
        };

        Ok(index)
    }

    pub fn from_json(json: &Value) -> Result<Index> {
        Index::create(&IndexDefinition::from_json(json)?)
    }

    pub fn iid(&self) -> IndexId {
        self.base().iid
    }

    pub fn kind(&self) -> IndexType {
        self.base().kind
    }

    pub fn as_primary(&self) -> Option<&PrimaryIndex> {
        match self {
            Index::Primary(primary) => Some(primary),
            _ => None,
        }
    }

    pub fn as_cap(&self) -> Option<&CapConstraint> {
        match self {
            Index::Cap(cap) => Some(cap),
            _ => None,
        }
    }
}

impl IndexOps for Index {
    fn base(&self) -> &IndexBase {
        dispatch!(self, index => index.base())
    }

    fn definition(&self) -> IndexDefinition {
        dispatch!(self, index => index.definition())
    }

    fn insert(&mut self, doc: &DocRef) -> Result<()> {
        dispatch!(self, index => index.insert(doc))
    }

    fn remove(&mut self, doc: &DocRef) -> Result<()> {
        dispatch!(self, index => index.remove(doc))
    }

    fn update(&mut self, doc: &DocRef, old: &DocRef) -> Result<()> {
        dispatch!(self, index => index.update(doc, old))
    }

    fn has_cleanup(&self) -> bool {
        dispatch!(self, index => index.has_cleanup())
    }

    fn cleanup(&mut self) -> Result<()> {
        dispatch!(self, index => index.cleanup())
    }

    fn challenge(&self, op: &IndexOperator) -> Challenge {
        dispatch!(self, index => index.challenge(op))
    }

    fn execute<'a>(
        &'a self,
        op: &IndexOperator,
        context: &QueryContext,
        filter: Option<DocFilter<'a>>,
    ) -> Result<IndexIterator<'a>> {
        dispatch!(self, index => index.execute(op, context, filter))
    }

    fn release(&self, context: QueryContext) {
        dispatch!(self, index => index.release(context))
    }
}

/// Attribute values of `doc` for `fields`, in field order. Missing
/// attributes read as null; with `ignore_null` such documents yield `None`.
pub(crate) fn extract_values(doc: &Document, fields: &[String], ignore_null: bool) -> Option<Vec<ShapedValue>> {
    let mut values = Vec::with_capacity(fields.len());

    for field in fields {
        match doc.attribute(field) {
            Some(value) if !value.is_null() => values.push(ShapedValue(value.clone())),
            _ if ignore_null => return None,
            _ => values.push(ShapedValue::null()),
        }
    }

    Some(values)
}

/// Equality values for every field, taken from a conjunction of
/// comparisons. `None` unless each field is bound by an `Eq`.
pub(crate) fn equality_lookup(op: &IndexOperator, fields: &[String]) -> Option<Vec<ShapedValue>> {
    let conjuncts = op.conjuncts()?;

    fields
        .iter()
        .map(|field| {
            conjuncts
                .iter()
                .find(|(rel, name, _)| *rel == RelationOp::Eq && name == field)
                .map(|(_, _, value)| ShapedValue((*value).clone()))
        })
        .collect()
}
