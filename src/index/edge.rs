use std::collections::HashMap;
use crate::core::error::{Error, Result};
use crate::core::types::{DocRef, FROM_ATTRIBUTE, TO_ATTRIBUTE};
use crate::index::definition::IndexDefinition;
use crate::index::operator::{EdgeDirection, IndexOperator, RelationOp};
use crate::index::query::{Challenge, ContextData, DocFilter, IndexIterator, QueryContext};
use crate::index::{IndexBase, IndexOps};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Side {
    From,
    To,
}

/// Vertex to edges, in both directions. An edge is listed under its `_from`
/// vertex and under its `_to` vertex.
#[derive(Debug)]
pub struct EdgeIndex {
    base: IndexBase,
    edges: HashMap<(Side, String), Vec<DocRef>>,
}

impl EdgeIndex {
    pub fn new(definition: &IndexDefinition) -> Self {
        EdgeIndex {
            base: IndexBase::from_definition(definition),
            edges: HashMap::new(),
        }
    }

    fn list(&self, side: Side, vertex: &str) -> &[DocRef] {
        self.edges
            .get(&(side, vertex.to_string()))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    fn unlink(&mut self, side: Side, vertex: &str, key: &str) {
        let slot = (side, vertex.to_string());
        if let Some(list) = self.edges.get_mut(&slot) {
            list.retain(|edge| edge.key != key);
            if list.is_empty() {
                self.edges.remove(&slot);
            }
        }
    }
}

impl IndexOps for EdgeIndex {
    fn base(&self) -> &IndexBase {
        &self.base
    }

    fn insert(&mut self, doc: &DocRef) -> Result<()> {
        let (Some(from), Some(to)) = (doc.edge_from(), doc.edge_to()) else {
            return Ok(());
        };

        self.edges.entry((Side::From, from.to_string())).or_default().push(doc.clone());
        self.edges.entry((Side::To, to.to_string())).or_default().push(doc.clone());
        Ok(())
    }

    fn remove(&mut self, doc: &DocRef) -> Result<()> {
        if let Some(from) = doc.edge_from() {
            self.unlink(Side::From, from, &doc.key);
        }
        if let Some(to) = doc.edge_to() {
            self.unlink(Side::To, to, &doc.key);
        }
        Ok(())
    }

    fn challenge(&self, op: &IndexOperator) -> Challenge {
        let (direction, vertex) = match op {
            IndexOperator::Edges { direction, vertex } => (*direction, vertex.clone()),
            IndexOperator::Compare { op: RelationOp::Eq, field, value } => match (field.as_str(), value.as_str()) {
                (FROM_ATTRIBUTE, Some(vertex)) => (EdgeDirection::Outbound, vertex.to_string()),
                (TO_ATTRIBUTE, Some(vertex)) => (EdgeDirection::Inbound, vertex.to_string()),
                _ => return Challenge::unusable(),
            },
            _ => return Challenge::unusable(),
        };

        let cost = match direction {
            EdgeDirection::Outbound => self.list(Side::From, &vertex).len(),
            EdgeDirection::Inbound => self.list(Side::To, &vertex).len(),
            EdgeDirection::Any => self.list(Side::From, &vertex).len() + self.list(Side::To, &vertex).len(),
        };

        Challenge::usable(
            cost.max(1) as f64,
            QueryContext::new(self.base.iid, ContextData::Edges { direction, vertex }),
        )
    }

    fn execute<'a>(
        &'a self,
        _op: &IndexOperator,
        context: &QueryContext,
        filter: Option<DocFilter<'a>>,
    ) -> Result<IndexIterator<'a>> {
        let ContextData::Edges { direction, vertex } = context.check_owner(self.base.iid)? else {
            return Err(Error::internal("edge index received a foreign query context"));
        };

        let outbound = self.list(Side::From, vertex).iter().cloned();
        let inbound = self.list(Side::To, vertex).iter().cloned();

        let iter = match direction {
            EdgeDirection::Outbound => IndexIterator::new(outbound, filter),
            EdgeDirection::Inbound => IndexIterator::new(inbound, filter),
            EdgeDirection::Any => {
                // self loops are already part of the outbound list
                let vertex = vertex.clone();
                let inbound = inbound.filter(move |edge| edge.edge_from() != Some(vertex.as_str()));
                IndexIterator::new(outbound.chain(inbound), filter)
            }
        };

        Ok(iter)
    }
}
