use std::collections::HashMap;
use roaring::RoaringBitmap;
use serde_json::Value;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::{DocRef, ShapedValue};
use crate::index::definition::IndexDefinition;
use crate::index::operator::{IndexOperator, RelationOp};
use crate::index::query::{Challenge, ContextData, DocFilter, IndexIterator, QueryContext};
use crate::index::{IndexBase, IndexOps};

/// Enumerated-domain index: one bit column per (attribute, value) pair,
/// plus an "undefined" column per attribute when enabled. Documents occupy
/// slots; a document's bits are set in exactly one column per attribute.
#[derive(Debug)]
pub struct BitarrayIndex {
    base: IndexBase,
    domains: Vec<Vec<ShapedValue>>,
    support_undef: bool,
    columns: Vec<Vec<RoaringBitmap>>,
    docs: Vec<Option<DocRef>>,
    slots: HashMap<String, u32>,
    free: Vec<u32>,
}

impl BitarrayIndex {
    pub fn new(definition: &IndexDefinition) -> Self {
        let domains: Vec<Vec<ShapedValue>> = definition
            .values
            .iter()
            .flatten()
            .map(|domain| domain.iter().cloned().map(ShapedValue).collect())
            .collect();
        let support_undef = definition.undefined.unwrap_or(false);

        let columns = domains
            .iter()
            .map(|domain| vec![RoaringBitmap::new(); domain.len() + usize::from(support_undef)])
            .collect();

        BitarrayIndex {
            base: IndexBase::from_definition(definition),
            domains,
            support_undef,
            columns,
            docs: Vec::new(),
            slots: HashMap::new(),
            free: Vec::new(),
        }
    }

    /// Column holding `value` for attribute number `field`.
    fn column_of(&self, field: usize, value: &Value) -> Option<usize> {
        let shaped = ShapedValue(value.clone());
        match self.domains[field].iter().position(|v| *v == shaped) {
            Some(column) => Some(column),
            None if self.support_undef => Some(self.domains[field].len()),
            None => None,
        }
    }

    /// Candidate slots for an expression of equalities joined by AND/OR.
    /// The result may be a superset; `execute` re-checks each document.
    fn evaluate(&self, op: &IndexOperator) -> Option<RoaringBitmap> {
        match op {
            IndexOperator::Compare { op: RelationOp::Eq, field, value } => {
                let field = self.base.fields.iter().position(|f| f == field)?;
                match self.column_of(field, value) {
                    Some(column) => Some(self.columns[field][column].clone()),
                    // out of domain without an undefined column: no document can match
                    None => Some(RoaringBitmap::new()),
                }
            }
            IndexOperator::And(parts) => parts
                .iter()
                .filter_map(|part| self.evaluate(part))
                .reduce(|acc, bits| acc & bits),
            IndexOperator::Or(parts) => {
                let mut union = RoaringBitmap::new();
                for part in parts {
                    union |= self.evaluate(part)?;
                }
                Some(union)
            }
            _ => None,
        }
    }
}

impl IndexOps for BitarrayIndex {
    fn base(&self) -> &IndexBase {
        &self.base
    }

    fn definition(&self) -> IndexDefinition {
        IndexDefinition {
            values: Some(
                self.domains
                    .iter()
                    .map(|domain| domain.iter().map(|v| v.0.clone()).collect())
                    .collect(),
            ),
            undefined: Some(self.support_undef),
            ..self.base.definition()
        }
    }

    fn insert(&mut self, doc: &DocRef) -> Result<()> {
        let mut columns = Vec::with_capacity(self.base.fields.len());
        for (field, name) in self.base.fields.iter().enumerate() {
            let value = doc.attribute(name).unwrap_or(&Value::Null);
            match self.column_of(field, value) {
                Some(column) => columns.push(column),
                None => {
                    return Err(Error::new(
                        ErrorKind::BitarrayValueUnsupported,
                        format!("value {} of attribute '{}' is not in the index domain", value, name),
                    ));
                }
            }
        }

        let slot = match self.free.pop() {
            Some(slot) => slot,
            None => {
                self.docs.push(None);
                (self.docs.len() - 1) as u32
            }
        };

        for (field, column) in columns.into_iter().enumerate() {
            self.columns[field][column].insert(slot);
        }
        self.docs[slot as usize] = Some(doc.clone());
        self.slots.insert(doc.key.clone(), slot);
        Ok(())
    }

    fn remove(&mut self, doc: &DocRef) -> Result<()> {
        let Some(slot) = self.slots.remove(&doc.key) else {
            return Ok(());
        };

        for column in self.columns.iter_mut().flatten() {
            column.remove(slot);
        }
        self.docs[slot as usize] = None;
        self.free.push(slot);
        Ok(())
    }

    fn challenge(&self, op: &IndexOperator) -> Challenge {
        match self.evaluate(op) {
            Some(bits) => Challenge::usable(
                bits.len().max(1) as f64,
                QueryContext::new(self.base.iid, ContextData::Slots(bits)),
            ),
            None => Challenge::unusable(),
        }
    }

    fn execute<'a>(
        &'a self,
        op: &IndexOperator,
        context: &QueryContext,
        filter: Option<DocFilter<'a>>,
    ) -> Result<IndexIterator<'a>> {
        let ContextData::Slots(bits) = context.check_owner(self.base.iid)? else {
            return Err(Error::internal("bitarray index received a foreign query context"));
        };

        let residual = op.clone();
        let hits: Vec<DocRef> = bits
            .iter()
            .filter_map(|slot| self.docs.get(slot as usize).cloned().flatten())
            .filter(|doc| residual.matches(doc))
            .collect();

        Ok(IndexIterator::new(hits.into_iter(), filter))
    }
}
