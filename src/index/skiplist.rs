use std::collections::BTreeMap;
use std::ops::Bound;
use crate::core::error::{Error, Result};
use crate::core::types::{DocRef, ShapedValue};
use crate::index::definition::IndexDefinition;
use crate::index::operator::{IndexOperator, RelationOp};
use crate::index::query::{Challenge, ContextData, DocFilter, IndexIterator, QueryContext};
use crate::index::{extract_values, IndexBase, IndexOps};

/// One component of a sorted key. The sentinels bracket every real value
/// so open bounds and prefix scans are plain key ranges.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum KeyPart {
    Min,
    Value(ShapedValue),
    Max,
}

/// Ordered index over an attribute tuple: equality on a prefix of the
/// attributes, optionally followed by a range on the next one.
#[derive(Debug)]
pub struct SkiplistIndex {
    base: IndexBase,
    entries: BTreeMap<Vec<KeyPart>, Vec<DocRef>>,
    count: usize,
}

impl SkiplistIndex {
    pub fn new(definition: &IndexDefinition) -> Self {
        SkiplistIndex {
            base: IndexBase::from_definition(definition),
            entries: BTreeMap::new(),
            count: 0,
        }
    }

    fn key_of(&self, doc: &DocRef) -> Option<Vec<KeyPart>> {
        let values = extract_values(doc, &self.base.fields, self.base.ignore_null)?;
        Some(values.into_iter().map(KeyPart::Value).collect())
    }

    /// Key range for a conjunction: an inclusive lower key, the upper bound
    /// and the number of attributes bound by equality. `None` if the first
    /// attribute is not constrained.
    fn bounds(&self, op: &IndexOperator) -> Option<(Vec<KeyPart>, Bound<Vec<KeyPart>>, usize)> {
        let conjuncts = op.conjuncts()?;
        let mut prefix = Vec::new();

        for field in &self.base.fields {
            let on_field: Vec<_> = conjuncts.iter().filter(|(_, name, _)| name == field).collect();

            if let Some((_, _, value)) = on_field.iter().find(|(rel, _, _)| *rel == RelationOp::Eq) {
                prefix.push(KeyPart::Value(ShapedValue((*value).clone())));
                continue;
            }

            if on_field.is_empty() {
                break;
            }

            // stored keys always have one part per attribute, so a bare
            // prefix sorts before every key that extends it
            let mut lower = prefix.clone();
            let mut upper = (extend(&prefix, &[KeyPart::Max]), true);
            for (rel, _, value) in on_field {
                let value = KeyPart::Value(ShapedValue((*value).clone()));
                match rel {
                    RelationOp::Ge => lower = lower.max(extend(&prefix, &[value])),
                    RelationOp::Gt => lower = lower.max(extend(&prefix, &[value, KeyPart::Max])),
                    RelationOp::Le => upper = upper.min((extend(&prefix, &[value, KeyPart::Max]), true)),
                    RelationOp::Lt => upper = upper.min((extend(&prefix, &[value]), false)),
                    RelationOp::Eq => {}
                }
            }

            let upper = match upper {
                (key, true) => Bound::Included(key),
                (key, false) => Bound::Excluded(key),
            };
            let equalities = prefix.len();
            return Some((lower, upper, equalities));
        }

        if prefix.is_empty() {
            return None;
        }

        let upper = Bound::Included(extend(&prefix, &[KeyPart::Max]));
        let equalities = prefix.len();
        Some((prefix, upper, equalities))
    }
}

fn extend(prefix: &[KeyPart], tail: &[KeyPart]) -> Vec<KeyPart> {
    let mut key = prefix.to_vec();
    key.extend_from_slice(tail);
    key
}

impl IndexOps for SkiplistIndex {
    fn base(&self) -> &IndexBase {
        &self.base
    }

    fn insert(&mut self, doc: &DocRef) -> Result<()> {
        let Some(key) = self.key_of(doc) else {
            return Ok(());
        };

        if self.base.unique {
            let taken = self
                .entries
                .get(&key)
                .is_some_and(|docs| docs.iter().any(|other| other.key != doc.key));
            if taken {
                return Err(Error::unique_violated(self.base.iid));
            }
        }

        self.entries.entry(key).or_default().push(doc.clone());
        self.count += 1;
        Ok(())
    }

    fn remove(&mut self, doc: &DocRef) -> Result<()> {
        let Some(key) = self.key_of(doc) else {
            return Ok(());
        };

        if let Some(docs) = self.entries.get_mut(&key) {
            let before = docs.len();
            docs.retain(|other| other.key != doc.key);
            self.count -= before - docs.len();
            if docs.is_empty() {
                self.entries.remove(&key);
            }
        }
        Ok(())
    }

    fn challenge(&self, op: &IndexOperator) -> Challenge {
        let Some((lower, upper, equalities)) = self.bounds(op) else {
            return Challenge::unusable();
        };

        let cost = if self.base.unique && equalities == self.base.fields.len() {
            1.0
        } else {
            // every bound attribute roughly halves the scan
            1.0 + self.count as f64 / 2f64.powi(equalities as i32 + 1)
        };

        Challenge::usable(cost, QueryContext::new(self.base.iid, ContextData::Range { lower, upper }))
    }

    fn execute<'a>(
        &'a self,
        op: &IndexOperator,
        context: &QueryContext,
        filter: Option<DocFilter<'a>>,
    ) -> Result<IndexIterator<'a>> {
        let ContextData::Range { lower, upper } = context.check_owner(self.base.iid)? else {
            return Err(Error::internal("skiplist index received a foreign query context"));
        };

        // BTreeMap::range panics on inverted bounds
        let inverted = match upper {
            Bound::Included(upper) | Bound::Excluded(upper) => lower > upper,
            Bound::Unbounded => false,
        };
        if inverted {
            return Ok(IndexIterator::empty());
        }

        let residual = op.clone();
        let hits = self
            .entries
            .range((Bound::Included(lower.clone()), upper.clone()))
            .flat_map(|(_, docs)| docs.iter())
            .filter(move |doc| residual.matches(doc))
            .cloned();

        Ok(IndexIterator::new(hits, filter))
    }
}
