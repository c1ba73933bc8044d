use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap};
use crate::core::error::{Error, Result};
use crate::core::types::DocRef;
use crate::index::definition::IndexDefinition;
use crate::index::operator::IndexOperator;
use crate::index::query::{Challenge, ContextData, DocFilter, IndexIterator, QueryContext};
use crate::index::{IndexBase, IndexOps};

#[derive(Debug, Clone)]
struct Entry {
    value: f64,
    doc: DocRef,
}

/// Heap slot ordered by value, ties by position.
#[derive(Debug)]
struct Frontier {
    value: f64,
    slot: usize,
}

impl PartialEq for Frontier {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Frontier {}

impl PartialOrd for Frontier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Frontier {
    fn cmp(&self, other: &Self) -> Ordering {
        self.value.total_cmp(&other.value).then(self.slot.cmp(&other.slot))
    }
}

/// Binary min-heap over one numeric attribute. Answers "the k smallest"
/// queries; documents without a numeric value are not indexed.
#[derive(Debug)]
pub struct PriorityQueueIndex {
    base: IndexBase,
    heap: Vec<Entry>,
    positions: HashMap<String, usize>,
}

impl PriorityQueueIndex {
    pub fn new(definition: &IndexDefinition) -> Self {
        PriorityQueueIndex {
            base: IndexBase::from_definition(definition),
            heap: Vec::new(),
            positions: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    fn swap(&mut self, a: usize, b: usize) {
        self.heap.swap(a, b);
        self.positions.insert(self.heap[a].doc.key.clone(), a);
        self.positions.insert(self.heap[b].doc.key.clone(), b);
    }

    fn less(&self, a: usize, b: usize) -> bool {
        self.heap[a].value.total_cmp(&self.heap[b].value) == Ordering::Less
    }

    fn sift_up(&mut self, mut slot: usize) {
        while slot > 0 {
            let parent = (slot - 1) / 2;
            if !self.less(slot, parent) {
                break;
            }
            self.swap(slot, parent);
            slot = parent;
        }
    }

    fn sift_down(&mut self, mut slot: usize) {
        loop {
            let mut smallest = slot;
            for child in [2 * slot + 1, 2 * slot + 2] {
                if child < self.heap.len() && self.less(child, smallest) {
                    smallest = child;
                }
            }
            if smallest == slot {
                break;
            }
            self.swap(slot, smallest);
            slot = smallest;
        }
    }

    /// Entries in ascending order, visiting only as much of the heap as is
    /// consumed.
    fn ascending(&self) -> impl Iterator<Item = DocRef> + '_ {
        let mut frontier = BinaryHeap::new();
        if let Some(root) = self.heap.first() {
            frontier.push(Reverse(Frontier { value: root.value, slot: 0 }));
        }

        std::iter::from_fn(move || {
            let Reverse(next) = frontier.pop()?;
            for child in [2 * next.slot + 1, 2 * next.slot + 2] {
                if let Some(entry) = self.heap.get(child) {
                    frontier.push(Reverse(Frontier { value: entry.value, slot: child }));
                }
            }
            Some(self.heap[next.slot].doc.clone())
        })
    }
}

impl IndexOps for PriorityQueueIndex {
    fn base(&self) -> &IndexBase {
        &self.base
    }

    fn insert(&mut self, doc: &DocRef) -> Result<()> {
        let Some(value) = doc.attribute(&self.base.fields[0]).and_then(|v| v.as_f64()) else {
            return Ok(());
        };

        let slot = self.heap.len();
        self.heap.push(Entry { value, doc: doc.clone() });
        self.positions.insert(doc.key.clone(), slot);
        self.sift_up(slot);
        Ok(())
    }

    fn remove(&mut self, doc: &DocRef) -> Result<()> {
        let Some(slot) = self.positions.remove(&doc.key) else {
            return Ok(());
        };

        let last = self.heap.len() - 1;
        if slot != last {
            self.heap.swap(slot, last);
            self.positions.insert(self.heap[slot].doc.key.clone(), slot);
        }
        self.heap.pop();

        if slot < self.heap.len() {
            self.sift_down(slot);
            self.sift_up(slot);
        }
        Ok(())
    }

    fn challenge(&self, op: &IndexOperator) -> Challenge {
        match op {
            IndexOperator::Top { field, limit } if *field == self.base.fields[0] => Challenge::usable(
                (*limit).min(self.len()).max(1) as f64,
                QueryContext::new(self.base.iid, ContextData::Top(*limit)),
            ),
            _ => Challenge::unusable(),
        }
    }

    fn execute<'a>(
        &'a self,
        _op: &IndexOperator,
        context: &QueryContext,
        filter: Option<DocFilter<'a>>,
    ) -> Result<IndexIterator<'a>> {
        let ContextData::Top(limit) = *context.check_owner(self.base.iid)? else {
            return Err(Error::internal("priority queue index received a foreign query context"));
        };

        Ok(IndexIterator::limited(self.ascending(), filter, limit))
    }
}
