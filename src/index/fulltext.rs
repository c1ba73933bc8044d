use std::collections::{BTreeMap, BTreeSet, HashMap};
use unicode_segmentation::UnicodeSegmentation;
use crate::core::error::{Error, Result};
use crate::core::types::DocRef;
use crate::index::definition::{IndexDefinition, DEFAULT_FULLTEXT_MIN_LENGTH};
use crate::index::operator::IndexOperator;
use crate::index::query::{Challenge, ContextData, DocFilter, IndexIterator, QueryContext};
use crate::index::{IndexBase, IndexOps};

/// Longest indexed word, in characters. Longer words are truncated.
pub const MAX_WORD_LENGTH: usize = 40;

const PREFIX_MARKER: &str = "prefix:";

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum FulltextTerm {
    Exact(String),
    Prefix(String),
}

/// Splits text into lowercased unicode words.
#[derive(Debug, Clone)]
pub struct WordTokenizer {
    pub min_length: usize,
    pub index_substrings: bool,
}

impl WordTokenizer {
    pub fn tokenize(&self, text: &str) -> BTreeSet<String> {
        let mut words = BTreeSet::new();

        for word in text.unicode_words() {
            let chars: Vec<char> = word.to_lowercase().chars().take(MAX_WORD_LENGTH).collect();
            if chars.len() < self.min_length {
                continue;
            }

            if self.index_substrings {
                for start in 0..chars.len() {
                    for end in (start + self.min_length)..=chars.len() {
                        words.insert(chars[start..end].iter().collect());
                    }
                }
            } else {
                words.insert(chars.into_iter().collect());
            }
        }

        words
    }
}

/// Parses `"word, prefix:wo, other"` into normalized terms.
pub(crate) fn parse_query(query: &str) -> Vec<FulltextTerm> {
    query
        .split(',')
        .filter_map(|part| {
            let part = part.trim().to_lowercase();
            let (prefix, word) = match part.strip_prefix(PREFIX_MARKER) {
                Some(rest) => (true, rest.trim().to_string()),
                None => (false, part),
            };
            if word.is_empty() {
                return None;
            }

            let word: String = word.chars().take(MAX_WORD_LENGTH).collect();
            Some(if prefix { FulltextTerm::Prefix(word) } else { FulltextTerm::Exact(word) })
        })
        .collect()
}

/// Word index over one string attribute.
#[derive(Debug)]
pub struct FulltextIndex {
    base: IndexBase,
    tokenizer: WordTokenizer,
    words: BTreeMap<String, HashMap<String, DocRef>>,
    doc_words: HashMap<String, Vec<String>>,
}

impl FulltextIndex {
    pub fn new(definition: &IndexDefinition) -> Self {
        FulltextIndex {
            base: IndexBase::from_definition(definition),
            tokenizer: WordTokenizer {
                min_length: definition.min_length.unwrap_or(DEFAULT_FULLTEXT_MIN_LENGTH),
                index_substrings: definition.index_substrings.unwrap_or(false),
            },
            words: BTreeMap::new(),
            doc_words: HashMap::new(),
        }
    }

    fn matching(&self, term: &FulltextTerm) -> HashMap<String, DocRef> {
        match term {
            FulltextTerm::Exact(word) => self.words.get(word).cloned().unwrap_or_default(),
            FulltextTerm::Prefix(prefix) => self
                .words
                .range(prefix.clone()..)
                .take_while(|(word, _)| word.starts_with(prefix.as_str()))
                .flat_map(|(_, docs)| docs.iter().map(|(key, doc)| (key.clone(), doc.clone())))
                .collect(),
        }
    }
}

impl IndexOps for FulltextIndex {
    fn base(&self) -> &IndexBase {
        &self.base
    }

    fn definition(&self) -> IndexDefinition {
        IndexDefinition {
            min_length: Some(self.tokenizer.min_length),
            index_substrings: Some(self.tokenizer.index_substrings),
            ..self.base.definition()
        }
    }

    fn insert(&mut self, doc: &DocRef) -> Result<()> {
        let Some(text) = doc.attribute(&self.base.fields[0]).and_then(|v| v.as_str()) else {
            return Ok(());
        };

        let words = self.tokenizer.tokenize(text);
        if words.is_empty() {
            return Ok(());
        }

        for word in &words {
            self.words.entry(word.clone()).or_default().insert(doc.key.clone(), doc.clone());
        }
        self.doc_words.insert(doc.key.clone(), words.into_iter().collect());
        Ok(())
    }

    fn remove(&mut self, doc: &DocRef) -> Result<()> {
        let Some(words) = self.doc_words.remove(&doc.key) else {
            return Ok(());
        };

        for word in words {
            if let Some(docs) = self.words.get_mut(&word) {
                docs.remove(&doc.key);
                if docs.is_empty() {
                    self.words.remove(&word);
                }
            }
        }
        Ok(())
    }

    fn challenge(&self, op: &IndexOperator) -> Challenge {
        let IndexOperator::Fulltext { field, query } = op else {
            return Challenge::unusable();
        };
        if *field != self.base.fields[0] {
            return Challenge::unusable();
        }

        let terms = parse_query(query);
        if terms.is_empty() {
            return Challenge::unusable();
        }

        let cost = terms
            .iter()
            .map(|term| match term {
                FulltextTerm::Exact(word) => self.words.get(word).map_or(0, HashMap::len),
                FulltextTerm::Prefix(_) => self.doc_words.len(),
            })
            .min()
            .unwrap_or(0);

        Challenge::usable(cost.max(1) as f64, QueryContext::new(self.base.iid, ContextData::Terms(terms)))
    }

    fn execute<'a>(
        &'a self,
        _op: &IndexOperator,
        context: &QueryContext,
        filter: Option<DocFilter<'a>>,
    ) -> Result<IndexIterator<'a>> {
        let ContextData::Terms(terms) = context.check_owner(self.base.iid)? else {
            return Err(Error::internal("fulltext index received a foreign query context"));
        };

        let mut terms = terms.iter();
        let mut result = match terms.next() {
            Some(first) => self.matching(first),
            None => return Ok(IndexIterator::empty()),
        };
        for term in terms {
            if result.is_empty() {
                break;
            }
            let docs = self.matching(term);
            result.retain(|key, _| docs.contains_key(key));
        }

        let mut hits: Vec<DocRef> = result.into_values().collect();
        hits.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(IndexIterator::new(hits.into_iter(), filter))
    }
}
