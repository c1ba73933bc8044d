use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use crate::collection::barrier::BarrierList;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::tick::TickGenerator;
use crate::core::types::{
    check_document_key, CollectionId, CollectionType, DocRef, Document, IndexId, FROM_ATTRIBUTE, KEY_ATTRIBUTE,
    TO_ATTRIBUTE,
};
use crate::index::primary::PrimaryIndex;
use crate::index::{Challenge, DocFilter, Index, IndexDefinition, IndexIterator, IndexOperator, IndexOps, IndexType};
use crate::storage::journal::{Journal, Marker, SyncMode};
use crate::storage::layout::{index_path, journal_path, parse_index_file};
use crate::storage::parameter::{remove_dangling_tmp, write_atomic, CollectionInfo};

pub const PRIMARY_INDEX_ID: IndexId = 0;
pub const EDGE_INDEX_ID: IndexId = 1;

/// The runtime structures of a loaded collection: documents (held by the
/// primary index), secondary indexes, and the journal.
///
/// The index list doubles as the document lock: every document write takes
/// it exclusively, so per-document index maintenance never races with index
/// creation or removal. Lock order is indexes, then journal.
pub struct DocumentCollection {
    info: RwLock<CollectionInfo>,
    path: PathBuf,
    indexes: RwLock<Vec<Index>>,
    journal: Mutex<Option<Journal>>,
    ticks: Arc<TickGenerator>,
    barriers: BarrierList,
}

impl fmt::Debug for DocumentCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let info = self.info.read();
        f.debug_struct("DocumentCollection")
            .field("cid", &info.cid)
            .field("name", &info.name)
            .field("path", &self.path)
            .finish()
    }
}

fn sync_mode(info: &CollectionInfo) -> SyncMode {
    if info.wait_for_sync { SyncMode::Immediate } else { SyncMode::Deferred }
}

fn system_indexes(kind: CollectionType) -> Result<Vec<Index>> {
    let mut indexes = vec![Index::create(&IndexDefinition { id: PRIMARY_INDEX_ID, ..IndexDefinition::primary() })?];
    if kind == CollectionType::Edge {
        indexes.push(Index::create(&IndexDefinition { id: EDGE_INDEX_ID, ..IndexDefinition::edge() })?);
    }
    Ok(indexes)
}

fn primary(indexes: &[Index]) -> Result<&PrimaryIndex> {
    indexes
        .first()
        .and_then(Index::as_primary)
        .ok_or_else(|| Error::internal("collection has no primary index"))
}

fn document_not_found(key: &str) -> Error {
    Error::new(ErrorKind::DocumentNotFound, format!("document '{}' not found", key))
}

/// Inserts into every index or into none.
fn insert_into(indexes: &mut [Index], doc: &DocRef) -> Result<()> {
    for position in 0..indexes.len() {
        if let Err(e) = indexes[position].insert(doc) {
            for index in indexes[..position].iter_mut().rev() {
                if let Err(undo) = index.remove(doc) {
                    tracing::error!(index = index.iid(), error = %undo, "cannot roll back index insert");
                }
            }
            return Err(e);
        }
    }
    Ok(())
}

fn update_in(indexes: &mut [Index], doc: &DocRef, old: &DocRef) -> Result<()> {
    for position in 0..indexes.len() {
        if let Err(e) = indexes[position].update(doc, old) {
            for index in indexes[..position].iter_mut().rev() {
                if let Err(undo) = index.update(old, doc) {
                    tracing::error!(index = index.iid(), error = %undo, "cannot roll back index update");
                }
            }
            return Err(e);
        }
    }
    Ok(())
}

fn remove_from(indexes: &mut [Index], doc: &DocRef) -> Result<()> {
    for index in indexes.iter_mut() {
        index.remove(doc)?;
    }
    Ok(())
}

impl DocumentCollection {
    /// Materializes a new collection in `path`, which must not exist yet.
    pub fn create(path: &Path, info: CollectionInfo, ticks: Arc<TickGenerator>) -> Result<Self> {
        fs::create_dir(path)?;
        info.save(path)?;
        let journal = Journal::create(&journal_path(path), sync_mode(&info))?;

        tracing::debug!(cid = info.cid, name = %info.name, "created collection");

        Ok(DocumentCollection {
            indexes: RwLock::new(system_indexes(info.kind)?),
            info: RwLock::new(info),
            path: path.to_path_buf(),
            journal: Mutex::new(Some(journal)),
            ticks,
            barriers: BarrierList::new(),
        })
    }

    /// Opens a persisted collection: replays the journal, then rebuilds
    /// every index stored next to it.
    pub fn open(path: &Path, ticks: Arc<TickGenerator>) -> Result<Self> {
        remove_dangling_tmp(path)?;
        let info = CollectionInfo::load(path)?;

        let journal_file = journal_path(path);
        let (journal, entries) = if journal_file.exists() {
            Journal::open(&journal_file, sync_mode(&info))?
        } else {
            (Journal::create(&journal_file, sync_mode(&info))?, Vec::new())
        };

        let mut live: HashMap<String, DocRef> = HashMap::new();
        for entry in entries {
            ticks.observe_tick(entry.tick);
            match entry.marker {
                Marker::Document { key, body } => {
                    let body: Value = serde_json::from_slice(&body)?;
                    live.insert(key.clone(), Arc::new(Document::new(key, entry.tick, body)));
                }
                Marker::Deletion { key } => {
                    live.remove(&key);
                }
            }
        }

        let mut documents: Vec<DocRef> = live.into_values().collect();
        documents.sort_by_key(|doc| doc.rid);

        let mut indexes = system_indexes(info.kind)?;
        for doc in &documents {
            insert_into(&mut indexes, doc)?;
        }

        let collection = DocumentCollection {
            indexes: RwLock::new(indexes),
            info: RwLock::new(info),
            path: path.to_path_buf(),
            journal: Mutex::new(Some(journal)),
            ticks,
            barriers: BarrierList::new(),
        };

        {
            let mut indexes = collection.indexes.write();
            for definition in collection.read_index_files()? {
                collection.ticks.observe_tick(definition.id);
                collection.attach_index(&mut indexes, definition, false)?;
            }
        }

        tracing::debug!(path = %path.display(), documents = documents.len(), "opened collection");
        Ok(collection)
    }

    pub fn info(&self) -> CollectionInfo {
        self.info.read().clone()
    }

    pub fn cid(&self) -> CollectionId {
        self.info.read().cid
    }

    pub fn name(&self) -> String {
        self.info.read().name.clone()
    }

    pub fn kind(&self) -> CollectionType {
        self.info.read().kind
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn barriers(&self) -> &BarrierList {
        &self.barriers
    }

    fn append(&self, tick: u64, marker: Marker) -> Result<()> {
        let mut journal = self.journal.lock();
        match journal.as_mut() {
            Some(journal) => journal.append(tick, marker),
            None => Err(Error::internal(format!("collection '{}' is closed", self.name()))),
        }
    }

    // ---- documents ----

    /// Stores a new document. The key is taken from `_key` or generated.
    pub fn insert(&self, mut body: Value) -> Result<DocRef> {
        let Some(object) = body.as_object_mut() else {
            return Err(Error::new(ErrorKind::InvalidArgument, "document body must be an object".into()));
        };

        let rid = self.ticks.new_tick();
        let key = match object.remove(KEY_ATTRIBUTE) {
            Some(Value::String(key)) => key,
            Some(other) => {
                return Err(Error::new(ErrorKind::DocumentKeyBad, format!("illegal document key {}", other)));
            }
            None => rid.to_string(),
        };
        check_document_key(&key)?;
        self.check_edge(&body)?;

        let doc = Arc::new(Document::new(key, rid, body));
        let marker = Marker::document(&doc)?;

        let mut indexes = self.indexes.write();
        insert_into(&mut indexes, &doc)?;
        if let Err(e) = self.append(rid, marker) {
            remove_from(&mut indexes, &doc)?;
            return Err(e);
        }
        self.enforce_cap(&mut indexes)?;

        Ok(doc)
    }

    /// Replaces the body of an existing document under a new revision.
    pub fn update(&self, key: &str, mut body: Value) -> Result<DocRef> {
        if !body.is_object() {
            return Err(Error::new(ErrorKind::InvalidArgument, "document body must be an object".into()));
        }

        let mut indexes = self.indexes.write();
        let old = primary(&indexes)?.lookup(key).cloned().ok_or_else(|| document_not_found(key))?;

        if let Some(object) = body.as_object_mut() {
            for attribute in [FROM_ATTRIBUTE, TO_ATTRIBUTE] {
                if let (false, Some(value)) = (object.contains_key(attribute), old.attribute(attribute)) {
                    object.insert(attribute.to_string(), value.clone());
                }
            }
        }
        self.check_edge(&body)?;

        let rid = self.ticks.new_tick();
        let doc = Arc::new(Document::new(key.to_string(), rid, body));
        let marker = Marker::document(&doc)?;

        update_in(&mut indexes, &doc, &old)?;
        if let Err(e) = self.append(rid, marker) {
            update_in(&mut indexes, &old, &doc)?;
            return Err(e);
        }

        Ok(doc)
    }

    pub fn remove(&self, key: &str) -> Result<DocRef> {
        let mut indexes = self.indexes.write();
        let old = primary(&indexes)?.lookup(key).cloned().ok_or_else(|| document_not_found(key))?;

        self.append(self.ticks.new_tick(), Marker::Deletion { key: key.to_string() })?;
        remove_from(&mut indexes, &old)?;
        Ok(old)
    }

    pub fn document(&self, key: &str) -> Option<DocRef> {
        let indexes = self.indexes.read();
        primary(&indexes).ok()?.lookup(key).cloned()
    }

    pub fn count(&self) -> usize {
        let indexes = self.indexes.read();
        primary(&indexes).map_or(0, PrimaryIndex::len)
    }

    /// All documents, oldest revision first.
    pub fn documents(&self) -> Vec<DocRef> {
        let indexes = self.indexes.read();
        primary(&indexes).map(PrimaryIndex::documents_by_revision).unwrap_or_default()
    }

    fn check_edge(&self, body: &Value) -> Result<()> {
        if self.kind() != CollectionType::Edge {
            return Ok(());
        }

        let is_handle = |attribute: &str| body.get(attribute).is_some_and(Value::is_string);
        if !is_handle(FROM_ATTRIBUTE) || !is_handle(TO_ATTRIBUTE) {
            return Err(Error::new(
                ErrorKind::InvalidArgument,
                "edge documents need string _from and _to attributes".into(),
            ));
        }
        Ok(())
    }

    /// Evicts the oldest documents beyond the cap constraint, if any.
    fn enforce_cap(&self, indexes: &mut [Index]) -> Result<()> {
        let live = primary(indexes)?.len();
        let Some(evicted) = indexes.iter().find_map(Index::as_cap).map(|cap| cap.overflow(live)) else {
            return Ok(());
        };

        for doc in evicted {
            self.append(self.ticks.new_tick(), Marker::Deletion { key: doc.key.clone() })?;
            remove_from(indexes, &doc)?;
        }
        Ok(())
    }

    // ---- indexes ----

    /// Creates an index, or returns the existing one with the same
    /// definition. The flag tells whether a new index was built.
    pub fn ensure_index(&self, mut definition: IndexDefinition) -> Result<(IndexDefinition, bool)> {
        definition.validate()?;
        if matches!(definition.kind, IndexType::Primary | IndexType::Edge) {
            return Err(Error::new(
                ErrorKind::InvalidArgument,
                format!("{} indexes are created with the collection", definition.kind.name()),
            ));
        }

        let mut indexes = self.indexes.write();

        if let Some(existing) = indexes.iter().find(|index| index.definition().same_as(&definition)) {
            return Ok((existing.definition(), false));
        }
        if definition.kind == IndexType::Cap && indexes.iter().any(|index| index.kind() == IndexType::Cap) {
            return Err(Error::new(
                ErrorKind::CapConstraintViolated,
                "collection already has a cap constraint".into(),
            ));
        }

        definition.id = self.ticks.new_tick();
        let definition = self.attach_index(&mut indexes, definition, true)?;
        Ok((definition, true))
    }

    /// Builds the index, backfills it and appends it to the list. If any
    /// step fails the index is neither listed nor persisted.
    fn attach_index(&self, indexes: &mut Vec<Index>, definition: IndexDefinition, persist: bool) -> Result<IndexDefinition> {
        let mut index = Index::create(&definition)?;
        for doc in primary(indexes)?.documents_by_revision() {
            index.insert(&doc)?;
        }

        let path = index_path(&self.path, definition.id);
        if persist {
            let data = serde_json::to_vec_pretty(&definition.to_json())?;
            write_atomic(&path, &path.with_extension("json.tmp"), &data)?;
        }

        indexes.push(index);
        if definition.kind == IndexType::Cap {
            if let Err(e) = self.enforce_cap(indexes) {
                indexes.pop();
                if persist {
                    if let Err(remove) = fs::remove_file(&path) {
                        tracing::warn!(path = %path.display(), error = %remove, "cannot remove index file");
                    }
                }
                return Err(e);
            }
        }

        tracing::debug!(iid = definition.id, kind = definition.kind.name(), "attached index");
        Ok(definition)
    }

    fn read_index_files(&self) -> Result<Vec<IndexDefinition>> {
        let mut files = Vec::new();
        for entry in fs::read_dir(&self.path)? {
            let entry = entry?;
            if let Some(iid) = parse_index_file(&entry.file_name().to_string_lossy()) {
                files.push((iid, entry.path()));
            }
        }
        files.sort();

        let mut definitions = Vec::with_capacity(files.len());
        for (_, path) in files {
            let json: Value = serde_json::from_slice(&fs::read(&path)?)?;
            definitions.push(IndexDefinition::from_json(&json)?);
        }
        Ok(definitions)
    }

    pub fn drop_index(&self, iid: IndexId) -> Result<()> {
        let mut indexes = self.indexes.write();

        let position = indexes
            .iter()
            .position(|index| index.iid() == iid)
            .ok_or_else(|| Error::new(ErrorKind::IndexNotFound, format!("index {} not found", iid)))?;

        if matches!(indexes[position].kind(), IndexType::Primary | IndexType::Edge) {
            return Err(Error::new(
                ErrorKind::InvalidArgument,
                format!("cannot drop {} index", indexes[position].kind().name()),
            ));
        }

        match fs::remove_file(index_path(&self.path, iid)) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        indexes.remove(position);
        Ok(())
    }

    pub fn indexes(&self) -> Vec<IndexDefinition> {
        self.indexes.read().iter().map(IndexOps::definition).collect()
    }

    /// Answers `op` with the cheapest index that accepts it. Comparison
    /// expressions no index accepts fall back to a full scan.
    pub fn lookup(&self, op: &IndexOperator, filter: Option<DocFilter<'_>>) -> Result<Vec<DocRef>> {
        self.query(op, filter, |matches| matches.collect())
    }

    /// Like [`lookup`](Self::lookup), but hands the matches to `visit` one at
    /// a time and stops as soon as it returns `false`. Returns the number of
    /// documents visited.
    pub fn lookup_each(
        &self,
        op: &IndexOperator,
        filter: Option<DocFilter<'_>>,
        mut visit: impl FnMut(&DocRef) -> bool,
    ) -> Result<usize> {
        self.query(op, filter, |matches| {
            let mut visited = 0;
            for doc in matches {
                visited += 1;
                if !visit(&doc) {
                    break;
                }
            }
            visited
        })
    }

    /// Plans `op`, runs it and feeds the lazy result to `consume` while the
    /// index set is read locked.
    fn query<R>(
        &self,
        op: &IndexOperator,
        filter: Option<DocFilter<'_>>,
        consume: impl FnOnce(IndexIterator<'_>) -> R,
    ) -> Result<R> {
        let indexes = self.indexes.read();

        let mut best: Option<(usize, Challenge)> = None;
        for (position, index) in indexes.iter().enumerate() {
            let challenge = index.challenge(op);
            if !challenge.usable {
                continue;
            }

            let better = best.as_ref().is_none_or(|(_, current)| challenge.cost < current.cost);
            let loser = if better {
                best.replace((position, challenge))
            } else {
                Some((position, challenge))
            };
            if let Some((position, Challenge { context: Some(context), .. })) = loser {
                indexes[position].release(context);
            }
        }

        let Some((position, challenge)) = best else {
            if op.conjuncts().is_none() {
                return Err(Error::new(ErrorKind::IndexNotFound, format!("no index can answer {:?}", op)));
            }
            let scan = primary(&indexes)?
                .documents_by_revision()
                .into_iter()
                .filter(|doc| op.matches(doc));
            return Ok(consume(IndexIterator::new(scan, filter)));
        };

        let index = &indexes[position];
        let context = challenge
            .context
            .ok_or_else(|| Error::internal("usable challenge without context"))?;
        let result = index.execute(op, &context, filter).map(consume);
        index.release(context);
        result
    }

    // ---- metadata and maintenance ----

    /// Renames the collection and rewrites its metadata record.
    pub fn rename(&self, name: &str) -> Result<()> {
        let mut info = self.info.write();
        let renamed = CollectionInfo { name: name.to_string(), ..info.clone() };
        renamed.save(&self.path)?;
        *info = renamed;
        Ok(())
    }

    /// Persists the deleted flag.
    pub fn mark_deleted(&self) -> Result<()> {
        let mut info = self.info.write();
        let deleted = CollectionInfo { deleted: true, ..info.clone() };
        deleted.save(&self.path)?;
        *info = deleted;
        Ok(())
    }

    /// Flushes journal writes. Returns whether anything was pending.
    pub fn sync(&self) -> Result<bool> {
        let mut journal = self.journal.lock();
        match journal.as_mut() {
            Some(journal) if journal.unsynced => {
                journal.sync()?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Index cleanup, then a journal rewrite once the journal outgrows the
    /// collection's maximal size.
    pub fn compact(&self) -> Result<()> {
        let mut indexes = self.indexes.write();
        for index in indexes.iter_mut().filter(|index| index.has_cleanup()) {
            index.cleanup()?;
        }

        let maximal_size = self.info.read().maximal_size;
        let mut journal = self.journal.lock();
        if let Some(journal) = journal.as_mut() {
            if journal.size() > maximal_size {
                let documents = primary(&indexes)?.documents_by_revision();
                let documents: Vec<&Document> = documents.iter().map(|doc| doc.as_ref()).collect();
                journal.rewrite(&documents)?;
                tracing::debug!(path = %self.path.display(), size = journal.size(), "compacted journal");
            }
        }
        Ok(())
    }

    pub fn journal_size(&self) -> u64 {
        self.journal.lock().as_ref().map_or(0, Journal::size)
    }

    /// Syncs and closes the journal. Further writes fail.
    pub fn close(&self) -> Result<()> {
        if let Some(mut journal) = self.journal.lock().take() {
            journal.sync()?;
        }
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.journal.lock().is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{EdgeDirection, RelationOp};
    use serde_json::json;
    use tempfile::TempDir;

    fn ticks() -> Arc<TickGenerator> {
        Arc::new(TickGenerator::with_server_id(7))
    }

    fn create(dir: &TempDir, kind: CollectionType) -> DocumentCollection {
        let info = CollectionInfo::new(42, "things", kind, 1024 * 1024);
        DocumentCollection::create(&dir.path().join("collection-42"), info, ticks()).unwrap()
    }

    fn keys(docs: &[DocRef]) -> Vec<String> {
        docs.iter().map(|d| d.key.clone()).collect()
    }

    #[test]
    fn test_insert_update_remove_and_reopen() {
        let dir = TempDir::new().unwrap();
        let collection = create(&dir, CollectionType::Document);

        collection.insert(json!({"_key": "a", "n": 1})).unwrap();
        let generated = collection.insert(json!({"n": 2})).unwrap();
        collection.insert(json!({"_key": "c", "n": 3})).unwrap();
        collection.update("a", json!({"n": 10})).unwrap();
        collection.remove("c").unwrap();
        assert!(collection.remove("c").unwrap_err().is(ErrorKind::DocumentNotFound));
        collection.close().unwrap();

        let reopened = DocumentCollection::open(collection.path(), ticks()).unwrap();
        assert_eq!(reopened.count(), 2);
        assert_eq!(reopened.document("a").unwrap().body["n"], 10);
        assert!(reopened.document(&generated.key).is_some());
        assert!(reopened.document("c").is_none());
    }

    #[test]
    fn test_bad_documents() {
        let dir = TempDir::new().unwrap();
        let collection = create(&dir, CollectionType::Document);

        assert!(collection.insert(json!([1, 2])).unwrap_err().is(ErrorKind::InvalidArgument));
        assert!(collection.insert(json!({"_key": "a/b"})).unwrap_err().is(ErrorKind::DocumentKeyBad));
        collection.insert(json!({"_key": "a"})).unwrap();
        assert!(collection.insert(json!({"_key": "a"})).unwrap_err().is(ErrorKind::UniqueConstraintViolated));
        assert_eq!(collection.count(), 1);
    }

    #[test]
    fn test_failed_insert_leaves_no_trace() {
        let dir = TempDir::new().unwrap();
        let collection = create(&dir, CollectionType::Document);
        collection.ensure_index(IndexDefinition::hash(&["email"], true, false)).unwrap();

        collection.insert(json!({"_key": "a", "email": "x"})).unwrap();
        let err = collection.insert(json!({"_key": "b", "email": "x"})).unwrap_err();

        assert!(err.is(ErrorKind::UniqueConstraintViolated));
        assert!(collection.document("b").is_none());
        assert_eq!(collection.count(), 1);
    }

    #[test]
    fn test_cap_evicts_oldest() {
        let dir = TempDir::new().unwrap();
        let collection = create(&dir, CollectionType::Document);
        collection.ensure_index(IndexDefinition::cap(3)).unwrap();

        for i in 0..5 {
            collection.insert(json!({ "_key": format!("d{}", i) })).unwrap();
        }

        assert_eq!(keys(&collection.documents()), vec!["d2", "d3", "d4"]);
        assert!(collection.ensure_index(IndexDefinition::cap(10)).unwrap_err().is(ErrorKind::CapConstraintViolated));

        collection.close().unwrap();
        let reopened = DocumentCollection::open(collection.path(), ticks()).unwrap();
        assert_eq!(keys(&reopened.documents()), vec!["d2", "d3", "d4"]);
    }

    #[test]
    fn test_cap_backfill_evicts_existing() {
        let dir = TempDir::new().unwrap();
        let collection = create(&dir, CollectionType::Document);
        for i in 0..4 {
            collection.insert(json!({ "_key": format!("d{}", i) })).unwrap();
        }

        collection.ensure_index(IndexDefinition::cap(2)).unwrap();
        assert_eq!(keys(&collection.documents()), vec!["d2", "d3"]);
    }

    #[test]
    fn test_ensure_and_drop_index() {
        let dir = TempDir::new().unwrap();
        let collection = create(&dir, CollectionType::Document);
        collection.insert(json!({"_key": "a", "age": 30})).unwrap();

        let (first, created) = collection.ensure_index(IndexDefinition::skiplist(&["age"], false)).unwrap();
        assert!(created);
        let (second, created) = collection.ensure_index(IndexDefinition::skiplist(&["age"], false)).unwrap();
        assert!(!created);
        assert_eq!(first.id, second.id);
        assert!(index_path(collection.path(), first.id).exists());

        assert!(collection.drop_index(PRIMARY_INDEX_ID).unwrap_err().is(ErrorKind::InvalidArgument));
        assert!(collection.ensure_index(IndexDefinition::primary()).is_err());

        collection.drop_index(first.id).unwrap();
        assert!(!index_path(collection.path(), first.id).exists());
        assert!(collection.drop_index(first.id).unwrap_err().is(ErrorKind::IndexNotFound));
        assert_eq!(collection.indexes().len(), 1);
    }

    #[test]
    fn test_failed_cap_eviction_discards_index() {
        let dir = TempDir::new().unwrap();
        let collection = create(&dir, CollectionType::Document);
        for i in 0..5 {
            collection.insert(json!({ "_key": format!("d{}", i) })).unwrap();
        }
        // evictions cannot be journaled any more
        collection.close().unwrap();

        assert!(collection.ensure_index(IndexDefinition::cap(2)).is_err());

        assert_eq!(collection.indexes().len(), 1);
        assert_eq!(collection.count(), 5);
        let index_files = fs::read_dir(collection.path())
            .unwrap()
            .filter(|entry| parse_index_file(&entry.as_ref().unwrap().file_name().to_string_lossy()).is_some())
            .count();
        assert_eq!(index_files, 0);
    }

    #[test]
    fn test_lookup_each_stops_early() {
        let dir = TempDir::new().unwrap();
        let collection = create(&dir, CollectionType::Document);
        for i in 0..10 {
            collection.insert(json!({ "_key": format!("d{}", i), "p": i })).unwrap();
        }
        collection.ensure_index(IndexDefinition::priority_queue("p")).unwrap();

        let checked = std::cell::Cell::new(0);
        let counting = |_: &Document| {
            checked.set(checked.get() + 1);
            true
        };

        let mut seen = Vec::new();
        let visited = collection
            .lookup_each(&IndexOperator::top("p", 10), Some(&counting), |doc| {
                seen.push(doc.key.clone());
                seen.len() < 3
            })
            .unwrap();

        assert_eq!(visited, 3);
        assert_eq!(seen, vec!["d0", "d1", "d2"]);
        assert_eq!(checked.get(), 3);
    }

    #[test]
    fn test_failed_backfill_discards_index() {
        let dir = TempDir::new().unwrap();
        let collection = create(&dir, CollectionType::Document);
        collection.insert(json!({"_key": "a", "n": 1})).unwrap();
        collection.insert(json!({"_key": "b", "n": 1})).unwrap();

        let err = collection.ensure_index(IndexDefinition::hash(&["n"], true, false)).unwrap_err();
        assert!(err.is(ErrorKind::UniqueConstraintViolated));
        assert_eq!(collection.indexes().len(), 1);
    }

    #[test]
    fn test_indexes_restored_on_open() {
        let dir = TempDir::new().unwrap();
        let collection = create(&dir, CollectionType::Document);
        collection.insert(json!({"_key": "a", "text": "hello world"})).unwrap();
        let (definition, _) = collection.ensure_index(IndexDefinition::fulltext("text", 2, false)).unwrap();
        collection.close().unwrap();

        let reopened = DocumentCollection::open(collection.path(), ticks()).unwrap();
        assert_eq!(reopened.indexes()[1], definition);

        let op = IndexOperator::Fulltext { field: "text".into(), query: "hello".into() };
        assert_eq!(keys(&reopened.lookup(&op, None).unwrap()), vec!["a"]);
    }

    #[test]
    fn test_lookup_planner() {
        let dir = TempDir::new().unwrap();
        let collection = create(&dir, CollectionType::Document);
        for (key, age) in [("a", 10), ("b", 20), ("c", 30)] {
            collection.insert(json!({ "_key": key, "age": age })).unwrap();
        }

        // no index: full scan
        let op = IndexOperator::compare(RelationOp::Ge, "age", json!(20));
        assert_eq!(keys(&collection.lookup(&op, None).unwrap()), vec!["b", "c"]);

        collection.ensure_index(IndexDefinition::skiplist(&["age"], false)).unwrap();
        assert_eq!(keys(&collection.lookup(&op, None).unwrap()), vec!["b", "c"]);

        let only_c = |doc: &Document| doc.key == "c";
        assert_eq!(keys(&collection.lookup(&op, Some(&only_c)).unwrap()), vec!["c"]);

        let by_key = IndexOperator::eq("_key", json!("a"));
        assert_eq!(keys(&collection.lookup(&by_key, None).unwrap()), vec!["a"]);

        let top = IndexOperator::top("age", 1);
        assert!(collection.lookup(&top, None).unwrap_err().is(ErrorKind::IndexNotFound));
    }

    #[test]
    fn test_lookup_picks_index_by_attribute() {
        let dir = TempDir::new().unwrap();
        let collection = create(&dir, CollectionType::Document);
        collection.insert(json!({"_key": "x", "a": 1, "b": 100, "lat": 0.0, "lon": 0.0, "home": [50.0, 50.0]})).unwrap();
        collection.insert(json!({"_key": "y", "a": 100, "b": 1, "lat": 50.0, "lon": 50.0, "home": [0.0, 0.0]})).unwrap();

        collection.ensure_index(IndexDefinition::priority_queue("a")).unwrap();
        collection.ensure_index(IndexDefinition::priority_queue("b")).unwrap();
        assert_eq!(keys(&collection.lookup(&IndexOperator::top("a", 1), None).unwrap()), vec!["x"]);
        assert_eq!(keys(&collection.lookup(&IndexOperator::top("b", 1), None).unwrap()), vec!["y"]);

        collection.ensure_index(IndexDefinition::geo2("lat", "lon", false, false)).unwrap();
        collection.ensure_index(IndexDefinition::geo1("home", false, false, false)).unwrap();
        let near_origin = |fields: &[&str]| IndexOperator::near(fields, 0.0, 0.0, 1);
        assert_eq!(keys(&collection.lookup(&near_origin(&["lat", "lon"]), None).unwrap()), vec!["x"]);
        assert_eq!(keys(&collection.lookup(&near_origin(&["home"]), None).unwrap()), vec!["y"]);

        let unindexed = IndexOperator::top("c", 1);
        assert!(collection.lookup(&unindexed, None).unwrap_err().is(ErrorKind::IndexNotFound));
    }

    #[test]
    fn test_edge_collection() {
        let dir = TempDir::new().unwrap();
        let collection = create(&dir, CollectionType::Edge);

        assert!(collection.insert(json!({"_key": "e0"})).is_err());
        collection.insert(json!({"_key": "e1", "_from": "v/a", "_to": "v/b"})).unwrap();
        collection.update("e1", json!({"weight": 2})).unwrap();

        let op = IndexOperator::Edges { direction: EdgeDirection::Inbound, vertex: "v/b".into() };
        let found = collection.lookup(&op, None).unwrap();
        assert_eq!(keys(&found), vec!["e1"]);
        assert_eq!(found[0].body["weight"], 2);
    }

    #[test]
    fn test_rename_and_mark_deleted_persist() {
        let dir = TempDir::new().unwrap();
        let collection = create(&dir, CollectionType::Document);

        collection.rename("renamed").unwrap();
        collection.mark_deleted().unwrap();

        let info = CollectionInfo::load(collection.path()).unwrap();
        assert_eq!(info.name, "renamed");
        assert!(info.deleted);
    }

    #[test]
    fn test_compaction_rewrites_oversized_journal() {
        let dir = TempDir::new().unwrap();
        let info = CollectionInfo::new(9, "small", CollectionType::Document, 256);
        let collection = DocumentCollection::create(&dir.path().join("collection-9"), info, ticks()).unwrap();

        for round in 0..20 {
            collection.insert(json!({"_key": "k", "round": round})).unwrap();
            collection.remove("k").unwrap();
        }
        collection.insert(json!({"_key": "keep"})).unwrap();
        assert!(collection.sync().unwrap());
        assert!(!collection.sync().unwrap());

        let before = collection.journal_size();
        collection.compact().unwrap();
        assert!(collection.journal_size() < before);

        collection.close().unwrap();
        assert!(collection.is_closed());
        let reopened = DocumentCollection::open(collection.path(), ticks()).unwrap();
        assert_eq!(keys(&reopened.documents()), vec!["keep"]);
    }
}
