use std::path::{Path, PathBuf};
use regex::Regex;
use crate::core::types::{CollectionId, IndexId};

pub const COLLECTION_PREFIX: &str = "collection-";
pub const DELETED_PREFIX: &str = "deleted-";
pub const PARAMETER_FILE: &str = "parameter.json";
pub const JOURNAL_FILE: &str = "journal.db";
pub const LOCK_FILE: &str = "lock";

/// Directory structure of a database
///
/// ```text
/// <base>/lock
/// <base>/collection-<cid>/parameter.json
/// <base>/collection-<cid>/journal.db
/// <base>/collection-<cid>/index-<iid>.json
/// <base>/deleted-<cid>/...
/// ```
#[derive(Debug, Clone)]
pub struct StorageLayout {
    pub base_dir: PathBuf,
    collection_pattern: Regex,
}

impl StorageLayout {
    pub fn new(base_dir: PathBuf) -> Self {
        StorageLayout {
            base_dir,
            collection_pattern: Regex::new(r"^collection-([0-9]+)$").expect("static pattern"),
        }
    }

    pub fn lock_path(&self) -> PathBuf {
        self.base_dir.join(LOCK_FILE)
    }

    pub fn collection_dir(&self, cid: CollectionId) -> PathBuf {
        self.base_dir.join(format!("{}{}", COLLECTION_PREFIX, cid))
    }

    /// Parses `collection-<cid>` directory names.
    pub fn parse_collection_dir(&self, name: &str) -> Option<CollectionId> {
        self.collection_pattern
            .captures(name)
            .and_then(|captures| captures[1].parse().ok())
    }

    /// Tombstone location for a collection directory: `collection-<cid>`
    /// becomes `deleted-<cid>` next to it.
    pub fn deleted_dir_for(&self, collection_dir: &Path) -> Option<PathBuf> {
        let name = collection_dir.file_name()?.to_str()?;
        let cid = self.parse_collection_dir(name)?;
        let parent = collection_dir.parent()?;
        Some(parent.join(format!("{}{}", DELETED_PREFIX, cid)))
    }
}

pub fn parameter_path(collection_dir: &Path) -> PathBuf {
    collection_dir.join(PARAMETER_FILE)
}

pub fn parameter_tmp_path(collection_dir: &Path) -> PathBuf {
    collection_dir.join(format!("{}.tmp", PARAMETER_FILE))
}

pub fn journal_path(collection_dir: &Path) -> PathBuf {
    collection_dir.join(JOURNAL_FILE)
}

pub fn index_path(collection_dir: &Path, iid: IndexId) -> PathBuf {
    collection_dir.join(format!("index-{}.json", iid))
}

/// Parses `index-<iid>.json` file names.
pub fn parse_index_file(name: &str) -> Option<IndexId> {
    name.strip_prefix("index-")?.strip_suffix(".json")?.parse().ok()
}
