use std::fs;
use std::path::PathBuf;
use crate::core::error::Result;
use crate::core::tick::TickGenerator;
use crate::storage::layout::{StorageLayout, DELETED_PREFIX, LOCK_FILE};
use crate::storage::parameter::CollectionInfo;

/// A persisted collection found on disk.
#[derive(Debug, Clone)]
pub struct ScannedCollection {
    pub info: CollectionInfo,
    pub path: PathBuf,
}

/// Scans the database directory for `collection-<cid>` directories.
///
/// Directories without a readable metadata record are skipped. Collections
/// flagged as deleted are wiped or renamed to `deleted-<cid>` and never
/// returned. Every returned id has been fed to `ticks.observe_tick`.
/// Only a failure to list the directory itself is fatal.
pub fn scan_path(
    layout: &StorageLayout,
    remove_on_drop: bool,
    ticks: &TickGenerator,
) -> Result<Vec<ScannedCollection>> {
    let mut found = Vec::new();

    let mut names = Vec::new();
    for entry in fs::read_dir(&layout.base_dir)? {
        names.push(entry?.file_name());
    }
    names.sort();

    for name in names {
        let name = name.to_string_lossy().into_owned();

        let Some(dir_cid) = layout.parse_collection_dir(&name) else {
            if name != LOCK_FILE {
                tracing::debug!(entry = %name, "ignoring file/directory");
            }
            continue;
        };

        let path = layout.base_dir.join(&name);
        if !path.is_dir() {
            tracing::debug!(path = %path.display(), "ignoring non-directory");
            continue;
        }

        let info = match CollectionInfo::load(&path) {
            Ok(info) => info,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "ignoring directory without valid parameter file");
                continue;
            }
        };

        ticks.observe_tick(info.cid);

        if info.deleted {
            if remove_on_drop {
                tracing::warn!(collection = %name, "collection was deleted, wiping it");
                if let Err(e) = fs::remove_dir_all(&path) {
                    tracing::warn!(error = %e, "cannot wipe deleted collection");
                }
            } else {
                let target = layout.base_dir.join(format!("{}{}", DELETED_PREFIX, dir_cid));
                tracing::warn!(collection = %name, target = %target.display(), "collection was deleted, renaming it");
                if let Err(e) = fs::rename(&path, &target) {
                    tracing::warn!(error = %e, "cannot rename deleted collection");
                }
            }
            continue;
        }

        tracing::debug!(path = %path.display(), name = %info.name, "found collection");
        found.push(ScannedCollection { info, path });
    }

    Ok(found)
}
