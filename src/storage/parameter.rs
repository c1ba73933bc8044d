use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use serde::{Deserialize, Serialize};
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::{CollectionId, CollectionType};
use crate::storage::layout::{parameter_path, parameter_tmp_path};

pub const PARAMETER_VERSION: u32 = 1;

/// Persisted collection metadata (`parameter.json`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionInfo {
    pub version: u32,
    #[serde(rename = "type")]
    pub kind: CollectionType,
    pub cid: CollectionId,
    pub name: String,
    #[serde(default)]
    pub deleted: bool,
    pub maximal_size: u64,
    #[serde(default)]
    pub wait_for_sync: bool,
    #[serde(default)]
    pub is_system: bool,
}

impl CollectionInfo {
    pub fn new(cid: CollectionId, name: &str, kind: CollectionType, maximal_size: u64) -> Self {
        CollectionInfo {
            version: PARAMETER_VERSION,
            kind,
            cid,
            name: name.to_string(),
            deleted: false,
            maximal_size,
            wait_for_sync: false,
            is_system: false,
        }
    }

    /// Load the metadata record of a collection directory
    pub fn load(collection_dir: &Path) -> Result<Self> {
        let path = parameter_path(collection_dir);
        let data = fs::read(&path)?;
        let info: CollectionInfo = serde_json::from_slice(&data)?;

        if info.name.is_empty() {
            return Err(Error::new(
                ErrorKind::Parse,
                format!("collection name missing in '{}'", path.display()),
            ));
        }

        Ok(info)
    }

    /// Save the metadata record, replacing the old one atomically
    pub fn save(&self, collection_dir: &Path) -> Result<()> {
        let data = serde_json::to_vec_pretty(self)?;
        write_atomic(&parameter_path(collection_dir), &parameter_tmp_path(collection_dir), &data)
    }
}

/// Write-temp-then-rename. The temporary file is synced before the rename so
/// a crash leaves either the old or the new content in place.
pub fn write_atomic(path: &Path, tmp_path: &Path, data: &[u8]) -> Result<()> {
    {
        let mut file = File::create(tmp_path)?;
        file.write_all(data)?;
        file.sync_all()?;
    }

    fs::rename(tmp_path, path)?;
    Ok(())
}

/// Remove a `parameter.json.tmp` left behind by an interrupted save.
pub fn remove_dangling_tmp(collection_dir: &Path) -> Result<bool> {
    let tmp = parameter_tmp_path(collection_dir);
    if tmp.exists() {
        fs::remove_file(&tmp)?;
        tracing::warn!(path = %tmp.display(), "removed dangling temporary file");
        return Ok(true);
    }
    Ok(false)
}
