use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use chrono::{DateTime, Utc};
use crc32fast::Hasher;
use serde::{Deserialize, Serialize};
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::Document;

const MAX_ENTRY_SIZE: usize = 64 * 1024 * 1024;

/// Append-only document journal of a collection
///
/// Frame layout: `[len: u32 LE][crc32: u32 LE][bincode entry]`.
pub struct Journal {
    pub file: File,
    pub path: PathBuf,
    pub position: u64,
    pub sync_mode: SyncMode,
    pub unsynced: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    Immediate,  // fsync after every write
    Deferred,   // fsync by the synchroniser thread
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEntry {
    pub tick: u64,
    pub marker: Marker,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Marker {
    // Bodies are stored as JSON text; bincode cannot decode self-describing values
    Document { key: String, body: Vec<u8> },
    Deletion { key: String },
}

impl Marker {
    pub fn document(doc: &Document) -> Result<Self> {
        Ok(Marker::Document {
            key: doc.key.clone(),
            body: serde_json::to_vec(&doc.body)?,
        })
    }
}

impl Journal {
    /// Create an empty journal, replacing any existing file
    pub fn create(path: &Path, sync_mode: SyncMode) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .read(true)
            .truncate(true)
            .open(path)?;

        Ok(Journal {
            file,
            path: path.to_path_buf(),
            position: 0,
            sync_mode,
            unsynced: false,
        })
    }

    /// Open an existing journal and read back all intact entries.
    ///
    /// A torn or corrupt tail is cut off.
    pub fn open(path: &Path, sync_mode: SyncMode) -> Result<(Self, Vec<JournalEntry>)> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;

        let mut journal = Journal {
            file,
            path: path.to_path_buf(),
            position: 0,
            sync_mode,
            unsynced: false,
        };

        let entries = journal.read_entries()?;
        Ok((journal, entries))
    }

    pub fn append(&mut self, tick: u64, marker: Marker) -> Result<()> {
        let entry = JournalEntry {
            tick,
            marker,
            timestamp: Utc::now(),
        };

        let data = bincode::serialize(&entry)?;
        let len = data.len() as u32;

        let mut hasher = Hasher::new();
        hasher.update(&data);
        let checksum = hasher.finalize();

        let mut frame = Vec::with_capacity(8 + data.len());
        frame.extend_from_slice(&len.to_le_bytes());
        frame.extend_from_slice(&checksum.to_le_bytes());
        frame.extend_from_slice(&data);

        self.file.seek(SeekFrom::Start(self.position))?;
        self.file.write_all(&frame)?;
        self.position += frame.len() as u64;

        match self.sync_mode {
            SyncMode::Immediate => self.file.sync_data()?,
            SyncMode::Deferred => self.unsynced = true,
        }

        Ok(())
    }

    pub fn sync(&mut self) -> Result<()> {
        if self.unsynced {
            self.file.sync_data()?;
            self.unsynced = false;
        }
        Ok(())
    }

    pub fn size(&self) -> u64 {
        self.position
    }

    fn read_entries(&mut self) -> Result<Vec<JournalEntry>> {
        let mut entries = Vec::new();
        let mut good_position = 0u64;

        self.file.seek(SeekFrom::Start(0))?;

        loop {
            let mut header = [0u8; 8];
            match self.file.read_exact(&mut header) {
                Ok(_) => {}
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(Error::new(ErrorKind::Io, format!("failed to read journal: {}", e))),
            }

            let len = u32::from_le_bytes([header[0], header[1], header[2], header[3]]) as usize;
            let checksum = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);

            if len > MAX_ENTRY_SIZE {
                break;
            }

            let mut data = vec![0u8; len];
            if self.file.read_exact(&mut data).is_err() {
                break;
            }

            let mut hasher = Hasher::new();
            hasher.update(&data);
            if hasher.finalize() != checksum {
                break;
            }

            match bincode::deserialize::<JournalEntry>(&data) {
                Ok(entry) => entries.push(entry),
                Err(_) => break,
            }

            good_position += 8 + len as u64;
        }

        let end = self.file.seek(SeekFrom::End(0))?;
        if end > good_position {
            tracing::warn!(
                path = %self.path.display(),
                dropped = end - good_position,
                "truncating corrupt journal tail"
            );
            self.file.set_len(good_position)?;
        }

        self.position = good_position;
        Ok(entries)
    }

    /// Replace the journal with one holding only the given documents.
    pub fn rewrite(&mut self, documents: &[&Document]) -> Result<()> {
        let tmp_path = self.path.with_extension("db.tmp");
        {
            let mut compacted = Journal::create(&tmp_path, SyncMode::Deferred)?;
            for doc in documents {
                compacted.append(doc.rid, Marker::document(doc)?)?;
            }
            compacted.file.sync_all()?;
        }

        fs::rename(&tmp_path, &self.path)?;

        let file = OpenOptions::new().read(true).write(true).open(&self.path)?;
        self.position = file.metadata()?.len();
        self.file = file;
        self.unsynced = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_append_and_replay() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("journal.db");

        {
            let mut journal = Journal::create(&path, SyncMode::Immediate).unwrap();
            let doc = Document::new("k1".into(), 10, json!({"a": 1}));
            journal.append(10, Marker::document(&doc).unwrap()).unwrap();
            journal.append(11, Marker::Deletion { key: "k1".into() }).unwrap();
        }

        let (_, entries) = Journal::open(&path, SyncMode::Deferred).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].tick, 10);
        assert!(matches!(&entries[1].marker, Marker::Deletion { key } if key == "k1"));
    }

    #[test]
    fn test_torn_tail_is_truncated() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("journal.db");

        let intact_len = {
            let mut journal = Journal::create(&path, SyncMode::Immediate).unwrap();
            let doc = Document::new("k1".into(), 1, json!({}));
            journal.append(1, Marker::document(&doc).unwrap()).unwrap();
            journal.size()
        };

        {
            let mut file = OpenOptions::new().append(true).open(&path).unwrap();
            file.write_all(&[200, 0, 0, 0, 1, 2]).unwrap();
        }

        let (mut journal, entries) = Journal::open(&path, SyncMode::Immediate).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(journal.size(), intact_len);

        journal.append(2, Marker::Deletion { key: "k1".into() }).unwrap();
        let (_, entries) = Journal::open(&path, SyncMode::Immediate).unwrap();
        assert_eq!(entries.len(), 2);
    }
}
