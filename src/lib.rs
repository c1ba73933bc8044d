pub mod core;
pub mod storage;
pub mod index;
pub mod collection;
pub mod vocbase;

pub use crate::core::config::Config;
pub use crate::core::error::{Error, ErrorKind, Result};
pub use crate::vocbase::{CollectionGuard, CollectionProxy, CollectionStatus, CreateOptions, Database};

/*
┌──────────────────────────────────────── DOCVAULT LAYERS ─────────────────────────────────────────┐
│                                                                                                   │
│  vocbase::Database ── owns ──> Registry { collections, by_name, by_id, dead }                     │
│        │                              │                                                           │
│        │ spawns                       └──> CollectionProxy { id, kind, RwLock<ProxyState> }       │
│        v                                         │ status: NEW_BORN / UNLOADED / LOADED / ...     │
│  synchroniser / compactor / cleanup              │ live (when loaded)                             │
│        │                                         v                                                │
│        └── fires barriers ──────────> collection::DocumentCollection                              │
│                                         ├── BarrierList  (usage count + deferred unload/drop)     │
│                                         ├── Journal      (journal.db)                             │
│                                         └── Vec<index::Index>                                     │
│                                               primary, edge, hash, skiplist, geo, fulltext,       │
│                                               priority queue, bitarray, cap                       │
│                                                                                                   │
│  storage: layout, parameter.json, lock file, directory scanner                                    │
│  core:    ticks, names, errors, config, documents                                                 │
└───────────────────────────────────────────────────────────────────────────────────────────────────┘
*/
