use std::fmt;
use std::ops::Deref;
use std::path::PathBuf;
use std::sync::Arc;
use parking_lot::RwLock;
use crate::collection::DocumentCollection;
use crate::core::types::{CollectionId, CollectionType};
use crate::vocbase::status::CollectionStatus;

/// Mutable part of a proxy, guarded by the proxy's own lock.
#[derive(Debug)]
pub(crate) struct ProxyState {
    pub name: String,
    pub status: CollectionStatus,
    pub path: Option<PathBuf>,
    pub live: Option<Arc<DocumentCollection>>,
}

/// Long-lived record of one collection, whether or not its data is loaded.
///
/// Status, name, path and live data change only under the write lock.
/// When both locks are needed the proxy lock is taken before the registry
/// lock.
pub struct CollectionProxy {
    id: CollectionId,
    kind: CollectionType,
    is_system: bool,
    pub(crate) state: RwLock<ProxyState>,
}

impl CollectionProxy {
    pub(crate) fn new(
        id: CollectionId,
        kind: CollectionType,
        is_system: bool,
        name: &str,
        status: CollectionStatus,
        path: Option<PathBuf>,
    ) -> Self {
        CollectionProxy {
            id,
            kind,
            is_system,
            state: RwLock::new(ProxyState {
                name: name.to_string(),
                status,
                path,
                live: None,
            }),
        }
    }

    pub fn id(&self) -> CollectionId {
        self.id
    }

    pub fn kind(&self) -> CollectionType {
        self.kind
    }

    /// System collections may carry names with a leading underscore. The
    /// flag is fixed at creation and survives renames.
    pub fn is_system(&self) -> bool {
        self.is_system
    }

    pub fn name(&self) -> String {
        self.state.read().name.clone()
    }

    pub fn status(&self) -> CollectionStatus {
        self.state.read().status
    }

    pub fn path(&self) -> Option<PathBuf> {
        self.state.read().path.clone()
    }

    pub(crate) fn live(&self) -> Option<Arc<DocumentCollection>> {
        self.state.read().live.clone()
    }
}

impl fmt::Debug for CollectionProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read();
        f.debug_struct("CollectionProxy")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("is_system", &self.is_system)
            .field("name", &state.name)
            .field("status", &state.status)
            .finish()
    }
}

/// A used collection. Holds a usage reference on the live data until it is
/// released or dropped; unload and drop completion wait for it.
pub struct CollectionGuard {
    proxy: Arc<CollectionProxy>,
    collection: Arc<DocumentCollection>,
}

impl CollectionGuard {
    /// Wraps a collection whose usage count was already raised.
    pub(crate) fn new(proxy: Arc<CollectionProxy>, collection: Arc<DocumentCollection>) -> Self {
        CollectionGuard { proxy, collection }
    }

    pub fn proxy(&self) -> &Arc<CollectionProxy> {
        &self.proxy
    }

    pub fn release(self) {}
}

impl Deref for CollectionGuard {
    type Target = DocumentCollection;

    fn deref(&self) -> &DocumentCollection {
        &self.collection
    }
}

impl Drop for CollectionGuard {
    fn drop(&mut self) {
        self.collection.barriers().release();
    }
}

impl fmt::Debug for CollectionGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectionGuard").field("proxy", &self.proxy).finish()
    }
}
