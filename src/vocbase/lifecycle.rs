use std::fs;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use crate::collection::{BarrierKind, DocumentCollection};
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::names::check_name;
use crate::storage::parameter::{remove_dangling_tmp, CollectionInfo};
use crate::vocbase::database::DatabaseCore;
use crate::vocbase::proxy::{CollectionGuard, CollectionProxy, ProxyState};
use crate::vocbase::status::CollectionStatus;

// Lock order: proxy state before registry. Nothing below may call the
// proxy's own accessors while its state lock is held.

impl DatabaseCore {
    /// Makes a collection usable and registers a usage on it.
    ///
    /// Loaded collections are handed out under the read lock. Any other
    /// loadable state is resolved under the write lock, then the lookup is
    /// retried.
    pub(crate) fn use_collection(&self, proxy: &Arc<CollectionProxy>) -> Result<CollectionGuard> {
        loop {
            {
                let state = proxy.state.read();
                match state.status {
                    CollectionStatus::Loaded => {
                        let Some(live) = state.live.clone() else {
                            return Err(Error::internal(format!(
                                "loaded collection '{}' has no live data",
                                state.name
                            )));
                        };
                        live.barriers().acquire();
                        return Ok(CollectionGuard::new(Arc::clone(proxy), live));
                    }
                    CollectionStatus::Deleted => return Err(Error::not_found(&state.name)),
                    CollectionStatus::Corrupted => return Err(Error::corrupted(&state.name)),
                    CollectionStatus::NewBorn
                    | CollectionStatus::Unloaded
                    | CollectionStatus::Unloading => {}
                }
            }

            let mut state = proxy.state.write();
            match state.status {
                CollectionStatus::NewBorn => {
                    let info = self.default_info(proxy, &state.name);
                    self.manifest(proxy, &mut state, info)?;
                }
                CollectionStatus::Unloaded => self.load(proxy, &mut state)?,
                CollectionStatus::Unloading => {
                    let Some(live) = state.live.as_ref() else {
                        state.status = CollectionStatus::Corrupted;
                        return Err(Error::corrupted(&state.name));
                    };
                    if live.barriers().has_pending(BarrierKind::DropCollection) {
                        return Err(Error::not_found(&state.name));
                    }
                    tracing::debug!(cid = proxy.id(), name = %state.name, "resurrecting unloading collection");
                    state.status = CollectionStatus::Loaded;
                }
                // changed between the two locks
                _ => {}
            }
        }
    }

    pub(crate) fn default_info(&self, proxy: &CollectionProxy, name: &str) -> CollectionInfo {
        let mut info = CollectionInfo::new(
            proxy.id(),
            name,
            proxy.kind(),
            self.config.default_maximal_size,
        );
        info.wait_for_sync = self.config.default_wait_for_sync;
        info.is_system = proxy.is_system();
        info
    }

    /// Creates the on-disk structures of a new born collection.
    pub(crate) fn manifest(
        &self,
        proxy: &CollectionProxy,
        state: &mut ProxyState,
        info: CollectionInfo,
    ) -> Result<()> {
        let path = self.layout.collection_dir(proxy.id());
        self.opens.fetch_add(1, Ordering::SeqCst);

        match DocumentCollection::create(&path, info, Arc::clone(&self.ticks)) {
            Ok(live) => {
                state.path = Some(path);
                state.live = Some(Arc::new(live));
                state.status = CollectionStatus::Loaded;
                Ok(())
            }
            Err(e) => {
                tracing::error!(cid = proxy.id(), name = %state.name, error = %e, "cannot create collection");
                state.status = CollectionStatus::Corrupted;
                Err(e)
            }
        }
    }

    fn load(&self, proxy: &CollectionProxy, state: &mut ProxyState) -> Result<()> {
        let path = state
            .path
            .clone()
            .unwrap_or_else(|| self.layout.collection_dir(proxy.id()));
        self.opens.fetch_add(1, Ordering::SeqCst);

        match DocumentCollection::open(&path, Arc::clone(&self.ticks)) {
            Ok(live) => {
                state.path = Some(path);
                state.live = Some(Arc::new(live));
                state.status = CollectionStatus::Loaded;
                Ok(())
            }
            Err(e) => {
                tracing::error!(cid = proxy.id(), name = %state.name, error = %e, "cannot open collection");
                state.status = CollectionStatus::Corrupted;
                Err(e)
            }
        }
    }

    /// Requests an unload. Returns at once; the data is closed by the
    /// cleanup thread after the last usage is released.
    pub(crate) fn unload_collection(&self, proxy: &CollectionProxy) -> Result<()> {
        let mut state = proxy.state.write();
        match state.status {
            CollectionStatus::Unloaded
            | CollectionStatus::Unloading
            | CollectionStatus::NewBorn
            | CollectionStatus::Deleted => Ok(()),
            CollectionStatus::Corrupted => Err(Error::corrupted(&state.name)),
            CollectionStatus::Loaded => {
                let Some(live) = state.live.as_ref() else {
                    state.status = CollectionStatus::Corrupted;
                    return Err(Error::corrupted(&state.name));
                };
                live.barriers().register(BarrierKind::UnloadCollection);
                state.status = CollectionStatus::Unloading;
                drop(state);

                self.signal.notify();
                Ok(())
            }
        }
    }

    /// Unload callback, run by the cleanup thread.
    pub(crate) fn complete_unload(&self, proxy: &CollectionProxy) {
        let mut state = proxy.state.write();
        if state.status != CollectionStatus::Unloading {
            tracing::debug!(cid = proxy.id(), status = %state.status, "unload no longer wanted");
            return;
        }

        let Some(live) = state.live.clone() else {
            tracing::error!(cid = proxy.id(), name = %state.name, "unloading collection without live data");
            state.status = CollectionStatus::Corrupted;
            return;
        };

        if live.barriers().usages() > 0 {
            live.barriers().register(BarrierKind::UnloadCollection);
            return;
        }

        state.live = None;
        match live.close() {
            Ok(()) => {
                state.status = CollectionStatus::Unloaded;
                tracing::debug!(cid = proxy.id(), name = %state.name, "unloaded collection");
            }
            Err(e) => {
                tracing::error!(cid = proxy.id(), name = %state.name, error = %e, "cannot close collection");
                state.status = CollectionStatus::Corrupted;
            }
        }
    }

    /// Drops a collection. Unregisters it at once; files of loaded
    /// collections are removed by the cleanup thread once unused.
    pub(crate) fn drop_collection(&self, proxy: &Arc<CollectionProxy>) -> Result<()> {
        let mut state = proxy.state.write();
        match state.status {
            CollectionStatus::Deleted => {
                self.registry.write().unregister(&state.name, proxy);
                Ok(())
            }
            CollectionStatus::Corrupted => Err(Error::corrupted(&state.name)),
            CollectionStatus::NewBorn => {
                state.status = CollectionStatus::Deleted;
                self.registry.write().unregister(&state.name, proxy);
                Ok(())
            }
            CollectionStatus::Unloaded => {
                let path = state
                    .path
                    .clone()
                    .unwrap_or_else(|| self.layout.collection_dir(proxy.id()));
                remove_dangling_tmp(&path)?;
                let info = CollectionInfo { deleted: true, ..CollectionInfo::load(&path)? };
                info.save(&path)?;

                state.path = Some(path);
                state.status = CollectionStatus::Deleted;
                self.registry.write().unregister(&state.name, proxy);
                self.finish_drop(proxy, &state);
                Ok(())
            }
            CollectionStatus::Loaded | CollectionStatus::Unloading => {
                let Some(live) = state.live.clone() else {
                    state.status = CollectionStatus::Corrupted;
                    return Err(Error::corrupted(&state.name));
                };
                live.mark_deleted()?;

                state.status = CollectionStatus::Deleted;
                self.registry.write().unregister(&state.name, proxy);
                live.barriers().register(BarrierKind::DropCollection);
                drop(state);

                self.signal.notify();
                Ok(())
            }
        }
    }

    /// Drop callback, run by the cleanup thread.
    pub(crate) fn complete_drop(&self, proxy: &Arc<CollectionProxy>) {
        let mut state = proxy.state.write();
        if state.status != CollectionStatus::Deleted {
            tracing::error!(cid = proxy.id(), name = %state.name, "someone resurrected the collection");
            return;
        }

        if let Some(live) = state.live.clone() {
            if live.barriers().usages() > 0 {
                live.barriers().register(BarrierKind::DropCollection);
                return;
            }
            if let Err(e) = live.close() {
                tracing::error!(cid = proxy.id(), error = %e, "cannot close dropped collection");
            }
            state.live = None;
        }

        self.finish_drop(proxy, &state);
    }

    /// Retires the proxy and removes the collection directory.
    fn finish_drop(&self, proxy: &Arc<CollectionProxy>, state: &ProxyState) {
        self.registry.write().retire(proxy);

        let Some(path) = state.path.as_ref() else { return };
        let Some(target) = self.layout.deleted_dir_for(path) else {
            tracing::warn!(path = %path.display(), "unexpected collection directory name");
            return;
        };

        if target.exists() {
            if let Err(e) = fs::remove_dir_all(&target) {
                tracing::warn!(path = %target.display(), error = %e, "cannot remove old deleted directory");
            }
        }

        if let Err(e) = fs::rename(path, &target) {
            tracing::error!(path = %path.display(), error = %e, "cannot rename dropped collection");
            return;
        }

        if self.config.remove_on_drop {
            if let Err(e) = fs::remove_dir_all(&target) {
                tracing::error!(path = %target.display(), error = %e, "cannot remove dropped collection");
                return;
            }
        }
        tracing::debug!(cid = proxy.id(), "dropped collection");
    }

    pub(crate) fn rename_collection(&self, proxy: &Arc<CollectionProxy>, new_name: &str) -> Result<()> {
        let mut state = proxy.state.write();
        if state.name == new_name {
            return Ok(());
        }

        check_name(proxy.is_system(), new_name)?;
        match state.status {
            CollectionStatus::Corrupted => return Err(Error::corrupted(&state.name)),
            CollectionStatus::Deleted => return Err(Error::not_found(&state.name)),
            _ => {}
        }

        let mut registry = self.registry.write();
        if registry.by_name.contains_key(new_name) {
            return Err(Error::new(
                ErrorKind::DuplicateName,
                format!("collection '{}' already exists", new_name),
            ));
        }

        match state.status {
            CollectionStatus::Unloaded => {
                let path = state
                    .path
                    .clone()
                    .unwrap_or_else(|| self.layout.collection_dir(proxy.id()));
                remove_dangling_tmp(&path)?;
                let info = CollectionInfo { name: new_name.to_string(), ..CollectionInfo::load(&path)? };
                info.save(&path)?;
            }
            CollectionStatus::Loaded | CollectionStatus::Unloading => match state.live.as_ref() {
                Some(live) => live.rename(new_name)?,
                None => return Err(Error::corrupted(&state.name)),
            },
            CollectionStatus::NewBorn => {}
            status => {
                return Err(Error::internal(format!("unexpected collection status {}", status)));
            }
        }

        registry.by_name.remove(&state.name);
        registry.by_name.insert(new_name.to_string(), Arc::clone(proxy));
        tracing::debug!(cid = proxy.id(), from = %state.name, to = %new_name, "renamed collection");
        state.name = new_name.to_string();
        Ok(())
    }
}
