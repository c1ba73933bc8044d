use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread::JoinHandle;
use parking_lot::{Mutex, RwLock};
use crate::core::config::Config;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::names::check_name;
use crate::core::tick::TickGenerator;
use crate::core::types::{CollectionId, CollectionType};
use crate::storage::file_lock::FileLock;
use crate::storage::layout::StorageLayout;
use crate::storage::parameter::CollectionInfo;
use crate::storage::scanner::scan_path;
use crate::vocbase::auth::AuthTable;
use crate::vocbase::maintenance::{self, MaintenanceSignal, Worker};
use crate::vocbase::proxy::{CollectionGuard, CollectionProxy};
use crate::vocbase::status::CollectionStatus;

pub const USERS_COLLECTION: &str = "_users";

/// Owning set of proxies plus the name and id lookup tables.
///
/// A proxy in either table is always in `collections`. Dropped proxies leave
/// the tables at once and move from `collections` to `dead` once their files
/// are gone.
#[derive(Debug, Default)]
pub(crate) struct Registry {
    pub collections: Vec<Arc<CollectionProxy>>,
    pub by_name: HashMap<String, Arc<CollectionProxy>>,
    pub by_id: HashMap<CollectionId, Arc<CollectionProxy>>,
    pub dead: Vec<Arc<CollectionProxy>>,
}

impl Registry {
    fn register(&mut self, name: &str, proxy: Arc<CollectionProxy>) -> Result<()> {
        if self.by_name.contains_key(name) {
            return Err(Error::new(
                ErrorKind::DuplicateName,
                format!("collection '{}' already exists", name),
            ));
        }
        if self.by_id.contains_key(&proxy.id()) {
            return Err(Error::new(
                ErrorKind::DuplicateIdentifier,
                format!("collection id {} already exists", proxy.id()),
            ));
        }

        self.by_name.insert(name.to_string(), Arc::clone(&proxy));
        self.by_id.insert(proxy.id(), Arc::clone(&proxy));
        self.collections.push(proxy);
        Ok(())
    }

    /// Removes the lookup entries of `proxy`; it stays in the owning set.
    pub fn unregister(&mut self, name: &str, proxy: &Arc<CollectionProxy>) {
        if self.by_name.get(name).is_some_and(|p| Arc::ptr_eq(p, proxy)) {
            self.by_name.remove(name);
        }
        if self.by_id.get(&proxy.id()).is_some_and(|p| Arc::ptr_eq(p, proxy)) {
            self.by_id.remove(&proxy.id());
        }
    }

    /// Moves an unregistered proxy to the dead list.
    pub fn retire(&mut self, proxy: &Arc<CollectionProxy>) {
        if let Some(position) = self.collections.iter().position(|p| Arc::ptr_eq(p, proxy)) {
            let proxy = self.collections.remove(position);
            self.dead.push(proxy);
        }
    }

    fn remove(&mut self, name: &str, proxy: &Arc<CollectionProxy>) {
        self.unregister(name, proxy);
        self.collections.retain(|p| !Arc::ptr_eq(p, proxy));
    }
}

/// Options for [`Database::create_collection`].
#[derive(Debug, Clone, Default)]
pub struct CreateOptions {
    pub kind: CollectionType,
    pub maximal_size: Option<u64>,
    pub wait_for_sync: Option<bool>,
    pub id: Option<CollectionId>,
    /// Allows a leading underscore in the name. Persisted as given.
    pub is_system: bool,
}

/// State shared between the database handle and its maintenance threads.
pub(crate) struct DatabaseCore {
    pub config: Config,
    pub layout: StorageLayout,
    pub ticks: Arc<TickGenerator>,
    pub registry: RwLock<Registry>,
    pub auth: RwLock<AuthTable>,
    pub opens: AtomicUsize,
    pub signal: MaintenanceSignal,
}

impl DatabaseCore {
    /// Snapshot of the owning set.
    pub fn collections(&self) -> Vec<Arc<CollectionProxy>> {
        self.registry.read().collections.clone()
    }

    fn find_by_name(&self, name: &str) -> Option<Arc<CollectionProxy>> {
        self.registry.read().by_name.get(name).cloned()
    }

    fn find_by_id(&self, cid: CollectionId) -> Option<Arc<CollectionProxy>> {
        self.registry.read().by_id.get(&cid).cloned()
    }

    fn create_new(
        &self,
        name: &str,
        kind: CollectionType,
        cid: Option<CollectionId>,
        is_system: bool,
    ) -> Result<Arc<CollectionProxy>> {
        check_name(is_system, name)?;

        let cid = match cid {
            Some(cid) => {
                self.ticks.observe_tick(cid);
                cid
            }
            None => self.ticks.new_tick(),
        };

        let proxy = Arc::new(CollectionProxy::new(cid, kind, is_system, name, CollectionStatus::NewBorn, None));
        self.registry.write().register(name, Arc::clone(&proxy))?;
        tracing::debug!(cid, name, "registered new born collection");
        Ok(proxy)
    }

    fn find_or_bear(&self, name: &str, kind: CollectionType, is_system: bool) -> Result<Arc<CollectionProxy>> {
        check_name(is_system, name)?;

        let mut registry = self.registry.write();
        if let Some(proxy) = registry.by_name.get(name) {
            return Ok(Arc::clone(proxy));
        }

        let cid = self.ticks.new_tick();
        let proxy = Arc::new(CollectionProxy::new(cid, kind, is_system, name, CollectionStatus::NewBorn, None));
        registry.register(name, Arc::clone(&proxy))?;
        Ok(proxy)
    }

    fn create_collection(&self, name: &str, options: CreateOptions) -> Result<Arc<CollectionProxy>> {
        let proxy = self.create_new(name, options.kind, options.id, options.is_system)?;

        let mut info = CollectionInfo::new(
            proxy.id(),
            name,
            options.kind,
            options.maximal_size.unwrap_or(self.config.default_maximal_size),
        );
        info.wait_for_sync = options.wait_for_sync.unwrap_or(self.config.default_wait_for_sync);
        info.is_system = options.is_system;

        let result = {
            let mut state = proxy.state.write();
            self.manifest(&proxy, &mut state, info)
        };

        if let Err(e) = result {
            self.registry.write().remove(name, &proxy);
            return Err(e);
        }
        Ok(proxy)
    }

    fn list_all(&self) -> Vec<Arc<CollectionProxy>> {
        let registry = self.registry.read();
        registry
            .collections
            .iter()
            .filter(|proxy| registry.by_id.contains_key(&proxy.id()))
            .cloned()
            .collect()
    }
}

/// An open database directory.
///
/// Dropping the handle closes it: every collection is unloaded, the
/// maintenance threads are joined and the directory lock is released.
pub struct Database {
    core: Arc<DatabaseCore>,
    workers: Mutex<Vec<(Worker, JoinHandle<()>)>>,
    lock: Mutex<Option<FileLock>>,
    closed: AtomicBool,
}

impl Database {
    pub fn open(config: Config) -> Result<Database> {
        Self::open_with_ticks(config, Arc::new(TickGenerator::new()))
    }

    /// Opens the database with an injected tick generator.
    pub fn open_with_ticks(config: Config, ticks: Arc<TickGenerator>) -> Result<Database> {
        if !config.database_path.is_dir() {
            return Err(Error::new(
                ErrorKind::WrongDatabasePath,
                format!("database path '{}' is not a directory", config.database_path.display()),
            ));
        }

        let layout = StorageLayout::new(config.database_path.clone());
        let lock = FileLock::acquire(&layout)?;

        let mut registry = Registry::default();
        for found in scan_path(&layout, config.remove_on_drop, &ticks)? {
            let proxy = Arc::new(CollectionProxy::new(
                found.info.cid,
                found.info.kind,
                found.info.is_system,
                &found.info.name,
                CollectionStatus::Unloaded,
                Some(found.path),
            ));

            if let Err(e) = registry.register(&found.info.name, proxy) {
                return Err(Error::new(
                    ErrorKind::CorruptedDatabase,
                    format!("cannot register collection '{}': {}", found.info.name, e),
                ));
            }
        }

        let collections = registry.collections.len();
        let start_maintenance = config.start_maintenance;

        let database = Database {
            core: Arc::new(DatabaseCore {
                config,
                layout,
                ticks,
                registry: RwLock::new(registry),
                auth: RwLock::new(AuthTable::new()),
                opens: AtomicUsize::new(0),
                signal: MaintenanceSignal::default(),
            }),
            workers: Mutex::new(Vec::new()),
            lock: Mutex::new(Some(lock)),
            closed: AtomicBool::new(false),
        };

        if start_maintenance {
            database.start_maintenance()?;
        }

        tracing::info!(path = %database.path().display(), collections, "opened database");
        Ok(database)
    }

    fn start_maintenance(&self) -> Result<()> {
        let mut workers = self.workers.lock();
        for worker in [Worker::Synchroniser, Worker::Compactor, Worker::Cleanup] {
            workers.push((worker, maintenance::spawn(&self.core, worker)?));
        }
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.core.layout.base_dir
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn check_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(Error::new(
                ErrorKind::DatabaseClosed,
                format!("database '{}' is closed", self.path().display()),
            ));
        }
        Ok(())
    }

    pub fn ticks(&self) -> &Arc<TickGenerator> {
        &self.core.ticks
    }

    pub fn find_by_name(&self, name: &str) -> Option<Arc<CollectionProxy>> {
        self.core.find_by_name(name)
    }

    pub fn find_by_id(&self, cid: CollectionId) -> Option<Arc<CollectionProxy>> {
        self.core.find_by_id(cid)
    }

    /// Registers a new born collection. Nothing is written until first use.
    /// System collections are created through
    /// [`create_collection`](Self::create_collection) only.
    pub fn create_new(
        &self,
        name: &str,
        kind: CollectionType,
        cid: Option<CollectionId>,
    ) -> Result<Arc<CollectionProxy>> {
        self.check_open()?;
        self.core.create_new(name, kind, cid, false)
    }

    /// Existing collection named `name`, or a new born one.
    pub fn find_or_bear(&self, name: &str, kind: CollectionType) -> Result<Arc<CollectionProxy>> {
        self.check_open()?;
        self.core.find_or_bear(name, kind, false)
    }

    /// Registers and manifests a collection. On failure nothing stays
    /// registered.
    pub fn create_collection(&self, name: &str, options: CreateOptions) -> Result<Arc<CollectionProxy>> {
        self.check_open()?;
        self.core.create_collection(name, options)
    }

    /// Registered collections, in registration order. Dropped ones are not
    /// listed.
    pub fn list_all(&self) -> Vec<Arc<CollectionProxy>> {
        self.core.list_all()
    }

    pub fn use_collection(&self, proxy: &Arc<CollectionProxy>) -> Result<CollectionGuard> {
        self.check_open()?;
        self.core.use_collection(proxy)
    }

    pub fn use_by_name(&self, name: &str) -> Result<CollectionGuard> {
        self.check_open()?;
        let proxy = self.find_by_name(name).ok_or_else(|| Error::not_found(name))?;
        self.core.use_collection(&proxy)
    }

    pub fn use_by_id(&self, cid: CollectionId) -> Result<CollectionGuard> {
        self.check_open()?;
        let proxy = self
            .find_by_id(cid)
            .ok_or_else(|| Error::not_found(&cid.to_string()))?;
        self.core.use_collection(&proxy)
    }

    pub fn unload(&self, proxy: &Arc<CollectionProxy>) -> Result<()> {
        self.check_open()?;
        self.core.unload_collection(proxy)
    }

    pub fn drop_collection(&self, proxy: &Arc<CollectionProxy>) -> Result<()> {
        self.check_open()?;
        self.core.drop_collection(proxy)
    }

    pub fn rename(&self, proxy: &Arc<CollectionProxy>, new_name: &str) -> Result<()> {
        self.check_open()?;
        self.core.rename_collection(proxy, new_name)
    }

    /// Number of times collection data was created or opened from disk.
    pub fn open_count(&self) -> usize {
        self.core.opens.load(Ordering::SeqCst)
    }

    /// Runs one pass of the cleanup worker on the calling thread.
    pub fn run_cleanup_pass(&self) {
        maintenance::cleanup_pass(&self.core);
    }

    pub fn run_sync_pass(&self) {
        maintenance::sync_pass(&self.core);
    }

    pub fn run_compaction_pass(&self) {
        maintenance::compaction_pass(&self.core);
    }

    /// Rebuilds the auth table from the `_users` collection. Returns the
    /// number of loaded users; without the collection the table is emptied.
    pub fn reload_auth(&self) -> Result<usize> {
        self.check_open()?;
        let Some(proxy) = self.find_by_name(USERS_COLLECTION) else {
            self.core.auth.write().clear();
            return Ok(0);
        };

        let users = self.core.use_collection(&proxy)?;
        let table = AuthTable::from_documents(&users.documents());
        let loaded = table.len();
        *self.core.auth.write() = table;

        tracing::info!(users = loaded, "loaded auth table");
        Ok(loaded)
    }

    pub fn auth(&self) -> parking_lot::RwLockReadGuard<'_, AuthTable> {
        self.core.auth.read()
    }

    /// Shuts the database down. Idempotent; also run on drop.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        for proxy in self.core.collections() {
            if let Err(e) = self.core.unload_collection(&proxy) {
                tracing::warn!(cid = proxy.id(), error = %e, "cannot unload collection");
            }
        }

        let workers: Vec<(Worker, JoinHandle<()>)> = self.workers.lock().drain(..).collect();
        let (cleanup, others): (Vec<_>, Vec<_>) = workers
            .into_iter()
            .partition(|(worker, _)| *worker == Worker::Cleanup);

        self.core.signal.stop_workers();
        for (worker, handle) in others {
            if handle.join().is_err() {
                tracing::error!(worker = worker.name(), "maintenance thread panicked");
            }
        }

        self.core.signal.stop_cleanup();
        if cleanup.is_empty() {
            maintenance::cleanup_pass(&self.core);
        }
        for (worker, handle) in cleanup {
            if handle.join().is_err() {
                tracing::error!(worker = worker.name(), "maintenance thread panicked");
            }
        }

        // still in use or never drained
        let remaining = {
            let registry = self.core.registry.read();
            registry.collections.iter().chain(registry.dead.iter()).cloned().collect::<Vec<_>>()
        };
        for proxy in remaining {
            let mut state = proxy.state.write();
            if let Some(live) = state.live.take() {
                if let Err(e) = live.close() {
                    tracing::warn!(cid = proxy.id(), error = %e, "cannot close collection");
                }
                if state.status.has_live_data() {
                    state.status = CollectionStatus::Unloaded;
                }
            }
        }

        {
            let mut registry = self.core.registry.write();
            registry.by_name.clear();
            registry.by_id.clear();
            registry.collections.clear();
            registry.dead.clear();
        }
        self.core.auth.write().clear();

        self.lock.lock().take();
        tracing::info!(path = %self.path().display(), "closed database");
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("path", &self.core.layout.base_dir)
            .field("closed", &self.is_closed())
            .finish()
    }
}
