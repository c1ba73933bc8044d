use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use parking_lot::{Condvar, Mutex};
use crate::collection::BarrierKind;
use crate::core::error::Result;
use crate::vocbase::database::DatabaseCore;

/// The three background workers of a database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Worker {
    Synchroniser,
    Compactor,
    Cleanup,
}

impl Worker {
    pub fn name(&self) -> &'static str {
        match self {
            Worker::Synchroniser => "synchroniser",
            Worker::Compactor => "compactor",
            Worker::Cleanup => "cleanup",
        }
    }

    fn pass(&self, core: &DatabaseCore) {
        match self {
            Worker::Synchroniser => sync_pass(core),
            Worker::Compactor => compaction_pass(core),
            Worker::Cleanup => cleanup_pass(core),
        }
    }
}

#[derive(Debug, Default)]
struct SignalState {
    workers_stopping: bool,
    cleanup_stopping: bool,
}

/// Wake-up and shutdown signal shared by the maintenance threads.
///
/// The synchroniser and compactor stop first; cleanup is stopped separately
/// so that it can fire the barriers registered while the others wind down.
#[derive(Debug, Default)]
pub(crate) struct MaintenanceSignal {
    state: Mutex<SignalState>,
    wake: Condvar,
}

impl MaintenanceSignal {
    fn is_stopping(&self, worker: Worker) -> bool {
        let state = self.state.lock();
        match worker {
            Worker::Cleanup => state.cleanup_stopping,
            _ => state.workers_stopping,
        }
    }

    /// Sleeps for `interval` unless woken or told to stop.
    fn wait(&self, worker: Worker, interval: Duration) {
        let mut state = self.state.lock();
        let stopping = match worker {
            Worker::Cleanup => state.cleanup_stopping,
            _ => state.workers_stopping,
        };
        if !stopping {
            self.wake.wait_for(&mut state, interval);
        }
    }

    pub(crate) fn notify(&self) {
        self.wake.notify_all();
    }

    pub(crate) fn stop_workers(&self) {
        self.state.lock().workers_stopping = true;
        self.wake.notify_all();
    }

    pub(crate) fn stop_cleanup(&self) {
        self.state.lock().cleanup_stopping = true;
        self.wake.notify_all();
    }
}

/// Starts `worker` on its own thread. The thread runs one last pass after it
/// has been told to stop.
pub(crate) fn spawn(core: &Arc<DatabaseCore>, worker: Worker) -> Result<JoinHandle<()>> {
    let interval = match worker {
        Worker::Synchroniser => core.config.sync_interval,
        Worker::Compactor => core.config.compaction_interval,
        Worker::Cleanup => core.config.cleanup_interval,
    };
    let core = Arc::clone(core);

    let handle = thread::Builder::new()
        .name(format!("docvault-{}", worker.name()))
        .spawn(move || {
            tracing::info!(worker = worker.name(), "maintenance thread started");
            loop {
                let stopping = core.signal.is_stopping(worker);
                worker.pass(&core);
                if stopping {
                    break;
                }
                core.signal.wait(worker, interval);
            }
            tracing::info!(worker = worker.name(), "maintenance thread stopped");
        })?;

    Ok(handle)
}

/// Flushes pending journal writes of every loaded collection.
pub(crate) fn sync_pass(core: &DatabaseCore) {
    for proxy in core.collections() {
        let Some(live) = proxy.live() else { continue };
        if let Err(e) = live.sync() {
            tracing::warn!(cid = proxy.id(), error = %e, "cannot sync collection");
        }
    }
}

pub(crate) fn compaction_pass(core: &DatabaseCore) {
    for proxy in core.collections() {
        let Some(live) = proxy.live() else { continue };
        if let Err(e) = live.compact() {
            tracing::warn!(cid = proxy.id(), error = %e, "cannot compact collection");
        }
    }
}

/// Fires the barrier callbacks whose collections have no usage left.
pub(crate) fn cleanup_pass(core: &DatabaseCore) {
    for proxy in core.collections() {
        let Some(live) = proxy.live() else { continue };
        for kind in live.barriers().take_ready() {
            match kind {
                BarrierKind::UnloadCollection => core.complete_unload(&proxy),
                BarrierKind::DropCollection => core.complete_drop(&proxy),
            }
        }
    }
}
