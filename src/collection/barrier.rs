use std::collections::VecDeque;
use parking_lot::Mutex;

/// Deferred work attached to a loaded collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BarrierKind {
    UnloadCollection,
    DropCollection,
}

#[derive(Debug, Default)]
struct BarrierState {
    usages: usize,
    pending: VecDeque<BarrierKind>,
}

/// Usage count of a live collection plus the callbacks waiting for it to
/// drain.
///
/// Registration never blocks. A registered callback is handed out by
/// [`BarrierList::take_ready`] at most once, and only while no usage is
/// outstanding.
#[derive(Debug, Default)]
pub struct BarrierList {
    state: Mutex<BarrierState>,
}

impl BarrierList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquire(&self) {
        self.state.lock().usages += 1;
    }

    pub fn release(&self) {
        let mut state = self.state.lock();
        debug_assert!(state.usages > 0, "unbalanced collection release");
        state.usages = state.usages.saturating_sub(1);
    }

    pub fn usages(&self) -> usize {
        self.state.lock().usages
    }

    pub fn register(&self, kind: BarrierKind) {
        self.state.lock().pending.push_back(kind);
    }

    pub fn has_pending(&self, kind: BarrierKind) -> bool {
        self.state.lock().pending.contains(&kind)
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().pending.is_empty()
    }

    /// Removes and returns every pending callback if the usage count is zero.
    pub fn take_ready(&self) -> Vec<BarrierKind> {
        let mut state = self.state.lock();
        if state.usages > 0 {
            return Vec::new();
        }
        state.pending.drain(..).collect()
    }
}
