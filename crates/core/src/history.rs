//! Linear undo/redo history of scene snapshots
//!
//! Every entry is a full, immutable snapshot shared through `Arc`, so
//! restoring never copies more than the scene itself. Each page owns its own
//! history; an entry records the page it was captured on.

use std::sync::Arc;

use crate::scene::{SceneGraph, SceneSnapshot};

/// One recorded scene state
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub snapshot: Arc<SceneSnapshot>,
    pub page_index: usize,
}

/// Bounded linear history with a movable cursor
///
/// Index 0 is the oldest state still kept; the cursor points at the entry
/// matching the current scene. A new snapshot discards everything after the
/// cursor, so a redo branch can never be resurrected.
#[derive(Debug, Clone)]
pub struct HistoryManager {
    entries: Vec<HistoryEntry>,
    index: usize,
    capacity: usize,
    page_index: usize,
}

impl HistoryManager {
    pub fn new(capacity: usize, page_index: usize) -> Self {
        Self {
            entries: Vec::new(),
            index: 0,
            capacity: capacity.max(1),
            page_index,
        }
    }

    /// Start over with `scene` as the only (base) state
    pub fn seeded(capacity: usize, page_index: usize, scene: &SceneGraph) -> Self {
        let mut history = Self::new(capacity, page_index);
        history.snapshot(scene);
        history
    }

    /// Record the current scene
    pub fn snapshot(&mut self, scene: &SceneGraph) {
        if !self.entries.is_empty() {
            self.entries.truncate(self.index + 1);
        }
        self.entries.push(HistoryEntry {
            snapshot: Arc::new(scene.to_snapshot()),
            page_index: self.page_index,
        });
        if self.entries.len() > self.capacity {
            let excess = self.entries.len() - self.capacity;
            self.entries.drain(..excess);
        }
        self.index = self.entries.len() - 1;
        log::debug!(
            "history snapshot {} of {} (page {})",
            self.index + 1,
            self.entries.len(),
            self.page_index + 1
        );
    }

    /// Step back; `None` at the oldest entry
    pub fn undo(&mut self) -> Option<Arc<SceneSnapshot>> {
        if self.index == 0 || self.entries.is_empty() {
            return None;
        }
        self.index -= 1;
        Some(Arc::clone(&self.entries[self.index].snapshot))
    }

    /// Step forward; `None` at the newest entry
    pub fn redo(&mut self) -> Option<Arc<SceneSnapshot>> {
        if self.index + 1 >= self.entries.len() {
            return None;
        }
        self.index += 1;
        Some(Arc::clone(&self.entries[self.index].snapshot))
    }

    pub fn can_undo(&self) -> bool {
        self.index > 0
    }

    pub fn can_redo(&self) -> bool {
        self.index + 1 < self.entries.len()
    }

    /// Snapshot at the cursor
    pub fn current(&self) -> Option<&HistoryEntry> {
        self.entries.get(self.index)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.index = 0;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn page_index(&self) -> usize {
        self.page_index
    }
}
