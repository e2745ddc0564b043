//! Page navigation and per-page scene storage
//!
//! The editor only keeps one live [`SceneGraph`]. Every other page's scene
//! is parked in its slot as a snapshot together with that page's undo
//! history, and swapped back in when the page is shown again.

use crate::error::EditorError;
use crate::history::HistoryManager;
use crate::scene::{SceneGraph, SceneSnapshot};

#[derive(Debug, Clone, Default)]
struct PageSlot {
    snapshot: Option<SceneSnapshot>,
    history: Option<HistoryManager>,
}

/// Current page plus the parked state of every other page
#[derive(Debug, Clone)]
pub struct PageNavigator {
    current: usize,
    slots: Vec<PageSlot>,
    history_capacity: usize,
}

impl PageNavigator {
    /// Navigator positioned on the first page
    pub fn new(total_pages: usize, history_capacity: usize) -> Self {
        Self {
            current: 0,
            slots: vec![PageSlot::default(); total_pages],
            history_capacity,
        }
    }

    pub fn total_pages(&self) -> usize {
        self.slots.len()
    }

    /// Zero-based index of the page shown
    pub fn current_index(&self) -> usize {
        self.current
    }

    /// One-based number of the page shown
    pub fn current_page(&self) -> usize {
        self.current + 1
    }

    /// `"2 / 5"`
    pub fn page_label(&self) -> String {
        format!("{} / {}", self.current_page(), self.total_pages())
    }

    pub fn has_previous(&self) -> bool {
        self.current > 0
    }

    pub fn has_next(&self) -> bool {
        self.current + 1 < self.slots.len()
    }

    /// Zero-based index for one-based `page`, rejecting anything outside
    /// `1..=total`
    pub fn validate(&self, page: usize) -> Result<usize, EditorError> {
        if page == 0 || page > self.slots.len() {
            return Err(EditorError::PageOutOfRange {
                requested: page,
                total: self.slots.len(),
            });
        }
        Ok(page - 1)
    }

    /// Fresh history for the page about to be shown
    pub fn initial_history(&self, scene: &SceneGraph) -> HistoryManager {
        HistoryManager::seeded(self.history_capacity, self.current, scene)
    }

    /// Park the live scene of the current page in its slot
    pub fn store_active(&mut self, scene: &SceneGraph) {
        if let Some(slot) = self.slots.get_mut(self.current) {
            slot.snapshot = Some(scene.to_snapshot());
        }
    }

    /// Switch to one-based `page`
    ///
    /// The outgoing scene and history are parked, then the target's are
    /// swapped into `scene` and `history` (an empty scene with a fresh
    /// history for a page never shown). On rejection nothing changes.
    /// Returns the zero-based index of the page left.
    pub fn go_to(
        &mut self,
        page: usize,
        scene: &mut SceneGraph,
        history: &mut HistoryManager,
    ) -> Result<usize, EditorError> {
        let target = self.validate(page)?;
        let outgoing = self.current;
        self.store_active(scene);
        if target == outgoing {
            return Ok(outgoing);
        }

        let capacity = self.history_capacity;
        let slot = &mut self.slots[target];
        let restored = slot
            .snapshot
            .as_ref()
            .map(SceneGraph::from_snapshot)
            .unwrap_or_default();
        let restored_history = slot
            .history
            .take()
            .unwrap_or_else(|| HistoryManager::seeded(capacity, target, &restored));

        self.slots[outgoing].history = Some(std::mem::replace(history, restored_history));
        *scene = restored;
        self.current = target;

        log::debug!("page {} -> {}", outgoing + 1, target + 1);
        Ok(outgoing)
    }

    /// Scene of `index` as last stored; the live scene for the current page
    pub fn scene_for(&self, index: usize, live: &SceneGraph) -> SceneGraph {
        if index == self.current {
            return live.clone();
        }
        self.slots
            .get(index)
            .and_then(|slot| slot.snapshot.as_ref())
            .map(SceneGraph::from_snapshot)
            .unwrap_or_default()
    }

    pub fn stored_snapshot(&self, index: usize) -> Option<&SceneSnapshot> {
        self.slots.get(index)?.snapshot.as_ref()
    }

    /// Parked snapshot of a page that is not shown, for deferred edits
    pub fn stored_snapshot_mut(&mut self, index: usize) -> Option<&mut SceneSnapshot> {
        if index == self.current {
            return None;
        }
        self.slots.get_mut(index)?.snapshot.as_mut()
    }
}
