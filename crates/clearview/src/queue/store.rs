//! Ordered in-memory item store.

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::Serialize;
use tokio::sync::futures::Notified;
use tokio::sync::{broadcast, Notify};

use crate::broadcast::{ItemEvent, ItemEventBroadcaster};
use crate::item::{Artifact, BatchItem, ItemId, JobConfig, ProcessingStatus};

/// Per-status counts over the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    pub total: usize,
    pub queued: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
}

impl StoreStats {
    /// (completed + failed) / total, or 0.0 for an empty store.
    pub fn completion_fraction(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            (self.completed + self.failed) as f64 / self.total as f64
        }
    }

    pub fn is_processing(&self) -> bool {
        self.processing > 0
    }

    pub fn has_queued(&self) -> bool {
        self.queued > 0
    }
}

/// Ordered collection of batch items keyed by id.
///
/// Items keep insertion order. Every mutation wakes the queue driver and is
/// published as an [`ItemEvent`]. The lock is never held across an await.
pub struct ItemStore {
    items: RwLock<Vec<BatchItem>>,
    wake: Notify,
    events: ItemEventBroadcaster,
}

impl ItemStore {
    pub fn new(events: ItemEventBroadcaster) -> Self {
        Self {
            items: RwLock::new(Vec::new()),
            wake: Notify::new(),
            events,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<BatchItem>> {
        match self.items.read() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Item store lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<BatchItem>> {
        match self.items.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Item store lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn touched(&self, event: ItemEvent) {
        self.events.send(event);
        self.wake.notify_one();
    }

    /// Resolves after the next mutation. A mutation that happened while
    /// nobody was waiting is remembered, so a wakeup is never lost.
    pub fn changed(&self) -> Notified<'_> {
        self.wake.notified()
    }

    /// Wakes the driver without mutating anything.
    pub fn nudge(&self) {
        self.wake.notify_one();
    }

    pub fn events(&self) -> &ItemEventBroadcaster {
        &self.events
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ItemEvent> {
        self.events.subscribe()
    }

    /// Appends items at the end in the given order, each reset to queued.
    pub fn append(&self, items: Vec<BatchItem>) -> Vec<ItemId> {
        if items.is_empty() {
            return Vec::new();
        }

        let appended: Vec<BatchItem> = {
            let mut guard = self.write();
            let start = guard.len();
            for mut item in items {
                if guard.iter().any(|existing| existing.id == item.id) {
                    log::warn!("Duplicate item id {} on append, assigning a new one", item.id);
                    item.id = ItemId::new();
                }
                item.status = ProcessingStatus::Queued;
                item.result = None;
                item.error = None;
                item.job_config = None;
                guard.push(item);
            }
            guard[start..].to_vec()
        };

        for item in &appended {
            self.events.send(ItemEvent::status(item));
        }
        self.wake.notify_one();

        appended.into_iter().map(|item| item.id).collect()
    }

    /// Moves an item to `status`. Returns false when the item no longer
    /// exists or the transition is not allowed.
    ///
    /// Completion carries an artifact and goes through [`ItemStore::complete`].
    pub fn update_status(
        &self,
        id: &ItemId,
        status: ProcessingStatus,
        error: Option<String>,
    ) -> bool {
        if status == ProcessingStatus::Completed {
            log::warn!("Refusing to complete item {} without an artifact", id);
            return false;
        }

        let updated = {
            let mut guard = self.write();
            let Some(item) = guard.iter_mut().find(|item| &item.id == id) else {
                log::debug!("Status update for missing item {} ignored", id);
                return false;
            };
            if !item.status.can_transition_to(status) {
                log::warn!(
                    "Rejected transition {} -> {} for item {}",
                    item.status,
                    status,
                    id
                );
                return false;
            }

            item.status = status;
            item.result = None;
            item.error = match status {
                ProcessingStatus::Error => Some(error.unwrap_or_else(|| "Failed".to_string())),
                _ => None,
            };
            item.clone()
        };

        self.touched(ItemEvent::status(&updated));
        true
    }

    /// Marks a processing item completed with its artifact and, for video
    /// jobs, the configuration frozen at dispatch.
    pub fn complete(&self, id: &ItemId, artifact: Artifact, frozen: Option<JobConfig>) -> bool {
        let updated = {
            let mut guard = self.write();
            let Some(item) = guard.iter_mut().find(|item| &item.id == id) else {
                log::debug!("Completion for missing item {} discarded", id);
                return false;
            };
            if !item.status.can_transition_to(ProcessingStatus::Completed) {
                log::warn!("Rejected completion of item {} in state {}", id, item.status);
                return false;
            }

            item.status = ProcessingStatus::Completed;
            item.result = Some(artifact);
            item.error = None;
            item.job_config = frozen;
            item.clone()
        };

        self.touched(ItemEvent::status(&updated));
        true
    }

    /// Marks a processing item failed.
    pub fn fail(&self, id: &ItemId, reason: impl Into<String>) -> bool {
        self.update_status(id, ProcessingStatus::Error, Some(reason.into()))
    }

    /// Atomically claims the earliest queued item and marks it processing.
    ///
    /// Returns `None` while any item is already processing, which keeps at
    /// most one item in flight regardless of the caller.
    pub fn claim_next(&self) -> Option<BatchItem> {
        let claimed = {
            let mut guard = self.write();
            if guard
                .iter()
                .any(|item| item.status == ProcessingStatus::Processing)
            {
                return None;
            }
            let item = guard
                .iter_mut()
                .find(|item| item.status == ProcessingStatus::Queued)?;
            item.status = ProcessingStatus::Processing;
            item.clone()
        };

        self.touched(ItemEvent::status(&claimed));
        Some(claimed)
    }

    /// Deletes an item. Any in-flight settlement for it becomes a no-op.
    pub fn remove(&self, id: &ItemId) -> Option<BatchItem> {
        let removed = {
            let mut guard = self.write();
            let index = guard.iter().position(|item| &item.id == id)?;
            guard.remove(index)
        };

        self.touched(ItemEvent::removed(&removed));
        Some(removed)
    }

    /// Empties the store, returning how many items were dropped.
    pub fn clear(&self) -> usize {
        let count = {
            let mut guard = self.write();
            let count = guard.len();
            guard.clear();
            count
        };

        self.touched(ItemEvent::cleared(count));
        count
    }

    /// All items in insertion order.
    pub fn all(&self) -> Vec<BatchItem> {
        self.read().clone()
    }

    pub fn get(&self, id: &ItemId) -> Option<BatchItem> {
        self.read().iter().find(|item| &item.id == id).cloned()
    }

    pub fn find_first<P>(&self, predicate: P) -> Option<BatchItem>
    where
        P: Fn(&BatchItem) -> bool,
    {
        self.read().iter().find(|item| predicate(item)).cloned()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn stats(&self) -> StoreStats {
        let guard = self.read();
        let mut stats = StoreStats {
            total: guard.len(),
            ..Default::default()
        };
        for item in guard.iter() {
            match item.status {
                ProcessingStatus::Queued => stats.queued += 1,
                ProcessingStatus::Processing => stats.processing += 1,
                ProcessingStatus::Completed => stats.completed += 1,
                ProcessingStatus::Error => stats.failed += 1,
            }
        }
        stats
    }
}

impl Default for ItemStore {
    fn default() -> Self {
        Self::new(ItemEventBroadcaster::default())
    }
}

impl std::fmt::Debug for ItemStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ItemStore")
            .field("stats", &self.stats())
            .finish()
    }
}
