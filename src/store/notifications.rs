//! Client-side source of truth for notifications.
//!
//! One [`NotificationStore`] is built at startup and cloned into every
//! consumer. Each clone shares the same state. Every mutation:
//! - recomputes `unread_count` from the list (it is never set directly)
//! - writes `{notifications, unreadCount}` through to the [`SnapshotStore`]
//! - wakes `subscribe()` receivers when something changed
//!
//! Persistence failures are logged; the in-memory state always wins.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;

use super::snapshot::{MemorySnapshotStore, PersistedSnapshot, SnapshotStore};
use crate::models::Notification;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationState {
    /// Newest first.
    pub notifications: Vec<Notification>,
    pub unread_count: usize,
    pub current_page: u32,
    /// Whether `current_page` came from a backlog fetch in this session.
    /// Hydration and pushes fill the list without moving the cursor.
    pub page_loaded: bool,
    pub has_more: bool,
    pub total_elements: u64,
    pub loading: bool,
    pub error: Option<String>,
}

impl Default for NotificationState {
    fn default() -> Self {
        Self {
            notifications: Vec::new(),
            unread_count: 0,
            current_page: 0,
            page_loaded: false,
            has_more: true,
            total_elements: 0,
            loading: false,
            error: None,
        }
    }
}

impl NotificationState {
    fn contains(&self, id: &str) -> bool {
        self.notifications.iter().any(|n| n.id == id)
    }

    fn persisted(&self) -> PersistedSnapshot {
        PersistedSnapshot {
            notifications: self.notifications.clone(),
            unread_count: self.unread_count,
        }
    }
}

fn count_unread(list: &[Notification]) -> usize {
    list.iter().filter(|n| !n.read).count()
}

/// Drop entries whose id is in `seen` or repeats earlier in `list`.
fn dedup_into(list: Vec<Notification>, seen: &mut HashSet<String>) -> Vec<Notification> {
    list.into_iter()
        .filter(|n| seen.insert(n.id.clone()))
        .collect()
}

#[derive(Clone)]
pub struct NotificationStore {
    state: Arc<watch::Sender<NotificationState>>,
    persistence: Arc<dyn SnapshotStore>,
}

impl NotificationStore {
    /// Restore the last snapshot from `persistence`, or start empty.
    pub fn hydrate(persistence: Arc<dyn SnapshotStore>) -> Self {
        let mut initial = NotificationState::default();
        match persistence.load() {
            Ok(Some(snapshot)) => {
                let mut seen = HashSet::new();
                initial.notifications = dedup_into(snapshot.notifications, &mut seen);
                initial.unread_count = count_unread(&initial.notifications);
                if initial.unread_count != snapshot.unread_count {
                    tracing::debug!(
                        stored = snapshot.unread_count,
                        derived = initial.unread_count,
                        "persisted unread count was stale, using derived value"
                    );
                }
                tracing::info!(count = initial.notifications.len(), "restored notification snapshot");
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(error = %e, "failed to restore notification snapshot, starting empty");
            }
        }

        let (state, _) = watch::channel(initial);
        Self {
            state: Arc::new(state),
            persistence,
        }
    }

    /// Empty store backed by memory only.
    pub fn in_memory() -> Self {
        Self::hydrate(Arc::new(MemorySnapshotStore::default()))
    }

    // ── Reads ─────────────────────────────────────────────────

    pub fn snapshot(&self) -> NotificationState {
        self.state.borrow().clone()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.state.borrow().notifications.clone()
    }

    pub fn unread_count(&self) -> usize {
        self.state.borrow().unread_count
    }

    pub fn get(&self, id: &str) -> Option<Notification> {
        self.state
            .borrow()
            .notifications
            .iter()
            .find(|n| n.id == id)
            .cloned()
    }

    pub fn subscribe(&self) -> watch::Receiver<NotificationState> {
        self.state.subscribe()
    }

    // ── List mutations (persisted) ────────────────────────────

    /// Replace the whole list, e.g. after the first backlog page loads.
    pub fn set_notifications(&self, list: Vec<Notification>) {
        self.mutate_list("set_notifications", |state| {
            let mut seen = HashSet::new();
            state.notifications = dedup_into(list, &mut seen);
            true
        });
    }

    /// Merge an older page at the tail, skipping ids already present.
    /// Returns how many entries were appended.
    pub fn append_notifications(&self, list: Vec<Notification>) -> usize {
        let mut appended = 0;
        self.mutate_list("append_notifications", |state| {
            let mut seen: HashSet<String> =
                state.notifications.iter().map(|n| n.id.clone()).collect();
            let fresh = dedup_into(list, &mut seen);
            appended = fresh.len();
            state.notifications.extend(fresh);
            appended > 0
        });
        appended
    }

    /// Prepend a realtime push. A push whose id is already in the list is
    /// ignored so the existing entry (and its read flag) wins.
    pub fn add_notification(&self, item: Notification) -> bool {
        let mut inserted = false;
        self.mutate_list("add_notification", |state| {
            if state.contains(&item.id) {
                tracing::debug!(id = %item.id, "duplicate push ignored");
                return false;
            }
            state.notifications.insert(0, item);
            inserted = true;
            true
        });
        inserted
    }

    /// Returns `true` if an unread entry was flipped.
    pub fn mark_as_read(&self, id: &str) -> bool {
        let mut changed = false;
        self.mutate_list("mark_as_read", |state| {
            if let Some(n) = state.notifications.iter_mut().find(|n| n.id == id && !n.read) {
                n.read = true;
                changed = true;
            }
            changed
        });
        changed
    }

    /// Returns how many entries were flipped.
    pub fn mark_all_as_read(&self) -> usize {
        let mut flipped = 0;
        self.mutate_list("mark_all_as_read", |state| {
            for n in state.notifications.iter_mut().filter(|n| !n.read) {
                n.read = true;
                flipped += 1;
            }
            flipped > 0
        });
        flipped
    }

    pub fn remove_notification(&self, id: &str) -> bool {
        let mut removed = false;
        self.mutate_list("remove_notification", |state| {
            let before = state.notifications.len();
            state.notifications.retain(|n| n.id != id);
            removed = state.notifications.len() != before;
            removed
        });
        removed
    }

    /// Empty the list and reset pagination to its initial cursor.
    pub fn clear_all(&self) {
        self.mutate_list("clear_all", |state| {
            *state = NotificationState::default();
            true
        });
    }

    // ── Session-only state ────────────────────────────────────

    pub fn set_pagination(&self, page: u32, has_more: bool, total: u64) {
        self.state.send_if_modified(|state| {
            let changed = state.current_page != page
                || !state.page_loaded
                || state.has_more != has_more
                || state.total_elements != total;
            state.current_page = page;
            state.page_loaded = true;
            state.has_more = has_more;
            state.total_elements = total;
            changed
        });
    }

    pub fn set_loading(&self, loading: bool) {
        self.state.send_if_modified(|state| {
            std::mem::replace(&mut state.loading, loading) != loading
        });
    }

    pub fn set_error(&self, error: Option<String>) {
        self.state.send_if_modified(|state| {
            let changed = state.error != error;
            state.error = error;
            changed
        });
    }

    /// Apply `op` under the state lock. When it reports a change the unread
    /// count is re-derived and the snapshot written before waking subscribers.
    ///
    /// The save is synchronous and runs while the watch write lock is held,
    /// so snapshots land in mutation order and no reader sees a list newer
    /// than the one on disk. A caller on a Tokio worker (push handlers run on
    /// the transport task) blocks for one small file write per mutation.
    fn mutate_list<F>(&self, op: &'static str, f: F)
    where
        F: FnOnce(&mut NotificationState) -> bool,
    {
        self.state.send_if_modified(|state| {
            if !f(state) {
                return false;
            }
            state.unread_count = count_unread(&state.notifications);
            if let Err(e) = self.persistence.save(&state.persisted()) {
                tracing::warn!(op, error = %e, "failed to persist notification snapshot");
            }
            true
        });
    }
}
