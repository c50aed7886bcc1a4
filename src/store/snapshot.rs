//! Durable snapshot of the notification list.
//!
//! Only `notifications` and `unreadCount` are persisted; loading, error and
//! pagination state live for the session only.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::errors::Result;
use crate::models::Notification;

/// Fixed storage key; the file backend appends `.json`.
pub const STORAGE_NAME: &str = "notification-storage";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedSnapshot {
    pub notifications: Vec<Notification>,
    pub unread_count: usize,
}

pub trait SnapshotStore: Send + Sync {
    /// `Ok(None)` when nothing has been saved yet.
    fn load(&self) -> Result<Option<PersistedSnapshot>>;
    fn save(&self, snapshot: &PersistedSnapshot) -> Result<()>;
}

// ── File backend ──────────────────────────────────────────────

pub struct FileSnapshotStore {
    path: PathBuf,
}

impl FileSnapshotStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(format!("{}.json", STORAGE_NAME)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SnapshotStore for FileSnapshotStore {
    fn load(&self) -> Result<Option<PersistedSnapshot>> {
        let bytes = match std::fs::read(&self.path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    fn save(&self, snapshot: &PersistedSnapshot) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        // Write-then-rename so a crash never leaves a half-written snapshot.
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(snapshot)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

// ── In-memory backend ─────────────────────────────────────────

#[derive(Default)]
pub struct MemorySnapshotStore {
    slot: Mutex<Option<PersistedSnapshot>>,
    saves: AtomicUsize,
}

impl MemorySnapshotStore {
    pub fn with_snapshot(snapshot: PersistedSnapshot) -> Self {
        Self {
            slot: Mutex::new(Some(snapshot)),
            saves: AtomicUsize::new(0),
        }
    }

    /// Number of `save` calls so far.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn current(&self) -> Option<PersistedSnapshot> {
        self.slot.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn load(&self) -> Result<Option<PersistedSnapshot>> {
        Ok(self.current())
    }

    fn save(&self, snapshot: &PersistedSnapshot) -> Result<()> {
        *self.slot.lock().unwrap_or_else(|p| p.into_inner()) = Some(snapshot.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
