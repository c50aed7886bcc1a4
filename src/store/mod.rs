pub mod notifications;
pub mod snapshot;

pub use notifications::{NotificationState, NotificationStore};
pub use snapshot::{FileSnapshotStore, MemorySnapshotStore, PersistedSnapshot, SnapshotStore};
