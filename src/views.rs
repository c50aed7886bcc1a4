//! Read projections and optimistic write actions for notification UIs.
//!
//! Writes always hit the local store first. The server sync runs on a spawned
//! task; its failure is logged and the local state is kept as-is.

use std::future::Future;
use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::api::NotificationSync;
use crate::channel::RealtimeChannel;
use crate::errors::Result;
use crate::models::Notification;
use crate::store::NotificationStore;

pub const DEFAULT_PAGE_SIZE: u32 = 20;
const BADGE_CAP: usize = 99;

/// Background server sync started by a write action. Awaiting it is optional.
pub type SyncTask = JoinHandle<()>;

pub struct NotificationCenter {
    company_id: String,
    store: NotificationStore,
    sync: Arc<dyn NotificationSync>,
    channel: Arc<dyn RealtimeChannel>,
    page_size: u32,
}

impl NotificationCenter {
    pub fn new(
        company_id: impl Into<String>,
        store: NotificationStore,
        sync: Arc<dyn NotificationSync>,
        channel: Arc<dyn RealtimeChannel>,
    ) -> Self {
        Self {
            company_id: company_id.into(),
            store,
            sync,
            channel,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn company_id(&self) -> &str {
        &self.company_id
    }

    // ── Projections ───────────────────────────────────────────

    pub fn notifications(&self) -> Vec<Notification> {
        self.store.notifications()
    }

    pub fn unread_count(&self) -> usize {
        self.store.unread_count()
    }

    pub fn unread(&self) -> Vec<Notification> {
        self.partition().0
    }

    pub fn read(&self) -> Vec<Notification> {
        self.partition().1
    }

    /// Badge label: hidden at zero, capped at "99+".
    pub fn badge(&self) -> Option<String> {
        match self.store.unread_count() {
            0 => None,
            n if n > BADGE_CAP => Some(format!("{}+", BADGE_CAP)),
            n => Some(n.to_string()),
        }
    }

    pub fn has_more(&self) -> bool {
        self.store.snapshot().has_more
    }

    pub fn is_loading(&self) -> bool {
        self.store.snapshot().loading
    }

    pub fn error(&self) -> Option<String> {
        self.store.snapshot().error
    }

    fn partition(&self) -> (Vec<Notification>, Vec<Notification>) {
        self.store.notifications().into_iter().partition(|n| !n.read)
    }

    // ── Optimistic writes ─────────────────────────────────────

    pub fn mark_as_read(&self, id: &str) -> SyncTask {
        self.store.mark_as_read(id);
        self.channel.mark_as_read(id);
        let id = id.to_string();
        self.spawn_sync("mark_as_read", move |sync, company| async move {
            sync.mark_as_read(&company, &id).await
        })
    }

    pub fn mark_all_as_read(&self) -> SyncTask {
        self.store.mark_all_as_read();
        self.spawn_sync("mark_all_as_read", |sync, company| async move {
            sync.mark_all_as_read(&company).await
        })
    }

    pub fn remove_notification(&self, id: &str) -> SyncTask {
        self.store.remove_notification(id);
        let id = id.to_string();
        self.spawn_sync("remove_notification", move |sync, company| async move {
            sync.delete(&company, &id).await
        })
    }

    pub fn clear_all(&self) -> SyncTask {
        self.store.clear_all();
        self.spawn_sync("clear_all", |sync, company| async move {
            sync.clear_all(&company).await
        })
    }

    fn spawn_sync<F, Fut>(&self, op: &'static str, call: F) -> SyncTask
    where
        F: FnOnce(Arc<dyn NotificationSync>, String) -> Fut,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let company = self.company_id.clone();
        let fut = call(self.sync.clone(), company.clone());
        tokio::spawn(async move {
            match fut.await {
                Ok(()) => tracing::debug!(op, tenant = %company, "notification sync ok"),
                Err(e) => tracing::error!(
                    op,
                    tenant = %company,
                    error = %e,
                    "notification sync failed, keeping local state"
                ),
            }
        })
    }

    // ── Backlog ───────────────────────────────────────────────

    /// Reload the first page, replacing the list.
    pub async fn refresh(&self) -> Result<usize> {
        self.load_page(0, true).await
    }

    /// Fetch the next older page and merge it at the tail.
    /// Returns 0 without a request when the server reported no more pages.
    pub async fn load_more(&self) -> Result<usize> {
        let state = self.store.snapshot();
        if !state.has_more || state.loading {
            return Ok(0);
        }
        // A hydrated or push-filled list has no cursor yet.
        let next = if state.page_loaded {
            state.current_page + 1
        } else {
            0
        };
        self.load_page(next, false).await
    }

    async fn load_page(&self, page: u32, replace: bool) -> Result<usize> {
        self.store.set_loading(true);
        self.store.set_error(None);

        let result = self
            .sync
            .fetch_page(&self.company_id, page, self.page_size)
            .await;

        let outcome = match result {
            Ok(page_data) => {
                let has_more = page_data.has_more();
                let total = page_data.total_elements;
                let list = page_data.into_notifications(&self.company_id);
                let count = if replace {
                    let len = list.len();
                    self.store.set_notifications(list);
                    len
                } else {
                    self.store.append_notifications(list)
                };
                self.store.set_pagination(page, has_more, total);
                tracing::debug!(tenant = %self.company_id, page, count, has_more, "loaded notification page");
                Ok(count)
            }
            Err(e) => {
                tracing::error!(tenant = %self.company_id, page, error = %e, "failed to load notifications");
                self.store.set_error(Some(e.to_string()));
                Err(e)
            }
        };

        self.store.set_loading(false);
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::NotificationPage;
    use crate::channel::testing::FakeChannel;
    use crate::errors::AppError;
    use crate::models::{NotificationType, RawNotification};
    use crate::store::{MemorySnapshotStore, PersistedSnapshot};
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeSync {
        calls: Mutex<Vec<String>>,
        fail: bool,
        pages: Vec<NotificationPage>,
    }

    impl FakeSync {
        fn failing() -> Self {
            Self {
                fail: true,
                ..Default::default()
            }
        }

        fn record(&self, call: String) -> Result<()> {
            self.calls.lock().unwrap().push(call);
            if self.fail {
                return Err(AppError::Status {
                    status: 503,
                    body: "unavailable".into(),
                });
            }
            Ok(())
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl NotificationSync for FakeSync {
        async fn fetch_page(&self, company_id: &str, page: u32, size: u32) -> Result<NotificationPage> {
            self.record(format!("fetch:{}:{}:{}", company_id, page, size))?;
            self.pages
                .get(page as usize)
                .cloned()
                .ok_or(AppError::Status {
                    status: 404,
                    body: "no page".into(),
                })
        }
        async fn mark_as_read(&self, company_id: &str, id: &str) -> Result<()> {
            self.record(format!("read:{}:{}", company_id, id))
        }
        async fn mark_all_as_read(&self, company_id: &str) -> Result<()> {
            self.record(format!("read-all:{}", company_id))
        }
        async fn delete(&self, company_id: &str, id: &str) -> Result<()> {
            self.record(format!("delete:{}:{}", company_id, id))
        }
        async fn clear_all(&self, company_id: &str) -> Result<()> {
            self.record(format!("clear:{}", company_id))
        }
    }

    fn raw(id: &str, read: bool) -> RawNotification {
        RawNotification {
            id: Some(id.to_string()),
            read: Some(read),
            ..Default::default()
        }
    }

    fn page(number: u32, ids: &[(&str, bool)], last: bool) -> NotificationPage {
        NotificationPage {
            content: ids.iter().map(|(id, read)| raw(id, *read)).collect(),
            number,
            total_elements: 5,
            last,
        }
    }

    fn pushed(id: &str) -> Notification {
        Notification {
            id: id.to_string(),
            r#type: NotificationType::Application,
            title: "t".into(),
            message: "m".into(),
            timestamp: "2024-01-01T00:00:00.000Z".into(),
            read: false,
            company_id: "co-1".into(),
        }
    }

    fn center(sync: FakeSync) -> (NotificationCenter, Arc<FakeSync>, FakeChannel) {
        let sync = Arc::new(sync);
        let channel = FakeChannel::default();
        let center = NotificationCenter::new(
            "co-1",
            NotificationStore::in_memory(),
            sync.clone(),
            Arc::new(channel.clone()),
        );
        (center, sync, channel)
    }

    #[tokio::test]
    async fn test_mark_as_read_is_optimistic_and_synced() {
        let (center, sync, channel) = center(FakeSync::default());
        center.store.add_notification(pushed("a"));

        let task = center.mark_as_read("a");
        // local state flips before the sync task has run
        assert_eq!(center.unread_count(), 0);
        task.await.unwrap();

        assert_eq!(sync.calls(), vec!["read:co-1:a"]);
        assert_eq!(channel.calls(), vec!["read:a"]);
    }

    #[tokio::test]
    async fn test_sync_failure_does_not_roll_back() {
        let (center, sync, _channel) = center(FakeSync::failing());
        center.store.add_notification(pushed("a"));
        center.store.add_notification(pushed("b"));

        center.mark_as_read("a").await.unwrap();
        center.remove_notification("b").await.unwrap();

        assert_eq!(sync.calls().len(), 2);
        let list = center.notifications();
        assert_eq!(list.len(), 1);
        assert!(list[0].read);
    }

    #[tokio::test]
    async fn test_mark_all_and_clear() {
        let (center, sync, _channel) = center(FakeSync::default());
        center.store.add_notification(pushed("a"));
        center.store.add_notification(pushed("b"));

        center.mark_all_as_read().await.unwrap();
        assert_eq!(center.unread_count(), 0);
        assert_eq!(center.read().len(), 2);

        center.clear_all().await.unwrap();
        assert!(center.notifications().is_empty());
        assert_eq!(sync.calls(), vec!["read-all:co-1", "clear:co-1"]);
    }

    #[tokio::test]
    async fn test_projections_split_read_and_unread() {
        let (center, _sync, _channel) = center(FakeSync::default());
        center.store.add_notification(pushed("a"));
        center.store.add_notification(pushed("b"));
        center.store.mark_as_read("a");

        let unread: Vec<_> = center.unread().into_iter().map(|n| n.id).collect();
        let read: Vec<_> = center.read().into_iter().map(|n| n.id).collect();
        assert_eq!(unread, vec!["b"]);
        assert_eq!(read, vec!["a"]);
        assert_eq!(center.badge().as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn test_badge_hidden_and_capped() {
        let (center, _sync, _channel) = center(FakeSync::default());
        assert_eq!(center.badge(), None);

        let many: Vec<_> = (0..120).map(|i| pushed(&format!("n{}", i))).collect();
        center.store.set_notifications(many);
        assert_eq!(center.badge().as_deref(), Some("99+"));
    }

    #[tokio::test]
    async fn test_refresh_then_load_more() {
        let sync = FakeSync {
            pages: vec![
                page(0, &[("a", false), ("b", true)], false),
                page(1, &[("b", true), ("c", false)], true),
            ],
            ..Default::default()
        };
        let (center, sync, _channel) = center(sync);

        assert_eq!(center.refresh().await.unwrap(), 2);
        assert!(center.has_more());

        assert_eq!(center.load_more().await.unwrap(), 1);
        let ids: Vec<_> = center.notifications().into_iter().map(|n| n.id).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(center.unread_count(), 2);
        assert!(!center.has_more());
        assert_eq!(center.store.snapshot().current_page, 1);

        // no more pages: no request
        assert_eq!(center.load_more().await.unwrap(), 0);
        assert_eq!(
            sync.calls(),
            vec!["fetch:co-1:0:20", "fetch:co-1:1:20"]
        );
    }

    #[tokio::test]
    async fn test_load_more_after_hydration_starts_at_first_page() {
        let sync = Arc::new(FakeSync {
            pages: vec![
                page(0, &[("a", false), ("b", false)], false),
                page(1, &[("c", true)], true),
            ],
            ..Default::default()
        });
        let backend = Arc::new(MemorySnapshotStore::with_snapshot(PersistedSnapshot {
            notifications: vec![pushed("b"), pushed("z")],
            unread_count: 2,
        }));
        let center = NotificationCenter::new(
            "co-1",
            NotificationStore::hydrate(backend),
            sync.clone(),
            Arc::new(FakeChannel::default()),
        );

        assert_eq!(center.load_more().await.unwrap(), 1);
        assert_eq!(center.load_more().await.unwrap(), 1);

        let ids: Vec<_> = center.notifications().into_iter().map(|n| n.id).collect();
        assert_eq!(ids, vec!["b", "z", "a", "c"]);
        assert_eq!(sync.calls(), vec!["fetch:co-1:0:20", "fetch:co-1:1:20"]);
    }

    #[tokio::test]
    async fn test_load_failure_sets_error_state() {
        let (center, _sync, _channel) = center(FakeSync::failing());
        assert!(center.refresh().await.is_err());
        assert!(center.error().is_some());
        assert!(!center.is_loading());
    }
}
