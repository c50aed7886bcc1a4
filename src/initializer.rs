//! Realtime initializer: ties the channel's lifecycle to the current tenant.
//!
//! Tenant transitions:
//!   - absent  -> present : initialize channel, register push handlers
//!   - present -> other   : unsubscribe + disconnect, then as above
//!   - present -> absent  : unsubscribe + disconnect
//!   - same    -> same    : no-op
//!
//! Handlers receive a [`HandlerContext`] built at registration time, so a
//! handler never observes a tenant other than the one it was registered for.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Mutex;

use crate::channel::RealtimeChannel;
use crate::errors::Result;
use crate::models::{MatchingApplicant, Notification};
use crate::store::NotificationStore;
use crate::transport::Subscription;

/// Everything a push handler needs, captured by value per tenant.
pub struct HandlerContext {
    pub tenant: String,
    pub store: NotificationStore,
}

impl HandlerContext {
    pub fn on_push(&self, payload: &Value) {
        let notification = Notification::from_push(payload, &self.tenant);
        tracing::debug!(
            tenant = %self.tenant,
            id = %notification.id,
            kind = %notification.r#type,
            "realtime notification received"
        );
        self.store.add_notification(notification);
    }

    pub fn on_match(&self, applicant: &MatchingApplicant) {
        tracing::debug!(
            tenant = %self.tenant,
            id = %applicant.id,
            score = applicant.match_score,
            "matching applicant received"
        );
        self.store
            .add_notification(Notification::from_matching_applicant(applicant, &self.tenant));
    }
}

struct ActiveTenant {
    tenant: String,
    subscriptions: Vec<Subscription>,
}

pub struct RealtimeInitializer {
    channel: Arc<dyn RealtimeChannel>,
    store: NotificationStore,
    active: Mutex<Option<ActiveTenant>>,
}

impl RealtimeInitializer {
    pub fn new(channel: Arc<dyn RealtimeChannel>, store: NotificationStore) -> Self {
        Self {
            channel,
            store,
            active: Mutex::new(None),
        }
    }

    pub async fn active_tenant(&self) -> Option<String> {
        self.active.lock().await.as_ref().map(|a| a.tenant.clone())
    }

    /// Apply a tenant identity change. An empty id counts as absent.
    ///
    /// Transitions are serialized: a second call waits until the previous
    /// teardown/initialize sequence has finished.
    pub async fn set_tenant(&self, tenant: Option<String>) -> Result<()> {
        let tenant = tenant.filter(|t| !t.trim().is_empty());
        let mut active = self.active.lock().await;

        if active.as_ref().map(|a| a.tenant.as_str()) == tenant.as_deref() {
            return Ok(());
        }

        if let Some(previous) = active.take() {
            self.teardown(previous).await;
        }

        let Some(tenant) = tenant else {
            return Ok(());
        };

        self.channel.initialize(&tenant).await?;

        let ctx = Arc::new(HandlerContext {
            tenant: tenant.clone(),
            store: self.store.clone(),
        });
        let push_ctx = ctx.clone();
        let match_ctx = ctx;
        let subscriptions = vec![
            self.channel
                .on_notification(Arc::new(move |payload: Value| push_ctx.on_push(&payload))),
            self.channel
                .on_matching_applicant(Arc::new(move |applicant: MatchingApplicant| match_ctx.on_match(&applicant))),
        ];

        tracing::info!(tenant = %tenant, "realtime notifications active");
        *active = Some(ActiveTenant {
            tenant,
            subscriptions,
        });
        Ok(())
    }

    /// Unmount: drop handlers and close the connection.
    pub async fn shutdown(&self) {
        let previous = self.active.lock().await.take();
        if let Some(previous) = previous {
            self.teardown(previous).await;
        }
    }

    async fn teardown(&self, previous: ActiveTenant) {
        for sub in previous.subscriptions {
            sub.unsubscribe();
        }
        self.channel.disconnect().await;
        tracing::info!(tenant = %previous.tenant, "realtime notifications stopped");
    }
}
