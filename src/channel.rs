//! Channel adapter: typed domain callbacks over the raw transport.
//!
//! Inbound `notification` payloads are passed through untouched (the
//! initializer normalizes them); `matching_applicant` payloads are decoded
//! here because they carry their own shape. Outbound read receipts are
//! best-effort and never awaited.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::errors::Result;
use crate::models::event::{
    MATCHING_APPLICANT, NOTIFICATION, NOTIFICATION_READ, TEST_MESSAGE, TEST_RESPONSE,
};
use crate::models::MatchingApplicant;
use crate::transport::{AuthParams, Subscription, TransportClient};

pub type NotificationCallback = Arc<dyn Fn(Value) + Send + Sync>;
pub type MatchCallback = Arc<dyn Fn(MatchingApplicant) + Send + Sync>;

#[async_trait]
pub trait RealtimeChannel: Send + Sync {
    /// Bind the connection to `tenant_id`, tearing down any connection held
    /// for a different tenant first.
    async fn initialize(&self, tenant_id: &str) -> Result<()>;

    fn on_notification(&self, callback: NotificationCallback) -> Subscription;

    fn on_matching_applicant(&self, callback: MatchCallback) -> Subscription;

    /// Emit a `notification:read` receipt. Fire-and-forget.
    fn mark_as_read(&self, id: &str);

    async fn disconnect(&self);
}

pub struct ChannelAdapter {
    transport: Arc<TransportClient>,
    endpoint: String,
}

impl ChannelAdapter {
    pub fn new(transport: Arc<TransportClient>, endpoint: impl Into<String>) -> Self {
        Self {
            transport,
            endpoint: endpoint.into(),
        }
    }

    pub fn transport(&self) -> &Arc<TransportClient> {
        &self.transport
    }

    /// Dev diagnostics: ask the server to echo `message` on `test-response`.
    pub fn send_test_message(&self, message: &str) -> bool {
        self.transport
            .emit(TEST_MESSAGE, json!({ "message": message }))
    }

    pub fn on_test_response<F>(&self, callback: F) -> Subscription
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        self.transport
            .on(TEST_RESPONSE, move |data| callback(data.clone()))
    }
}

#[async_trait]
impl RealtimeChannel for ChannelAdapter {
    async fn initialize(&self, tenant_id: &str) -> Result<()> {
        match self.transport.active_tenant() {
            Some(active) if active == tenant_id => {
                tracing::debug!(tenant = %tenant_id, "realtime channel already initialized");
                return Ok(());
            }
            Some(active) => {
                tracing::info!(from = %active, to = %tenant_id, "switching realtime tenant");
                self.transport.disconnect().await;
            }
            None => {}
        }
        self.transport
            .connect(&self.endpoint, AuthParams::company(tenant_id))
    }

    fn on_notification(&self, callback: NotificationCallback) -> Subscription {
        self.transport
            .on(NOTIFICATION, move |data| callback(data.clone()))
    }

    fn on_matching_applicant(&self, callback: MatchCallback) -> Subscription {
        self.transport.on(MATCHING_APPLICANT, move |data| {
            match serde_json::from_value::<MatchingApplicant>(data.clone()) {
                Ok(applicant) => callback(applicant),
                Err(e) => {
                    tracing::warn!(error = %e, "dropping malformed matching_applicant payload")
                }
            }
        })
    }

    fn mark_as_read(&self, id: &str) {
        if !self.transport.emit(NOTIFICATION_READ, json!({ "id": id })) {
            tracing::debug!(id = %id, "read receipt not sent, realtime channel offline");
        }
    }

    async fn disconnect(&self) {
        self.transport.disconnect().await;
    }
}

/// In-memory [`RealtimeChannel`] used by unit tests.
#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Inner {
        calls: Vec<String>,
        connected: Option<String>,
        next_id: u64,
        notification: Vec<(u64, NotificationCallback)>,
        matching: Vec<(u64, MatchCallback)>,
    }

    #[derive(Default, Clone)]
    pub struct FakeChannel {
        inner: Arc<Mutex<Inner>>,
    }

    impl FakeChannel {
        pub fn calls(&self) -> Vec<String> {
            self.inner.lock().unwrap().calls.clone()
        }

        pub fn connected_tenant(&self) -> Option<String> {
            self.inner.lock().unwrap().connected.clone()
        }

        pub fn handler_counts(&self) -> (usize, usize) {
            let inner = self.inner.lock().unwrap();
            (inner.notification.len(), inner.matching.len())
        }

        pub fn push_notification(&self, payload: Value) {
            let callbacks: Vec<_> = {
                let inner = self.inner.lock().unwrap();
                inner.notification.iter().map(|(_, c)| c.clone()).collect()
            };
            for cb in callbacks {
                cb(payload.clone());
            }
        }

        pub fn push_match(&self, applicant: MatchingApplicant) {
            let callbacks: Vec<_> = {
                let inner = self.inner.lock().unwrap();
                inner.matching.iter().map(|(_, c)| c.clone()).collect()
            };
            for cb in callbacks {
                cb(applicant.clone());
            }
        }
    }

    #[async_trait]
    impl RealtimeChannel for FakeChannel {
        async fn initialize(&self, tenant_id: &str) -> Result<()> {
            let mut inner = self.inner.lock().unwrap();
            inner.calls.push(format!("initialize:{}", tenant_id));
            inner.connected = Some(tenant_id.to_string());
            Ok(())
        }

        fn on_notification(&self, callback: NotificationCallback) -> Subscription {
            let mut inner = self.inner.lock().unwrap();
            inner.next_id += 1;
            let id = inner.next_id;
            inner.notification.push((id, callback));
            let shared = self.inner.clone();
            Subscription::new(NOTIFICATION, move || {
                shared.lock().unwrap().notification.retain(|(i, _)| *i != id)
            })
        }

        fn on_matching_applicant(&self, callback: MatchCallback) -> Subscription {
            let mut inner = self.inner.lock().unwrap();
            inner.next_id += 1;
            let id = inner.next_id;
            inner.matching.push((id, callback));
            let shared = self.inner.clone();
            Subscription::new(MATCHING_APPLICANT, move || {
                shared.lock().unwrap().matching.retain(|(i, _)| *i != id)
            })
        }

        fn mark_as_read(&self, id: &str) {
            self.inner.lock().unwrap().calls.push(format!("read:{}", id));
        }

        async fn disconnect(&self) {
            let mut inner = self.inner.lock().unwrap();
            inner.calls.push("disconnect".to_string());
            inner.connected = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{ConnectionState, ReconnectConfig};
    use std::time::Duration;

    fn adapter() -> ChannelAdapter {
        let transport = Arc::new(TransportClient::new(ReconnectConfig {
            max_attempts: 0,
            delay: Duration::from_millis(10),
        }));
        // nothing listens on port 9; the handshake fails fast
        ChannelAdapter::new(transport, "ws://127.0.0.1:9/realtime")
    }

    #[test]
    fn test_mark_as_read_offline_does_not_panic() {
        adapter().mark_as_read("n-1");
    }

    #[tokio::test]
    async fn test_initialize_same_tenant_twice_keeps_session() {
        let adapter = adapter();
        adapter.initialize("co-1").await.unwrap();
        adapter.initialize("co-1").await.unwrap();
        assert!(matches!(
            adapter.transport().state(),
            ConnectionState::Connecting { .. } | ConnectionState::Disconnected
        ));
        adapter.disconnect().await;
        assert_eq!(adapter.transport().state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_initialize_switches_tenant() {
        let adapter = adapter();
        adapter.initialize("co-1").await.unwrap();
        adapter.initialize("co-2").await.unwrap();
        let tenant = adapter.transport().active_tenant();
        // the co-2 session may already have given up against the dead port
        assert!(tenant.is_none() || tenant.as_deref() == Some("co-2"));
        adapter.disconnect().await;
    }
}
