//! Realtime transport client.
//!
//! Owns at most one WebSocket connection at a time. The connection runs in a
//! background task that:
//!   1. Performs the handshake with the tenant id in the query string
//!   2. Dispatches inbound `{event, data}` frames to registered handlers
//!   3. Writes outbound frames queued by `emit`
//!   4. Reconnects with a fixed delay until the attempt budget is spent
//!
//! Callers never see connection failures as errors; they observe them through
//! [`TransportClient::state_changes`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use url::Url;

use super::state::{AuthParams, ConnectionState, ReconnectConfig};
use crate::errors::{AppError, Result};
use crate::models::event::Frame;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

pub type Handler = Arc<dyn Fn(&Value) + Send + Sync>;

// ── Handler registry ──────────────────────────────────────────

#[derive(Default)]
struct Registry {
    next_id: u64,
    by_event: HashMap<String, Vec<(u64, Handler)>>,
}

type SharedRegistry = Arc<Mutex<Registry>>;

fn lock(registry: &Mutex<Registry>) -> MutexGuard<'_, Registry> {
    // A panicking handler must not take the whole channel down with it.
    registry.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Handle returned by [`TransportClient::on`]. Dropping it keeps the handler
/// registered; call [`Subscription::unsubscribe`] to remove it.
#[must_use = "keep the subscription to be able to unsubscribe"]
pub struct Subscription {
    event: String,
    cancel: Box<dyn FnOnce() + Send>,
}

impl Subscription {
    pub fn new(event: impl Into<String>, cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            event: event.into(),
            cancel: Box::new(cancel),
        }
    }

    pub fn event(&self) -> &str {
        &self.event
    }

    pub fn unsubscribe(self) {
        (self.cancel)()
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("event", &self.event).finish()
    }
}

fn remove_handler(registry: &Weak<Mutex<Registry>>, event: &str, id: u64) {
    let Some(registry) = registry.upgrade() else {
        return;
    };
    let mut guard = lock(&registry);
    if let Some(handlers) = guard.by_event.get_mut(event) {
        handlers.retain(|(hid, _)| *hid != id);
        if handlers.is_empty() {
            guard.by_event.remove(event);
        }
    }
}

fn dispatch(registry: &Mutex<Registry>, frame: Frame) {
    let handlers: Vec<Handler> = match lock(registry).by_event.get(&frame.event) {
        Some(list) => list.iter().map(|(_, h)| h.clone()).collect(),
        None => {
            tracing::debug!(event = %frame.event, "no handler for inbound event");
            return;
        }
    };
    for handler in handlers {
        handler(&frame.data);
    }
}

// ── Connection state ──────────────────────────────────────────

/// Published connection state plus the generation of the session allowed to
/// write it. A session that has been replaced can no longer publish.
struct StateCell {
    tx: watch::Sender<ConnectionState>,
    generation: AtomicU64,
}

impl StateCell {
    fn new() -> Self {
        let (tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            tx,
            generation: AtomicU64::new(0),
        }
    }

    /// Start a new generation and publish its first state in one step.
    fn begin(&self, first: ConnectionState) -> u64 {
        let mut generation = 0;
        self.tx.send_modify(|current| {
            generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            *current = first;
        });
        generation
    }

    /// Publish `next` only while `generation` is still the latest session.
    fn publish(&self, generation: u64, next: ConnectionState) -> bool {
        self.tx.send_if_modified(|current| {
            if self.generation.load(Ordering::SeqCst) != generation {
                return false;
            }
            *current = next;
            true
        })
    }
}

// ── Client ────────────────────────────────────────────────────

struct Session {
    generation: u64,
    auth: AuthParams,
    outbound: mpsc::UnboundedSender<Frame>,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

pub struct TransportClient {
    reconnect: ReconnectConfig,
    registry: SharedRegistry,
    state: Arc<StateCell>,
    session: Mutex<Option<Session>>,
}

impl TransportClient {
    pub fn new(reconnect: ReconnectConfig) -> Self {
        Self {
            reconnect,
            registry: Arc::new(Mutex::new(Registry::default())),
            state: Arc::new(StateCell::new()),
            session: Mutex::new(None),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state.tx.borrow().clone()
    }

    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.state.tx.subscribe()
    }

    /// Tenant of the live (or still retrying) session, if any.
    pub fn active_tenant(&self) -> Option<String> {
        let guard = self.session.lock().unwrap_or_else(|p| p.into_inner());
        guard
            .as_ref()
            .filter(|s| !s.task.is_finished())
            .map(|s| s.auth.company_id.clone())
    }

    /// Open the connection for `auth`. Must be called inside a Tokio runtime.
    ///
    /// Calling again with the same `auth` while a session is alive is a no-op.
    /// A different tenant is rejected with [`AppError::TenantConflict`] until
    /// [`disconnect`](Self::disconnect) has run.
    pub fn connect(&self, endpoint: &str, auth: AuthParams) -> Result<()> {
        let mut guard = self.session.lock().unwrap_or_else(|p| p.into_inner());

        if let Some(session) = guard.as_ref() {
            if !session.task.is_finished() {
                if session.auth == auth {
                    tracing::debug!(tenant = %auth.company_id, "transport already connected, ignoring connect");
                    return Ok(());
                }
                return Err(AppError::TenantConflict {
                    active: session.auth.company_id.clone(),
                    requested: auth.company_id,
                });
            }
        }
        // A finished task means retries were exhausted; start over.
        guard.take();

        let url = build_endpoint_url(endpoint, &auth)?;
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let generation = self.state.begin(ConnectionState::Connecting {
            tenant: auth.company_id.clone(),
            attempt: 1,
        });

        let task = tokio::spawn(run_session(
            url,
            auth.company_id.clone(),
            self.reconnect.clone(),
            self.registry.clone(),
            self.state.clone(),
            generation,
            outbound_rx,
            shutdown_rx,
        ));

        *guard = Some(Session {
            generation,
            auth,
            outbound: outbound_tx,
            shutdown: shutdown_tx,
            task,
        });
        Ok(())
    }

    /// Close the connection and wait for the background task to finish.
    /// Safe to call when already disconnected.
    pub async fn disconnect(&self) {
        let session = {
            let mut guard = self.session.lock().unwrap_or_else(|p| p.into_inner());
            guard.take()
        };
        let Some(session) = session else {
            return;
        };
        let tenant = session.auth.company_id.clone();
        let _ = session.shutdown.send(());
        drop(session.outbound);
        if let Err(e) = session.task.await {
            tracing::warn!(tenant = %tenant, error = %e, "transport task ended abnormally");
        }
        // A session started while we were waiting keeps its own state.
        self.state.publish(session.generation, ConnectionState::Disconnected);
        tracing::info!(tenant = %tenant, "transport disconnected");
    }

    /// Register `handler` for `event`. Several handlers per event are allowed
    /// and run in registration order.
    pub fn on<F>(&self, event: &str, handler: F) -> Subscription
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let mut guard = lock(&self.registry);
        guard.next_id += 1;
        let id = guard.next_id;
        guard
            .by_event
            .entry(event.to_string())
            .or_default()
            .push((id, Arc::new(handler)));
        let registry = Arc::downgrade(&self.registry);
        let owned = event.to_string();
        Subscription::new(event, move || remove_handler(&registry, &owned, id))
    }

    /// Queue an outbound frame. Fire-and-forget: when not connected the frame
    /// is dropped and `false` is returned.
    pub fn emit(&self, event: &str, data: Value) -> bool {
        if !self.state.tx.borrow().is_connected() {
            tracing::debug!(event = %event, "transport not connected, dropping outbound frame");
            return false;
        }
        let guard = self.session.lock().unwrap_or_else(|p| p.into_inner());
        match guard.as_ref() {
            Some(session) => session.outbound.send(Frame::new(event, data)).is_ok(),
            None => false,
        }
    }

    #[cfg(test)]
    pub(crate) fn handler_count(&self, event: &str) -> usize {
        lock(&self.registry).by_event.get(event).map_or(0, Vec::len)
    }
}

impl Drop for TransportClient {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.session.lock() {
            if let Some(session) = guard.take() {
                session.task.abort();
            }
        }
    }
}

// ── Connection task ───────────────────────────────────────────

enum SessionEnd {
    Shutdown,
    Dropped(String),
}

async fn run_session(
    url: Url,
    tenant: String,
    reconnect: ReconnectConfig,
    registry: SharedRegistry,
    state: Arc<StateCell>,
    generation: u64,
    mut outbound: mpsc::UnboundedReceiver<Frame>,
    mut shutdown: oneshot::Receiver<()>,
) {
    let mut failures: u32 = 0;

    loop {
        state.publish(
            generation,
            ConnectionState::Connecting {
                tenant: tenant.clone(),
                attempt: failures + 1,
            },
        );

        let handshake = tokio::select! {
            _ = &mut shutdown => break,
            res = tokio::time::timeout(CONNECT_TIMEOUT, connect_async(url.as_str())) => res,
        };

        match handshake {
            Ok(Ok((ws, _resp))) => {
                failures = 0;
                state.publish(
                    generation,
                    ConnectionState::Connected {
                        tenant: tenant.clone(),
                    },
                );
                tracing::info!(tenant = %tenant, "realtime: connected");

                match pump(ws, &registry, &mut outbound, &mut shutdown).await {
                    SessionEnd::Shutdown => break,
                    SessionEnd::Dropped(reason) => {
                        tracing::warn!(tenant = %tenant, reason = %reason, "realtime: connection lost");
                    }
                }
            }
            Ok(Err(e)) => {
                failures += 1;
                tracing::warn!(tenant = %tenant, attempt = failures, error = %e, "realtime: handshake failed");
            }
            Err(_) => {
                failures += 1;
                tracing::warn!(tenant = %tenant, attempt = failures, "realtime: handshake timed out");
            }
        }

        if failures > reconnect.max_attempts {
            tracing::warn!(
                tenant = %tenant,
                attempts = failures,
                "realtime: reconnection attempts exhausted, staying disconnected"
            );
            break;
        }

        tokio::select! {
            _ = &mut shutdown => break,
            _ = tokio::time::sleep(reconnect.delay) => {}
        }
    }

    state.publish(generation, ConnectionState::Disconnected);
}

async fn pump(
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
    registry: &Mutex<Registry>,
    outbound: &mut mpsc::UnboundedReceiver<Frame>,
    shutdown: &mut oneshot::Receiver<()>,
) -> SessionEnd {
    let (mut sink, mut stream) = ws.split();

    loop {
        tokio::select! {
            _ = &mut *shutdown => {
                let _ = sink.send(Message::Close(None)).await;
                return SessionEnd::Shutdown;
            }
            frame = outbound.recv() => {
                let Some(frame) = frame else {
                    let _ = sink.send(Message::Close(None)).await;
                    return SessionEnd::Shutdown;
                };
                match frame.encode() {
                    Ok(text) => {
                        if let Err(e) = sink.send(Message::Text(text)).await {
                            return SessionEnd::Dropped(e.to_string());
                        }
                    }
                    Err(e) => tracing::warn!(event = %frame.event, error = %e, "failed to encode outbound frame"),
                }
            }
            msg = stream.next() => match msg {
                Some(Ok(Message::Text(text))) => match Frame::decode(&text) {
                    Ok(frame) => dispatch(registry, frame),
                    Err(e) => tracing::warn!(error = %e, "dropping malformed realtime frame"),
                },
                Some(Ok(Message::Close(frame))) => {
                    return SessionEnd::Dropped(format!("closed by server: {:?}", frame));
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return SessionEnd::Dropped(e.to_string()),
                None => return SessionEnd::Dropped("stream ended".to_string()),
            },
        }
    }
}

// ── URL builder ───────────────────────────────────────────────

/// Normalize HTTP(S) to WS(S) and attach the tenant id as `companyId`.
pub fn build_endpoint_url(endpoint: &str, auth: &AuthParams) -> Result<Url> {
    let mut url = Url::parse(endpoint.trim())?;
    let scheme = match url.scheme() {
        "ws" | "http" => "ws",
        "wss" | "https" => "wss",
        other => return Err(AppError::UnsupportedScheme(other.to_string())),
    };
    if url.scheme() != scheme && url.set_scheme(scheme).is_err() {
        return Err(AppError::UnsupportedScheme(url.scheme().to_string()));
    }
    url.query_pairs_mut()
        .append_pair("companyId", &auth.company_id);
    Ok(url)
}
