use std::time::Duration;

/// Lifecycle of the single realtime connection.
///
/// Switching tenants always passes through `Disconnected`: the client refuses
/// to move from one tenant's `Connecting`/`Connected` straight to another's.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    /// `attempt` is 1 for the first handshake and counts up across retries.
    Connecting { tenant: String, attempt: u32 },
    Connected { tenant: String },
}

impl ConnectionState {
    pub fn tenant(&self) -> Option<&str> {
        match self {
            ConnectionState::Disconnected => None,
            ConnectionState::Connecting { tenant, .. } | ConnectionState::Connected { tenant } => {
                Some(tenant)
            }
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected { .. })
    }
}

/// Fixed-delay, bounded reconnection policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectConfig {
    /// Reconnection attempts allowed after the first failed handshake
    /// (or after an established connection drops).
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay: Duration::from_millis(1000),
        }
    }
}

/// Parameters sent to the realtime server when the connection opens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthParams {
    pub company_id: String,
}

impl AuthParams {
    pub fn company(company_id: impl Into<String>) -> Self {
        Self {
            company_id: company_id.into(),
        }
    }
}
