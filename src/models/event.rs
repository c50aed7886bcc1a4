//! Wire envelope for the realtime channel.
//!
//! Every text frame carries `{"event": "<name>", "data": <payload>}`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ── Event names ───────────────────────────────────────────────

pub const NOTIFICATION: &str = "notification";
pub const MATCHING_APPLICANT: &str = "matching_applicant";
pub const NOTIFICATION_READ: &str = "notification:read";
pub const TEST_MESSAGE: &str = "test-message";
pub const TEST_RESPONSE: &str = "test-response";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

impl Frame {
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }

    pub fn decode(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    pub fn encode(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
