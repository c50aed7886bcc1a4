use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Notification category. Unknown tags from the server collapse to `System`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationType {
    Application,
    Match,
    Job,
    Subscription,
    #[serde(other)]
    System,
}

impl NotificationType {
    pub fn parse(tag: &str) -> Self {
        match tag.trim().to_ascii_lowercase().as_str() {
            "application" => NotificationType::Application,
            "match" => NotificationType::Match,
            "job" => NotificationType::Job,
            "subscription" => NotificationType::Subscription,
            _ => NotificationType::System,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::Application => "application",
            NotificationType::Match => "match",
            NotificationType::Job => "job",
            NotificationType::Subscription => "subscription",
            NotificationType::System => "system",
        }
    }
}

impl std::fmt::Display for NotificationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    pub r#type: NotificationType, // 'type' is a reserved keyword
    pub title: String,
    pub message: String,
    /// ISO-8601, receipt time when the server omitted it.
    pub timestamp: String,
    pub read: bool,
    pub company_id: String,
}

pub const DEFAULT_TITLE: &str = "New notification";

/// Loosely-typed shape of a `notification` push or a backlog page entry.
/// Every field is optional; see [`Notification::from_raw`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawNotification {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: Option<String>,
    #[serde(default, rename = "type", deserialize_with = "lenient_string")]
    pub kind: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub message: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub timestamp: Option<String>,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub read: Option<bool>,
}

impl RawNotification {
    /// Decode a push payload. Each field is read on its own, so a mistyped
    /// field only loses itself. Anything that is not a JSON object decodes
    /// to an all-empty payload, which normalization then fills in.
    pub fn from_value(value: &Value) -> Self {
        if !value.is_object() {
            tracing::warn!("notification payload is not an object, using defaults");
            return RawNotification::default();
        }
        match serde_json::from_value(value.clone()) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(error = %e, "malformed notification payload, using defaults");
                RawNotification::default()
            }
        }
    }
}

/// Accepts strings, numbers and booleans (stringified); anything else is `None`.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) if !s.is_empty() => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(b)) => Some(b.to_string()),
        _ => None,
    })
}

/// Booleans as-is, "true"/"false" strings and 0/1 numbers; anything else is `None`.
fn lenient_bool<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Bool(b)) => Some(b),
        Some(Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        },
        Some(Value::Number(n)) => match n.as_u64() {
            Some(0) => Some(false),
            Some(1) => Some(true),
            _ => None,
        },
        _ => None,
    })
}

pub fn now_iso8601() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

impl Notification {
    /// Normalize a raw payload into a notification scoped to `company_id`.
    ///
    /// Missing `id` is replaced with a random UUID, missing `timestamp` with
    /// the receipt time, and a missing or unknown `type` becomes `system`.
    /// Pushed notifications always start unread; backlog entries keep the
    /// server's `read` flag.
    pub fn from_raw(raw: RawNotification, company_id: &str, honor_read: bool) -> Self {
        Notification {
            id: raw.id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            r#type: raw
                .kind
                .as_deref()
                .map(NotificationType::parse)
                .unwrap_or(NotificationType::System),
            title: raw.title.unwrap_or_else(|| DEFAULT_TITLE.to_string()),
            message: raw.message.unwrap_or_default(),
            timestamp: raw.timestamp.unwrap_or_else(now_iso8601),
            read: honor_read && raw.read.unwrap_or(false),
            company_id: company_id.to_string(),
        }
    }

    /// Build from a realtime `notification` frame.
    pub fn from_push(payload: &Value, company_id: &str) -> Self {
        Self::from_raw(RawNotification::from_value(payload), company_id, false)
    }

    /// One notification per applicant and role: the same person matching
    /// another opening is a separate alert, a redelivery is not.
    pub fn from_matching_applicant(applicant: &MatchingApplicant, company_id: &str) -> Self {
        Notification {
            id: format!("{}:{}", applicant.id, applicant.role),
            r#type: NotificationType::Match,
            title: "New matching applicant".to_string(),
            message: format!(
                "{} matches {} ({}%)",
                applicant.name,
                applicant.role,
                applicant.match_score.round() as i64
            ),
            timestamp: now_iso8601(),
            read: false,
            company_id: company_id.to_string(),
        }
    }
}

/// Payload of a `matching_applicant` push (premium candidate-match alert).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchingApplicant {
    pub id: String,
    pub name: String,
    pub role: String,
    pub match_score: f64,
}
