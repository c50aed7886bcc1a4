//! REST persistence and backlog client.
//!
//! All routes are tenant-scoped under `{base}/companies/{companyId}/notifications`.
//! Calls are never retried here; callers decide whether a failure matters.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use url::Url;

use crate::errors::{AppError, Result};
use crate::models::{Notification, RawNotification};

/// One page of historical notifications, newest first.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPage {
    #[serde(default, deserialize_with = "lenient_entries")]
    pub content: Vec<RawNotification>,
    /// Zero-based page index.
    #[serde(default)]
    pub number: u32,
    #[serde(default)]
    pub total_elements: u64,
    #[serde(default = "default_last")]
    pub last: bool,
}

fn default_last() -> bool {
    true
}

/// A malformed entry normalizes from whatever fields survive instead of
/// failing the whole page.
fn lenient_entries<'de, D>(deserializer: D) -> std::result::Result<Vec<RawNotification>, D::Error>
where
    D: Deserializer<'de>,
{
    let entries = Option::<Vec<Value>>::deserialize(deserializer)?;
    Ok(entries
        .unwrap_or_default()
        .iter()
        .map(RawNotification::from_value)
        .collect())
}

impl NotificationPage {
    pub fn has_more(&self) -> bool {
        !self.last
    }

    /// Normalize entries for `company_id`, keeping the server's read flags.
    pub fn into_notifications(self, company_id: &str) -> Vec<Notification> {
        self.content
            .into_iter()
            .map(|raw| Notification::from_raw(raw, company_id, true))
            .collect()
    }
}

#[async_trait]
pub trait NotificationSync: Send + Sync {
    async fn fetch_page(&self, company_id: &str, page: u32, size: u32) -> Result<NotificationPage>;
    async fn mark_as_read(&self, company_id: &str, id: &str) -> Result<()>;
    async fn mark_all_as_read(&self, company_id: &str) -> Result<()>;
    async fn delete(&self, company_id: &str, id: &str) -> Result<()>;
    async fn clear_all(&self, company_id: &str) -> Result<()>;
}

pub struct RestClient {
    base: Url,
    token: Option<String>,
    http: Client,
}

impl RestClient {
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self> {
        let base = Url::parse(base_url.trim())?;
        if base.cannot_be_a_base() {
            return Err(AppError::UnsupportedScheme(base.scheme().to_string()));
        }
        let http = Client::builder()
            .timeout(Duration::from_secs(10))
            .connect_timeout(Duration::from_secs(5))
            .user_agent(concat!("realtime-notify/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { base, token, http })
    }

    fn url(&self, company_id: &str, tail: &[&str]) -> Url {
        let mut url = self.base.clone();
        // cannot_be_a_base was rejected in `new`
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .push("companies")
                .push(company_id)
                .push("notifications")
                .extend(tail);
        }
        url
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let mut req = self.http.request(method, url);
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }
        req
    }

    async fn send(&self, method: Method, url: Url) -> Result<Response> {
        let resp = self.request(method.clone(), url.clone()).send().await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        tracing::debug!(%method, %url, status = status.as_u16(), "notification api returned error");
        Err(AppError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl NotificationSync for RestClient {
    async fn fetch_page(&self, company_id: &str, page: u32, size: u32) -> Result<NotificationPage> {
        let mut url = self.url(company_id, &[]);
        url.query_pairs_mut()
            .append_pair("page", &page.to_string())
            .append_pair("size", &size.to_string());
        let resp = self.send(Method::GET, url).await?;
        Ok(resp.json::<NotificationPage>().await?)
    }

    async fn mark_as_read(&self, company_id: &str, id: &str) -> Result<()> {
        self.send(Method::PATCH, self.url(company_id, &[id, "read"])).await?;
        Ok(())
    }

    async fn mark_all_as_read(&self, company_id: &str) -> Result<()> {
        self.send(Method::PATCH, self.url(company_id, &["read-all"])).await?;
        Ok(())
    }

    async fn delete(&self, company_id: &str, id: &str) -> Result<()> {
        self.send(Method::DELETE, self.url(company_id, &[id])).await?;
        Ok(())
    }

    async fn clear_all(&self, company_id: &str) -> Result<()> {
        self.send(Method::DELETE, self.url(company_id, &[])).await?;
        Ok(())
    }
}
