use std::path::PathBuf;
use std::time::Duration;

use crate::transport::ReconnectConfig;
use crate::views::DEFAULT_PAGE_SIZE;

#[derive(Debug, Clone)]
pub struct Config {
    /// WebSocket endpoint of the realtime server (`ws://`, `wss://`, or
    /// `http(s)://` which is normalized).
    pub realtime_url: String,
    /// Base URL of the notification REST API.
    pub api_base_url: String,
    pub api_token: Option<String>,
    /// Directory holding the persisted notification snapshot.
    pub store_dir: PathBuf,
    /// Tenant to connect as when `--company` is not given.
    pub company_id: Option<String>,
    /// Set via NOTIFY_RECONNECT_ATTEMPTS env var. Default: 5.
    pub reconnect_attempts: u32,
    /// Set via NOTIFY_RECONNECT_DELAY_MS env var. Default: 1000.
    pub reconnect_delay_ms: u64,
    pub page_size: u32,
    /// "json" switches log output to JSON lines.
    pub log_format: String,
}

impl Config {
    pub fn reconnect(&self) -> ReconnectConfig {
        ReconnectConfig {
            max_attempts: self.reconnect_attempts,
            delay: Duration::from_millis(self.reconnect_delay_ms),
        }
    }

    /// `--company` wins over NOTIFY_COMPANY_ID.
    pub fn company(&self, flag: Option<String>) -> anyhow::Result<String> {
        flag.or_else(|| self.company_id.clone())
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| anyhow::anyhow!("no company id: pass --company or set NOTIFY_COMPANY_ID"))
    }
}

fn parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn non_empty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

pub fn load() -> anyhow::Result<Config> {
    dotenvy::dotenv().ok();

    let realtime_url =
        non_empty("NOTIFY_REALTIME_URL").unwrap_or_else(|| "ws://localhost:9092".into());
    if !["ws://", "wss://", "http://", "https://"]
        .iter()
        .any(|p| realtime_url.starts_with(p))
    {
        anyhow::bail!(
            "NOTIFY_REALTIME_URL must be a ws(s):// or http(s):// URL, got '{}'",
            realtime_url
        );
    }

    Ok(Config {
        realtime_url,
        api_base_url: non_empty("NOTIFY_API_BASE_URL")
            .unwrap_or_else(|| "http://localhost:8080/api".into()),
        api_token: non_empty("NOTIFY_API_TOKEN"),
        store_dir: non_empty("NOTIFY_STORE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(".notify")),
        company_id: non_empty("NOTIFY_COMPANY_ID"),
        reconnect_attempts: parsed("NOTIFY_RECONNECT_ATTEMPTS", 5),
        reconnect_delay_ms: parsed("NOTIFY_RECONNECT_DELAY_MS", 1000),
        page_size: parsed("NOTIFY_PAGE_SIZE", DEFAULT_PAGE_SIZE),
        log_format: non_empty("NOTIFY_LOG_FORMAT").unwrap_or_else(|| "text".into()),
    })
}
