use crate::config::Settings;
use crate::error::IngestError;
use crate::ingest::types::RawReading;
use anyhow::Context;
use reqwest::StatusCode;
use serde_json::Value;
use std::time::Duration;

// Caps the backoff at 64s.
const MAX_BACKOFF_SHIFT: u32 = 6;

/// Source of current readings for a station. Implementations return the
/// payload as-is; interpretation happens in `flatten`.
#[async_trait::async_trait]
pub trait ReadingFetcher: Send + Sync {
    fn provider_name(&self) -> &'static str;

    async fn fetch(&self, location_id: &str, credential: &str) -> Result<RawReading, IngestError>;
}

#[derive(Debug, Clone)]
pub struct HttpFeedClient {
    http: reqwest::Client,
    base_url: String,
    retries: u32,
}

impl HttpFeedClient {
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()
            .context("failed to build feed http client")?;

        Ok(Self {
            http,
            base_url: settings.base_url.clone(),
            retries: settings.retries,
        })
    }

    fn url(&self, location_id: &str) -> String {
        format!(
            "{}/feed/{}/",
            self.base_url.trim_end_matches('/'),
            location_id.trim_matches('/')
        )
    }

    async fn fetch_once(&self, location_id: &str, credential: &str) -> Result<RawReading, IngestError> {
        let res = self
            .http
            .get(self.url(location_id))
            .query(&[("token", credential)])
            .send()
            .await
            .map_err(|e| IngestError::Transport {
                status: None,
                detail: format!("feed request failed: {}", e.without_url()),
            })?;

        let status = res.status();
        let text = res.text().await.map_err(|e| IngestError::Transport {
            status: Some(status.as_u16()),
            detail: format!("failed to read feed response: {}", e.without_url()),
        })?;

        classify_response(status, &text)
    }
}

#[async_trait::async_trait]
impl ReadingFetcher for HttpFeedClient {
    fn provider_name(&self) -> &'static str {
        "waqi_feed"
    }

    async fn fetch(&self, location_id: &str, credential: &str) -> Result<RawReading, IngestError> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self.fetch_once(location_id, credential).await {
                Err(err @ IngestError::Transport { .. }) if attempt < self.retries => {
                    let backoff = backoff_for(attempt);
                    tracing::warn!(attempt, ?backoff, error = %err, "feed fetch failed; retrying");
                    tokio::time::sleep(backoff).await;
                }
                res => return res,
            }
        }
    }
}

fn backoff_for(attempt: u32) -> Duration {
    Duration::from_secs(1u64 << (attempt - 1).min(MAX_BACKOFF_SHIFT))
}

/// Splits a feed response into transport failures, upstream API failures and
/// usable payloads.
pub fn classify_response(status: StatusCode, body: &str) -> Result<RawReading, IngestError> {
    if !status.is_success() {
        return Err(IngestError::Transport {
            status: Some(status.as_u16()),
            detail: truncate(body, 200),
        });
    }

    let value = serde_json::from_str::<Value>(body).map_err(|e| IngestError::Transport {
        status: Some(status.as_u16()),
        detail: format!("feed response is not valid JSON: {e}"),
    })?;

    if value.get("status").and_then(Value::as_str) != Some("ok") {
        return Err(IngestError::UpstreamApi {
            message: upstream_message(&value),
        });
    }

    Ok(RawReading::new(value))
}

// The feed puts its error text in `message` or, more often, in `data`.
fn upstream_message(value: &Value) -> String {
    value
        .get("message")
        .and_then(Value::as_str)
        .or_else(|| value.get("data").and_then(Value::as_str))
        .unwrap_or("Unknown error")
        .to_string()
}

fn truncate(s: &str, max_chars: usize) -> String {
    let mut out: String = s.chars().take(max_chars).collect();
    if s.chars().count() > max_chars {
        out.push_str("...");
    }
    out
}
