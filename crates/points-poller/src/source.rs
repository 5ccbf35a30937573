use async_trait::async_trait;
use chrono::{DateTime, Utc};
use points_core::error::external_error;
use points_core::CoreError;
use serde::Deserialize;

/// One event from the external access-event source.
#[derive(Debug, Clone, Deserialize)]
pub struct AccessRecord {
    pub id: String,
    pub accessed_at: DateTime<Utc>,
    pub user: AccessUser,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccessUser {
    pub name: String,
}

/// The core treats the event source as a black box; the concrete
/// integration (HTTP client, auth, rate limiting) is an adapter outside the
/// polling loop itself.
#[async_trait]
pub trait AccessEventSource: Send + Sync {
    async fn fetch_accesses(
        &self,
        after: DateTime<Utc>,
        before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<AccessRecord>, CoreError>;

    fn is_configured(&self) -> bool;
}

/// Adapter over a JSON HTTP endpoint exposing the access-event feed.
pub struct HttpAccessEventSource {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpAccessEventSource {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self { client: reqwest::Client::new(), base_url: base_url.into(), api_key }
    }
}

#[async_trait]
impl AccessEventSource for HttpAccessEventSource {
    async fn fetch_accesses(
        &self,
        after: DateTime<Utc>,
        before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<AccessRecord>, CoreError> {
        let mut request = self
            .client
            .get(format!("{}/accesses", self.base_url))
            .query(&[("after", after.to_rfc3339()), ("before", before.to_rfc3339()), ("limit", limit.to_string())]);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| external_error(format!("fetching accesses: {e}")))?;
        let response = response.error_for_status().map_err(|e| external_error(format!("access source returned an error: {e}")))?;
        response.json().await.map_err(|e| external_error(format!("decoding access source response: {e}")))
    }

    fn is_configured(&self) -> bool {
        !self.base_url.is_empty()
    }
}
