//! WooCommerce REST client.
//!
//! Talks to `<url>/wp-json/wc/v3/<resource>` with HTTP basic auth
//! (consumer key / secret). The client is async reqwest under a
//! current-thread tokio runtime; every call blocks until the response is in,
//! so the engine sees plain synchronous calls.

use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use super::{records_from_json, PageQuery, RemoteApi};
use crate::config::RemoteSettings;
use crate::error::{Error, Result};
use crate::sync::{RecordMap, RemoteId, SyncError, SyncResult};

/// REST API prefix appended to the shop URL.
const API_PREFIX: &str = "wp-json/wc/v3";

/// WooCommerce REST API client.
pub struct WooCommerceClient {
    client: reqwest::Client,
    runtime: tokio::runtime::Runtime,
    base_url: String,
    consumer_key: String,
    consumer_secret: String,
}

impl WooCommerceClient {
    /// Build a client from remote settings.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the URL or credentials are missing, or the
    /// HTTP client / runtime cannot be created.
    pub fn new(settings: &RemoteSettings) -> Result<Self> {
        let base_url = settings
            .url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| Error::Config("remote url is not set".into()))?
            .trim_end_matches('/')
            .to_string();
        let consumer_key = settings
            .consumer_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| Error::Config("remote consumer key is not set".into()))?;
        let consumer_secret = settings
            .consumer_secret
            .clone()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| Error::Config("remote consumer secret is not set".into()))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .user_agent(concat!("ordersync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {e}")))?;

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| Error::Config(format!("Failed to start HTTP runtime: {e}")))?;

        Ok(Self {
            client,
            runtime,
            base_url,
            consumer_key,
            consumer_secret,
        })
    }

    /// Full URL of a resource path.
    #[must_use]
    pub fn endpoint(&self, resource: &str) -> String {
        endpoint_url(&self.base_url, resource)
    }

    fn send(&self, request: reqwest::RequestBuilder) -> SyncResult<Value> {
        let request = request.basic_auth(&self.consumer_key, Some(&self.consumer_secret));

        self.runtime.block_on(async {
            let response = request
                .send()
                .await
                .map_err(|e| SyncError::Remote(format!("request failed: {e}")))?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(SyncError::Remote(format!("{status}: {body}")));
            }

            response
                .json::<Value>()
                .await
                .map_err(|e| SyncError::Remote(format!("invalid response body: {e}")))
        })
    }
}

fn endpoint_url(base_url: &str, resource: &str) -> String {
    format!(
        "{}/{API_PREFIX}/{}",
        base_url.trim_end_matches('/'),
        resource.trim_start_matches('/')
    )
}

fn into_record(value: Value) -> SyncResult<RecordMap> {
    match value {
        Value::Object(record) => Ok(record),
        other => Err(SyncError::Remote(format!("expected a record, got {other}"))),
    }
}

impl RemoteApi for WooCommerceClient {
    fn fetch_page(
        &self,
        resource: &str,
        page: u32,
        query: &PageQuery,
    ) -> SyncResult<Vec<(RemoteId, RecordMap)>> {
        let url = self.endpoint(resource);
        debug!(%url, page, per_page = query.per_page, "Fetching remote page");

        let body = self.send(self.client.get(&url).query(&query.pairs(page)))?;
        records_from_json(body)
    }

    fn create(&self, resource: &str, body: &RecordMap) -> SyncResult<RecordMap> {
        let url = self.endpoint(resource);
        debug!(%url, "Creating remote record");
        into_record(self.send(self.client.post(&url).json(body))?)
    }

    fn update(&self, resource: &str, id: RemoteId, body: &RecordMap) -> SyncResult<RecordMap> {
        let url = self.endpoint(&format!("{}/{id}", resource.trim_end_matches('/')));
        debug!(%url, "Updating remote record");
        into_record(self.send(self.client.put(&url).json(body))?)
    }
}
