use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::Engine;
use serde::de::DeserializeOwned;
use tracing::debug;

use super::error::TransportFailure;
use super::query::Wiql;
use super::raw::{RawResult, RawWorkItem};
use super::Transport;
use crate::config::AdoConfig;

/// Talks to the Azure DevOps REST API with a personal access token.
pub struct HttpTransport {
    config: Arc<AdoConfig>,
    auth_header: String,
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(config: Arc<AdoConfig>) -> Result<Self> {
        // PAT auth is basic auth with an empty user name.
        let creds = format!(":{}", config.pat_token);
        let encoded = base64::engine::general_purpose::STANDARD.encode(creds);
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            config,
            auth_header: format!("Basic {encoded}"),
            client,
        })
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, TransportFailure> {
        let resp = request
            .header("Authorization", &self.auth_header)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| TransportFailure::Connection(e.to_string()))?;

        let status = resp.status();
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| TransportFailure::Connection(e.to_string()))?;

        if !status.is_success() {
            let body = String::from_utf8_lossy(&bytes).trim().to_string();
            let body = if body.is_empty() {
                status.canonical_reason().unwrap_or_default().to_string()
            } else {
                body
            };
            return Err(TransportFailure::Status {
                code: status.as_u16(),
                body,
            });
        }

        serde_json::from_slice(&bytes).map_err(|e| TransportFailure::Decode(e.to_string()))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(&self, query: &Wiql) -> Result<RawResult, TransportFailure> {
        debug!(wiql = %query, "executing WIQL query");
        let request = self
            .client
            .post(self.config.wiql_url())
            .header("Content-Type", "application/json")
            .body(query.envelope());
        self.send(request).await
    }

    async fn fetch_details(&self, ids: &[u64]) -> Result<RawResult, TransportFailure> {
        if ids.is_empty() {
            return Ok(RawResult::empty());
        }
        debug!(count = ids.len(), "fetching work item details");
        let mut items = Vec::with_capacity(ids.len());
        for url in self.config.work_items_urls(ids) {
            let batch: RawResult = self.send(self.client.get(url)).await?;
            items.extend(batch.items.unwrap_or_default());
        }
        Ok(RawResult::from_items(items))
    }

    async fn fetch_with_relations(&self, id: u64) -> Result<RawResult, TransportFailure> {
        debug!(id, "fetching work item with relations");
        let request = self.client.get(self.config.work_item_url(id));
        let item: RawWorkItem = self.send(request).await?;
        Ok(RawResult::from_items(vec![item]))
    }
}
