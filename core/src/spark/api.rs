//! Spark service REST client
//!
//! `SparkApi` is the seam between the service module and the backend;
//! `HttpSparkApi` talks to the gateway over HTTP.
use async_trait::async_trait;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

use super::types::{Block, SparkExported, SparkStatus, UnitAlternatives, UserUnits};
use crate::{BrewlinkError, Result};

/// Backend operations consumed by the service module
#[async_trait]
pub trait SparkApi: Send + Sync {
    async fn fetch_block(&self, block: &Block) -> Result<Block>;
    async fn fetch_blocks(&self, service_id: &str) -> Result<Vec<Block>>;
    async fn create_block(&self, block: &Block) -> Result<Block>;
    async fn persist_block(&self, block: &Block) -> Result<Block>;
    async fn delete_block(&self, block: &Block) -> Result<()>;
    async fn rename_block(&self, service_id: &str, current_id: &str, new_id: &str) -> Result<()>;
    async fn clear_blocks(&self, service_id: &str) -> Result<()>;
    async fn fetch_compatible_blocks(&self, service_id: &str, block_type: &str) -> Result<Vec<String>>;
    async fn fetch_discovered_blocks(&self, service_id: &str) -> Result<Vec<String>>;
    async fn fetch_units(&self, service_id: &str) -> Result<UserUnits>;
    async fn persist_units(&self, service_id: &str, units: &UserUnits) -> Result<UserUnits>;
    async fn fetch_unit_alternatives(&self, service_id: &str) -> Result<UnitAlternatives>;
    async fn fetch_spark_status(&self, service_id: &str) -> Result<SparkStatus>;
    async fn persist_autoconnecting(&self, service_id: &str, enabled: bool) -> Result<bool>;
    async fn flash_firmware(&self, service_id: &str) -> Result<Value>;
    async fn service_export(&self, service_id: &str) -> Result<SparkExported>;
    async fn service_import(&self, service_id: &str, exported: &SparkExported) -> Result<Vec<String>>;
    async fn controller_reboot(&self, service_id: &str) -> Result<()>;
    async fn service_reboot(&self, service_id: &str) -> Result<()>;
    async fn clean_unused_names(&self, service_id: &str) -> Result<Vec<String>>;
}

/// Configuration for the HTTP client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SparkApiConfig {
    /// Gateway root; service paths are appended as `{base_url}/{service_id}`
    pub base_url: String,
    /// Timeout for API requests in milliseconds
    pub timeout_ms: u64,
    pub user_agent: String,
}

impl Default for SparkApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:80".to_string(),
            timeout_ms: 10_000,
            user_agent: "brewlink/0.1".to_string(),
        }
    }
}

impl SparkApiConfig {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            base_url: std::env::var("BREWLINK_API_URL")
                .ok()
                .filter(|s| !s.is_empty())
                .unwrap_or(default.base_url),
            timeout_ms: std::env::var("BREWLINK_API_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.timeout_ms),
            user_agent: default.user_agent,
        }
    }
}

#[derive(Debug, Deserialize)]
struct IdResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ImportResponse {
    #[serde(default)]
    messages: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct AutoconnectingResponse {
    enabled: bool,
}

pub struct HttpSparkApi {
    config: SparkApiConfig,
    http_client: reqwest::Client,
}

impl HttpSparkApi {
    pub fn new() -> Self {
        Self::with_config(SparkApiConfig::default())
    }

    pub fn with_config(config: SparkApiConfig) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .user_agent(&config.user_agent)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            config,
            http_client,
        }
    }

    fn url(&self, service_id: &str, path: &str) -> String {
        format!(
            "{}/{}/{}",
            self.config.base_url.trim_end_matches('/'),
            service_id,
            path
        )
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        service_id: &str,
        path: &str,
        body: Option<Value>,
    ) -> Result<T> {
        let url = self.url(service_id, path);
        debug!(target: "spark_api", method = %method, url = %url, "Sending request");

        let mut request = self.http_client.request(method, &url);
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await.map_err(|e| {
            warn!(target: "spark_api", url = %url, error = %e, "Request failed");
            BrewlinkError::BackendUnavailable(format!("{}: {}", url, e))
        })?;

        if !response.status().is_success() {
            let status = response.status();
            warn!(target: "spark_api", url = %url, status = %status, "Backend returned error");
            return Err(BrewlinkError::BackendUnavailable(format!(
                "{} returned status: {}",
                url, status
            )));
        }

        response.json::<T>().await.map_err(|e| {
            warn!(target: "spark_api", url = %url, error = %e, "Failed to parse response");
            BrewlinkError::BackendUnavailable(format!("failed to parse response from {}: {}", url, e))
        })
    }

    async fn post<T: DeserializeOwned>(&self, service_id: &str, path: &str, body: Value) -> Result<T> {
        self.request(Method::POST, service_id, path, Some(body)).await
    }
}

impl Default for HttpSparkApi {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SparkApi for HttpSparkApi {
    async fn fetch_block(&self, block: &Block) -> Result<Block> {
        self.post(&block.service_id, "blocks/read", json!({ "id": block.id }))
            .await
    }

    async fn fetch_blocks(&self, service_id: &str) -> Result<Vec<Block>> {
        self.post(service_id, "blocks/all/read", json!({})).await
    }

    async fn create_block(&self, block: &Block) -> Result<Block> {
        self.post(&block.service_id, "blocks/create", serde_json::to_value(block)?)
            .await
    }

    async fn persist_block(&self, block: &Block) -> Result<Block> {
        self.post(&block.service_id, "blocks/write", serde_json::to_value(block)?)
            .await
    }

    async fn delete_block(&self, block: &Block) -> Result<()> {
        let _: IdResponse = self
            .post(&block.service_id, "blocks/delete", json!({ "id": block.id }))
            .await?;
        Ok(())
    }

    async fn rename_block(&self, service_id: &str, current_id: &str, new_id: &str) -> Result<()> {
        let _: Value = self
            .post(
                service_id,
                "blocks/rename",
                json!({ "existing": current_id, "desired": new_id }),
            )
            .await?;
        Ok(())
    }

    async fn clear_blocks(&self, service_id: &str) -> Result<()> {
        let _: Value = self.post(service_id, "blocks/all/delete", json!({})).await?;
        Ok(())
    }

    async fn fetch_compatible_blocks(&self, service_id: &str, block_type: &str) -> Result<Vec<String>> {
        let ids: Vec<IdResponse> = self
            .post(service_id, "blocks/compatible", json!({ "interface": block_type }))
            .await?;
        Ok(ids.into_iter().map(|r| r.id).collect())
    }

    async fn fetch_discovered_blocks(&self, service_id: &str) -> Result<Vec<String>> {
        let blocks: Vec<IdResponse> = self.post(service_id, "blocks/discover", json!({})).await?;
        Ok(blocks.into_iter().map(|r| r.id).collect())
    }

    async fn fetch_units(&self, service_id: &str) -> Result<UserUnits> {
        self.request(Method::GET, service_id, "settings/units", None)
            .await
    }

    async fn persist_units(&self, service_id: &str, units: &UserUnits) -> Result<UserUnits> {
        self.request(
            Method::PUT,
            service_id,
            "settings/units",
            Some(serde_json::to_value(units)?),
        )
        .await
    }

    async fn fetch_unit_alternatives(&self, service_id: &str) -> Result<UnitAlternatives> {
        self.request(Method::GET, service_id, "settings/unit_alternatives", None)
            .await
    }

    async fn fetch_spark_status(&self, service_id: &str) -> Result<SparkStatus> {
        self.post(service_id, "system/status", json!({})).await
    }

    async fn persist_autoconnecting(&self, service_id: &str, enabled: bool) -> Result<bool> {
        let resp: AutoconnectingResponse = self
            .request(
                Method::PUT,
                service_id,
                "settings/autoconnecting",
                Some(json!({ "enabled": enabled })),
            )
            .await?;
        Ok(resp.enabled)
    }

    async fn flash_firmware(&self, service_id: &str) -> Result<Value> {
        self.post(service_id, "system/flash", json!({})).await
    }

    async fn service_export(&self, service_id: &str) -> Result<SparkExported> {
        self.post(service_id, "blocks/backup/save", json!({})).await
    }

    async fn service_import(&self, service_id: &str, exported: &SparkExported) -> Result<Vec<String>> {
        let resp: ImportResponse = self
            .post(service_id, "blocks/backup/load", serde_json::to_value(exported)?)
            .await?;
        Ok(resp.messages)
    }

    async fn controller_reboot(&self, service_id: &str) -> Result<()> {
        let _: Value = self.post(service_id, "system/reboot/controller", json!({})).await?;
        Ok(())
    }

    async fn service_reboot(&self, service_id: &str) -> Result<()> {
        let _: Value = self.post(service_id, "system/reboot/service", json!({})).await?;
        Ok(())
    }

    async fn clean_unused_names(&self, service_id: &str) -> Result<Vec<String>> {
        let ids: Vec<IdResponse> = self.post(service_id, "blocks/cleanup", json!({})).await?;
        Ok(ids.into_iter().map(|r| r.id).collect())
    }
}
