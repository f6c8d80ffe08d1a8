//! Elasticsearch search-index driver.
//!
//! Containers are the indices reported by `_cat/indices`; statistics are the
//! cluster name and version from the root endpoint. Hidden indices (leading
//! `.`) are skipped.

use std::collections::BTreeMap;
use std::time::Duration;

use ::elasticsearch::auth::Credentials as EsCredentials;
use ::elasticsearch::cat::CatIndicesParts;
use ::elasticsearch::http::transport::{SingleNodeConnectionPool, TransportBuilder};
use ::elasticsearch::http::Url;
use ::elasticsearch::Elasticsearch;
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use super::{BackendDriver, BackendKind, ConnectRequest, ConnectionDescriptor};
use crate::error::{ProbeError, Result};
use crate::security::redact_endpoint;

const DRIVER: &str = "elasticsearch";
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;

pub struct ElasticsearchDriver {
    client: RwLock<Option<Elasticsearch>>,
}

impl std::fmt::Debug for ElasticsearchDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElasticsearchDriver")
            .field("connected", &self.client.read().is_some())
            .finish()
    }
}

impl Default for ElasticsearchDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl ElasticsearchDriver {
    pub fn new() -> Self {
        Self {
            client: RwLock::new(None),
        }
    }

    fn client(&self) -> Result<Elasticsearch> {
        self.client
            .read()
            .clone()
            .ok_or_else(|| ProbeError::query(DRIVER, "session is closed"))
    }

    fn build_client(request: &ConnectRequest) -> Result<Elasticsearch> {
        let url: Url = request.endpoint.parse().map_err(|e| {
            ProbeError::connection_with_source(DRIVER, "invalid endpoint", Box::new(e))
        })?;
        let timeout_ms = match request.option("request_timeout_ms") {
            Some(raw) => raw.parse::<u64>().map_err(|e| {
                ProbeError::Configuration(format!(
                    "request_timeout_ms={raw:?} is not a number: {e}"
                ))
            })?,
            None => DEFAULT_REQUEST_TIMEOUT_MS,
        };

        let mut builder = TransportBuilder::new(SingleNodeConnectionPool::new(url))
            .timeout(Duration::from_millis(timeout_ms));
        if let Some(credentials) = &request.credentials {
            builder = builder.auth(EsCredentials::Basic(
                credentials.username.clone(),
                credentials.password.expose().to_string(),
            ));
        }

        let transport = builder.build().map_err(|e| {
            ProbeError::connection_with_source(DRIVER, "failed to build transport", Box::new(e))
        })?;
        Ok(Elasticsearch::new(transport))
    }
}

fn query_error(err: ::elasticsearch::Error) -> ProbeError {
    ProbeError::query(DRIVER, err.to_string())
}

/// Extracts visible index names from a `_cat/indices?format=json` reply.
fn index_names(reply: &Value) -> Vec<String> {
    let mut names: Vec<String> = reply
        .as_array()
        .map(|rows| {
            rows.iter()
                .filter_map(|row| row.get("index").and_then(Value::as_str))
                .filter(|name| !name.starts_with('.'))
                .map(String::from)
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}

#[async_trait]
impl BackendDriver for ElasticsearchDriver {
    fn kind(&self) -> BackendKind {
        BackendKind::SearchIndex
    }

    fn name(&self) -> &str {
        DRIVER
    }

    #[instrument(skip(self, request), fields(endpoint = %redact_endpoint(&request.endpoint)))]
    async fn connect(&self, request: &ConnectRequest) -> Result<ConnectionDescriptor> {
        let client = Self::build_client(request)?;
        let response = client.ping().send().await.map_err(|e| {
            ProbeError::connection_with_source(DRIVER, "ping failed", Box::new(e))
        })?;
        if !response.status_code().is_success() {
            return Err(ProbeError::connection(
                DRIVER,
                format!("ping returned {}", response.status_code()),
            ));
        }

        *self.client.write() = Some(client);

        let containers = self.list_containers().await?;
        let stats = self.stats().await.unwrap_or_default();
        debug!(indices = containers.len(), "connected");

        Ok(ConnectionDescriptor {
            kind: Some(BackendKind::SearchIndex),
            driver: DRIVER.to_string(),
            endpoint: redact_endpoint(&request.endpoint),
            database: None,
            containers,
            stats,
            connected_at: Some(Utc::now()),
        })
    }

    async fn disconnect(&self) -> Result<()> {
        if self.client.write().take().is_some() {
            debug!("disconnected");
        }
        Ok(())
    }

    async fn test_liveness(&self) -> bool {
        let Ok(client) = self.client() else {
            return false;
        };
        match client.ping().send().await {
            Ok(response) => response.status_code().is_success(),
            Err(e) => {
                warn!(error = %e, "liveness probe failed");
                false
            }
        }
    }

    async fn list_containers(&self) -> Result<Vec<String>> {
        let reply: Value = self
            .client()?
            .cat()
            .indices(CatIndicesParts::None)
            .format("json")
            .send()
            .await
            .map_err(query_error)?
            .json()
            .await
            .map_err(query_error)?;
        Ok(index_names(&reply))
    }

    async fn stats(&self) -> Result<BTreeMap<String, Value>> {
        let info: Value = self
            .client()?
            .info()
            .send()
            .await
            .map_err(query_error)?
            .json()
            .await
            .map_err(query_error)?;

        let mut stats = BTreeMap::new();
        if let Some(name) = info.get("cluster_name") {
            stats.insert("cluster_name".to_string(), name.clone());
        }
        if let Some(version) = info.pointer("/version/number") {
            stats.insert("version".to_string(), version.clone());
        }
        Ok(stats)
    }
}
