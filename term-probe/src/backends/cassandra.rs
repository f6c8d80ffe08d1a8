//! Cassandra wide-column driver.
//!
//! The endpoint is a comma separated list of `host:port` contact points. The
//! keyspace comes from the `keyspace` option, else from `database`.
//! Containers are the keyspace's tables.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use cdrs_tokio::authenticators::StaticPasswordAuthenticatorProvider;
use cdrs_tokio::cluster::session::{Session, SessionBuilder, TcpSessionBuilder};
use cdrs_tokio::cluster::{NodeTcpConfigBuilder, TcpConnectionManager};
use cdrs_tokio::load_balancing::RoundRobinLoadBalancingStrategy;
use cdrs_tokio::query_values;
use cdrs_tokio::transport::TransportTcp;
use cdrs_tokio::types::rows::Row;
use cdrs_tokio::types::IntoRustByName;
use chrono::Utc;
use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use super::{BackendDriver, BackendKind, ConnectRequest, ConnectionDescriptor};
use crate::error::{ProbeError, Result};
use crate::security::redact_endpoint;

const DRIVER: &str = "cassandra";

type CassandraSession = Session<
    TransportTcp,
    TcpConnectionManager,
    RoundRobinLoadBalancingStrategy<TransportTcp, TcpConnectionManager>,
>;

#[derive(Clone)]
struct ActiveSession {
    session: Arc<CassandraSession>,
    keyspace: String,
}

pub struct CassandraDriver {
    session: RwLock<Option<ActiveSession>>,
}

impl std::fmt::Debug for CassandraDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CassandraDriver")
            .field(
                "keyspace",
                &self.session.read().as_ref().map(|s| s.keyspace.clone()),
            )
            .finish()
    }
}

impl Default for CassandraDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl CassandraDriver {
    pub fn new() -> Self {
        Self {
            session: RwLock::new(None),
        }
    }

    fn active(&self) -> Result<ActiveSession> {
        self.session
            .read()
            .clone()
            .ok_or_else(|| ProbeError::query(DRIVER, "session is closed"))
    }
}

fn query_error(err: cdrs_tokio::error::Error) -> ProbeError {
    ProbeError::query(DRIVER, err.to_string())
}

fn contact_points(endpoint: &str) -> Vec<String> {
    endpoint
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(String::from)
        .collect()
}

async fn rows(session: &CassandraSession, query: &str) -> Result<Vec<Row>> {
    Ok(session
        .query(query)
        .await
        .map_err(query_error)?
        .response_body()
        .map_err(query_error)?
        .into_rows()
        .unwrap_or_default())
}

fn text_column(row: &Row, column: &str) -> Option<String> {
    IntoRustByName::<String>::get_by_name(row, column)
        .ok()
        .flatten()
}

#[async_trait]
impl BackendDriver for CassandraDriver {
    fn kind(&self) -> BackendKind {
        BackendKind::WideColumn
    }

    fn name(&self) -> &str {
        DRIVER
    }

    #[instrument(skip(self, request), fields(endpoint = %redact_endpoint(&request.endpoint)))]
    async fn connect(&self, request: &ConnectRequest) -> Result<ConnectionDescriptor> {
        let keyspace = request.require_keyspace(DRIVER)?.to_string();
        let points = contact_points(&request.endpoint);
        if points.is_empty() {
            return Err(ProbeError::Configuration(
                "cassandra connections require at least one contact point".to_string(),
            ));
        }

        let mut builder = NodeTcpConfigBuilder::new();
        for point in points {
            builder = builder.with_contact_point(point.into());
        }
        if let Some(credentials) = &request.credentials {
            builder = builder.with_authenticator_provider(Arc::new(
                StaticPasswordAuthenticatorProvider::new(
                    credentials.username.clone(),
                    credentials.password.expose().to_string(),
                ),
            ));
        }
        let config = builder
            .build()
            .await
            .map_err(|e| ProbeError::connection(DRIVER, e.to_string()))?;
        let session = TcpSessionBuilder::new(RoundRobinLoadBalancingStrategy::new(), config)
            .build()
            .await
            .map_err(|e| ProbeError::connection(DRIVER, e.to_string()))?;

        *self.session.write() = Some(ActiveSession {
            session: Arc::new(session),
            keyspace: keyspace.clone(),
        });

        let containers = self.list_containers().await?;
        let stats = self.stats().await.unwrap_or_default();
        debug!(keyspace = %keyspace, tables = containers.len(), "connected");

        Ok(ConnectionDescriptor {
            kind: Some(BackendKind::WideColumn),
            driver: DRIVER.to_string(),
            endpoint: redact_endpoint(&request.endpoint),
            database: Some(keyspace),
            containers,
            stats,
            connected_at: Some(Utc::now()),
        })
    }

    async fn disconnect(&self) -> Result<()> {
        if self.session.write().take().is_some() {
            debug!("disconnected");
        }
        Ok(())
    }

    async fn test_liveness(&self) -> bool {
        let Ok(active) = self.active() else {
            return false;
        };
        match rows(&active.session, "SELECT release_version FROM system.local").await {
            Ok(_) => true,
            Err(e) => {
                warn!(error = %e, "liveness probe failed");
                false
            }
        }
    }

    async fn list_containers(&self) -> Result<Vec<String>> {
        let active = self.active()?;
        let rows = active
            .session
            .query_with_values(
                "SELECT table_name FROM system_schema.tables WHERE keyspace_name = ?",
                query_values!(active.keyspace.clone()),
            )
            .await
            .map_err(query_error)?
            .response_body()
            .map_err(query_error)?
            .into_rows()
            .unwrap_or_default();

        let mut tables: Vec<String> = rows
            .iter()
            .filter_map(|row| text_column(row, "table_name"))
            .collect();
        tables.sort();
        Ok(tables)
    }

    async fn stats(&self) -> Result<BTreeMap<String, Value>> {
        let active = self.active()?;
        let rows = rows(
            &active.session,
            "SELECT release_version, cluster_name FROM system.local",
        )
        .await?;

        let mut stats = BTreeMap::new();
        if let Some(row) = rows.first() {
            for column in ["release_version", "cluster_name"] {
                if let Some(value) = text_column(row, column) {
                    stats.insert(column.to_string(), Value::from(value));
                }
            }
        }
        stats.insert("keyspace".to_string(), Value::from(active.keyspace));
        Ok(stats)
    }
}
