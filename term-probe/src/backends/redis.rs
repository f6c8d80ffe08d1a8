//! Redis key-value driver.
//!
//! Containers are the keys discovered with `SCAN` (capped by the `max_keys`
//! option, default 1000). Statistics come from `INFO` and `DBSIZE`.

use std::collections::BTreeMap;

use ::redis::aio::MultiplexedConnection;
use ::redis::Client;
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, instrument, warn};
use url::Url;

use super::{BackendDriver, BackendKind, ConnectRequest, ConnectionDescriptor};
use crate::error::{ProbeError, Result};
use crate::security::{redact_endpoint, Credentials};

const DRIVER: &str = "redis";
const DEFAULT_MAX_KEYS: usize = 1000;
const SCAN_BATCH: usize = 100;

/// `INFO` fields copied into the driver statistics.
const INFO_FIELDS: &[&str] = &[
    "redis_version",
    "redis_mode",
    "uptime_in_seconds",
    "connected_clients",
    "used_memory",
    "used_memory_human",
    "total_commands_processed",
];

#[derive(Clone)]
struct RedisSession {
    connection: MultiplexedConnection,
    max_keys: usize,
}

pub struct RedisDriver {
    session: RwLock<Option<RedisSession>>,
}

impl std::fmt::Debug for RedisDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisDriver")
            .field("connected", &self.session.read().is_some())
            .finish()
    }
}

impl Default for RedisDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl RedisDriver {
    pub fn new() -> Self {
        Self {
            session: RwLock::new(None),
        }
    }

    fn session(&self) -> Result<RedisSession> {
        self.session
            .read()
            .clone()
            .ok_or_else(|| ProbeError::query(DRIVER, "session is closed"))
    }
}

fn query_error(err: ::redis::RedisError) -> ProbeError {
    ProbeError::query(DRIVER, err.to_string())
}

/// Builds the connection URL, injecting caller credentials.
fn connection_url(endpoint: &str, credentials: Option<&Credentials>) -> Result<Url> {
    let mut url = Url::parse(endpoint)
        .map_err(|e| ProbeError::connection_with_source(DRIVER, "invalid endpoint", Box::new(e)))?;
    if let Some(credentials) = credentials {
        let invalid = |_| ProbeError::connection(DRIVER, "endpoint cannot carry credentials");
        url.set_username(&credentials.username).map_err(invalid)?;
        url.set_password(Some(credentials.password.expose()))
            .map_err(invalid)?;
    }
    Ok(url)
}

/// Parses `INFO` output into `field -> value`.
fn parse_info(info: &str) -> BTreeMap<String, String> {
    info.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

async fn scan_keys(connection: &mut MultiplexedConnection, max_keys: usize) -> Result<Vec<String>> {
    let mut keys = Vec::new();
    let mut cursor: u64 = 0;
    loop {
        let (next, batch): (u64, Vec<String>) = ::redis::cmd("SCAN")
            .arg(cursor)
            .arg("COUNT")
            .arg(SCAN_BATCH)
            .query_async(connection)
            .await
            .map_err(query_error)?;
        keys.extend(batch);
        if next == 0 || keys.len() >= max_keys {
            break;
        }
        cursor = next;
    }
    keys.sort();
    keys.dedup();
    keys.truncate(max_keys);
    Ok(keys)
}

#[async_trait]
impl BackendDriver for RedisDriver {
    fn kind(&self) -> BackendKind {
        BackendKind::KeyValue
    }

    fn name(&self) -> &str {
        DRIVER
    }

    #[instrument(skip(self, request), fields(endpoint = %redact_endpoint(&request.endpoint)))]
    async fn connect(&self, request: &ConnectRequest) -> Result<ConnectionDescriptor> {
        let max_keys = match request.option("max_keys") {
            Some(raw) => raw.parse::<usize>().map_err(|e| {
                ProbeError::Configuration(format!("max_keys={raw:?} is not a number: {e}"))
            })?,
            None => DEFAULT_MAX_KEYS,
        };

        let url = connection_url(&request.endpoint, request.credentials.as_ref())?;
        let client = Client::open(url.as_str()).map_err(|e| {
            ProbeError::connection_with_source(DRIVER, "invalid connection string", Box::new(e))
        })?;
        let mut connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| ProbeError::connection_with_source(DRIVER, "unreachable", Box::new(e)))?;

        let pong: String = ::redis::cmd("PING")
            .query_async(&mut connection)
            .await
            .map_err(|e| ProbeError::connection_with_source(DRIVER, "ping failed", Box::new(e)))?;
        debug!(reply = %pong, "ping");

        *self.session.write() = Some(RedisSession {
            connection,
            max_keys,
        });

        let containers = self.list_containers().await?;
        let stats = self.stats().await.unwrap_or_default();

        Ok(ConnectionDescriptor {
            kind: Some(BackendKind::KeyValue),
            driver: DRIVER.to_string(),
            endpoint: redact_endpoint(&request.endpoint),
            database: None,
            containers,
            stats,
            connected_at: Some(Utc::now()),
        })
    }

    async fn disconnect(&self) -> Result<()> {
        // Dropping the last handle closes the multiplexed connection.
        if self.session.write().take().is_some() {
            debug!("disconnected");
        }
        Ok(())
    }

    async fn test_liveness(&self) -> bool {
        let Ok(mut session) = self.session() else {
            return false;
        };
        let reply: std::result::Result<String, _> = ::redis::cmd("PING")
            .query_async(&mut session.connection)
            .await;
        match reply {
            Ok(_) => true,
            Err(e) => {
                warn!(error = %e, "liveness probe failed");
                false
            }
        }
    }

    async fn list_containers(&self) -> Result<Vec<String>> {
        let mut session = self.session()?;
        scan_keys(&mut session.connection, session.max_keys).await
    }

    async fn stats(&self) -> Result<BTreeMap<String, Value>> {
        let mut session = self.session()?;
        let info: String = ::redis::cmd("INFO")
            .query_async(&mut session.connection)
            .await
            .map_err(query_error)?;
        let keys: u64 = ::redis::cmd("DBSIZE")
            .query_async(&mut session.connection)
            .await
            .map_err(query_error)?;

        let parsed = parse_info(&info);
        let mut stats: BTreeMap<String, Value> = INFO_FIELDS
            .iter()
            .filter_map(|field| {
                parsed
                    .get(*field)
                    .map(|v| (field.to_string(), Value::from(v.as_str())))
            })
            .collect();
        stats.insert("keys".to_string(), Value::from(keys));
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_info() {
        let info = "# Server\r\nredis_version:7.2.4\r\nredis_mode:standalone\r\n\r\n\
                    # Memory\r\nused_memory:1024\r\n";
        let parsed = parse_info(info);
        assert_eq!(parsed["redis_version"], "7.2.4");
        assert_eq!(parsed["used_memory"], "1024");
        assert_eq!(parsed.len(), 3);
    }

    #[test]
    fn test_connection_url_injects_credentials() {
        let creds = Credentials::new("default", "s3cret");
        let url = connection_url("redis://cache:6379", Some(&creds)).unwrap();
        assert_eq!(url.username(), "default");
        assert_eq!(url.password(), Some("s3cret"));
        assert_eq!(url.port(), Some(6379));
    }

    #[test]
    fn test_connection_url_rejects_garbage() {
        assert!(matches!(
            connection_url("not a url", None),
            Err(ProbeError::Connection { .. })
        ));
    }

    #[tokio::test]
    async fn test_closed_driver() {
        let driver = RedisDriver::new();
        assert!(!driver.test_liveness().await);
        assert!(driver.list_containers().await.is_err());
        driver.disconnect().await.unwrap();
    }
}
