//! Backend driver abstraction.
//!
//! Every supported store family implements [`BackendDriver`]. Drivers are
//! created unconnected by a [`DriverFactory`] and handed to the
//! [`ConnectionManager`](crate::connection::ConnectionManager), which owns the
//! single live session. Drivers that can expose record-level data also
//! implement [`DocumentSource`], the seam used by the document-store analysis
//! procedures.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ProbeError, Result};
use crate::security::Credentials;

pub mod document;
pub mod memory;

#[cfg(feature = "cassandra")]
pub mod cassandra;
#[cfg(feature = "elasticsearch")]
pub mod elasticsearch;
#[cfg(feature = "mongodb")]
pub mod mongodb;
#[cfg(feature = "redis")]
pub mod redis;

pub use document::{
    CollectionStats, DatabaseStats, DocumentSource, FieldSummary, IndexInfo, RecordFilter,
    SampledDocument,
};
pub use memory::{MemoryDocumentStore, MemoryDriver, MemoryDriverFactory, MemoryOperation};

/// Family of non-relational store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    /// Document store (MongoDB).
    Document,
    /// Key-value store (Redis).
    KeyValue,
    /// Wide-column store (Cassandra).
    WideColumn,
    /// Search index (Elasticsearch).
    SearchIndex,
}

impl BackendKind {
    /// All supported kinds, in declaration order.
    pub const ALL: [BackendKind; 4] = [
        BackendKind::Document,
        BackendKind::KeyValue,
        BackendKind::WideColumn,
        BackendKind::SearchIndex,
    ];

    /// Name of the reference driver for this kind.
    pub fn driver_name(&self) -> &'static str {
        match self {
            BackendKind::Document => "mongodb",
            BackendKind::KeyValue => "redis",
            BackendKind::WideColumn => "cassandra",
            BackendKind::SearchIndex => "elasticsearch",
        }
    }

    pub fn default_port(&self) -> u16 {
        match self {
            BackendKind::Document => 27017,
            BackendKind::KeyValue => 6379,
            BackendKind::WideColumn => 9042,
            BackendKind::SearchIndex => 9200,
        }
    }

    /// Connection string template for this kind.
    pub fn connection_format(&self) -> &'static str {
        match self {
            BackendKind::Document => "mongodb://host:port/database",
            BackendKind::KeyValue => "redis://host:port",
            BackendKind::WideColumn => "host:port",
            BackendKind::SearchIndex => "http://host:port",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            BackendKind::Document => "Document-oriented NoSQL database",
            BackendKind::KeyValue => "In-memory key-value store",
            BackendKind::WideColumn => "Distributed wide-column NoSQL database",
            BackendKind::SearchIndex => "Distributed search and analytics engine",
        }
    }

    /// Connect options that must be present for this kind.
    pub fn required_options(&self) -> &'static [&'static str] {
        match self {
            BackendKind::Document => &["database"],
            BackendKind::WideColumn => &["keyspace"],
            BackendKind::KeyValue | BackendKind::SearchIndex => &[],
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BackendKind::Document => "document",
            BackendKind::KeyValue => "key-value",
            BackendKind::WideColumn => "wide-column",
            BackendKind::SearchIndex => "search-index",
        };
        write!(f, "{name}")
    }
}

impl FromStr for BackendKind {
    type Err = ProbeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mongodb" | "document" | "document-store" => Ok(BackendKind::Document),
            "redis" | "key-value" => Ok(BackendKind::KeyValue),
            "cassandra" | "wide-column" => Ok(BackendKind::WideColumn),
            "elasticsearch" | "search-index" => Ok(BackendKind::SearchIndex),
            _ => Err(ProbeError::unsupported_backend(s)),
        }
    }
}

/// Parameters for opening a session.
#[derive(Debug, Clone, Default)]
pub struct ConnectRequest {
    pub endpoint: String,
    pub credentials: Option<Credentials>,
    pub options: BTreeMap<String, String>,
}

impl ConnectRequest {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Default::default()
        }
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    pub fn option(&self, key: &str) -> Option<&str> {
        self.options.get(key).map(String::as_str)
    }

    /// Returns the option or a configuration error naming the driver.
    pub fn require_option(&self, driver: &str, key: &str) -> Result<&str> {
        self.option(key)
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| {
                ProbeError::Configuration(format!(
                    "{driver} connections require the '{key}' option"
                ))
            })
    }

    /// The `keyspace` option, falling back to `database`.
    pub fn require_keyspace(&self, driver: &str) -> Result<&str> {
        self.require_option(driver, "keyspace")
            .or_else(|_| self.require_option(driver, "database"))
            .map_err(|_| {
                ProbeError::Configuration(format!(
                    "{driver} connections require the 'keyspace' or 'database' option"
                ))
            })
    }
}

/// Uniform description of a live session.
///
/// The default value (kind `None`) stands for "not connected".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectionDescriptor {
    pub kind: Option<BackendKind>,
    pub driver: String,
    /// Endpoint with any inline password masked.
    pub endpoint: String,
    /// Database or keyspace name, when the backend has one.
    pub database: Option<String>,
    pub containers: Vec<String>,
    pub stats: BTreeMap<String, Value>,
    pub connected_at: Option<DateTime<Utc>>,
}

impl ConnectionDescriptor {
    pub fn is_connected(&self) -> bool {
        self.kind.is_some()
    }
}

/// A driver for one backend family.
///
/// Implementations use interior mutability so a connected driver can be
/// shared behind an `Arc` by concurrently running analysis tasks.
#[async_trait]
pub trait BackendDriver: fmt::Debug + Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Short driver name used in errors and descriptors.
    fn name(&self) -> &str;

    /// Opens a session. Fails with [`ProbeError::Connection`] on network or
    /// authentication failure.
    async fn connect(&self, request: &ConnectRequest) -> Result<ConnectionDescriptor>;

    /// Closes the session. Calling it on a closed driver is a no-op.
    async fn disconnect(&self) -> Result<()>;

    /// Round-trips to the backend. Never errors.
    async fn test_liveness(&self) -> bool;

    /// Named containers (collections, keys, tables, indices), sorted.
    async fn list_containers(&self) -> Result<Vec<String>>;

    /// Raw driver statistics.
    async fn stats(&self) -> Result<BTreeMap<String, Value>>;

    /// Record-level access, for drivers that support it.
    fn document_source(&self) -> Option<&dyn DocumentSource> {
        None
    }
}

/// Builds unconnected drivers.
pub trait DriverFactory: Send + Sync {
    fn create(&self, kind: BackendKind) -> Result<Arc<dyn BackendDriver>>;
}

/// Builds the network drivers compiled into this crate.
///
/// Kinds whose feature flag is off yield [`ProbeError::UnsupportedBackend`].
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultDriverFactory;

impl DriverFactory for DefaultDriverFactory {
    fn create(&self, kind: BackendKind) -> Result<Arc<dyn BackendDriver>> {
        match kind {
            #[cfg(feature = "mongodb")]
            BackendKind::Document => Ok(Arc::new(mongodb::MongoDriver::new())),
            #[cfg(feature = "redis")]
            BackendKind::KeyValue => Ok(Arc::new(redis::RedisDriver::new())),
            #[cfg(feature = "cassandra")]
            BackendKind::WideColumn => Ok(Arc::new(cassandra::CassandraDriver::new())),
            #[cfg(feature = "elasticsearch")]
            BackendKind::SearchIndex => Ok(Arc::new(elasticsearch::ElasticsearchDriver::new())),
            #[allow(unreachable_patterns)]
            other => Err(ProbeError::unsupported_backend(format!(
                "{} (enable the '{}' feature)",
                other.driver_name(),
                other.driver_name()
            ))),
        }
    }
}
