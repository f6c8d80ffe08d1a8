//! Ownership of the single live backend session.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{info, instrument, warn};

use crate::backends::{
    BackendDriver, BackendKind, ConnectRequest, ConnectionDescriptor, DriverFactory,
};
use crate::error::{ProbeError, Result};
use crate::security::redact_endpoint;

/// A connected driver and the descriptor it returned.
#[derive(Debug)]
struct ActiveConnection {
    driver: Arc<dyn BackendDriver>,
    descriptor: ConnectionDescriptor,
}

/// Result of [`ConnectionManager::health`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionHealth {
    pub connected: bool,
    pub kind: Option<BackendKind>,
    pub driver: Option<String>,
    /// Whether the backend answered a liveness round-trip.
    pub live: bool,
    pub checked_at: DateTime<Utc>,
}

/// Owns zero or one active backend connection.
///
/// Connecting while connected fully tears down the previous driver first.
/// The write lock is held across teardown and connect, so concurrent callers
/// never observe two live drivers.
pub struct ConnectionManager {
    factory: Arc<dyn DriverFactory>,
    connect_timeout: Option<Duration>,
    active: RwLock<Option<ActiveConnection>>,
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("connect_timeout", &self.connect_timeout)
            .finish_non_exhaustive()
    }
}

impl ConnectionManager {
    pub fn new(factory: Arc<dyn DriverFactory>) -> Self {
        Self {
            factory,
            connect_timeout: None,
            active: RwLock::new(None),
        }
    }

    /// Bounds each connect attempt.
    pub fn with_connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Connects to a backend of the named kind.
    ///
    /// An unknown or uncompiled kind fails with
    /// [`ProbeError::UnsupportedBackend`] and leaves any current connection
    /// untouched. Any other failure leaves the manager disconnected.
    #[instrument(skip(self, request), fields(endpoint = %redact_endpoint(&request.endpoint)))]
    pub async fn connect(
        &self,
        kind: &str,
        request: &ConnectRequest,
    ) -> Result<ConnectionDescriptor> {
        let kind: BackendKind = kind.parse()?;
        let driver = self.factory.create(kind)?;

        let mut active = self.active.write().await;
        if let Some(previous) = active.take() {
            info!(previous = %previous.driver.name(), "closing previous connection");
            if let Err(e) = previous.driver.disconnect().await {
                warn!(error = %e, "previous driver failed to disconnect cleanly");
            }
        }

        let attempt = match self.connect_timeout {
            Some(timeout) => tokio::time::timeout(timeout, driver.connect(request))
                .await
                .unwrap_or_else(|_| {
                    Err(ProbeError::connection(
                        driver.name(),
                        format!("connect timed out after {timeout:?}"),
                    ))
                }),
            None => driver.connect(request).await,
        };

        match attempt {
            Ok(descriptor) => {
                info!(
                    kind = %kind,
                    driver = %descriptor.driver,
                    containers = descriptor.containers.len(),
                    "connected"
                );
                *active = Some(ActiveConnection {
                    driver,
                    descriptor: descriptor.clone(),
                });
                Ok(descriptor)
            }
            Err(e) => {
                warn!(kind = %kind, error = %e, "connect failed");
                if let Err(cleanup) = driver.disconnect().await {
                    warn!(error = %cleanup, "cleanup after failed connect");
                }
                Err(e)
            }
        }
    }

    /// Closes the active connection. A no-op when disconnected.
    #[instrument(skip(self))]
    pub async fn disconnect(&self) -> Result<()> {
        let previous = self.active.write().await.take();
        if let Some(connection) = previous {
            connection.driver.disconnect().await?;
            info!(driver = %connection.driver.name(), "disconnected");
        }
        Ok(())
    }

    pub async fn is_connected(&self) -> bool {
        self.active.read().await.is_some()
    }

    /// The active descriptor, or the default (disconnected) one.
    pub async fn connection_info(&self) -> ConnectionDescriptor {
        self.active
            .read()
            .await
            .as_ref()
            .map(|a| a.descriptor.clone())
            .unwrap_or_default()
    }

    /// Shared handle to the live driver.
    pub async fn current_driver(&self) -> Option<Arc<dyn BackendDriver>> {
        self.active.read().await.as_ref().map(|a| Arc::clone(&a.driver))
    }

    /// Probes the live backend without holding the connection lock.
    pub async fn health(&self) -> ConnectionHealth {
        let driver = self.current_driver().await;
        let (kind, name, live) = match &driver {
            Some(driver) => (
                Some(driver.kind()),
                Some(driver.name().to_string()),
                driver.test_liveness().await,
            ),
            None => (None, None, false),
        };
        ConnectionHealth {
            connected: driver.is_some(),
            kind,
            driver: name,
            live,
            checked_at: Utc::now(),
        }
    }
}
