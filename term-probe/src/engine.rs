//! The public facade wiring connection management, analysis and insights
//! together.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::analysis::{
    AnalysisCategory, AnalysisDispatcher, AnalysisFilters, CategoryReport, ComprehensiveAnalyzer,
    CompositeReport,
};
use crate::backends::{ConnectRequest, ConnectionDescriptor, DefaultDriverFactory, DriverFactory};
use crate::config::AnalysisConfig;
use crate::connection::{ConnectionHealth, ConnectionManager};
use crate::error::{ProbeError, Result};
use crate::insights::{HotelInsights, InsightBundle, InsightGenerator};
use crate::security::Credentials;

/// What an `analyze` call should run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisKind {
    Category(AnalysisCategory),
    Comprehensive,
}

impl fmt::Display for AnalysisKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnalysisKind::Category(category) => write!(f, "{category}"),
            AnalysisKind::Comprehensive => write!(f, "comprehensive"),
        }
    }
}

impl FromStr for AnalysisKind {
    type Err = ProbeError;

    /// Accepts the category names and aliases plus `comprehensive`.
    fn from_str(s: &str) -> Result<Self> {
        if s.trim().eq_ignore_ascii_case("comprehensive") {
            return Ok(AnalysisKind::Comprehensive);
        }
        s.parse().map(AnalysisKind::Category)
    }
}

impl From<AnalysisCategory> for AnalysisKind {
    fn from(category: AnalysisCategory) -> Self {
        AnalysisKind::Category(category)
    }
}

/// Result of an `analyze` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "report", rename_all = "snake_case")]
pub enum AnalysisOutcome {
    Category(CategoryReport),
    Composite(CompositeReport),
}

impl AnalysisOutcome {
    pub fn as_category(&self) -> Option<&CategoryReport> {
        match self {
            AnalysisOutcome::Category(report) => Some(report),
            AnalysisOutcome::Composite(_) => None,
        }
    }

    pub fn as_composite(&self) -> Option<&CompositeReport> {
        match self {
            AnalysisOutcome::Composite(report) => Some(report),
            AnalysisOutcome::Category(_) => None,
        }
    }
}

/// Entry point for callers: one live connection, analyses against it and
/// insights derived from them.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use serde_json::json;
/// use term_probe::backends::{MemoryDocumentStore, MemoryDriver, MemoryDriverFactory};
/// use term_probe::config::AnalysisConfig;
/// use term_probe::engine::{AnalysisKind, ProbeEngine};
///
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let store = MemoryDocumentStore::new("hotel_db")
///     .with_collection("hotels", vec![json!({"name": "Harbor", "rating": 4.6, "price": 180})]);
/// let factory = MemoryDriverFactory::new().with_driver(Arc::new(MemoryDriver::document(store)));
/// let engine = ProbeEngine::new(Arc::new(factory), AnalysisConfig::default());
///
/// engine.connect("mongodb", "mongodb://localhost:27017", None, None).await.unwrap();
/// let outcome = engine.analyze("schema".parse().unwrap(), None).await.unwrap();
/// assert!(outcome.as_category().unwrap().is_complete());
///
/// let insights = engine.generate_insights(None).await.unwrap();
/// assert_eq!(insights.summary.key_metrics.hotel_count, Some(1));
/// # });
/// ```
#[derive(Debug)]
pub struct ProbeEngine {
    connections: Arc<ConnectionManager>,
    dispatcher: Arc<AnalysisDispatcher>,
    analyzer: ComprehensiveAnalyzer,
    insights: InsightGenerator,
}

impl Default for ProbeEngine {
    fn default() -> Self {
        Self::new(Arc::new(DefaultDriverFactory), AnalysisConfig::default())
    }
}

impl ProbeEngine {
    pub fn new(factory: Arc<dyn DriverFactory>, config: AnalysisConfig) -> Self {
        let config = Arc::new(config);
        let connections = Arc::new(
            ConnectionManager::new(factory).with_connect_timeout(config.connect_timeout()),
        );
        let dispatcher = Arc::new(AnalysisDispatcher::new(
            Arc::clone(&connections),
            Arc::clone(&config),
        ));
        Self::from_parts(dispatcher, InsightGenerator::new(config))
    }

    /// Builds an engine around a pre-configured dispatcher and generator.
    pub fn from_parts(dispatcher: Arc<AnalysisDispatcher>, insights: InsightGenerator) -> Self {
        Self {
            connections: Arc::clone(dispatcher.connections()),
            analyzer: ComprehensiveAnalyzer::new(Arc::clone(&dispatcher)),
            dispatcher,
            insights,
        }
    }

    /// Uses the compiled-in drivers and configuration from the environment.
    pub fn from_env() -> Result<Self> {
        Ok(Self::new(
            Arc::new(DefaultDriverFactory),
            AnalysisConfig::from_env()?,
        ))
    }

    pub fn config(&self) -> &AnalysisConfig {
        self.dispatcher.config()
    }

    /// Connects to a backend, replacing any current connection.
    pub async fn connect(
        &self,
        kind: &str,
        endpoint: impl Into<String>,
        credentials: Option<Credentials>,
        options: Option<BTreeMap<String, String>>,
    ) -> Result<ConnectionDescriptor> {
        let request = ConnectRequest {
            endpoint: endpoint.into(),
            credentials,
            options: options.unwrap_or_default(),
        };
        self.connections.connect(kind, &request).await
    }

    pub async fn connect_with(
        &self,
        kind: &str,
        request: &ConnectRequest,
    ) -> Result<ConnectionDescriptor> {
        self.connections.connect(kind, request).await
    }

    pub async fn disconnect(&self) -> Result<()> {
        self.connections.disconnect().await
    }

    pub async fn is_connected(&self) -> bool {
        self.connections.is_connected().await
    }

    pub async fn connection_info(&self) -> ConnectionDescriptor {
        self.connections.connection_info().await
    }

    pub async fn health(&self) -> ConnectionHealth {
        self.connections.health().await
    }

    /// Containers of the live backend, read fresh from the driver.
    pub async fn list_containers(&self) -> Result<Vec<String>> {
        let driver = self
            .connections
            .current_driver()
            .await
            .ok_or(ProbeError::NotConnected)?;
        driver.list_containers().await
    }

    /// Runs one category or all of them.
    #[instrument(skip(self, filters), fields(kind = %kind))]
    pub async fn analyze(
        &self,
        kind: AnalysisKind,
        filters: Option<AnalysisFilters>,
    ) -> Result<AnalysisOutcome> {
        let filters = filters.unwrap_or_default();
        match kind {
            AnalysisKind::Category(category) => self
                .dispatcher
                .analyze(category, &filters)
                .await
                .map(AnalysisOutcome::Category),
            AnalysisKind::Comprehensive => self
                .analyzer
                .run(&filters)
                .await
                .map(AnalysisOutcome::Composite),
        }
    }

    /// Derives insights from `composite`, or from a fresh comprehensive
    /// analysis when none is given.
    #[instrument(skip_all)]
    pub async fn generate_insights(
        &self,
        composite: Option<&CompositeReport>,
    ) -> Result<InsightBundle> {
        match composite {
            Some(composite) => Ok(self.insights.generate(composite)),
            None => {
                let composite = self.analyzer.run(&AnalysisFilters::default()).await?;
                info!("generating insights from a fresh comprehensive analysis");
                Ok(self.insights.generate(&composite))
            }
        }
    }

    /// Runs business analysis and derives the hotel-management view.
    pub async fn hotel_insights(&self) -> Result<HotelInsights> {
        let report = self
            .dispatcher
            .analyze(AnalysisCategory::Business, &AnalysisFilters::default())
            .await?;
        Ok(self.insights.hotel_insights(&report))
    }
}
