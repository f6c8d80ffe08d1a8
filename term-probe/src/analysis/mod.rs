//! Per-category analysis of the connected backend.
//!
//! The [`AnalysisDispatcher`] maps `(category, backend kind)` to a
//! [`CategoryProcedure`]. Combinations without a procedure produce a
//! capability-gap report rather than an error, and procedure failures are
//! folded into error-flagged reports. The [`ComprehensiveAnalyzer`] runs all
//! four categories concurrently and assembles a [`CompositeReport`].
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use serde_json::json;
//! use term_probe::analysis::{AnalysisCategory, AnalysisDispatcher, AnalysisFilters};
//! use term_probe::backends::{
//!     ConnectRequest, MemoryDocumentStore, MemoryDriver, MemoryDriverFactory,
//! };
//! use term_probe::config::AnalysisConfig;
//! use term_probe::connection::ConnectionManager;
//!
//! # #[tokio::main]
//! # async fn main() -> term_probe::error::Result<()> {
//! let store = MemoryDocumentStore::new("hotels_db")
//!     .with_collection("hotels", vec![json!({"name": "Inn", "rating": 4.5})]);
//! let factory = MemoryDriverFactory::new().with_driver(Arc::new(MemoryDriver::document(store)));
//! let connections = Arc::new(ConnectionManager::new(Arc::new(factory)));
//! connections.connect("mongodb", &ConnectRequest::new("memory://local")).await?;
//!
//! let dispatcher = AnalysisDispatcher::new(connections, Arc::new(AnalysisConfig::default()));
//! let report = dispatcher
//!     .analyze(AnalysisCategory::Structure, &AnalysisFilters::default())
//!     .await?;
//! assert!(report.is_complete());
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProbeError;

pub mod comprehensive;
pub mod dispatcher;
pub mod document;
pub mod inventory;
pub mod report;

pub use comprehensive::ComprehensiveAnalyzer;
pub use dispatcher::{AnalysisDispatcher, CategoryProcedure};
pub use report::{keys, CategoryReport, CompositeReport, MetricValue, ReportStatus};

/// The four analysis categories, in composite order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisCategory {
    Structure,
    Quality,
    Performance,
    Business,
}

impl AnalysisCategory {
    pub const ALL: [AnalysisCategory; 4] = [
        AnalysisCategory::Structure,
        AnalysisCategory::Quality,
        AnalysisCategory::Performance,
        AnalysisCategory::Business,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisCategory::Structure => "structure",
            AnalysisCategory::Quality => "quality",
            AnalysisCategory::Performance => "performance",
            AnalysisCategory::Business => "business",
        }
    }
}

impl fmt::Display for AnalysisCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AnalysisCategory {
    type Err = ProbeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "structure" | "schema" => Ok(AnalysisCategory::Structure),
            "quality" | "data_quality" => Ok(AnalysisCategory::Quality),
            "performance" => Ok(AnalysisCategory::Performance),
            "business" | "business_insights" => Ok(AnalysisCategory::Business),
            other => Err(ProbeError::Configuration(format!(
                "unsupported analysis type: {other}"
            ))),
        }
    }
}

/// Restricts an analysis run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisFilters {
    /// Only analyze these containers. `None` means all.
    pub containers: Option<Vec<String>>,
    /// Free-form filter parameters passed through to procedures.
    #[serde(default)]
    pub extra: BTreeMap<String, Value>,
}

impl AnalysisFilters {
    pub fn containers<I, S>(containers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            containers: Some(containers.into_iter().map(Into::into).collect()),
            extra: BTreeMap::new(),
        }
    }

    /// Whether `container` passes the container filter.
    pub fn includes(&self, container: &str) -> bool {
        self.containers
            .as_ref()
            .map_or(true, |allowed| allowed.iter().any(|c| c == container))
    }

    /// Applies the container filter, preserving order.
    pub fn select(&self, containers: Vec<String>) -> Vec<String> {
        containers.into_iter().filter(|c| self.includes(c)).collect()
    }
}
