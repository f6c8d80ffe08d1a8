//! # Term Probe - Analysis and Insights for Non-Relational Stores
//!
//! Term Probe inspects a live document, key-value, wide-column or search-index
//! store and produces structure, quality, performance and business reports
//! through one uniform pipeline, then derives insights and ranked
//! recommendations from those reports.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use term_probe::prelude::*;
//! use term_probe::engine::AnalysisKind;
//!
//! # async fn example() -> std::result::Result<(), Box<dyn std::error::Error>> {
//! // Requires the `mongodb` feature
//! let engine = ProbeEngine::from_env()?;
//! let mut options = std::collections::BTreeMap::new();
//! options.insert("database".to_string(), "hotel_db".to_string());
//!
//! engine
//!     .connect(
//!         "mongodb",
//!         "mongodb://localhost:27017",
//!         Some(Credentials::new("analyst", "secret")),
//!         Some(options),
//!     )
//!     .await?;
//!
//! let outcome = engine.analyze(AnalysisKind::Comprehensive, None).await?;
//! if let Some(composite) = outcome.as_composite() {
//!     let insights = engine.generate_insights(Some(composite)).await?;
//!     for recommendation in &insights.recommendations {
//!         println!("{}. {}", recommendation.rank, recommendation.message);
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Backends
//!
//! Each backend family is a [`backends::BackendKind`] with a driver behind a
//! cargo feature:
//!
//! - `mongodb`: document stores
//! - `redis`: key-value stores
//! - `cassandra`: wide-column stores
//! - `elasticsearch`: search indexes
//!
//! An in-process [`backends::MemoryDriver`] is always available and serves any
//! kind, which makes the whole pipeline testable without a server.
//!
//! ## Architecture
//!
//! - **`backends`**: driver trait, connection descriptors and the drivers
//! - **`connection`**: the single live connection
//! - **`analysis`**: category procedures, dispatch and comprehensive runs
//! - **`insights`**: summary, anomalies and recommendations over a composite report
//! - **`engine`**: the facade tying the above together
//! - **`config`**, **`logging`**, **`security`**: ambient configuration,
//!   tracing setup and credential handling

pub mod analysis;
pub mod backends;
pub mod config;
pub mod connection;
pub mod engine;
pub mod error;
pub mod insights;
pub mod logging;
pub mod prelude;
pub mod security;
