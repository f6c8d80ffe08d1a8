//! Prelude for commonly used types and traits in term-probe.

pub use crate::analysis::{AnalysisCategory, AnalysisFilters, CategoryReport, CompositeReport};
pub use crate::backends::{BackendDriver, BackendKind, ConnectRequest, ConnectionDescriptor};
pub use crate::config::AnalysisConfig;
pub use crate::engine::{AnalysisKind, AnalysisOutcome, ProbeEngine};
pub use crate::error::{ProbeError, Result};
pub use crate::insights::{InsightBundle, InsightGenerator};
pub use crate::logging::LogConfig;
pub use crate::security::Credentials;
