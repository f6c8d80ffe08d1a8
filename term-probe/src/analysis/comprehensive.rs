//! Concurrent execution of all four categories.

use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use tracing::{error, info, instrument};

use super::{AnalysisCategory, AnalysisDispatcher, AnalysisFilters, CategoryReport, CompositeReport};
use crate::error::{ProbeError, Result};

/// Runs every category against one snapshot of the live driver and merges
/// the results.
#[derive(Debug, Clone)]
pub struct ComprehensiveAnalyzer {
    dispatcher: Arc<AnalysisDispatcher>,
}

impl ComprehensiveAnalyzer {
    pub fn new(dispatcher: Arc<AnalysisDispatcher>) -> Self {
        Self { dispatcher }
    }

    /// Produces a composite report.
    ///
    /// Fails only with [`ProbeError::NotConnected`]. Each category runs as its
    /// own task; a failed or panicked task yields an error-flagged report in
    /// its slot.
    #[instrument(skip(self, filters))]
    pub async fn run(&self, filters: &AnalysisFilters) -> Result<CompositeReport> {
        let driver = self
            .dispatcher
            .connections()
            .current_driver()
            .await
            .ok_or(ProbeError::NotConnected)?;
        let kind = driver.kind();

        let handles: Vec<_> = AnalysisCategory::ALL
            .iter()
            .map(|&category| {
                let dispatcher = Arc::clone(&self.dispatcher);
                let driver = Arc::clone(&driver);
                let filters = filters.clone();
                tokio::spawn(async move {
                    dispatcher
                        .run_on(driver.as_ref(), category, &filters)
                        .await
                })
            })
            .collect();

        let mut reports = join_all(handles)
            .await
            .into_iter()
            .zip(AnalysisCategory::ALL)
            .map(|(joined, category)| {
                joined.unwrap_or_else(|e| {
                    error!(category = %category, error = %e, "category task did not complete");
                    CategoryReport::failed(category, Some(kind), format!("task failed: {e}"))
                })
            });

        // ALL is in composite order, so the four reports come out in slot order.
        let mut next = |category| {
            reports
                .next()
                .unwrap_or_else(|| CategoryReport::failed(category, Some(kind), "missing report"))
        };
        let composite = CompositeReport {
            structure: next(AnalysisCategory::Structure),
            quality: next(AnalysisCategory::Quality),
            performance: next(AnalysisCategory::Performance),
            business: next(AnalysisCategory::Business),
            generated_at: Utc::now(),
        };

        let failed = composite.reports().iter().filter(|r| r.is_failed()).count();
        info!(kind = %kind, failed, "comprehensive analysis complete");
        Ok(composite)
    }
}
