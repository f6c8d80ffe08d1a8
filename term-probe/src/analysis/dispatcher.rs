//! Selection and execution of backend-specific analysis procedures.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing::{debug, error, info, instrument};

use super::document::{
    DocumentPerformanceProcedure, DocumentQualityProcedure, DocumentStructureProcedure,
    HotelBusinessProcedure,
};
use super::inventory::ContainerInventoryProcedure;
use super::{AnalysisCategory, AnalysisFilters, CategoryReport};
use crate::backends::{BackendDriver, BackendKind};
use crate::config::AnalysisConfig;
use crate::connection::ConnectionManager;
use crate::error::{ProbeError, Result};

/// One analysis category implemented for one backend kind.
#[async_trait]
pub trait CategoryProcedure: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Produces the category report. Any error is folded into a failed
    /// report by the dispatcher.
    async fn run(
        &self,
        driver: &dyn BackendDriver,
        config: &AnalysisConfig,
        filters: &AnalysisFilters,
    ) -> Result<CategoryReport>;
}

type ProcedureTable = HashMap<(AnalysisCategory, BackendKind), Arc<dyn CategoryProcedure>>;

/// Routes an analysis request to the procedure registered for the live
/// backend's kind.
pub struct AnalysisDispatcher {
    connections: Arc<ConnectionManager>,
    config: Arc<AnalysisConfig>,
    procedures: ProcedureTable,
}

impl std::fmt::Debug for AnalysisDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut registered: Vec<_> = self.procedures.keys().collect();
        registered.sort();
        f.debug_struct("AnalysisDispatcher")
            .field("registered", &registered)
            .finish_non_exhaustive()
    }
}

impl AnalysisDispatcher {
    /// Creates a dispatcher with the built-in procedures registered.
    ///
    /// Document stores get all four categories. Key-value, wide-column and
    /// search-index stores get a container inventory for structure; their
    /// other categories are capability gaps.
    pub fn new(connections: Arc<ConnectionManager>, config: Arc<AnalysisConfig>) -> Self {
        let inventory: Arc<dyn CategoryProcedure> = Arc::new(ContainerInventoryProcedure);
        let mut dispatcher = Self::empty(connections, config)
            .with_procedure(
                AnalysisCategory::Structure,
                BackendKind::Document,
                Arc::new(DocumentStructureProcedure),
            )
            .with_procedure(
                AnalysisCategory::Quality,
                BackendKind::Document,
                Arc::new(DocumentQualityProcedure),
            )
            .with_procedure(
                AnalysisCategory::Performance,
                BackendKind::Document,
                Arc::new(DocumentPerformanceProcedure),
            )
            .with_procedure(
                AnalysisCategory::Business,
                BackendKind::Document,
                Arc::new(HotelBusinessProcedure),
            );
        for kind in [
            BackendKind::KeyValue,
            BackendKind::WideColumn,
            BackendKind::SearchIndex,
        ] {
            dispatcher.register(AnalysisCategory::Structure, kind, Arc::clone(&inventory));
        }
        dispatcher
    }

    /// Creates a dispatcher with no procedures.
    pub fn empty(connections: Arc<ConnectionManager>, config: Arc<AnalysisConfig>) -> Self {
        Self {
            connections,
            config,
            procedures: HashMap::new(),
        }
    }

    /// Registers (or replaces) the procedure for a combination.
    pub fn register(
        &mut self,
        category: AnalysisCategory,
        kind: BackendKind,
        procedure: Arc<dyn CategoryProcedure>,
    ) {
        self.procedures.insert((category, kind), procedure);
    }

    pub fn with_procedure(
        mut self,
        category: AnalysisCategory,
        kind: BackendKind,
        procedure: Arc<dyn CategoryProcedure>,
    ) -> Self {
        self.register(category, kind, procedure);
        self
    }

    pub fn supports(&self, category: AnalysisCategory, kind: BackendKind) -> bool {
        self.procedures.contains_key(&(category, kind))
    }

    pub fn connections(&self) -> &Arc<ConnectionManager> {
        &self.connections
    }

    pub fn config(&self) -> &Arc<AnalysisConfig> {
        &self.config
    }

    /// Analyzes one category against the live backend.
    ///
    /// Fails with [`ProbeError::NotConnected`] before doing any work when no
    /// backend is connected. Every other outcome is a report.
    #[instrument(skip(self, filters), fields(category = %category))]
    pub async fn analyze(
        &self,
        category: AnalysisCategory,
        filters: &AnalysisFilters,
    ) -> Result<CategoryReport> {
        let driver = self
            .connections
            .current_driver()
            .await
            .ok_or(ProbeError::NotConnected)?;
        Ok(self.run_on(driver.as_ref(), category, filters).await)
    }

    /// Runs one category against a specific driver. Never fails.
    pub async fn run_on(
        &self,
        driver: &dyn BackendDriver,
        category: AnalysisCategory,
        filters: &AnalysisFilters,
    ) -> CategoryReport {
        let kind = driver.kind();
        let Some(procedure) = self.procedures.get(&(category, kind)) else {
            debug!(category = %category, kind = %kind, "no procedure registered");
            return CategoryReport::capability_gap(category, kind);
        };

        let start = Instant::now();
        let run = procedure.run(driver, &self.config, filters);
        let outcome = match self.config.category_timeout() {
            Some(timeout) => tokio::time::timeout(timeout, run).await.unwrap_or_else(|_| {
                Err(ProbeError::category_analysis(
                    category,
                    format!("timed out after {timeout:?}"),
                ))
            }),
            None => run.await,
        };

        match outcome {
            Ok(mut report) => {
                report.category = category;
                report.backend = Some(kind);
                info!(
                    procedure = procedure.name(),
                    containers = report.containers.len(),
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "category analysis complete"
                );
                report
            }
            Err(e) => {
                error!(procedure = procedure.name(), error = %e, "category analysis failed");
                CategoryReport::failed(category, Some(kind), e.to_string())
            }
        }
    }
}
