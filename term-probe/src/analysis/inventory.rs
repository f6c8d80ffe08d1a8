//! Backend-generic structure procedure.

use async_trait::async_trait;

use super::report::keys;
use super::{AnalysisCategory, AnalysisFilters, CategoryProcedure, CategoryReport, MetricValue};
use crate::backends::BackendDriver;
use crate::config::AnalysisConfig;
use crate::error::Result;
use crate::log_data_op;

/// Container inventory plus raw driver statistics.
///
/// Works for any driver since it only uses `list_containers` and `stats`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ContainerInventoryProcedure;

#[async_trait]
impl CategoryProcedure for ContainerInventoryProcedure {
    fn name(&self) -> &str {
        "container_inventory"
    }

    async fn run(
        &self,
        driver: &dyn BackendDriver,
        config: &AnalysisConfig,
        filters: &AnalysisFilters,
    ) -> Result<CategoryReport> {
        let mut report = CategoryReport::new(AnalysisCategory::Structure, Some(driver.kind()));

        let containers = filters.select(driver.list_containers().await?);
        log_data_op!(
            config.log(),
            driver = driver.name(),
            containers = containers.len(),
            "listed containers"
        );
        report.set_metric(keys::CONTAINER_COUNT, containers.len());
        for container in &containers {
            report.container_mut(container);
        }

        let stats = driver.stats().await?;
        report.set_metric(
            keys::DRIVER_STATS,
            MetricValue::Map(
                stats
                    .into_iter()
                    .map(|(k, v)| (k, MetricValue::Json(v)))
                    .collect(),
            ),
        );
        Ok(report)
    }
}
