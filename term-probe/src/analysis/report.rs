//! Report and metric types produced by the analysis procedures.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::AnalysisCategory;
use crate::backends::BackendKind;

/// Well-known metric keys.
pub mod keys {
    // structure
    pub const DATABASE: &str = "database";
    pub const CONTAINER_COUNT: &str = "container_count";
    pub const TOTAL_RECORDS: &str = "total_records";
    pub const RECORD_COUNT: &str = "record_count";
    pub const STORAGE_SIZE: &str = "storage_size";
    pub const AVG_RECORD_SIZE: &str = "avg_record_size";
    pub const FIELD_TYPES: &str = "field_types";
    pub const SAMPLES: &str = "samples";
    pub const DOMAIN_FIELDS: &str = "domain_fields";
    pub const DRIVER_STATS: &str = "driver_stats";

    // quality
    pub const NULL_RECORDS: &str = "null_records";
    pub const MISSING_FIELDS: &str = "missing_fields";
    pub const SCORE: &str = "score";
    pub const OVERALL_SCORE: &str = "overall_score";
    pub const ISSUES: &str = "issues";

    // performance
    pub const DATA_SIZE: &str = "data_size";
    pub const INDEX_COUNT: &str = "index_count";
    pub const INDEX_SIZE: &str = "index_size";
    pub const SIZE: &str = "size";
    pub const INDEXES: &str = "indexes";

    // business
    pub const AVERAGE_RATING: &str = "average_rating";
    pub const HOTEL_COUNT: &str = "hotel_count";
    pub const PRICE_RANGE: &str = "price_range";
    pub const STATUS_DISTRIBUTION: &str = "status_distribution";
    pub const TOTAL_REVENUE: &str = "total_revenue";
    pub const AVERAGE_BOOKING_AMOUNT: &str = "average_booking_amount";
}

/// A single metric cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum MetricValue {
    /// A floating-point metric value (e.g., score, average).
    Double(f64),

    /// An integer metric value (e.g., count, size).
    Long(i64),

    /// A string metric value (e.g., database name).
    String(String),

    /// A boolean metric value.
    Boolean(bool),

    /// An ordered list of values.
    List(Vec<MetricValue>),

    /// Named sub-metrics (e.g., a status distribution).
    Map(BTreeMap<String, MetricValue>),

    /// Raw JSON carried through from the backend (e.g., a sampled record).
    Json(Value),
}

impl MetricValue {
    /// Attempts to get the numeric value as f64.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetricValue::Double(v) => Some(*v),
            MetricValue::Long(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Attempts to get the value as i64.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            MetricValue::Long(v) => Some(*v),
            MetricValue::Double(v) if v.fract() == 0.0 => Some(*v as i64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetricValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, MetricValue>> {
        match self {
            MetricValue::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[MetricValue]> {
        match self {
            MetricValue::List(l) => Some(l),
            _ => None,
        }
    }

    /// Returns a human-readable string representation of the metric value.
    pub fn to_string_pretty(&self) -> String {
        match self {
            MetricValue::Double(v) => {
                if v.fract() == 0.0 {
                    format!("{v:.0}")
                } else {
                    format!("{v:.4}")
                }
            }
            MetricValue::Long(v) => v.to_string(),
            MetricValue::String(s) => s.clone(),
            MetricValue::Boolean(b) => b.to_string(),
            MetricValue::List(l) => format!("List({} elements)", l.len()),
            MetricValue::Map(m) => format!("Map({} entries)", m.len()),
            MetricValue::Json(v) => v.to_string(),
        }
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_string_pretty())
    }
}

impl From<f64> for MetricValue {
    fn from(v: f64) -> Self {
        MetricValue::Double(v)
    }
}

impl From<i64> for MetricValue {
    fn from(v: i64) -> Self {
        MetricValue::Long(v)
    }
}

impl From<u64> for MetricValue {
    fn from(v: u64) -> Self {
        MetricValue::Long(i64::try_from(v).unwrap_or(i64::MAX))
    }
}

impl From<usize> for MetricValue {
    fn from(v: usize) -> Self {
        MetricValue::from(v as u64)
    }
}

impl From<bool> for MetricValue {
    fn from(v: bool) -> Self {
        MetricValue::Boolean(v)
    }
}

impl From<String> for MetricValue {
    fn from(v: String) -> Self {
        MetricValue::String(v)
    }
}

impl From<&str> for MetricValue {
    fn from(v: &str) -> Self {
        MetricValue::String(v.to_string())
    }
}

impl From<Value> for MetricValue {
    fn from(v: Value) -> Self {
        MetricValue::Json(v)
    }
}

impl<T: Into<MetricValue>> From<Vec<T>> for MetricValue {
    fn from(v: Vec<T>) -> Self {
        MetricValue::List(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<MetricValue>> From<BTreeMap<String, T>> for MetricValue {
    fn from(v: BTreeMap<String, T>) -> Self {
        MetricValue::Map(v.into_iter().map(|(k, v)| (k, v.into())).collect())
    }
}

/// Outcome of one category procedure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ReportStatus {
    Complete,
    /// No procedure exists for this category on this backend kind.
    CapabilityGap { message: String },
    /// The procedure failed or timed out.
    Failed { message: String },
}

/// Result of analyzing one category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryReport {
    pub category: AnalysisCategory,
    pub backend: Option<BackendKind>,
    pub status: ReportStatus,
    /// Report-level metrics.
    pub metrics: BTreeMap<String, MetricValue>,
    /// Per-container metrics, keyed by container name.
    pub containers: BTreeMap<String, BTreeMap<String, MetricValue>>,
    pub issues: Vec<String>,
    pub recommendations: Vec<String>,
    /// Aggregate score, set by the quality procedure.
    pub score: Option<f64>,
}

impl CategoryReport {
    /// An empty, complete report.
    pub fn new(category: AnalysisCategory, backend: Option<BackendKind>) -> Self {
        Self {
            category,
            backend,
            status: ReportStatus::Complete,
            metrics: BTreeMap::new(),
            containers: BTreeMap::new(),
            issues: Vec::new(),
            recommendations: Vec::new(),
            score: None,
        }
    }

    pub fn capability_gap(category: AnalysisCategory, backend: BackendKind) -> Self {
        Self {
            status: ReportStatus::CapabilityGap {
                message: format!("{category} analysis not yet implemented for {backend} backends"),
            },
            ..Self::new(category, Some(backend))
        }
    }

    pub fn failed(
        category: AnalysisCategory,
        backend: Option<BackendKind>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            status: ReportStatus::Failed {
                message: message.into(),
            },
            ..Self::new(category, backend)
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self.status, ReportStatus::Complete)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.status, ReportStatus::Failed { .. })
    }

    pub fn is_capability_gap(&self) -> bool {
        matches!(self.status, ReportStatus::CapabilityGap { .. })
    }

    /// Failure or capability-gap message, if any.
    pub fn status_message(&self) -> Option<&str> {
        match &self.status {
            ReportStatus::Complete => None,
            ReportStatus::CapabilityGap { message } | ReportStatus::Failed { message } => {
                Some(message)
            }
        }
    }

    pub fn set_metric(&mut self, key: impl Into<String>, value: impl Into<MetricValue>) {
        self.metrics.insert(key.into(), value.into());
    }

    pub fn metric(&self, key: &str) -> Option<&MetricValue> {
        self.metrics.get(key)
    }

    pub fn metric_f64(&self, key: &str) -> Option<f64> {
        self.metric(key).and_then(MetricValue::as_f64)
    }

    pub fn metric_i64(&self, key: &str) -> Option<i64> {
        self.metric(key).and_then(MetricValue::as_i64)
    }

    /// Mutable metric map for `container`, created on first use.
    pub fn container_mut(&mut self, container: &str) -> &mut BTreeMap<String, MetricValue> {
        self.containers.entry(container.to_string()).or_default()
    }

    pub fn container_metric(&self, container: &str, key: &str) -> Option<&MetricValue> {
        self.containers.get(container).and_then(|m| m.get(key))
    }
}

/// All four category reports from one comprehensive run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeReport {
    pub structure: CategoryReport,
    pub quality: CategoryReport,
    pub performance: CategoryReport,
    pub business: CategoryReport,
    pub generated_at: DateTime<Utc>,
}

impl CompositeReport {
    pub fn get(&self, category: AnalysisCategory) -> &CategoryReport {
        match category {
            AnalysisCategory::Structure => &self.structure,
            AnalysisCategory::Quality => &self.quality,
            AnalysisCategory::Performance => &self.performance,
            AnalysisCategory::Business => &self.business,
        }
    }

    /// Reports in fixed category order.
    pub fn reports(&self) -> [&CategoryReport; 4] {
        [&self.structure, &self.quality, &self.performance, &self.business]
    }

    /// The report for `category`, only if it completed.
    pub fn complete(&self, category: AnalysisCategory) -> Option<&CategoryReport> {
        Some(self.get(category)).filter(|r| r.is_complete())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_value_conversions() {
        assert_eq!(MetricValue::from(3_u64), MetricValue::Long(3));
        assert_eq!(MetricValue::from(u64::MAX), MetricValue::Long(i64::MAX));
        assert_eq!(MetricValue::Long(4).as_f64(), Some(4.0));
        assert_eq!(MetricValue::Double(2.0).as_i64(), Some(2));
        assert_eq!(MetricValue::Double(2.5).as_i64(), None);
        assert_eq!(MetricValue::from("x").as_str(), Some("x"));
        assert!(MetricValue::from(vec!["a", "b"]).as_list().is_some());
    }

    #[test]
    fn test_metric_value_display() {
        assert_eq!(MetricValue::Double(42.0).to_string(), "42");
        assert_eq!(MetricValue::Double(0.5).to_string(), "0.5000");
        assert_eq!(
            MetricValue::Map(BTreeMap::new()).to_string(),
            "Map(0 entries)"
        );
    }

    #[test]
    fn test_metric_value_serde_shape() {
        let json = serde_json::to_value(MetricValue::Long(7)).unwrap();
        assert_eq!(json, serde_json::json!({"type": "Long", "value": 7}));
    }

    #[test]
    fn test_capability_gap_report() {
        let report =
            CategoryReport::capability_gap(AnalysisCategory::Quality, BackendKind::KeyValue);
        assert!(report.is_capability_gap());
        assert_eq!(
            report.status_message(),
            Some("quality analysis not yet implemented for key-value backends")
        );
        assert!(report.metrics.is_empty());
    }

    #[test]
    fn test_container_metrics() {
        let mut report = CategoryReport::new(AnalysisCategory::Structure, None);
        report
            .container_mut("hotels")
            .insert(keys::RECORD_COUNT.to_string(), 5_u64.into());
        assert_eq!(
            report.container_metric("hotels", keys::RECORD_COUNT),
            Some(&MetricValue::Long(5))
        );
        assert!(report.container_metric("bookings", keys::RECORD_COUNT).is_none());
    }
}
