//! Recommendation rules evaluated over the facts extracted from a composite
//! report.
//!
//! Each rule looks at an [`InsightContext`] and returns zero or more
//! recommendation messages. [`default_rules`] returns the built-in rules in
//! ranking order; their output is concatenated without deduplication.

use std::collections::BTreeMap;

use super::types::{PriceRange, RecommendationSource};
use crate::analysis::{keys, AnalysisCategory, CategoryReport, CompositeReport, MetricValue};
use crate::config::BusinessVocabulary;

/// Quality scores below this trigger quality advice.
pub const QUALITY_THRESHOLD: f64 = 80.0;
/// Average ratings below this trigger rating advice.
pub const RATING_THRESHOLD: f64 = 4.0;
/// Average ratings below this are reported as an anomaly.
pub const EXTREME_RATING_THRESHOLD: f64 = 2.0;
/// Null ratios above this are reported as an anomaly.
pub const NULL_RATIO_THRESHOLD: f64 = 0.5;
/// Cancellation rates (percent) above this are a growth opportunity.
pub const CANCELLATION_RATE_THRESHOLD: f64 = 10.0;
/// Storage efficiencies (percent) below this trigger cleanup advice.
pub const STORAGE_EFFICIENCY_THRESHOLD: f64 = 70.0;

/// Advice appended to every recommendation list.
pub const GENERAL_PRACTICES: [&str; 4] = [
    "Regularly monitor database performance and optimize queries",
    "Implement automated data quality checks",
    "Set up alerts for critical business metrics",
    "Consider implementing data archiving for old records",
];

/// Per-container quality counts.
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerQuality {
    pub name: String,
    pub total_records: u64,
    pub null_records: u64,
}

impl ContainerQuality {
    /// `null / max(total, 1)`.
    pub fn null_ratio(&self) -> f64 {
        self.null_records as f64 / self.total_records.max(1) as f64
    }
}

/// Facts pulled out of the complete reports of a composite.
///
/// A value is `None` when its report did not complete or did not record the
/// metric. Rules never treat a missing value as a trigger.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InsightContext {
    pub database: Option<String>,
    pub container_count: Option<u64>,
    pub total_records: Option<u64>,

    pub quality_score: Option<f64>,
    pub quality_issues: Vec<String>,
    pub container_quality: Vec<ContainerQuality>,

    pub data_size: Option<u64>,
    pub storage_size: Option<u64>,
    pub index_count: Option<u64>,

    pub hotel_count: Option<u64>,
    pub average_rating: Option<f64>,
    pub price_range: Option<PriceRange>,
    pub status_distribution: Option<BTreeMap<String, u64>>,
    pub total_revenue: Option<f64>,
    pub average_booking_amount: Option<f64>,
    pub confirmed_bookings: u64,
    pub cancelled_bookings: u64,
}

impl InsightContext {
    pub fn from_composite(composite: &CompositeReport, vocab: &BusinessVocabulary) -> Self {
        let mut context = Self::default();

        if let Some(structure) = composite.complete(AnalysisCategory::Structure) {
            context.database = structure
                .metric(keys::DATABASE)
                .and_then(MetricValue::as_str)
                .map(str::to_string);
            context.container_count = count(structure, keys::CONTAINER_COUNT);
            context.total_records = count(structure, keys::TOTAL_RECORDS);
        }

        if let Some(quality) = composite.complete(AnalysisCategory::Quality) {
            context.quality_score = quality
                .score
                .or_else(|| quality.metric_f64(keys::OVERALL_SCORE));
            context.quality_issues = quality.issues.clone();
            context.container_quality = quality
                .containers
                .iter()
                .map(|(name, metrics)| ContainerQuality {
                    name: name.clone(),
                    total_records: map_count(metrics, keys::TOTAL_RECORDS),
                    null_records: map_count(metrics, keys::NULL_RECORDS),
                })
                .collect();
        }

        if let Some(performance) = composite.complete(AnalysisCategory::Performance) {
            context.data_size = count(performance, keys::DATA_SIZE);
            context.storage_size = count(performance, keys::STORAGE_SIZE);
            context.index_count = count(performance, keys::INDEX_COUNT);
        }

        if let Some(business) = composite.complete(AnalysisCategory::Business) {
            context.apply_business(business, vocab);
        }
        context
    }

    /// Context holding only the facts of a business report.
    pub fn from_business(report: &CategoryReport, vocab: &BusinessVocabulary) -> Self {
        let mut context = Self::default();
        if report.is_complete() {
            context.apply_business(report, vocab);
        }
        context
    }

    fn apply_business(&mut self, report: &CategoryReport, vocab: &BusinessVocabulary) {
        self.hotel_count = count(report, keys::HOTEL_COUNT);
        self.average_rating = report.metric_f64(keys::AVERAGE_RATING);
        self.price_range = report
            .metric(keys::PRICE_RANGE)
            .and_then(MetricValue::as_map)
            .and_then(|range| {
                Some(PriceRange {
                    min: range.get("min")?.as_f64()?,
                    max: range.get("max")?.as_f64()?,
                    average: range.get("average")?.as_f64()?,
                })
            });
        self.status_distribution = report
            .metric(keys::STATUS_DISTRIBUTION)
            .and_then(MetricValue::as_map)
            .map(|distribution| {
                distribution
                    .iter()
                    .map(|(status, n)| (status.clone(), n.as_i64().unwrap_or(0).max(0) as u64))
                    .collect()
            });
        self.total_revenue = report.metric_f64(keys::TOTAL_REVENUE);
        self.average_booking_amount = report.metric_f64(keys::AVERAGE_BOOKING_AMOUNT);

        if let Some(distribution) = &self.status_distribution {
            self.confirmed_bookings = distribution
                .get(&vocab.confirmed_status)
                .copied()
                .unwrap_or(0);
            self.cancelled_bookings = distribution
                .get(&vocab.cancelled_status)
                .copied()
                .unwrap_or(0);
        }
    }

    /// Sum of all status counts.
    pub fn total_bookings(&self) -> Option<u64> {
        self.status_distribution
            .as_ref()
            .map(|d| d.values().sum())
    }
}

fn count(report: &CategoryReport, key: &str) -> Option<u64> {
    report
        .metric_i64(key)
        .map(|n| u64::try_from(n).unwrap_or(0))
}

fn map_count(metrics: &BTreeMap<String, MetricValue>, key: &str) -> u64 {
    metrics
        .get(key)
        .and_then(MetricValue::as_i64)
        .map(|n| u64::try_from(n).unwrap_or(0))
        .unwrap_or(0)
}

/// A rule producing recommendations from the extracted facts.
pub trait RecommendationRule: Send + Sync {
    /// Category credited for this rule's advice.
    fn source(&self) -> RecommendationSource;

    /// Name used in logs.
    fn name(&self) -> &str;

    fn apply(&self, context: &InsightContext) -> Vec<String>;
}

/// Advises validation when the quality score is low.
#[derive(Debug, Default, Clone, Copy)]
pub struct QualityScoreRule;

impl RecommendationRule for QualityScoreRule {
    fn source(&self) -> RecommendationSource {
        RecommendationSource::Quality
    }

    fn name(&self) -> &str {
        "quality_score"
    }

    fn apply(&self, context: &InsightContext) -> Vec<String> {
        match context.quality_score {
            Some(score) if score < QUALITY_THRESHOLD => {
                vec!["Implement data validation and cleaning procedures".to_string()]
            }
            _ => vec![],
        }
    }
}

/// Advises indexing when the database reports none.
#[derive(Debug, Default, Clone, Copy)]
pub struct MissingIndexRule;

impl RecommendationRule for MissingIndexRule {
    fn source(&self) -> RecommendationSource {
        RecommendationSource::Performance
    }

    fn name(&self) -> &str {
        "missing_index"
    }

    fn apply(&self, context: &InsightContext) -> Vec<String> {
        if context.index_count == Some(0) {
            vec!["Add database indexes for frequently queried fields".to_string()]
        } else {
            vec![]
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LowRatingRule;

impl RecommendationRule for LowRatingRule {
    fn source(&self) -> RecommendationSource {
        RecommendationSource::Business
    }

    fn name(&self) -> &str {
        "low_rating"
    }

    fn apply(&self, context: &InsightContext) -> Vec<String> {
        match context.average_rating {
            Some(rating) if rating < RATING_THRESHOLD => {
                vec!["Focus on improving hotel service quality and ratings".to_string()]
            }
            _ => vec![],
        }
    }
}

/// Fires when cancellations exceed a tenth of confirmations.
#[derive(Debug, Default, Clone, Copy)]
pub struct CancellationRule;

impl RecommendationRule for CancellationRule {
    fn source(&self) -> RecommendationSource {
        RecommendationSource::Business
    }

    fn name(&self) -> &str {
        "cancellation"
    }

    fn apply(&self, context: &InsightContext) -> Vec<String> {
        if context.cancelled_bookings as f64 > context.confirmed_bookings as f64 * 0.1 {
            vec!["Review and improve booking policies to reduce cancellations".to_string()]
        } else {
            vec![]
        }
    }
}

/// Unconditional operational advice.
#[derive(Debug, Default, Clone, Copy)]
pub struct GeneralPracticesRule;

impl RecommendationRule for GeneralPracticesRule {
    fn source(&self) -> RecommendationSource {
        RecommendationSource::General
    }

    fn name(&self) -> &str {
        "general_practices"
    }

    fn apply(&self, _context: &InsightContext) -> Vec<String> {
        GENERAL_PRACTICES.iter().map(|s| s.to_string()).collect()
    }
}

/// Built-in rules in ranking order.
pub fn default_rules() -> Vec<Box<dyn RecommendationRule>> {
    vec![
        Box::new(QualityScoreRule),
        Box::new(MissingIndexRule),
        Box::new(LowRatingRule),
        Box::new(CancellationRule),
        Box::new(GeneralPracticesRule),
    ]
}
