//! Insight generation over composite analysis reports.
//!
//! The [`InsightGenerator`] turns a [`CompositeReport`] into an
//! [`InsightBundle`]: a summary, business/performance/quality views, a list of
//! anomalies and a ranked list of recommendations. Generation is a pure
//! function of the composite report; it never touches a backend, and the same
//! input always yields the same bundle.
//!
//! Only reports that completed contribute. A failed or capability-gap report
//! leaves its derived fields empty and triggers nothing.
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use chrono::Utc;
//! use term_probe::analysis::{AnalysisCategory, CategoryReport, CompositeReport};
//! use term_probe::config::AnalysisConfig;
//! use term_probe::insights::InsightGenerator;
//!
//! let mut quality = CategoryReport::new(AnalysisCategory::Quality, None);
//! quality.score = Some(65.0);
//! let composite = CompositeReport {
//!     structure: CategoryReport::new(AnalysisCategory::Structure, None),
//!     quality,
//!     performance: CategoryReport::new(AnalysisCategory::Performance, None),
//!     business: CategoryReport::new(AnalysisCategory::Business, None),
//!     generated_at: Utc::now(),
//! };
//!
//! let bundle = InsightGenerator::new(Arc::new(AnalysisConfig::default())).generate(&composite);
//! assert_eq!(
//!     bundle.recommendations[0].message,
//!     "Implement data validation and cleaning procedures"
//! );
//! ```

mod rules;
mod types;

use std::sync::Arc;

use tracing::{debug, info, instrument};

pub use rules::{
    default_rules, CancellationRule, ContainerQuality, GeneralPracticesRule, InsightContext,
    LowRatingRule, MissingIndexRule, QualityScoreRule, RecommendationRule, GENERAL_PRACTICES,
};
pub use types::{
    Anomaly, AnomalyKind, BookingRates, BusinessInsights, HotelInsights, InsightBundle,
    KeyMetrics, OperationalInsights, Overview, PerformanceInsights, PriceRange, QualityInsights,
    Recommendation, RecommendationSource, RevenueInsights, RevenueOptimization, SummaryInsights,
};

use crate::analysis::{CategoryReport, CompositeReport};
use crate::config::AnalysisConfig;
use rules::{
    CANCELLATION_RATE_THRESHOLD, EXTREME_RATING_THRESHOLD, NULL_RATIO_THRESHOLD,
    QUALITY_THRESHOLD, RATING_THRESHOLD, STORAGE_EFFICIENCY_THRESHOLD,
};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;
const HOTEL_CONFIRMATION_THRESHOLD: f64 = 80.0;

/// Derives insights from composite reports.
pub struct InsightGenerator {
    config: Arc<AnalysisConfig>,
    rules: Vec<Box<dyn RecommendationRule>>,
}

impl std::fmt::Debug for InsightGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let rules: Vec<_> = self.rules.iter().map(|r| r.name()).collect();
        f.debug_struct("InsightGenerator")
            .field("rules", &rules)
            .finish_non_exhaustive()
    }
}

impl InsightGenerator {
    /// Creates a generator with the built-in recommendation rules.
    pub fn new(config: Arc<AnalysisConfig>) -> Self {
        Self {
            config,
            rules: default_rules(),
        }
    }

    /// Creates a generator with no recommendation rules.
    pub fn without_rules(config: Arc<AnalysisConfig>) -> Self {
        Self {
            config,
            rules: Vec::new(),
        }
    }

    /// Appends a rule. Its advice ranks after that of earlier rules.
    pub fn add_rule(mut self, rule: Box<dyn RecommendationRule>) -> Self {
        self.rules.push(rule);
        self
    }

    /// Builds the insight bundle for `composite`.
    #[instrument(skip_all, fields(generated_at = %composite.generated_at))]
    pub fn generate(&self, composite: &CompositeReport) -> InsightBundle {
        let context = InsightContext::from_composite(composite, self.config.business());

        let bundle = InsightBundle {
            summary: summary(&context),
            business: business(&context),
            performance: performance(&context),
            quality: quality(&context),
            anomalies: anomalies(&context),
            recommendations: self.recommendations(&context),
            generated_at: composite.generated_at,
        };

        if self.config.log().log_insights {
            info!(
                highlights = bundle.summary.highlights.len(),
                anomalies = bundle.anomalies.len(),
                recommendations = bundle.recommendations.len(),
                "insights generated"
            );
        }
        bundle
    }

    /// Hotel-management view of a business report.
    ///
    /// A report that did not complete yields empty insights.
    pub fn hotel_insights(&self, business: &CategoryReport) -> HotelInsights {
        let context = InsightContext::from_business(business, self.config.business());

        let revenue_optimization = context.status_distribution.clone().map(|distribution| {
            let total: u64 = distribution.values().sum();
            let confirmation_rate = if total == 0 {
                0.0
            } else {
                context.confirmed_bookings as f64 / total as f64 * 100.0
            };
            RevenueOptimization {
                status_distribution: distribution,
                confirmation_rate,
            }
        });

        let mut strategic_recommendations = Vec::new();
        if context
            .average_rating
            .is_some_and(|rating| rating < RATING_THRESHOLD)
        {
            strategic_recommendations
                .push("Implement guest satisfaction improvement programs".to_string());
        }
        if revenue_optimization
            .as_ref()
            .is_some_and(|r| r.confirmation_rate < HOTEL_CONFIRMATION_THRESHOLD)
        {
            strategic_recommendations
                .push("Review booking policies and improve customer service".to_string());
        }

        HotelInsights {
            occupancy: operational(&context),
            revenue_optimization,
            strategic_recommendations,
        }
    }

    fn recommendations(&self, context: &InsightContext) -> Vec<Recommendation> {
        self.rules
            .iter()
            .flat_map(|rule| {
                let source = rule.source();
                let messages = rule.apply(context);
                if !messages.is_empty() {
                    debug!(rule = rule.name(), count = messages.len(), "rule triggered");
                }
                messages.into_iter().map(move |message| (source, message))
            })
            .enumerate()
            .map(|(i, (source, message))| Recommendation {
                rank: i + 1,
                source,
                message,
            })
            .collect()
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn summary(context: &InsightContext) -> SummaryInsights {
    let mut highlights = Vec::new();
    if context
        .quality_score
        .is_some_and(|score| score < QUALITY_THRESHOLD)
    {
        highlights.push("Data quality needs improvement".to_string());
    }
    if context
        .average_rating
        .is_some_and(|rating| rating < RATING_THRESHOLD)
    {
        highlights.push("Hotel ratings are below industry average".to_string());
    }
    if context.total_revenue.is_some_and(|revenue| revenue > 0.0) {
        highlights.push("Revenue generation is active".to_string());
    }

    SummaryInsights {
        overview: Overview {
            database: context.database.clone(),
            container_count: context.container_count,
            total_records: context.total_records,
        },
        key_metrics: KeyMetrics {
            average_rating: context.average_rating,
            hotel_count: context.hotel_count,
            total_revenue: context.total_revenue,
            average_booking_amount: context.average_booking_amount,
            quality_score: context.quality_score,
        },
        highlights,
    }
}

fn operational(context: &InsightContext) -> OperationalInsights {
    OperationalInsights {
        hotel_count: context.hotel_count,
        average_rating: context.average_rating,
        price_range: context.price_range,
    }
}

fn business(context: &InsightContext) -> BusinessInsights {
    let bookings = context.total_bookings().map(|total| {
        BookingRates::from_counts(
            total,
            context.confirmed_bookings,
            context.cancelled_bookings,
        )
    });

    let mut growth_opportunities = Vec::new();
    if bookings.is_some_and(|b| b.cancellation_rate > CANCELLATION_RATE_THRESHOLD) {
        growth_opportunities.push("Reduce cancellation rate to improve revenue".to_string());
    }
    if context
        .average_rating
        .is_some_and(|rating| rating < RATING_THRESHOLD)
    {
        growth_opportunities.push("Improve hotel ratings to attract more customers".to_string());
    }

    BusinessInsights {
        revenue: RevenueInsights {
            total_revenue: context.total_revenue,
            average_booking_value: context.average_booking_amount,
        },
        bookings,
        operational: operational(context),
        growth_opportunities,
    }
}

fn performance(context: &InsightContext) -> PerformanceInsights {
    let storage_efficiency = match (context.data_size, context.storage_size) {
        (Some(data), Some(storage)) if storage > 0 => {
            Some(round2(data as f64 / storage as f64 * 100.0))
        }
        _ => None,
    };

    let mut optimization_opportunities = Vec::new();
    if context.index_count == Some(0) {
        optimization_opportunities.push("Add indexes to improve query performance".to_string());
    }
    if storage_efficiency.is_some_and(|e| e < STORAGE_EFFICIENCY_THRESHOLD) {
        optimization_opportunities.push(
            "Consider data compression or cleanup to improve storage efficiency".to_string(),
        );
    }

    PerformanceInsights {
        data_size_mb: context.data_size.map(|b| round2(b as f64 / BYTES_PER_MB)),
        storage_size_mb: context.storage_size.map(|b| round2(b as f64 / BYTES_PER_MB)),
        index_count: context.index_count,
        storage_efficiency,
        optimization_opportunities,
    }
}

fn quality(context: &InsightContext) -> QualityInsights {
    let completeness = context
        .container_quality
        .iter()
        .filter(|c| c.total_records > 0)
        .map(|c| {
            let complete = c.total_records.saturating_sub(c.null_records);
            (
                c.name.clone(),
                round2(complete as f64 / c.total_records as f64 * 100.0),
            )
        })
        .collect();

    let mut improvement_suggestions = Vec::new();
    if context
        .quality_score
        .is_some_and(|score| score < QUALITY_THRESHOLD)
    {
        improvement_suggestions.push("Implement data validation rules".to_string());
    }
    if !context.quality_issues.is_empty() {
        improvement_suggestions
            .push("Address data quality issues in affected collections".to_string());
    }

    QualityInsights {
        overall_score: context.quality_score,
        issues: context.quality_issues.clone(),
        completeness,
        improvement_suggestions,
    }
}

fn anomalies(context: &InsightContext) -> Vec<Anomaly> {
    let mut anomalies: Vec<Anomaly> = context
        .container_quality
        .iter()
        .filter(|c| c.null_ratio() > NULL_RATIO_THRESHOLD)
        .map(|c| Anomaly {
            kind: AnomalyKind::HighNullRatio,
            container: Some(c.name.clone()),
            message: format!(
                "High null value ratio ({:.1}%) in collection {}",
                c.null_ratio() * 100.0,
                c.name
            ),
        })
        .collect();

    if context
        .average_rating
        .is_some_and(|rating| rating < EXTREME_RATING_THRESHOLD)
    {
        anomalies.push(Anomaly {
            kind: AnomalyKind::ExtremelyLowRating,
            container: None,
            message: "Extremely low hotel ratings detected".to_string(),
        });
    }
    if context.cancelled_bookings > context.confirmed_bookings {
        anomalies.push(Anomaly {
            kind: AnomalyKind::CancellationsExceedConfirmations,
            container: None,
            message: "Cancellation rate exceeds confirmation rate".to_string(),
        });
    }
    anomalies
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{keys, AnalysisCategory, MetricValue};
    use chrono::{TimeZone, Utc};
    use std::collections::BTreeMap;

    fn composite() -> CompositeReport {
        CompositeReport {
            structure: CategoryReport::new(AnalysisCategory::Structure, None),
            quality: CategoryReport::new(AnalysisCategory::Quality, None),
            performance: CategoryReport::new(AnalysisCategory::Performance, None),
            business: CategoryReport::new(AnalysisCategory::Business, None),
            generated_at: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
        }
    }

    fn distribution(pairs: &[(&str, u64)]) -> MetricValue {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), *v))
            .collect::<BTreeMap<String, u64>>()
            .into()
    }

    fn generator() -> InsightGenerator {
        InsightGenerator::new(Arc::new(AnalysisConfig::default()))
    }

    #[test]
    fn test_booking_rates_from_distribution() {
        let mut report = composite();
        report.business.set_metric(
            keys::STATUS_DISTRIBUTION,
            distribution(&[("confirmed", 80), ("cancelled", 20)]),
        );

        let bundle = generator().generate(&report);
        let bookings = bundle.business.bookings.unwrap();
        assert_eq!(bookings.total_bookings, 100);
        assert_eq!(bookings.confirmation_rate, 80.0);
        assert_eq!(bookings.cancellation_rate, 20.0);
        assert_eq!(
            bundle.business.growth_opportunities,
            vec!["Reduce cancellation rate to improve revenue"]
        );
    }

    #[test]
    fn test_empty_distribution_yields_zero_rates() {
        let mut report = composite();
        report
            .business
            .set_metric(keys::STATUS_DISTRIBUTION, distribution(&[]));

        let bookings = generator().generate(&report).business.bookings.unwrap();
        assert_eq!(bookings.total_bookings, 0);
        assert_eq!(bookings.confirmation_rate, 0.0);
        assert_eq!(bookings.cancellation_rate, 0.0);
    }

    #[test]
    fn test_storage_efficiency() {
        let mut report = composite();
        report
            .performance
            .set_metric(keys::DATA_SIZE, 50 * 1024 * 1024_u64);
        report
            .performance
            .set_metric(keys::STORAGE_SIZE, 100 * 1024 * 1024_u64);
        report.performance.set_metric(keys::INDEX_COUNT, 3_u64);

        let performance = generator().generate(&report).performance;
        assert_eq!(performance.storage_efficiency, Some(50.0));
        assert_eq!(performance.data_size_mb, Some(50.0));
        assert_eq!(performance.storage_size_mb, Some(100.0));
        assert_eq!(
            performance.optimization_opportunities,
            vec!["Consider data compression or cleanup to improve storage efficiency"]
        );
    }

    #[test]
    fn test_storage_efficiency_omitted_for_zero_storage() {
        let mut report = composite();
        report.performance.set_metric(keys::DATA_SIZE, 0_u64);
        report.performance.set_metric(keys::STORAGE_SIZE, 0_u64);
        report.performance.set_metric(keys::INDEX_COUNT, 0_u64);

        let performance = generator().generate(&report).performance;
        assert_eq!(performance.storage_efficiency, None);
        assert_eq!(
            performance.optimization_opportunities,
            vec!["Add indexes to improve query performance"]
        );
    }

    #[test]
    fn test_recommendation_order_and_tail() {
        let mut report = composite();
        report.quality.score = Some(50.0);
        report.performance.set_metric(keys::INDEX_COUNT, 0_u64);
        report.business.set_metric(keys::AVERAGE_RATING, 3.0);
        report.business.set_metric(
            keys::STATUS_DISTRIBUTION,
            distribution(&[("confirmed", 10), ("cancelled", 5)]),
        );

        let recommendations = generator().generate(&report).recommendations;
        let messages: Vec<_> = recommendations.iter().map(|r| r.message.as_str()).collect();
        assert_eq!(
            messages,
            vec![
                "Implement data validation and cleaning procedures",
                "Add database indexes for frequently queried fields",
                "Focus on improving hotel service quality and ratings",
                "Review and improve booking policies to reduce cancellations",
                GENERAL_PRACTICES[0],
                GENERAL_PRACTICES[1],
                GENERAL_PRACTICES[2],
                GENERAL_PRACTICES[3],
            ]
        );
        let ranks: Vec<_> = recommendations.iter().map(|r| r.rank).collect();
        assert_eq!(ranks, (1..=8).collect::<Vec<_>>());
        assert_eq!(recommendations[1].source, RecommendationSource::Performance);
    }

    #[test]
    fn test_failed_reports_contribute_nothing() {
        let mut report = composite();
        report.quality = CategoryReport::failed(AnalysisCategory::Quality, None, "boom");
        report.business = CategoryReport::failed(AnalysisCategory::Business, None, "boom");

        let bundle = generator().generate(&report);
        assert_eq!(bundle.quality.overall_score, None);
        assert!(bundle.summary.highlights.is_empty());
        assert!(bundle.anomalies.is_empty());
        assert_eq!(bundle.recommendations.len(), GENERAL_PRACTICES.len());
    }

    #[test]
    fn test_anomalies() {
        let mut report = composite();
        let metrics = report.quality.container_mut("hotels");
        metrics.insert(keys::TOTAL_RECORDS.into(), 10_u64.into());
        metrics.insert(keys::NULL_RECORDS.into(), 6_u64.into());
        report.business.set_metric(keys::AVERAGE_RATING, 1.5);
        report.business.set_metric(
            keys::STATUS_DISTRIBUTION,
            distribution(&[("confirmed", 1), ("cancelled", 2)]),
        );

        let anomalies = generator().generate(&report).anomalies;
        let kinds: Vec<_> = anomalies.iter().map(|a| a.kind).collect();
        assert_eq!(
            kinds,
            vec![
                AnomalyKind::HighNullRatio,
                AnomalyKind::ExtremelyLowRating,
                AnomalyKind::CancellationsExceedConfirmations,
            ]
        );
        assert_eq!(
            anomalies[0].message,
            "High null value ratio (60.0%) in collection hotels"
        );
    }

    #[test]
    fn test_quality_completeness() {
        let mut report = composite();
        report.quality.score = Some(90.0);
        report.quality.issues = vec!["hotels: Found 1 records with null/empty values".into()];
        let metrics = report.quality.container_mut("hotels");
        metrics.insert(keys::TOTAL_RECORDS.into(), 3_u64.into());
        metrics.insert(keys::NULL_RECORDS.into(), 1_u64.into());
        let metrics = report.quality.container_mut("empty");
        metrics.insert(keys::TOTAL_RECORDS.into(), 0_u64.into());
        metrics.insert(keys::NULL_RECORDS.into(), 0_u64.into());

        let quality = generator().generate(&report).quality;
        assert_eq!(quality.completeness.get("hotels"), Some(&66.67));
        assert!(!quality.completeness.contains_key("empty"));
        assert_eq!(
            quality.improvement_suggestions,
            vec!["Address data quality issues in affected collections"]
        );
    }

    #[test]
    fn test_generation_is_idempotent() {
        let mut report = composite();
        report.quality.score = Some(72.5);
        report.business.set_metric(keys::TOTAL_REVENUE, 1200.0);

        let generator = generator();
        let first = generator.generate(&report);
        let second = generator.generate(&report);
        assert_eq!(first, second);
        assert_eq!(first.generated_at, report.generated_at);
        assert!(first
            .summary
            .highlights
            .contains(&"Revenue generation is active".to_string()));
    }

    #[test]
    fn test_hotel_insights() {
        let mut business = CategoryReport::new(AnalysisCategory::Business, None);
        business.set_metric(keys::HOTEL_COUNT, 2_u64);
        business.set_metric(keys::AVERAGE_RATING, 3.5);
        business.set_metric(
            keys::STATUS_DISTRIBUTION,
            distribution(&[("confirmed", 3), ("cancelled", 1)]),
        );

        let insights = generator().hotel_insights(&business);
        assert_eq!(insights.occupancy.hotel_count, Some(2));
        assert_eq!(
            insights.revenue_optimization.as_ref().unwrap().confirmation_rate,
            75.0
        );
        assert_eq!(
            insights.strategic_recommendations,
            vec![
                "Implement guest satisfaction improvement programs",
                "Review booking policies and improve customer service",
            ]
        );
    }

    #[test]
    fn test_hotel_insights_with_empty_distribution() {
        let mut business = CategoryReport::new(AnalysisCategory::Business, None);
        business.set_metric(keys::STATUS_DISTRIBUTION, distribution(&[]));

        let insights = generator().hotel_insights(&business);
        assert_eq!(
            insights.revenue_optimization.unwrap().confirmation_rate,
            0.0
        );
    }

    #[test]
    fn test_custom_rule_ranks_last() {
        struct Always;
        impl RecommendationRule for Always {
            fn source(&self) -> RecommendationSource {
                RecommendationSource::General
            }
            fn name(&self) -> &str {
                "always"
            }
            fn apply(&self, _context: &InsightContext) -> Vec<String> {
                vec!["custom".to_string()]
            }
        }

        let generator = InsightGenerator::without_rules(Arc::new(AnalysisConfig::default()))
            .add_rule(Box::new(Always));
        let recommendations = generator.generate(&composite()).recommendations;
        assert_eq!(recommendations.len(), 1);
        assert_eq!(recommendations[0].rank, 1);
    }
}
