//! Property-based tests for scoring, booking rates and insight generation.
//!
//! ## Properties
//!
//! - The null-ratio term of the quality score stays within [0, 100] and the
//!   score never exceeds 100.
//! - Booking rates stay within [0, 100] for any distribution.
//! - Insight generation is a pure function of the composite report.
//! - Recommendations are ranked 1..n and always end with the general tail.
//! - Quality analysis of generated stores agrees with the score formula.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use proptest::prelude::*;
use serde_json::json;
use term_probe::analysis::document::quality_score;
use term_probe::analysis::{keys, AnalysisCategory, CategoryReport, CompositeReport, MetricValue};
use term_probe::backends::{MemoryDocumentStore, MemoryDriver, MemoryDriverFactory};
use term_probe::config::AnalysisConfig;
use term_probe::engine::{AnalysisKind, ProbeEngine};
use term_probe::insights::{BookingRates, InsightGenerator, GENERAL_PRACTICES};

fn composite(
    score: Option<f64>,
    rating: Option<f64>,
    distribution: &BTreeMap<String, u64>,
    sizes: (u64, u64),
    indexes: u64,
) -> CompositeReport {
    let mut quality = CategoryReport::new(AnalysisCategory::Quality, None);
    quality.score = score;

    let mut performance = CategoryReport::new(AnalysisCategory::Performance, None);
    performance.set_metric(keys::DATA_SIZE, sizes.0);
    performance.set_metric(keys::STORAGE_SIZE, sizes.1);
    performance.set_metric(keys::INDEX_COUNT, indexes);

    let mut business = CategoryReport::new(AnalysisCategory::Business, None);
    if let Some(rating) = rating {
        business.set_metric(keys::AVERAGE_RATING, rating);
    }
    business.set_metric(
        keys::STATUS_DISTRIBUTION,
        MetricValue::from(distribution.clone()),
    );

    CompositeReport {
        structure: CategoryReport::new(AnalysisCategory::Structure, None),
        quality,
        performance,
        business,
        generated_at: Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap(),
    }
}

fn distribution_strategy() -> impl Strategy<Value = BTreeMap<String, u64>> {
    prop::collection::btree_map(
        prop_oneof![
            Just("confirmed".to_string()),
            Just("cancelled".to_string()),
            Just("pending".to_string()),
            Just("null".to_string()),
        ],
        0u64..10_000,
        0..4,
    )
}

proptest! {
    #[test]
    fn test_quality_score_bounds(
        total in 0u64..100_000,
        nulls in 0u64..200_000,
        missing in 0usize..8,
    ) {
        let null_term = quality_score(total, nulls, 0);
        prop_assert!((0.0..=100.0).contains(&null_term));

        let score = quality_score(total, nulls, missing);
        prop_assert!(score <= 100.0);
        prop_assert!((score - (null_term - 10.0 * missing as f64)).abs() < 1e-9);
    }

    #[test]
    fn test_booking_rates_are_bounded(distribution in distribution_strategy()) {
        let total: u64 = distribution.values().sum();
        let confirmed = distribution.get("confirmed").copied().unwrap_or(0);
        let cancelled = distribution.get("cancelled").copied().unwrap_or(0);

        let rates = BookingRates::from_counts(total, confirmed, cancelled);
        prop_assert!((0.0..=100.0).contains(&rates.confirmation_rate));
        prop_assert!((0.0..=100.0).contains(&rates.cancellation_rate));
        prop_assert!(rates.confirmation_rate + rates.cancellation_rate <= 100.0 + 1e-9);
    }

    #[test]
    fn test_insights_are_deterministic(
        score in prop::option::of(-50.0f64..100.0),
        rating in prop::option::of(0.0f64..5.0),
        distribution in distribution_strategy(),
        data_size in 0u64..1_000_000_000,
        storage_size in 0u64..1_000_000_000,
        indexes in 0u64..20,
    ) {
        let report = composite(
            score,
            rating,
            &distribution,
            (data_size, storage_size),
            indexes,
        );
        let generator = InsightGenerator::new(Arc::new(AnalysisConfig::default()));

        let first = generator.generate(&report);
        let second = generator.generate(&report);
        prop_assert_eq!(&first, &second);
        prop_assert_eq!(first.generated_at, report.generated_at);

        let ranks: Vec<_> = first.recommendations.iter().map(|r| r.rank).collect();
        let expected: Vec<_> = (1..=first.recommendations.len()).collect();
        prop_assert_eq!(ranks, expected);

        let tail: Vec<_> = first
            .recommendations
            .iter()
            .rev()
            .take(GENERAL_PRACTICES.len())
            .rev()
            .map(|r| r.message.as_str())
            .collect();
        prop_assert_eq!(tail, GENERAL_PRACTICES.to_vec());

        prop_assert_eq!(
            first.performance.storage_efficiency.is_none(),
            storage_size == 0
        );
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn test_quality_analysis_matches_formula(
        total in 1usize..40,
        null_share in 0.0f64..=1.0,
    ) {
        let nulls = ((total as f64) * null_share).floor() as usize;
        let records: Vec<_> = (0..total)
            .map(|i| {
                let name = if i < nulls { json!(null) } else { json!(format!("hotel-{i}")) };
                json!({"name": name, "address": "x", "rating": 4.0, "price": 100})
            })
            .collect();
        let store = MemoryDocumentStore::new("db").with_collection("hotels", records);
        let factory =
            MemoryDriverFactory::new().with_driver(Arc::new(MemoryDriver::document(store)));
        // Sample everything so every null field is seen.
        let config = AnalysisConfig::default().with_sample_size(total);
        let engine = ProbeEngine::new(Arc::new(factory), config);

        let rt = tokio::runtime::Runtime::new().unwrap();
        let report = rt.block_on(async {
            engine.connect("mongodb", "memory://local", None, None).await.unwrap();
            engine
                .analyze(AnalysisKind::Category(AnalysisCategory::Quality), None)
                .await
                .unwrap()
        });
        let report = report.as_category().unwrap();

        prop_assert_eq!(
            report.container_metric("hotels", keys::NULL_RECORDS),
            Some(&MetricValue::from(nulls))
        );
        let expected = quality_score(total as u64, nulls as u64, 0);
        prop_assert!((report.score.unwrap() - expected).abs() < 1e-9);
    }
}
