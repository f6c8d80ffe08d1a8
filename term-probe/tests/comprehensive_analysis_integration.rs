//! Integration tests for concurrent comprehensive analysis.

mod common;

use std::time::{Duration, Instant};

use term_probe::analysis::AnalysisCategory;
use term_probe::backends::{BackendKind, MemoryOperation};
use term_probe::config::AnalysisConfig;
use term_probe::engine::AnalysisKind;

use common::{connect_document, engine_with, hotel_engine, hotel_store};

#[tokio::test]
async fn test_composite_has_one_report_per_category_in_order() {
    let (engine, _) = hotel_engine();
    connect_document(&engine).await;

    let outcome = engine
        .analyze(AnalysisKind::Comprehensive, None)
        .await
        .unwrap();
    let composite = outcome.as_composite().unwrap();

    let categories: Vec<_> = composite.reports().iter().map(|r| r.category).collect();
    assert_eq!(categories, AnalysisCategory::ALL.to_vec());
    assert!(composite
        .reports()
        .iter()
        .all(|r| r.is_complete() && r.backend == Some(BackendKind::Document)));
}

#[tokio::test]
async fn test_failures_still_yield_four_reports() {
    let (engine, factory) = hotel_engine();
    connect_document(&engine).await;
    let driver = factory.driver(BackendKind::Document).unwrap();
    driver.fail_on(MemoryOperation::DatabaseStats);
    driver.fail_on(MemoryOperation::GroupCount);

    let outcome = engine
        .analyze(AnalysisKind::Comprehensive, None)
        .await
        .unwrap();
    let composite = outcome.as_composite().unwrap();

    assert!(composite.structure.is_complete());
    assert!(composite.quality.is_complete());
    assert!(composite.performance.is_failed());
    assert!(composite.business.is_failed());
    assert!(composite
        .performance
        .status_message()
        .unwrap()
        .contains("DatabaseStats"));

    driver.heal();
    let healed = engine
        .analyze(AnalysisKind::Comprehensive, None)
        .await
        .unwrap();
    assert!(healed
        .as_composite()
        .unwrap()
        .reports()
        .iter()
        .all(|r| r.is_complete()));
}

#[tokio::test]
async fn test_category_timeout_is_reported_per_slot() {
    let config = AnalysisConfig::default().with_category_timeout(Duration::from_millis(50));
    let (engine, factory) = engine_with(hotel_store(), config);
    connect_document(&engine).await;
    factory
        .driver(BackendKind::Document)
        .unwrap()
        .set_latency(Some(Duration::from_secs(2)));

    let outcome = engine
        .analyze(AnalysisKind::Comprehensive, None)
        .await
        .unwrap();
    let composite = outcome.as_composite().unwrap();
    for report in composite.reports() {
        assert!(report.is_failed(), "{}", report.category);
        assert!(report.status_message().unwrap().contains("timed out"));
    }
}

#[tokio::test]
async fn test_categories_run_concurrently() {
    let (engine, factory) = hotel_engine();
    connect_document(&engine).await;
    factory
        .driver(BackendKind::Document)
        .unwrap()
        .set_latency(Some(Duration::from_millis(100)));

    let mut sequential = Duration::ZERO;
    for category in AnalysisCategory::ALL {
        let started = Instant::now();
        let outcome = engine.analyze(category.into(), None).await.unwrap();
        assert!(outcome.as_category().unwrap().is_complete());
        sequential += started.elapsed();
    }

    let started = Instant::now();
    let outcome = engine
        .analyze(AnalysisKind::Comprehensive, None)
        .await
        .unwrap();
    let concurrent = started.elapsed();
    assert!(outcome
        .as_composite()
        .unwrap()
        .reports()
        .iter()
        .all(|r| r.is_complete()));

    assert!(
        concurrent < sequential * 3 / 4,
        "comprehensive took {concurrent:?}, categories alone took {sequential:?}"
    );
}

#[tokio::test]
async fn test_key_value_composite_mixes_inventory_and_gaps() {
    let (engine, _) = hotel_engine();
    engine
        .connect("redis", "redis://cache:6379", None, None)
        .await
        .unwrap();

    let outcome = engine
        .analyze(AnalysisKind::Comprehensive, None)
        .await
        .unwrap();
    let composite = outcome.as_composite().unwrap();
    assert!(composite.structure.is_complete());
    assert!(composite.quality.is_capability_gap());
    assert!(composite.performance.is_capability_gap());
    assert!(composite.business.is_capability_gap());
}

#[tokio::test]
async fn test_composite_serializes() {
    let (engine, _) = hotel_engine();
    connect_document(&engine).await;

    let outcome = engine
        .analyze(AnalysisKind::Comprehensive, None)
        .await
        .unwrap();
    let json = serde_json::to_value(&outcome).unwrap();
    assert_eq!(json["kind"], "composite");
    assert_eq!(json["report"]["quality"]["status"]["state"], "complete");
}
