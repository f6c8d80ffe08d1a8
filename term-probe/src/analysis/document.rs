//! Reference procedures for document stores.
//!
//! All four procedures read through [`DocumentSource`], so they run unchanged
//! against MongoDB and the in-memory store.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::report::keys;
use super::{AnalysisCategory, AnalysisFilters, CategoryProcedure, CategoryReport, MetricValue};
use crate::backends::{BackendDriver, DocumentSource, RecordFilter, SampledDocument};
use crate::config::AnalysisConfig;
use crate::error::{ProbeError, Result};
use crate::log_data_op;
use crate::logging::truncate_field;

/// Recommendation emitted when the database has no indexes.
pub const NO_INDEX_RECOMMENDATION: &str = "Consider adding indexes for frequently queried fields";
/// Recommendation emitted when the average hotel rating is below 4.0.
pub const LOW_RATING_RECOMMENDATION: &str =
    "Consider improving hotel ratings through better service and amenities";
/// Recommendation emitted when any booking was cancelled.
pub const CANCELLATION_RECOMMENDATION: &str =
    "High cancellation rate detected. Review booking policies and customer service";

/// Rating below which hotels are flagged.
pub const RATING_THRESHOLD: f64 = 4.0;

/// Quality score of one container.
///
/// `max(0, 100 - 100 * nulls / max(total, 1)) - 10 * missing_fields`. The
/// null term is clamped; the missing-field penalty is not, so the score can
/// drop below zero.
pub fn quality_score(total: u64, null_records: u64, missing_fields: usize) -> f64 {
    let null_ratio = null_records as f64 / total.max(1) as f64;
    (100.0 - null_ratio * 100.0).max(0.0) - 10.0 * missing_fields as f64
}

fn document_source(driver: &dyn BackendDriver) -> Result<&dyn DocumentSource> {
    driver.document_source().ok_or_else(|| {
        ProbeError::Internal(format!(
            "{} driver does not expose record-level access",
            driver.name()
        ))
    })
}

async fn selected_collections(
    source: &dyn DocumentSource,
    filters: &AnalysisFilters,
) -> Result<Vec<String>> {
    Ok(filters.select(source.collection_names().await?))
}

/// Union of sampled field types, keeping first-seen type order per field.
fn field_type_union(samples: &[SampledDocument]) -> BTreeMap<String, Vec<String>> {
    let mut union: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for sample in samples {
        for (field, ty) in &sample.field_types {
            let types = union.entry(field.clone()).or_default();
            if !types.contains(ty) {
                types.push(ty.clone());
            }
        }
    }
    union
}

fn truncate_strings(value: &Value, max_length: usize) -> Value {
    match value {
        Value::String(s) => Value::String(truncate_field(s, max_length)),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|v| truncate_strings(v, max_length))
                .collect(),
        ),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), truncate_strings(v, max_length)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Record counts, sizes, sampled field types and retained samples.
#[derive(Debug, Default, Clone, Copy)]
pub struct DocumentStructureProcedure;

#[async_trait]
impl CategoryProcedure for DocumentStructureProcedure {
    fn name(&self) -> &str {
        "document_structure"
    }

    async fn run(
        &self,
        driver: &dyn BackendDriver,
        config: &AnalysisConfig,
        filters: &AnalysisFilters,
    ) -> Result<CategoryReport> {
        let source = document_source(driver)?;
        let mut report = CategoryReport::new(AnalysisCategory::Structure, Some(driver.kind()));
        if let Some(database) = source.database_name() {
            report.set_metric(keys::DATABASE, database);
        }

        let collections = selected_collections(source, filters).await?;
        report.set_metric(keys::CONTAINER_COUNT, collections.len());

        let max_length = config.log().max_field_length;
        let mut total_records = 0u64;
        for collection in &collections {
            log_data_op!(config.log(), collection = %collection, "sampling structure");
            let stats = source.collection_stats(collection).await?;
            let samples = source.sample(collection, config.sample_size()).await?;

            let field_types = field_type_union(&samples);
            let domain_fields: Vec<MetricValue> = field_types
                .keys()
                .filter(|f| config.domain_fields().contains(f))
                .map(|f| MetricValue::from(f.as_str()))
                .collect();
            let retained: Vec<MetricValue> = samples
                .iter()
                .take(config.retained_samples())
                .map(|s| MetricValue::Json(truncate_strings(&s.body, max_length)))
                .collect();

            let metrics = report.container_mut(collection);
            metrics.insert(keys::RECORD_COUNT.into(), stats.count.into());
            metrics.insert(keys::STORAGE_SIZE.into(), stats.size.into());
            metrics.insert(keys::AVG_RECORD_SIZE.into(), stats.avg_obj_size.into());
            metrics.insert(keys::FIELD_TYPES.into(), field_types.into());
            metrics.insert(keys::SAMPLES.into(), MetricValue::List(retained));
            metrics.insert(keys::DOMAIN_FIELDS.into(), MetricValue::List(domain_fields));

            total_records += stats.count;
        }
        report.set_metric(keys::TOTAL_RECORDS, total_records);
        Ok(report)
    }
}

/// Null/empty counts, missing expected fields and a per-container score.
#[derive(Debug, Default, Clone, Copy)]
pub struct DocumentQualityProcedure;

#[async_trait]
impl CategoryProcedure for DocumentQualityProcedure {
    fn name(&self) -> &str {
        "document_quality"
    }

    async fn run(
        &self,
        driver: &dyn BackendDriver,
        config: &AnalysisConfig,
        filters: &AnalysisFilters,
    ) -> Result<CategoryReport> {
        let source = document_source(driver)?;
        let mut report = CategoryReport::new(AnalysisCategory::Quality, Some(driver.kind()));
        let collections = selected_collections(source, filters).await?;

        let mut scores = Vec::with_capacity(collections.len());
        for collection in &collections {
            log_data_op!(config.log(), collection = %collection, "checking quality");
            let total = source.count(collection, &RecordFilter::All).await?;

            // Null detection covers the fields seen in the structure sample.
            let samples = source.sample(collection, config.sample_size()).await?;
            let sampled_fields: Vec<String> = field_type_union(&samples).into_keys().collect();
            let null_records = if sampled_fields.is_empty() {
                0
            } else {
                source
                    .count(collection, &RecordFilter::AnyNullOrEmpty(sampled_fields))
                    .await?
            };

            let mut missing = BTreeMap::new();
            for field in config.quality_fields() {
                let count = source
                    .count(collection, &RecordFilter::MissingField(field.clone()))
                    .await?;
                if count > 0 {
                    missing.insert(field.clone(), count);
                }
            }

            let score = quality_score(total, null_records, missing.len());
            let mut issues = Vec::new();
            if null_records > 0 {
                issues.push(format!(
                    "Found {null_records} records with null/empty values"
                ));
            }
            if !missing.is_empty() {
                let fields: Vec<String> = missing
                    .iter()
                    .map(|(field, count)| format!("{field} ({count})"))
                    .collect();
                issues.push(format!("Missing required fields: {}", fields.join(", ")));
            }
            report
                .issues
                .extend(issues.iter().map(|issue| format!("{collection}: {issue}")));

            let metrics = report.container_mut(collection);
            metrics.insert(keys::TOTAL_RECORDS.into(), total.into());
            metrics.insert(keys::NULL_RECORDS.into(), null_records.into());
            metrics.insert(keys::MISSING_FIELDS.into(), missing.into());
            metrics.insert(keys::SCORE.into(), score.into());
            metrics.insert(keys::ISSUES.into(), issues.into());

            scores.push(score);
        }

        let overall = if scores.is_empty() {
            0.0
        } else {
            scores.iter().sum::<f64>() / scores.len() as f64
        };
        report.set_metric(keys::OVERALL_SCORE, overall);
        report.score = Some(overall);
        Ok(report)
    }
}

/// Database and per-container size statistics with index inventory.
#[derive(Debug, Default, Clone, Copy)]
pub struct DocumentPerformanceProcedure;

#[async_trait]
impl CategoryProcedure for DocumentPerformanceProcedure {
    fn name(&self) -> &str {
        "document_performance"
    }

    async fn run(
        &self,
        driver: &dyn BackendDriver,
        config: &AnalysisConfig,
        filters: &AnalysisFilters,
    ) -> Result<CategoryReport> {
        let source = document_source(driver)?;
        let mut report = CategoryReport::new(AnalysisCategory::Performance, Some(driver.kind()));

        let db = source.database_stats().await?;
        report.set_metric(keys::CONTAINER_COUNT, db.collections);
        report.set_metric(keys::DATA_SIZE, db.data_size);
        report.set_metric(keys::STORAGE_SIZE, db.storage_size);
        report.set_metric(keys::INDEX_COUNT, db.indexes);
        report.set_metric(keys::INDEX_SIZE, db.index_size);

        for collection in selected_collections(source, filters).await? {
            log_data_op!(config.log(), collection = %collection, "reading index inventory");
            let stats = source.collection_stats(&collection).await?;
            let indexes = source.indexes(&collection).await?;
            let inventory: Vec<MetricValue> = indexes
                .iter()
                .map(|index| {
                    MetricValue::Json(json!({
                        "name": index.name,
                        "keys": index.keys,
                        "unique": index.unique,
                    }))
                })
                .collect();

            let metrics = report.container_mut(&collection);
            metrics.insert(keys::RECORD_COUNT.into(), stats.count.into());
            metrics.insert(keys::SIZE.into(), stats.size.into());
            metrics.insert(keys::AVG_RECORD_SIZE.into(), stats.avg_obj_size.into());
            metrics.insert(keys::INDEX_COUNT.into(), indexes.len().into());
            metrics.insert(keys::INDEXES.into(), MetricValue::List(inventory));
        }

        if db.indexes == 0 {
            report
                .recommendations
                .push(NO_INDEX_RECOMMENDATION.to_string());
        }
        Ok(report)
    }
}

/// Hotel and booking metrics over configurable collection and field names.
#[derive(Debug, Default, Clone, Copy)]
pub struct HotelBusinessProcedure;

#[async_trait]
impl CategoryProcedure for HotelBusinessProcedure {
    fn name(&self) -> &str {
        "hotel_business"
    }

    async fn run(
        &self,
        driver: &dyn BackendDriver,
        config: &AnalysisConfig,
        filters: &AnalysisFilters,
    ) -> Result<CategoryReport> {
        let source = document_source(driver)?;
        let vocab = config.business();
        let mut report = CategoryReport::new(AnalysisCategory::Business, Some(driver.kind()));
        let collections = selected_collections(source, filters).await?;

        if collections.contains(&vocab.hotels_collection) {
            let hotels = vocab.hotels_collection.as_str();
            log_data_op!(config.log(), collection = hotels, "summarizing hotels");

            let hotel_count = source.count(hotels, &RecordFilter::All).await?;
            report.set_metric(keys::HOTEL_COUNT, hotel_count);

            if let Some(rating) = source
                .summarize(hotels, &vocab.rating_field, &RecordFilter::All)
                .await?
            {
                report.set_metric(keys::AVERAGE_RATING, rating.mean);
            }
            if let Some(price) = source
                .summarize(hotels, &vocab.price_field, &RecordFilter::All)
                .await?
            {
                let range: BTreeMap<String, f64> = [
                    ("min".to_string(), price.min),
                    ("max".to_string(), price.max),
                    ("average".to_string(), price.mean),
                ]
                .into_iter()
                .collect();
                report.set_metric(keys::PRICE_RANGE, range);
            }
        }

        if collections.contains(&vocab.bookings_collection) {
            let bookings = vocab.bookings_collection.as_str();
            log_data_op!(config.log(), collection = bookings, "summarizing bookings");

            let distribution = source.group_count(bookings, &vocab.status_field).await?;
            report.set_metric(keys::STATUS_DISTRIBUTION, distribution);

            let confirmed = RecordFilter::FieldEquals(
                vocab.status_field.clone(),
                Value::String(vocab.confirmed_status.clone()),
            );
            if let Some(revenue) = source
                .summarize(bookings, &vocab.amount_field, &confirmed)
                .await?
            {
                report.set_metric(keys::TOTAL_REVENUE, revenue.sum);
                report.set_metric(keys::AVERAGE_BOOKING_AMOUNT, revenue.mean);
            }
        }

        if report
            .metric_f64(keys::AVERAGE_RATING)
            .is_some_and(|rating| rating < RATING_THRESHOLD)
        {
            report
                .recommendations
                .push(LOW_RATING_RECOMMENDATION.to_string());
        }
        let cancelled = report
            .metric(keys::STATUS_DISTRIBUTION)
            .and_then(MetricValue::as_map)
            .and_then(|d| d.get(&vocab.cancelled_status))
            .and_then(MetricValue::as_i64)
            .unwrap_or(0);
        if cancelled > 0 {
            report
                .recommendations
                .push(CANCELLATION_RECOMMENDATION.to_string());
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::{ConnectRequest, MemoryDocumentStore, MemoryDriver};
    use crate::logging::LogConfig;

    async fn driver(store: MemoryDocumentStore) -> MemoryDriver {
        let driver = MemoryDriver::document(store);
        driver
            .connect(&ConnectRequest::new("memory://local"))
            .await
            .unwrap();
        driver
    }

    #[test]
    fn test_quality_score_formula() {
        assert_eq!(quality_score(10, 1, 2), 70.0);
        assert_eq!(quality_score(100, 20, 1), 70.0);
        assert_eq!(quality_score(0, 0, 0), 100.0);
        assert_eq!(quality_score(4, 4, 0), 0.0);
        assert_eq!(quality_score(4, 4, 2), -20.0);
    }

    #[test]
    fn test_field_type_union_keeps_first_seen_order() {
        let samples = vec![
            SampledDocument::from_object(
                json!({"rating": 4}).as_object().cloned().unwrap_or_default(),
            ),
            SampledDocument::from_object(
                json!({"rating": 4.5, "name": "x"})
                    .as_object()
                    .cloned()
                    .unwrap_or_default(),
            ),
        ];
        let union = field_type_union(&samples);
        assert_eq!(union["rating"], vec!["int", "float"]);
        assert_eq!(union["name"], vec!["str"]);
    }

    #[test]
    fn test_truncate_strings_nested() {
        let value = json!({"a": "abcdef", "b": ["abcdef"], "c": 1});
        let truncated = truncate_strings(&value, 3);
        assert_eq!(truncated["a"], "abc...(truncated)");
        assert_eq!(truncated["b"][0], "abc...(truncated)");
        assert_eq!(truncated["c"], 1);
    }

    #[tokio::test]
    async fn test_quality_example_score_seventy() {
        // 10 records, one with an empty name, every record missing two of
        // the expected fields.
        let mut records: Vec<Value> = (0..9)
            .map(|i| json!({"name": format!("Hotel {i}"), "rating": 4.0}))
            .collect();
        records.push(json!({"name": "", "rating": 3.0}));
        let driver =
            driver(MemoryDocumentStore::new("db").with_collection("hotels", records)).await;

        let report = DocumentQualityProcedure
            .run(
                &driver,
                &AnalysisConfig::default(),
                &AnalysisFilters::default(),
            )
            .await
            .unwrap();

        assert_eq!(
            report.container_metric("hotels", keys::SCORE),
            Some(&MetricValue::Double(70.0))
        );
        assert_eq!(report.score, Some(70.0));
        assert_eq!(
            report.container_metric("hotels", keys::NULL_RECORDS),
            Some(&MetricValue::Long(1))
        );
        assert_eq!(report.issues.len(), 2);
        assert!(report.issues[0].starts_with("hotels: Found 1 records"));
    }

    #[tokio::test]
    async fn test_quality_without_containers_scores_zero() {
        let driver = driver(MemoryDocumentStore::new("empty")).await;
        let report = DocumentQualityProcedure
            .run(
                &driver,
                &AnalysisConfig::default(),
                &AnalysisFilters::default(),
            )
            .await
            .unwrap();
        assert_eq!(report.score, Some(0.0));
        assert!(report.containers.is_empty());
    }

    #[tokio::test]
    async fn test_structure_retains_samples_and_types() {
        let records: Vec<Value> = (0..12)
            .map(|i| json!({"name": format!("Hotel {i}"), "rooms": i, "custom": true}))
            .collect();
        let driver =
            driver(MemoryDocumentStore::new("db").with_collection("hotels", records)).await;

        let report = DocumentStructureProcedure
            .run(
                &driver,
                &AnalysisConfig::default(),
                &AnalysisFilters::default(),
            )
            .await
            .unwrap();

        assert_eq!(
            report.metric(keys::DATABASE),
            Some(&MetricValue::from("db"))
        );
        assert_eq!(report.metric_i64(keys::TOTAL_RECORDS), Some(12));
        let samples = report
            .container_metric("hotels", keys::SAMPLES)
            .and_then(MetricValue::as_list)
            .unwrap();
        assert_eq!(samples.len(), 3);
        let domain = report
            .container_metric("hotels", keys::DOMAIN_FIELDS)
            .and_then(MetricValue::as_list)
            .unwrap();
        assert_eq!(domain, &[MetricValue::from("name")]);
    }

    #[tokio::test]
    async fn test_structure_honors_field_config() {
        let records = vec![json!({"title": "Harbor View Grand Hotel", "rooms": 40})];
        let driver =
            driver(MemoryDocumentStore::new("db").with_collection("hotels", records)).await;
        let config = AnalysisConfig::default()
            .with_domain_fields(["title"])
            .with_log_config(LogConfig::default().with_max_field_length(6));

        let report = DocumentStructureProcedure
            .run(&driver, &config, &AnalysisFilters::default())
            .await
            .unwrap();

        let domain = report
            .container_metric("hotels", keys::DOMAIN_FIELDS)
            .and_then(MetricValue::as_list)
            .unwrap();
        assert_eq!(domain, &[MetricValue::from("title")]);
        let samples = report
            .container_metric("hotels", keys::SAMPLES)
            .and_then(MetricValue::as_list)
            .unwrap();
        let MetricValue::Json(sample) = &samples[0] else {
            panic!("samples are stored as json");
        };
        assert_eq!(sample["title"], "Harbor...(truncated)");
        assert_eq!(sample["rooms"], 40);
    }

    #[tokio::test]
    async fn test_performance_recommends_indexes() {
        let driver = driver(
            MemoryDocumentStore::new("db").with_collection("hotels", vec![json!({"name": "a"})]),
        )
        .await;
        let report = DocumentPerformanceProcedure
            .run(
                &driver,
                &AnalysisConfig::default(),
                &AnalysisFilters::default(),
            )
            .await
            .unwrap();
        assert_eq!(report.metric_i64(keys::INDEX_COUNT), Some(0));
        assert_eq!(report.recommendations, vec![NO_INDEX_RECOMMENDATION]);
    }

    #[tokio::test]
    async fn test_business_metrics() {
        let store = MemoryDocumentStore::new("db")
            .with_collection(
                "hotels",
                vec![
                    json!({"name": "a", "rating": 3.0, "price": 100}),
                    json!({"name": "b", "rating": 4.0, "price": 300}),
                ],
            )
            .with_collection(
                "bookings",
                vec![
                    json!({"status": "confirmed", "total_amount": 200}),
                    json!({"status": "confirmed", "total_amount": 400}),
                    json!({"status": "cancelled", "total_amount": 150}),
                ],
            );
        let driver = driver(store).await;
        let report = HotelBusinessProcedure
            .run(
                &driver,
                &AnalysisConfig::default(),
                &AnalysisFilters::default(),
            )
            .await
            .unwrap();

        assert_eq!(report.metric_f64(keys::AVERAGE_RATING), Some(3.5));
        assert_eq!(report.metric_i64(keys::HOTEL_COUNT), Some(2));
        assert_eq!(report.metric_f64(keys::TOTAL_REVENUE), Some(600.0));
        assert_eq!(report.metric_f64(keys::AVERAGE_BOOKING_AMOUNT), Some(300.0));
        let range = report.metric(keys::PRICE_RANGE).and_then(MetricValue::as_map).unwrap();
        assert_eq!(range["min"], MetricValue::Double(100.0));
        assert_eq!(range["average"], MetricValue::Double(200.0));
        assert_eq!(
            report.recommendations,
            vec![LOW_RATING_RECOMMENDATION, CANCELLATION_RECOMMENDATION]
        );
    }

    #[tokio::test]
    async fn test_business_without_ratings_recommends_nothing() {
        let store = MemoryDocumentStore::new("db")
            .with_collection("hotels", vec![json!({"name": "a"})]);
        let driver = driver(store).await;
        let report = HotelBusinessProcedure
            .run(
                &driver,
                &AnalysisConfig::default(),
                &AnalysisFilters::default(),
            )
            .await
            .unwrap();
        assert!(report.metric(keys::AVERAGE_RATING).is_none());
        assert!(report.recommendations.is_empty());
    }

    #[tokio::test]
    async fn test_filters_restrict_collections() {
        let store = MemoryDocumentStore::new("db")
            .with_collection("hotels", vec![json!({"name": "a"})])
            .with_collection("bookings", vec![json!({"status": "confirmed"})]);
        let driver = driver(store).await;
        let report = DocumentStructureProcedure
            .run(
                &driver,
                &AnalysisConfig::default(),
                &AnalysisFilters::containers(["bookings"]),
            )
            .await
            .unwrap();
        assert_eq!(
            report.containers.keys().collect::<Vec<_>>(),
            vec!["bookings"]
        );
    }
}
