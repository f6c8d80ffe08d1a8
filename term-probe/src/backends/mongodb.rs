//! MongoDB document-store driver.

use std::collections::BTreeMap;

use ::mongodb::bson::{doc, Bson, Document};
use ::mongodb::options::{ClientOptions, Credential};
use ::mongodb::{Client, Database};
use async_trait::async_trait;
use chrono::Utc;
use futures::TryStreamExt;
use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use super::document::{
    group_key, CollectionStats, DatabaseStats, DocumentSource, FieldSummary, IndexInfo,
    RecordFilter, SampledDocument,
};
use super::{BackendDriver, BackendKind, ConnectRequest, ConnectionDescriptor};
use crate::error::{ProbeError, Result};
use crate::security::redact_endpoint;

const DRIVER: &str = "mongodb";

#[derive(Clone)]
struct MongoSession {
    client: Client,
    database: String,
}

/// Driver for MongoDB deployments.
///
/// Requires the `database` connect option.
pub struct MongoDriver {
    session: RwLock<Option<MongoSession>>,
}

impl std::fmt::Debug for MongoDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MongoDriver")
            .field(
                "database",
                &self.session.read().as_ref().map(|s| s.database.clone()),
            )
            .finish_non_exhaustive()
    }
}

impl Default for MongoDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl MongoDriver {
    pub fn new() -> Self {
        Self {
            session: RwLock::new(None),
        }
    }

    fn database(&self) -> Result<Database> {
        self.session
            .read()
            .as_ref()
            .map(|s| s.client.database(&s.database))
            .ok_or_else(|| ProbeError::query(DRIVER, "session is closed"))
    }

    async fn run_command(&self, command: Document) -> Result<Document> {
        self.database()?
            .run_command(command)
            .await
            .map_err(query_error)
    }
}

fn query_error(err: ::mongodb::error::Error) -> ProbeError {
    ProbeError::query(DRIVER, err.to_string())
}

/// Reads a numeric server reply field regardless of its BSON width.
fn number(reply: &Document, key: &str) -> f64 {
    match reply.get(key) {
        Some(Bson::Int32(v)) => f64::from(*v),
        Some(Bson::Int64(v)) => *v as f64,
        Some(Bson::Double(v)) => *v,
        _ => 0.0,
    }
}

fn to_json(document: Document) -> Value {
    Bson::Document(document).into_relaxed_extjson()
}

/// Translates a [`RecordFilter`]. `None` means the filter matches nothing.
fn to_bson_filter(filter: &RecordFilter) -> Result<Option<Document>> {
    Ok(match filter {
        RecordFilter::All => Some(doc! {}),
        RecordFilter::AnyNullOrEmpty(fields) if fields.is_empty() => None,
        RecordFilter::AnyNullOrEmpty(fields) => {
            let clauses: Vec<Bson> = fields
                .iter()
                .flat_map(|f| {
                    [
                        Bson::Document(doc! { f.as_str(): { "$type": "null" } }),
                        Bson::Document(doc! { f.as_str(): "" }),
                    ]
                })
                .collect();
            Some(doc! { "$or": clauses })
        }
        RecordFilter::MissingField(field) => Some(doc! { field.as_str(): { "$exists": false } }),
        RecordFilter::FieldEquals(field, value) => {
            let value = Bson::try_from(value.clone())
                .map_err(|e| ProbeError::query(DRIVER, format!("invalid filter value: {e}")))?;
            Some(doc! { field.as_str(): value })
        }
    })
}

#[async_trait]
impl BackendDriver for MongoDriver {
    fn kind(&self) -> BackendKind {
        BackendKind::Document
    }

    fn name(&self) -> &str {
        DRIVER
    }

    #[instrument(skip(self, request), fields(endpoint = %redact_endpoint(&request.endpoint)))]
    async fn connect(&self, request: &ConnectRequest) -> Result<ConnectionDescriptor> {
        let database = request.require_option(DRIVER, "database")?.to_string();

        let mut options = ClientOptions::parse(&request.endpoint)
            .await
            .map_err(|e| {
                ProbeError::connection_with_source(DRIVER, "invalid connection string", Box::new(e))
            })?;
        if let Some(credentials) = &request.credentials {
            options.credential = Some(
                Credential::builder()
                    .username(credentials.username.clone())
                    .password(credentials.password.expose().to_string())
                    .source(request.option("auth_source").map(String::from))
                    .build(),
            );
        }

        let client = Client::with_options(options).map_err(|e| {
            ProbeError::connection_with_source(DRIVER, "failed to build client", Box::new(e))
        })?;
        let db = client.database(&database);
        db.run_command(doc! { "ping": 1 }).await.map_err(|e| {
            ProbeError::connection_with_source(DRIVER, "ping failed", Box::new(e))
        })?;

        let mut containers = db.list_collection_names().await.map_err(|e| {
            ProbeError::connection_with_source(DRIVER, "failed to list collections", Box::new(e))
        })?;
        containers.sort();

        *self.session.write() = Some(MongoSession {
            client,
            database: database.clone(),
        });

        let stats = self.stats().await.unwrap_or_default();
        debug!(database = %database, collections = containers.len(), "connected");

        Ok(ConnectionDescriptor {
            kind: Some(BackendKind::Document),
            driver: DRIVER.to_string(),
            endpoint: redact_endpoint(&request.endpoint),
            database: Some(database),
            containers,
            stats,
            connected_at: Some(Utc::now()),
        })
    }

    async fn disconnect(&self) -> Result<()> {
        let session = self.session.write().take();
        if let Some(session) = session {
            session.client.shutdown().await;
            debug!(database = %session.database, "disconnected");
        }
        Ok(())
    }

    async fn test_liveness(&self) -> bool {
        match self.run_command(doc! { "ping": 1 }).await {
            Ok(_) => true,
            Err(e) => {
                warn!(error = %e, "liveness probe failed");
                false
            }
        }
    }

    async fn list_containers(&self) -> Result<Vec<String>> {
        self.collection_names().await
    }

    async fn stats(&self) -> Result<BTreeMap<String, Value>> {
        let build = self.run_command(doc! { "buildInfo": 1 }).await?;
        let db = self.run_command(doc! { "dbStats": 1 }).await?;
        let mut stats = BTreeMap::new();
        if let Ok(version) = build.get_str("version") {
            stats.insert("version".to_string(), Value::from(version));
        }
        stats.insert(
            "collections".to_string(),
            Value::from(number(&db, "collections")),
        );
        stats.insert("objects".to_string(), Value::from(number(&db, "objects")));
        stats.insert(
            "data_size".to_string(),
            Value::from(number(&db, "dataSize")),
        );
        Ok(stats)
    }

    fn document_source(&self) -> Option<&dyn DocumentSource> {
        Some(self)
    }
}

#[async_trait]
impl DocumentSource for MongoDriver {
    fn database_name(&self) -> Option<String> {
        self.session.read().as_ref().map(|s| s.database.clone())
    }

    async fn collection_names(&self) -> Result<Vec<String>> {
        let mut names = self
            .database()?
            .list_collection_names()
            .await
            .map_err(query_error)?;
        names.sort();
        Ok(names)
    }

    async fn collection_stats(&self, collection: &str) -> Result<CollectionStats> {
        let reply = self.run_command(doc! { "collStats": collection }).await?;
        Ok(CollectionStats {
            count: number(&reply, "count") as u64,
            size: number(&reply, "size") as u64,
            avg_obj_size: number(&reply, "avgObjSize"),
        })
    }

    async fn sample(&self, collection: &str, limit: usize) -> Result<Vec<SampledDocument>> {
        let documents: Vec<Document> = self
            .database()?
            .collection::<Document>(collection)
            .find(doc! {})
            .limit(limit as i64)
            .await
            .map_err(query_error)?
            .try_collect()
            .await
            .map_err(query_error)?;

        Ok(documents
            .into_iter()
            .filter_map(|d| match to_json(d) {
                Value::Object(map) => Some(SampledDocument::from_object(map)),
                _ => None,
            })
            .collect())
    }

    async fn count(&self, collection: &str, filter: &RecordFilter) -> Result<u64> {
        let Some(filter) = to_bson_filter(filter)? else {
            return Ok(0);
        };
        self.database()?
            .collection::<Document>(collection)
            .count_documents(filter)
            .await
            .map_err(query_error)
    }

    async fn database_stats(&self) -> Result<DatabaseStats> {
        let reply = self.run_command(doc! { "dbStats": 1 }).await?;
        Ok(DatabaseStats {
            collections: number(&reply, "collections") as u64,
            data_size: number(&reply, "dataSize") as u64,
            storage_size: number(&reply, "storageSize") as u64,
            indexes: number(&reply, "indexes") as u64,
            index_size: number(&reply, "indexSize") as u64,
        })
    }

    async fn indexes(&self, collection: &str) -> Result<Vec<IndexInfo>> {
        let models: Vec<_> = self
            .database()?
            .collection::<Document>(collection)
            .list_indexes()
            .await
            .map_err(query_error)?
            .try_collect()
            .await
            .map_err(query_error)?;

        Ok(models
            .into_iter()
            .map(|model| {
                let (name, unique) = model
                    .options
                    .as_ref()
                    .map(|o| (o.name.clone(), o.unique.unwrap_or(false)))
                    .unwrap_or((None, false));
                IndexInfo {
                    name: name.unwrap_or_default(),
                    keys: to_json(model.keys),
                    unique,
                }
            })
            .collect())
    }

    async fn summarize(
        &self,
        collection: &str,
        field: &str,
        filter: &RecordFilter,
    ) -> Result<Option<FieldSummary>> {
        let Some(filter) = to_bson_filter(filter)? else {
            return Ok(None);
        };
        let path = format!("${field}");
        let pipeline = vec![
            doc! { "$match": filter },
            doc! { "$match": { field: { "$type": "number" } } },
            doc! { "$group": {
                "_id": Bson::Null,
                "count": { "$sum": 1 },
                "sum": { "$sum": path.as_str() },
                "min": { "$min": path.as_str() },
                "max": { "$max": path.as_str() },
            } },
        ];

        let groups: Vec<Document> = self
            .database()?
            .collection::<Document>(collection)
            .aggregate(pipeline)
            .await
            .map_err(query_error)?
            .try_collect()
            .await
            .map_err(query_error)?;

        Ok(groups.first().and_then(|g| {
            let count = number(g, "count") as u64;
            let sum = number(g, "sum");
            (count > 0).then(|| FieldSummary {
                count,
                sum,
                mean: sum / count as f64,
                min: number(g, "min"),
                max: number(g, "max"),
            })
        }))
    }

    async fn group_count(&self, collection: &str, field: &str) -> Result<BTreeMap<String, u64>> {
        let pipeline = vec![doc! { "$group": {
            "_id": format!("${field}"),
            "count": { "$sum": 1 },
        } }];

        let groups: Vec<Document> = self
            .database()?
            .collection::<Document>(collection)
            .aggregate(pipeline)
            .await
            .map_err(query_error)?
            .try_collect()
            .await
            .map_err(query_error)?;

        let mut counts = BTreeMap::new();
        for group in groups {
            let key = group.get("_id").cloned().map(Bson::into_relaxed_extjson);
            *counts.entry(group_key(key.as_ref())).or_insert(0) += number(&group, "count") as u64;
        }
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_filter_translation() {
        assert_eq!(to_bson_filter(&RecordFilter::All).unwrap(), Some(doc! {}));
        assert_eq!(
            to_bson_filter(&RecordFilter::AnyNullOrEmpty(vec![])).unwrap(),
            None
        );
        assert_eq!(
            to_bson_filter(&RecordFilter::MissingField("price".into())).unwrap(),
            Some(doc! { "price": { "$exists": false } })
        );
        assert_eq!(
            to_bson_filter(&RecordFilter::FieldEquals(
                "status".into(),
                json!("confirmed")
            ))
            .unwrap(),
            Some(doc! { "status": "confirmed" })
        );
    }

    #[test]
    fn test_number_widths() {
        let reply = doc! { "a": 3_i32, "b": 4_i64, "c": 2.5, "d": "x" };
        assert_eq!(number(&reply, "a"), 3.0);
        assert_eq!(number(&reply, "b"), 4.0);
        assert_eq!(number(&reply, "c"), 2.5);
        assert_eq!(number(&reply, "d"), 0.0);
        assert_eq!(number(&reply, "missing"), 0.0);
    }

    #[tokio::test]
    async fn test_requires_database_option() {
        let driver = MongoDriver::new();
        let err = driver
            .connect(&ConnectRequest::new("mongodb://localhost:27017"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProbeError::Configuration(_)));
        assert!(!driver.test_liveness().await);
    }
}
