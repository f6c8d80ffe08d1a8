//! In-process backend driver.
//!
//! [`MemoryDriver`] serves a [`MemoryDocumentStore`] through the same
//! [`BackendDriver`] and [`DocumentSource`] interfaces as the network drivers.
//! It can impersonate any [`BackendKind`] and supports fault and latency
//! injection, so every analysis path can run without a live database.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use serde_json::{Map, Value};
use tracing::debug;

use super::document::{
    group_key, CollectionStats, DatabaseStats, DocumentSource, FieldSummary, IndexInfo,
    RecordFilter, SampledDocument,
};
use super::{BackendDriver, BackendKind, ConnectRequest, ConnectionDescriptor, DriverFactory};
use crate::error::{ProbeError, Result};
use crate::security::redact_endpoint;

/// Approximate on-disk size charged per index.
const INDEX_PAGE_BYTES: u64 = 4096;

/// Collections of JSON records held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryDocumentStore {
    database: String,
    collections: BTreeMap<String, Vec<Map<String, Value>>>,
    indexes: BTreeMap<String, Vec<IndexInfo>>,
    storage_size: Option<u64>,
}

impl MemoryDocumentStore {
    pub fn new(database: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            ..Default::default()
        }
    }

    /// Adds a collection. Non-object values are ignored.
    pub fn with_collection<I>(mut self, name: impl Into<String>, records: I) -> Self
    where
        I: IntoIterator<Item = Value>,
    {
        let name = name.into();
        let entry = self.collections.entry(name).or_default();
        entry.extend(records.into_iter().filter_map(|v| match v {
            Value::Object(map) => Some(map),
            _ => None,
        }));
        self
    }

    pub fn with_index(mut self, collection: impl Into<String>, index: IndexInfo) -> Self {
        self.indexes.entry(collection.into()).or_default().push(index);
        self
    }

    /// Overrides the reported storage size. Defaults to the data size.
    pub fn with_storage_size(mut self, bytes: u64) -> Self {
        self.storage_size = Some(bytes);
        self
    }

    /// Appends one record, creating the collection if needed.
    pub fn insert(&mut self, collection: &str, record: Value) {
        if let Value::Object(map) = record {
            self.collections
                .entry(collection.to_string())
                .or_default()
                .push(map);
        }
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn collection_names(&self) -> Vec<String> {
        self.collections.keys().cloned().collect()
    }

    fn records(&self, collection: &str) -> &[Map<String, Value>] {
        self.collections
            .get(collection)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    fn record_count(&self) -> u64 {
        self.collections.values().map(|c| c.len() as u64).sum()
    }

    fn collection_size(&self, collection: &str) -> u64 {
        self.records(collection)
            .iter()
            .map(|r| Value::Object(r.clone()).to_string().len() as u64)
            .sum()
    }

    fn data_size(&self) -> u64 {
        self.collections
            .keys()
            .map(|name| self.collection_size(name))
            .sum()
    }

    fn index_count(&self) -> u64 {
        self.indexes.values().map(|i| i.len() as u64).sum()
    }
}

/// Driver operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryOperation {
    Connect,
    ListContainers,
    Stats,
    CollectionStats,
    Sample,
    Count,
    DatabaseStats,
    Indexes,
    Summarize,
    GroupCount,
}

/// Backend driver over a [`MemoryDocumentStore`].
#[derive(Debug)]
pub struct MemoryDriver {
    kind: BackendKind,
    store: Arc<RwLock<MemoryDocumentStore>>,
    connected: AtomicBool,
    failures: RwLock<HashSet<MemoryOperation>>,
    latency: RwLock<Option<Duration>>,
    connects: AtomicUsize,
    disconnects: AtomicUsize,
}

impl MemoryDriver {
    pub fn new(kind: BackendKind, store: MemoryDocumentStore) -> Self {
        Self {
            kind,
            store: Arc::new(RwLock::new(store)),
            connected: AtomicBool::new(false),
            failures: RwLock::new(HashSet::new()),
            latency: RwLock::new(None),
            connects: AtomicUsize::new(0),
            disconnects: AtomicUsize::new(0),
        }
    }

    /// A document-store driver over `store`.
    pub fn document(store: MemoryDocumentStore) -> Self {
        Self::new(BackendKind::Document, store)
    }

    /// Makes every subsequent call of `operation` fail.
    pub fn fail_on(&self, operation: MemoryOperation) {
        self.failures.write().insert(operation);
    }

    /// Clears all injected failures.
    pub fn heal(&self) {
        self.failures.write().clear();
    }

    /// Delays every data operation by `latency`.
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.write() = latency;
    }

    /// Shared handle to the underlying store.
    pub fn store(&self) -> Arc<RwLock<MemoryDocumentStore>> {
        Arc::clone(&self.store)
    }

    pub fn is_open(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Number of successful connects.
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Number of disconnects that closed an open session.
    pub fn disconnect_count(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    fn check(&self, operation: MemoryOperation) -> Result<()> {
        if self.failures.read().contains(&operation) {
            return Err(ProbeError::query(
                "memory",
                format!("injected failure in {operation:?}"),
            ));
        }
        Ok(())
    }

    async fn enter(&self, operation: MemoryOperation) -> Result<()> {
        if !self.is_open() {
            return Err(ProbeError::query("memory", "session is closed"));
        }
        let latency = *self.latency.read();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        self.check(operation)
    }
}

#[async_trait]
impl BackendDriver for MemoryDriver {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    fn name(&self) -> &str {
        "memory"
    }

    async fn connect(&self, request: &ConnectRequest) -> Result<ConnectionDescriptor> {
        if self.failures.read().contains(&MemoryOperation::Connect) {
            return Err(ProbeError::connection("memory", "connection refused"));
        }

        let store = self.store.read();
        let database = match self.kind {
            BackendKind::Document => Some(
                request
                    .option("database")
                    .map(String::from)
                    .unwrap_or_else(|| store.database.clone()),
            ),
            BackendKind::WideColumn => Some(request.require_keyspace("memory")?.to_string()),
            BackendKind::KeyValue | BackendKind::SearchIndex => None,
        };

        let mut stats = BTreeMap::new();
        stats.insert(
            "containers".to_string(),
            Value::from(store.collections.len() as u64),
        );
        stats.insert("records".to_string(), Value::from(store.record_count()));

        let descriptor = ConnectionDescriptor {
            kind: Some(self.kind),
            driver: self.name().to_string(),
            endpoint: redact_endpoint(&request.endpoint),
            database,
            containers: store.collection_names(),
            stats,
            connected_at: Some(Utc::now()),
        };
        drop(store);

        self.connected.store(true, Ordering::SeqCst);
        self.connects.fetch_add(1, Ordering::SeqCst);
        debug!(kind = %self.kind, "memory driver connected");
        Ok(descriptor)
    }

    async fn disconnect(&self) -> Result<()> {
        if self.connected.swap(false, Ordering::SeqCst) {
            self.disconnects.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn test_liveness(&self) -> bool {
        self.is_open()
    }

    async fn list_containers(&self) -> Result<Vec<String>> {
        self.enter(MemoryOperation::ListContainers).await?;
        Ok(self.store.read().collection_names())
    }

    async fn stats(&self) -> Result<BTreeMap<String, Value>> {
        self.enter(MemoryOperation::Stats).await?;
        let store = self.store.read();
        let mut stats = BTreeMap::new();
        stats.insert(
            "containers".to_string(),
            Value::from(store.collections.len() as u64),
        );
        stats.insert("records".to_string(), Value::from(store.record_count()));
        stats.insert("data_size".to_string(), Value::from(store.data_size()));
        Ok(stats)
    }

    fn document_source(&self) -> Option<&dyn DocumentSource> {
        match self.kind {
            BackendKind::Document => Some(self),
            _ => None,
        }
    }
}

#[async_trait]
impl DocumentSource for MemoryDriver {
    fn database_name(&self) -> Option<String> {
        Some(self.store.read().database.clone())
    }

    async fn collection_names(&self) -> Result<Vec<String>> {
        self.enter(MemoryOperation::ListContainers).await?;
        Ok(self.store.read().collection_names())
    }

    async fn collection_stats(&self, collection: &str) -> Result<CollectionStats> {
        self.enter(MemoryOperation::CollectionStats).await?;
        let store = self.store.read();
        let count = store.records(collection).len() as u64;
        let size = store.collection_size(collection);
        let avg_obj_size = if count > 0 {
            size as f64 / count as f64
        } else {
            0.0
        };
        Ok(CollectionStats {
            count,
            size,
            avg_obj_size,
        })
    }

    async fn sample(&self, collection: &str, limit: usize) -> Result<Vec<SampledDocument>> {
        self.enter(MemoryOperation::Sample).await?;
        let store = self.store.read();
        Ok(store
            .records(collection)
            .iter()
            .take(limit)
            .cloned()
            .map(SampledDocument::from_object)
            .collect())
    }

    async fn count(&self, collection: &str, filter: &RecordFilter) -> Result<u64> {
        self.enter(MemoryOperation::Count).await?;
        let store = self.store.read();
        Ok(store
            .records(collection)
            .iter()
            .filter(|r| filter.matches(r))
            .count() as u64)
    }

    async fn database_stats(&self) -> Result<DatabaseStats> {
        self.enter(MemoryOperation::DatabaseStats).await?;
        let store = self.store.read();
        let data_size = store.data_size();
        let indexes = store.index_count();
        Ok(DatabaseStats {
            collections: store.collections.len() as u64,
            data_size,
            storage_size: store.storage_size.unwrap_or(data_size),
            indexes,
            index_size: indexes * INDEX_PAGE_BYTES,
        })
    }

    async fn indexes(&self, collection: &str) -> Result<Vec<IndexInfo>> {
        self.enter(MemoryOperation::Indexes).await?;
        Ok(self
            .store
            .read()
            .indexes
            .get(collection)
            .cloned()
            .unwrap_or_default())
    }

    async fn summarize(
        &self,
        collection: &str,
        field: &str,
        filter: &RecordFilter,
    ) -> Result<Option<FieldSummary>> {
        self.enter(MemoryOperation::Summarize).await?;
        let store = self.store.read();
        Ok(FieldSummary::from_values(
            store
                .records(collection)
                .iter()
                .filter(|r| filter.matches(r))
                .filter_map(|r| r.get(field).and_then(Value::as_f64)),
        ))
    }

    async fn group_count(&self, collection: &str, field: &str) -> Result<BTreeMap<String, u64>> {
        self.enter(MemoryOperation::GroupCount).await?;
        let store = self.store.read();
        let mut groups = BTreeMap::new();
        for record in store.records(collection) {
            *groups.entry(group_key(record.get(field))).or_insert(0) += 1;
        }
        Ok(groups)
    }
}

/// Factory handing out [`MemoryDriver`]s.
///
/// Drivers registered with [`MemoryDriverFactory::with_driver`] are returned
/// for their kind; other kinds get a fresh driver over an empty store unless
/// marked unsupported.
#[derive(Debug, Default)]
pub struct MemoryDriverFactory {
    drivers: Mutex<HashMap<BackendKind, Arc<MemoryDriver>>>,
    unsupported: HashSet<BackendKind>,
}

impl MemoryDriverFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_driver(self, driver: Arc<MemoryDriver>) -> Self {
        self.drivers.lock().insert(driver.kind(), driver);
        self
    }

    /// Makes `create` reject `kind` as if its feature were disabled.
    pub fn without_kind(mut self, kind: BackendKind) -> Self {
        self.unsupported.insert(kind);
        self
    }

    /// The driver most recently handed out for `kind`.
    pub fn driver(&self, kind: BackendKind) -> Option<Arc<MemoryDriver>> {
        self.drivers.lock().get(&kind).cloned()
    }
}

impl DriverFactory for MemoryDriverFactory {
    fn create(&self, kind: BackendKind) -> Result<Arc<dyn BackendDriver>> {
        if self.unsupported.contains(&kind) {
            return Err(ProbeError::unsupported_backend(kind.driver_name()));
        }
        let driver = self
            .drivers
            .lock()
            .entry(kind)
            .or_insert_with(|| {
                Arc::new(MemoryDriver::new(kind, MemoryDocumentStore::new("memory")))
            })
            .clone();
        Ok(driver)
    }
}
