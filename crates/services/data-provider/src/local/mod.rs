//! Local backend: in-memory collections with optional durable mirroring.
//!
//! Reference implementation of the contract and the development/test double.
//! Each resource is a vector of records scanned linearly. When a
//! [`KeyValueStore`] is attached, a resource is read through from it on first
//! access and written through on every mutation. A mutation is applied to a
//! copy of the collection and only becomes visible once the store accepted it.

mod latency;
mod persistence;

pub use latency::{from_config as delay_from_config, DelayStrategy, FixedDelay, JitterDelay, NoDelay};
pub use persistence::{Collection, FileStore, KeyValueStore, MemoryStore};

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::debug;

use common::{AppError, AppResult, OptionExt};
use domain::{
    compare_records, is_managed_field, CreateParams, Criterion, DeleteManyParams, DeleteParams,
    GetManyParams, GetManyReferenceParams, GetOneParams, Identifier, IdsResult, ListResult, Query,
    Record, RecordResult, RecordsResult, ResourceRegistry, SearchMode, SearchScope,
    UpdateManyParams, UpdateParams, CREATED_AT_FIELD, ID_FIELD, UPDATED_AT_FIELD,
};

use crate::provider::DataProvider;

/// In-memory implementation of [`DataProvider`].
pub struct LocalProvider {
    collections: Mutex<HashMap<String, Collection>>,
    registry: ResourceRegistry,
    search_mode: SearchMode,
    delay: Arc<dyn DelayStrategy>,
    store: Option<Arc<dyn KeyValueStore>>,
}

impl Default for LocalProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalProvider {
    /// Empty provider without latency or persistence
    pub fn new() -> Self {
        Self {
            collections: Mutex::new(HashMap::new()),
            registry: ResourceRegistry::default(),
            search_mode: SearchMode::default(),
            delay: Arc::new(NoDelay),
            store: None,
        }
    }

    /// Apply resource allowlists when registered
    pub fn with_registry(mut self, registry: ResourceRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_search_mode(mut self, mode: SearchMode) -> Self {
        self.search_mode = mode;
        self
    }

    pub fn with_delay(mut self, delay: Arc<dyn DelayStrategy>) -> Self {
        self.delay = delay;
        self
    }

    /// Mirror collections into a durable store
    pub fn with_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Replace a resource's records, persisting them when a store is attached.
    pub async fn seed(&self, resource: &str, records: Vec<Record>) -> AppResult<()> {
        let mut collections = self.collections.lock().await;
        let collection = Collection::from_records(records);
        self.persist(resource, &collection).await?;
        debug!(resource, count = collection.records.len(), "Seeded local collection");
        collections.insert(resource.to_string(), collection);
        Ok(())
    }

    /// Load a collection on first access
    async fn collection<'a>(
        &self,
        collections: &'a mut HashMap<String, Collection>,
        resource: &str,
    ) -> AppResult<&'a mut Collection> {
        if !collections.contains_key(resource) {
            let collection = match &self.store {
                Some(store) => store.read(resource).await?.unwrap_or_default(),
                None => Collection::default(),
            };
            collections.insert(resource.to_string(), collection);
        }
        collections
            .get_mut(resource)
            .ok_or_else(|| AppError::internal(format!("collection {} vanished", resource)))
    }

    async fn persist(&self, resource: &str, collection: &Collection) -> AppResult<()> {
        match &self.store {
            Some(store) => store.write(resource, collection).await,
            None => Ok(()),
        }
    }

    /// Persist the modified copy, then swap it in. A failed write leaves the
    /// in-memory collection untouched.
    async fn commit(
        &self,
        resource: &str,
        current: &mut Collection,
        next: Collection,
    ) -> AppResult<()> {
        self.persist(resource, &next).await?;
        *current = next;
        Ok(())
    }

    /// Caller payload restricted to writable fields
    fn payload(&self, resource: &str, data: &Record) -> Record {
        match self.registry.get(resource) {
            Some(schema) => schema.writable(data),
            None => data
                .iter()
                .filter(|(field, _)| !is_managed_field(field))
                .map(|(field, value)| (field.clone(), value.clone()))
                .collect(),
        }
    }

    /// Stored record restricted to the readable projection
    fn project(&self, resource: &str, record: &Record) -> Record {
        match self.registry.get(resource) {
            Some(schema) => schema.project(record),
            None => record.clone(),
        }
    }

    async fn list(
        &self,
        resource: &str,
        query: &Query,
        reference: Option<(&str, &Identifier)>,
    ) -> AppResult<ListResult> {
        latency::pause(self.delay.as_ref()).await;

        let schema = self.registry.get(resource);
        if let Some(schema) = schema {
            schema.check_query(query, reference.map(|(target, _)| target))?;
        }
        let scope = match schema {
            Some(schema) => SearchScope::Fields(schema.searchable_fields()),
            None => SearchScope::AllFields,
        };
        let criterion = Criterion::for_query(query, scope, self.search_mode, reference);

        let mut collections = self.collections.lock().await;
        let collection = self.collection(&mut collections, resource).await?;

        let mut matched: Vec<&Record> = collection
            .records
            .iter()
            .filter(|r| criterion.matches(r))
            .collect();
        let total = matched.len() as u64;

        // Vec::sort_by is stable, so ties keep insertion order
        if let Some(sort) = &query.sort {
            matched.sort_by(|a, b| compare_records(a, b, &sort.field, sort.order));
        }

        let page = query.page_request();
        let data = matched
            .into_iter()
            .skip(usize::try_from(page.offset()).unwrap_or(usize::MAX))
            .take(usize::try_from(page.limit()).unwrap_or(usize::MAX))
            .map(|r| self.project(resource, r))
            .collect();

        Ok(ListResult::new(data, total, page))
    }
}

fn timestamp() -> Value {
    Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true))
}

#[async_trait]
impl DataProvider for LocalProvider {
    async fn get_list(&self, resource: &str, query: Query) -> AppResult<ListResult> {
        self.list(resource, &query, None).await
    }

    async fn get_one(&self, resource: &str, params: GetOneParams) -> AppResult<RecordResult> {
        latency::pause(self.delay.as_ref()).await;

        let mut collections = self.collections.lock().await;
        let collection = self.collection(&mut collections, resource).await?;
        let record = collection
            .find(&params.id)
            .ok_or_not_found(resource, &params.id)?;

        Ok(RecordResult {
            data: self.project(resource, record),
        })
    }

    async fn get_many(&self, resource: &str, params: GetManyParams) -> AppResult<RecordsResult> {
        latency::pause(self.delay.as_ref()).await;

        let mut collections = self.collections.lock().await;
        let collection = self.collection(&mut collections, resource).await?;
        let data = params
            .ids
            .iter()
            .filter_map(|id| collection.find(id))
            .map(|r| self.project(resource, r))
            .collect();

        Ok(RecordsResult { data })
    }

    async fn get_many_reference(
        &self,
        resource: &str,
        params: GetManyReferenceParams,
    ) -> AppResult<ListResult> {
        self.list(resource, &params.query, Some((&params.target, &params.id)))
            .await
    }

    async fn create(&self, resource: &str, params: CreateParams) -> AppResult<RecordResult> {
        latency::pause(self.delay.as_ref()).await;

        let mut record = self.payload(resource, &params.data);
        let now = timestamp();

        let mut collections = self.collections.lock().await;
        let collection = self.collection(&mut collections, resource).await?;

        let mut next = collection.clone();
        record.insert(ID_FIELD.to_string(), Value::from(next.allocate_id()));
        record.insert(CREATED_AT_FIELD.to_string(), now.clone());
        record.insert(UPDATED_AT_FIELD.to_string(), now);
        next.records.push(record.clone());
        self.commit(resource, collection, next).await?;

        Ok(RecordResult {
            data: self.project(resource, &record),
        })
    }

    async fn update(&self, resource: &str, params: UpdateParams) -> AppResult<RecordResult> {
        latency::pause(self.delay.as_ref()).await;

        let changes = self.payload(resource, &params.data);

        let mut collections = self.collections.lock().await;
        let collection = self.collection(&mut collections, resource).await?;
        let index = collection
            .position(&params.id)
            .ok_or_not_found(resource, &params.id)?;

        let mut next = collection.clone();
        let record = &mut next.records[index];
        record.extend(changes);
        record.insert(UPDATED_AT_FIELD.to_string(), timestamp());
        let updated = record.clone();
        self.commit(resource, collection, next).await?;

        Ok(RecordResult {
            data: self.project(resource, &updated),
        })
    }

    async fn update_many(&self, resource: &str, params: UpdateManyParams) -> AppResult<IdsResult> {
        latency::pause(self.delay.as_ref()).await;

        let changes = self.payload(resource, &params.data);
        let now = timestamp();

        let mut collections = self.collections.lock().await;
        let collection = self.collection(&mut collections, resource).await?;
        let mut next = collection.clone();
        for record in next.records.iter_mut() {
            let selected = record
                .get(ID_FIELD)
                .is_some_and(|v| params.ids.iter().any(|id| id.matches(v)));
            if selected {
                record.extend(changes.clone());
                record.insert(UPDATED_AT_FIELD.to_string(), now.clone());
            }
        }
        self.commit(resource, collection, next).await?;

        Ok(IdsResult { data: params.ids })
    }

    async fn delete(&self, resource: &str, params: DeleteParams) -> AppResult<RecordResult> {
        latency::pause(self.delay.as_ref()).await;

        let mut collections = self.collections.lock().await;
        let collection = self.collection(&mut collections, resource).await?;
        let index = collection
            .position(&params.id)
            .ok_or_not_found(resource, &params.id)?;

        let mut next = collection.clone();
        let removed = next.records.remove(index);
        self.commit(resource, collection, next).await?;

        Ok(RecordResult {
            data: self.project(resource, &removed),
        })
    }

    async fn delete_many(&self, resource: &str, params: DeleteManyParams) -> AppResult<IdsResult> {
        latency::pause(self.delay.as_ref()).await;

        let mut collections = self.collections.lock().await;
        let collection = self.collection(&mut collections, resource).await?;
        let mut next = collection.clone();
        next.records.retain(|record| {
            !record
                .get(ID_FIELD)
                .is_some_and(|v| params.ids.iter().any(|id| id.matches(v)))
        });
        self.commit(resource, collection, next).await?;

        Ok(IdsResult { data: params.ids })
    }
}
