//! Call logging decorator.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde::Serialize;
use tower::Layer;
use tracing::{info, warn};

use common::AppResult;
use domain::{
    CreateParams, DeleteManyParams, DeleteParams, GetManyParams, GetManyReferenceParams,
    GetOneParams, IdsResult, Identifier, ListResult, Query, RecordResult, RecordsResult,
    UpdateManyParams, UpdateParams,
};

use crate::provider::{operation, DataProvider, SharedProvider};

/// One-line description of a result for the completion event.
trait Summary {
    fn summary(&self) -> String;
}

impl Summary for ListResult {
    fn summary(&self) -> String {
        format!(
            "{} of {} records (page {}/{})",
            self.data.len(),
            self.total,
            self.page,
            self.total_pages
        )
    }
}

impl Summary for RecordResult {
    fn summary(&self) -> String {
        match Identifier::of(&self.data) {
            Some(id) => format!("record {}", id),
            None => "record".to_string(),
        }
    }
}

impl Summary for RecordsResult {
    fn summary(&self) -> String {
        format!("{} records", self.data.len())
    }
}

impl Summary for IdsResult {
    fn summary(&self) -> String {
        format!("{} ids", self.data.len())
    }
}

/// A dispatched call, logged on creation and on completion.
struct Call<'a> {
    operation: &'static str,
    resource: &'a str,
    started: Instant,
}

impl<'a> Call<'a> {
    fn start<P: Serialize>(operation: &'static str, resource: &'a str, params: &P) -> Self {
        let params = serde_json::to_string(params).unwrap_or_else(|e| format!("<{}>", e));
        info!(operation, resource, %params, "Data provider call");
        Self {
            operation,
            resource,
            started: Instant::now(),
        }
    }

    /// Log the outcome and hand the result back untouched
    fn finish<T: Summary>(self, result: AppResult<T>) -> AppResult<T> {
        let elapsed_ms = self.started.elapsed().as_millis() as u64;
        match &result {
            Ok(value) => info!(
                operation = self.operation,
                resource = self.resource,
                elapsed_ms,
                result = %value.summary(),
                "Data provider call succeeded"
            ),
            Err(e) => warn!(
                operation = self.operation,
                resource = self.resource,
                elapsed_ms,
                code = e.code(),
                error = %e,
                "Data provider call failed"
            ),
        }
        result
    }
}

/// Logs every operation before dispatch and after resolution.
pub struct LoggingProvider {
    inner: SharedProvider,
}

impl LoggingProvider {
    pub fn new(inner: SharedProvider) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl DataProvider for LoggingProvider {
    async fn get_list(&self, resource: &str, query: Query) -> AppResult<ListResult> {
        let call = Call::start(operation::GET_LIST, resource, &query);
        call.finish(self.inner.get_list(resource, query).await)
    }

    async fn get_one(&self, resource: &str, params: GetOneParams) -> AppResult<RecordResult> {
        let call = Call::start(operation::GET_ONE, resource, &params);
        call.finish(self.inner.get_one(resource, params).await)
    }

    async fn get_many(&self, resource: &str, params: GetManyParams) -> AppResult<RecordsResult> {
        let call = Call::start(operation::GET_MANY, resource, &params);
        call.finish(self.inner.get_many(resource, params).await)
    }

    async fn get_many_reference(
        &self,
        resource: &str,
        params: GetManyReferenceParams,
    ) -> AppResult<ListResult> {
        let call = Call::start(operation::GET_MANY_REFERENCE, resource, &params);
        call.finish(self.inner.get_many_reference(resource, params).await)
    }

    async fn create(&self, resource: &str, params: CreateParams) -> AppResult<RecordResult> {
        let call = Call::start(operation::CREATE, resource, &params);
        call.finish(self.inner.create(resource, params).await)
    }

    async fn update(&self, resource: &str, params: UpdateParams) -> AppResult<RecordResult> {
        let call = Call::start(operation::UPDATE, resource, &params);
        call.finish(self.inner.update(resource, params).await)
    }

    async fn update_many(&self, resource: &str, params: UpdateManyParams) -> AppResult<IdsResult> {
        let call = Call::start(operation::UPDATE_MANY, resource, &params);
        call.finish(self.inner.update_many(resource, params).await)
    }

    async fn delete(&self, resource: &str, params: DeleteParams) -> AppResult<RecordResult> {
        let call = Call::start(operation::DELETE, resource, &params);
        call.finish(self.inner.delete(resource, params).await)
    }

    async fn delete_many(&self, resource: &str, params: DeleteManyParams) -> AppResult<IdsResult> {
        let call = Call::start(operation::DELETE_MANY, resource, &params);
        call.finish(self.inner.delete_many(resource, params).await)
    }
}

/// [`Layer`] producing [`LoggingProvider`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingLayer;

impl LoggingLayer {
    pub fn new() -> Self {
        Self
    }
}

impl Layer<SharedProvider> for LoggingLayer {
    type Service = SharedProvider;

    fn layer(&self, inner: SharedProvider) -> SharedProvider {
        Arc::new(LoggingProvider::new(inner))
    }
}
