//! The data provider contract.

use std::sync::Arc;

use async_trait::async_trait;

use common::AppResult;
use domain::{
    CreateParams, DeleteManyParams, DeleteParams, GetManyParams, GetManyReferenceParams,
    GetOneParams, IdsResult, ListResult, Query, RecordResult, RecordsResult, UpdateManyParams,
    UpdateParams,
};

#[cfg(any(test, feature = "test-utils"))]
use mockall::automock;

/// Backend-agnostic access to resources.
///
/// Every backend implements all nine operations with the same observable
/// semantics. Decorators implement it too, wrapping another provider.
#[cfg_attr(any(test, feature = "test-utils"), automock)]
#[async_trait]
pub trait DataProvider: Send + Sync {
    /// Filtered, sorted, paginated list
    async fn get_list(&self, resource: &str, query: Query) -> AppResult<ListResult>;

    /// Single record by id
    async fn get_one(&self, resource: &str, params: GetOneParams) -> AppResult<RecordResult>;

    /// Records for a set of ids; unknown ids are omitted
    async fn get_many(&self, resource: &str, params: GetManyParams) -> AppResult<RecordsResult>;

    /// `get_list` restricted to records referencing another record
    async fn get_many_reference(
        &self,
        resource: &str,
        params: GetManyReferenceParams,
    ) -> AppResult<ListResult>;

    /// Insert a record; the backend assigns `id` and timestamps
    async fn create(&self, resource: &str, params: CreateParams) -> AppResult<RecordResult>;

    /// Merge fields into an existing record
    async fn update(&self, resource: &str, params: UpdateParams) -> AppResult<RecordResult>;

    /// Merge fields into several records
    async fn update_many(&self, resource: &str, params: UpdateManyParams) -> AppResult<IdsResult>;

    /// Remove a record, returning it
    async fn delete(&self, resource: &str, params: DeleteParams) -> AppResult<RecordResult>;

    /// Remove several records
    async fn delete_many(&self, resource: &str, params: DeleteManyParams) -> AppResult<IdsResult>;
}

/// Shared, type-erased provider
pub type SharedProvider = Arc<dyn DataProvider>;

/// Operation names as they appear in logs, cache keys and errors.
pub mod operation {
    pub const GET_LIST: &str = "getList";
    pub const GET_ONE: &str = "getOne";
    pub const GET_MANY: &str = "getMany";
    pub const GET_MANY_REFERENCE: &str = "getManyReference";
    pub const CREATE: &str = "create";
    pub const UPDATE: &str = "update";
    pub const UPDATE_MANY: &str = "updateMany";
    pub const DELETE: &str = "delete";
    pub const DELETE_MANY: &str = "deleteMany";
}
