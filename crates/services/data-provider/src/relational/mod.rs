//! Relational backend: delegates every operation to an [`OrmClient`].
//!
//! Each resource must be registered with a [`ResourceSchema`]; its name is the
//! table name and its fields form the search scope and the column allowlist
//! used for projections and writes.

mod client;
mod db;
pub mod translate;

pub use client::{FindManyArgs, OrmClient, SeaOrmClient};
pub use db::Database;

#[cfg(any(test, feature = "test-utils"))]
pub use client::MockOrmClient;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::sea_query::{Condition, Expr};
use sea_orm::DbErr;
use tracing::debug;
use uuid::Uuid;

use common::{AppError, AppResult, DatabaseConfig, OptionExt};
use domain::{
    CreateParams, Criterion, DeleteManyParams, DeleteParams, GetManyParams,
    GetManyReferenceParams, GetOneParams, Identifier, IdsResult, ListResult, Query, RecordResult,
    RecordsResult, ResourceRegistry, ResourceSchema, SearchMode, SearchScope, UpdateManyParams,
    UpdateParams, CREATED_AT_FIELD, ID_FIELD, UPDATED_AT_FIELD,
};

use crate::provider::{operation, DataProvider};
use translate::Assignments;

/// SQL-backed implementation of [`DataProvider`].
pub struct RelationalProvider {
    client: Arc<dyn OrmClient>,
    registry: ResourceRegistry,
    search_mode: SearchMode,
}

impl RelationalProvider {
    pub fn new(client: Arc<dyn OrmClient>, registry: ResourceRegistry) -> Self {
        Self {
            client,
            registry,
            search_mode: SearchMode::default(),
        }
    }

    pub fn with_search_mode(mut self, mode: SearchMode) -> Self {
        self.search_mode = mode;
        self
    }

    /// Connect to the configured database and check it answers
    pub async fn connect(config: &DatabaseConfig, registry: ResourceRegistry) -> AppResult<Self> {
        let database = Database::connect(config)
            .await
            .map_err(|e| AppError::configuration(format!("database connection failed: {}", e)))?;
        database
            .ping()
            .await
            .map_err(|e| AppError::configuration(format!("database unreachable: {}", e)))?;
        Ok(Self::new(
            Arc::new(SeaOrmClient::new(database.get_connection())),
            registry,
        ))
    }

    fn schema(&self, resource: &str) -> AppResult<&ResourceSchema> {
        self.registry
            .get(resource)
            .ok_or_else(|| AppError::UnknownResource(resource.to_string()))
    }

    async fn list(
        &self,
        resource: &str,
        query: &Query,
        reference: Option<(&str, &Identifier)>,
        operation: &str,
    ) -> AppResult<ListResult> {
        let schema = self.schema(resource)?;
        schema.check_query(query, reference.map(|(target, _)| target))?;
        let criterion = Criterion::for_query(
            query,
            SearchScope::Fields(schema.searchable_fields()),
            self.search_mode,
            reference,
        );
        let condition = translate::where_clause(&criterion);
        let page = query.page_request();

        // LIMIT and OFFSET are signed 64-bit on every supported database
        let bound = |n: u64| n.min(i64::MAX as u64);
        let args = FindManyArgs {
            condition: condition.clone(),
            order_by: translate::order_by(query.sort.as_ref()),
            select: schema.projection(),
            skip: Some(bound(page.offset())),
            take: Some(bound(page.limit())),
        };

        // Page and total are independent reads
        let (data, total) = tokio::try_join!(
            self.client.find_many(resource, args),
            self.client.count(resource, condition),
        )
        .map_err(|e| failed(resource, operation, e))?;

        debug!(resource, total, returned = data.len(), "Listed rows");
        Ok(ListResult::new(data, total, page))
    }
}

fn failed(resource: &str, operation: &str, error: DbErr) -> AppError {
    AppError::backend(resource, operation, error)
}

fn stamped(schema: &ResourceSchema, data: &domain::Record, fields: &[&str]) -> Assignments {
    let mut assignments = translate::assignments(&schema.writable(data));
    let now = Utc::now();
    for field in fields {
        assignments.push((field.to_string(), Expr::value(now)));
    }
    assignments
}

#[async_trait]
impl DataProvider for RelationalProvider {
    async fn get_list(&self, resource: &str, query: Query) -> AppResult<ListResult> {
        self.list(resource, &query, None, operation::GET_LIST).await
    }

    async fn get_one(&self, resource: &str, params: GetOneParams) -> AppResult<RecordResult> {
        let schema = self.schema(resource)?;
        let data = self
            .client
            .find_unique(resource, &params.id, &schema.projection())
            .await
            .map_err(|e| failed(resource, operation::GET_ONE, e))?
            .ok_or_not_found(resource, &params.id)?;

        Ok(RecordResult { data })
    }

    async fn get_many(&self, resource: &str, params: GetManyParams) -> AppResult<RecordsResult> {
        let schema = self.schema(resource)?;
        if params.ids.is_empty() {
            return Ok(RecordsResult { data: Vec::new() });
        }

        let args = FindManyArgs::new(
            Condition::all().add(translate::id_in(&params.ids)),
            schema.projection(),
        );
        let rows = self
            .client
            .find_many(resource, args)
            .await
            .map_err(|e| failed(resource, operation::GET_MANY, e))?;

        // Answer in the order the ids were asked for
        let mut by_id: HashMap<Identifier, domain::Record> = rows
            .into_iter()
            .filter_map(|row| Identifier::of(&row).map(|id| (id, row)))
            .collect();
        let data = params
            .ids
            .iter()
            .filter_map(|id| by_id.remove(id))
            .collect();

        Ok(RecordsResult { data })
    }

    async fn get_many_reference(
        &self,
        resource: &str,
        params: GetManyReferenceParams,
    ) -> AppResult<ListResult> {
        self.list(
            resource,
            &params.query,
            Some((&params.target, &params.id)),
            operation::GET_MANY_REFERENCE,
        )
        .await
    }

    async fn create(&self, resource: &str, params: CreateParams) -> AppResult<RecordResult> {
        let schema = self.schema(resource)?;
        let id = Identifier::new(Uuid::new_v4().to_string());

        let mut assignments = stamped(
            schema,
            &params.data,
            &[CREATED_AT_FIELD, UPDATED_AT_FIELD],
        );
        assignments.insert(0, (ID_FIELD.to_string(), Expr::value(id.as_str())));

        let data = self
            .client
            .create(resource, &id, assignments, &schema.projection())
            .await
            .map_err(|e| failed(resource, operation::CREATE, e))?;

        debug!(resource, id = %id, "Inserted row");
        Ok(RecordResult { data })
    }

    async fn update(&self, resource: &str, params: UpdateParams) -> AppResult<RecordResult> {
        let schema = self.schema(resource)?;
        let assignments = stamped(schema, &params.data, &[UPDATED_AT_FIELD]);

        let data = self
            .client
            .update(resource, &params.id, assignments, &schema.projection())
            .await
            .map_err(|e| failed(resource, operation::UPDATE, e))?
            .ok_or_not_found(resource, &params.id)?;

        Ok(RecordResult { data })
    }

    async fn update_many(&self, resource: &str, params: UpdateManyParams) -> AppResult<IdsResult> {
        let schema = self.schema(resource)?;
        let assignments = stamped(schema, &params.data, &[UPDATED_AT_FIELD]);

        let affected = self
            .client
            .update_many(resource, &params.ids, assignments)
            .await
            .map_err(|e| failed(resource, operation::UPDATE_MANY, e))?;

        debug!(resource, requested = params.ids.len(), affected, "Updated rows");
        Ok(IdsResult { data: params.ids })
    }

    async fn delete(&self, resource: &str, params: DeleteParams) -> AppResult<RecordResult> {
        let schema = self.schema(resource)?;
        let data = self
            .client
            .delete(resource, &params.id, &schema.projection())
            .await
            .map_err(|e| failed(resource, operation::DELETE, e))?
            .ok_or_not_found(resource, &params.id)?;

        Ok(RecordResult { data })
    }

    async fn delete_many(&self, resource: &str, params: DeleteManyParams) -> AppResult<IdsResult> {
        self.schema(resource)?;
        let affected = self
            .client
            .delete_many(resource, &params.ids)
            .await
            .map_err(|e| failed(resource, operation::DELETE_MANY, e))?;

        debug!(resource, requested = params.ids.len(), affected, "Deleted rows");
        Ok(IdsResult { data: params.ids })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn registry() -> ResourceRegistry {
        ResourceRegistry::new().register(ResourceSchema::new("users", ["name", "email"]))
    }

    fn provider(client: MockOrmClient) -> RelationalProvider {
        RelationalProvider::new(Arc::new(client), registry())
    }

    fn row(value: serde_json::Value) -> domain::Record {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_unregistered_resource_is_rejected() {
        let provider = provider(MockOrmClient::new());
        let err = provider.get_list("posts", Query::new()).await.unwrap_err();
        assert_eq!(err, AppError::UnknownResource("posts".to_string()));
    }

    #[tokio::test]
    async fn test_get_list_pages_and_counts() {
        let mut client = MockOrmClient::new();
        client
            .expect_find_many()
            .withf(|table, args| {
                table == "users"
                    && args.skip == Some(10)
                    && args.take == Some(10)
                    && args.select == vec!["id", "name", "email", "createdAt", "updatedAt"]
            })
            .times(1)
            .returning(|_, _| Ok(vec![row(json!({ "id": "a", "name": "Ann" }))]));
        client
            .expect_count()
            .times(1)
            .returning(|_, _| Ok(11));

        let result = provider(client)
            .get_list("users", Query::new().paginate(2, 10))
            .await
            .unwrap();

        assert_eq!(result.total, 11);
        assert_eq!(result.total_pages, 2);
        assert_eq!(result.data.len(), 1);
    }

    #[tokio::test]
    async fn test_huge_pages_are_bounded_for_sql() {
        let mut client = MockOrmClient::new();
        client
            .expect_find_many()
            .withf(|_, args| {
                args.skip == Some(i64::MAX as u64) && args.take == Some(i64::MAX as u64)
            })
            .times(1)
            .returning(|_, _| Ok(vec![]));
        client.expect_count().returning(|_, _| Ok(3));

        let result = provider(client)
            .get_list("users", Query::new().paginate(i64::MAX, i64::MAX))
            .await
            .unwrap();
        assert!(result.data.is_empty());
        assert_eq!(result.total, 3);
    }

    #[tokio::test]
    async fn test_unlisted_query_fields_never_reach_the_client() {
        // No expectations: any client call would panic
        let provider = provider(MockOrmClient::new());

        let err = provider
            .get_list("users", Query::new().filter_by("color", "red"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");

        let err = provider
            .get_list("users", Query::new().sort_by("password", domain::SortOrder::Asc))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");

        let err = provider
            .get_many_reference(
                "users",
                GetManyReferenceParams {
                    target: "teamId".to_string(),
                    id: "1".into(),
                    query: Query::new(),
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_backend_failure_is_wrapped() {
        let mut client = MockOrmClient::new();
        client
            .expect_find_many()
            .returning(|_, _| Err(DbErr::Custom("connection reset".into())));
        client.expect_count().returning(|_, _| Ok(0));

        let err = provider(client)
            .get_list("users", Query::new())
            .await
            .unwrap_err();

        assert_eq!(err.code(), "BACKEND_OPERATION_FAILED");
        assert!(err.to_string().contains("getList on users failed"));
        assert!(err.to_string().contains("connection reset"));
    }

    #[tokio::test]
    async fn test_create_assigns_uuid_and_timestamps() {
        let mut client = MockOrmClient::new();
        client
            .expect_create()
            .withf(|_, id, data, _| {
                let columns: Vec<&str> = data.iter().map(|(c, _)| c.as_str()).collect();
                Uuid::parse_str(id.as_str()).is_ok()
                    && columns == vec!["id", "name", "createdAt", "updatedAt"]
            })
            .times(1)
            .returning(|_, id, _, _| Ok(row(json!({ "id": id.as_str(), "name": "Ann" }))));

        let result = provider(client)
            .create(
                "users",
                CreateParams {
                    data: row(json!({ "name": "Ann", "id": "forged", "role": "root" })),
                },
            )
            .await
            .unwrap();

        assert_ne!(result.data["id"], json!("forged"));
    }

    #[tokio::test]
    async fn test_missing_rows_are_not_found() {
        let mut client = MockOrmClient::new();
        client.expect_find_unique().returning(|_, _, _| Ok(None));
        client.expect_update().returning(|_, _, _, _| Ok(None));
        client.expect_delete().returning(|_, _, _| Ok(None));
        let provider = provider(client);

        let err = provider
            .get_one("users", GetOneParams { id: "x".into() })
            .await
            .unwrap_err();
        assert!(err.is_not_found());

        let err = provider
            .update(
                "users",
                UpdateParams {
                    id: "x".into(),
                    data: row(json!({ "name": "B" })),
                    previous_data: None,
                },
            )
            .await
            .unwrap_err();
        assert!(err.is_not_found());

        let err = provider
            .delete(
                "users",
                DeleteParams {
                    id: "x".into(),
                    previous_data: None,
                },
            )
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_get_many_keeps_requested_order() {
        let mut client = MockOrmClient::new();
        client.expect_find_many().returning(|_, _| {
            Ok(vec![
                row(json!({ "id": "a", "name": "Ann" })),
                row(json!({ "id": "c", "name": "Cid" })),
            ])
        });

        let result = provider(client)
            .get_many(
                "users",
                GetManyParams {
                    ids: vec!["c".into(), "b".into(), "a".into()],
                },
            )
            .await
            .unwrap();

        let ids: Vec<&serde_json::Value> = result.data.iter().map(|r| &r["id"]).collect();
        assert_eq!(ids, vec![&json!("c"), &json!("a")]);
    }
}
