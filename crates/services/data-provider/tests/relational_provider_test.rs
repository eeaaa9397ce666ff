//! Relational backend integration tests against a throwaway SQLite database.

use std::sync::Arc;

use sea_orm::ConnectionTrait;
use serde_json::{json, Value};
use tempfile::TempDir;

use common::{AppError, DatabaseConfig};
use data_provider::relational::Database;
use data_provider::{DataProvider, RelationalProvider, SeaOrmClient};
use domain::{
    CreateParams, DeleteManyParams, DeleteParams, GetManyParams, GetManyReferenceParams,
    GetOneParams, Identifier, Query, Record, ResourceRegistry, ResourceSchema, SortOrder,
    UpdateManyParams, UpdateParams,
};

const SCHEMA: &str = r#"
CREATE TABLE products (
    id TEXT PRIMARY KEY NOT NULL,
    name TEXT,
    category TEXT,
    price REAL,
    cost REAL,
    "vendorId" TEXT,
    "createdAt" TEXT,
    "updatedAt" TEXT
)"#;

struct TestDb {
    provider: RelationalProvider,
    // Keeps the database file alive for the test
    _dir: TempDir,
}

async fn setup() -> TestDb {
    let dir = tempfile::tempdir().unwrap();
    let config = DatabaseConfig {
        url: format!("sqlite://{}?mode=rwc", dir.path().join("test.db").display()),
        max_connections: 4,
        min_connections: 1,
    };
    let db = Database::connect(&config).await.unwrap();
    db.ping().await.unwrap();
    db.connection().execute_unprepared(SCHEMA).await.unwrap();

    let registry = ResourceRegistry::new().register(ResourceSchema::new(
        "products",
        ["name", "category", "price", "vendorId"],
    ));
    let provider =
        RelationalProvider::new(Arc::new(SeaOrmClient::new(db.get_connection())), registry);

    TestDb {
        provider,
        _dir: dir,
    }
}

fn record(value: Value) -> Record {
    value.as_object().cloned().expect("record literal must be an object")
}

async fn create(provider: &RelationalProvider, data: Value) -> Record {
    provider
        .create("products", CreateParams { data: record(data) })
        .await
        .unwrap()
        .data
}

async fn catalog(provider: &RelationalProvider) -> Vec<Record> {
    vec![
        create(provider, json!({ "name": "Hammer", "category": "tools", "price": 20, "vendorId": "v1" })).await,
        create(provider, json!({ "name": "Saw", "category": "tools", "price": 30, "vendorId": "v2" })).await,
        create(provider, json!({ "name": "Glue 50% extra", "category": "supplies", "price": 10, "vendorId": "v1" })).await,
    ]
}

fn names(records: &[Record]) -> Vec<&str> {
    records
        .iter()
        .map(|r| r["name"].as_str().unwrap_or_default())
        .collect()
}

#[tokio::test]
async fn test_create_round_trip() {
    let db = setup().await;
    let created = create(
        &db.provider,
        json!({ "name": "Widget", "price": 5, "secret": "dropped", "id": "forged" }),
    )
    .await;

    let id = Identifier::of(&created).unwrap();
    assert_ne!(id.as_str(), "forged");
    assert!(uuid::Uuid::parse_str(id.as_str()).is_ok());
    assert!(!created.contains_key("secret"));
    assert!(created["createdAt"].is_string());

    let fetched = db
        .provider
        .get_one("products", GetOneParams { id })
        .await
        .unwrap();
    assert_eq!(fetched.data, created);
}

#[tokio::test]
async fn test_list_defaults_to_insertion_order() {
    let db = setup().await;
    catalog(&db.provider).await;

    let result = db.provider.get_list("products", Query::new()).await.unwrap();
    assert_eq!(result.total, 3);
    assert_eq!(result.total_pages, 1);
    assert_eq!(names(&result.data), vec!["Hammer", "Saw", "Glue 50% extra"]);
}

#[tokio::test]
async fn test_sort_desc_and_pagination() {
    let db = setup().await;
    catalog(&db.provider).await;

    let result = db
        .provider
        .get_list(
            "products",
            Query::new().sort_by("price", SortOrder::Desc).paginate(1, 2),
        )
        .await
        .unwrap();

    let prices: Vec<f64> = result
        .data
        .iter()
        .filter_map(|r| r["price"].as_f64())
        .collect();
    assert_eq!(prices, vec![30.0, 20.0]);
    assert_eq!(result.total, 3);
    assert_eq!(result.total_pages, 2);

    let last = db
        .provider
        .get_list(
            "products",
            Query::new().sort_by("price", SortOrder::Desc).paginate(2, 2),
        )
        .await
        .unwrap();
    assert_eq!(names(&last.data), vec!["Glue 50% extra"]);
}

#[tokio::test]
async fn test_filters_and_search() {
    let db = setup().await;
    catalog(&db.provider).await;

    let tools = db
        .provider
        .get_list("products", Query::new().filter_by("category", "TOOL"))
        .await
        .unwrap();
    assert_eq!(names(&tools.data), vec!["Hammer", "Saw"]);

    let vendors = db
        .provider
        .get_list(
            "products",
            Query::new().filter_by("vendorId", json!(["v2", "v9"])),
        )
        .await
        .unwrap();
    assert_eq!(names(&vendors.data), vec!["Saw"]);

    // Search replaces the filter
    let searched = db
        .provider
        .get_list(
            "products",
            Query::new().filter_by("category", "tools").search("glue"),
        )
        .await
        .unwrap();
    assert_eq!(names(&searched.data), vec!["Glue 50% extra"]);
}

#[tokio::test]
async fn test_like_wildcards_match_literally() {
    let db = setup().await;
    catalog(&db.provider).await;

    let percent = db
        .provider
        .get_list("products", Query::new().search("50%"))
        .await
        .unwrap();
    assert_eq!(names(&percent.data), vec!["Glue 50% extra"]);

    let underscore = db
        .provider
        .get_list("products", Query::new().search("_"))
        .await
        .unwrap();
    assert_eq!(underscore.total, 0);
}

#[tokio::test]
async fn test_get_many_reference() {
    let db = setup().await;
    catalog(&db.provider).await;

    let result = db
        .provider
        .get_many_reference(
            "products",
            GetManyReferenceParams {
                target: "vendorId".to_string(),
                id: "v1".into(),
                query: Query::new().sort_by("price", SortOrder::Asc),
            },
        )
        .await
        .unwrap();

    assert_eq!(names(&result.data), vec!["Glue 50% extra", "Hammer"]);
    assert_eq!(result.total, 2);
}

#[tokio::test]
async fn test_get_many_in_requested_order() {
    let db = setup().await;
    let products = catalog(&db.provider).await;
    let id = |i: usize| Identifier::of(&products[i]).unwrap();

    let result = db
        .provider
        .get_many(
            "products",
            GetManyParams {
                ids: vec![id(2), "missing".into(), id(0)],
            },
        )
        .await
        .unwrap();

    assert_eq!(names(&result.data), vec!["Glue 50% extra", "Hammer"]);
}

#[tokio::test]
async fn test_update_and_update_many() {
    let db = setup().await;
    let products = catalog(&db.provider).await;
    let hammer = Identifier::of(&products[0]).unwrap();

    let updated = db
        .provider
        .update(
            "products",
            UpdateParams {
                id: hammer.clone(),
                data: record(json!({ "price": 25 })),
                previous_data: Some(products[0].clone()),
            },
        )
        .await
        .unwrap()
        .data;
    assert_eq!(updated["price"].as_f64(), Some(25.0));
    assert_eq!(updated["name"], json!("Hammer"));
    assert_eq!(updated["createdAt"], products[0]["createdAt"]);

    let ids: Vec<Identifier> = products.iter().filter_map(Identifier::of).collect();
    let result = db
        .provider
        .update_many(
            "products",
            UpdateManyParams {
                ids: ids.clone(),
                data: record(json!({ "category": "sale" })),
            },
        )
        .await
        .unwrap();
    assert_eq!(result.data, ids);

    let sale = db
        .provider
        .get_list("products", Query::new().filter_by("category", "sale"))
        .await
        .unwrap();
    assert_eq!(sale.total, 3);
}

#[tokio::test]
async fn test_missing_rows_are_not_found() {
    let db = setup().await;
    let missing: Identifier = "missing".into();

    let err = db
        .provider
        .get_one("products", GetOneParams { id: missing.clone() })
        .await
        .unwrap_err();
    assert_eq!(err, AppError::not_found("products", "missing"));

    let err = db
        .provider
        .update(
            "products",
            UpdateParams {
                id: missing,
                data: record(json!({ "name": "x" })),
                previous_data: None,
            },
        )
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_double_delete_fails() {
    let db = setup().await;
    let products = catalog(&db.provider).await;
    let params = DeleteParams {
        id: Identifier::of(&products[1]).unwrap(),
        previous_data: None,
    };

    let removed = db.provider.delete("products", params.clone()).await.unwrap();
    assert_eq!(removed.data["name"], json!("Saw"));

    let err = db.provider.delete("products", params).await.unwrap_err();
    assert_eq!(err.code(), "NOT_FOUND");
}

#[tokio::test]
async fn test_delete_many() {
    let db = setup().await;
    let products = catalog(&db.provider).await;
    let ids = vec![Identifier::of(&products[0]).unwrap(), "missing".into()];

    let result = db
        .provider
        .delete_many("products", DeleteManyParams { ids: ids.clone() })
        .await
        .unwrap();
    assert_eq!(result.data, ids);

    let rest = db.provider.get_list("products", Query::new()).await.unwrap();
    assert_eq!(rest.total, 2);
}

#[tokio::test]
async fn test_page_far_past_the_end_is_empty() {
    let db = setup().await;
    catalog(&db.provider).await;

    let result = db
        .provider
        .get_list("products", Query::new().paginate(i64::MAX, i64::MAX))
        .await
        .unwrap();
    assert!(result.data.is_empty());
    assert_eq!(result.total, 3);
}

#[tokio::test]
async fn test_unlisted_columns_cannot_be_queried() {
    let db = setup().await;
    catalog(&db.provider).await;

    // `cost` exists in the table but is not part of the schema
    let err = db
        .provider
        .get_list("products", Query::new().filter_by("cost", 5))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "VALIDATION_ERROR");

    let err = db
        .provider
        .get_list("products", Query::new().sort_by("cost", SortOrder::Desc))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "VALIDATION_ERROR");

    let err = db
        .provider
        .get_list("products", Query::new().filter_by("color", "red"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_unregistered_resource() {
    let db = setup().await;
    let err = db
        .provider
        .get_list("orders", Query::new())
        .await
        .unwrap_err();
    assert_eq!(err.code(), "UNKNOWN_RESOURCE");
}

#[tokio::test]
async fn test_missing_table_is_a_backend_failure() {
    let dir = tempfile::tempdir().unwrap();
    let config = DatabaseConfig {
        url: format!("sqlite://{}?mode=rwc", dir.path().join("empty.db").display()),
        max_connections: 1,
        min_connections: 1,
    };
    let provider = RelationalProvider::connect(
        &config,
        ResourceRegistry::new().register(ResourceSchema::new("orders", ["total"])),
    )
    .await
    .unwrap();

    let err = provider
        .get_list("orders", Query::new())
        .await
        .unwrap_err();
    assert_eq!(err.code(), "BACKEND_OPERATION_FAILED");
    assert!(err.to_string().starts_with("getList on orders failed"));
}

#[tokio::test]
async fn test_unreachable_database_fails_at_connect() {
    let dir = tempfile::tempdir().unwrap();
    let config = DatabaseConfig {
        url: format!("sqlite://{}?mode=ro", dir.path().join("absent.db").display()),
        max_connections: 1,
        min_connections: 1,
    };
    let err = RelationalProvider::connect(&config, ResourceRegistry::new())
        .await
        .err()
        .unwrap();
    assert_eq!(err.code(), "CONFIGURATION_ERROR");
}
