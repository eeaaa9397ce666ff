//! Factory and handle tests: backend selection, switching and isolation.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use sea_orm::ConnectionTrait;
use serde_json::{json, Value};
use tower::layer::layer_fn;

use common::{AppError, DatabaseConfig, ProviderConfig, ProviderOptions};
use data_provider::local::FixedDelay;
use data_provider::relational::Database;
use data_provider::{
    DataProvider, LocalProvider, ProviderFactory, RelationalProvider, SeaOrmClient, SharedProvider,
};
use domain::{CreateParams, GetOneParams, Query, Record, ResourceRegistry, ResourceSchema};

fn record(value: Value) -> Record {
    value.as_object().cloned().expect("record literal must be an object")
}

async fn local_with(names: &[&str]) -> SharedProvider {
    let provider = LocalProvider::new();
    let records = names
        .iter()
        .enumerate()
        .map(|(i, name)| record(json!({ "id": i + 1, "name": name })))
        .collect();
    provider.seed("users", records).await.unwrap();
    Arc::new(provider)
}

fn config(provider_type: &str) -> ProviderConfig {
    let mut config = ProviderConfig::new(provider_type);
    config.local.delay_ms = 0;
    config
}

#[tokio::test]
async fn test_unknown_type_is_rejected() {
    let factory = ProviderFactory::new();

    let err = factory.handle(&config("graphql")).await.err().unwrap();
    assert_eq!(err, AppError::UnknownProviderType("graphql".to_string()));
    assert_eq!(err.code(), "UNKNOWN_PROVIDER_TYPE");
}

#[tokio::test]
async fn test_failed_switch_keeps_previous_provider() {
    let factory = ProviderFactory::builder()
        .local_backend(local_with(&["Alice"]).await)
        .build();
    let handle = factory.handle(&config("local")).await.unwrap();

    let err = handle.switch_provider(config("nosql")).await.unwrap_err();
    assert!(matches!(err, AppError::UnknownProviderType(_)));
    assert_eq!(handle.config().await.provider_type, "local");
    assert_eq!(handle.get_list("users", Query::new()).await.unwrap().total, 1);
}

#[tokio::test]
async fn test_switch_uses_independent_stores() {
    let dir = tempfile::tempdir().unwrap();
    let database = Database::connect(&DatabaseConfig {
        url: format!("sqlite://{}?mode=rwc", dir.path().join("switch.db").display()),
        max_connections: 2,
        min_connections: 1,
    })
    .await
    .unwrap();
    database
        .connection()
        .execute_unprepared(
            r#"CREATE TABLE users (id TEXT PRIMARY KEY NOT NULL, name TEXT, "createdAt" TEXT, "updatedAt" TEXT)"#,
        )
        .await
        .unwrap();
    let registry = ResourceRegistry::new().register(ResourceSchema::new("users", ["name"]));
    let relational = RelationalProvider::new(
        Arc::new(SeaOrmClient::new(database.get_connection())),
        registry,
    );

    let factory = ProviderFactory::builder()
        .relational_backend(Arc::new(relational))
        .build();
    let handle = factory.get_instance(&config("local")).await.unwrap();

    let created = handle
        .create(
            "users",
            CreateParams {
                data: record(json!({ "name": "Alice" })),
            },
        )
        .await
        .unwrap();
    assert_eq!(created.data["id"], json!(1));

    handle.switch_provider(config("relational")).await.unwrap();

    let err = handle
        .get_one("users", GetOneParams { id: "1".into() })
        .await
        .unwrap_err();
    assert!(err.is_not_found());

    // Switching back finds the local record again
    handle.switch_provider(config("local")).await.unwrap();
    let fetched = handle
        .get_one("users", GetOneParams { id: "1".into() })
        .await
        .unwrap();
    assert_eq!(fetched.data["name"], json!("Alice"));
}

#[tokio::test(start_paused = true)]
async fn test_in_flight_call_finishes_on_previous_provider() {
    let slow = LocalProvider::new().with_delay(Arc::new(FixedDelay(Duration::from_millis(300))));
    slow.seed("users", vec![record(json!({ "id": 1, "name": "Slow" }))])
        .await
        .unwrap();

    let factory = ProviderFactory::builder()
        .local_backend(Arc::new(slow))
        .relational_backend(local_with(&["Fast", "Faster"]).await)
        .build();
    let handle = factory.get_instance(&config("local")).await.unwrap();

    let in_flight = {
        let handle = handle.clone();
        tokio::spawn(async move { handle.get_list("users", Query::new()).await })
    };
    // Let the call resolve its provider and start waiting
    tokio::time::sleep(Duration::from_millis(10)).await;

    handle.switch_provider(config("relational")).await.unwrap();

    let earlier = in_flight.await.unwrap().unwrap();
    assert_eq!(earlier.total, 1);
    let later = handle.get_list("users", Query::new()).await.unwrap();
    assert_eq!(later.total, 2);
}

#[tokio::test]
async fn test_instance_is_shared_and_isolated_handles_are_not() {
    let factory = ProviderFactory::builder()
        .local_backend(local_with(&["Alice"]).await)
        .relational_backend(local_with(&["Bob", "Carol"]).await)
        .build();

    let instance = factory.get_instance(&config("local")).await.unwrap();
    let isolated = instance.isolated().await;

    // A later config does not rebuild the instance
    let again = factory.get_instance(&config("relational")).await.unwrap();
    assert_eq!(again.config().await.provider_type, "local");

    isolated.switch_provider(config("relational")).await.unwrap();
    assert_eq!(isolated.get_list("users", Query::new()).await.unwrap().total, 2);
    assert_eq!(instance.get_list("users", Query::new()).await.unwrap().total, 1);

    instance.switch_provider(config("relational")).await.unwrap();
    assert_eq!(again.get_list("users", Query::new()).await.unwrap().total, 2);
}

#[tokio::test]
async fn test_backends_are_shared_across_providers() {
    let factory = ProviderFactory::new();
    let first = factory.create_provider(&config("local")).await.unwrap();
    let second = factory.create_provider(&config("local")).await.unwrap();

    first
        .create(
            "users",
            CreateParams {
                data: record(json!({ "name": "Dana" })),
            },
        )
        .await
        .unwrap();
    assert_eq!(second.get_list("users", Query::new()).await.unwrap().total, 1);
}

#[tokio::test]
async fn test_configured_layers_wrap_custom_layers() {
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = {
        let seen = Arc::clone(&seen);
        layer_fn(move |inner: SharedProvider| -> SharedProvider {
            seen.fetch_add(1, Ordering::SeqCst);
            inner
        })
    };

    let factory = ProviderFactory::builder()
        .local_backend(local_with(&["Alice", "Bob"]).await)
        .layer(counter)
        .build();

    let mut config = config("local");
    config.options = ProviderOptions {
        enable_logging: true,
        enable_caching: true,
        ..ProviderOptions::default()
    };
    let handle = factory.handle(&config).await.unwrap();
    assert_eq!(seen.load(Ordering::SeqCst), 1);

    let first = handle.get_list("users", Query::new()).await.unwrap();
    handle
        .create(
            "users",
            CreateParams {
                data: record(json!({ "name": "Carol" })),
            },
        )
        .await
        .unwrap();
    let second = handle.get_list("users", Query::new()).await.unwrap();

    assert_eq!(first.total, 2);
    assert_eq!(second.total, 3);
}
