//! Command handlers. Each returns the provider's answer as JSON.

use serde::Serialize;
use serde_json::Value;

use common::{AppError, AppResult};
use data_provider::DataProvider;
use domain::{
    CreateParams, DeleteManyParams, DeleteParams, Filter, GetManyParams, GetManyReferenceParams,
    GetOneParams, Identifier, Query, Record, UpdateManyParams, UpdateParams,
};

use crate::cli::{Commands, QueryArgs};

/// Execute a command against a provider
pub async fn execute(command: Commands, provider: &dyn DataProvider) -> AppResult<Value> {
    match command {
        Commands::List(args) => {
            let query = build_query(args.query)?;
            to_json(provider.get_list(&args.resource, query).await?)
        }
        Commands::Get(args) => {
            let params = GetOneParams {
                id: args.id.into(),
            };
            to_json(provider.get_one(&args.resource, params).await?)
        }
        Commands::GetMany(args) => {
            let params = GetManyParams {
                ids: identifiers(args.ids),
            };
            to_json(provider.get_many(&args.resource, params).await?)
        }
        Commands::References(args) => {
            let params = GetManyReferenceParams {
                target: args.target,
                id: args.id.into(),
                query: build_query(args.query)?,
            };
            to_json(provider.get_many_reference(&args.resource, params).await?)
        }
        Commands::Create(args) => {
            let params = CreateParams {
                data: parse_object(&args.data, "data")?,
            };
            to_json(provider.create(&args.resource, params).await?)
        }
        Commands::Update(args) => {
            let params = UpdateParams {
                id: args.id.into(),
                data: parse_object(&args.data, "data")?,
                previous_data: None,
            };
            to_json(provider.update(&args.resource, params).await?)
        }
        Commands::UpdateMany(args) => {
            let params = UpdateManyParams {
                ids: identifiers(args.ids),
                data: parse_object(&args.data, "data")?,
            };
            to_json(provider.update_many(&args.resource, params).await?)
        }
        Commands::Delete(args) => {
            let params = DeleteParams {
                id: args.id.into(),
                previous_data: None,
            };
            to_json(provider.delete(&args.resource, params).await?)
        }
        Commands::DeleteMany(args) => {
            let params = DeleteManyParams {
                ids: identifiers(args.ids),
            };
            to_json(provider.delete_many(&args.resource, params).await?)
        }
        Commands::Seed(args) => {
            let raw = tokio::fs::read_to_string(&args.file).await.map_err(|e| {
                AppError::validation(format!("cannot read {}: {}", args.file.display(), e))
            })?;
            let records: Vec<Record> = serde_json::from_str(&raw).map_err(|e| {
                AppError::validation(format!("{} is not a JSON array of objects: {}", args.file.display(), e))
            })?;

            let mut created = Vec::with_capacity(records.len());
            for data in records {
                let result = provider
                    .create(&args.resource, CreateParams { data })
                    .await?;
                created.extend(Identifier::of(&result.data));
            }
            tracing::info!(resource = %args.resource, count = created.len(), "Seeded records");
            to_json(created)
        }
    }
}

fn build_query(args: QueryArgs) -> AppResult<Query> {
    let mut query = Query::new().paginate(args.page, args.per_page);
    query.sort = args.sort;
    query.search = args.search;
    if let Some(filter) = args.filter {
        query.filter = parse_object::<Filter>(&filter, "filter")?;
    }
    Ok(query)
}

fn parse_object<T: serde::de::DeserializeOwned>(raw: &str, what: &str) -> AppResult<T> {
    serde_json::from_str(raw)
        .map_err(|e| AppError::validation(format!("{} must be a JSON object: {}", what, e)))
}

fn identifiers(ids: Vec<String>) -> Vec<Identifier> {
    ids.into_iter().map(Identifier::from).collect()
}

fn to_json<T: Serialize>(value: T) -> AppResult<Value> {
    serde_json::to_value(value).map_err(|e| AppError::internal(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;
    use clap::Parser;
    use data_provider::LocalProvider;
    use serde_json::json;

    fn command(args: &[&str]) -> Commands {
        let mut argv = vec!["resource-admin"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap().command
    }

    #[tokio::test]
    async fn test_create_then_list() {
        let provider = LocalProvider::new();

        let created = execute(
            command(&["create", "users", r#"{"name":"Alice","role":"admin"}"#]),
            &provider,
        )
        .await
        .unwrap();
        assert_eq!(created["data"]["id"], json!(1));

        let listed = execute(
            command(&["list", "users", "--filter", r#"{"role":"adm"}"#]),
            &provider,
        )
        .await
        .unwrap();
        assert_eq!(listed["total"], json!(1));
        assert_eq!(listed["totalPages"], json!(1));
    }

    #[tokio::test]
    async fn test_seed_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("users.json");
        std::fs::write(&file, r#"[{"name":"Alice"},{"name":"Bob"}]"#).unwrap();
        let provider = LocalProvider::new();

        let ids = execute(
            command(&["seed", "users", file.to_str().unwrap()]),
            &provider,
        )
        .await
        .unwrap();
        assert_eq!(ids, json!(["1", "2"]));
    }

    #[tokio::test]
    async fn test_invalid_json_is_a_validation_error() {
        let provider = LocalProvider::new();
        let err = execute(command(&["create", "users", "not json"]), &provider)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_missing_record_is_not_found() {
        let provider = LocalProvider::new();
        let err = execute(command(&["delete", "users", "7"]), &provider)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
