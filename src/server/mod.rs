// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! GraphQL catalog server
//!
//! Routes:
//! - `POST /graphql` executes queries
//! - `GET /graphql` serves GraphiQL
//! - `GET /health` liveness probe

pub mod loader;
pub mod paginator;
pub mod schema;

use anyhow::{Context, Result};
use async_graphql::dataloader::DataLoader;
use async_graphql::http::GraphiQLSource;
use async_graphql::{EmptyMutation, EmptySubscription, Schema};
use async_graphql_axum::GraphQL;
use axum::response::{Html, IntoResponse};
use axum::routing::get;
use axum::Router;

pub use loader::DatasetLoader;
pub use schema::{AppState, Query};

pub type CatalogSchema = Schema<Query, EmptyMutation, EmptySubscription>;

pub fn build_schema(state: AppState) -> CatalogSchema {
    let loader = DataLoader::new(DatasetLoader::new(state.store.clone()), tokio::spawn);
    Schema::build(Query, EmptyMutation, EmptySubscription)
        .register_output_type::<schema::Run>()
        .register_output_type::<schema::RunConfig>()
        .data(loader)
        .data(state)
        .finish()
}

async fn graphiql() -> impl IntoResponse {
    Html(GraphiQLSource::build().endpoint("/graphql").finish())
}

async fn health() -> &'static str {
    "ok"
}

pub fn router(schema: CatalogSchema) -> Router {
    Router::new()
        .route("/graphql", get(graphiql).post_service(GraphQL::new(schema)))
        .route("/health", get(health))
}

/// Bind `state.settings.bind_address` and serve until the process exits
pub async fn serve(state: AppState) -> Result<()> {
    let address = state.settings.bind_address.clone();
    let app = router(build_schema(state));

    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {}", address))?;
    tracing::info!("GraphQL endpoint: http://{}/graphql", address);

    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::tests::record;
    use crate::catalog::{FieldRecord, RunConfigRecord, RunRecord};
    use crate::config::Settings;
    use crate::environment::RuntimeContext;
    use crate::store::{CatalogStore, MemoryStore};
    use serde_json::{json, Value};
    use std::collections::BTreeMap;
    use std::sync::Arc;

    async fn catalog() -> Arc<MemoryStore> {
        let store = MemoryStore::new();

        let mut quickstart = record("a1", "quickstart", 1_000);
        let mut gt = FieldRecord::new("ground_truth", "labelscope.fields.EmbeddedDocumentField");
        gt.fields = vec![FieldRecord::new("label", "labelscope.fields.StringField")];
        quickstart.sample_fields = vec![FieldRecord::new("filepath", "labelscope.fields.StringField"), gt];
        quickstart.mask_targets = BTreeMap::from([(
            "segmentation".to_string(),
            BTreeMap::from([("2".to_string(), "road".to_string()), ("1".to_string(), "sky".to_string())]),
        )]);
        quickstart.evaluations.insert(
            "eval".to_string(),
            RunRecord {
                key: "eval".to_string(),
                version: "0.3.0".to_string(),
                timestamp: quickstart.created_at,
                config: RunConfigRecord {
                    cls: "labelscope.evaluation.ClassificationEvaluationConfig".to_string(),
                    method: Some("simple".to_string()),
                    gt_field: Some("ground_truth".to_string()),
                    pred_field: Some("predictions".to_string()),
                    ..RunConfigRecord::default()
                },
                view_stages: vec![],
            },
        );
        store.insert(quickstart, vec![]).await;

        store.insert(record("b2", "quickstart-video", 2_000), vec![]).await;
        store.insert(record("c3", "mnist", 2_000), vec![]).await;

        let mut hidden = record("d4", "patches", 500);
        hidden.sample_collection_name = "patches.d4".to_string();
        store.insert(hidden, vec![]).await;

        Arc::new(store)
    }

    fn schema_with(store: Arc<MemoryStore>, settings: Settings) -> CatalogSchema {
        let state = AppState {
            store: store as Arc<dyn CatalogStore>,
            settings: Arc::new(settings),
            runtime: RuntimeContext::None,
        };
        build_schema(state)
    }

    async fn query(schema: &CatalogSchema, query: &str) -> Value {
        let response = schema.execute(query).await;
        assert!(response.errors.is_empty(), "{:?}", response.errors);
        response.data.into_json().unwrap()
    }

    #[tokio::test]
    async fn test_environment_fields() {
        let schema = schema_with(catalog().await, Settings::default());
        let data = query(&schema, "{ version context doNotTrack config { gridZoom colorPool timezone } }").await;

        assert_eq!(data["version"], env!("CARGO_PKG_VERSION"));
        assert_eq!(data["context"], "NONE");
        assert_eq!(data["doNotTrack"], false);
        assert_eq!(data["config"]["gridZoom"], 5);
        assert_eq!(data["config"]["colorPool"].as_array().unwrap().len(), 13);
        assert!(data["config"]["timezone"].is_null());
    }

    #[tokio::test]
    async fn test_colorscale() {
        let schema = schema_with(catalog().await, Settings::default());
        let data = query(&schema, "{ colorscale }").await;
        let map = data["colorscale"].as_array().unwrap();
        assert_eq!(map.len(), 256);
        assert_eq!(map[0], json!([0x44, 0x01, 0x54]));

        let mut settings = Settings::default();
        settings.app.colorscale = String::new();
        let schema = schema_with(catalog().await, settings);
        assert!(query(&schema, "{ colorscale }").await["colorscale"].is_null());
    }

    #[tokio::test]
    async fn test_dataset_by_name() {
        let schema = schema_with(catalog().await, Settings::default());
        let data = query(
            &schema,
            r#"{
                dataset(name: "quickstart") {
                    id name createdAt mediaType
                    sampleFields { path ftype }
                    maskTargets { name targets { target value } }
                    evaluations { key config { method predField classwise } }
                }
                missing: dataset(name: "nope") { name }
                hidden: dataset(name: "patches") { name }
            }"#,
        )
        .await;

        let dataset = &data["dataset"];
        assert_eq!(dataset["id"], "a1");
        assert_eq!(dataset["mediaType"], "image");
        assert_eq!(dataset["createdAt"], "1970-01-01");
        let paths: Vec<&str> = dataset["sampleFields"]
            .as_array()
            .unwrap()
            .iter()
            .map(|f| f["path"].as_str().unwrap())
            .collect();
        assert_eq!(paths, vec!["filepath", "ground_truth", "ground_truth.label"]);
        assert_eq!(
            dataset["maskTargets"][0]["targets"],
            json!([{"target": 1, "value": "sky"}, {"target": 2, "value": "road"}])
        );
        assert_eq!(dataset["evaluations"][0]["config"]["predField"], "predictions");
        assert_eq!(dataset["evaluations"][0]["config"]["classwise"], false);

        assert!(data["missing"].is_null());
        assert!(data["hidden"].is_null());
    }

    #[tokio::test]
    async fn test_datasets_connection_pages() {
        let schema = schema_with(catalog().await, Settings::default());
        let data = query(
            &schema,
            "{ datasets(first: 2) { total pageInfo { hasNextPage endCursor } edges { node { name } } } }",
        )
        .await;

        let page = &data["datasets"];
        assert_eq!(page["total"], 3);
        assert_eq!(page["pageInfo"]["hasNextPage"], true);
        let names: Vec<&str> = page["edges"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["node"]["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["quickstart", "quickstart-video"]);

        let cursor = page["pageInfo"]["endCursor"].as_str().unwrap();
        let next = query(
            &schema,
            &format!(r#"{{ datasets(first: 2, after: "{}") {{ pageInfo {{ hasNextPage hasPreviousPage }} edges {{ node {{ name }} }} }} }}"#, cursor),
        )
        .await;
        assert_eq!(next["datasets"]["edges"][0]["node"]["name"], "mnist");
        assert_eq!(next["datasets"]["pageInfo"]["hasNextPage"], false);
        assert_eq!(next["datasets"]["pageInfo"]["hasPreviousPage"], true);
    }

    #[tokio::test]
    async fn test_datasets_search_and_bad_cursor() {
        let schema = schema_with(catalog().await, Settings::default());
        let data = query(&schema, r#"{ datasets(search: "quick") { total edges { node { name } } } }"#).await;
        assert_eq!(data["datasets"]["total"], 2);

        let response = schema.execute(r#"{ datasets(after: "garbage") { total } }"#).await;
        assert!(!response.errors.is_empty());
    }

    #[tokio::test]
    async fn test_teams_and_uuid() {
        let dir = std::env::temp_dir().join(format!("labelscope-server-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let settings = Settings {
            teams_path: dir.join("teams.json"),
            uid_path: dir.join("uid"),
            ..Settings::default()
        };
        let schema = schema_with(catalog().await, settings);

        let first = query(&schema, "{ teamsSubmission uuid }").await;
        assert_eq!(first["teamsSubmission"], false);
        let second = query(&schema, "{ uuid }").await;
        assert_eq!(first["uuid"], second["uuid"]);

        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_schema_exposes_run_interfaces() {
        let sdl = schema_with(Arc::new(MemoryStore::new()), Settings::default()).sdl();
        assert!(sdl.contains("interface Run"));
        assert!(sdl.contains("config: RunConfig!"));
        assert!(sdl.contains("type EvaluationRun implements Run"));
        assert!(sdl.contains("enum MediaType"));
    }
}
