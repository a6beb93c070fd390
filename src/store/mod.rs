// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Document store boundary
//!
//! The catalog and the evaluation routines only talk to [`CatalogStore`].
//! Two backends are provided:
//! - [`MongoStore`]: a MongoDB deployment (`datasets` plus one sample
//!   collection per dataset)
//! - [`MemoryStore`]: in-process documents loaded from a JSON fixture or
//!   generated from a seed

pub mod memory;
pub mod mongo;

use crate::catalog::{DatasetPage, DatasetRecord, PageRequest, RunRecord};
use crate::config::Settings;
use crate::labels::{Classification, FieldKind, FieldValue};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;

pub use memory::MemoryStore;
pub use mongo::MongoStore;

/// Failures raised by a store backend
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] mongodb::error::Error),
    #[error("malformed document: {0}")]
    Document(String),
    #[error("dataset not found: {0}")]
    DatasetNotFound(String),
    #[error("expected {expected} values for {field}, got {actual}")]
    LengthMismatch {
        field: String,
        expected: usize,
        actual: usize,
    },
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Listed datasets whose name is one of `names`
    async fn datasets_by_name(&self, names: &[String]) -> StoreResult<Vec<DatasetRecord>>;

    /// One page of listed datasets in `(created_at, id)` order
    async fn dataset_page(&self, request: &PageRequest) -> StoreResult<DatasetPage>;

    /// The classification stored in `field` of every sample, in sample order
    async fn classifications(
        &self,
        dataset: &str,
        field: &str,
    ) -> StoreResult<Vec<Option<Classification>>>;

    /// Write one value per sample, in sample order
    async fn set_sample_values(
        &self,
        dataset: &str,
        field: &str,
        values: &[FieldValue],
    ) -> StoreResult<()>;

    /// Declare a top-level sample field in the dataset schema if missing
    async fn ensure_sample_field(
        &self,
        dataset: &str,
        field: &str,
        kind: FieldKind,
    ) -> StoreResult<()>;

    /// Record an evaluation run under `evaluations[run.key]`
    async fn save_evaluation(&self, dataset: &str, run: &RunRecord) -> StoreResult<()>;

    /// Fetch a single listed dataset
    async fn dataset(&self, name: &str) -> StoreResult<DatasetRecord> {
        self.datasets_by_name(&[name.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::DatasetNotFound(name.to_string()))
    }
}

/// The samples of one dataset, as seen by the evaluation routines
#[derive(Clone, Copy)]
pub struct Samples<'a> {
    pub store: &'a dyn CatalogStore,
    pub dataset: &'a str,
}

impl<'a> Samples<'a> {
    pub fn new(store: &'a dyn CatalogStore, dataset: &'a str) -> Self {
        Self { store, dataset }
    }

    pub async fn classifications(&self, field: &str) -> StoreResult<Vec<Option<Classification>>> {
        self.store.classifications(self.dataset, field).await
    }

    pub async fn set_values(&self, field: &str, values: &[FieldValue]) -> StoreResult<()> {
        self.store.set_sample_values(self.dataset, field, values).await
    }

    pub async fn add_field_if_necessary(&self, field: &str, kind: FieldKind) -> StoreResult<()> {
        self.store.ensure_sample_field(self.dataset, field, kind).await
    }
}

/// Open the backend selected by the settings.
///
/// A `fixture` path wins over the database URI.
pub async fn open(settings: &Settings) -> Result<Arc<dyn CatalogStore>> {
    if let Some(ref fixture) = settings.fixture {
        tracing::info!("Loading catalog fixture from {}", fixture.display());
        let store = MemoryStore::from_json_file(fixture)?;
        return Ok(Arc::new(store));
    }

    tracing::info!(
        "Connecting to {} (database '{}')",
        settings.database_uri,
        settings.database_name
    );
    let store = MongoStore::connect(&settings.database_uri, &settings.database_name)
        .await
        .with_context(|| format!("Failed to connect to {}", settings.database_uri))?;
    Ok(Arc::new(store))
}
