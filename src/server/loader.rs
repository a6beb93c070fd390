// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Batched dataset lookup by name

use super::schema::Dataset;
use crate::store::{CatalogStore, StoreError};
use async_graphql::dataloader::Loader;
use std::collections::HashMap;
use std::sync::Arc;

/// Resolves dataset names to listed datasets, one store query per batch.
/// Unknown or unlisted names are absent from the result.
pub struct DatasetLoader {
    store: Arc<dyn CatalogStore>,
}

impl DatasetLoader {
    pub fn new(store: Arc<dyn CatalogStore>) -> Self {
        Self { store }
    }
}

impl Loader<String> for DatasetLoader {
    type Value = Dataset;
    type Error = Arc<StoreError>;

    async fn load(&self, keys: &[String]) -> Result<HashMap<String, Self::Value>, Self::Error> {
        tracing::debug!("Loading {} dataset(s) by name", keys.len());
        let records = self.store.datasets_by_name(keys).await.map_err(Arc::new)?;
        Ok(records
            .into_iter()
            .map(|record| (record.name.clone(), Dataset::from(record)))
            .collect())
    }
}
