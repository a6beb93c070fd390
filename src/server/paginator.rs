// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Relay-style connection over the dataset listing

use super::schema::Dataset;
use crate::catalog::{DatasetCursor, PageRequest};
use crate::store::CatalogStore;
use async_graphql::connection::{Connection, Edge, EmptyFields};
use async_graphql::{Error, Result, SimpleObject};

/// Extra fields on the `datasets` connection
#[derive(SimpleObject, Clone, Debug)]
pub struct DatasetConnectionTotals {
    /// Listed datasets matching the search, across all pages
    pub total: i32,
}

pub type DatasetConnection = Connection<String, Dataset, DatasetConnectionTotals, EmptyFields>;

/// Resolve one page of datasets after the `after` cursor
pub async fn datasets(
    store: &dyn CatalogStore,
    search: Option<String>,
    first: i32,
    after: Option<String>,
) -> Result<DatasetConnection> {
    let first = usize::try_from(first).map_err(|_| Error::new("first must not be negative"))?;
    let after = after
        .as_deref()
        .map(DatasetCursor::decode)
        .transpose()?;

    let request = PageRequest {
        search,
        after,
        first,
    };
    let page = store.dataset_page(&request).await?;

    let mut connection = Connection::with_additional_fields(
        request.after.is_some(),
        page.has_next_page,
        DatasetConnectionTotals {
            total: i32::try_from(page.total).unwrap_or(i32::MAX),
        },
    );
    connection.edges.extend(
        page.records
            .into_iter()
            .map(|record| Edge::new(record.cursor().encode(), Dataset::from(record))),
    );
    Ok(connection)
}
