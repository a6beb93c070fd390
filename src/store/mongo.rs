// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! MongoDB store
//!
//! Dataset records live in the `datasets` collection; each dataset keeps its
//! samples in the collection named by `sample_collection_name`. Samples are
//! read and written in `_id` order.

use super::{CatalogStore, StoreError, StoreResult};
use crate::catalog::{DatasetPage, DatasetRecord, PageRequest, RunRecord, DATASETS_COLLECTION};
use crate::labels::{Classification, FieldKind, FieldValue};
use async_trait::async_trait;
use bson::oid::ObjectId;
use bson::{doc, Bson, Document};
use futures::TryStreamExt;
use mongodb::options::FindOptions;
use mongodb::{Client, Collection, Database};

pub struct MongoStore {
    db: Database,
}

impl MongoStore {
    pub async fn connect(uri: &str, database: &str) -> StoreResult<Self> {
        let client = Client::with_uri_str(uri).await?;
        Ok(Self {
            db: client.database(database),
        })
    }

    pub fn from_database(db: Database) -> Self {
        Self { db }
    }

    fn datasets(&self) -> Collection<Document> {
        self.db.collection::<Document>(DATASETS_COLLECTION)
    }

    async fn sample_collection(&self, dataset: &str) -> StoreResult<Collection<Document>> {
        let mut filter = listed_filter();
        filter.insert("name", dataset);

        let record = self
            .datasets()
            .find_one(filter, None)
            .await?
            .ok_or_else(|| StoreError::DatasetNotFound(dataset.to_string()))?;
        let name = record
            .get_str("sample_collection_name")
            .map_err(|e| StoreError::Document(format!("sample_collection_name: {}", e)))?;
        Ok(self.db.collection::<Document>(name))
    }

    async fn sample_ids(&self, collection: &Collection<Document>) -> StoreResult<Vec<Bson>> {
        let options = FindOptions::builder()
            .sort(doc! { "_id": 1 })
            .projection(doc! { "_id": 1 })
            .build();
        let mut cursor = collection.find(doc! {}, options).await?;

        let mut ids = Vec::new();
        while let Some(doc) = cursor.try_next().await? {
            if let Some(id) = doc.get("_id") {
                ids.push(id.clone());
            }
        }
        Ok(ids)
    }

    async fn collect_records(&self, filter: Document, options: Option<FindOptions>) -> StoreResult<Vec<DatasetRecord>> {
        let mut cursor = self.datasets().find(filter, options).await?;
        let mut records = Vec::new();
        while let Some(doc) = cursor.try_next().await? {
            records.push(record_from_document(&doc)?);
        }
        Ok(records)
    }
}

/// Only datasets backed by a `samples.*` collection are listed
fn listed_filter() -> Document {
    doc! { "sample_collection_name": { "$regex": "^samples\\." } }
}

/// Escape `text` so that `$regex` matches it literally
fn escape_regex(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        if "\\^$.|?*+()[]{}".contains(ch) {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

fn id_bson(id: &str) -> Bson {
    match ObjectId::parse_str(id) {
        Ok(oid) => Bson::ObjectId(oid),
        Err(_) => Bson::String(id.to_string()),
    }
}

fn malformed(key: &str, err: impl std::fmt::Display) -> StoreError {
    StoreError::Document(format!("{}: {}", key, err))
}

/// Listed datasets whose name contains `search` literally
fn search_filter(search: Option<&str>) -> Document {
    let mut filter = listed_filter();
    if let Some(search) = search.filter(|s| !s.is_empty()) {
        filter.insert("name", doc! { "$regex": escape_regex(search) });
    }
    filter
}

/// Filter selecting the records strictly after `request.after` in
/// `(created_at, _id)` order
fn page_filter(request: &PageRequest) -> Document {
    let mut filter = search_filter(request.search.as_deref());
    if let Some(ref after) = request.after {
        let created_at = bson::DateTime::from_millis(after.created_at_ms);
        filter.insert(
            "$or",
            vec![
                doc! { "created_at": { "$gt": created_at } },
                doc! { "created_at": created_at, "_id": { "$gt": id_bson(&after.id) } },
            ],
        );
    }
    filter
}

/// Sample ids grouped by the value written to them, in first-seen order
fn value_groups(ids: Vec<Bson>, values: &[FieldValue]) -> Vec<(Bson, Vec<Bson>)> {
    let mut groups: Vec<(&FieldValue, Vec<Bson>)> = Vec::new();
    for (id, value) in ids.into_iter().zip(values) {
        match groups.iter_mut().find(|(v, _)| *v == value) {
            Some((_, group)) => group.push(id),
            None => groups.push((value, vec![id])),
        }
    }

    groups
        .into_iter()
        .map(|(value, group)| {
            let value = match value {
                FieldValue::Bool(b) => Bson::Boolean(*b),
                FieldValue::Str(s) => Bson::String(s.clone()),
            };
            (value, group)
        })
        .collect()
}

/// Rewrite driver-specific values into the shapes the serde records expect.
/// Null members are dropped so that record defaults apply; nulls inside
/// arrays are kept and fail decoding.
fn normalize(value: Bson) -> Bson {
    match value {
        Bson::DateTime(dt) => Bson::String(dt.to_chrono().to_rfc3339()),
        Bson::ObjectId(oid) => Bson::String(oid.to_hex()),
        Bson::Document(doc) => Bson::Document(normalize_document(doc)),
        Bson::Array(items) => Bson::Array(items.into_iter().map(normalize).collect()),
        other => other,
    }
}

fn normalize_document(doc: Document) -> Document {
    doc.into_iter()
        .filter(|(_, v)| !matches!(v, Bson::Null))
        .map(|(k, v)| (k, normalize(v)))
        .collect()
}

fn run_to_document(run: &RunRecord) -> Document {
    doc! {
        "key": run.key.clone(),
        "version": run.version.clone(),
        "timestamp": bson::DateTime::from_chrono(run.timestamp),
        "config": {
            "cls": run.config.cls.clone(),
            "method": run.config.method.clone(),
            "classwise": run.config.classwise,
            "error_level": run.config.error_level,
            "gt_field": run.config.gt_field.clone(),
            "pred_field": run.config.pred_field.clone(),
        },
        "view_stages": run.view_stages.clone(),
    }
}

fn run_from_document(doc: &Document) -> StoreResult<RunRecord> {
    bson::from_document(normalize_document(doc.clone())).map_err(|e| malformed("run", e))
}

/// Decode a `datasets` document
pub fn record_from_document(doc: &Document) -> StoreResult<DatasetRecord> {
    let mut doc = normalize_document(doc.clone());
    match doc.remove("_id") {
        Some(Bson::String(id)) => {
            doc.insert("id", id);
        }
        other => return Err(malformed("_id", format!("unsupported id {:?}", other))),
    }
    if !doc.contains_key("last_loaded_at") {
        if let Some(created_at) = doc.get("created_at").cloned() {
            doc.insert("last_loaded_at", created_at);
        }
    }

    let name = doc.get_str("name").unwrap_or("<unnamed>").to_string();
    bson::from_document(doc).map_err(|e| malformed(&format!("dataset {}", name), e))
}

/// Decode the classification stored under `field`, if any
pub fn classification_from_sample(doc: &Document, field: &str) -> StoreResult<Option<Classification>> {
    match doc.get(field) {
        None | Some(Bson::Null) => Ok(None),
        Some(label @ Bson::Document(_)) => bson::from_bson(label.clone())
            .map(Some)
            .map_err(|e| malformed(field, e)),
        Some(other) => Err(malformed(field, format!("expected a label document, got {:?}", other))),
    }
}

#[async_trait]
impl CatalogStore for MongoStore {
    async fn datasets_by_name(&self, names: &[String]) -> StoreResult<Vec<DatasetRecord>> {
        let mut filter = listed_filter();
        filter.insert("name", doc! { "$in": names.to_vec() });
        self.collect_records(filter, None).await
    }

    async fn dataset_page(&self, request: &PageRequest) -> StoreResult<DatasetPage> {
        let total = self
            .datasets()
            .count_documents(search_filter(request.search.as_deref()), None)
            .await?;

        let options = FindOptions::builder()
            .sort(doc! { "created_at": 1, "_id": 1 })
            .limit((request.first + 1) as i64)
            .build();
        let mut records = self.collect_records(page_filter(request), Some(options)).await?;

        let has_next_page = records.len() > request.first;
        records.truncate(request.first);

        Ok(DatasetPage {
            records,
            has_next_page,
            total,
        })
    }

    async fn classifications(
        &self,
        dataset: &str,
        field: &str,
    ) -> StoreResult<Vec<Option<Classification>>> {
        let collection = self.sample_collection(dataset).await?;
        let mut projection = Document::new();
        projection.insert(field, 1);
        let options = FindOptions::builder()
            .sort(doc! { "_id": 1 })
            .projection(projection)
            .build();

        let mut cursor = collection.find(doc! {}, options).await?;
        let mut values = Vec::new();
        while let Some(doc) = cursor.try_next().await? {
            values.push(classification_from_sample(&doc, field)?);
        }
        Ok(values)
    }

    async fn set_sample_values(
        &self,
        dataset: &str,
        field: &str,
        values: &[FieldValue],
    ) -> StoreResult<()> {
        let collection = self.sample_collection(dataset).await?;
        let ids = self.sample_ids(&collection).await?;

        if ids.len() != values.len() {
            return Err(StoreError::LengthMismatch {
                field: field.to_string(),
                expected: ids.len(),
                actual: values.len(),
            });
        }

        for (value, group) in value_groups(ids, values) {
            let mut set = Document::new();
            set.insert(field, value);
            collection
                .update_many(doc! { "_id": { "$in": group } }, doc! { "$set": set }, None)
                .await?;
        }

        tracing::debug!("Wrote {} values to {}.{}", values.len(), dataset, field);
        Ok(())
    }

    async fn ensure_sample_field(
        &self,
        dataset: &str,
        field: &str,
        kind: FieldKind,
    ) -> StoreResult<()> {
        let record = self.dataset(dataset).await?;
        if record.sample_fields.iter().any(|f| f.name == field) {
            return Ok(());
        }

        let schema = doc! {
            "name": field,
            "ftype": kind.ftype(),
            "subfield": Bson::Null,
            "embedded_doc_type": Bson::Null,
            "db_field": field,
        };
        self.datasets()
            .update_one(
                doc! { "name": dataset },
                doc! { "$push": { "sample_fields": schema } },
                None,
            )
            .await?;

        tracing::debug!("Added field '{}' to dataset '{}'", field, dataset);
        Ok(())
    }

    async fn save_evaluation(&self, dataset: &str, run: &RunRecord) -> StoreResult<()> {
        let mut set = Document::new();
        set.insert(format!("evaluations.{}", run.key), run_to_document(run));

        let result = self
            .datasets()
            .update_one(doc! { "name": dataset }, doc! { "$set": set }, None)
            .await?;
        if result.matched_count == 0 {
            return Err(StoreError::DatasetNotFound(dataset.to_string()));
        }
        Ok(())
    }
}
