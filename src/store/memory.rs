// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! In-process store backed by JSON documents

use super::{CatalogStore, StoreError, StoreResult};
use crate::catalog::{self, DatasetPage, DatasetRecord, FieldRecord, PageRequest, RunRecord};
use crate::labels::{Classification, FieldKind, FieldValue};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tokio::sync::RwLock;

/// A sample document: top-level field name -> value
pub type SampleDocument = Map<String, Value>;

#[derive(Debug, Deserialize)]
struct Fixture {
    datasets: Vec<DatasetRecord>,
    /// Sample documents keyed by sample collection name
    #[serde(default)]
    samples: HashMap<String, Vec<SampleDocument>>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    datasets: RwLock<Vec<DatasetRecord>>,
    samples: RwLock<HashMap<String, Vec<SampleDocument>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a fixture of the form `{"datasets": [...], "samples": {collection: [...]}}`
    pub fn from_json_str(json: &str) -> Result<Self> {
        let fixture: Fixture = serde_json::from_str(json).context("Failed to parse catalog fixture")?;
        Ok(Self {
            datasets: RwLock::new(fixture.datasets),
            samples: RwLock::new(fixture.samples),
        })
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read fixture: {}", path.display()))?;
        Self::from_json_str(&json)
    }

    /// Add a dataset and its samples, replacing any dataset with the same name
    pub async fn insert(&self, record: DatasetRecord, samples: Vec<SampleDocument>) {
        let mut datasets = self.datasets.write().await;
        let mut collections = self.samples.write().await;
        datasets.retain(|d| {
            if d.name != record.name {
                return true;
            }
            collections.remove(&d.sample_collection_name);
            false
        });
        collections.insert(record.sample_collection_name.clone(), samples);
        datasets.push(record);
    }

    /// Generate a labeled dataset with predictions for demos and tests.
    ///
    /// About 70% of predictions are correct and roughly one sample in twenty
    /// has no prediction. Logits rank the predicted class first.
    pub fn synthetic(name: &str, size: usize, seed: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let classes = ["bird", "cat", "dog"];

        let samples: Vec<SampleDocument> = (0..size)
            .map(|i| {
                let truth = classes[rng.gen_range(0..classes.len())];
                let mut doc = Map::new();
                doc.insert("filepath".to_string(), json!(format!("/data/{}/{:06}.jpg", name, i)));
                doc.insert("ground_truth".to_string(), json!({ "label": truth }));

                if rng.gen_bool(0.95) {
                    let predicted = if rng.gen_bool(0.7) {
                        truth
                    } else {
                        classes[rng.gen_range(0..classes.len())]
                    };
                    let confidence: f64 = rng.gen_range(0.4..1.0);
                    let logits: Vec<f64> = classes
                        .iter()
                        .map(|c| if *c == predicted { 2.0 + confidence } else { rng.gen_range(-1.0..2.0) })
                        .collect();
                    doc.insert(
                        "predictions".to_string(),
                        json!({ "label": predicted, "confidence": confidence, "logits": logits }),
                    );
                }
                doc
            })
            .collect();

        let created_at = Utc
            .timestamp_opt(1_650_000_000, 0)
            .single()
            .unwrap_or_default()
            + Duration::seconds(seed as i64);
        let mut ground_truth = FieldRecord::new("ground_truth", "labelscope.fields.EmbeddedDocumentField");
        ground_truth.embedded_doc_type = Some("labelscope.labels.Classification".to_string());
        ground_truth.fields = vec![FieldRecord::new("label", "labelscope.fields.StringField")];
        let mut predictions = ground_truth.clone();
        predictions.name = "predictions".to_string();
        predictions.fields.push(FieldRecord::new("confidence", "labelscope.fields.FloatField"));
        predictions.fields.push(FieldRecord::new("logits", "labelscope.fields.VectorField"));

        let record = DatasetRecord {
            id: format!("{:024x}", seed),
            name: name.to_string(),
            created_at,
            last_loaded_at: created_at,
            persistent: false,
            media_type: Some("image".to_string()),
            sample_collection_name: format!("{}{}", catalog::SAMPLE_COLLECTION_PREFIX, name),
            mask_targets: BTreeMap::new(),
            default_mask_targets: BTreeMap::new(),
            sample_fields: vec![
                FieldRecord::new("filepath", "labelscope.fields.StringField"),
                ground_truth,
                predictions,
            ],
            frame_fields: vec![],
            brain_methods: BTreeMap::new(),
            evaluations: BTreeMap::new(),
            app_sidebar_groups: None,
            version: env!("CARGO_PKG_VERSION").to_string(),
        };

        let mut samples_by_collection = HashMap::new();
        samples_by_collection.insert(record.sample_collection_name.clone(), samples);

        Self {
            datasets: RwLock::new(vec![record]),
            samples: RwLock::new(samples_by_collection),
        }
    }

    async fn collection_name(&self, dataset: &str) -> StoreResult<String> {
        self.datasets
            .read()
            .await
            .iter()
            .find(|d| d.name == dataset && d.is_listed())
            .map(|d| d.sample_collection_name.clone())
            .ok_or_else(|| StoreError::DatasetNotFound(dataset.to_string()))
    }

    /// Raw `field` values of every sample of `dataset`, in sample order
    #[cfg(test)]
    pub(crate) async fn sample_values(&self, dataset: &str, field: &str) -> Vec<Option<Value>> {
        let collection = self.collection_name(dataset).await.unwrap_or_default();
        self.samples
            .read()
            .await
            .get(&collection)
            .map(|docs| docs.iter().map(|doc| doc.get(field).cloned()).collect())
            .unwrap_or_default()
    }
}

fn listed_mut<'a>(datasets: &'a mut [DatasetRecord], name: &str) -> StoreResult<&'a mut DatasetRecord> {
    datasets
        .iter_mut()
        .find(|d| d.name == name && d.is_listed())
        .ok_or_else(|| StoreError::DatasetNotFound(name.to_string()))
}

#[async_trait]
impl CatalogStore for MemoryStore {
    async fn datasets_by_name(&self, names: &[String]) -> StoreResult<Vec<DatasetRecord>> {
        Ok(self
            .datasets
            .read()
            .await
            .iter()
            .filter(|d| d.is_listed() && names.contains(&d.name))
            .cloned()
            .collect())
    }

    async fn dataset_page(&self, request: &PageRequest) -> StoreResult<DatasetPage> {
        let listed: Vec<DatasetRecord> = self
            .datasets
            .read()
            .await
            .iter()
            .filter(|d| d.is_listed())
            .cloned()
            .collect();
        Ok(catalog::paginate(listed, request))
    }

    async fn classifications(
        &self,
        dataset: &str,
        field: &str,
    ) -> StoreResult<Vec<Option<Classification>>> {
        let collection = self.collection_name(dataset).await?;
        let samples = self.samples.read().await;
        let docs = samples.get(&collection).map(Vec::as_slice).unwrap_or(&[]);

        docs.iter()
            .map(|doc| match doc.get(field) {
                None | Some(Value::Null) => Ok(None),
                Some(value) => serde_json::from_value(value.clone())
                    .map(Some)
                    .map_err(|e| StoreError::Document(format!("{}.{}: {}", collection, field, e))),
            })
            .collect()
    }

    async fn set_sample_values(
        &self,
        dataset: &str,
        field: &str,
        values: &[FieldValue],
    ) -> StoreResult<()> {
        let collection = self.collection_name(dataset).await?;
        let mut samples = self.samples.write().await;
        let docs = samples.entry(collection).or_default();

        if docs.len() != values.len() {
            return Err(StoreError::LengthMismatch {
                field: field.to_string(),
                expected: docs.len(),
                actual: values.len(),
            });
        }

        for (doc, value) in docs.iter_mut().zip(values) {
            let value = match value {
                FieldValue::Bool(b) => Value::Bool(*b),
                FieldValue::Str(s) => Value::String(s.clone()),
            };
            doc.insert(field.to_string(), value);
        }
        Ok(())
    }

    async fn ensure_sample_field(
        &self,
        dataset: &str,
        field: &str,
        kind: FieldKind,
    ) -> StoreResult<()> {
        let mut datasets = self.datasets.write().await;
        let record = listed_mut(&mut datasets, dataset)?;

        if record.add_sample_field(FieldRecord::new(field, kind.ftype())) {
            tracing::debug!("Added field '{}' to dataset '{}'", field, dataset);
        }
        Ok(())
    }

    async fn save_evaluation(&self, dataset: &str, run: &RunRecord) -> StoreResult<()> {
        let mut datasets = self.datasets.write().await;
        let record = listed_mut(&mut datasets, dataset)?;
        record.evaluations.insert(run.key.clone(), run.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::tests::record;

    const FIXTURE: &str = r#"{
        "datasets": [
            {
                "id": "6262f7c0a1b2c3d4e5f60001",
                "name": "quickstart",
                "created_at": "2022-04-22T18:00:00Z",
                "last_loaded_at": "2022-04-23T09:30:00Z",
                "persistent": true,
                "media_type": "image",
                "sample_collection_name": "samples.6262f7c0a1b2c3d4e5f60001",
                "version": "0.3.0"
            },
            {
                "id": "6262f7c0a1b2c3d4e5f60002",
                "name": "hidden",
                "created_at": "2022-04-22T18:00:00Z",
                "last_loaded_at": "2022-04-22T18:00:00Z",
                "sample_collection_name": "patches.6262f7c0a1b2c3d4e5f60002"
            }
        ],
        "samples": {
            "samples.6262f7c0a1b2c3d4e5f60001": [
                {"ground_truth": {"label": "cat"}, "predictions": {"label": "cat", "confidence": 0.9}},
                {"ground_truth": {"label": "dog"}},
                {"ground_truth": null, "predictions": {"label": "dog", "confidence": 0.4}}
            ]
        }
    }"#;

    #[tokio::test]
    async fn test_fixture_lists_only_sample_collections() {
        let store = MemoryStore::from_json_str(FIXTURE).unwrap();
        let found = store
            .datasets_by_name(&["quickstart".to_string(), "hidden".to_string()])
            .await
            .unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "quickstart");
        assert!(matches!(store.dataset("hidden").await, Err(StoreError::DatasetNotFound(_))));
    }

    #[tokio::test]
    async fn test_classifications_follow_sample_order() {
        let store = MemoryStore::from_json_str(FIXTURE).unwrap();
        let preds = store.classifications("quickstart", "predictions").await.unwrap();

        assert_eq!(preds.len(), 3);
        assert_eq!(preds[0].as_ref().unwrap().confidence, Some(0.9));
        assert!(preds[1].is_none());

        let gt = store.classifications("quickstart", "ground_truth").await.unwrap();
        assert!(gt[2].is_none());
    }

    #[tokio::test]
    async fn test_set_values_checks_length() {
        let store = MemoryStore::from_json_str(FIXTURE).unwrap();
        let err = store
            .set_sample_values("quickstart", "eval", &[FieldValue::Bool(true)])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::LengthMismatch { expected: 3, actual: 1, .. }));

        let values = vec![FieldValue::Bool(true), FieldValue::Bool(false), FieldValue::Bool(true)];
        store.set_sample_values("quickstart", "eval", &values).await.unwrap();
        store
            .ensure_sample_field("quickstart", "eval", FieldKind::Boolean)
            .await
            .unwrap();
        store
            .ensure_sample_field("quickstart", "eval", FieldKind::Boolean)
            .await
            .unwrap();

        let record = store.dataset("quickstart").await.unwrap();
        assert_eq!(record.sample_fields.iter().filter(|f| f.name == "eval").count(), 1);
    }

    #[tokio::test]
    async fn test_insert_replaces_by_name() {
        let store = MemoryStore::new();
        store.insert(record("a", "one", 1), vec![]).await;
        store.insert(record("b", "one", 2), vec![SampleDocument::new()]).await;

        let page = store
            .dataset_page(&PageRequest { first: 10, ..Default::default() })
            .await
            .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.records[0].id, "b");
        assert!(!store.samples.read().await.contains_key("samples.a"));
        assert_eq!(store.sample_values("one", "filepath").await, vec![None]);
    }

    #[tokio::test]
    async fn test_unlisted_datasets_are_not_writable() {
        let store = MemoryStore::from_json_str(FIXTURE).unwrap();
        let err = store
            .ensure_sample_field("hidden", "eval", FieldKind::Boolean)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DatasetNotFound(_)));

        let run = RunRecord {
            key: "eval".to_string(),
            version: "0.3.0".to_string(),
            timestamp: Utc::now(),
            config: Default::default(),
            view_stages: vec![],
        };
        assert!(store.save_evaluation("hidden", &run).await.is_err());
        assert!(store.save_evaluation("quickstart", &run).await.is_ok());
    }

    #[tokio::test]
    async fn test_synthetic_is_deterministic() {
        let a = MemoryStore::synthetic("demo", 50, 7);
        let b = MemoryStore::synthetic("demo", 50, 7);

        let pa = a.classifications("demo", "predictions").await.unwrap();
        let pb = b.classifications("demo", "predictions").await.unwrap();
        assert_eq!(pa, pb);
        assert_eq!(pa.len(), 50);
    }

    #[tokio::test]
    async fn test_bundled_fixture_loads() {
        let store = MemoryStore::from_json_str(include_str!("../../fixtures/catalog.json")).unwrap();
        let page = store
            .dataset_page(&PageRequest { first: 10, ..Default::default() })
            .await
            .unwrap();
        assert_eq!(page.total, 2);

        let gt = store.classifications("quickstart", "ground_truth").await.unwrap();
        assert_eq!(gt.len(), 6);
    }
}
