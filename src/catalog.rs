// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Dataset metadata records as kept in the `datasets` collection
//!
//! Records are the storage-side shape. The GraphQL layer converts them into
//! schema objects, flattening nested field schemas and unpacking run maps.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Name of the document collection holding dataset records
pub const DATASETS_COLLECTION: &str = "datasets";

/// Sample collections of listed datasets carry this prefix
pub const SAMPLE_COLLECTION_PREFIX: &str = "samples.";

/// Default page size of the `datasets` connection
pub const DEFAULT_PAGE_SIZE: usize = 10;

/// A dataset document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetRecord {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub last_loaded_at: DateTime<Utc>,
    #[serde(default)]
    pub persistent: bool,
    #[serde(default)]
    pub media_type: Option<String>,
    pub sample_collection_name: String,
    /// Per-field mask targets: field name -> (pixel value -> class)
    #[serde(default)]
    pub mask_targets: BTreeMap<String, BTreeMap<String, String>>,
    #[serde(default)]
    pub default_mask_targets: BTreeMap<String, String>,
    #[serde(default)]
    pub sample_fields: Vec<FieldRecord>,
    #[serde(default)]
    pub frame_fields: Vec<FieldRecord>,
    #[serde(default)]
    pub brain_methods: BTreeMap<String, RunRecord>,
    #[serde(default)]
    pub evaluations: BTreeMap<String, RunRecord>,
    #[serde(default)]
    pub app_sidebar_groups: Option<Vec<SidebarGroupRecord>>,
    #[serde(default)]
    pub version: String,
}

impl DatasetRecord {
    /// Whether the catalog exposes this dataset
    pub fn is_listed(&self) -> bool {
        self.sample_collection_name.starts_with(SAMPLE_COLLECTION_PREFIX)
    }

    /// Position of this record in the `datasets` ordering
    pub fn cursor(&self) -> DatasetCursor {
        DatasetCursor {
            created_at_ms: self.created_at.timestamp_millis(),
            id: self.id.clone(),
        }
    }

    /// Add a top-level sample field unless one with the same name exists.
    /// Returns whether the schema changed.
    pub fn add_sample_field(&mut self, field: FieldRecord) -> bool {
        if self.sample_fields.iter().any(|f| f.name == field.name) {
            return false;
        }
        self.sample_fields.push(field);
        true
    }
}

/// A field schema entry; embedded documents nest their own fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldRecord {
    pub name: String,
    pub ftype: String,
    #[serde(default)]
    pub subfield: Option<String>,
    #[serde(default)]
    pub embedded_doc_type: Option<String>,
    #[serde(default)]
    pub db_field: Option<String>,
    #[serde(default)]
    pub fields: Vec<FieldRecord>,
}

impl FieldRecord {
    pub fn new(name: impl Into<String>, ftype: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ftype: ftype.into(),
            subfield: None,
            embedded_doc_type: None,
            db_field: None,
            fields: Vec::new(),
        }
    }
}

/// A field schema entry addressed by its dotted path
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlatField {
    pub path: String,
    pub ftype: String,
    pub subfield: Option<String>,
    pub embedded_doc_type: Option<String>,
    pub db_field: Option<String>,
}

/// Flatten a nested field schema, parents before their children
pub fn flatten_fields(prefix: &[&str], fields: &[FieldRecord]) -> Vec<FlatField> {
    let mut result = Vec::new();
    for field in fields {
        let mut path: Vec<&str> = prefix.to_vec();
        path.push(&field.name);

        result.push(FlatField {
            path: path.join("."),
            ftype: field.ftype.clone(),
            subfield: field.subfield.clone(),
            embedded_doc_type: field.embedded_doc_type.clone(),
            db_field: field.db_field.clone(),
        });

        if !field.fields.is_empty() {
            result.extend(flatten_fields(&path, &field.fields));
        }
    }
    result
}

/// A brain method or evaluation run recorded on a dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub key: String,
    #[serde(default)]
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub config: RunConfigRecord,
    #[serde(default)]
    pub view_stages: Vec<String>,
}

/// Union of brain and evaluation run configuration keys
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunConfigRecord {
    pub cls: String,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub embeddings_field: Option<String>,
    #[serde(default)]
    pub patches_field: Option<String>,
    #[serde(default)]
    pub classwise: Option<bool>,
    #[serde(default)]
    pub error_level: Option<i32>,
    #[serde(default)]
    pub gt_field: Option<String>,
    #[serde(default)]
    pub pred_field: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SidebarGroupRecord {
    pub name: String,
    #[serde(default)]
    pub paths: Vec<String>,
}

/// Opaque position in the `(created_at, id)` ordering of datasets
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct DatasetCursor {
    pub created_at_ms: i64,
    pub id: String,
}

#[derive(Debug, thiserror::Error)]
#[error("invalid dataset cursor: {0}")]
pub struct CursorError(String);

impl DatasetCursor {
    pub fn encode(&self) -> String {
        format!("{}:{}", self.created_at_ms, self.id)
    }

    pub fn decode(s: &str) -> Result<Self, CursorError> {
        let (ms, id) = s
            .split_once(':')
            .ok_or_else(|| CursorError(s.to_string()))?;
        let created_at_ms: i64 = ms.parse().map_err(|_| CursorError(s.to_string()))?;
        if id.is_empty() {
            return Err(CursorError(s.to_string()));
        }
        Ok(Self {
            created_at_ms,
            id: id.to_string(),
        })
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.created_at_ms).single()
    }
}

/// One page request against the dataset listing
#[derive(Debug, Clone, Default)]
pub struct PageRequest {
    /// Literal substring the dataset name must contain
    pub search: Option<String>,
    pub after: Option<DatasetCursor>,
    pub first: usize,
}

impl PageRequest {
    pub fn matches(&self, record: &DatasetRecord) -> bool {
        match self.search.as_deref() {
            Some(search) if !search.is_empty() => record.name.contains(search),
            _ => true,
        }
    }
}

/// Result of a page request
#[derive(Debug, Clone, Default)]
pub struct DatasetPage {
    pub records: Vec<DatasetRecord>,
    pub has_next_page: bool,
    /// Listed datasets matching the search, across all pages
    pub total: u64,
}

/// Apply a page request to records already filtered to listed datasets
pub fn paginate(mut records: Vec<DatasetRecord>, request: &PageRequest) -> DatasetPage {
    records.retain(|r| request.matches(r));
    let total = records.len() as u64;

    records.sort_by_key(|r| r.cursor());
    if let Some(ref after) = request.after {
        records.retain(|r| r.cursor() > *after);
    }

    let has_next_page = records.len() > request.first;
    records.truncate(request.first);

    DatasetPage {
        records,
        has_next_page,
        total,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub fn record(id: &str, name: &str, created_ms: i64) -> DatasetRecord {
        let created_at = Utc.timestamp_millis_opt(created_ms).unwrap();
        DatasetRecord {
            id: id.to_string(),
            name: name.to_string(),
            created_at,
            last_loaded_at: created_at,
            persistent: true,
            media_type: Some("image".to_string()),
            sample_collection_name: format!("samples.{}", id),
            mask_targets: BTreeMap::new(),
            default_mask_targets: BTreeMap::new(),
            sample_fields: vec![],
            frame_fields: vec![],
            brain_methods: BTreeMap::new(),
            evaluations: BTreeMap::new(),
            app_sidebar_groups: None,
            version: "0.3.0".to_string(),
        }
    }

    #[test]
    fn test_flatten_nested_fields() {
        let mut ground_truth = FieldRecord::new("ground_truth", "EmbeddedDocumentField");
        ground_truth.embedded_doc_type = Some("Classification".to_string());
        ground_truth.fields = vec![
            FieldRecord::new("label", "StringField"),
            FieldRecord::new("confidence", "FloatField"),
        ];
        let fields = vec![FieldRecord::new("filepath", "StringField"), ground_truth];

        let flat = flatten_fields(&[], &fields);
        let paths: Vec<&str> = flat.iter().map(|f| f.path.as_str()).collect();

        assert_eq!(
            paths,
            vec!["filepath", "ground_truth", "ground_truth.label", "ground_truth.confidence"]
        );
        assert_eq!(flat[1].embedded_doc_type.as_deref(), Some("Classification"));
    }

    #[test]
    fn test_listed_filter() {
        let mut r = record("a", "quickstart", 0);
        assert!(r.is_listed());
        r.sample_collection_name = "frames.samples.a".to_string();
        assert!(!r.is_listed());
    }

    #[test]
    fn test_cursor_roundtrip_and_errors() {
        let cursor = record("62a0", "x", 1_650_000_000_123).cursor();
        assert_eq!(DatasetCursor::decode(&cursor.encode()).unwrap(), cursor);
        assert_eq!(cursor.created_at().unwrap().timestamp_millis(), 1_650_000_000_123);

        assert!(DatasetCursor::decode("garbage").is_err());
        assert!(DatasetCursor::decode("12:").is_err());
        assert!(DatasetCursor::decode("x:id").is_err());
    }

    #[test]
    fn test_paginate_orders_by_created_then_id() {
        let records = vec![
            record("c", "three", 20),
            record("b", "two", 10),
            record("a", "one", 10),
            record("d", "four", 30),
        ];

        let first = paginate(records.clone(), &PageRequest { first: 2, ..Default::default() });
        let names: Vec<&str> = first.records.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["one", "two"]);
        assert!(first.has_next_page);
        assert_eq!(first.total, 4);

        let after = first.records.last().unwrap().cursor();
        let second = paginate(
            records,
            &PageRequest {
                after: Some(after),
                first: 2,
                ..Default::default()
            },
        );
        let names: Vec<&str> = second.records.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["three", "four"]);
        assert!(!second.has_next_page);
        assert_eq!(second.total, 4);
    }

    #[test]
    fn test_paginate_search_counts_matches_only() {
        let records = vec![record("a", "cifar10", 1), record("b", "mnist", 2), record("c", "cifar100", 3)];
        let page = paginate(
            records,
            &PageRequest {
                search: Some("cifar".to_string()),
                first: 10,
                ..Default::default()
            },
        );
        assert_eq!(page.total, 2);
        assert_eq!(page.records.len(), 2);
    }
}
