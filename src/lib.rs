// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Dataset catalog server and classification evaluation
//!
//! This crate provides:
//! - Dataset metadata records and cursor pagination over them
//! - A document store boundary with MongoDB and in-memory backends
//! - A GraphQL query API over the catalog and app settings
//! - Classification evaluation (report, averaged metrics, top-k accuracy,
//!   confusion matrix, PR and ROC curves) over dataset samples
//! - Settings, colorscales and runtime environment facts

pub mod catalog;
pub mod colors;
pub mod config;
pub mod environment;
pub mod evaluation;
pub mod labels;
pub mod server;
pub mod store;

pub use catalog::{DatasetCursor, DatasetRecord, FieldRecord, PageRequest, RunRecord};
pub use config::{AppSettings, Settings};
pub use evaluation::{
    evaluate_binary_classifications, evaluate_classifications, evaluate_top_k_classifications, Average,
    BinaryClassificationResults, ClassificationResults,
};
pub use labels::{Classification, FieldKind, FieldValue};
pub use server::{build_schema, AppState, CatalogSchema};
pub use store::{CatalogStore, MemoryStore, MongoStore, Samples, StoreError};
