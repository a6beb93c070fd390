// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Label values stored on samples and written back by evaluations

use serde::{Deserialize, Serialize};

/// A classification label attached to a sample field
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    /// Class name (may be absent on partially labeled samples)
    #[serde(default)]
    pub label: Option<String>,
    /// Confidence of the predicted label
    #[serde(default)]
    pub confidence: Option<f64>,
    /// Per-class logits, indexed like the class list of the model
    #[serde(default)]
    pub logits: Option<Vec<f64>>,
}

impl Classification {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: Some(label.into()),
            ..Self::default()
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    pub fn with_logits(mut self, logits: Vec<f64>) -> Self {
        self.logits = Some(logits);
        self
    }
}

/// Project the `label` of every sample, `None` where the field or label is missing
pub fn labels_of(values: &[Option<Classification>]) -> Vec<Option<String>> {
    values
        .iter()
        .map(|c| c.as_ref().and_then(|c| c.label.clone()))
        .collect()
}

/// Project the `confidence` of every sample
pub fn confidences_of(values: &[Option<Classification>]) -> Vec<Option<f64>> {
    values
        .iter()
        .map(|c| c.as_ref().and_then(|c| c.confidence))
        .collect()
}

/// Project the `logits` of every sample
pub fn logits_of(values: &[Option<Classification>]) -> Vec<Option<Vec<f64>>> {
    values
        .iter()
        .map(|c| c.as_ref().and_then(|c| c.logits.clone()))
        .collect()
}

/// Primitive value written to a sample field by an evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Bool(bool),
    Str(String),
}

/// Schema type of a top-level sample field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldKind {
    Boolean,
    String,
}

impl FieldKind {
    /// Fully qualified field type name recorded in the dataset schema
    pub fn ftype(&self) -> &'static str {
        match self {
            FieldKind::Boolean => "labelscope.fields.BooleanField",
            FieldKind::String => "labelscope.fields.StringField",
        }
    }
}
