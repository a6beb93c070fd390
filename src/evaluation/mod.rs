// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Classification evaluation: orchestration over dataset samples, metric
//! primitives, and plot data

pub mod classification;
pub mod metrics;
pub mod plots;

pub use classification::{
    evaluate_binary_classifications, evaluate_classifications, evaluate_top_k_classifications,
    BinaryClassificationResults, BinaryOptions, ClassificationMetrics, ClassificationOptions,
    ClassificationResults, TopKOptions,
};
pub use metrics::{Average, ClassificationReport, ConfusionMatrix, Curve};
pub use plots::{ConfusionMatrixDisplay, ConfusionMatrixOptions, PrecisionRecallDisplay, RocCurveDisplay};
