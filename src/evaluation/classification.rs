// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Classification evaluation over the samples of a dataset
//!
//! Labels are read from the ground truth and prediction fields in sample
//! order, aligned pairwise, and handed to the metrics module. Per-sample
//! outcomes can be written back to an evaluation field.

use super::metrics::{
    self, accuracy, average_precision, precision_recall_curve, precision_recall_fscore, roc_curve,
    Average, ClassificationReport, ConfusionMatrix,
};
use super::plots::{ConfusionMatrixDisplay, ConfusionMatrixOptions, PrecisionRecallDisplay, RocCurveDisplay};
use crate::catalog::{RunConfigRecord, RunRecord};
use crate::environment::VERSION;
use crate::labels::{confidences_of, labels_of, logits_of, FieldKind, FieldValue};
use crate::store::Samples;
use anyhow::{bail, Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

pub const DEFAULT_GT_FIELD: &str = "ground_truth";
pub const DEFAULT_MISSING: &str = "none";

/// Options for [`evaluate_classifications`]
#[derive(Debug, Clone)]
pub struct ClassificationOptions {
    pub gt_field: String,
    /// Field in which to record whether each prediction is correct
    pub eval_field: Option<String>,
    /// Key under which the run is saved on the dataset
    pub eval_key: Option<String>,
    /// Possible classes; the observed labels when absent
    pub classes: Option<Vec<String>>,
    /// Replacement for missing labels
    pub missing: String,
}

impl Default for ClassificationOptions {
    fn default() -> Self {
        Self {
            gt_field: DEFAULT_GT_FIELD.to_string(),
            eval_field: None,
            eval_key: None,
            classes: None,
            missing: DEFAULT_MISSING.to_string(),
        }
    }
}

/// Options for [`evaluate_binary_classifications`]
#[derive(Debug, Clone)]
pub struct BinaryOptions {
    pub gt_field: String,
    /// Field in which to record the TP/FP/FN/TN status of each prediction
    pub eval_field: Option<String>,
    pub eval_key: Option<String>,
}

impl Default for BinaryOptions {
    fn default() -> Self {
        Self {
            gt_field: DEFAULT_GT_FIELD.to_string(),
            eval_field: None,
            eval_key: None,
        }
    }
}

/// Options for [`evaluate_top_k_classifications`]
#[derive(Debug, Clone)]
pub struct TopKOptions {
    pub gt_field: String,
    /// Field in which to record whether each prediction is top-k correct
    pub eval_field: Option<String>,
}

impl Default for TopKOptions {
    fn default() -> Self {
        Self {
            gt_field: DEFAULT_GT_FIELD.to_string(),
            eval_field: None,
        }
    }
}

struct LabelPairs {
    ytrue: Vec<Option<String>>,
    ypred: Vec<Option<String>>,
    confs: Vec<Option<f64>>,
}

async fn load_pairs(samples: &Samples<'_>, gt_field: &str, pred_field: &str) -> Result<LabelPairs> {
    let gt = samples
        .classifications(gt_field)
        .await
        .with_context(|| format!("Failed to read ground truth field '{}'", gt_field))?;
    let pred = samples
        .classifications(pred_field)
        .await
        .with_context(|| format!("Failed to read prediction field '{}'", pred_field))?;

    if gt.len() != pred.len() {
        bail!(
            "Ground truth and predictions are misaligned ({} != {})",
            gt.len(),
            pred.len()
        );
    }

    Ok(LabelPairs {
        ytrue: labels_of(&gt),
        ypred: labels_of(&pred),
        confs: confidences_of(&pred),
    })
}

async fn write_eval_field(
    samples: &Samples<'_>,
    field: &str,
    kind: FieldKind,
    values: &[FieldValue],
) -> Result<()> {
    samples
        .add_field_if_necessary(field, kind)
        .await
        .with_context(|| format!("Failed to declare field '{}'", field))?;
    samples
        .set_values(field, values)
        .await
        .with_context(|| format!("Failed to write field '{}'", field))?;
    tracing::info!("Wrote {} values to '{}' on '{}'", values.len(), field, samples.dataset);
    Ok(())
}

async fn save_run(
    samples: &Samples<'_>,
    key: &str,
    cls: &str,
    method: &str,
    gt_field: &str,
    pred_field: &str,
) -> Result<()> {
    let run = RunRecord {
        key: key.to_string(),
        version: VERSION.to_string(),
        timestamp: Utc::now(),
        config: RunConfigRecord {
            cls: cls.to_string(),
            method: Some(method.to_string()),
            gt_field: Some(gt_field.to_string()),
            pred_field: Some(pred_field.to_string()),
            ..RunConfigRecord::default()
        },
        view_stages: Vec::new(),
    };
    samples
        .store
        .save_evaluation(samples.dataset, &run)
        .await
        .with_context(|| format!("Failed to save evaluation '{}'", key))?;
    tracing::info!("Saved evaluation '{}' on '{}'", key, samples.dataset);
    Ok(())
}

/// Evaluate the classification predictions in `pred_field` against the
/// ground truth labels
pub async fn evaluate_classifications(
    samples: &Samples<'_>,
    pred_field: &str,
    options: &ClassificationOptions,
) -> Result<ClassificationResults> {
    tracing::info!(
        "Evaluating '{}' against '{}' on '{}'",
        pred_field,
        options.gt_field,
        samples.dataset
    );
    let pairs = load_pairs(samples, &options.gt_field, pred_field).await?;

    if let Some(ref eval_field) = options.eval_field {
        let correct: Vec<FieldValue> = pairs
            .ytrue
            .iter()
            .zip(&pairs.ypred)
            .map(|(t, p)| FieldValue::Bool(t == p))
            .collect();
        write_eval_field(samples, eval_field, FieldKind::Boolean, &correct).await?;
    }

    let classes = match options.classes {
        Some(ref classes) => classes.clone(),
        None => observed_classes(&pairs.ytrue, &pairs.ypred),
    };

    let results = ClassificationResults::new(&pairs.ytrue, &pairs.ypred, pairs.confs, classes, &options.missing);

    if let Some(ref key) = options.eval_key {
        save_run(
            samples,
            key,
            "labelscope.evaluation.ClassificationEvaluationConfig",
            "simple",
            &options.gt_field,
            pred_field,
        )
        .await?;
    }

    Ok(results)
}

/// Evaluate binary predictions; `classes` is `[negative, positive]`.
///
/// Missing labels count as the negative class and missing confidences as 0.
pub async fn evaluate_binary_classifications(
    samples: &Samples<'_>,
    classes: &[String],
    pred_field: &str,
    options: &BinaryOptions,
) -> Result<BinaryClassificationResults> {
    let (neg_label, pos_label) = match classes {
        [neg, pos] => (neg.clone(), pos.clone()),
        _ => bail!("Binary evaluation needs exactly 2 classes, got {}", classes.len()),
    };
    tracing::info!(
        "Evaluating '{}' against '{}' on '{}' (positive class '{}')",
        pred_field,
        options.gt_field,
        samples.dataset,
        pos_label
    );
    let pairs = load_pairs(samples, &options.gt_field, pred_field).await?;

    if let Some(ref eval_field) = options.eval_field {
        let outcomes: Vec<FieldValue> = pairs
            .ytrue
            .iter()
            .zip(&pairs.ypred)
            .map(|(t, p)| {
                let truth = t.as_deref() == Some(pos_label.as_str());
                let pred = p.as_deref() == Some(pos_label.as_str());
                FieldValue::Str(binary_outcome(truth, pred).to_string())
            })
            .collect();
        write_eval_field(samples, eval_field, FieldKind::String, &outcomes).await?;
    }

    let results = BinaryClassificationResults::new(&pairs.ytrue, &pairs.ypred, pairs.confs, [neg_label, pos_label]);

    if let Some(ref key) = options.eval_key {
        save_run(
            samples,
            key,
            "labelscope.evaluation.BinaryClassificationEvaluationConfig",
            "binary",
            &options.gt_field,
            pred_field,
        )
        .await?;
    }

    Ok(results)
}

fn binary_outcome(truth: bool, pred: bool) -> &'static str {
    match (truth, pred) {
        (true, true) => "TP",
        (true, false) => "FN",
        (false, false) => "TN",
        (false, true) => "FP",
    }
}

/// Top-k accuracy of the logits in `pred_field`, in `[0, 1]`.
///
/// `classes` lists the class of each logit index. Samples without logits
/// are counted as incorrect.
pub async fn evaluate_top_k_classifications(
    samples: &Samples<'_>,
    k: usize,
    classes: &[String],
    pred_field: &str,
    options: &TopKOptions,
) -> Result<f64> {
    if k == 0 {
        bail!("k must be at least 1");
    }

    let gt = samples
        .classifications(&options.gt_field)
        .await
        .with_context(|| format!("Failed to read ground truth field '{}'", options.gt_field))?;
    let pred = samples
        .classifications(pred_field)
        .await
        .with_context(|| format!("Failed to read prediction field '{}'", pred_field))?;

    let targets: HashMap<&str, usize> = classes.iter().enumerate().map(|(i, c)| (c.as_str(), i)).collect();

    let mut correct = Vec::with_capacity(gt.len());
    for (label, logits) in labels_of(&gt).iter().zip(logits_of(&pred)) {
        let hit = match logits {
            Some(logits) => {
                let target = label
                    .as_deref()
                    .and_then(|l| targets.get(l).copied())
                    .with_context(|| format!("Ground truth label {:?} is not one of the classes", label))?;
                top_k_indices(&logits, k).contains(&target)
            }
            None => false,
        };
        correct.push(hit);
    }

    if let Some(ref eval_field) = options.eval_field {
        let values: Vec<FieldValue> = correct.iter().map(|c| FieldValue::Bool(*c)).collect();
        write_eval_field(samples, eval_field, FieldKind::Boolean, &values).await?;
    }

    let num_correct = correct.iter().filter(|c| **c).count();
    let top_k_accuracy = if correct.is_empty() {
        0.0
    } else {
        num_correct as f64 / correct.len() as f64
    };
    tracing::info!("Top-{} accuracy: {:.4}", k, top_k_accuracy);

    Ok(top_k_accuracy)
}

/// Indices of the `k` largest logits; earlier indices win ties and NaN
/// ranks above every number
fn top_k_indices(logits: &[f64], k: usize) -> Vec<usize> {
    let mut order: Vec<usize> = (0..logits.len()).collect();
    order.sort_by(|&a, &b| logits[b].total_cmp(&logits[a]));
    order.truncate(k);
    order
}

/// Sorted union of the non-missing labels
fn observed_classes(ytrue: &[Option<String>], ypred: &[Option<String>]) -> Vec<String> {
    ytrue
        .iter()
        .chain(ypred)
        .flatten()
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Replace missing labels; reports whether any were found
fn clean_labels(y: &[Option<String>], missing: &str) -> (Vec<String>, bool) {
    let mut found_missing = false;
    let clean = y
        .iter()
        .map(|yi| match yi {
            Some(label) => label.clone(),
            None => {
                found_missing = true;
                missing.to_string()
            }
        })
        .collect();
    (clean, found_missing)
}

fn parse_labels(
    ytrue: &[Option<String>],
    ypred: &[Option<String>],
    mut classes: Vec<String>,
    missing: &str,
) -> (Vec<String>, Vec<String>, Vec<String>) {
    let (ytrue, missing_true) = clean_labels(ytrue, missing);
    let (ypred, missing_pred) = clean_labels(ypred, missing);

    if (missing_true || missing_pred) && !classes.iter().any(|c| c == missing) {
        classes.push(missing.to_string());
    }
    (ytrue, ypred, classes)
}

/// Score of the positive class: the confidence when the positive class was
/// predicted, else its complement
fn to_binary_scores(ypred: &[Option<String>], confs: &[Option<f64>], pos_label: &str) -> Vec<f64> {
    ypred
        .iter()
        .zip(confs)
        .map(|(pred, conf)| {
            let conf = conf.unwrap_or(0.0);
            if pred.as_deref() == Some(pos_label) {
                conf
            } else {
                1.0 - conf
            }
        })
        .collect()
}

/// Accuracy plus averaged precision, recall and F-beta
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassificationMetrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub fscore: f64,
}

/// Results of a classification evaluation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationResults {
    pub ytrue: Vec<String>,
    pub ypred: Vec<String>,
    pub confs: Vec<Option<f64>>,
    pub classes: Vec<String>,
    pub missing: String,
}

impl ClassificationResults {
    pub fn new(
        ytrue: &[Option<String>],
        ypred: &[Option<String>],
        confs: Vec<Option<f64>>,
        classes: Vec<String>,
        missing: &str,
    ) -> Self {
        let (ytrue, ypred, classes) = parse_labels(ytrue, ypred, classes, missing);
        Self {
            ytrue,
            ypred,
            confs,
            classes,
            missing: missing.to_string(),
        }
    }

    /// Classes that metrics are computed over (all but the missing label)
    pub fn labels(&self) -> Vec<String> {
        self.classes.iter().filter(|c| **c != self.missing).cloned().collect()
    }

    pub fn report(&self) -> ClassificationReport {
        ClassificationReport::new(&self.ytrue, &self.ypred, &self.labels())
    }

    pub fn metrics(&self, average: Average, beta: f64) -> ClassificationMetrics {
        compute_metrics(&self.ytrue, &self.ypred, &self.labels(), average, beta)
    }

    pub fn format_report(&self, digits: usize) -> String {
        self.report().format(digits)
    }

    pub fn print_report(&self, digits: usize) {
        println!("{}", self.format_report(digits));
    }

    /// Confusion matrix over all classes, missing label included
    pub fn confusion_matrix(&self) -> ConfusionMatrix {
        ConfusionMatrix::from_labels(&self.ytrue, &self.ypred, &self.classes)
    }

    pub fn plot_confusion_matrix(&self, options: &ConfusionMatrixOptions) -> Result<ConfusionMatrixDisplay> {
        ConfusionMatrixDisplay::new(self.confusion_matrix(), options)
    }
}

fn compute_metrics(
    ytrue: &[String],
    ypred: &[String],
    labels: &[String],
    average: Average,
    beta: f64,
) -> ClassificationMetrics {
    let scores = precision_recall_fscore(ytrue, ypred, labels, average, beta);
    ClassificationMetrics {
        accuracy: accuracy(ytrue, ypred),
        precision: scores.precision,
        recall: scores.recall,
        fscore: scores.fscore,
    }
}

/// Results of a binary classification evaluation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BinaryClassificationResults {
    #[serde(flatten)]
    pub base: ClassificationResults,
    pub pos_label: String,
    /// Score of the positive class for each sample
    pub scores: Vec<f64>,
}

impl BinaryClassificationResults {
    pub fn new(
        ytrue: &[Option<String>],
        ypred: &[Option<String>],
        confs: Vec<Option<f64>>,
        classes: [String; 2],
    ) -> Self {
        let [neg_label, pos_label] = classes;
        let scores = to_binary_scores(ypred, &confs, &pos_label);
        let base = ClassificationResults::new(
            ytrue,
            ypred,
            confs,
            vec![neg_label.clone(), pos_label.clone()],
            &neg_label,
        );
        Self {
            base,
            pos_label,
            scores,
        }
    }

    /// Both classes
    pub fn labels(&self) -> Vec<String> {
        self.base.classes.clone()
    }

    pub fn report(&self) -> ClassificationReport {
        ClassificationReport::new(&self.base.ytrue, &self.base.ypred, &self.labels())
    }

    pub fn metrics(&self, average: Average, beta: f64) -> ClassificationMetrics {
        compute_metrics(&self.base.ytrue, &self.base.ypred, &self.labels(), average, beta)
    }

    pub fn format_report(&self, digits: usize) -> String {
        self.report().format(digits)
    }

    pub fn print_report(&self, digits: usize) {
        println!("{}", self.format_report(digits));
    }

    pub fn plot_confusion_matrix(&self, options: &ConfusionMatrixOptions) -> Result<ConfusionMatrixDisplay> {
        self.base.plot_confusion_matrix(options)
    }

    fn positives(&self) -> Vec<bool> {
        self.base.ytrue.iter().map(|y| *y == self.pos_label).collect()
    }

    /// Average precision of the positive class scores.
    ///
    /// Binary targets yield the same value for every averaging strategy.
    pub fn average_precision(&self, average: Average) -> f64 {
        tracing::debug!("Average precision ({} average)", average);
        average_precision(&self.positives(), &self.scores)
    }

    pub fn plot_pr_curve(&self, average: Average) -> PrecisionRecallDisplay {
        let curve = precision_recall_curve(&self.positives(), &self.scores);
        PrecisionRecallDisplay::new(&curve, self.average_precision(average))
    }

    /// Fails when the ground truth contains only one class
    pub fn plot_roc_curve(&self) -> Result<RocCurveDisplay> {
        let curve = roc_curve(&self.positives(), &self.scores)?;
        let roc_auc = metrics::auc(&curve.x, &curve.y)?;
        RocCurveDisplay::new(&curve, roc_auc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::tests::record;
    use crate::store::{CatalogStore, MemoryStore};
    use crate::store::memory::SampleDocument;
    use serde_json::json;

    fn some(labels: &[Option<&str>]) -> Vec<Option<String>> {
        labels.iter().map(|l| l.map(str::to_string)).collect()
    }

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    fn doc(value: serde_json::Value) -> SampleDocument {
        value.as_object().cloned().unwrap_or_default()
    }

    async fn pets_store() -> MemoryStore {
        let store = MemoryStore::new();
        let samples = vec![
            doc(json!({"ground_truth": {"label": "cat"}, "predictions": {"label": "cat", "confidence": 0.9, "logits": [0.1, 2.0, 0.3]}})),
            doc(json!({"ground_truth": {"label": "dog"}, "predictions": {"label": "cat", "confidence": 0.6, "logits": [0.2, 1.5, 1.4]}})),
            doc(json!({"ground_truth": {"label": "dog"}, "predictions": {"label": "dog", "confidence": 0.8, "logits": [0.0, 0.1, 3.0]}})),
            doc(json!({"ground_truth": {"label": "bird"}})),
            doc(json!({"ground_truth": {"label": "bird"}, "predictions": {"label": "bird", "confidence": 0.7, "logits": [1.0, 0.5, 0.2]}})),
        ];
        store.insert(record("a1", "pets", 1_000), samples).await;
        store
    }

    fn classes() -> Vec<String> {
        strings(&["bird", "cat", "dog"])
    }

    /// One sample per `(ground truth, prediction)` pair; `None` leaves the field out
    async fn labeled_store(name: &str, pairs: &[(Option<&str>, Option<&str>)]) -> MemoryStore {
        let store = MemoryStore::new();
        let samples = pairs
            .iter()
            .map(|(gt, pred)| {
                let mut sample = SampleDocument::new();
                if let Some(gt) = gt {
                    sample.insert("ground_truth".to_string(), json!({ "label": gt }));
                }
                if let Some(pred) = pred {
                    sample.insert("predictions".to_string(), json!({ "label": pred, "confidence": 0.9 }));
                }
                sample
            })
            .collect();
        store.insert(record("b1", name, 2_000), samples).await;
        store
    }

    fn bools(values: &[bool]) -> Vec<Option<serde_json::Value>> {
        values.iter().map(|v| Some(json!(v))).collect()
    }

    #[test]
    fn test_missing_labels_are_substituted() {
        let results = ClassificationResults::new(
            &some(&[Some("cat"), None]),
            &some(&[None, Some("dog")]),
            vec![None, Some(0.5)],
            strings(&["cat", "dog"]),
            "none",
        );

        assert_eq!(results.ytrue, strings(&["cat", "none"]));
        assert_eq!(results.ypred, strings(&["none", "dog"]));
        assert_eq!(results.classes, strings(&["cat", "dog", "none"]));
        assert_eq!(results.labels(), strings(&["cat", "dog"]));
    }

    #[test]
    fn test_missing_class_not_duplicated() {
        let results = ClassificationResults::new(
            &some(&[None]),
            &some(&[Some("none")]),
            vec![None],
            strings(&["cat", "none"]),
            "none",
        );
        assert_eq!(results.classes, strings(&["cat", "none"]));
    }

    #[test]
    fn test_binary_scores() {
        let scores = to_binary_scores(
            &some(&[Some("pos"), Some("neg"), None, Some("pos")]),
            &[Some(0.8), Some(0.3), None, None],
            "pos",
        );
        assert_eq!(scores.len(), 4);
        assert!((scores[0] - 0.8).abs() < 1e-12);
        assert!((scores[1] - 0.7).abs() < 1e-12);
        assert_eq!(scores[2], 1.0);
        assert_eq!(scores[3], 0.0);
    }

    #[test]
    fn test_top_k_indices() {
        assert_eq!(top_k_indices(&[0.1, 0.9, 0.5], 2), vec![1, 2]);
        assert_eq!(top_k_indices(&[0.5, 0.5], 1), vec![0]);
        assert_eq!(top_k_indices(&[0.5], 3), vec![0]);
    }

    #[test]
    fn test_top_k_indices_with_nan_logits() {
        let nan = f64::NAN;
        let logits = [
            0.3, nan, 0.9, nan, 0.1, 0.5, nan, 0.2, 0.7, nan, 0.4,
            0.6, nan, 0.8, 0.0, nan, 0.35, 0.45, 0.55, 0.65, 0.75, 0.85,
        ];
        let top = top_k_indices(&logits, 8);
        assert_eq!(top, vec![1, 3, 6, 9, 12, 15, 2, 21]);
    }

    #[tokio::test]
    async fn test_evaluate_classifications_writes_eval_field() {
        let store = pets_store().await;
        let samples = Samples::new(&store, "pets");
        let options = ClassificationOptions {
            eval_field: Some("eval".to_string()),
            eval_key: Some("eval".to_string()),
            ..ClassificationOptions::default()
        };

        let results = evaluate_classifications(&samples, "predictions", &options).await.unwrap();

        assert_eq!(results.classes, strings(&["bird", "cat", "dog", "none"]));
        assert_eq!(results.ypred[3], "none");

        let m = results.metrics(Average::Micro, 1.0);
        assert!((m.accuracy - 0.6).abs() < 1e-12);
        // none excluded from the labels: 3 correct of 4 real predictions
        assert!((m.precision - 0.75).abs() < 1e-12);
        assert!((m.recall - 0.6).abs() < 1e-12);

        assert_eq!(
            store.sample_values("pets", "eval").await,
            bools(&[true, false, true, false, true])
        );
        let record = store.dataset("pets").await.unwrap();
        assert!(record.sample_fields.iter().any(|f| f.name == "eval"));
        assert_eq!(
            record.evaluations["eval"].config.pred_field.as_deref(),
            Some("predictions")
        );

        let report = results.report();
        assert!(report.micro_avg.is_some());
        assert!(results.format_report(2).contains("micro avg"));
    }

    #[tokio::test]
    async fn test_explicit_classes_are_kept() {
        let store = pets_store().await;
        let samples = Samples::new(&store, "pets");
        let options = ClassificationOptions {
            classes: Some(strings(&["cat", "dog"])),
            missing: "<none>".to_string(),
            ..ClassificationOptions::default()
        };

        let results = evaluate_classifications(&samples, "predictions", &options).await.unwrap();
        assert_eq!(results.classes, strings(&["cat", "dog", "<none>"]));

        let cm = results.confusion_matrix();
        assert_eq!(cm.counts[0], vec![1, 0, 0]);
        assert_eq!(cm.counts[1], vec![1, 1, 0]);
    }

    #[tokio::test]
    async fn test_two_missing_labels_count_as_correct() {
        let store = labeled_store(
            "partial",
            &[(Some("cat"), Some("cat")), (None, None), (Some("dog"), None), (None, Some("dog"))],
        )
        .await;
        let samples = Samples::new(&store, "partial");
        let options = ClassificationOptions {
            eval_field: Some("eval".to_string()),
            ..ClassificationOptions::default()
        };

        evaluate_classifications(&samples, "predictions", &options).await.unwrap();

        assert_eq!(
            store.sample_values("partial", "eval").await,
            bools(&[true, true, false, false])
        );
    }

    #[tokio::test]
    async fn test_classes_beyond_observed_report_accuracy() {
        let store = labeled_store(
            "complete",
            &[(Some("cat"), Some("cat")), (Some("dog"), Some("dog")), (Some("dog"), Some("cat"))],
        )
        .await;
        let samples = Samples::new(&store, "complete");
        let options = ClassificationOptions {
            classes: Some(strings(&["bird", "cat", "dog"])),
            ..ClassificationOptions::default()
        };

        let results = evaluate_classifications(&samples, "predictions", &options).await.unwrap();
        let report = results.report();

        assert!((report.accuracy.unwrap() - 2.0 / 3.0).abs() < 1e-12);
        assert!(report.micro_avg.is_none());
        assert!(!results.format_report(2).contains("micro avg"));
    }

    #[tokio::test]
    async fn test_binary_evaluation() {
        let store = pets_store().await;
        let samples = Samples::new(&store, "pets");
        let options = BinaryOptions {
            eval_field: Some("outcome".to_string()),
            ..BinaryOptions::default()
        };

        let results = evaluate_binary_classifications(&samples, &strings(&["other", "dog"]), "predictions", &options)
            .await
            .unwrap();

        assert_eq!(results.pos_label, "dog");
        assert_eq!(results.labels(), strings(&["other", "dog"]));
        assert!((results.scores[2] - 0.8).abs() < 1e-12);
        assert_eq!(results.scores[3], 1.0);

        let ap = results.average_precision(Average::Micro);
        assert!(ap > 0.0 && ap <= 1.0);
        assert!(results.plot_pr_curve(Average::Micro).label.starts_with("AP = "));
        assert!(results.plot_roc_curve().is_ok());

        let record = store.dataset("pets").await.unwrap();
        let field = record.sample_fields.iter().find(|f| f.name == "outcome").unwrap();
        assert_eq!(field.ftype, FieldKind::String.ftype());

        let outcomes = |values: &[&str]| values.iter().map(|v| Some(json!(v))).collect::<Vec<_>>();
        assert_eq!(
            store.sample_values("pets", "outcome").await,
            outcomes(&["TN", "FN", "TP", "TN", "TN"])
        );

        evaluate_binary_classifications(&samples, &strings(&["other", "cat"]), "predictions", &options)
            .await
            .unwrap();
        assert_eq!(
            store.sample_values("pets", "outcome").await,
            outcomes(&["TP", "FP", "TN", "TN", "TN"])
        );
    }

    #[tokio::test]
    async fn test_binary_requires_two_classes() {
        let store = pets_store().await;
        let samples = Samples::new(&store, "pets");
        let result =
            evaluate_binary_classifications(&samples, &classes(), "predictions", &BinaryOptions::default()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_top_k_accuracy() {
        let store = pets_store().await;
        let samples = Samples::new(&store, "pets");

        let top1 = evaluate_top_k_classifications(&samples, 1, &classes(), "predictions", &TopKOptions::default())
            .await
            .unwrap();
        assert!((top1 - 0.6).abs() < 1e-12);

        let options = TopKOptions {
            eval_field: Some("top2".to_string()),
            ..TopKOptions::default()
        };
        let top2 = evaluate_top_k_classifications(&samples, 2, &classes(), "predictions", &options)
            .await
            .unwrap();
        assert!((top2 - 0.8).abs() < 1e-12);
        assert_eq!(
            store.sample_values("pets", "top2").await,
            bools(&[true, true, true, false, true])
        );

        assert!(evaluate_top_k_classifications(&samples, 0, &classes(), "predictions", &TopKOptions::default())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_top_k_rejects_unknown_ground_truth() {
        let store = pets_store().await;
        let samples = Samples::new(&store, "pets");
        let result = evaluate_top_k_classifications(
            &samples,
            1,
            &strings(&["cat", "dog"]),
            "predictions",
            &TopKOptions::default(),
        )
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_synthetic_dataset_evaluates() {
        let store = MemoryStore::synthetic("demo", 200, 7);
        let samples = Samples::new(&store, "demo");
        let results = evaluate_classifications(&samples, "predictions", &ClassificationOptions::default())
            .await
            .unwrap();

        assert_eq!(results.ytrue.len(), 200);
        let m = results.metrics(Average::Weighted, 1.0);
        assert!(m.accuracy > 0.5 && m.accuracy < 0.95);
    }
}
