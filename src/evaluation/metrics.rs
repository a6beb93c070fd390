// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Classification metrics over aligned label sequences
//!
//! Implements:
//! - Confusion matrix over an explicit label list
//! - Accuracy, Precision, Recall, F-beta with micro/macro/weighted averaging
//! - Per-class classification report (dict and text forms)
//! - ROC and precision-recall curves, average precision, trapezoidal AUC
//!
//! Undefined ratios (zero denominators) evaluate to 0.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Averaging strategy for multi-class precision/recall/F-beta
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Average {
    /// Pool true/false positives over all classes
    #[default]
    Micro,
    /// Unweighted mean of per-class scores
    Macro,
    /// Per-class scores weighted by ground truth support
    Weighted,
}

impl FromStr for Average {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "micro" => Ok(Average::Micro),
            "macro" => Ok(Average::Macro),
            "weighted" => Ok(Average::Weighted),
            other => bail!("Unsupported averaging strategy: {}", other),
        }
    }
}

impl fmt::Display for Average {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Average::Micro => "micro",
            Average::Macro => "macro",
            Average::Weighted => "weighted",
        };
        f.write_str(name)
    }
}

/// Confusion matrix over an explicit label list; rows are ground truth,
/// columns are predictions. Pairs involving a label outside the list are
/// not counted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub labels: Vec<String>,
    pub counts: Vec<Vec<usize>>,
}

impl ConfusionMatrix {
    pub fn from_labels(ytrue: &[String], ypred: &[String], labels: &[String]) -> Self {
        assert_eq!(ytrue.len(), ypred.len(), "Prediction and ground truth lengths must match");

        let index = |label: &str| labels.iter().position(|l| l == label);
        let mut counts = vec![vec![0; labels.len()]; labels.len()];

        for (truth, pred) in ytrue.iter().zip(ypred.iter()) {
            if let (Some(i), Some(j)) = (index(truth), index(pred)) {
                counts[i][j] += 1;
            }
        }

        Self {
            labels: labels.to_vec(),
            counts,
        }
    }

    /// Total number of counted pairs
    pub fn total(&self) -> usize {
        self.counts.iter().flatten().sum()
    }

    /// Largest cell value
    pub fn max_count(&self) -> usize {
        self.counts.iter().flatten().copied().max().unwrap_or(0)
    }

    /// Format as a human-readable table
    pub fn format(&self) -> String {
        let width = self
            .labels
            .iter()
            .map(|l| l.len())
            .chain(std::iter::once(6))
            .max()
            .unwrap_or(6);

        let mut out = format!("{:>width$}", "", width = width);
        for label in &self.labels {
            out.push_str(&format!(" {:>width$}", label, width = width));
        }
        out.push('\n');

        for (label, row) in self.labels.iter().zip(&self.counts) {
            out.push_str(&format!("{:>width$}", label, width = width));
            for count in row {
                out.push_str(&format!(" {:>width$}", count, width = width));
            }
            out.push('\n');
        }
        out
    }
}

/// Per-label counts: true positives, predicted occurrences, true occurrences
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct LabelCounts {
    tp: usize,
    pred: usize,
    truth: usize,
}

fn label_counts(ytrue: &[String], ypred: &[String], labels: &[String]) -> Vec<LabelCounts> {
    labels
        .iter()
        .map(|label| {
            let mut counts = LabelCounts::default();
            for (truth, pred) in ytrue.iter().zip(ypred.iter()) {
                let t = truth == label;
                let p = pred == label;
                if t && p {
                    counts.tp += 1;
                }
                if t {
                    counts.truth += 1;
                }
                if p {
                    counts.pred += 1;
                }
            }
            counts
        })
        .collect()
}

fn ratio(num: usize, denom: usize) -> f64 {
    if denom == 0 {
        0.0
    } else {
        num as f64 / denom as f64
    }
}

/// F-beta Score: (1 + beta^2) * (Precision * Recall) / (beta^2 * Precision + Recall)
pub fn f_beta(precision: f64, recall: f64, beta: f64) -> f64 {
    let beta_sq = beta * beta;
    let denom = beta_sq * precision + recall;
    if denom == 0.0 {
        return 0.0;
    }
    (1.0 + beta_sq) * precision * recall / denom
}

/// Fraction of samples whose prediction equals the ground truth
pub fn accuracy(ytrue: &[String], ypred: &[String]) -> f64 {
    let correct = ytrue.iter().zip(ypred.iter()).filter(|(t, p)| t == p).count();
    ratio(correct, ytrue.len())
}

/// Precision, recall and F-beta of one class or one average
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Scores {
    pub precision: f64,
    pub recall: f64,
    pub fscore: f64,
    pub support: usize,
}

/// Per-class scores in `labels` order
pub fn per_class_scores(ytrue: &[String], ypred: &[String], labels: &[String], beta: f64) -> Vec<Scores> {
    label_counts(ytrue, ypred, labels)
        .into_iter()
        .map(|c| {
            let precision = ratio(c.tp, c.pred);
            let recall = ratio(c.tp, c.truth);
            Scores {
                precision,
                recall,
                fscore: f_beta(precision, recall, beta),
                support: c.truth,
            }
        })
        .collect()
}

/// Averaged precision, recall and F-beta over `labels`
pub fn precision_recall_fscore(
    ytrue: &[String],
    ypred: &[String],
    labels: &[String],
    average: Average,
    beta: f64,
) -> Scores {
    let counts = label_counts(ytrue, ypred, labels);
    let support: usize = counts.iter().map(|c| c.truth).sum();

    match average {
        Average::Micro => {
            let tp: usize = counts.iter().map(|c| c.tp).sum();
            let pred: usize = counts.iter().map(|c| c.pred).sum();
            let precision = ratio(tp, pred);
            let recall = ratio(tp, support);
            Scores {
                precision,
                recall,
                fscore: f_beta(precision, recall, beta),
                support,
            }
        }
        Average::Macro | Average::Weighted => {
            let scores = per_class_scores(ytrue, ypred, labels, beta);
            let weights: Vec<f64> = match average {
                Average::Weighted => scores.iter().map(|s| s.support as f64).collect(),
                _ => vec![1.0; scores.len()],
            };
            let total: f64 = weights.iter().sum();
            let mean = |f: fn(&Scores) -> f64| {
                if total == 0.0 {
                    0.0
                } else {
                    scores.iter().zip(&weights).map(|(s, w)| f(s) * w).sum::<f64>() / total
                }
            };
            Scores {
                precision: mean(|s| s.precision),
                recall: mean(|s| s.recall),
                fscore: mean(|s| s.fscore),
                support,
            }
        }
    }
}

/// One row of a classification report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassReport {
    pub label: String,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub support: usize,
}

/// Full classification report with per-class and averaged rows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationReport {
    pub classes: Vec<ClassReport>,
    /// Present when the report labels include every observed label
    pub accuracy: Option<f64>,
    /// Present instead of `accuracy` when some observed labels are excluded
    pub micro_avg: Option<Scores>,
    pub macro_avg: Scores,
    pub weighted_avg: Scores,
}

impl ClassificationReport {
    pub fn new(ytrue: &[String], ypred: &[String], labels: &[String]) -> Self {
        let classes = labels
            .iter()
            .zip(per_class_scores(ytrue, ypred, labels, 1.0))
            .map(|(label, s)| ClassReport {
                label: label.clone(),
                precision: s.precision,
                recall: s.recall,
                f1_score: s.fscore,
                support: s.support,
            })
            .collect();

        let observed: BTreeSet<&String> = ytrue.iter().chain(ypred.iter()).collect();
        let requested: BTreeSet<&String> = labels.iter().collect();
        let micro = precision_recall_fscore(ytrue, ypred, labels, Average::Micro, 1.0);
        let (accuracy, micro_avg) = if requested.is_superset(&observed) {
            (Some(micro.fscore), None)
        } else {
            (None, Some(micro))
        };

        Self {
            classes,
            accuracy,
            micro_avg,
            macro_avg: precision_recall_fscore(ytrue, ypred, labels, Average::Macro, 1.0),
            weighted_avg: precision_recall_fscore(ytrue, ypred, labels, Average::Weighted, 1.0),
        }
    }

    /// Dict form keyed by class name plus `accuracy`/`micro avg`, `macro avg`, `weighted avg`
    pub fn to_json(&self) -> Value {
        let row = |p: f64, r: f64, f: f64, s: usize| {
            json!({ "precision": p, "recall": r, "f1-score": f, "support": s })
        };

        let mut map = Map::new();
        for c in &self.classes {
            map.insert(c.label.clone(), row(c.precision, c.recall, c.f1_score, c.support));
        }
        if let Some(accuracy) = self.accuracy {
            map.insert("accuracy".to_string(), json!(accuracy));
        }
        if let Some(ref m) = self.micro_avg {
            map.insert("micro avg".to_string(), row(m.precision, m.recall, m.fscore, m.support));
        }
        let m = &self.macro_avg;
        map.insert("macro avg".to_string(), row(m.precision, m.recall, m.fscore, m.support));
        let w = &self.weighted_avg;
        map.insert("weighted avg".to_string(), row(w.precision, w.recall, w.fscore, w.support));
        Value::Object(map)
    }

    /// Text table with `digits` decimals
    pub fn format(&self, digits: usize) -> String {
        let width = self
            .classes
            .iter()
            .map(|c| c.label.len())
            .chain(std::iter::once("weighted avg".len()))
            .chain(std::iter::once(digits))
            .max()
            .unwrap_or(0);

        let mut out = format!(
            "{:>width$}  {:>9} {:>9} {:>9} {:>9}\n\n",
            "",
            "precision",
            "recall",
            "f1-score",
            "support",
            width = width
        );

        let row = |name: &str, p: f64, r: f64, f: f64, s: usize| {
            format!(
                "{:>width$}  {:>9.digits$} {:>9.digits$} {:>9.digits$} {:>9}\n",
                name,
                p,
                r,
                f,
                s,
                width = width,
                digits = digits
            )
        };

        for c in &self.classes {
            out.push_str(&row(&c.label, c.precision, c.recall, c.f1_score, c.support));
        }
        out.push('\n');

        if let Some(accuracy) = self.accuracy {
            out.push_str(&format!(
                "{:>width$}  {:>9} {:>9} {:>9.digits$} {:>9}\n",
                "accuracy",
                "",
                "",
                accuracy,
                self.macro_avg.support,
                width = width,
                digits = digits
            ));
        }
        if let Some(ref m) = self.micro_avg {
            out.push_str(&row("micro avg", m.precision, m.recall, m.fscore, m.support));
        }
        let m = &self.macro_avg;
        out.push_str(&row("macro avg", m.precision, m.recall, m.fscore, m.support));
        let w = &self.weighted_avg;
        out.push_str(&row("weighted avg", w.precision, w.recall, w.fscore, w.support));
        out
    }
}

/// A curve sampled at decreasing score thresholds
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Curve {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub thresholds: Vec<f64>,
}

/// Cumulative false/true positive counts at each distinct score, highest first
fn binary_clf_curve(positive: &[bool], scores: &[f64]) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
    assert_eq!(positive.len(), scores.len(), "Label and score lengths must match");

    let mut pairs: Vec<(bool, f64)> = positive.iter().copied().zip(scores.iter().copied()).collect();
    // NaN scores rank above every number
    pairs.sort_by(|a, b| b.1.total_cmp(&a.1));

    let mut fps = Vec::new();
    let mut tps = Vec::new();
    let mut thresholds = Vec::new();
    let mut tp = 0.0;

    for (idx, (is_pos, score)) in pairs.iter().enumerate() {
        if *is_pos {
            tp += 1.0;
        }
        let last_of_run = pairs
            .get(idx + 1)
            .map_or(true, |next| next.1 != *score && !(next.1.is_nan() && score.is_nan()));
        if last_of_run {
            tps.push(tp);
            fps.push((idx + 1) as f64 - tp);
            thresholds.push(*score);
        }
    }

    (fps, tps, thresholds)
}

/// Precision (y) against recall (x), ordered by increasing threshold and
/// ending at `(recall 0, precision 1)`
pub fn precision_recall_curve(positive: &[bool], scores: &[f64]) -> Curve {
    let (fps, tps, thresholds) = binary_clf_curve(positive, scores);
    let total_pos = tps.last().copied().unwrap_or(0.0);

    let mut precision: Vec<f64> = tps
        .iter()
        .zip(&fps)
        .map(|(tp, fp)| if tp + fp == 0.0 { 0.0 } else { tp / (tp + fp) })
        .collect();
    let mut recall: Vec<f64> = tps
        .iter()
        .map(|tp| if total_pos == 0.0 { 1.0 } else { tp / total_pos })
        .collect();
    let mut thresholds = thresholds;

    precision.reverse();
    recall.reverse();
    thresholds.reverse();
    precision.push(1.0);
    recall.push(0.0);

    Curve {
        x: recall,
        y: precision,
        thresholds,
    }
}

/// Average precision: sum over thresholds of `(R_n - R_{n-1}) * P_n`
pub fn average_precision(positive: &[bool], scores: &[f64]) -> f64 {
    let curve = precision_recall_curve(positive, scores);
    let (recall, precision) = (&curve.x, &curve.y);
    -(0..recall.len().saturating_sub(1))
        .map(|i| (recall[i + 1] - recall[i]) * precision[i])
        .sum::<f64>()
}

/// True positive rate (y) against false positive rate (x).
///
/// Collinear intermediate points are dropped and the curve starts at
/// `(0, 0)` with an infinite threshold. Fails when ground truth contains
/// only one class.
pub fn roc_curve(positive: &[bool], scores: &[f64]) -> Result<Curve> {
    let (fps, tps, thresholds) = binary_clf_curve(positive, scores);
    let total_pos = tps.last().copied().unwrap_or(0.0);
    let total_neg = fps.last().copied().unwrap_or(0.0);

    if total_pos == 0.0 || total_neg == 0.0 {
        bail!("ROC curve is undefined when ground truth contains a single class");
    }

    let n = fps.len();
    let keep: Vec<usize> = (0..n)
        .filter(|&i| {
            i == 0
                || i == n - 1
                || fps[i + 1] - 2.0 * fps[i] + fps[i - 1] != 0.0
                || tps[i + 1] - 2.0 * tps[i] + tps[i - 1] != 0.0
        })
        .collect();

    let mut curve = Curve {
        x: vec![0.0],
        y: vec![0.0],
        thresholds: vec![f64::INFINITY],
    };
    for i in keep {
        curve.x.push(fps[i] / total_neg);
        curve.y.push(tps[i] / total_pos);
        curve.thresholds.push(thresholds[i]);
    }
    Ok(curve)
}

/// Area under a curve by the trapezoidal rule; `x` must be monotonic
pub fn auc(x: &[f64], y: &[f64]) -> Result<f64> {
    if x.len() != y.len() {
        bail!("x and y must have the same length ({} != {})", x.len(), y.len());
    }
    if x.len() < 2 {
        bail!("At least 2 points are needed to compute an area under curve");
    }

    let diffs: Vec<f64> = x.windows(2).map(|w| w[1] - w[0]).collect();
    let direction = if diffs.iter().all(|d| *d >= 0.0) {
        1.0
    } else if diffs.iter().all(|d| *d <= 0.0) {
        -1.0
    } else {
        bail!("x is neither increasing nor decreasing");
    };

    let area: f64 = diffs
        .iter()
        .enumerate()
        .map(|(i, dx)| dx * (y[i] + y[i + 1]) / 2.0)
        .sum();
    Ok(direction * area)
}
