// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Classification evaluation CLI
//!
//! Usage:
//!   labelscope-eval --synthetic 500 --seed 42
//!   labelscope-eval --dataset quickstart --pred-field predictions --eval-field eval
//!   labelscope-eval --dataset cats-vs-dogs --method binary --classes other,cat
//!   labelscope-eval --dataset quickstart --method top-k --k 2 --classes bird,cat,dog

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use labelscope::evaluation::plots::{parse_rotation, save_svg};
use labelscope::evaluation::{
    evaluate_binary_classifications, evaluate_classifications, evaluate_top_k_classifications, Average,
    BinaryOptions, ClassificationMetrics, ClassificationOptions, ConfusionMatrixOptions, TopKOptions,
};
use labelscope::store::{self, CatalogStore, MemoryStore, Samples};
use labelscope::Settings;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Method {
    Simple,
    Binary,
    TopK,
}

#[derive(Parser, Debug)]
#[command(name = "labelscope-eval")]
#[command(about = "Evaluate classification predictions stored on a dataset")]
#[command(version)]
struct Args {
    /// Settings file (defaults to ~/.labelscope/config.json)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Read datasets from a JSON catalog fixture
    #[arg(long)]
    fixture: Option<PathBuf>,

    /// Evaluate a generated dataset with this many samples
    #[arg(long)]
    synthetic: Option<usize>,

    /// Random seed for the generated dataset
    #[arg(short, long, default_value_t = 42)]
    seed: u64,

    /// Dataset name
    #[arg(short, long, default_value = "synthetic")]
    dataset: String,

    /// Field holding the predicted classifications
    #[arg(long, default_value = "predictions")]
    pred_field: String,

    /// Field holding the ground truth classifications
    #[arg(long, default_value = "ground_truth")]
    gt_field: String,

    /// Evaluation method
    #[arg(short, long, value_enum, default_value_t = Method::Simple)]
    method: Method,

    /// Classes (comma-separated); `neg,pos` for binary, logit order for top-k
    #[arg(long)]
    classes: Option<String>,

    /// Top-k value
    #[arg(short, long, default_value_t = 5)]
    k: usize,

    /// Record per-sample outcomes in this field
    #[arg(long)]
    eval_field: Option<String>,

    /// Save the run on the dataset under this key
    #[arg(long)]
    eval_key: Option<String>,

    /// Replacement for missing labels
    #[arg(long, default_value = "none")]
    missing: String,

    /// Averaging strategy (micro, macro, weighted)
    #[arg(long, default_value = "micro")]
    average: String,

    /// F-beta value
    #[arg(long, default_value_t = 1.0)]
    beta: f64,

    /// Digits printed in the report
    #[arg(long, default_value_t = 2)]
    digits: usize,

    /// Colorscale of the confusion matrix
    #[arg(long, default_value = "viridis")]
    cmap: String,

    /// Rotation of the confusion matrix x labels (degrees, vertical, horizontal)
    #[arg(long, default_value = "45")]
    xticks_rotation: String,

    /// Leave counts out of the confusion matrix cells
    #[arg(long)]
    hide_values: bool,

    /// Output directory for results and plots
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Serialize)]
struct EvaluationSummary {
    dataset: String,
    pred_field: String,
    gt_field: String,
    method: String,
    evaluated_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    metrics: Option<ClassificationMetrics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    report: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    average_precision: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    roc_auc: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_k_accuracy: Option<f64>,
}

fn split_classes(classes: &Option<String>) -> Option<Vec<String>> {
    classes.as_ref().map(|c| {
        c.split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    })
}

fn save_json(summary: &EvaluationSummary, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(summary)?;
    std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    println!("JSON results saved to: {}", path.display());
    Ok(())
}

fn print_metrics(metrics: &ClassificationMetrics, average: Average, beta: f64) {
    println!("{:-<70}", "");
    println!("{:<20} {:>10.4}", "Accuracy", metrics.accuracy);
    println!("{:<20} {:>10.4}", format!("Precision ({})", average), metrics.precision);
    println!("{:<20} {:>10.4}", format!("Recall ({})", average), metrics.recall);
    println!("{:<20} {:>10.4}", format!("F{} ({})", beta, average), metrics.fscore);
    println!("{:-<70}", "");
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let average: Average = args.average.parse()?;
    let classes = split_classes(&args.classes);

    let store: Arc<dyn CatalogStore> = match args.synthetic {
        Some(size) => {
            tracing::info!("Generating synthetic dataset '{}' ({} samples, seed {})", args.dataset, size, args.seed);
            Arc::new(MemoryStore::synthetic(&args.dataset, size, args.seed))
        }
        None => {
            let mut settings = Settings::load(args.config.as_deref())?;
            if let Some(ref fixture) = args.fixture {
                settings.fixture = Some(fixture.clone());
            }
            store::open(&settings).await?
        }
    };
    let samples = Samples::new(store.as_ref(), &args.dataset);

    let timestamp = chrono::Utc::now();
    let mut summary = EvaluationSummary {
        dataset: args.dataset.clone(),
        pred_field: args.pred_field.clone(),
        gt_field: args.gt_field.clone(),
        method: args
            .method
            .to_possible_value()
            .map(|v| v.get_name().to_string())
            .unwrap_or_default(),
        evaluated_at: timestamp.to_rfc3339(),
        metrics: None,
        report: None,
        average_precision: None,
        roc_auc: None,
        top_k_accuracy: None,
    };

    let plot_options = ConfusionMatrixOptions {
        include_values: !args.hide_values,
        cmap: args.cmap.clone(),
        xticks_rotation: parse_rotation(&args.xticks_rotation)?,
    };
    let mut plots: Vec<(&str, String)> = Vec::new();

    println!("\n{}", "=".repeat(70));
    println!("EVALUATION: {} vs {} on '{}'", args.pred_field, args.gt_field, args.dataset);
    println!("{}", "=".repeat(70));

    match args.method {
        Method::Simple => {
            let options = ClassificationOptions {
                gt_field: args.gt_field.clone(),
                eval_field: args.eval_field.clone(),
                eval_key: args.eval_key.clone(),
                classes,
                missing: args.missing.clone(),
            };
            let results = evaluate_classifications(&samples, &args.pred_field, &options).await?;

            results.print_report(args.digits);
            let metrics = results.metrics(average, args.beta);
            print_metrics(&metrics, average, args.beta);

            plots.push(("confusion_matrix", results.plot_confusion_matrix(&plot_options)?.to_svg()));
            summary.metrics = Some(metrics);
            summary.report = Some(results.report().to_json());
        }
        Method::Binary => {
            let Some(classes) = classes else {
                bail!("Binary evaluation needs --classes neg,pos");
            };
            let options = BinaryOptions {
                gt_field: args.gt_field.clone(),
                eval_field: args.eval_field.clone(),
                eval_key: args.eval_key.clone(),
            };
            let results = evaluate_binary_classifications(&samples, &classes, &args.pred_field, &options).await?;

            results.print_report(args.digits);
            let metrics = results.metrics(average, args.beta);
            print_metrics(&metrics, average, args.beta);

            let pr = results.plot_pr_curve(average);
            println!("Average precision: {:.4}", pr.average_precision);
            summary.average_precision = Some(pr.average_precision);
            plots.push(("pr_curve", pr.to_svg()));

            match results.plot_roc_curve() {
                Ok(roc) => {
                    println!("ROC AUC: {:.4}", roc.roc_auc);
                    summary.roc_auc = Some(roc.roc_auc);
                    plots.push(("roc_curve", roc.to_svg()));
                }
                Err(e) => tracing::warn!("Skipping ROC curve: {}", e),
            }

            plots.push(("confusion_matrix", results.plot_confusion_matrix(&plot_options)?.to_svg()));
            summary.metrics = Some(metrics);
            summary.report = Some(results.report().to_json());
        }
        Method::TopK => {
            let Some(classes) = classes else {
                bail!("Top-k evaluation needs --classes in logit order");
            };
            let options = TopKOptions {
                gt_field: args.gt_field.clone(),
                eval_field: args.eval_field.clone(),
            };
            let accuracy =
                evaluate_top_k_classifications(&samples, args.k, &classes, &args.pred_field, &options).await?;
            println!("Top-{} accuracy: {:.4}", args.k, accuracy);
            summary.top_k_accuracy = Some(accuracy);
        }
    }

    if let Some(ref output) = args.output {
        std::fs::create_dir_all(output)
            .with_context(|| format!("Failed to create {}", output.display()))?;
        let stamp = timestamp.format("%Y%m%d_%H%M%S");

        let json_path = output.join(format!("eval_{}_{}.json", args.dataset, stamp));
        save_json(&summary, &json_path)?;

        for (name, svg) in plots {
            let path = output.join(format!("{}_{}_{}.svg", name, args.dataset, stamp));
            save_svg(&svg, &path)?;
            println!("Plot saved to: {}", path.display());
        }
    }

    Ok(())
}
