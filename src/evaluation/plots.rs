// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Plot data for evaluation results, renderable as standalone SVG

use super::metrics::{ConfusionMatrix, Curve};
use crate::colors::{luminance, to_hex, Colorscale, COLORMAP_SIZE};
use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::path::Path;

const CELL: f64 = 48.0;
const MARGIN: f64 = 110.0;
const CHART: f64 = 360.0;

/// Parse a tick label rotation: degrees, `vertical` or `horizontal`
pub fn parse_rotation(value: &str) -> Result<f64> {
    match value.trim().to_lowercase().as_str() {
        "vertical" => Ok(90.0),
        "horizontal" => Ok(0.0),
        other => other
            .parse::<f64>()
            .with_context(|| format!("Invalid tick rotation: {}", value)),
    }
}

fn push_line(svg: &mut String, line: String) {
    svg.push_str(&line);
    svg.push('\n');
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Write a rendered plot, creating parent directories
pub fn save_svg(svg: &str, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    std::fs::write(path, svg).with_context(|| format!("Failed to write {}", path.display()))?;
    tracing::info!("Saved plot to {}", path.display());
    Ok(())
}

/// Options for [`ConfusionMatrixDisplay`]
#[derive(Debug, Clone)]
pub struct ConfusionMatrixOptions {
    /// Print the count inside each cell
    pub include_values: bool,
    /// Colorscale name, see [`Colorscale`]
    pub cmap: String,
    /// Rotation of the x tick labels, in degrees
    pub xticks_rotation: f64,
}

impl Default for ConfusionMatrixOptions {
    fn default() -> Self {
        Self {
            include_values: true,
            cmap: "viridis".to_string(),
            xticks_rotation: 45.0,
        }
    }
}

/// Confusion matrix heatmap
#[derive(Debug, Clone, Serialize)]
pub struct ConfusionMatrixDisplay {
    pub matrix: ConfusionMatrix,
    pub include_values: bool,
    pub cmap: String,
    pub xticks_rotation: f64,
    #[serde(skip)]
    colorscale: Colorscale,
}

impl ConfusionMatrixDisplay {
    pub fn new(matrix: ConfusionMatrix, options: &ConfusionMatrixOptions) -> Result<Self> {
        let colorscale: Colorscale = options.cmap.parse()?;
        Ok(Self {
            matrix,
            include_values: options.include_values,
            cmap: colorscale.to_string(),
            xticks_rotation: options.xticks_rotation,
            colorscale,
        })
    }

    pub fn to_svg(&self) -> String {
        let n = self.matrix.labels.len() as f64;
        let size = MARGIN + n * CELL + 20.0;
        let max = self.matrix.max_count().max(1) as f64;
        let colormap = self.colorscale.colormap(COLORMAP_SIZE);

        let mut svg = String::new();
        push_line(
            &mut svg,
            format!(
                r#"<svg xmlns="http://www.w3.org/2000/svg" width="{size}" height="{size}" font-family="sans-serif" font-size="11">"#
            ),
        );
        push_line(&mut svg, r#"<rect width="100%" height="100%" fill="white"/>"#.to_string());

        for (i, row) in self.matrix.counts.iter().enumerate() {
            for (j, count) in row.iter().enumerate() {
                let idx = ((*count as f64 / max) * (COLORMAP_SIZE - 1) as f64).round() as usize;
                let fill = colormap[idx.min(COLORMAP_SIZE - 1)];
                let x = MARGIN + j as f64 * CELL;
                let y = 20.0 + i as f64 * CELL;
                push_line(
                    &mut svg,
                    format!(
                        r#"<rect x="{x}" y="{y}" width="{CELL}" height="{CELL}" fill="{}"/>"#,
                        to_hex(fill)
                    ),
                );
                if self.include_values {
                    let ink = if luminance(fill) < 0.5 { "white" } else { "black" };
                    push_line(
                        &mut svg,
                        format!(
                            r#"<text x="{}" y="{}" text-anchor="middle" dominant-baseline="central" fill="{ink}">{count}</text>"#,
                            x + CELL / 2.0,
                            y + CELL / 2.0
                        ),
                    );
                }
            }
        }

        for (k, label) in self.matrix.labels.iter().enumerate() {
            let label = escape(label);
            let center = k as f64 * CELL + CELL / 2.0;
            push_line(
                &mut svg,
                format!(
                    r#"<text x="{}" y="{}" text-anchor="end" dominant-baseline="central">{label}</text>"#,
                    MARGIN - 6.0,
                    20.0 + center
                ),
            );
            let (tx, ty) = (MARGIN + center, 20.0 + n * CELL + 12.0);
            push_line(
                &mut svg,
                format!(
                    r#"<text x="{tx}" y="{ty}" text-anchor="end" transform="rotate(-{} {tx} {ty})">{label}</text>"#,
                    self.xticks_rotation
                ),
            );
        }

        push_line(
            &mut svg,
            format!(
                r#"<text x="12" y="{}" transform="rotate(-90 12 {})" text-anchor="middle">True label</text>"#,
                20.0 + n * CELL / 2.0,
                20.0 + n * CELL / 2.0
            ),
        );
        push_line(
            &mut svg,
            format!(
                r#"<text x="{}" y="{}" text-anchor="middle">Predicted label</text>"#,
                MARGIN + n * CELL / 2.0,
                size - 4.0
            ),
        );
        svg.push_str("</svg>\n");
        svg
    }
}

/// Render a single polyline in the unit square with labeled axes
fn line_chart(xs: &[f64], ys: &[f64], xlabel: &str, ylabel: &str, legend: Option<&str>) -> String {
    let size = CHART + 2.0 * 50.0;
    let px = |x: f64| 50.0 + x.clamp(0.0, 1.0) * CHART;
    let py = |y: f64| 10.0 + (1.0 - y.clamp(0.0, 1.0)) * CHART;

    let mut svg = String::new();
    push_line(
        &mut svg,
        format!(
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{size}" height="{size}" font-family="sans-serif" font-size="11">"#
        ),
    );
    push_line(&mut svg, r#"<rect width="100%" height="100%" fill="white"/>"#.to_string());
    push_line(
        &mut svg,
        format!(
            r#"<rect x="50" y="10" width="{CHART}" height="{CHART}" fill="none" stroke="black"/>"#
        ),
    );

    for tick in 0..=5 {
        let t = tick as f64 / 5.0;
        push_line(
            &mut svg,
            format!(
                r#"<text x="{}" y="{}" text-anchor="middle">{t:.1}</text>"#,
                px(t),
                py(0.0) + 14.0
            ),
        );
        push_line(
            &mut svg,
            format!(
                r#"<text x="44" y="{}" text-anchor="end" dominant-baseline="central">{t:.1}</text>"#,
                py(t)
            ),
        );
    }

    let points: Vec<String> = xs
        .iter()
        .zip(ys)
        .map(|(x, y)| format!("{:.4},{:.4}", px(*x), py(*y)))
        .collect();
    push_line(
        &mut svg,
        format!(
            r##"<polyline points="{}" fill="none" stroke="#1f77b4" stroke-width="2"/>"##,
            points.join(" ")
        ),
    );

    push_line(
        &mut svg,
        format!(
            r#"<text x="{}" y="{}" text-anchor="middle">{}</text>"#,
            50.0 + CHART / 2.0,
            size - 40.0,
            escape(xlabel)
        ),
    );
    push_line(
        &mut svg,
        format!(
            r#"<text x="12" y="{0}" transform="rotate(-90 12 {0})" text-anchor="middle">{1}</text>"#,
            10.0 + CHART / 2.0,
            escape(ylabel)
        ),
    );
    if let Some(legend) = legend {
        push_line(
            &mut svg,
            format!(
                r#"<text x="{}" y="{}" text-anchor="end">{}</text>"#,
                50.0 + CHART - 8.0,
                10.0 + CHART - 10.0,
                escape(legend)
            ),
        );
    }
    svg.push_str("</svg>\n");
    svg
}

/// Precision-recall curve with its average precision
#[derive(Debug, Clone, Serialize)]
pub struct PrecisionRecallDisplay {
    pub precision: Vec<f64>,
    pub recall: Vec<f64>,
    pub average_precision: f64,
    pub label: String,
}

impl PrecisionRecallDisplay {
    pub fn new(curve: &Curve, average_precision: f64) -> Self {
        Self {
            precision: curve.y.clone(),
            recall: curve.x.clone(),
            average_precision,
            label: format!("AP = {:.2}", average_precision),
        }
    }

    pub fn to_svg(&self) -> String {
        line_chart(&self.recall, &self.precision, "Recall", "Precision", Some(&self.label))
    }
}

/// ROC curve with its area under curve
#[derive(Debug, Clone, Serialize)]
pub struct RocCurveDisplay {
    pub fpr: Vec<f64>,
    pub tpr: Vec<f64>,
    pub roc_auc: f64,
}

impl RocCurveDisplay {
    pub fn new(curve: &Curve, roc_auc: f64) -> Result<Self> {
        if curve.x.len() != curve.y.len() {
            bail!("ROC curve coordinates have mismatched lengths");
        }
        Ok(Self {
            fpr: curve.x.clone(),
            tpr: curve.y.clone(),
            roc_auc,
        })
    }

    pub fn to_svg(&self) -> String {
        let legend = format!("AUC = {:.2}", self.roc_auc);
        line_chart(
            &self.fpr,
            &self.tpr,
            "False Positive Rate",
            "True Positive Rate",
            Some(&legend),
        )
    }
}
