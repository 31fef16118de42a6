//! SVG charts comparing both models.

use crate::analysis::{win_counts, MetricAverage};
use crate::models::EvaluationRun;
use anyhow::{bail, Result};
use plotters::element::Pie;
use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, Pos, VPos};
use std::path::{Path, PathBuf};
use tracing::warn;

const MODEL_A_COLOR: RGBColor = RGBColor(0x34, 0x98, 0xdb);
const MODEL_B_COLOR: RGBColor = RGBColor(0x2e, 0xcc, 0x71);
const REGRESSION_COLOR: RGBColor = RGBColor(0xe7, 0x4c, 0x3c);
const MISSING_COLOR: RGBColor = RGBColor(0xcc, 0xcc, 0xcc);
const EQUIVALENT_COLOR: RGBColor = RGBColor(0x95, 0xa5, 0xa6);

const FONT: &str = "sans-serif";

/// Label for a key point on a categorical axis; blank between categories.
fn category_label(labels: &[String], value: f64) -> String {
    let idx = value.round();
    if (value - idx).abs() > 1e-6 || idx < 0.0 {
        return String::new();
    }
    labels.get(idx as usize).cloned().unwrap_or_default()
}

/// Axis range with one unit-wide slot per category, centred on 0..n.
fn category_range(n: usize) -> std::ops::Range<f64> {
    -0.5..(n as f64 - 0.5)
}

fn text_style(size: u32, pos: Pos) -> TextStyle<'static> {
    FontDesc::new(FontFamily::SansSerif, size as f64, FontStyle::Normal)
        .color(&BLACK)
        .pos(pos)
}

/// Red-yellow-green scale over [0, 1].
fn heat_color(score: f64) -> RGBColor {
    const RED: (f64, f64, f64) = (215.0, 48.0, 39.0);
    const YELLOW: (f64, f64, f64) = (255.0, 255.0, 191.0);
    const GREEN: (f64, f64, f64) = (26.0, 152.0, 80.0);

    let t = score.clamp(0.0, 1.0);
    let (from, to, f) = if t < 0.5 {
        (RED, YELLOW, t * 2.0)
    } else {
        (YELLOW, GREEN, (t - 0.5) * 2.0)
    };
    let mix = |a: f64, b: f64| (a + (b - a) * f).round() as u8;
    RGBColor(mix(from.0, to.0), mix(from.1, to.1), mix(from.2, to.2))
}

/// Grouped bars of each metric's average score per model.
pub fn metric_comparison_chart(averages: &[MetricAverage], path: &Path) -> Result<()> {
    if averages.is_empty() {
        bail!("no metric averages to plot");
    }
    let n = averages.len();
    let labels: Vec<String> = averages.iter().map(|a| a.metric.clone()).collect();

    let root = SVGBackend::new(path, (1200, 700)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption("Average Metric Scores: Model A vs Model B", (FONT, 24))
        .margin(20)
        .x_label_area_size(60)
        .y_label_area_size(60)
        .build_cartesian_2d(category_range(n), 0f64..1.15f64)?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(n)
        .x_label_formatter(&|v| category_label(&labels, *v))
        .y_desc("Average Score")
        .draw()?;

    chart
        .draw_series(averages.iter().enumerate().map(|(i, avg)| {
            let x = i as f64;
            Rectangle::new([(x - 0.4, 0.0), (x, avg.model_a_avg)], MODEL_A_COLOR.filled())
        }))?
        .label("Model A (Base)")
        .legend(|(x, y)| Rectangle::new([(x, y - 5), (x + 10, y + 5)], MODEL_A_COLOR.filled()));

    chart
        .draw_series(averages.iter().enumerate().map(|(i, avg)| {
            let x = i as f64;
            Rectangle::new([(x, 0.0), (x + 0.4, avg.model_b_avg)], MODEL_B_COLOR.filled())
        }))?
        .label("Model B (Finetuned)")
        .legend(|(x, y)| Rectangle::new([(x, y - 5), (x + 10, y + 5)], MODEL_B_COLOR.filled()));

    let value_style = text_style(12, Pos::new(HPos::Center, VPos::Bottom));
    chart.draw_series(
        averages
            .iter()
            .enumerate()
            .flat_map(|(i, avg)| {
                let x = i as f64;
                [(x - 0.2, avg.model_a_avg), (x + 0.2, avg.model_b_avg)]
            })
            .map(|(x, v)| Text::new(format!("{:.3}", v), (x, v + 0.01), value_style.clone())),
    )?;

    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::UpperRight)
        .background_style(&WHITE.mix(0.8))
        .border_style(&BLACK)
        .draw()?;

    root.present()?;
    Ok(())
}

/// Per-test-case heatmap of every metric, one panel per model.
pub fn metrics_heatmap(run: &EvaluationRun, path: &Path) -> Result<()> {
    let metrics = run.metric_names();
    let cases = run.conversations.len();
    if metrics.is_empty() || cases == 0 {
        bail!("no scores to plot");
    }
    let case_labels: Vec<String> = (1..=cases).map(|i| format!("TC{}", i)).collect();

    let height = (160 + 40 * cases).min(4000) as u32;
    let root = SVGBackend::new(path, (1600, height)).into_drawing_area();
    root.fill(&WHITE)?;
    let root = root.titled("Metric Scores per Test Case", (FONT, 24))?;
    let panels = root.split_evenly((1, 2));

    let cell_style = text_style(12, Pos::new(HPos::Center, VPos::Center));
    for (panel, model_b) in panels.iter().zip([false, true]) {
        let title = if model_b { "Model B (Finetuned)" } else { "Model A (Base)" };
        let mut chart = ChartBuilder::on(panel)
            .caption(title, (FONT, 18))
            .margin(10)
            .x_label_area_size(80)
            .y_label_area_size(50)
            .build_cartesian_2d(category_range(metrics.len()), category_range(cases))?;

        // TC1 at the top
        let flip = |v: f64| (cases as f64 - 1.0) - v;
        chart
            .configure_mesh()
            .disable_mesh()
            .x_labels(metrics.len())
            .y_labels(cases)
            .x_label_formatter(&|v| category_label(&metrics, *v))
            .y_label_formatter(&|v| category_label(&case_labels, flip(*v)))
            .draw()?;

        let mut cells = Vec::with_capacity(metrics.len() * cases);
        for (i, conversation) in run.conversations.iter().enumerate() {
            let evaluation = if model_b {
                &conversation.model_b_evaluation
            } else {
                &conversation.model_a_evaluation
            };
            for (j, name) in metrics.iter().enumerate() {
                let score = evaluation.metric(name).and_then(|m| m.score);
                cells.push((j as f64, flip(i as f64), score));
            }
        }

        chart.draw_series(cells.iter().map(|&(x, y, score)| {
            let color = score.map(heat_color).unwrap_or(MISSING_COLOR);
            Rectangle::new([(x - 0.5, y - 0.5), (x + 0.5, y + 0.5)], color.filled())
        }))?;
        chart.draw_series(cells.iter().filter_map(|&(x, y, score)| {
            score.map(|s| Text::new(format!("{:.2}", s), (x, y), cell_style.clone()))
        }))?;
    }

    root.present()?;
    Ok(())
}

/// Horizontal bars of the B-minus-A difference per metric, sorted.
pub fn improvement_chart(averages: &[MetricAverage], path: &Path) -> Result<()> {
    if averages.is_empty() {
        bail!("no metric averages to plot");
    }
    let mut sorted: Vec<&MetricAverage> = averages.iter().collect();
    sorted.sort_by(|x, y| x.difference.total_cmp(&y.difference));
    let labels: Vec<String> = sorted.iter().map(|a| a.metric.clone()).collect();
    let n = sorted.len();

    let lo = sorted.iter().map(|a| a.difference).fold(0.0f64, f64::min);
    let hi = sorted.iter().map(|a| a.difference).fold(0.0f64, f64::max);
    let pad = ((hi - lo) * 0.2).max(0.05);

    let root = SVGBackend::new(path, (1200, (200 + 50 * n).min(4000) as u32)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption("Model B Improvement over Model A", (FONT, 24))
        .margin(20)
        .x_label_area_size(50)
        .y_label_area_size(200)
        .build_cartesian_2d((lo - pad)..(hi + pad), category_range(n))?;

    chart
        .configure_mesh()
        .disable_y_mesh()
        .y_labels(n)
        .y_label_formatter(&|v| category_label(&labels, *v))
        .x_desc("Score Difference (B - A)")
        .draw()?;

    chart.draw_series(sorted.iter().enumerate().map(|(i, avg)| {
        let y = i as f64;
        let d = avg.difference;
        let color = if d < 0.0 { REGRESSION_COLOR } else { MODEL_B_COLOR };
        Rectangle::new([(d.min(0.0), y - 0.35), (d.max(0.0), y + 0.35)], color.filled())
    }))?;

    chart.draw_series(LineSeries::new(
        vec![(0.0, -0.5), (0.0, n as f64 - 0.5)],
        &BLACK,
    ))?;

    let right = text_style(12, Pos::new(HPos::Left, VPos::Center));
    let left = text_style(12, Pos::new(HPos::Right, VPos::Center));
    chart.draw_series(sorted.iter().enumerate().map(|(i, avg)| {
        let d = avg.difference;
        let style = if d < 0.0 { left.clone() } else { right.clone() };
        let offset = if d < 0.0 { -pad * 0.1 } else { pad * 0.1 };
        Text::new(format!("{:+.3}", d), (d + offset, i as f64), style)
    }))?;

    root.present()?;
    Ok(())
}

/// Pie of how many metrics each model leads.
pub fn performance_distribution_chart(averages: &[MetricAverage], path: &Path) -> Result<()> {
    let counts = win_counts(averages);
    if counts.total() == 0 {
        bail!("no metric averages to plot");
    }

    let mut sizes = Vec::with_capacity(3);
    let mut colors = Vec::with_capacity(3);
    let mut labels = Vec::with_capacity(3);
    for (count, color, label) in [
        (counts.model_b, MODEL_B_COLOR, "Model B Higher"),
        (counts.model_a, MODEL_A_COLOR, "Model A Higher"),
        (counts.ties, EQUIVALENT_COLOR, "Equivalent"),
    ] {
        if count > 0 {
            sizes.push(count as f64);
            colors.push(color);
            labels.push(format!("{} ({})", label, count));
        }
    }

    let root = SVGBackend::new(path, (900, 760)).into_drawing_area();
    root.fill(&WHITE)?;
    let root = root.titled("Performance Distribution Across Metrics", (FONT, 24))?;

    let (width, height) = root.dim_in_pixel();
    let center = (width as i32 / 2, height as i32 / 2);
    let radius = f64::from(width.min(height)) * 0.35;

    let mut pie = Pie::new(&center, &radius, &sizes, &colors, &labels);
    pie.start_angle(-90.0);
    pie.label_style(text_style(16, Pos::new(HPos::Center, VPos::Center)));
    pie.percentages(text_style(14, Pos::new(HPos::Center, VPos::Center)));
    root.draw(&pie)?;

    root.present()?;
    Ok(())
}

/// Draw all charts into `dir`. Failures are logged and skipped.
pub fn write_charts(run: &EvaluationRun, averages: &[MetricAverage], dir: &Path) -> Vec<PathBuf> {
    let mut written = Vec::new();

    let comparison = dir.join("metric_comparison.svg");
    match metric_comparison_chart(averages, &comparison) {
        Ok(()) => written.push(comparison),
        Err(e) => warn!("Skipping metric comparison chart: {}", e),
    }

    let heatmap = dir.join("metrics_heatmap.svg");
    match metrics_heatmap(run, &heatmap) {
        Ok(()) => written.push(heatmap),
        Err(e) => warn!("Skipping metrics heatmap: {}", e),
    }

    let improvement = dir.join("improvement_analysis.svg");
    match improvement_chart(averages, &improvement) {
        Ok(()) => written.push(improvement),
        Err(e) => warn!("Skipping improvement chart: {}", e),
    }

    let distribution = dir.join("performance_distribution.svg");
    match performance_distribution_chart(averages, &distribution) {
        Ok(()) => written.push(distribution),
        Err(e) => warn!("Skipping performance distribution chart: {}", e),
    }

    written
}
