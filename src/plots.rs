//! SVG rendering of the report's box plots and scatter plots.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use plotters::prelude::*;

use crate::report::{BoxPlot, Report, ScatterPlot};

const SIZE: (u32, u32) = (900, 600);
const BOX_HALF_WIDTH: f64 = 0.3;

/// Padded axis range covering `values`; a flat or empty series still gets a
/// non-empty range.
fn axis_range(values: impl IntoIterator<Item = f64>) -> std::ops::Range<f64> {
    let (lo, hi) = values
        .into_iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
    if !lo.is_finite() || !hi.is_finite() {
        return 0.0..1.0;
    }
    let pad = ((hi - lo) * 0.05).max(0.5);
    (lo - pad)..(hi + pad)
}

/// One box per cohort with whiskers and outliers.
pub fn render_box_plot(plot: &BoxPlot, path: &Path) -> Result<()> {
    let root = SVGBackend::new(path, SIZE).into_drawing_area();
    root.fill(&WHITE)?;

    let n = plot.boxes.len();
    let y_range = axis_range(plot.boxes.iter().flat_map(|b| {
        [b.lower_whisker, b.upper_whisker]
            .into_iter()
            .chain(b.outliers.iter().copied())
    }));
    let names: Vec<&str> = plot.boxes.iter().map(|b| b.cohort.as_str()).collect();

    let mut chart = ChartBuilder::on(&root)
        .caption(&plot.title, ("sans-serif", 24))
        .margin(20)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(-0.5f64..(n as f64 - 0.5), y_range)?;

    let cohort_label = |x: &f64| {
        let i = x.round();
        if (x - i).abs() < 1e-6 && i >= 0.0 {
            names.get(i as usize).map(|s| s.to_string()).unwrap_or_default()
        } else {
            String::new()
        }
    };
    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(n)
        .x_label_formatter(&cohort_label)
        .x_desc("Cohort")
        .y_desc(plot.variable.as_str())
        .draw()?;

    for (i, b) in plot.boxes.iter().enumerate() {
        let x = i as f64;
        let (left, right) = (x - BOX_HALF_WIDTH, x + BOX_HALF_WIDTH);
        let color = Palette99::pick(i).to_rgba();

        chart.draw_series([
            Rectangle::new([(left, b.q1), (right, b.q3)], color.mix(0.3).filled()),
            Rectangle::new([(left, b.q1), (right, b.q3)], color.stroke_width(2)),
        ])?;
        chart.draw_series([
            PathElement::new(vec![(left, b.median), (right, b.median)], BLACK.stroke_width(2)),
            PathElement::new(vec![(x, b.q3), (x, b.upper_whisker)], BLACK.stroke_width(1)),
            PathElement::new(vec![(x, b.q1), (x, b.lower_whisker)], BLACK.stroke_width(1)),
            PathElement::new(
                vec![(x - 0.1, b.upper_whisker), (x + 0.1, b.upper_whisker)],
                BLACK.stroke_width(1),
            ),
            PathElement::new(
                vec![(x - 0.1, b.lower_whisker), (x + 0.1, b.lower_whisker)],
                BLACK.stroke_width(1),
            ),
        ])?;
        chart.draw_series(b.outliers.iter().map(|&v| Circle::new((x, v), 3, BLACK.stroke_width(1))))?;
    }

    root.present()
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

/// Points coloured by cohort, with a legend.
pub fn render_scatter_plot(plot: &ScatterPlot, path: &Path) -> Result<()> {
    let root = SVGBackend::new(path, SIZE).into_drawing_area();
    root.fill(&WHITE)?;

    let points = || plot.series.iter().flat_map(|s| s.points.iter().copied());
    let x_range = axis_range(points().map(|(x, _)| x));
    let y_range = axis_range(points().map(|(_, y)| y));

    let mut chart = ChartBuilder::on(&root)
        .caption(&plot.title, ("sans-serif", 24))
        .margin(20)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(x_range, y_range)?;

    chart
        .configure_mesh()
        .x_desc(plot.x.as_str())
        .y_desc(plot.y.as_str())
        .draw()?;

    for (i, series) in plot.series.iter().enumerate() {
        let color = Palette99::pick(i).to_rgba();
        chart
            .draw_series(series.points.iter().map(|&p| Circle::new(p, 4, color.mix(0.7).filled())))?
            .label(series.cohort.as_str())
            .legend(move |(x, y)| Circle::new((x, y), 4, color.filled()));
    }

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()?;

    root.present()
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

/// Render every plot of `report` as `<stem>_<kind>_<columns>.svg` in `dir`.
pub fn render_all(report: &Report, dir: &Path, stem: &str) -> Result<Vec<PathBuf>> {
    let mut written = Vec::with_capacity(report.box_plots.len() + report.scatter_plots.len());

    for plot in &report.box_plots {
        let path = dir.join(format!("{stem}_box_{}.svg", plot.variable));
        render_box_plot(plot, &path).with_context(|| format!("failed to plot {}", plot.title))?;
        written.push(path);
    }
    for plot in &report.scatter_plots {
        let path = dir.join(format!("{stem}_scatter_{}_vs_{}.svg", plot.y, plot.x));
        render_scatter_plot(plot, &path).with_context(|| format!("failed to plot {}", plot.title))?;
        written.push(path);
    }

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{BoxSummary, ScatterSeries};

    #[test]
    fn axis_range_pads_flat_and_empty_series() {
        assert_eq!(axis_range([]), 0.0..1.0);
        assert_eq!(axis_range([5.0, 5.0]), 4.5..5.5);
        let r = axis_range([0.0, 100.0]);
        assert_eq!(r, -5.0..105.0);
    }

    #[test]
    fn renders_box_and_scatter_svg() {
        let temp = tempfile::tempdir().unwrap();
        let box_plot = BoxPlot {
            variable: "Age".into(),
            title: "Age by Cohort".into(),
            boxes: vec![BoxSummary {
                cohort: "Cohort_A".into(),
                lower_whisker: 1.0,
                q1: 2.0,
                median: 3.0,
                q3: 4.0,
                upper_whisker: 4.0,
                outliers: vec![100.0],
            }],
        };
        let scatter = ScatterPlot {
            x: "Age".into(),
            y: "Het_Count".into(),
            title: "Het_Count vs Age".into(),
            series: vec![ScatterSeries {
                cohort: "Cohort_A".into(),
                points: vec![(30.0, 2.0), (40.0, 1.0)],
            }],
        };

        let box_path = temp.path().join("box.svg");
        render_box_plot(&box_plot, &box_path).unwrap();
        let svg = std::fs::read_to_string(&box_path).unwrap();
        assert!(svg.contains("<svg"));
        assert!(svg.contains("Age by Cohort"));

        let scatter_path = temp.path().join("scatter.svg");
        render_scatter_plot(&scatter, &scatter_path).unwrap();
        let svg = std::fs::read_to_string(&scatter_path).unwrap();
        assert!(svg.contains("<circle"));
        assert!(svg.contains("Cohort_A"));
    }
}
