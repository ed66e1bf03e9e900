//! Cohort summary report built from the per-cohort Parquet files.
//!
//! Writes a JSON report with per-cohort descriptive statistics, box-plot
//! summaries and scatter series, a paginated plain-text rendering of the
//! statistics, and an SVG for every plot.

use std::{
    collections::{BTreeMap, BTreeSet},
    fs::{self, File},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, anyhow, bail};
use arrow::{
    array::{Array, ArrayRef, Float64Array, StringArray},
    compute::cast,
    datatypes::DataType,
    record_batch::RecordBatch,
};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use serde::Serialize;
use statrs::statistics::Statistics as _;

use crate::{cohort, plots};

/// Numeric columns summarised and plotted.
pub const NUM_COLS: [&str; 3] = ["Age", "IQ", "Het_Count"];
/// (x, y) pairs plotted against each other.
pub const SCATTER_PAIRS: [(&str, &str); 2] = [("Age", "Het_Count"), ("IQ", "Het_Count")];
/// Maximum text lines per page of the plain-text rendering.
pub const MAX_LINES_PER_PAGE: usize = 70;

/// One sample after concatenating every Parquet file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReportRow {
    pub sample_id: Option<String>,
    pub cohort: Option<String>,
    /// Indexed like [`NUM_COLS`].
    pub values: [Option<f64>; 3],
}

/// Every row from a directory of Parquet files and the columns seen.
#[derive(Debug, Clone, Default)]
pub struct ReportTable {
    pub rows: Vec<ReportRow>,
    pub columns: Vec<String>,
}

impl ReportTable {
    fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Describe {
    pub n: usize,
    pub mean: f64,
    /// Sample standard deviation; absent for a single value.
    pub std: Option<f64>,
    pub min: f64,
    pub q25: f64,
    pub median: f64,
    pub q75: f64,
    pub max: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct VariableSummary {
    pub variable: String,
    pub stats: Describe,
}

#[derive(Debug, Clone, Serialize)]
pub struct CohortSummary {
    pub cohort: String,
    pub variables: Vec<VariableSummary>,
}

/// Box-and-whisker summary of one cohort for one variable. Whiskers reach the
/// furthest value within 1.5 IQR of the box; values beyond are outliers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoxSummary {
    pub cohort: String,
    pub lower_whisker: f64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub upper_whisker: f64,
    pub outliers: Vec<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BoxPlot {
    pub variable: String,
    pub title: String,
    pub boxes: Vec<BoxSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScatterSeries {
    pub cohort: String,
    pub points: Vec<(f64, f64)>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScatterPlot {
    pub x: String,
    pub y: String,
    pub title: String,
    pub series: Vec<ScatterSeries>,
}

/// Complete report over a directory of cohort Parquet files.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub version: String,
    pub timestamp: String,
    pub input_dir: String,
    pub total_rows: usize,
    pub total_columns: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unique_samples: Option<usize>,
    /// False when no file had a `Cohort` column; nothing is grouped then.
    pub has_cohort_column: bool,
    pub cohorts: Vec<CohortSummary>,
    pub box_plots: Vec<BoxPlot>,
    pub scatter_plots: Vec<ScatterPlot>,
}

/// Read and concatenate every `*.parquet` file in `dir`, sorted by name.
pub fn read_parquet_dir(dir: &Path) -> Result<ReportTable> {
    if !dir.exists() {
        bail!("input directory not found: {}", dir.display());
    }

    let files: Vec<PathBuf> = cohort::list_dir(dir)?
        .into_iter()
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "parquet"))
        .collect();
    if files.is_empty() {
        bail!("no .parquet files found in: {}", dir.display());
    }

    let mut table = ReportTable::default();
    for path in &files {
        let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
        let reader = ParquetRecordBatchReaderBuilder::try_new(file)
            .and_then(|builder| builder.build())
            .with_context(|| format!("failed to read {}", path.display()))?;

        for batch in reader {
            let batch = batch.with_context(|| format!("failed to decode {}", path.display()))?;
            append_batch(&mut table, &batch)?;
        }
    }

    Ok(table)
}

fn append_batch(table: &mut ReportTable, batch: &RecordBatch) -> Result<()> {
    for field in batch.schema().fields() {
        if !table.has_column(field.name()) {
            table.columns.push(field.name().clone());
        }
    }

    let n = batch.num_rows();
    let sample_ids = text_column(batch, "SampleID")?;
    let cohorts = text_column(batch, "Cohort")?;
    let numeric = NUM_COLS
        .iter()
        .map(|name| numeric_column(batch, name))
        .collect::<Result<Vec<_>>>()?;

    for i in 0..n {
        let mut values = [None; 3];
        for (slot, column) in values.iter_mut().zip(&numeric) {
            *slot = column.as_ref().and_then(|c| c[i]);
        }
        table.rows.push(ReportRow {
            sample_id: sample_ids.as_ref().and_then(|c| c[i].clone()),
            cohort: cohorts.as_ref().and_then(|c| c[i].clone()),
            values,
        });
    }

    Ok(())
}

fn text_column(batch: &RecordBatch, name: &str) -> Result<Option<Vec<Option<String>>>> {
    let Some(array) = batch.column_by_name(name) else {
        return Ok(None);
    };
    let array: ArrayRef = cast(array, &DataType::Utf8)?;
    let strings = array
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| anyhow!("column {name} cannot be read as text"))?;
    Ok(Some(strings.iter().map(|v| v.map(String::from)).collect()))
}

/// Numeric view of a column; text that does not parse becomes null.
fn numeric_column(batch: &RecordBatch, name: &str) -> Result<Option<Vec<Option<f64>>>> {
    let Some(array) = batch.column_by_name(name) else {
        return Ok(None);
    };
    let array: ArrayRef = cast(array, &DataType::Float64)?;
    let values = array
        .as_any()
        .downcast_ref::<Float64Array>()
        .ok_or_else(|| anyhow!("column {name} cannot be read as numbers"))?;
    Ok(Some(
        values
            .iter()
            .map(|v| v.filter(|v| v.is_finite()))
            .collect(),
    ))
}

/// Linear-interpolated quantile of sorted data, `None` when empty.
fn quantile(sorted: &[f64], q: f64) -> Option<f64> {
    let last = sorted.len().checked_sub(1)?;
    let pos = q.clamp(0.0, 1.0) * last as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64))
}

fn sorted_copy(values: &[f64]) -> Vec<f64> {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    sorted
}

/// Descriptive statistics, `None` for an empty series.
pub fn describe(values: &[f64]) -> Option<Describe> {
    let sorted = sorted_copy(values);
    let (&min, &max) = (sorted.first()?, sorted.last()?);

    let std = values.iter().std_dev();
    Some(Describe {
        n: values.len(),
        mean: values.iter().mean(),
        std: (!std.is_nan()).then_some(std),
        min,
        q25: quantile(&sorted, 0.25)?,
        median: quantile(&sorted, 0.5)?,
        q75: quantile(&sorted, 0.75)?,
        max,
    })
}

/// Box-plot summary for one group, `None` when empty.
pub fn box_summary(cohort: &str, values: &[f64]) -> Option<BoxSummary> {
    let sorted = sorted_copy(values);
    let q1 = quantile(&sorted, 0.25)?;
    let q3 = quantile(&sorted, 0.75)?;
    let reach = 1.5 * (q3 - q1);
    let fences = (q1 - reach)..=(q3 + reach);

    let inside: Vec<f64> = sorted.iter().copied().filter(|v| fences.contains(v)).collect();
    let lower_whisker = inside.first().map_or(q1, |v| v.min(q1));
    let upper_whisker = inside.last().map_or(q3, |v| v.max(q3));

    Some(BoxSummary {
        cohort: cohort.to_string(),
        lower_whisker,
        q1,
        median: quantile(&sorted, 0.5)?,
        q3,
        upper_whisker,
        outliers: sorted
            .iter()
            .copied()
            .filter(|v| !fences.contains(v))
            .collect(),
    })
}

fn column_index(name: &str) -> Option<usize> {
    NUM_COLS.iter().position(|c| *c == name)
}

/// Build the full report from the Parquet files in `dir`.
pub fn build_report(dir: &Path) -> Result<Report> {
    let table = read_parquet_dir(dir)?;
    Ok(summarize(&table, &dir.display().to_string()))
}

/// Summarise an already loaded table.
pub fn summarize(table: &ReportTable, input_dir: &str) -> Report {
    let has_cohort_column = table.has_column("Cohort");

    let unique_samples = table.has_column("SampleID").then(|| {
        table
            .rows
            .iter()
            .filter_map(|r| r.sample_id.as_deref())
            .collect::<BTreeSet<_>>()
            .len()
    });

    let mut by_cohort: BTreeMap<&str, Vec<&ReportRow>> = BTreeMap::new();
    if has_cohort_column {
        for row in &table.rows {
            if let Some(cohort) = row.cohort.as_deref() {
                by_cohort.entry(cohort).or_default().push(row);
            }
        }
    }

    let series = |rows: &[&ReportRow], idx: usize| -> Vec<f64> {
        rows.iter().filter_map(|r| r.values[idx]).collect()
    };

    let cohorts = by_cohort
        .iter()
        .map(|(cohort, rows)| CohortSummary {
            cohort: cohort.to_string(),
            variables: NUM_COLS
                .iter()
                .enumerate()
                .filter(|(_, name)| table.has_column(name))
                .filter_map(|(idx, name)| {
                    describe(&series(rows, idx)).map(|stats| VariableSummary {
                        variable: name.to_string(),
                        stats,
                    })
                })
                .collect(),
        })
        .collect();

    let box_plots = NUM_COLS
        .iter()
        .enumerate()
        .filter(|(_, name)| table.has_column(name))
        .filter_map(|(idx, name)| {
            let boxes: Vec<BoxSummary> = by_cohort
                .iter()
                .filter_map(|(cohort, rows)| box_summary(cohort, &series(rows, idx)))
                .collect();
            (!boxes.is_empty()).then(|| BoxPlot {
                variable: name.to_string(),
                title: format!("{name} by Cohort"),
                boxes,
            })
        })
        .collect();

    let scatter_plots = SCATTER_PAIRS
        .iter()
        .filter(|(x, y)| table.has_column(x) && table.has_column(y))
        .filter_map(|&(x, y)| {
            let (xi, yi) = (column_index(x)?, column_index(y)?);
            let series: Vec<ScatterSeries> = by_cohort
                .iter()
                .map(|(cohort, rows)| ScatterSeries {
                    cohort: cohort.to_string(),
                    points: rows
                        .iter()
                        .filter_map(|r| Some((r.values[xi]?, r.values[yi]?)))
                        .collect(),
                })
                .filter(|s| !s.points.is_empty())
                .collect();
            (!series.is_empty()).then(|| ScatterPlot {
                x: x.to_string(),
                y: y.to_string(),
                title: format!("{y} vs {x}"),
                series,
            })
        })
        .collect();

    let timestamp = time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "unknown".to_string());

    Report {
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp,
        input_dir: input_dir.to_string(),
        total_rows: table.rows.len(),
        total_columns: table.columns.len(),
        unique_samples,
        has_cohort_column,
        cohorts,
        box_plots,
        scatter_plots,
    }
}

impl Report {
    /// Summary pages as lines of monospace text, each starting with its title.
    pub fn text_pages(&self) -> Vec<Vec<String>> {
        if !self.has_cohort_column {
            return vec![vec![
                "Summary Report".to_string(),
                String::new(),
                "ERROR: 'Cohort' column not found.".to_string(),
            ]];
        }

        let mut header = vec![
            format!("Input directory of .parquet: {}", self.input_dir),
            String::new(),
            format!("Total Rows: {}", self.total_rows),
            format!("Total Columns: {}", self.total_columns),
        ];
        if let Some(n) = self.unique_samples {
            header.push(format!("Unique SampleID: {n}"));
        }
        header.push(format!("Number of Cohorts: {}", self.cohorts.len()));
        header.extend([
            String::new(),
            "Numeric Summary by Cohort".to_string(),
            "=".repeat(40),
            String::new(),
        ]);

        let mut pages = Vec::new();
        let mut current = header;
        for cohort in &self.cohorts {
            let block = cohort_block(cohort);
            if current.len() + block.len() > MAX_LINES_PER_PAGE {
                pages.push(current);
                current = vec![
                    "Numeric Summary by Cohort (continued)".to_string(),
                    "=".repeat(40),
                    String::new(),
                ];
            }
            current.extend(block);
        }
        pages.push(current);

        pages
            .into_iter()
            .enumerate()
            .map(|(i, body)| {
                let title = if i == 0 {
                    "Merged Cohort Summary Report".to_string()
                } else {
                    format!("Merged Cohort Summary (page {})", i + 1)
                };
                let mut page = vec![title, String::new()];
                page.extend(body);
                page
            })
            .collect()
    }
}

/// Files written by [`write_report`].
#[derive(Debug, Clone)]
pub struct ReportFiles {
    pub json: PathBuf,
    pub text: PathBuf,
    /// One SVG per box plot and scatter plot.
    pub plots: Vec<PathBuf>,
}

/// Write the JSON report to `path`, the text pages next to it with a `.txt`
/// extension, and one SVG per plot named after the file stem.
pub fn write_report(report: &Report, path: &Path) -> Result<ReportFiles> {
    let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
    fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;

    let json = serde_json::to_string_pretty(report)?;
    fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))?;

    let text_path = path.with_extension("txt");
    let text = report
        .text_pages()
        .iter()
        .map(|page| page.join("\n"))
        .collect::<Vec<_>>()
        .join("\n\u{c}\n");
    fs::write(&text_path, text + "\n")
        .with_context(|| format!("failed to write {}", text_path.display()))?;

    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "report".to_string());
    let plots = plots::render_all(report, dir, &stem)?;

    tracing::info!(
        report = %path.display(),
        text = %text_path.display(),
        plots = plots.len(),
        "wrote report"
    );
    Ok(ReportFiles {
        json: path.to_path_buf(),
        text: text_path,
        plots,
    })
}

fn cohort_block(cohort: &CohortSummary) -> Vec<String> {
    let mut block = vec![format!("Cohort: {}", cohort.cohort), "-".repeat(30)];
    for var in &cohort.variables {
        let s = &var.stats;
        let std = s.std.map_or_else(|| "nan".to_string(), |v| format!("{v:.2}"));
        block.extend([
            format!("{}:", var.variable),
            format!("  n     = {}", s.n),
            format!("  mean  = {:.2}", s.mean),
            format!("  std   = {std}"),
            format!("  min   = {:.2}", s.min),
            format!("  25%   = {:.2}", s.q25),
            format!("  50%   = {:.2}", s.median),
            format!("  75%   = {:.2}", s.q75),
            format!("  max   = {:.2}", s.max),
            String::new(),
        ]);
    }
    block.push(String::new());
    block
}
