//! Cohort discovery and the per-sample filtering loop.
//!
//! Input layout:
//!
//! ```text
//! <input_root>/Cohort_*/metadata.tsv
//! <input_root>/Cohort_*/<SampleID>*.gz
//! ```
//!
//! Output layout:
//!
//! ```text
//! <output_root>/filtered_gvcf/<Cohort>/<SampleID>.het_dp20_gq30.vcf.gz
//! <output_root>/<Cohort>_progressive_counts.tsv
//! ```

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use walkdir::WalkDir;

use crate::{FunnelCounts, filter::filter_and_count};

/// Cohort directories are recognised by this name prefix.
pub const COHORT_PREFIX: &str = "Cohort_";
/// Per-cohort sample sheet.
pub const METADATA_FILE: &str = "metadata.tsv";
/// Appended to the SampleID to name the filtered output.
pub const FILTERED_SUFFIX: &str = ".het_dp20_gq30.vcf.gz";
/// Sub-directory of the output root holding filtered files.
pub const FILTERED_DIR: &str = "filtered_gvcf";
/// Columns every `metadata.tsv` must provide.
pub const METADATA_COLUMNS: [&str; 4] = ["SampleID", "Age", "Ancestry", "IQ"];

#[derive(Debug, Error)]
pub enum CohortError {
    #[error("multiple .gz files match SampleID={sample_id} in {}: {}", dir.display(), names.join(", "))]
    MultipleMatches {
        sample_id: String,
        dir: PathBuf,
        names: Vec<String>,
    },
    #[error("{}: missing required columns: {}", path.display(), columns.join(", "))]
    MissingColumns { path: PathBuf, columns: Vec<String> },
    #[error("failed to read {}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("failed to list {}", path.display())]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
}

/// One row of a cohort `metadata.tsv`. Values are kept as written; columns
/// not required by the caller default to empty.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct SampleMetadata {
    #[serde(rename = "SampleID")]
    pub sample_id: String,
    #[serde(rename = "Age", default)]
    pub age: String,
    #[serde(rename = "Ancestry", default)]
    pub ancestry: String,
    #[serde(rename = "IQ", default)]
    pub iq: String,
}

/// Per-sample row of `<Cohort>_progressive_counts.tsv`.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct SummaryRow {
    #[serde(rename = "SampleID")]
    pub sample_id: String,
    #[serde(rename = "Age")]
    pub age: String,
    #[serde(rename = "Ancestry")]
    pub ancestry: String,
    #[serde(rename = "IQ")]
    pub iq: String,
    #[serde(rename = "Cohort")]
    pub cohort: String,
    #[serde(rename = "GZ_File")]
    pub gz_file: String,
    #[serde(rename = "Filtered_GZ_File")]
    pub filtered_gz_file: String,
    #[serde(rename = "N_Records")]
    pub n_records: u64,
    #[serde(rename = "GT_Missing")]
    pub gt_missing: u64,
    #[serde(rename = "After_GT_Het")]
    pub after_gt_het: u64,
    #[serde(rename = "After_DP")]
    pub after_dp: u64,
    #[serde(rename = "After_GQ")]
    pub after_gq: u64,
    #[serde(rename = "Het_Count")]
    pub het_count: u64,
}

impl SummaryRow {
    pub fn new(
        meta: &SampleMetadata,
        cohort: &str,
        gz_file: &str,
        filtered_gz_file: &str,
        counts: &FunnelCounts,
    ) -> Self {
        Self {
            sample_id: meta.sample_id.clone(),
            age: meta.age.clone(),
            ancestry: meta.ancestry.clone(),
            iq: meta.iq.clone(),
            cohort: cohort.to_string(),
            gz_file: gz_file.to_string(),
            filtered_gz_file: filtered_gz_file.to_string(),
            n_records: counts.n_records,
            gt_missing: counts.gt_missing,
            after_gt_het: counts.after_gt_het,
            after_dp: counts.after_dp,
            after_gq: counts.after_gq,
            het_count: counts.het_count(),
        }
    }

    pub fn counts(&self) -> FunnelCounts {
        FunnelCounts {
            n_records: self.n_records,
            gt_missing: self.gt_missing,
            after_gt_het: self.after_gt_het,
            after_dp: self.after_dp,
            after_gq: self.after_gq,
        }
    }
}

/// Where to read cohorts from and where to write results.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub input_root: PathBuf,
    pub output_root: PathBuf,
}

/// Why a sample produced no summary row.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct SkippedSample {
    pub cohort: String,
    pub sample_id: String,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct CohortOutcome {
    pub name: String,
    pub table: PathBuf,
    pub rows: Vec<SummaryRow>,
}

#[derive(Debug, Clone, Default)]
pub struct PipelineSummary {
    pub cohorts: Vec<CohortOutcome>,
    pub skipped: Vec<SkippedSample>,
}

impl PipelineSummary {
    pub fn processed(&self) -> usize {
        self.cohorts.iter().map(|c| c.rows.len()).sum()
    }
}

/// Sorted `Cohort_*` directories directly under `input_root`.
pub fn discover_cohorts(input_root: &Path) -> Result<Vec<PathBuf>, CohortError> {
    let mut cohorts = Vec::new();
    for entry in list_dir(input_root)? {
        if entry.file_type().is_dir() && entry.file_name().to_string_lossy().starts_with(COHORT_PREFIX) {
            cohorts.push(entry.into_path());
        }
    }
    Ok(cohorts)
}

/// Read `metadata.tsv`, checking that the `required` columns are present.
pub fn read_metadata(path: &Path, required: &[&str]) -> Result<Vec<SampleMetadata>, CohortError> {
    let csv_err = |source| CohortError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .from_path(path)
        .map_err(csv_err)?;

    let headers = reader.headers().map_err(csv_err)?;
    let missing: Vec<String> = required
        .iter()
        .filter(|column| !headers.iter().any(|h| h == **column))
        .map(|column| column.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(CohortError::MissingColumns {
            path: path.to_path_buf(),
            columns: missing,
        });
    }

    reader
        .deserialize()
        .collect::<Result<Vec<SampleMetadata>, _>>()
        .map_err(csv_err)
}

/// Candidate input files for a sample: `<SampleID>*.gz`, sorted by name.
pub fn matching_inputs(cohort_dir: &Path, sample_id: &str) -> Result<Vec<PathBuf>, CohortError> {
    let mut hits = Vec::new();
    for entry in list_dir(cohort_dir)? {
        let is_match = {
            let name = entry.file_name().to_string_lossy();
            name.starts_with(sample_id) && name.ends_with(".gz")
        };
        if is_match {
            hits.push(entry.into_path());
        }
    }
    Ok(hits)
}

/// The single input file for a sample, `None` when there is none.
pub fn find_sample_gz(cohort_dir: &Path, sample_id: &str) -> Result<Option<PathBuf>, CohortError> {
    let mut hits = matching_inputs(cohort_dir, sample_id)?;
    match hits.len() {
        0 => Ok(None),
        1 => Ok(hits.pop()),
        _ => Err(CohortError::MultipleMatches {
            sample_id: sample_id.to_string(),
            dir: cohort_dir.to_path_buf(),
            names: hits.iter().map(|p| file_name(p)).collect(),
        }),
    }
}

/// Path of the filtered output for a sample.
pub fn filtered_output_path(output_root: &Path, cohort: &str, sample_id: &str) -> PathBuf {
    output_root
        .join(FILTERED_DIR)
        .join(cohort)
        .join(format!("{sample_id}{FILTERED_SUFFIX}"))
}

/// Path of the per-cohort progressive counts table.
pub fn progressive_counts_path(output_root: &Path, cohort: &str) -> PathBuf {
    output_root.join(format!("{cohort}_progressive_counts.tsv"))
}

/// Filter every sample of every cohort and write the per-cohort tables.
///
/// A sample whose input is missing, ambiguous or unreadable is logged and
/// skipped; the remaining samples still run.
pub fn run_pipeline(config: &PipelineConfig) -> Result<PipelineSummary> {
    tracing::info!(
        input_root = %config.input_root.display(),
        output_root = %config.output_root.display(),
        "starting cohort filtering",
    );

    let mut summary = PipelineSummary::default();

    for cohort_dir in discover_cohorts(&config.input_root)? {
        let cohort = file_name(&cohort_dir);
        let metadata_path = cohort_dir.join(METADATA_FILE);
        if !metadata_path.exists() {
            tracing::warn!(cohort = %cohort, "no {METADATA_FILE}; skipping cohort");
            continue;
        }

        let filtered_dir = config.output_root.join(FILTERED_DIR).join(&cohort);
        fs::create_dir_all(&filtered_dir)
            .with_context(|| format!("failed to create {}", filtered_dir.display()))?;

        let samples = read_metadata(&metadata_path, &METADATA_COLUMNS)?;
        let mut rows = Vec::with_capacity(samples.len());

        for meta in &samples {
            let skip = |reason: String| {
                tracing::warn!(cohort = %cohort, sample_id = %meta.sample_id, "{reason}");
                SkippedSample {
                    cohort: cohort.clone(),
                    sample_id: meta.sample_id.clone(),
                    reason,
                }
            };

            let input = match find_sample_gz(&cohort_dir, &meta.sample_id) {
                Ok(Some(input)) => input,
                Ok(None) => {
                    summary.skipped.push(skip(format!(
                        "no input matching {}*.gz",
                        meta.sample_id
                    )));
                    continue;
                }
                Err(e) => {
                    summary.skipped.push(skip(e.to_string()));
                    continue;
                }
            };

            let output = filtered_output_path(&config.output_root, &cohort, &meta.sample_id);
            match filter_and_count(&input, &output) {
                Ok(counts) => {
                    let (in_name, out_name) = (file_name(&input), file_name(&output));
                    tracing::info!("{}", counts.summary_line(&in_name, &out_name));
                    rows.push(SummaryRow::new(meta, &cohort, &in_name, &out_name, &counts));
                }
                Err(e) => summary.skipped.push(skip(e.to_string())),
            }
        }

        let table = progressive_counts_path(&config.output_root, &cohort);
        write_summary_rows(&table, &rows)?;
        tracing::info!(cohort = %cohort, samples = rows.len(), table = %table.display(), "wrote cohort table");

        summary.cohorts.push(CohortOutcome {
            name: cohort,
            table,
            rows,
        });
    }

    tracing::info!(
        processed = summary.processed(),
        skipped = summary.skipped.len(),
        "cohort filtering finished",
    );

    Ok(summary)
}

/// Write summary rows as a tab-separated table with a header row.
pub fn write_summary_rows(path: &Path, rows: &[SummaryRow]) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_path(path)
        .with_context(|| format!("failed to create {}", path.display()))?;

    if rows.is_empty() {
        writer.write_record(SUMMARY_COLUMNS)?;
    }
    for row in rows {
        writer
            .serialize(row)
            .with_context(|| format!("failed to write {}", path.display()))?;
    }
    writer.flush()?;
    Ok(())
}

/// Header of the per-cohort table, in column order.
pub const SUMMARY_COLUMNS: [&str; 13] = [
    "SampleID",
    "Age",
    "Ancestry",
    "IQ",
    "Cohort",
    "GZ_File",
    "Filtered_GZ_File",
    "N_Records",
    "GT_Missing",
    "After_GT_Het",
    "After_DP",
    "After_GQ",
    "Het_Count",
];

pub(crate) fn list_dir(dir: &Path) -> Result<Vec<walkdir::DirEntry>, CohortError> {
    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| CohortError::Walk {
            path: dir.to_path_buf(),
            source,
        })
}

pub(crate) fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
