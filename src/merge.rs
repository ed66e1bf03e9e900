//! Joins the verification table with the `[OK]` summary lines emitted by
//! per-file `filter` runs, for batches driven one file at a time.

use std::{
    collections::{BTreeMap, HashMap},
    fs,
    path::{Path, PathBuf},
    sync::LazyLock,
};

use anyhow::{Context, Result, bail};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{cohort::progressive_counts_path, verify::FILE_CHECK};

pub const LOG_FILE: &str = "log.txt";
pub const MERGED_TABLE: &str = "all_cohorts_progressive_counts.tsv";
/// Placeholder for values with no source.
pub const NA: &str = "NA";

const OK_MARKER: &str = "[OK]";

static KEY_VALUE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\w+)=(\S+)").expect("static regex is valid"));

/// Funnel values recovered from one `[OK]` line.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LogEntry {
    pub gz_file: String,
    pub filtered_gz_file: String,
    pub n_records: String,
    pub after_gt_het: String,
    pub after_dp: String,
    pub after_gq: String,
    pub het_count: String,
}

/// The subset of `file_check.tsv` the merge needs. Empty cells read as `NA`.
#[derive(Clone, Debug, Deserialize)]
struct CheckRow {
    #[serde(rename = "SampleID")]
    sample_id: String,
    #[serde(rename = "Age", default)]
    age: String,
    #[serde(rename = "Ancestry", default)]
    ancestry: String,
    #[serde(rename = "IQ", default)]
    iq: String,
    #[serde(rename = "Cohort")]
    cohort: String,
    #[serde(rename = "GZ_File", default)]
    gz_file: String,
}

/// One row of the merged tables.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct MergedRow {
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
    pub n_records: String,
    #[serde(rename = "After_GT_Het")]
    pub after_gt_het: String,
    #[serde(rename = "After_DP")]
    pub after_dp: String,
    #[serde(rename = "After_GQ")]
    pub after_gq: String,
    #[serde(rename = "Het_Count")]
    pub het_count: String,
}

#[derive(Debug, Clone)]
pub struct MergeSummary {
    pub merged: PathBuf,
    pub per_cohort: Vec<PathBuf>,
    pub rows: Vec<MergedRow>,
}

/// Parse every `[OK]` line of a filter log, keyed by the `in=` file name.
/// A later line for the same file replaces an earlier one.
pub fn parse_log(text: &str) -> HashMap<String, LogEntry> {
    let mut entries = HashMap::new();

    for line in text.lines() {
        // Accept both raw lines and lines behind a log prefix
        let Some(start) = line.find(OK_MARKER) else {
            continue;
        };
        let fields: HashMap<&str, &str> = KEY_VALUE
            .captures_iter(&line[start..])
            .filter_map(|c| Some((c.get(1)?.as_str(), c.get(2)?.as_str())))
            .collect();
        let Some(gz_file) = fields.get("in") else {
            continue;
        };

        let get = |key: &str| fields.get(key).copied().unwrap_or(NA).to_string();
        entries.insert(
            gz_file.to_string(),
            LogEntry {
                gz_file: gz_file.to_string(),
                filtered_gz_file: get("out"),
                n_records: get("N_Records"),
                after_gt_het: get("After_GT_Het"),
                after_dp: get("After_DP"),
                after_gq: get("After_GQ"),
                het_count: get("Het_Count"),
            },
        );
    }

    entries
}

/// Merge `file_check.tsv` and `log.txt` in `output_dir` into the combined and
/// per-cohort progressive count tables.
pub fn merge_progressive_counts(output_dir: &Path) -> Result<MergeSummary> {
    let file_check = output_dir.join(FILE_CHECK);
    let log = output_dir.join(LOG_FILE);
    if !file_check.exists() {
        bail!("missing file: {}", file_check.display());
    }
    if !log.exists() {
        bail!("missing file: {}", log.display());
    }

    let log_bytes = fs::read(&log).with_context(|| format!("failed to read {}", log.display()))?;
    let entries = parse_log(&String::from_utf8_lossy(&log_bytes));

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .from_path(&file_check)
        .with_context(|| format!("failed to open {}", file_check.display()))?;

    let mut rows = Vec::new();
    for record in reader.deserialize::<CheckRow>() {
        let check = record.with_context(|| format!("failed to parse {}", file_check.display()))?;
        rows.push(merge_row(check, &entries));
    }

    let merged = output_dir.join(MERGED_TABLE);
    write_rows(&merged, rows.iter())?;

    let mut by_cohort: BTreeMap<&str, Vec<&MergedRow>> = BTreeMap::new();
    for row in &rows {
        by_cohort.entry(row.cohort.as_str()).or_default().push(row);
    }

    let mut per_cohort = Vec::with_capacity(by_cohort.len());
    for (cohort, cohort_rows) in by_cohort {
        let path = progressive_counts_path(output_dir, cohort);
        write_rows(&path, cohort_rows.into_iter())?;
        per_cohort.push(path);
    }

    tracing::info!(
        merged = %merged.display(),
        cohorts = per_cohort.len(),
        "wrote merged and per-cohort progressive tables"
    );

    Ok(MergeSummary {
        merged,
        per_cohort,
        rows,
    })
}

fn merge_row(check: CheckRow, entries: &HashMap<String, LogEntry>) -> MergedRow {
    let or_na = |value: String| if value.is_empty() { NA.to_string() } else { value };

    // The log records bare file names, the check table absolute paths
    let gz_name = Path::new(&check.gz_file)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let entry = (!gz_name.is_empty()).then(|| entries.get(&gz_name)).flatten();
    let from_log = |value: Option<&String>| value.cloned().unwrap_or_else(|| NA.to_string());

    MergedRow {
        sample_id: or_na(check.sample_id),
        age: or_na(check.age),
        ancestry: or_na(check.ancestry),
        iq: or_na(check.iq),
        cohort: or_na(check.cohort),
        gz_file: or_na(gz_name.clone()),
        filtered_gz_file: from_log(entry.map(|e| &e.filtered_gz_file)),
        n_records: from_log(entry.map(|e| &e.n_records)),
        after_gt_het: from_log(entry.map(|e| &e.after_gt_het)),
        after_dp: from_log(entry.map(|e| &e.after_dp)),
        after_gq: from_log(entry.map(|e| &e.after_gq)),
        het_count: from_log(entry.map(|e| &e.het_count)),
    }
}

fn write_rows<'a>(path: &Path, rows: impl Iterator<Item = &'a MergedRow>) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .from_path(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    writer.write_record(MERGED_COLUMNS)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

/// Header of the merged tables.
pub const MERGED_COLUMNS: [&str; 12] = [
    "SampleID",
    "Age",
    "Ancestry",
    "IQ",
    "Cohort",
    "GZ_File",
    "Filtered_GZ_File",
    "N_Records",
    "After_GT_Het",
    "After_DP",
    "After_GQ",
    "Het_Count",
];
