//! Per-cohort TSV → Parquet conversion.

use std::{
    fs::{self, File},
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result, bail};
use arrow::{
    array::{ArrayRef, Float64Array, StringArray},
    datatypes::{DataType, Field, Schema},
    record_batch::RecordBatch,
};
use parquet::{arrow::ArrowWriter, basic::Compression, file::properties::WriterProperties};
use thiserror::Error;

use crate::cohort;

/// Numeric columns carried into the Parquet file; unparseable cells become null.
pub const NUMERIC_COLUMNS: [&str; 3] = ["Age", "IQ", "Het_Count"];
/// All required columns, in output order.
pub const REQUIRED_COLUMNS: [&str; 6] = ["SampleID", "Age", "Ancestry", "IQ", "Cohort", "Het_Count"];

const TSV_SUFFIX: &str = "_progressive_counts.tsv";

#[derive(Debug, Error)]
pub enum ColumnarError {
    #[error("{file}: missing required columns: {}", columns.join(", "))]
    MissingColumns { file: String, columns: Vec<String> },
}

/// Convert one cohort table, keeping only [`REQUIRED_COLUMNS`].
pub fn tsv_to_parquet(tsv: &Path, parquet: &Path) -> Result<usize> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .from_path(tsv)
        .with_context(|| format!("failed to open {}", tsv.display()))?;

    let headers = reader.headers()?.clone();
    let index_of = |name: &str| headers.iter().position(|h| h == name);

    let missing: Vec<String> = REQUIRED_COLUMNS
        .into_iter()
        .filter(|c| index_of(c).is_none())
        .map(String::from)
        .collect();
    if !missing.is_empty() {
        return Err(ColumnarError::MissingColumns {
            file: cohort::file_name(tsv),
            columns: missing,
        }
        .into());
    }

    let mut columns: Vec<Vec<String>> = vec![Vec::new(); REQUIRED_COLUMNS.len()];
    let indices: Vec<usize> = REQUIRED_COLUMNS.iter().filter_map(|c| index_of(c)).collect();
    for record in reader.records() {
        let record = record.with_context(|| format!("failed to parse {}", tsv.display()))?;
        for (column, &idx) in columns.iter_mut().zip(&indices) {
            column.push(record.get(idx).unwrap_or_default().to_string());
        }
    }
    let n_rows = columns[0].len();

    let mut fields = Vec::with_capacity(REQUIRED_COLUMNS.len());
    let mut arrays: Vec<ArrayRef> = Vec::with_capacity(REQUIRED_COLUMNS.len());
    for (name, values) in REQUIRED_COLUMNS.into_iter().zip(columns) {
        if NUMERIC_COLUMNS.contains(&name) {
            fields.push(Field::new(name, DataType::Float64, true));
            let parsed: Vec<Option<f64>> = values.iter().map(|v| parse_numeric(v)).collect();
            arrays.push(Arc::new(Float64Array::from(parsed)));
        } else {
            fields.push(Field::new(name, DataType::Utf8, true));
            arrays.push(Arc::new(StringArray::from(values)));
        }
    }

    let schema = Arc::new(Schema::new(fields));
    let batch = RecordBatch::try_new(schema.clone(), arrays).context("failed to build record batch")?;

    if let Some(parent) = parquet.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let file = File::create(parquet).with_context(|| format!("failed to create {}", parquet.display()))?;
    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();
    let mut writer =
        ArrowWriter::try_new(file, schema, Some(props)).context("failed to create Parquet writer")?;
    writer.write(&batch).context("failed to write Parquet batch")?;
    writer.close().context("failed to finalize Parquet file")?;

    Ok(n_rows)
}

/// Parse a numeric cell, treating blanks, `NA`, `nan` and garbage as null.
pub fn parse_numeric(value: &str) -> Option<f64> {
    value.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Cohort name encoded in a `<Cohort>_progressive_counts.tsv` file name.
pub fn cohort_from_table(path: &Path) -> Option<String> {
    let name = cohort::file_name(path);
    name.strip_suffix(TSV_SUFFIX)
        .filter(|c| c.starts_with(cohort::COHORT_PREFIX))
        .map(String::from)
}

/// Convert every `Cohort_*_progressive_counts.tsv` in `tsv_dir` to
/// `<parquet_dir>/<Cohort>.parquet`.
pub fn convert_all(tsv_dir: &Path, parquet_dir: &Path) -> Result<Vec<PathBuf>> {
    if !tsv_dir.exists() {
        bail!("TSV folder not found: {}", tsv_dir.display());
    }

    let tables: Vec<(String, PathBuf)> = cohort::list_dir(tsv_dir)?
        .into_iter()
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| cohort_from_table(e.path()).map(|c| (c, e.into_path())))
        .collect();
    if tables.is_empty() {
        bail!(
            "no TSVs found matching 'Cohort_*{TSV_SUFFIX}' in {}",
            tsv_dir.display()
        );
    }

    let mut written = Vec::with_capacity(tables.len());
    for (cohort, tsv) in tables {
        let parquet = parquet_dir.join(format!("{cohort}.parquet"));
        let rows = tsv_to_parquet(&tsv, &parquet)
            .with_context(|| format!("failed for {}", cohort::file_name(&tsv)))?;
        tracing::info!(parquet = %parquet.display(), rows, "wrote parquet");
        written.push(parquet);
    }

    Ok(written)
}
