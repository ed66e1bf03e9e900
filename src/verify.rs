//! Pre-flight check that every sample listed in a cohort sheet has exactly
//! one input file, with its decompressed line count.

use std::{
    fs,
    io::{self, BufRead, Write},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::{
    cohort::{self, METADATA_FILE},
    smart_reader,
};

pub const FILE_CHECK: &str = "file_check.tsv";
pub const GZ_INDEX: &str = "gz_index.txt";

/// Outcome of looking up a sample's input file.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Note {
    Normal,
    Missing,
    MultipleMatch,
}

/// One row of `file_check.tsv`.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct FileCheckRow {
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
    /// Absolute path, empty unless the note is `NORMAL`.
    #[serde(rename = "GZ_File")]
    pub gz_file: String,
    #[serde(rename = "Line_Count")]
    pub line_count: Option<u64>,
    #[serde(rename = "Note")]
    pub note: Note,
}

#[derive(Debug, Clone)]
pub struct VerifyOptions {
    pub input_root: PathBuf,
    pub output_root: PathBuf,
    /// Remove the output root before writing.
    pub clean: bool,
}

#[derive(Debug, Clone)]
pub struct VerifySummary {
    pub file_check: PathBuf,
    pub gz_index: PathBuf,
    pub rows: Vec<FileCheckRow>,
}

/// Count lines of a possibly gzip-compressed file after decompression.
/// A final line without a newline still counts.
pub fn count_lines(path: &Path) -> io::Result<u64> {
    smart_reader::open_input(path)?
        .split(b'\n')
        .try_fold(0u64, |n, line| line.map(|_| n + 1))
}

/// Check every cohort under `input_root` and write `file_check.tsv` and
/// `gz_index.txt` into the output root.
pub fn verify_inputs(options: &VerifyOptions) -> Result<VerifySummary> {
    let out_root = &options.output_root;
    if options.clean && out_root.exists() {
        tracing::info!(output_root = %out_root.display(), "removing previous output");
        fs::remove_dir_all(out_root)
            .with_context(|| format!("failed to remove {}", out_root.display()))?;
    }
    fs::create_dir_all(out_root)
        .with_context(|| format!("failed to create {}", out_root.display()))?;

    let mut rows = Vec::new();
    for cohort_dir in cohort::discover_cohorts(&options.input_root)? {
        let metadata_path = cohort_dir.join(METADATA_FILE);
        if !metadata_path.exists() {
            continue;
        }
        rows.extend(check_cohort(&cohort_dir, &metadata_path)?);
    }

    let file_check = out_root.join(FILE_CHECK);
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_path(&file_check)
        .with_context(|| format!("failed to create {}", file_check.display()))?;
    if rows.is_empty() {
        writer.write_record(FILE_CHECK_COLUMNS)?;
    }
    for row in &rows {
        writer.serialize(row)?;
    }
    writer.flush()?;

    let gz_index = out_root.join(GZ_INDEX);
    write_gz_index(&gz_index, &rows)?;

    tracing::info!(file_check = %file_check.display(), samples = rows.len(), "wrote line count stats");
    tracing::info!(gz_index = %gz_index.display(), "wrote gz index");

    Ok(VerifySummary {
        file_check,
        gz_index,
        rows,
    })
}

/// Header of `file_check.tsv`.
pub const FILE_CHECK_COLUMNS: [&str; 8] = [
    "SampleID",
    "Age",
    "Ancestry",
    "IQ",
    "Cohort",
    "GZ_File",
    "Line_Count",
    "Note",
];

fn check_cohort(cohort_dir: &Path, metadata_path: &Path) -> Result<Vec<FileCheckRow>> {
    let cohort_name = cohort::file_name(cohort_dir);
    let samples = cohort::read_metadata(metadata_path, &["SampleID"])?;

    let mut rows = Vec::with_capacity(samples.len());
    for meta in samples {
        let hits = cohort::matching_inputs(cohort_dir, &meta.sample_id)?;
        let (note, gz_file, line_count) = match hits.as_slice() {
            [single] => {
                let absolute = fs::canonicalize(single)
                    .with_context(|| format!("failed to resolve {}", single.display()))?;
                let lines = count_lines(single)
                    .with_context(|| format!("failed to count lines of {}", single.display()))?;
                (Note::Normal, absolute.display().to_string(), Some(lines))
            }
            [] => (Note::Missing, String::new(), None),
            _ => (Note::MultipleMatch, String::new(), None),
        };

        if note != Note::Normal {
            tracing::warn!(cohort = %cohort_name, sample_id = %meta.sample_id, ?note, "input check failed");
        }

        rows.push(FileCheckRow {
            sample_id: meta.sample_id,
            age: meta.age,
            ancestry: meta.ancestry,
            iq: meta.iq,
            cohort: cohort_name.clone(),
            gz_file,
            line_count,
            note,
        });
    }

    Ok(rows)
}

fn write_gz_index(path: &Path, rows: &[FileCheckRow]) -> Result<()> {
    let file = fs::File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    let mut out = io::BufWriter::new(file);
    for row in rows {
        if row.note == Note::Normal && !row.gz_file.is_empty() {
            writeln!(out, "{}", row.gz_file)?;
        }
    }
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::prelude::*;
    use flate2::{Compression, write::GzEncoder};

    fn gz(content: &str) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(content.as_bytes()).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn counts_decompressed_lines() {
        let temp = assert_fs::TempDir::new().unwrap();
        let file = temp.child("a.gz");
        file.write_binary(&gz("#h\nl1\nl2")).unwrap();
        assert_eq!(count_lines(file.path()).unwrap(), 3);

        let empty = temp.child("empty.gz");
        empty.write_binary(&gz("")).unwrap();
        assert_eq!(count_lines(empty.path()).unwrap(), 0);
    }

    #[test]
    fn notes_cover_normal_missing_and_multiple() {
        let temp = assert_fs::TempDir::new().unwrap();
        let cohort = temp.child("in/Cohort_A");
        cohort
            .child("metadata.tsv")
            .write_str("SampleID\tAge\tAncestry\tIQ\nS1\t30\tEUR\t100\nS2\t40\tAFR\t110\nS3\t50\tEAS\t90\n")
            .unwrap();
        cohort.child("S1.g.vcf.gz").write_binary(&gz("#h\nr\n")).unwrap();
        cohort.child("S3.a.gz").write_binary(&gz("")).unwrap();
        cohort.child("S3.b.gz").write_binary(&gz("")).unwrap();
        // no metadata: ignored
        temp.child("in/Cohort_B/S9.gz").write_binary(&gz("")).unwrap();

        let options = VerifyOptions {
            input_root: temp.path().join("in"),
            output_root: temp.path().join("out"),
            clean: false,
        };
        let summary = verify_inputs(&options).unwrap();

        let notes: Vec<Note> = summary.rows.iter().map(|r| r.note).collect();
        assert_eq!(notes, [Note::Normal, Note::Missing, Note::MultipleMatch]);
        assert_eq!(summary.rows[0].line_count, Some(2));
        assert!(summary.rows[0].gz_file.ends_with("S1.g.vcf.gz"));
        assert!(Path::new(&summary.rows[0].gz_file).is_absolute());

        let table = fs::read_to_string(&summary.file_check).unwrap();
        let mut lines = table.lines();
        assert_eq!(lines.next().unwrap(), FILE_CHECK_COLUMNS.join("\t"));
        assert!(lines.next().unwrap().ends_with("\t2\tNORMAL"));
        assert_eq!(lines.next().unwrap(), "S2\t40\tAFR\t110\tCohort_A\t\t\tMISSING");
        assert!(lines.next().unwrap().ends_with("MULTIPLE_MATCH"));

        let index = fs::read_to_string(&summary.gz_index).unwrap();
        assert_eq!(index.lines().count(), 1);
        assert_eq!(index.trim_end(), summary.rows[0].gz_file);
    }

    #[test]
    fn clean_removes_stale_output() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("in").create_dir_all().unwrap();
        let stale = temp.child("out/stale.txt");
        stale.write_str("old").unwrap();

        let options = VerifyOptions {
            input_root: temp.path().join("in"),
            output_root: temp.path().join("out"),
            clean: true,
        };
        let summary = verify_inputs(&options).unwrap();
        assert!(summary.rows.is_empty());
        assert!(!stale.path().exists());
        assert!(temp.child("out/file_check.tsv").path().exists());
    }
}
