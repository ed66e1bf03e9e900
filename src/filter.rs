//! Streaming GT/DP/GQ filter over a single-sample gVCF.
//!
//! Header lines are copied through untouched. Each data line runs the funnel
//! heterozygous GT -> DP > 20 -> GQ >= 30, and only lines surviving all three
//! are written, byte-for-byte as read.

use std::{
    fs::{self, File},
    io::{self, BufRead, BufWriter, Write},
    path::{Path, PathBuf},
};

use flate2::{Compression, write::GzEncoder};
use thiserror::Error;

use crate::{
    FunnelCounts,
    fields::extract_gt_dp_gq,
    predicates::{depth_passes, is_heterozygous, is_missing_genotype, quality_passes},
    smart_reader,
};

/// Lines starting with this character are headers.
pub const HEADER_MARKER: char = '#';
/// 0-based column of the FORMAT keys; the sample column follows it.
pub const FORMAT_COLUMN: usize = 8;

/// What happened to a single input line.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LineVerdict {
    /// Header line, copied to the output.
    Header,
    /// Fewer than ten columns; neither counted nor written.
    Malformed,
    /// Counted, but failed GT, DP or GQ.
    Rejected,
    /// Passed every stage; copied to the output.
    Passed,
}

impl LineVerdict {
    pub fn is_emitted(self) -> bool {
        matches!(self, LineVerdict::Header | LineVerdict::Passed)
    }
}

/// Errors from filtering one file.
#[derive(Debug, Error)]
pub enum FilterError {
    #[error("input not found: {}", .0.display())]
    InputNotFound(PathBuf),
    #[error("I/O failure on {} after {records_seen} records: {source}", path.display())]
    Io {
        path: PathBuf,
        records_seen: u64,
        #[source]
        source: io::Error,
    },
}

impl FilterError {
    /// Process exit status for the single-file command.
    pub fn exit_code(&self) -> u8 {
        match self {
            FilterError::InputNotFound(_) => 2,
            FilterError::Io { .. } => 3,
        }
    }

    fn io(path: &Path, records_seen: u64, source: io::Error) -> Self {
        FilterError::Io {
            path: path.to_path_buf(),
            records_seen,
            source,
        }
    }
}

/// Failure part-way through [`filter_stream`], with the counts reached so far.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("read failed after {} records", counts.n_records)]
    Read {
        counts: FunnelCounts,
        #[source]
        source: io::Error,
    },
    #[error("write failed after {} records", counts.n_records)]
    Write {
        counts: FunnelCounts,
        #[source]
        source: io::Error,
    },
}

/// Classify one line (without its trailing newline) and update `counts`.
pub fn tally_line(counts: &mut FunnelCounts, line: &str) -> LineVerdict {
    if line.starts_with(HEADER_MARKER) {
        return LineVerdict::Header;
    }

    let mut columns = line.split('\t');
    // nth(8) then next() only both succeed with at least ten columns
    let (Some(format), Some(sample)) = (columns.nth(FORMAT_COLUMN), columns.next()) else {
        return LineVerdict::Malformed;
    };

    counts.n_records += 1;
    let fields = extract_gt_dp_gq(format, sample);

    if is_missing_genotype(fields.genotype) {
        counts.gt_missing += 1;
    }

    if !is_heterozygous(fields.genotype) {
        return LineVerdict::Rejected;
    }
    counts.after_gt_het += 1;

    if !depth_passes(fields.depth) {
        return LineVerdict::Rejected;
    }
    counts.after_dp += 1;

    if !quality_passes(fields.quality) {
        return LineVerdict::Rejected;
    }
    counts.after_gq += 1;

    LineVerdict::Passed
}

/// Stream `reader` into `writer`, keeping header lines and passing records.
///
/// Lines are read as raw bytes; invalid UTF-8 is replaced with U+FFFD for
/// classification only, and the original bytes are what get written.
pub fn filter_stream<R, W>(mut reader: R, mut writer: W) -> Result<FunnelCounts, StreamError>
where
    R: BufRead,
    W: Write,
{
    let mut counts = FunnelCounts::default();
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) => {}
            Err(source) => return Err(StreamError::Read { counts, source }),
        }

        let verdict = {
            let text = String::from_utf8_lossy(&buf);
            let line = text.strip_suffix('\n').unwrap_or(&*text);
            tally_line(&mut counts, line)
        };

        if verdict.is_emitted()
            && let Err(source) = writer.write_all(&buf)
        {
            return Err(StreamError::Write { counts, source });
        }
    }

    writer
        .flush()
        .map_err(|source| StreamError::Write { counts, source })?;

    Ok(counts)
}

/// Filter one gzip-compressed gVCF into a gzip-compressed output.
///
/// The output's parent directories are created as needed. A failure leaves
/// whatever was already written in place.
pub fn filter_and_count(input: &Path, output: &Path) -> Result<FunnelCounts, FilterError> {
    if !input.exists() {
        return Err(FilterError::InputNotFound(input.to_path_buf()));
    }

    tracing::debug!(input = %input.display(), output = %output.display(), "filtering");

    let reader = smart_reader::open_input(input).map_err(|e| FilterError::io(input, 0, e))?;

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| FilterError::io(parent, 0, e))?;
    }
    let file = File::create(output).map_err(|e| FilterError::io(output, 0, e))?;
    let mut encoder = GzEncoder::new(BufWriter::new(file), Compression::default());

    let counts = filter_stream(reader, &mut encoder).map_err(|e| match e {
        StreamError::Read { counts, source } => FilterError::io(input, counts.n_records, source),
        StreamError::Write { counts, source } => FilterError::io(output, counts.n_records, source),
    })?;

    encoder
        .finish()
        .and_then(|mut inner| inner.flush())
        .map_err(|e| FilterError::io(output, counts.n_records, e))?;

    tracing::debug!(
        input = %input.display(),
        n_records = counts.n_records,
        het_count = counts.het_count(),
        "filtered"
    );

    Ok(counts)
}
