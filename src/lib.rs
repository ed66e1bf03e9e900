#![doc = include_str!("../README.md")]

pub mod cli;
pub mod cohort;
pub mod columnar;
pub mod fields;
pub mod filter;
pub mod merge;
pub mod plots;
pub mod predicates;
pub mod report;
pub mod smart_reader;
pub mod verify;

pub use cohort::{PipelineConfig, PipelineSummary, SummaryRow, run_pipeline};
pub use fields::{SampleFields, extract_gt_dp_gq};
pub use filter::{FilterError, LineVerdict, filter_and_count, filter_stream, tally_line};
pub use predicates::{depth_passes, is_heterozygous, is_missing_genotype, quality_passes};

use serde::{Deserialize, Serialize};

/// Progressive filtering counts for one input file.
///
/// `after_gt_het >= after_dp >= after_gq` always holds and none exceeds
/// `n_records`. `gt_missing` is tallied independently of the funnel: a
/// missing call is counted there and then fails the heterozygosity stage.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct FunnelCounts {
    /// Data records with at least ten columns.
    #[serde(rename = "N_Records")]
    pub n_records: u64,
    /// Records whose GT is absent or a no-call.
    #[serde(rename = "GT_Missing")]
    pub gt_missing: u64,
    /// Records with a phased heterozygous GT.
    #[serde(rename = "After_GT_Het")]
    pub after_gt_het: u64,
    /// ... that also have DP > 20.
    #[serde(rename = "After_DP")]
    pub after_dp: u64,
    /// ... that also have GQ >= 30. These are the records written out.
    #[serde(rename = "After_GQ")]
    pub after_gq: u64,
}

impl FunnelCounts {
    /// Final pass count, reported downstream as `Het_Count`.
    pub fn het_count(&self) -> u64 {
        self.after_gq
    }

    /// One-line summary in the `key=value` form the merge stage parses back.
    pub fn summary_line(&self, input_name: &str, output_name: &str) -> String {
        format!(
            "[OK] in={input_name} out={output_name} N_Records={} After_GT_Het={} After_DP={} After_GQ={} Het_Count={}",
            self.n_records,
            self.after_gt_het,
            self.after_dp,
            self.after_gq,
            self.het_count(),
        )
    }
}
