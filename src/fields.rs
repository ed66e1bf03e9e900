//! Extraction of the GT, DP and GQ subfields from a single-sample record.

/// FORMAT key holding the genotype call.
pub const GENOTYPE_KEY: &str = "GT";
/// FORMAT key holding the read depth.
pub const DEPTH_KEY: &str = "DP";
/// FORMAT key holding the genotype quality.
pub const QUALITY_KEY: &str = "GQ";

/// The three subfields the filter interprets, borrowed from the record line.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct SampleFields<'a> {
    pub genotype: Option<&'a str>,
    pub depth: Option<&'a str>,
    pub quality: Option<&'a str>,
}

/// Pair the colon-delimited FORMAT keys with the sample values and pick out
/// GT, DP and GQ.
///
/// Keys and values are paired by position over the shorter of the two lists,
/// so trailing keys without a value (or values without a key) are ignored.
/// When a key repeats, the later position wins. Nothing here fails: malformed
/// input only yields `None` for the affected field.
pub fn extract_gt_dp_gq<'a>(format: &'a str, sample: &'a str) -> SampleFields<'a> {
    let mut fields = SampleFields::default();

    for (key, value) in format.split(':').zip(sample.split(':')) {
        match key {
            GENOTYPE_KEY => fields.genotype = Some(value),
            DEPTH_KEY => fields.depth = Some(value),
            QUALITY_KEY => fields.quality = Some(value),
            _ => {}
        }
    }

    fields
}
