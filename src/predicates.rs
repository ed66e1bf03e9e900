//! Pass/fail predicates applied to the extracted sample subfields.

/// Depth must be strictly greater than this.
pub const MIN_DEPTH_EXCLUSIVE: u64 = 20;
/// Genotype quality must be at least this.
pub const MIN_QUALITY: u64 = 30;

/// The only genotype encodings accepted as phased heterozygous.
pub const HETEROZYGOUS_GENOTYPES: [&str; 2] = ["0|1", "1|0"];
/// Genotype encodings counted as missing calls.
pub const MISSING_GENOTYPES: [&str; 3] = [".", "./.", ".|."];

/// True for exactly `0|1` or `1|0`. Unphased `0/1` does not count.
pub fn is_heterozygous(gt: Option<&str>) -> bool {
    gt.is_some_and(|gt| HETEROZYGOUS_GENOTYPES.contains(&gt))
}

/// True when GT is absent or one of the no-call encodings.
pub fn is_missing_genotype(gt: Option<&str>) -> bool {
    match gt {
        None => true,
        Some(gt) => MISSING_GENOTYPES.contains(&gt),
    }
}

/// True when DP is present, purely numeric and greater than 20.
pub fn depth_passes(dp: Option<&str>) -> bool {
    parse_digits(dp).is_some_and(|dp| dp > MIN_DEPTH_EXCLUSIVE)
}

/// True when GQ is present, purely numeric and at least 30.
pub fn quality_passes(gq: Option<&str>) -> bool {
    parse_digits(gq).is_some_and(|gq| gq >= MIN_QUALITY)
}

/// Parse a non-empty string made only of ASCII digits.
///
/// Signs, decimal points and whitespace are rejected. A digit string too long
/// for `u64` saturates, since it exceeds every threshold anyway.
fn parse_digits(value: Option<&str>) -> Option<u64> {
    let value = value?;
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(value.parse::<u64>().unwrap_or(u64::MAX))
}
