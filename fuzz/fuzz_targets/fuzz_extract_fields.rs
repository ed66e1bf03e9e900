#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let input = String::from_utf8_lossy(data);
    let (format, sample) = input.split_once('\t').unwrap_or((&*input, ""));

    let fields = cohort_filter::extract_gt_dp_gq(format, sample);
    for value in [fields.genotype, fields.depth, fields.quality].into_iter().flatten() {
        assert!(sample.contains(value));
    }

    let _ = cohort_filter::is_heterozygous(fields.genotype);
    let _ = cohort_filter::depth_passes(fields.depth);
    let _ = cohort_filter::quality_passes(fields.quality);
});
