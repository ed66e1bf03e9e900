#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let mut out = Vec::new();
    let counts = cohort_filter::filter_stream(data, &mut out).expect("in-memory streams do not fail");

    assert!(counts.after_gt_het <= counts.n_records);
    assert!(counts.after_dp <= counts.after_gt_het);
    assert!(counts.after_gq <= counts.after_dp);
    // only whole input lines are ever written
    assert!(out.len() <= data.len());
});
