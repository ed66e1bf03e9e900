use std::{fs, io::Write};

use cohort_filter::{
    FunnelCounts, depth_passes, extract_gt_dp_gq, filter_and_count, filter_stream,
    is_heterozygous, quality_passes,
};
use flate2::{Compression, write::GzEncoder};
use proptest::prelude::*;
use rayon::{ThreadPoolBuilder, prelude::*};

fn genotype() -> impl Strategy<Value = String> {
    prop::sample::select(vec!["0|1", "1|0", "0/1", "1|1", "0|0", "./.", ".", ".|.", "1|2"])
        .prop_map(String::from)
}

fn small_number() -> impl Strategy<Value = String> {
    prop_oneof![
        (0u32..60).prop_map(|n| n.to_string()),
        Just(".".to_string()),
        Just(String::new()),
        Just("abc".to_string()),
    ]
}

/// A data line with random FORMAT key order and sample values.
fn data_line() -> impl Strategy<Value = String> {
    (
        genotype(),
        small_number(),
        small_number(),
        Just(vec!["GT", "DP", "GQ", "AD"]).prop_shuffle(),
        prop::bool::ANY,
    )
        .prop_map(|(gt, dp, gq, keys, extra_sample)| {
            let values: Vec<String> = keys
                .iter()
                .map(|k| match *k {
                    "GT" => gt.clone(),
                    "DP" => dp.clone(),
                    "GQ" => gq.clone(),
                    _ => "3,4".to_string(),
                })
                .collect();
            let mut line = format!(
                "chr1\t10\t.\tA\tG\t.\t.\t.\t{}\t{}",
                keys.join(":"),
                values.join(":")
            );
            if extra_sample {
                line.push_str("\t0|1:99:99:1,1");
            }
            line
        })
}

fn document() -> impl Strategy<Value = String> {
    prop::collection::vec(
        prop_oneof![
            3 => data_line(),
            1 => Just("##meta=1".to_string()),
            1 => Just("too\tfew\tfields".to_string()),
        ],
        0..40,
    )
    .prop_map(|lines| lines.into_iter().map(|l| l + "\n").collect())
}

fn run(input: &str) -> (FunnelCounts, String) {
    let mut out = Vec::new();
    let counts = filter_stream(input.as_bytes(), &mut out).unwrap();
    (counts, String::from_utf8(out).unwrap())
}

proptest! {
    #[test]
    fn funnel_is_monotonic(doc in document()) {
        let (counts, _) = run(&doc);
        prop_assert!(counts.after_gt_het <= counts.n_records);
        prop_assert!(counts.after_dp <= counts.after_gt_het);
        prop_assert!(counts.after_gq <= counts.after_dp);
        prop_assert!(counts.gt_missing + counts.after_gt_het <= counts.n_records);
    }

    #[test]
    fn emitted_lines_are_headers_or_passing_records(doc in document()) {
        let (counts, out) = run(&doc);
        let mut passed = 0;
        for line in out.lines() {
            if line.starts_with('#') {
                continue;
            }
            let fields: Vec<&str> = line.split('\t').collect();
            prop_assert!(fields.len() >= 10);
            let sample = extract_gt_dp_gq(fields[8], fields[9]);
            prop_assert!(is_heterozygous(sample.genotype));
            prop_assert!(depth_passes(sample.depth));
            prop_assert!(quality_passes(sample.quality));
            passed += 1;
        }
        prop_assert_eq!(passed, counts.after_gq);

        let headers_in = doc.lines().filter(|l| l.starts_with('#')).count();
        let headers_out = out.lines().filter(|l| l.starts_with('#')).count();
        prop_assert_eq!(headers_in, headers_out);
    }

    #[test]
    fn output_preserves_input_order(doc in document()) {
        let (_, out) = run(&doc);
        let mut remaining = doc.lines();
        for line in out.lines() {
            prop_assert!(remaining.any(|l| l == line), "line out of order: {}", line);
        }
    }

    #[test]
    fn filtering_is_idempotent(doc in document()) {
        let (counts, out) = run(&doc);
        prop_assert_eq!(run(&doc), (counts, out.clone()));

        let (again, out_again) = run(&out);
        prop_assert_eq!(&out, &out_again);
        prop_assert_eq!(again.n_records, counts.after_gq);
        prop_assert_eq!(again.after_gq, counts.after_gq);
    }

    #[test]
    fn depth_threshold_is_exclusive(dp in 0u64..1000) {
        prop_assert_eq!(depth_passes(Some(dp.to_string().as_str())), dp > 20);
    }

    #[test]
    fn quality_threshold_is_inclusive(gq in 0u64..1000) {
        prop_assert_eq!(quality_passes(Some(gq.to_string().as_str())), gq >= 30);
    }

    #[test]
    fn last_duplicate_key_wins(first in 0u32..100, second in 0u32..100) {
        let sample = format!("0|1:{first}:{second}");
        let fields = extract_gt_dp_gq("GT:DP:DP", &sample);
        let expected = second.to_string();
        prop_assert_eq!(fields.depth, Some(expected.as_str()));
    }

    #[test]
    fn arbitrary_bytes_never_fail(data in prop::collection::vec(any::<u8>(), 0..2048)) {
        let mut out = Vec::new();
        let counts = filter_stream(data.as_slice(), &mut out).unwrap();
        prop_assert!(counts.after_gq <= counts.n_records);
        prop_assert!(out.len() <= data.len());
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(8))]

    #[test]
    fn concurrent_files_do_not_interfere(docs in prop::collection::vec(document(), 2..8)) {
        let dir = tempfile::tempdir().unwrap();
        let inputs: Vec<_> = docs
            .iter()
            .enumerate()
            .map(|(i, doc)| {
                let path = dir.path().join(format!("{i:03}.g.vcf.gz"));
                let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
                encoder.write_all(doc.as_bytes()).unwrap();
                fs::write(&path, encoder.finish().unwrap()).unwrap();
                path
            })
            .collect();

        let pool = ThreadPoolBuilder::new().num_threads(4).build().unwrap();
        let parallel = pool.install(|| {
            inputs
                .par_iter()
                .map(|input| {
                    let output = input.with_extension("filtered.gz");
                    filter_and_count(input, &output).unwrap()
                })
                .collect::<Vec<_>>()
        });

        for (doc, counts) in docs.iter().zip(parallel) {
            prop_assert_eq!(run(doc).0, counts);
        }
    }
}
