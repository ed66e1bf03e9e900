use std::{
    fs,
    io::{Read, Write},
    path::Path,
};

use assert_fs::prelude::*;
use cohort_filter::{FilterError, FunnelCounts, filter_and_count};
use flate2::{Compression, read::MultiGzDecoder, write::GzEncoder};

const GVCF: &str = "\
##fileformat=VCFv4.2
#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tS1
chr1\t100\t.\tA\tG\t.\t.\t.\tGT:DP:GQ\t0|1:25:40
chr1\t200\t.\tC\tT\t.\t.\t.\tGT:DP:GQ\t1|0:15:50
chr1\t300\t.\tG\tA\t.\t.\t.\tGT:DP:GQ\t0/1:30:60
";

fn gzip(content: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(content).unwrap();
    encoder.finish().unwrap()
}

fn gunzip(path: &Path) -> String {
    let mut text = String::new();
    MultiGzDecoder::new(fs::File::open(path).unwrap())
        .read_to_string(&mut text)
        .unwrap();
    text
}

#[test]
fn filters_gzip_input_to_gzip_output() {
    let temp = assert_fs::TempDir::new().unwrap();
    let input = temp.child("S1.g.vcf.gz");
    input.write_binary(&gzip(GVCF.as_bytes())).unwrap();
    let output = temp.child("filtered/Cohort_A/S1.het_dp20_gq30.vcf.gz");

    let counts = filter_and_count(input.path(), output.path()).unwrap();
    assert_eq!(
        counts,
        FunnelCounts {
            n_records: 3,
            gt_missing: 0,
            after_gt_het: 2,
            after_dp: 1,
            after_gq: 1,
        }
    );

    let text = gunzip(output.path());
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].starts_with("##fileformat"));
    assert!(lines[1].starts_with("#CHROM"));
    assert_eq!(lines[2], "chr1\t100\t.\tA\tG\t.\t.\t.\tGT:DP:GQ\t0|1:25:40");
}

#[test]
fn plain_text_input_is_accepted() {
    let temp = assert_fs::TempDir::new().unwrap();
    let input = temp.child("S1.g.vcf.gz");
    input.write_str(GVCF).unwrap();
    let output = temp.child("out.vcf.gz");

    let counts = filter_and_count(input.path(), output.path()).unwrap();
    assert_eq!(counts.het_count(), 1);
}

#[test]
fn refiltering_output_is_idempotent() {
    let temp = assert_fs::TempDir::new().unwrap();
    let input = temp.child("in.gz");
    input.write_binary(&gzip(GVCF.as_bytes())).unwrap();
    let first = temp.child("first.gz");
    let second = temp.child("second.gz");

    let counts = filter_and_count(input.path(), first.path()).unwrap();
    let again = filter_and_count(first.path(), second.path()).unwrap();

    assert_eq!(again.n_records, counts.after_gq);
    assert_eq!(again.after_gq, counts.after_gq);
    assert_eq!(gunzip(first.path()), gunzip(second.path()));
}

#[test]
fn rerun_to_same_output_is_byte_identical() {
    let temp = assert_fs::TempDir::new().unwrap();
    let input = temp.child("S1.g.vcf.gz");
    input.write_binary(&gzip(GVCF.as_bytes())).unwrap();
    let output = temp.child("x/S1.het_dp20_gq30.vcf.gz");

    let first_counts = filter_and_count(input.path(), output.path()).unwrap();
    let first_bytes = fs::read(output.path()).unwrap();
    // a gzip mtime stamp would differ across a second boundary
    std::thread::sleep(std::time::Duration::from_millis(1100));
    let second_counts = filter_and_count(input.path(), output.path()).unwrap();
    let second_bytes = fs::read(output.path()).unwrap();

    assert_eq!(first_counts, second_counts);
    assert_eq!(first_bytes, second_bytes);
}

#[test]
fn missing_input_creates_no_output() {
    let temp = assert_fs::TempDir::new().unwrap();
    let output = temp.child("nested/out.gz");

    let err = filter_and_count(&temp.path().join("absent.gz"), output.path()).unwrap_err();
    assert!(matches!(err, FilterError::InputNotFound(_)));
    assert_eq!(err.exit_code(), 2);
    assert!(!output.path().exists());
    assert!(!temp.child("nested").path().exists());
}

#[test]
fn corrupt_gzip_is_an_io_failure() {
    let temp = assert_fs::TempDir::new().unwrap();
    let input = temp.child("broken.gz");
    let mut bytes = gzip(GVCF.repeat(50).as_bytes());
    let keep = bytes.len() / 2;
    bytes.truncate(keep);
    bytes.extend_from_slice(&[0xde, 0xad, 0xbe, 0xef]);
    input.write_binary(&bytes).unwrap();

    let err = filter_and_count(input.path(), &temp.path().join("out.gz")).unwrap_err();
    match &err {
        FilterError::Io { path, .. } => assert_eq!(path, input.path()),
        other => panic!("expected Io error, got {other:?}"),
    }
    assert_eq!(err.exit_code(), 3);
}

#[test]
fn multi_member_input_is_read_fully() {
    let temp = assert_fs::TempDir::new().unwrap();
    let (head, tail) = GVCF.split_at(GVCF.find("chr1\t200").unwrap());
    let mut bytes = gzip(head.as_bytes());
    bytes.extend(gzip(tail.as_bytes()));
    let input = temp.child("bgzf_like.gz");
    input.write_binary(&bytes).unwrap();

    let counts = filter_and_count(input.path(), &temp.path().join("out.gz")).unwrap();
    assert_eq!(counts.n_records, 3);
}

#[test]
fn missing_genotypes_are_counted_and_dropped() {
    let temp = assert_fs::TempDir::new().unwrap();
    let body = "\
c\t1\t.\tA\tG\t.\t.\t.\tGT:DP:GQ\t./.:30:60
c\t2\t.\tA\tG\t.\t.\t.\tDP:GQ\t30:60
c\t3\t.\tA\tG\t.\t.\t.\tGT:DP:GQ\t.|.:30:60
c\t4\t.\tA\tG\t.\t.\t.\tGT:DP\t0|1:21
";
    let input = temp.child("in.gz");
    input.write_binary(&gzip(body.as_bytes())).unwrap();
    let output = temp.child("out.gz");

    let counts = filter_and_count(input.path(), output.path()).unwrap();
    assert_eq!(counts.n_records, 4);
    assert_eq!(counts.gt_missing, 3);
    assert_eq!(counts.after_gt_het, 1);
    assert_eq!(counts.after_dp, 1);
    assert_eq!(counts.after_gq, 0);
    assert!(gunzip(output.path()).is_empty());
}
