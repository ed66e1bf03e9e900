use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use flate2::read::MultiGzDecoder;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Opens a file and transparently peels off GZIP/BGZF layers to expose the
/// underlying text stream. Files without a gzip header are read as-is.
pub fn open_input(path: &Path) -> io::Result<Box<dyn BufRead + Send>> {
    let file = File::open(path)?;
    peel_gzip(Box::new(BufReader::new(file)))
}

/// Wraps `reader` in one decoder per gzip layer found at the head of the
/// stream, so `.vcf.gz.gz` and uncompressed text both come out as text.
pub fn peel_gzip(mut reader: Box<dyn BufRead + Send>) -> io::Result<Box<dyn BufRead + Send>> {
    // Limit recursion depth to avoid infinite loops on malformed inputs
    const MAX_DEPTH: usize = 10;

    for _ in 0..MAX_DEPTH {
        let buf = reader.fill_buf()?;
        if buf.len() < 2 || buf[..2] != GZIP_MAGIC {
            break;
        }
        tracing::debug!("Detected GZIP/BGZF layer");
        // MultiGzDecoder handles BGZF blocks and concatenated members
        reader = Box::new(BufReader::new(MultiGzDecoder::new(reader)));
    }

    Ok(reader)
}
