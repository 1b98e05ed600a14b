//! Flate helpers used by compression and test fixtures.

use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::error::PdfOpsError;

/// Decode a FlateDecode (zlib) stream.
pub fn inflate(data: &[u8]) -> Result<Vec<u8>, PdfOpsError> {
    let mut decoder = ZlibDecoder::new(data);
    let mut out = Vec::with_capacity(data.len() * 2);
    decoder
        .read_to_end(&mut out)
        .map_err(|e| PdfOpsError::Operation(format!("Flate decode failed: {}", e)))?;
    Ok(out)
}

/// Encode with zlib at `level` (0-9).
pub fn deflate(data: &[u8], level: u32) -> Result<Vec<u8>, PdfOpsError> {
    let encode_err =
        |e: std::io::Error| PdfOpsError::Operation(format!("Flate encode failed: {}", e));
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::new(level.min(9)));
    encoder.write_all(data).map_err(encode_err)?;
    encoder.finish().map_err(encode_err)
}
