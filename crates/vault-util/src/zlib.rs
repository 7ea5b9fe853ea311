//! Zlib framing helpers.
//!
//! Loose objects and pack entries are zlib streams. Pack entries are
//! *concatenated* zlib streams, so [`inflate_partial`] must report exactly
//! how many input bytes one stream consumed; the next entry begins at that
//! offset.

use std::io::{Read, Write};

use flate2::read::{DeflateDecoder, ZlibDecoder};
use flate2::write::{DeflateEncoder, ZlibEncoder};
use flate2::{Compression, Decompress, FlushDecompress, Status};

use crate::UtilError;

/// Compress a buffer. With `raw` set, emit raw DEFLATE without the zlib
/// header and checksum.
pub fn deflate(data: &[u8], raw: bool) -> Result<Vec<u8>, UtilError> {
    if raw {
        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data)?;
        Ok(encoder.finish()?)
    } else {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data)?;
        Ok(encoder.finish()?)
    }
}

/// Compress with an explicit level (0-9).
pub fn deflate_with_level(data: &[u8], level: u32) -> Result<Vec<u8>, UtilError> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::new(level));
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

/// Decompress a complete buffer. With `raw` set, expect raw DEFLATE.
pub fn inflate(data: &[u8], raw: bool) -> Result<Vec<u8>, UtilError> {
    let mut out = Vec::new();
    if raw {
        DeflateDecoder::new(data)
            .read_to_end(&mut out)
            .map_err(|e| UtilError::Zlib(e.to_string()))?;
    } else {
        ZlibDecoder::new(data)
            .read_to_end(&mut out)
            .map_err(|e| UtilError::Zlib(e.to_string()))?;
    }
    Ok(out)
}

/// Decompress exactly one zlib stream from the front of `input`.
///
/// Returns the decompressed bytes and the number of *input* bytes the
/// stream occupied. Trailing bytes in `input` are untouched.
pub fn inflate_partial(input: &[u8]) -> Result<(Vec<u8>, usize), UtilError> {
    let mut inflater = Decompress::new(true);
    let mut out = Vec::with_capacity(input.len().max(64));

    loop {
        let in_before = inflater.total_in();
        let out_before = inflater.total_out();

        if out.len() == out.capacity() {
            out.reserve(out.capacity().max(1024));
        }

        let status = inflater
            .decompress_vec(&input[in_before as usize..], &mut out, FlushDecompress::None)
            .map_err(|e| UtilError::Zlib(e.to_string()))?;

        match status {
            Status::StreamEnd => {
                return Ok((out, inflater.total_in() as usize));
            }
            Status::Ok | Status::BufError => {
                // No forward progress with all input presented means the
                // stream is truncated.
                if inflater.total_in() == in_before && inflater.total_out() == out_before {
                    return Err(UtilError::ZlibTruncated {
                        consumed: in_before as usize,
                    });
                }
            }
        }
    }
}
