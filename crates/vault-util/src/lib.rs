//! Foundation utilities for the gitvault storage engine.
//!
//! This crate provides the low-level codecs shared by every layer of the
//! engine: variable-length integers as used by the pack format, zlib
//! framing (including partial decompression with exact consumed-byte
//! accounting), lock files, and git-style dates and signatures.

pub mod date;
pub mod error;
pub mod lockfile;
pub mod varint;
pub mod zlib;

// Re-export core types at crate root for convenience
pub use bstr::{BStr, BString, ByteSlice, ByteVec};
pub use error::{LockError, UtilError};

pub type Result<T> = std::result::Result<T, UtilError>;

/// Compute the CRC-32 (zip polynomial) of a byte slice.
pub fn crc32(data: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(data);
    hasher.finalize()
}
