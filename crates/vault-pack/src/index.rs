//! Pack index v2: reading, lookup, and writing.
//!
//! Layout:
//! ```text
//! \377tOc | u32 version=2
//! fanout[256] u32 (cumulative counts)
//! sorted 20-byte IDs
//! u32 crc32 per entry
//! u32 offset per entry (high bit set -> index into u64 table)
//! u64 large offsets (only for entries past 2 GiB)
//! 20-byte pack checksum | 20-byte index checksum
//! ```

use std::path::{Path, PathBuf};

use memmap2::Mmap;
use vault_hash::{hasher::Hasher, FanoutTable, ObjectId};

use crate::{PackError, IDX_SIGNATURE, IDX_VERSION};

const HASH_LEN: usize = 20;
const FANOUT_BYTES: usize = 1024;

/// Memory-mapped pack index providing ID → offset lookup.
pub struct PackIndex {
    data: Mmap,
    num_objects: u32,
    oid_offset: usize,
    crc_offset: usize,
    offset32_offset: usize,
    offset64_offset: usize,
    path: PathBuf,
}

impl PackIndex {
    /// Open and validate an index file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PackError> {
        let path = path.as_ref().to_path_buf();
        let file = std::fs::File::open(&path)?;
        let data = unsafe { Mmap::map(&file)? };
        Self::from_mmap(data, path)
    }

    fn from_mmap(data: Mmap, path: PathBuf) -> Result<Self, PackError> {
        if data.len() < 8 + FANOUT_BYTES + 2 * HASH_LEN {
            return Err(PackError::InvalidIndex("file too small".into()));
        }
        if data[0..4] != IDX_SIGNATURE {
            return Err(PackError::InvalidIndex("bad signature".into()));
        }
        let version = read_u32(&data[4..]);
        if version != IDX_VERSION {
            return Err(PackError::InvalidIndex(format!(
                "unsupported version {version}, expected {IDX_VERSION}"
            )));
        }

        let num_objects = read_u32(&data[8 + 255 * 4..]);
        let n = num_objects as usize;

        let oid_offset = 8 + FANOUT_BYTES;
        let crc_offset = oid_offset + n * HASH_LEN;
        let offset32_offset = crc_offset + n * 4;
        let offset64_offset = offset32_offset + n * 4;

        if data.len() < offset64_offset + 2 * HASH_LEN {
            return Err(PackError::InvalidIndex(format!(
                "file too small for {n} entries: {} bytes",
                data.len()
            )));
        }

        Ok(Self {
            data,
            num_objects,
            oid_offset,
            crc_offset,
            offset32_offset,
            offset64_offset,
            path,
        })
    }

    /// Find the pack offset for an ID: fan-out bound, then binary search.
    pub fn lookup(&self, id: &ObjectId) -> Option<u64> {
        self.lookup_position(id)
            .map(|pos| self.offset_at(pos as u32))
    }

    /// Sorted position of an ID, if present.
    pub fn lookup_position(&self, id: &ObjectId) -> Option<usize> {
        let (mut low, mut high) = self.fanout_range(id.first_byte());
        let target = id.as_bytes();

        while low < high {
            let mid = low + (high - low) / 2;
            match self.oid_bytes_at(mid).cmp(target.as_slice()) {
                std::cmp::Ordering::Less => low = mid + 1,
                std::cmp::Ordering::Greater => high = mid,
                std::cmp::Ordering::Equal => return Some(mid),
            }
        }
        None
    }

    /// ID at a sorted position.
    pub fn oid_at(&self, index: u32) -> ObjectId {
        let start = self.oid_offset + index as usize * HASH_LEN;
        ObjectId::from_bytes(&self.data[start..start + HASH_LEN])
            .expect("index slice is exactly 20 bytes")
    }

    /// Pack offset at a sorted position, following the u64 spill table.
    pub fn offset_at(&self, index: u32) -> u64 {
        let pos = self.offset32_offset + index as usize * 4;
        let val = read_u32(&self.data[pos..]);
        if val & 0x8000_0000 != 0 {
            let idx64 = (val & 0x7fff_ffff) as usize;
            let pos64 = self.offset64_offset + idx64 * 8;
            u64::from_be_bytes(
                self.data[pos64..pos64 + 8]
                    .try_into()
                    .expect("index slice is exactly 8 bytes"),
            )
        } else {
            u64::from(val)
        }
    }

    /// Entry CRC-32 at a sorted position.
    pub fn crc32_at(&self, index: u32) -> u32 {
        read_u32(&self.data[self.crc_offset + index as usize * 4..])
    }

    /// Cumulative fan-out count for a first byte.
    pub fn fanout_at(&self, first_byte: u8) -> u32 {
        read_u32(&self.data[8 + first_byte as usize * 4..])
    }

    pub fn num_objects(&self) -> u32 {
        self.num_objects
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Pack checksum recorded in the trailer.
    pub fn pack_checksum(&self) -> ObjectId {
        let start = self.data.len() - 2 * HASH_LEN;
        ObjectId::from_bytes(&self.data[start..start + HASH_LEN])
            .expect("trailer slice is exactly 20 bytes")
    }

    /// Verify the trailing checksum of the index file itself.
    pub fn verify_checksum(&self) -> Result<(), PackError> {
        let body = &self.data[..self.data.len() - HASH_LEN];
        let stored = ObjectId::from_bytes(&self.data[self.data.len() - HASH_LEN..])
            .expect("trailer slice is exactly 20 bytes");
        let actual = Hasher::digest(body)?;
        if actual != stored {
            return Err(PackError::ChecksumMismatch {
                expected: stored,
                actual,
            });
        }
        Ok(())
    }

    /// Iterate `(id, offset)` pairs in sorted ID order.
    pub fn iter(&self) -> impl Iterator<Item = (ObjectId, u64)> + '_ {
        (0..self.num_objects).map(|i| (self.oid_at(i), self.offset_at(i)))
    }

    fn fanout_range(&self, first_byte: u8) -> (usize, usize) {
        let end = self.fanout_at(first_byte) as usize;
        let start = if first_byte == 0 {
            0
        } else {
            self.fanout_at(first_byte - 1) as usize
        };
        (start, end)
    }

    fn oid_bytes_at(&self, index: usize) -> &[u8] {
        let start = self.oid_offset + index * HASH_LEN;
        &self.data[start..start + HASH_LEN]
    }
}

/// Serialize a v2 index for `entries` (`(id, offset, crc32)`); entries are
/// sorted in place by ID.
pub fn serialize_index(
    entries: &mut [(ObjectId, u64, u32)],
    pack_checksum: &ObjectId,
) -> Result<Vec<u8>, PackError> {
    entries.sort_by(|a, b| a.0.cmp(&b.0));

    let mut buf = Vec::with_capacity(8 + FANOUT_BYTES + entries.len() * (HASH_LEN + 8));
    buf.extend_from_slice(&IDX_SIGNATURE);
    buf.extend_from_slice(&IDX_VERSION.to_be_bytes());

    let ids: Vec<ObjectId> = entries.iter().map(|(id, _, _)| *id).collect();
    buf.extend_from_slice(&FanoutTable::build(&ids).to_bytes());

    for (id, _, _) in entries.iter() {
        buf.extend_from_slice(id.as_bytes());
    }
    for (_, _, crc) in entries.iter() {
        buf.extend_from_slice(&crc.to_be_bytes());
    }

    let mut large_offsets: Vec<u64> = Vec::new();
    for (_, offset, _) in entries.iter() {
        if *offset >= 0x8000_0000 {
            let spill = 0x8000_0000u32 | large_offsets.len() as u32;
            buf.extend_from_slice(&spill.to_be_bytes());
            large_offsets.push(*offset);
        } else {
            buf.extend_from_slice(&(*offset as u32).to_be_bytes());
        }
    }
    for offset in &large_offsets {
        buf.extend_from_slice(&offset.to_be_bytes());
    }

    buf.extend_from_slice(pack_checksum.as_bytes());
    let idx_checksum = Hasher::digest(&buf)?;
    buf.extend_from_slice(idx_checksum.as_bytes());

    Ok(buf)
}

/// Write a v2 index file next to its pack.
pub fn write_index(
    idx_path: &Path,
    entries: &mut [(ObjectId, u64, u32)],
    pack_checksum: &ObjectId,
) -> Result<(), PackError> {
    let buf = serialize_index(entries, pack_checksum)?;
    std::fs::write(idx_path, &buf)?;
    Ok(())
}

fn read_u32(data: &[u8]) -> u32 {
    u32::from_be_bytes([data[0], data[1], data[2], data[3]])
}
