//! Pack reading with iterative delta-chain resolution.

use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use lru::LruCache;
use memmap2::Mmap;
use vault_hash::{hasher::Hasher, ObjectId};
use vault_object::ObjectType;
use vault_util::zlib::inflate_partial;

use crate::delta::apply::apply_delta;
use crate::entry::parse_entry_header;
use crate::index::PackIndex;
use crate::{
    PackEntryKind, PackError, PackedObject, MAX_DELTA_CHAIN_DEPTH, PACK_HEADER_SIZE,
    PACK_SIGNATURE, PACK_VERSION,
};

/// Resolved entries kept per pack, keyed by entry offset.
const BASE_CACHE_CAPACITY: usize = 64;

/// A memory-mapped pack with its index.
pub struct PackFile {
    data: Mmap,
    index: PackIndex,
    pack_path: PathBuf,
    num_objects: u32,
    /// Recently resolved entries; chains re-use them instead of re-applying
    /// the whole delta stack.
    base_cache: Mutex<LruCache<u64, PackedObject>>,
}

impl PackFile {
    /// Open `<name>.pack` and its sibling `.idx`.
    pub fn open(pack_path: impl AsRef<Path>) -> Result<Self, PackError> {
        let pack_path = pack_path.as_ref().to_path_buf();
        let idx_path = pack_path.with_extension("idx");

        let file = std::fs::File::open(&pack_path)?;
        let data = unsafe { Mmap::map(&file)? };

        if data.len() < PACK_HEADER_SIZE {
            return Err(PackError::InvalidHeader("file too small".into()));
        }
        if &data[0..4] != PACK_SIGNATURE {
            return Err(PackError::InvalidHeader("bad PACK signature".into()));
        }
        let version = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
        if version != PACK_VERSION {
            return Err(PackError::UnsupportedVersion(version));
        }
        let num_objects = u32::from_be_bytes([data[8], data[9], data[10], data[11]]);

        let index = PackIndex::open(&idx_path)?;
        if index.num_objects() != num_objects {
            return Err(PackError::InvalidHeader(format!(
                "pack has {num_objects} objects but index has {}",
                index.num_objects()
            )));
        }

        Ok(Self {
            data,
            index,
            pack_path,
            num_objects,
            base_cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(BASE_CACHE_CAPACITY).expect("nonzero capacity"),
            )),
        })
    }

    /// Read an object by ID; `None` when this pack does not contain it.
    pub fn read_object(&self, id: &ObjectId) -> Result<Option<PackedObject>, PackError> {
        self.read_object_with_resolver(id, |_| None)
    }

    /// Read by ID with an external resolver for REF_DELTA bases that are
    /// not in this pack (thin-pack completion).
    pub fn read_object_with_resolver(
        &self,
        id: &ObjectId,
        resolver: impl Fn(&ObjectId) -> Option<(ObjectType, Vec<u8>)>,
    ) -> Result<Option<PackedObject>, PackError> {
        match self.index.lookup(id) {
            Some(offset) => self.read_at_offset_with_resolver(offset, resolver).map(Some),
            None => Ok(None),
        }
    }

    /// Read the entry at a known offset.
    pub fn read_at_offset(&self, offset: u64) -> Result<PackedObject, PackError> {
        self.read_at_offset_with_resolver(offset, |_| None)
    }

    /// Read at an offset, resolving the delta chain iteratively.
    ///
    /// A visit-set over offsets rejects cycles; resolved entries land in an
    /// LRU so deep chains short-circuit on re-reads.
    pub fn read_at_offset_with_resolver(
        &self,
        offset: u64,
        resolver: impl Fn(&ObjectId) -> Option<(ObjectType, Vec<u8>)>,
    ) -> Result<PackedObject, PackError> {
        if let Some(hit) = self.cache_get(offset) {
            return Ok(hit);
        }

        // Walk down to the base, collecting delta payloads outermost-first.
        let mut deltas: Vec<Vec<u8>> = Vec::new();
        let mut visited: HashSet<u64> = HashSet::new();
        let mut current = offset;

        let resolved = loop {
            if !visited.insert(current) {
                return Err(PackError::DeltaCycle(current));
            }
            if visited.len() > MAX_DELTA_CHAIN_DEPTH {
                return Err(PackError::ChainTooDeep {
                    offset,
                    max_depth: MAX_DELTA_CHAIN_DEPTH,
                });
            }

            if let Some(hit) = self.cache_get(current) {
                break hit;
            }

            let entry = self.entry_at(current)?;
            let payload = self.decompress_at(&entry)?;

            match entry.kind {
                PackEntryKind::Commit
                | PackEntryKind::Tree
                | PackEntryKind::Blob
                | PackEntryKind::Tag => {
                    let obj_type = entry.kind.to_object_type().expect("non-delta kind");
                    break PackedObject {
                        obj_type,
                        data: payload,
                    };
                }
                PackEntryKind::OfsDelta { base_offset } => {
                    deltas.push(payload);
                    current = base_offset;
                }
                PackEntryKind::RefDelta { base_id } => {
                    deltas.push(payload);
                    if let Some(base_offset) = self.index.lookup(&base_id) {
                        current = base_offset;
                    } else if let Some((obj_type, data)) = resolver(&base_id) {
                        break PackedObject { obj_type, data };
                    } else {
                        return Err(PackError::MissingBase(base_id));
                    }
                }
            }
        };

        let mut data = resolved.data;
        for delta in deltas.iter().rev() {
            data = apply_delta(&data, delta)?;
        }

        let result = PackedObject {
            obj_type: resolved.obj_type,
            data,
        };
        self.cache_put(offset, result.clone());
        Ok(result)
    }

    /// Parse the entry header at an offset.
    pub fn entry_at(&self, offset: u64) -> Result<crate::entry::PackEntryHeader, PackError> {
        let start = offset as usize;
        if start >= self.data.len() {
            return Err(PackError::CorruptEntry(offset));
        }
        parse_entry_header(&self.data[start..], offset)
    }

    /// Decompress one entry's zlib stream, validating the declared size.
    fn decompress_at(&self, entry: &crate::entry::PackEntryHeader) -> Result<Vec<u8>, PackError> {
        let start = entry.data_offset as usize;
        if start > self.data.len() {
            return Err(PackError::CorruptEntry(entry.data_offset));
        }
        let (payload, _consumed) = inflate_partial(&self.data[start..])
            .map_err(|_| PackError::CorruptEntry(entry.data_offset))?;
        if payload.len() != entry.uncompressed_size {
            return Err(PackError::CorruptEntry(entry.data_offset));
        }
        Ok(payload)
    }

    /// Raw bytes of an entry (header + compressed stream), for CRC checks.
    pub fn entry_bytes(&self, offset: u64) -> Result<&[u8], PackError> {
        let entry = self.entry_at(offset)?;
        let start = offset as usize;
        let data_start = entry.data_offset as usize;
        let (_, consumed) = inflate_partial(&self.data[data_start..])
            .map_err(|_| PackError::CorruptEntry(entry.data_offset))?;
        Ok(&self.data[start..data_start + consumed])
    }

    /// Verify the trailing SHA-1 over the whole pack.
    pub fn verify_checksum(&self) -> Result<(), PackError> {
        if self.data.len() < 20 {
            return Err(PackError::InvalidHeader("missing trailer".into()));
        }
        let body = &self.data[..self.data.len() - 20];
        let stored = ObjectId::from_bytes(&self.data[self.data.len() - 20..])
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

    pub fn contains(&self, id: &ObjectId) -> bool {
        self.index.lookup(id).is_some()
    }

    pub fn num_objects(&self) -> u32 {
        self.num_objects
    }

    pub fn index(&self) -> &PackIndex {
        &self.index
    }

    pub fn path(&self) -> &Path {
        &self.pack_path
    }

    fn cache_get(&self, offset: u64) -> Option<PackedObject> {
        self.base_cache
            .lock()
            .expect("base cache lock poisoned")
            .get(&offset)
            .cloned()
    }

    fn cache_put(&self, offset: u64, obj: PackedObject) {
        self.base_cache
            .lock()
            .expect("base cache lock poisoned")
            .put(offset, obj);
    }
}
