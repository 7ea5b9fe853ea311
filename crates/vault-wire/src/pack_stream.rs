//! Streaming pack parser.
//!
//! Consumes a pack from any `Read` without buffering the whole file. Each
//! entry header is parsed from a bounded internal buffer; the zlib payload
//! is pulled with partial decompression that reports exactly how many
//! input bytes one stream occupied, so the next entry starts right after
//! it. Entries come out in dependency order: a delta's base has always
//! been yielded (or was pre-seeded in the cache).

use std::collections::HashMap;
use std::io::Read;

use vault_hash::{hasher::Hasher, ObjectId};
use vault_object::ObjectType;
use vault_pack::delta::apply::apply_delta;
use vault_pack::delta::{Delta, DeltaOp};
use vault_pack::{PackEntryKind, PACK_SIGNATURE, PACK_VERSION};
use vault_util::varint;
use vault_util::zlib::inflate_partial;
use vault_util::UtilError;

use crate::cache::PackObjectCache;
use crate::WireError;

/// Internal buffer ceiling; a stream needing more than this per entry is
/// refused.
const MAX_BUFFER: usize = 64 * 1024 * 1024;

/// One entry from the stream, fully resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackStreamEntry {
    /// A non-delta entry.
    Base {
        id: ObjectId,
        obj_type: ObjectType,
        data: Vec<u8>,
    },
    /// A delta entry, resolved against its base.
    Delta {
        id: ObjectId,
        base_id: ObjectId,
        obj_type: ObjectType,
        /// Decoded copy/insert instructions.
        ops: Vec<DeltaOp>,
        /// Fully resolved content.
        data: Vec<u8>,
    },
}

impl PackStreamEntry {
    pub fn id(&self) -> ObjectId {
        match self {
            Self::Base { id, .. } | Self::Delta { id, .. } => *id,
        }
    }

    pub fn obj_type(&self) -> ObjectType {
        match self {
            Self::Base { obj_type, .. } | Self::Delta { obj_type, .. } => *obj_type,
        }
    }

    pub fn data(&self) -> &[u8] {
        match self {
            Self::Base { data, .. } | Self::Delta { data, .. } => data,
        }
    }
}

/// Iterator over the entries of a pack stream.
pub struct PackStreamReader<R: Read> {
    reader: R,
    buf: Vec<u8>,
    pos: usize,
    /// Offset of the next unconsumed byte within the pack.
    offset: u64,
    remaining: u32,
    total: u32,
    hasher: Option<Hasher>,
    cache: PackObjectCache,
    /// Entry offset -> id, for OFS_DELTA back-references.
    offsets: HashMap<u64, ObjectId>,
    finished: bool,
}

impl<R: Read> PackStreamReader<R> {
    /// Open a stream, validating the 12-byte header.
    pub fn new(reader: R) -> Result<Self, WireError> {
        Self::with_cache(reader, PackObjectCache::new())
    }

    /// Open with a pre-seeded cache (thin-pack completion).
    pub fn with_cache(reader: R, cache: PackObjectCache) -> Result<Self, WireError> {
        let mut this = Self {
            reader,
            buf: Vec::with_capacity(8192),
            pos: 0,
            offset: 0,
            remaining: 0,
            total: 0,
            hasher: Some(Hasher::new()),
            cache,
            offsets: HashMap::new(),
            finished: false,
        };

        let header = this.take_exact(12)?;
        if &header[0..4] != PACK_SIGNATURE {
            return Err(WireError::Protocol("bad PACK signature".into()));
        }
        let version = u32::from_be_bytes([header[4], header[5], header[6], header[7]]);
        if version != PACK_VERSION {
            return Err(WireError::Protocol(format!(
                "unsupported pack version {version}"
            )));
        }
        this.total = u32::from_be_bytes([header[8], header[9], header[10], header[11]]);
        this.remaining = this.total;
        Ok(this)
    }

    /// Declared entry count.
    pub fn total_entries(&self) -> u32 {
        self.total
    }

    /// The cache of resolved objects, e.g. to hand entries to the next
    /// consumer after the stream ends.
    pub fn cache_mut(&mut self) -> &mut PackObjectCache {
        &mut self.cache
    }

    fn next_entry(&mut self) -> Result<PackStreamEntry, WireError> {
        let entry_index = self.total - self.remaining;
        let entry_offset = self.offset;

        // Entry header: type + size varint, plus any base reference.
        let (kind, declared_size) = self.read_entry_header(entry_offset)?;

        let payload = self.read_zlib_stream(entry_index)?;
        if payload.len() != declared_size {
            return Err(WireError::Protocol(format!(
                "entry {entry_index}: declared {declared_size} bytes, inflated {}",
                payload.len()
            )));
        }

        let entry = match kind {
            PackEntryKind::Commit
            | PackEntryKind::Tree
            | PackEntryKind::Blob
            | PackEntryKind::Tag => {
                let obj_type = kind.to_object_type().expect("non-delta kind");
                let id = Hasher::hash_object(obj_type.as_str(), &payload)?;
                self.cache.insert(id, obj_type, payload.clone())?;
                self.offsets.insert(entry_offset, id);
                PackStreamEntry::Base {
                    id,
                    obj_type,
                    data: payload,
                }
            }
            PackEntryKind::OfsDelta { base_offset } => {
                let base_id = *self.offsets.get(&base_offset).ok_or_else(|| {
                    WireError::Protocol(format!(
                        "entry {entry_index}: OFS_DELTA base at {base_offset} not seen"
                    ))
                })?;
                self.resolve_delta(entry_offset, base_id, payload)?
            }
            PackEntryKind::RefDelta { base_id } => {
                self.resolve_delta(entry_offset, base_id, payload)?
            }
        };

        self.remaining -= 1;
        if self.remaining == 0 {
            self.verify_trailer()?;
            self.finished = true;
        }
        Ok(entry)
    }

    fn resolve_delta(
        &mut self,
        entry_offset: u64,
        base_id: ObjectId,
        delta_bytes: Vec<u8>,
    ) -> Result<PackStreamEntry, WireError> {
        let Some((obj_type, base_data)) = self.cache.get(&base_id)? else {
            return Err(WireError::MissingBase(base_id));
        };

        let ops = Delta::parse(&delta_bytes)?.ops;
        let data = apply_delta(&base_data, &delta_bytes)?;
        let id = Hasher::hash_object(obj_type.as_str(), &data)?;

        self.cache.insert(id, obj_type, data.clone())?;
        self.offsets.insert(entry_offset, id);

        Ok(PackStreamEntry::Delta {
            id,
            base_id,
            obj_type,
            ops,
            data,
        })
    }

    fn read_entry_header(&mut self, entry_offset: u64) -> Result<(PackEntryKind, usize), WireError> {
        // Pull bytes until the size varint terminates.
        let (type_num, size, header_len) = loop {
            match varint::read_entry_header(&self.buf[self.pos..]) {
                Ok(parsed) => break parsed,
                Err(UtilError::TruncatedVarint) => {
                    if self.fill_more()? == 0 {
                        return Err(WireError::Protocol("unexpected EOF in entry header".into()));
                    }
                }
                Err(e) => return Err(WireError::Protocol(e.to_string())),
            }
        };
        self.consume(header_len);

        let kind = match type_num {
            1 => PackEntryKind::Commit,
            2 => PackEntryKind::Tree,
            3 => PackEntryKind::Blob,
            4 => PackEntryKind::Tag,
            6 => {
                let (back, used) = loop {
                    match varint::read_ofs_varint(&self.buf[self.pos..]) {
                        Ok(parsed) => break parsed,
                        Err(UtilError::TruncatedVarint) => {
                            if self.fill_more()? == 0 {
                                return Err(WireError::Protocol(
                                    "unexpected EOF in delta offset".into(),
                                ));
                            }
                        }
                        Err(e) => return Err(WireError::Protocol(e.to_string())),
                    }
                };
                self.consume(used);
                if back > entry_offset {
                    return Err(WireError::Protocol(
                        "OFS_DELTA offset before pack start".into(),
                    ));
                }
                PackEntryKind::OfsDelta {
                    base_offset: entry_offset - back,
                }
            }
            7 => {
                let raw = self.take_exact(20)?;
                PackEntryKind::RefDelta {
                    base_id: ObjectId::from_bytes(&raw)
                        .expect("take_exact returns exactly 20 bytes"),
                }
            }
            other => {
                return Err(WireError::Protocol(format!(
                    "unknown pack entry type {other}"
                )))
            }
        };
        Ok((kind, size as usize))
    }

    /// Inflate exactly one zlib stream from the buffered input, pulling
    /// more bytes from the reader as the inflater asks for them.
    fn read_zlib_stream(&mut self, entry_index: u32) -> Result<Vec<u8>, WireError> {
        loop {
            match inflate_partial(&self.buf[self.pos..]) {
                Ok((payload, used)) => {
                    self.consume(used);
                    return Ok(payload);
                }
                Err(UtilError::ZlibTruncated { .. }) => {
                    if self.fill_more()? == 0 {
                        return Err(WireError::TruncatedStream { entry: entry_index });
                    }
                }
                Err(e) => return Err(WireError::Protocol(e.to_string())),
            }
        }
    }

    fn verify_trailer(&mut self) -> Result<(), WireError> {
        // The trailer is the hash of everything before it.
        let actual = self
            .hasher
            .take()
            .expect("trailer verified once")
            .finalize()?;

        while self.buf.len() - self.pos < 20 {
            if self.fill_more()? == 0 {
                return Err(WireError::Protocol("truncated pack trailer".into()));
            }
        }
        let stored = ObjectId::from_bytes(&self.buf[self.pos..self.pos + 20])
            .expect("slice is exactly 20 bytes");
        self.pos += 20;

        if stored != actual {
            return Err(WireError::ChecksumMismatch {
                expected: stored,
                actual,
            });
        }
        Ok(())
    }

    // ---- buffered input ----

    fn fill_more(&mut self) -> Result<usize, WireError> {
        // Drop the consumed prefix before growing.
        if self.pos > 64 * 1024 {
            self.buf.drain(..self.pos);
            self.pos = 0;
        }
        if self.buf.len() >= MAX_BUFFER {
            return Err(WireError::BufferExhausted { limit: MAX_BUFFER });
        }

        let mut chunk = [0u8; 8192];
        let n = self.reader.read(&mut chunk)?;
        self.buf.extend_from_slice(&chunk[..n]);
        Ok(n)
    }

    fn take_exact(&mut self, n: usize) -> Result<Vec<u8>, WireError> {
        while self.buf.len() - self.pos < n {
            if self.fill_more()? == 0 {
                return Err(WireError::Protocol(format!(
                    "unexpected EOF wanting {n} bytes"
                )));
            }
        }
        let out = self.buf[self.pos..self.pos + n].to_vec();
        self.consume(n);
        Ok(out)
    }

    fn consume(&mut self, n: usize) {
        if let Some(hasher) = self.hasher.as_mut() {
            hasher.update(&self.buf[self.pos..self.pos + n]);
        }
        self.pos += n;
        self.offset += n as u64;
    }
}

impl<R: Read> Iterator for PackStreamReader<R> {
    type Item = Result<PackStreamEntry, WireError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished || self.remaining == 0 {
            return None;
        }
        Some(self.next_entry())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use vault_pack::delta::compute::compute_delta;
    use vault_pack::entry::encode_entry_header;
    use vault_util::zlib::deflate;

    fn stream_pack(objects: &[(ObjectType, Vec<u8>)]) -> Vec<u8> {
        let (bytes, _, _) = vault_pack::write::serialize_pack(objects).unwrap();
        bytes
    }

    #[test]
    fn base_entries_in_order() {
        let objects = vec![
            (ObjectType::Blob, b"first blob".to_vec()),
            (ObjectType::Blob, b"second blob".to_vec()),
        ];
        let bytes = stream_pack(&objects);

        let reader = PackStreamReader::new(Cursor::new(bytes)).unwrap();
        assert_eq!(reader.total_entries(), 2);
        let entries: Vec<_> = reader.map(Result::unwrap).collect();

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].data(), b"first blob");
        assert_eq!(entries[1].data(), b"second blob");
        for entry in &entries {
            let expected = Hasher::hash_object("blob", entry.data()).unwrap();
            assert_eq!(entry.id(), expected);
        }
    }

    #[test]
    fn empty_pack_yields_nothing() {
        let bytes = stream_pack(&[]);
        assert_eq!(bytes.len(), 32);
        let mut reader = PackStreamReader::new(Cursor::new(bytes)).unwrap();
        assert!(reader.next().is_none());
    }

    /// Hand-assemble a pack with one base and one REF_DELTA entry.
    fn delta_pack(base: &[u8], target: &[u8]) -> Vec<u8> {
        let base_id = Hasher::hash_object("blob", base).unwrap();
        let delta = compute_delta(base, target);

        let mut pack = Vec::new();
        pack.extend_from_slice(b"PACK");
        pack.extend_from_slice(&2u32.to_be_bytes());
        pack.extend_from_slice(&2u32.to_be_bytes());

        pack.extend_from_slice(&encode_entry_header(
            &PackEntryKind::Blob,
            base.len() as u64,
            None,
        ));
        pack.extend_from_slice(&deflate(base, false).unwrap());

        pack.extend_from_slice(&encode_entry_header(
            &PackEntryKind::RefDelta { base_id },
            delta.len() as u64,
            None,
        ));
        pack.extend_from_slice(&deflate(&delta, false).unwrap());

        let checksum = Hasher::digest(&pack).unwrap();
        pack.extend_from_slice(checksum.as_bytes());
        pack
    }

    #[test]
    fn ref_delta_resolves_against_earlier_entry() {
        let base = b"a long enough base buffer to share blocks with the target";
        let target = b"a long enough base buffer to share blocks with the TARGET";
        let pack = delta_pack(base, target);

        let entries: Vec<_> = PackStreamReader::new(Cursor::new(pack))
            .unwrap()
            .map(Result::unwrap)
            .collect();

        assert_eq!(entries.len(), 2);
        match &entries[1] {
            PackStreamEntry::Delta {
                base_id,
                obj_type,
                ops,
                data,
                ..
            } => {
                assert_eq!(*base_id, entries[0].id());
                assert_eq!(*obj_type, ObjectType::Blob);
                assert!(!ops.is_empty());
                assert_eq!(data, target);
            }
            other => panic!("expected delta entry, got {other:?}"),
        }
    }

    #[test]
    fn thin_pack_without_cache_names_missing_base() {
        let base = b"the external base, never shipped in this stream at all!!";
        let target = b"the external base, never shipped in this stream at ALL!!";
        let base_id = Hasher::hash_object("blob", base).unwrap();
        let delta = compute_delta(base, target);

        let mut pack = Vec::new();
        pack.extend_from_slice(b"PACK");
        pack.extend_from_slice(&2u32.to_be_bytes());
        pack.extend_from_slice(&1u32.to_be_bytes());
        pack.extend_from_slice(&encode_entry_header(
            &PackEntryKind::RefDelta { base_id },
            delta.len() as u64,
            None,
        ));
        pack.extend_from_slice(&deflate(&delta, false).unwrap());
        let checksum = Hasher::digest(&pack).unwrap();
        pack.extend_from_slice(checksum.as_bytes());

        let mut reader = PackStreamReader::new(Cursor::new(pack.clone())).unwrap();
        match reader.next().unwrap() {
            Err(WireError::MissingBase(id)) => assert_eq!(id, base_id),
            other => panic!("expected MissingBase, got {other:?}"),
        }

        // Pre-seeding the cache completes the thin pack.
        let mut cache = PackObjectCache::new();
        cache.insert(base_id, ObjectType::Blob, base.to_vec()).unwrap();
        let mut reader = PackStreamReader::with_cache(Cursor::new(pack), cache).unwrap();
        let entry = reader.next().unwrap().unwrap();
        assert_eq!(entry.data(), target);
    }

    #[test]
    fn corrupted_trailer_detected() {
        let mut bytes = stream_pack(&[(ObjectType::Blob, b"payload".to_vec())]);
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;

        let mut reader = PackStreamReader::new(Cursor::new(bytes)).unwrap();
        match reader.next().unwrap() {
            Err(WireError::ChecksumMismatch { .. }) => {}
            other => panic!("expected checksum mismatch, got {other:?}"),
        }
    }

    #[test]
    fn truncated_stream_fails_cleanly() {
        let bytes = stream_pack(&[(ObjectType::Blob, b"some payload data".to_vec())]);
        let cut = bytes.len() - 25;
        let mut reader = PackStreamReader::new(Cursor::new(bytes[..cut].to_vec())).unwrap();
        assert!(reader.next().unwrap().is_err());
    }

    #[test]
    fn bad_signature_rejected() {
        let bytes = b"JUNK\x00\x00\x00\x02\x00\x00\x00\x00".to_vec();
        assert!(matches!(
            PackStreamReader::new(Cursor::new(bytes)),
            Err(WireError::Protocol(_))
        ));
    }
}
