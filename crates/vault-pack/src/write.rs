//! Pack writing.
//!
//! The writer takes the object count up front so the header is final from
//! the first byte; a running hasher produces the trailing checksum without
//! re-reading the file. Entries are written in the order provided, and the
//! writer records `(id, offset, crc32)` for the sidecar index.

use std::io::Write;
use std::path::{Path, PathBuf};

use vault_hash::{hasher::Hasher, ObjectId};
use vault_object::ObjectType;
use vault_util::zlib::deflate;

use crate::entry::encode_entry_header;
use crate::index::write_index;
use crate::{PackEntryKind, PackError, PACK_HEADER_SIZE, PACK_SIGNATURE, PACK_VERSION};

/// Streaming pack writer.
pub struct PackWriter {
    file: std::fs::File,
    hasher: Hasher,
    declared: u32,
    written: u32,
    entries: Vec<(ObjectId, u64, u32)>,
    path: PathBuf,
    position: u64,
}

impl PackWriter {
    /// Create a pack at `path` that will hold exactly `num_objects` entries.
    pub fn create(path: impl AsRef<Path>, num_objects: u32) -> Result<Self, PackError> {
        let path = path.as_ref().to_path_buf();
        let mut file = std::fs::File::create(&path)?;
        let mut hasher = Hasher::new();

        let mut header = [0u8; PACK_HEADER_SIZE];
        header[0..4].copy_from_slice(PACK_SIGNATURE);
        header[4..8].copy_from_slice(&PACK_VERSION.to_be_bytes());
        header[8..12].copy_from_slice(&num_objects.to_be_bytes());

        file.write_all(&header)?;
        hasher.update(&header);

        Ok(Self {
            file,
            hasher,
            declared: num_objects,
            written: 0,
            entries: Vec::with_capacity(num_objects as usize),
            path,
            position: PACK_HEADER_SIZE as u64,
        })
    }

    /// Append a full (non-delta) object. Returns the entry offset.
    pub fn add_object(&mut self, obj_type: ObjectType, data: &[u8]) -> Result<u64, PackError> {
        let id = Hasher::hash_object(obj_type.as_str(), data)?;
        let kind = match obj_type {
            ObjectType::Commit => PackEntryKind::Commit,
            ObjectType::Tree => PackEntryKind::Tree,
            ObjectType::Blob => PackEntryKind::Blob,
            ObjectType::Tag => PackEntryKind::Tag,
        };
        let header = encode_entry_header(&kind, data.len() as u64, None);
        let compressed = deflate(data, false)?;
        self.append_entry(id, &header, &compressed)
    }

    /// Append an OFS_DELTA entry whose base starts at `base_offset` in this
    /// pack. Returns the entry offset.
    pub fn add_ofs_delta(
        &mut self,
        target_id: ObjectId,
        base_offset: u64,
        delta_bytes: &[u8],
    ) -> Result<u64, PackError> {
        let entry_offset = self.position;
        if base_offset >= entry_offset {
            return Err(PackError::InvalidDelta {
                offset: entry_offset,
                reason: "OFS_DELTA base must precede the entry".into(),
            });
        }
        let back = entry_offset - base_offset;
        let kind = PackEntryKind::OfsDelta { base_offset };
        let header = encode_entry_header(&kind, delta_bytes.len() as u64, Some(back));
        let compressed = deflate(delta_bytes, false)?;
        self.append_entry(target_id, &header, &compressed)
    }

    /// Append a REF_DELTA entry naming its base by ID. Returns the entry
    /// offset.
    pub fn add_ref_delta(
        &mut self,
        target_id: ObjectId,
        base_id: ObjectId,
        delta_bytes: &[u8],
    ) -> Result<u64, PackError> {
        let kind = PackEntryKind::RefDelta { base_id };
        let header = encode_entry_header(&kind, delta_bytes.len() as u64, None);
        let compressed = deflate(delta_bytes, false)?;
        self.append_entry(target_id, &header, &compressed)
    }

    fn append_entry(
        &mut self,
        id: ObjectId,
        header: &[u8],
        compressed: &[u8],
    ) -> Result<u64, PackError> {
        if self.written == self.declared {
            return Err(PackError::InvalidHeader(format!(
                "pack declared {} objects, refusing to add more",
                self.declared
            )));
        }

        let offset = self.position;

        let mut crc = crc32fast::Hasher::new();
        crc.update(header);
        crc.update(compressed);

        self.write_bytes(header)?;
        self.write_bytes(compressed)?;

        self.entries.push((id, offset, crc.finalize()));
        self.written += 1;
        Ok(offset)
    }

    /// Offset of a previously written object, for OFS_DELTA back-references.
    pub fn offset_of(&self, id: &ObjectId) -> Option<u64> {
        self.entries
            .iter()
            .find(|(entry_id, _, _)| entry_id == id)
            .map(|(_, offset, _)| *offset)
    }

    /// Entries written so far: `(id, offset, crc32)`.
    pub fn entries(&self) -> &[(ObjectId, u64, u32)] {
        &self.entries
    }

    /// Current write position.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Write the checksum trailer and sync. Returns the path and checksum.
    pub fn finish(mut self) -> Result<(PathBuf, ObjectId), PackError> {
        if self.written != self.declared {
            return Err(PackError::InvalidHeader(format!(
                "pack declared {} objects but {} were written",
                self.declared, self.written
            )));
        }

        let checksum = self.hasher.finalize()?;
        self.file.write_all(checksum.as_bytes())?;
        self.file.sync_all()?;
        Ok((self.path, checksum))
    }

    fn write_bytes(&mut self, data: &[u8]) -> Result<(), PackError> {
        self.file.write_all(data)?;
        self.hasher.update(data);
        self.position += data.len() as u64;
        Ok(())
    }
}

/// Serialize a whole pack to memory (used by the wire layer and tests).
pub fn serialize_pack(
    objects: &[(ObjectType, Vec<u8>)],
) -> Result<(Vec<u8>, Vec<(ObjectId, u64, u32)>, ObjectId), PackError> {
    let mut buf = Vec::new();
    buf.extend_from_slice(PACK_SIGNATURE);
    buf.extend_from_slice(&PACK_VERSION.to_be_bytes());
    buf.extend_from_slice(&(objects.len() as u32).to_be_bytes());

    let mut entries = Vec::with_capacity(objects.len());
    for (obj_type, data) in objects {
        let offset = buf.len() as u64;
        let id = Hasher::hash_object(obj_type.as_str(), data)?;
        let kind = match obj_type {
            ObjectType::Commit => PackEntryKind::Commit,
            ObjectType::Tree => PackEntryKind::Tree,
            ObjectType::Blob => PackEntryKind::Blob,
            ObjectType::Tag => PackEntryKind::Tag,
        };
        let header = encode_entry_header(&kind, data.len() as u64, None);
        let compressed = deflate(data, false)?;

        let mut crc = crc32fast::Hasher::new();
        crc.update(&header);
        crc.update(&compressed);

        buf.extend_from_slice(&header);
        buf.extend_from_slice(&compressed);
        entries.push((id, offset, crc.finalize()));
    }

    let checksum = Hasher::digest(&buf)?;
    buf.extend_from_slice(checksum.as_bytes());
    Ok((buf, entries, checksum))
}

/// Create `<name>.pack` and `<name>.idx` under `dir` from full objects.
pub fn create_pack(
    dir: &Path,
    name: &str,
    objects: &[(ObjectType, Vec<u8>)],
) -> Result<(PathBuf, PathBuf, ObjectId), PackError> {
    let pack_path = dir.join(format!("{name}.pack"));
    let idx_path = dir.join(format!("{name}.idx"));

    let mut writer = PackWriter::create(&pack_path, objects.len() as u32)?;
    for (obj_type, data) in objects {
        writer.add_object(*obj_type, data)?;
    }
    let mut entries = writer.entries().to_vec();
    let (pack_path, checksum) = writer.finish()?;
    write_index(&idx_path, &mut entries, &checksum)?;

    Ok((pack_path, idx_path, checksum))
}
