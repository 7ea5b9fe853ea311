//! Pack entry header parsing and encoding.

use vault_hash::ObjectId;
use vault_util::varint;

use crate::{PackEntryKind, PackError};

/// A raw entry header read from a pack, before decompression.
#[derive(Debug, Clone)]
pub struct PackEntryHeader {
    pub kind: PackEntryKind,
    /// Uncompressed payload size (for deltas, the delta byte count).
    pub uncompressed_size: usize,
    /// Absolute offset where the zlib stream begins.
    pub data_offset: u64,
    /// Bytes occupied by the header (including any base reference).
    pub header_size: usize,
}

/// Parse an entry header starting at `entry_offset` within the pack.
///
/// `data` must begin at the entry. The absolute offset is needed to turn an
/// OFS_DELTA backward distance into a base offset.
pub fn parse_entry_header(data: &[u8], entry_offset: u64) -> Result<PackEntryHeader, PackError> {
    let (type_num, size, mut pos) =
        varint::read_entry_header(data).map_err(|_| PackError::CorruptEntry(entry_offset))?;

    let kind = match type_num {
        1 => PackEntryKind::Commit,
        2 => PackEntryKind::Tree,
        3 => PackEntryKind::Blob,
        4 => PackEntryKind::Tag,
        6 => {
            let (back_offset, consumed) = varint::read_ofs_varint(&data[pos..])
                .map_err(|_| PackError::CorruptEntry(entry_offset))?;
            pos += consumed;
            if back_offset > entry_offset {
                return Err(PackError::CorruptEntry(entry_offset));
            }
            PackEntryKind::OfsDelta {
                base_offset: entry_offset - back_offset,
            }
        }
        7 => {
            if pos + 20 > data.len() {
                return Err(PackError::CorruptEntry(entry_offset));
            }
            let base_id = ObjectId::from_bytes(&data[pos..pos + 20])
                .map_err(|_| PackError::CorruptEntry(entry_offset))?;
            pos += 20;
            PackEntryKind::RefDelta { base_id }
        }
        _ => return Err(PackError::CorruptEntry(entry_offset)),
    };

    Ok(PackEntryHeader {
        kind,
        uncompressed_size: size as usize,
        data_offset: entry_offset + pos as u64,
        header_size: pos,
    })
}

/// Encode the header bytes for an entry of the given kind.
///
/// For OFS_DELTA the backward distance must be supplied; for REF_DELTA the
/// base ID is appended after the size varint.
pub fn encode_entry_header(kind: &PackEntryKind, size: u64, back_offset: Option<u64>) -> Vec<u8> {
    let mut buf = varint::write_entry_header(kind.type_number(), size);
    match kind {
        PackEntryKind::OfsDelta { .. } => {
            let back = back_offset.expect("OFS_DELTA requires a backward offset");
            buf.extend_from_slice(&varint::write_ofs_varint(back));
        }
        PackEntryKind::RefDelta { base_id } => {
            buf.extend_from_slice(base_id.as_bytes());
        }
        _ => {}
    }
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_entry_roundtrip() {
        let header = encode_entry_header(&PackEntryKind::Blob, 100, None);
        let parsed = parse_entry_header(&header, 0).unwrap();
        assert_eq!(parsed.kind, PackEntryKind::Blob);
        assert_eq!(parsed.uncompressed_size, 100);
        assert_eq!(parsed.header_size, header.len());
        assert_eq!(parsed.data_offset, header.len() as u64);
    }

    #[test]
    fn ofs_delta_resolves_backward() {
        let kind = PackEntryKind::OfsDelta { base_offset: 0 };
        let header = encode_entry_header(&kind, 30, Some(500));
        let parsed = parse_entry_header(&header, 700).unwrap();
        match parsed.kind {
            PackEntryKind::OfsDelta { base_offset } => assert_eq!(base_offset, 200),
            other => panic!("expected OfsDelta, got {other:?}"),
        }
    }

    #[test]
    fn ofs_delta_beyond_start_is_corrupt() {
        let kind = PackEntryKind::OfsDelta { base_offset: 0 };
        let header = encode_entry_header(&kind, 30, Some(500));
        assert!(matches!(
            parse_entry_header(&header, 100),
            Err(PackError::CorruptEntry(100))
        ));
    }

    #[test]
    fn ref_delta_carries_base_id() {
        let base_id = ObjectId::from_hex("da39a3ee5e6b4b0d3255bfef95601890afd80709").unwrap();
        let header = encode_entry_header(&PackEntryKind::RefDelta { base_id }, 12, None);
        let parsed = parse_entry_header(&header, 0).unwrap();
        match parsed.kind {
            PackEntryKind::RefDelta { base_id: parsed_id } => assert_eq!(parsed_id, base_id),
            other => panic!("expected RefDelta, got {other:?}"),
        }
    }

    #[test]
    fn truncated_ref_delta() {
        let base_id = ObjectId::NULL;
        let mut header = encode_entry_header(&PackEntryKind::RefDelta { base_id }, 12, None);
        header.truncate(header.len() - 5);
        assert!(parse_entry_header(&header, 0).is_err());
    }

    #[test]
    fn unknown_type_number() {
        // Type 5 is reserved.
        let data = [0x50];
        assert!(parse_entry_header(&data, 0).is_err());
    }
}
