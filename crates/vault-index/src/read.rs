//! Index file parsing (versions 2, 3, 4).

use bstr::{BString, ByteSlice};
use vault_hash::{hasher::Hasher, ObjectId};
use vault_object::FileMode;

use crate::entry::{EntryFlags, StagingEntry, StatData};
use crate::extensions::{CacheTree, RawExtension, ResolveUndo};
use crate::{IndexError, Stage, Staging};

const INDEX_SIGNATURE: &[u8; 4] = b"DIRC";

/// Fixed bytes ahead of the flexible portion: ctime(8) + mtime(8) + dev +
/// ino + mode + uid + gid + size (4 each).
const ONDISK_FIXED: usize = 40;
const HASH_LEN: usize = 20;

/// v2/v3 entry size with trailing NUL padding, per C git's formula.
fn ondisk_entry_size(name_len: usize, extended: bool) -> usize {
    let flags_len = if extended { 4 } else { 2 };
    (ONDISK_FIXED + HASH_LEN + flags_len + name_len + 8) & !7
}

/// Parse a complete index file.
pub fn parse_index(data: &[u8]) -> Result<Staging, IndexError> {
    if data.len() < 12 + HASH_LEN {
        return Err(IndexError::InvalidHeader("index file too short".into()));
    }

    verify_checksum(data)?;

    if &data[0..4] != INDEX_SIGNATURE {
        return Err(IndexError::InvalidHeader(format!(
            "bad signature: {:?}",
            &data[0..4]
        )));
    }
    let version = read_u32(&data[4..]);
    if !(2..=4).contains(&version) {
        return Err(IndexError::UnsupportedVersion(version));
    }
    let entry_count = read_u32(&data[8..]) as usize;

    let content_end = data.len() - HASH_LEN;
    let mut cursor = 12;
    let mut entries = Vec::with_capacity(entry_count);
    let mut prev_path = BString::default();

    for _ in 0..entry_count {
        let (entry, next) = parse_entry(data, cursor, version, &prev_path, content_end)?;
        prev_path = entry.path.clone();
        entries.push(entry);
        cursor = next;
    }

    let mut cache_tree = None;
    let mut resolve_undo = None;
    let mut unknown_extensions = Vec::new();

    while cursor + 8 <= content_end {
        let sig = &data[cursor..cursor + 4];
        let ext_len = read_u32(&data[cursor + 4..]) as usize;
        cursor += 8;

        if cursor + ext_len > content_end {
            return Err(IndexError::InvalidExtension {
                sig: String::from_utf8_lossy(sig).into_owned(),
                reason: "extension exceeds index bounds".into(),
            });
        }
        let ext_data = &data[cursor..cursor + ext_len];

        match sig {
            b"TREE" => cache_tree = Some(CacheTree::parse(ext_data)?),
            b"REUC" => resolve_undo = Some(ResolveUndo::parse(ext_data)?),
            _ => {
                let mut signature = [0u8; 4];
                signature.copy_from_slice(sig);
                let raw = RawExtension {
                    signature,
                    data: ext_data.to_vec(),
                };
                if !raw.is_optional() {
                    return Err(IndexError::MandatoryExtension(
                        String::from_utf8_lossy(sig).into_owned(),
                    ));
                }
                unknown_extensions.push(raw);
            }
        }
        cursor += ext_len;
    }

    // Lookups binary-search the entry list; a file violating the sort
    // order (or the stage rules) is malformed.
    crate::validate_entries(&entries)?;

    let mut staging = Staging::new();
    staging.set_state(version, entries, cache_tree, resolve_undo, unknown_extensions);
    Ok(staging)
}

fn parse_entry(
    data: &[u8],
    start: usize,
    version: u32,
    prev_path: &BString,
    content_end: usize,
) -> Result<(StagingEntry, usize), IndexError> {
    let mut cursor = start;
    if cursor + ONDISK_FIXED + HASH_LEN + 2 > content_end {
        return Err(IndexError::InvalidEntry {
            offset: start,
            reason: "entry too short".into(),
        });
    }

    let stat = StatData {
        ctime_secs: read_u32(&data[cursor..]),
        ctime_nsecs: read_u32(&data[cursor + 4..]),
        mtime_secs: read_u32(&data[cursor + 8..]),
        mtime_nsecs: read_u32(&data[cursor + 12..]),
        dev: read_u32(&data[cursor + 16..]),
        ino: read_u32(&data[cursor + 20..]),
        uid: read_u32(&data[cursor + 28..]),
        gid: read_u32(&data[cursor + 32..]),
        size: read_u32(&data[cursor + 36..]),
    };
    let mode_raw = read_u32(&data[cursor + 24..]);
    cursor += ONDISK_FIXED;

    let id = ObjectId::from_bytes(&data[cursor..cursor + HASH_LEN]).map_err(|_| {
        IndexError::InvalidEntry {
            offset: start,
            reason: "invalid object id".into(),
        }
    })?;
    cursor += HASH_LEN;

    let flags_raw = read_u16(&data[cursor..]);
    cursor += 2;

    let assume_valid = flags_raw & 0x8000 != 0;
    let extended = flags_raw & 0x4000 != 0;
    let stage_bits = ((flags_raw >> 12) & 0x03) as u8;

    let stage = Stage::from_u8(stage_bits).ok_or_else(|| IndexError::InvalidEntry {
        offset: start,
        reason: format!("invalid stage {stage_bits}"),
    })?;

    let mut intent_to_add = false;
    let mut skip_worktree = false;
    if extended {
        if version < 3 {
            return Err(IndexError::InvalidEntry {
                offset: start,
                reason: "extended flags in a v2 index".into(),
            });
        }
        if cursor + 2 > content_end {
            return Err(IndexError::InvalidEntry {
                offset: start,
                reason: "truncated extended flags".into(),
            });
        }
        let ext_flags = read_u16(&data[cursor..]);
        cursor += 2;
        intent_to_add = ext_flags & 0x2000 != 0;
        skip_worktree = ext_flags & 0x4000 != 0;
    }

    let path = if version == 4 {
        parse_v4_path(data, &mut cursor, prev_path, content_end, start)?
    } else {
        let nul = data[cursor..content_end]
            .find_byte(0)
            .ok_or_else(|| IndexError::InvalidEntry {
                offset: start,
                reason: "unterminated path".into(),
            })?;
        let path = BString::from(&data[cursor..cursor + nul]);

        let total = ondisk_entry_size(nul, extended);
        cursor = (start + total).min(content_end);
        path
    };

    let mode = FileMode::from_raw(mode_raw).ok_or_else(|| IndexError::InvalidEntry {
        offset: start,
        reason: format!("unknown mode {mode_raw:o}"),
    })?;

    Ok((
        StagingEntry {
            path,
            id,
            mode,
            stage,
            stat,
            flags: EntryFlags {
                assume_valid,
                intent_to_add,
                skip_worktree,
            },
        },
        cursor,
    ))
}

/// v4 path: a varint count of bytes to strip from the previous path, then
/// the NUL-terminated suffix. No padding.
fn parse_v4_path(
    data: &[u8],
    cursor: &mut usize,
    prev_path: &BString,
    content_end: usize,
    entry_start: usize,
) -> Result<BString, IndexError> {
    let (strip, used) = vault_util::varint::read_size_varint(&data[*cursor..content_end])
        .map_err(|_| IndexError::InvalidEntry {
            offset: entry_start,
            reason: "truncated v4 prefix length".into(),
        })?;
    *cursor += used;

    let nul = data[*cursor..content_end]
        .find_byte(0)
        .ok_or_else(|| IndexError::InvalidEntry {
            offset: entry_start,
            reason: "unterminated v4 path suffix".into(),
        })?;
    let suffix = &data[*cursor..*cursor + nul];
    *cursor += nul + 1;

    let keep = prev_path.len().saturating_sub(strip as usize);
    let mut path = BString::from(&prev_path[..keep]);
    path.extend_from_slice(suffix);
    Ok(path)
}

fn verify_checksum(data: &[u8]) -> Result<(), IndexError> {
    let body = &data[..data.len() - HASH_LEN];
    let stored = &data[data.len() - HASH_LEN..];
    let actual = Hasher::digest(body).map_err(|_| IndexError::ChecksumMismatch)?;
    if actual.as_bytes() != stored {
        return Err(IndexError::ChecksumMismatch);
    }
    Ok(())
}

fn read_u32(data: &[u8]) -> u32 {
    u32::from_be_bytes([data[0], data[1], data[2], data[3]])
}

fn read_u16(data: &[u8]) -> u16 {
    u16::from_be_bytes([data[0], data[1]])
}
