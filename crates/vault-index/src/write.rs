//! Index file serialization (versions 2, 3, 4).

use std::io::Write;
use std::path::Path;

use vault_hash::hasher::Hasher;
use vault_util::lockfile::LockFile;
use vault_util::varint::write_size_varint;

use crate::entry::StagingEntry;
use crate::extensions::{CacheTree, ResolveUndo};
use crate::{IndexError, Staging};

const INDEX_SIGNATURE: &[u8; 4] = b"DIRC";

/// Write the staging area atomically through a lock file.
pub fn write_index(staging: &Staging, path: &Path) -> Result<(), IndexError> {
    let mut lock = LockFile::acquire(path).map_err(|_| IndexError::LockFailed {
        path: path.to_path_buf(),
    })?;

    let data = serialize_index(staging)?;
    lock.write_all(&data)?;
    lock.commit().map_err(|_| IndexError::LockFailed {
        path: path.to_path_buf(),
    })?;
    Ok(())
}

/// Serialize to the staging area's configured format version.
pub fn serialize_index(staging: &Staging) -> Result<Vec<u8>, IndexError> {
    // Extended flags cannot be represented in v2.
    let version = if staging.version() == 2
        && staging.entries().iter().any(|e| e.flags.needs_extended())
    {
        3
    } else {
        staging.version()
    };

    let mut buf = Vec::new();
    buf.extend_from_slice(INDEX_SIGNATURE);
    buf.extend_from_slice(&version.to_be_bytes());
    buf.extend_from_slice(&(staging.len() as u32).to_be_bytes());

    let mut prev_path: &[u8] = b"";
    for entry in staging.entries() {
        write_entry(&mut buf, entry, version, prev_path);
        prev_path = &entry.path;
    }

    if let Some(tree) = staging.cache_tree() {
        write_extension(&mut buf, CacheTree::SIGNATURE, &tree.serialize());
    }
    if let Some(reuc) = staging.resolve_undo() {
        write_extension(&mut buf, ResolveUndo::SIGNATURE, &reuc.serialize());
    }
    for ext in staging.unknown_extensions() {
        write_extension(&mut buf, &ext.signature, &ext.data);
    }

    let checksum =
        Hasher::digest(&buf).map_err(|_| IndexError::InvalidHeader("checksum failed".into()))?;
    buf.extend_from_slice(checksum.as_bytes());
    Ok(buf)
}

fn write_extension(buf: &mut Vec<u8>, signature: &[u8; 4], data: &[u8]) {
    buf.extend_from_slice(signature);
    buf.extend_from_slice(&(data.len() as u32).to_be_bytes());
    buf.extend_from_slice(data);
}

fn write_entry(buf: &mut Vec<u8>, entry: &StagingEntry, version: u32, prev_path: &[u8]) {
    let entry_start = buf.len();
    let extended = version >= 3 && entry.flags.needs_extended();

    buf.extend_from_slice(&entry.stat.ctime_secs.to_be_bytes());
    buf.extend_from_slice(&entry.stat.ctime_nsecs.to_be_bytes());
    buf.extend_from_slice(&entry.stat.mtime_secs.to_be_bytes());
    buf.extend_from_slice(&entry.stat.mtime_nsecs.to_be_bytes());
    buf.extend_from_slice(&entry.stat.dev.to_be_bytes());
    buf.extend_from_slice(&entry.stat.ino.to_be_bytes());
    buf.extend_from_slice(&entry.mode.raw().to_be_bytes());
    buf.extend_from_slice(&entry.stat.uid.to_be_bytes());
    buf.extend_from_slice(&entry.stat.gid.to_be_bytes());
    buf.extend_from_slice(&entry.stat.size.to_be_bytes());
    buf.extend_from_slice(entry.id.as_bytes());

    let name_len = entry.path.len().min(0xfff) as u16;
    let mut flags: u16 = name_len;
    flags |= u16::from(entry.stage.as_u8()) << 12;
    if entry.flags.assume_valid {
        flags |= 0x8000;
    }
    if extended {
        flags |= 0x4000;
    }
    buf.extend_from_slice(&flags.to_be_bytes());

    if extended {
        let mut ext_flags: u16 = 0;
        if entry.flags.intent_to_add {
            ext_flags |= 0x2000;
        }
        if entry.flags.skip_worktree {
            ext_flags |= 0x4000;
        }
        buf.extend_from_slice(&ext_flags.to_be_bytes());
    }

    if version == 4 {
        // Prefix-compressed: strip count from the previous path, then the
        // NUL-terminated suffix. No padding.
        let common = entry
            .path
            .iter()
            .zip(prev_path.iter())
            .take_while(|(a, b)| a == b)
            .count();
        let strip = prev_path.len() - common;
        buf.extend_from_slice(&write_size_varint(strip as u64));
        buf.extend_from_slice(&entry.path[common..]);
        buf.push(0);
    } else {
        buf.extend_from_slice(&entry.path);
        // NUL padding to the 8-byte-aligned entry size.
        let flags_len = if extended { 4 } else { 2 };
        let total = (40 + 20 + flags_len + entry.path.len() + 8) & !7;
        let written = buf.len() - entry_start;
        buf.resize(entry_start + total.max(written), 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::EntryFlags;
    use crate::{Stage, StagingBuilder};
    use bstr::BStr;
    use vault_hash::ObjectId;
    use vault_object::FileMode;

    fn oid(n: u8) -> ObjectId {
        let mut bytes = [0u8; 20];
        bytes[0] = n;
        ObjectId::from(bytes)
    }

    fn entry(path: &str) -> StagingEntry {
        StagingEntry::new(path, oid(1), FileMode::Regular)
    }

    fn staging_with(entries: Vec<StagingEntry>, version: u32) -> Staging {
        let mut staging = Staging::new();
        let mut builder = StagingBuilder::new();
        for e in entries {
            builder.add(e);
        }
        builder.finish(&mut staging).unwrap();
        staging.set_version(version).unwrap();
        staging
    }

    fn roundtrip(staging: &Staging) -> Staging {
        let bytes = serialize_index(staging).unwrap();
        crate::read::parse_index(&bytes).unwrap()
    }

    #[test]
    fn v2_roundtrip() {
        let staging = staging_with(
            vec![entry("a.txt"), entry("dir/b.txt"), entry("dir/sub/c.txt")],
            2,
        );
        let restored = roundtrip(&staging);
        assert_eq!(restored.version(), 2);
        assert_eq!(restored.entries(), staging.entries());
    }

    #[test]
    fn v3_roundtrip_with_extended_flags() {
        let mut ita = entry("pending.txt");
        ita.flags = EntryFlags {
            intent_to_add: true,
            ..Default::default()
        };
        let staging = staging_with(vec![entry("a.txt"), ita], 3);
        let restored = roundtrip(&staging);
        assert_eq!(restored.version(), 3);
        assert_eq!(restored.entries(), staging.entries());
        assert!(restored.entries()[1].flags.intent_to_add);
    }

    #[test]
    fn v2_auto_upgrades_for_extended_flags() {
        let mut skip = entry("sparse.txt");
        skip.flags = EntryFlags {
            skip_worktree: true,
            ..Default::default()
        };
        let staging = staging_with(vec![skip], 2);
        let restored = roundtrip(&staging);
        assert_eq!(restored.version(), 3);
        assert!(restored.entries()[0].flags.skip_worktree);
    }

    #[test]
    fn v4_roundtrip_prefix_compression() {
        let staging = staging_with(
            vec![
                entry("src/alpha.rs"),
                entry("src/beta.rs"),
                entry("src/nested/gamma.rs"),
                entry("zeta.txt"),
            ],
            4,
        );
        let bytes = serialize_index(&staging).unwrap();
        let restored = crate::read::parse_index(&bytes).unwrap();
        assert_eq!(restored.version(), 4);
        assert_eq!(restored.entries(), staging.entries());

        // v4 must be denser than v2 for shared prefixes.
        let mut v2 = staging_with(
            vec![
                entry("src/alpha.rs"),
                entry("src/beta.rs"),
                entry("src/nested/gamma.rs"),
                entry("zeta.txt"),
            ],
            2,
        );
        v2.set_version(2).unwrap();
        assert!(bytes.len() < serialize_index(&v2).unwrap().len());
    }

    #[test]
    fn conflict_stages_roundtrip() {
        let staging = staging_with(
            vec![
                entry("f.txt").at_stage(Stage::Base),
                entry("f.txt").at_stage(Stage::Ours),
                entry("f.txt").at_stage(Stage::Theirs),
            ],
            2,
        );
        let restored = roundtrip(&staging);
        assert!(restored.has_conflicts());
        assert_eq!(restored.conflict_paths(), vec![BStr::new("f.txt")]);
        let stages: Vec<u8> = restored
            .entries_for(BStr::new("f.txt"))
            .iter()
            .map(|e| e.stage.as_u8())
            .collect();
        assert_eq!(stages, vec![1, 2, 3]);
    }

    #[test]
    fn checksum_is_verified_on_read() {
        let staging = staging_with(vec![entry("a.txt")], 2);
        let mut bytes = serialize_index(&staging).unwrap();
        bytes[20] ^= 0xff;
        assert!(matches!(
            crate::read::parse_index(&bytes),
            Err(IndexError::ChecksumMismatch)
        ));
    }

    #[test]
    fn unknown_optional_extension_roundtrips() {
        let mut staging = staging_with(vec![entry("a.txt")], 2);
        staging.set_state(
            2,
            staging.entries().to_vec(),
            None,
            None,
            vec![crate::RawExtension {
                signature: *b"link",
                data: b"opaque payload".to_vec(),
            }],
        );

        let restored = roundtrip(&staging);
        assert_eq!(restored.unknown_extensions().len(), 1);
        assert_eq!(restored.unknown_extensions()[0].data, b"opaque payload");

        // And it survives a second pass byte-for-byte.
        let once = serialize_index(&staging).unwrap();
        let twice = serialize_index(&restored).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn unknown_mandatory_extension_fails() {
        let mut staging = staging_with(vec![entry("a.txt")], 2);
        staging.set_state(
            2,
            staging.entries().to_vec(),
            None,
            None,
            vec![crate::RawExtension {
                signature: *b"MUST",
                data: vec![1, 2, 3],
            }],
        );
        let bytes = serialize_index(&staging).unwrap();
        assert!(matches!(
            crate::read::parse_index(&bytes),
            Err(IndexError::MandatoryExtension(_))
        ));
    }

    #[test]
    fn write_to_disk_with_lock() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index");
        let staging = staging_with(vec![entry("a.txt")], 2);

        staging.write_to(&path).unwrap();
        assert!(!dir.path().join("index.lock").exists());

        let restored = Staging::read_from(&path).unwrap();
        assert_eq!(restored.entries(), staging.entries());
    }
}
