//! Index extensions: TREE (cache tree), REUC (resolve-undo), and raw
//! preservation of everything else.
//!
//! Extension framing is `4-byte signature | u32 length | payload`. A
//! lowercase first signature byte marks the extension optional; unknown
//! optional extensions are carried through writes untouched, unknown
//! mandatory ones fail the read.

use bstr::{BStr, BString, ByteSlice};
use vault_hash::ObjectId;
use vault_object::FileMode;

use crate::IndexError;

/// An extension we do not interpret, preserved byte-for-byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawExtension {
    pub signature: [u8; 4],
    pub data: Vec<u8>,
}

impl RawExtension {
    /// Optional extensions have a lowercase first signature byte.
    pub fn is_optional(&self) -> bool {
        self.signature[0].is_ascii_lowercase()
    }
}

/// Cached tree IDs for fast tree writes (`TREE`).
///
/// Each node covers `entry_count` index entries (-1 = invalidated) and, if
/// valid, carries the tree ID for its span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheTree {
    pub root: CacheTreeNode,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheTreeNode {
    /// Subtree name; empty at the root.
    pub name: BString,
    /// Entries covered, -1 when invalidated.
    pub entry_count: i32,
    /// Tree ID, present only while valid.
    pub id: Option<ObjectId>,
    pub children: Vec<CacheTreeNode>,
}

impl CacheTree {
    pub const SIGNATURE: &'static [u8; 4] = b"TREE";

    pub fn parse(data: &[u8]) -> Result<Self, IndexError> {
        let mut cursor = 0;
        let root = parse_cache_node(data, &mut cursor)?;
        Ok(Self { root })
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        serialize_cache_node(&self.root, &mut buf);
        buf
    }

    /// Tree ID of the root span, when still valid.
    pub fn root_id(&self) -> Option<&ObjectId> {
        (self.root.entry_count >= 0)
            .then_some(self.root.id.as_ref())
            .flatten()
    }

    /// Invalidate the nodes covering `path` and all its ancestors.
    pub fn invalidate(&mut self, path: &BStr) {
        invalidate_node(&mut self.root, path.as_bytes());
    }
}

fn tree_ext_error(reason: impl Into<String>) -> IndexError {
    IndexError::InvalidExtension {
        sig: "TREE".into(),
        reason: reason.into(),
    }
}

fn parse_cache_node(data: &[u8], cursor: &mut usize) -> Result<CacheTreeNode, IndexError> {
    // NUL-terminated name (empty for the root).
    let name_end = data[*cursor..]
        .find_byte(0)
        .ok_or_else(|| tree_ext_error("missing node name terminator"))?
        + *cursor;
    let name = BString::from(&data[*cursor..name_end]);
    *cursor = name_end + 1;

    // ASCII entry count up to a space.
    let count_end = data[*cursor..]
        .find_byte(b' ')
        .ok_or_else(|| tree_ext_error("missing entry count"))?
        + *cursor;
    let entry_count: i32 = std::str::from_utf8(&data[*cursor..count_end])
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| tree_ext_error("invalid entry count"))?;
    *cursor = count_end + 1;

    // ASCII subtree count up to a newline.
    let sub_end = data[*cursor..]
        .find_byte(b'\n')
        .ok_or_else(|| tree_ext_error("missing subtree count"))?
        + *cursor;
    let subtree_count: usize = std::str::from_utf8(&data[*cursor..sub_end])
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| tree_ext_error("invalid subtree count"))?;
    *cursor = sub_end + 1;

    let id = if entry_count >= 0 {
        if *cursor + 20 > data.len() {
            return Err(tree_ext_error("truncated tree id"));
        }
        let id = ObjectId::from_bytes(&data[*cursor..*cursor + 20])
            .map_err(|_| tree_ext_error("invalid tree id"))?;
        *cursor += 20;
        Some(id)
    } else {
        None
    };

    let mut children = Vec::with_capacity(subtree_count);
    for _ in 0..subtree_count {
        children.push(parse_cache_node(data, cursor)?);
    }

    Ok(CacheTreeNode {
        name,
        entry_count,
        id,
        children,
    })
}

fn serialize_cache_node(node: &CacheTreeNode, buf: &mut Vec<u8>) {
    buf.extend_from_slice(&node.name);
    buf.push(0);
    buf.extend_from_slice(node.entry_count.to_string().as_bytes());
    buf.push(b' ');
    buf.extend_from_slice(node.children.len().to_string().as_bytes());
    buf.push(b'\n');
    if node.entry_count >= 0 {
        if let Some(ref id) = node.id {
            buf.extend_from_slice(id.as_bytes());
        }
    }
    for child in &node.children {
        serialize_cache_node(child, buf);
    }
}

fn invalidate_node(node: &mut CacheTreeNode, path: &[u8]) -> bool {
    match path.iter().position(|&b| b == b'/') {
        Some(pos) => {
            let component = &path[..pos];
            let rest = &path[pos + 1..];
            for child in &mut node.children {
                if child.name.as_bytes() == component && invalidate_node(child, rest) {
                    node.entry_count = -1;
                    node.id = None;
                    return true;
                }
            }
            false
        }
        None => {
            node.entry_count = -1;
            node.id = None;
            true
        }
    }
}

/// Resolve-undo extension (`REUC`): the conflict stages that were removed
/// when a path was resolved, kept so the conflict can be recreated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolveUndo {
    pub entries: Vec<ResolveUndoEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveUndoEntry {
    pub path: BString,
    /// Modes for stages 1..=3; `None` where the stage was absent.
    pub modes: [Option<FileMode>; 3],
    /// IDs for stages 1..=3, parallel to `modes`.
    pub ids: [Option<ObjectId>; 3],
}

impl ResolveUndo {
    pub const SIGNATURE: &'static [u8; 4] = b"REUC";

    pub fn parse(data: &[u8]) -> Result<Self, IndexError> {
        let err = |reason: &str| IndexError::InvalidExtension {
            sig: "REUC".into(),
            reason: reason.into(),
        };

        let mut entries = Vec::new();
        let mut cursor = 0;

        while cursor < data.len() {
            let path_end = data[cursor..]
                .find_byte(0)
                .ok_or_else(|| err("missing path terminator"))?
                + cursor;
            let path = BString::from(&data[cursor..path_end]);
            cursor = path_end + 1;

            let mut modes: [Option<FileMode>; 3] = [None, None, None];
            for slot in modes.iter_mut() {
                let mode_end = data[cursor..]
                    .find_byte(0)
                    .ok_or_else(|| err("missing mode terminator"))?
                    + cursor;
                let mode_str = std::str::from_utf8(&data[cursor..mode_end])
                    .map_err(|_| err("non-ASCII mode"))?;
                let raw = u32::from_str_radix(mode_str, 8).map_err(|_| err("invalid mode"))?;
                if raw != 0 {
                    *slot =
                        Some(FileMode::from_raw(raw).ok_or_else(|| err("unknown file mode"))?);
                }
                cursor = mode_end + 1;
            }

            let mut ids: [Option<ObjectId>; 3] = [None, None, None];
            for (slot, mode) in ids.iter_mut().zip(modes.iter()) {
                if mode.is_some() {
                    if cursor + 20 > data.len() {
                        return Err(err("truncated id"));
                    }
                    *slot = Some(
                        ObjectId::from_bytes(&data[cursor..cursor + 20])
                            .map_err(|_| err("invalid id"))?,
                    );
                    cursor += 20;
                }
            }

            entries.push(ResolveUndoEntry { path, modes, ids });
        }

        Ok(Self { entries })
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        for entry in &self.entries {
            buf.extend_from_slice(&entry.path);
            buf.push(0);
            for mode in &entry.modes {
                match mode {
                    Some(m) => buf.extend_from_slice(format!("{:o}", m.raw()).as_bytes()),
                    None => buf.push(b'0'),
                }
                buf.push(0);
            }
            for id in entry.ids.iter().flatten() {
                buf.extend_from_slice(id.as_bytes());
            }
        }
        buf
    }
}
