//! Tree flattening: recursive expansion to full paths.

use std::collections::BTreeMap;

use bstr::{BString, ByteVec};
use vault_hash::ObjectId;
use vault_object::FileMode;
use vault_odb::Trees;

use crate::MergeError;

/// One flattened tree entry: what sits at a path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlatEntry {
    pub id: ObjectId,
    pub mode: FileMode,
}

/// Expand a tree to `full path -> entry`, recursing through subtrees.
pub fn flatten_tree(
    trees: &Trees,
    tree_id: &ObjectId,
) -> Result<BTreeMap<BString, FlatEntry>, MergeError> {
    let mut out = BTreeMap::new();
    flatten_into(trees, tree_id, b"", &mut out)?;
    Ok(out)
}

fn flatten_into(
    trees: &Trees,
    tree_id: &ObjectId,
    prefix: &[u8],
    out: &mut BTreeMap<BString, FlatEntry>,
) -> Result<(), MergeError> {
    let tree = trees
        .load(tree_id)?
        .ok_or(MergeError::TreeNotFound(*tree_id))?;

    for entry in tree.iter() {
        let mut path = BString::from(prefix);
        if !path.is_empty() {
            path.push_byte(b'/');
        }
        path.push_str(&entry.name);

        if entry.mode.is_tree() {
            flatten_into(trees, &entry.id, &path, out)?;
        } else {
            out.insert(
                path,
                FlatEntry {
                    id: entry.id,
                    mode: entry.mode,
                },
            );
        }
    }
    Ok(())
}
