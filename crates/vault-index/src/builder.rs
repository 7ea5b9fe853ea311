//! Bulk staging replacement.
//!
//! The builder accumulates entries in any order; `finish` sorts them,
//! rejects duplicates and stage violations, then swaps the staging store
//! wholesale.

use bstr::{BStr, BString, ByteSlice, ByteVec};
use vault_hash::ObjectId;
use vault_odb::Trees;

use crate::entry::StagingEntry;
use crate::{cmp_entries, validate_entries, IndexError, Stage, Staging};

#[derive(Default)]
pub struct StagingBuilder {
    entries: Vec<StagingEntry>,
}

impl StagingBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one entry.
    pub fn add(&mut self, entry: StagingEntry) -> &mut Self {
        self.entries.push(entry);
        self
    }

    /// Recursively expand a stored tree into entries at `stage`, with all
    /// paths prefixed by `prefix`.
    pub fn add_tree(
        &mut self,
        trees: &Trees,
        tree_id: &ObjectId,
        prefix: &BStr,
        stage: Stage,
    ) -> Result<&mut Self, IndexError> {
        let tree = trees
            .load(tree_id)?
            .ok_or(IndexError::TreeNotFound(*tree_id))?;

        for entry in tree.iter() {
            let mut path: BString = prefix.to_owned();
            if !path.is_empty() {
                path.push_byte(b'/');
            }
            path.push_str(&entry.name);

            if entry.mode.is_tree() {
                self.add_tree(trees, &entry.id, path.as_bstr(), stage)?;
            } else {
                self.entries.push(
                    StagingEntry::new(path, entry.id, entry.mode).at_stage(stage),
                );
            }
        }
        Ok(self)
    }

    /// Number of entries accumulated so far.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sort, validate, and atomically replace the staging contents.
    pub fn finish(mut self, staging: &mut Staging) -> Result<(), IndexError> {
        self.entries.sort_by(cmp_entries);
        validate_entries(&self.entries)?;
        staging.replace_entries(self.entries);
        Ok(())
    }
}
