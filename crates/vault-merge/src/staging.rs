//! Writing a merge result into the staging area.

use vault_index::{Stage, StagingEditor, StagingEntry};

use crate::{MergeError, TreeMergeResult};

/// Stage a merge result: merged paths land at stage 0, each conflict
/// stores its existing sides at stages 1 (base), 2 (ours), 3 (theirs).
pub fn stage_result(
    staging: &mut vault_index::Staging,
    result: &TreeMergeResult,
) -> Result<(), MergeError> {
    let mut editor = StagingEditor::new();

    for merged in &result.merged {
        editor.upsert(StagingEntry::new(
            merged.path.clone(),
            merged.entry.id,
            merged.entry.mode,
        ));
    }

    for conflict in &result.conflicts {
        // A pre-merge stage-0 entry must not survive next to the stages.
        editor.remove(conflict.path.clone(), Stage::Normal);
        for (side, stage) in [
            (&conflict.base, Stage::Base),
            (&conflict.ours, Stage::Ours),
            (&conflict.theirs, Stage::Theirs),
        ] {
            if let Some(entry) = side {
                editor.upsert(
                    StagingEntry::new(conflict.path.clone(), entry.id, entry.mode)
                        .at_stage(stage),
                );
            }
        }
    }

    editor.apply(staging)?;
    Ok(())
}
