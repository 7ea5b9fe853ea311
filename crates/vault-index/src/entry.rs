//! Staging entry types.

use bstr::BString;
use vault_hash::ObjectId;
use vault_object::FileMode;

use crate::Stage;

/// One staged path at one stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagingEntry {
    /// Path relative to the worktree root.
    pub path: BString,
    /// Blob (or gitlink) ID.
    pub id: ObjectId,
    /// File mode.
    pub mode: FileMode,
    /// Merge stage.
    pub stage: Stage,
    /// Cached filesystem metadata.
    pub stat: StatData,
    /// Entry flags.
    pub flags: EntryFlags,
}

impl StagingEntry {
    /// A minimal stage-0 entry with empty stat data.
    pub fn new(path: impl Into<BString>, id: ObjectId, mode: FileMode) -> Self {
        Self {
            path: path.into(),
            id,
            mode,
            stage: Stage::Normal,
            stat: StatData::default(),
            flags: EntryFlags::default(),
        }
    }

    /// The same entry at a different stage.
    pub fn at_stage(mut self, stage: Stage) -> Self {
        self.stage = stage;
        self
    }
}

/// Filesystem metadata cached per entry for change detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatData {
    pub ctime_secs: u32,
    pub ctime_nsecs: u32,
    pub mtime_secs: u32,
    pub mtime_nsecs: u32,
    pub dev: u32,
    pub ino: u32,
    pub uid: u32,
    pub gid: u32,
    pub size: u32,
}

impl StatData {
    #[cfg(unix)]
    pub fn from_metadata(meta: &std::fs::Metadata) -> Self {
        use std::os::unix::fs::MetadataExt;
        Self {
            ctime_secs: meta.ctime() as u32,
            ctime_nsecs: meta.ctime_nsec() as u32,
            mtime_secs: meta.mtime() as u32,
            mtime_nsecs: meta.mtime_nsec() as u32,
            dev: meta.dev() as u32,
            ino: meta.ino() as u32,
            uid: meta.uid(),
            gid: meta.gid(),
            size: meta.len() as u32,
        }
    }

    #[cfg(not(unix))]
    pub fn from_metadata(meta: &std::fs::Metadata) -> Self {
        use std::time::UNIX_EPOCH;
        let mtime = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .unwrap_or_default();
        Self {
            ctime_secs: mtime.as_secs() as u32,
            ctime_nsecs: mtime.subsec_nanos(),
            mtime_secs: mtime.as_secs() as u32,
            mtime_nsecs: mtime.subsec_nanos(),
            dev: 0,
            ino: 0,
            uid: 0,
            gid: 0,
            size: meta.len() as u32,
        }
    }

    /// Whether the cached data still matches the filesystem. Zero fields
    /// are treated as unknown rather than as mismatches.
    pub fn matches(&self, meta: &std::fs::Metadata) -> bool {
        let other = Self::from_metadata(meta);

        if self.size != other.size {
            return false;
        }
        if self.mtime_secs != other.mtime_secs || self.mtime_nsecs != other.mtime_nsecs {
            return false;
        }
        if self.ino != 0 && other.ino != 0 && self.ino != other.ino {
            return false;
        }
        if self.dev != 0 && other.dev != 0 && self.dev != other.dev {
            return false;
        }
        true
    }
}

/// Per-entry flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EntryFlags {
    /// Assume-unchanged: skip stat comparison.
    pub assume_valid: bool,
    /// Placeholder from `add -N`; requires index v3+.
    pub intent_to_add: bool,
    /// Sparse-checkout skip marker; requires index v3+.
    pub skip_worktree: bool,
}

impl EntryFlags {
    /// Whether any flag needs the extended (v3+) on-disk form.
    pub fn needs_extended(&self) -> bool {
        self.intent_to_add || self.skip_worktree
    }
}
