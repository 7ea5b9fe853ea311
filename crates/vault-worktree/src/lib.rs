//! Worktree access: walking, hashing, reading and writing files the way
//! checkout needs them.

mod checkout;
mod ignore;

pub use checkout::{checkout_tree, CheckoutOptions, CheckoutResult, CheckoutTarget};
pub use ignore::IgnoreRules;

use std::fs;
use std::path::{Path, PathBuf};

use bstr::{BStr, BString, ByteSlice};
use vault_hash::{hasher::Hasher, ObjectId};
use vault_index::Staging;
use vault_object::FileMode;

/// Errors from worktree operations.
#[derive(Debug, thiserror::Error)]
pub enum WorktreeError {
    #[error("path escapes the worktree: {0}")]
    PathEscapes(BString),

    #[error("refusing to overwrite {0} (overwrite not requested)")]
    WouldOverwrite(BString),

    #[error("not a file: {0}")]
    NotAFile(BString),

    #[error("branch has no commits: {0}")]
    UnbornBranch(String),

    #[error("checkout target not found: {0}")]
    TargetNotFound(ObjectId),

    #[error("io error at {path}: {source}")]
    IoPath {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Hash(#[from] vault_hash::HashError),

    #[error(transparent)]
    Odb(#[from] vault_odb::OdbError),

    #[error(transparent)]
    Ref(#[from] vault_ref::RefError),

    #[error(transparent)]
    Index(#[from] vault_index::IndexError),

    #[error(transparent)]
    History(#[from] vault_history::HistoryError),

    #[error(transparent)]
    Merge(#[from] vault_merge::MergeError),
}

/// One entry seen while walking the worktree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorktreeEntry {
    /// Path relative to the worktree root.
    pub path: BString,
    /// Final path component.
    pub name: BString,
    pub mode: FileMode,
    pub size: u64,
    /// Modification time, seconds since the epoch.
    pub mtime: i64,
    pub is_dir: bool,
    pub is_ignored: bool,
}

/// Options for [`Worktree::write_content`].
#[derive(Debug, Clone, Copy)]
pub struct WriteOptions {
    pub mode: FileMode,
    pub create_parents: bool,
    pub overwrite: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            mode: FileMode::Regular,
            create_parents: true,
            overwrite: true,
        }
    }
}

/// A checked-out working directory next to a git directory.
pub struct Worktree {
    root: PathBuf,
    /// Name of the repository directory to skip while walking.
    git_dir_name: String,
}

impl Worktree {
    pub fn open(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            git_dir_name: ".git".to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path for a repository-relative one; rejects traversal out
    /// of the root.
    pub fn abs_path(&self, rel: &BStr) -> Result<PathBuf, WorktreeError> {
        let rel_str = rel
            .to_str()
            .map_err(|_| WorktreeError::PathEscapes(rel.to_owned()))?;
        let candidate = Path::new(rel_str);
        if candidate.is_absolute()
            || candidate
                .components()
                .any(|c| matches!(c, std::path::Component::ParentDir))
        {
            return Err(WorktreeError::PathEscapes(rel.to_owned()));
        }
        Ok(self.root.join(candidate))
    }

    /// Walk the worktree depth-first in path order. The repository
    /// directory is always skipped; other entries carry an `is_ignored`
    /// verdict from the root `.gitignore`.
    pub fn walk(&self) -> Result<Vec<WorktreeEntry>, WorktreeError> {
        let rules = IgnoreRules::load(&self.root);
        let mut out = Vec::new();
        self.walk_dir(&self.root, &rules, &mut out)?;
        out.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(out)
    }

    fn walk_dir(
        &self,
        dir: &Path,
        rules: &IgnoreRules,
        out: &mut Vec<WorktreeEntry>,
    ) -> Result<(), WorktreeError> {
        let entries = match fs::read_dir(dir) {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => {
                return Err(WorktreeError::IoPath {
                    path: dir.to_path_buf(),
                    source: e,
                })
            }
        };

        for entry in entries {
            let entry = entry?;
            let name = entry.file_name();
            if name.to_str() == Some(self.git_dir_name.as_str()) {
                continue;
            }
            let abs = entry.path();
            let rel = abs
                .strip_prefix(&self.root)
                .expect("walked path under root");
            let Some(rel_str) = rel.to_str() else {
                continue;
            };

            let meta = fs::symlink_metadata(&abs)?;
            let is_dir = meta.is_dir();
            let is_ignored = rules.matches(rel_str, is_dir);

            let mode = if meta.file_type().is_symlink() {
                FileMode::Symlink
            } else if is_dir {
                FileMode::Tree
            } else if is_executable(&meta) {
                FileMode::Executable
            } else {
                FileMode::Regular
            };

            out.push(WorktreeEntry {
                path: BString::from(rel_str),
                name: BString::from(name.to_string_lossy().as_bytes()),
                mode,
                size: meta.len(),
                mtime: mtime_secs(&meta),
                is_dir,
                is_ignored,
            });

            if is_dir && !is_ignored {
                self.walk_dir(&abs, rules, out)?;
            }
        }
        Ok(())
    }

    /// Stat one path, or `None` when absent.
    pub fn get_entry(&self, rel: &BStr) -> Result<Option<WorktreeEntry>, WorktreeError> {
        let abs = self.abs_path(rel)?;
        let meta = match fs::symlink_metadata(&abs) {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(WorktreeError::IoPath { path: abs, source: e }),
        };

        let name = rel
            .rfind_byte(b'/')
            .map(|pos| &rel[pos + 1..])
            .unwrap_or(rel);
        let is_dir = meta.is_dir();
        let mode = if meta.file_type().is_symlink() {
            FileMode::Symlink
        } else if is_dir {
            FileMode::Tree
        } else if is_executable(&meta) {
            FileMode::Executable
        } else {
            FileMode::Regular
        };

        Ok(Some(WorktreeEntry {
            path: rel.to_owned(),
            name: BStr::new(name).to_owned(),
            mode,
            size: meta.len(),
            mtime: mtime_secs(&meta),
            is_dir,
            is_ignored: IgnoreRules::load(&self.root).matches(
                rel.to_str().unwrap_or_default(),
                is_dir,
            ),
        }))
    }

    /// Git-compatible blob hash of the current content at `rel`; `None`
    /// when absent. Symlinks hash their target path.
    pub fn compute_hash(&self, rel: &BStr) -> Result<Option<ObjectId>, WorktreeError> {
        let Some(content) = self.read_content(rel)? else {
            return Ok(None);
        };
        Ok(Some(Hasher::hash_object("blob", &content)?))
    }

    /// Read file content; symlinks yield their target path bytes.
    pub fn read_content(&self, rel: &BStr) -> Result<Option<Vec<u8>>, WorktreeError> {
        let abs = self.abs_path(rel)?;
        let meta = match fs::symlink_metadata(&abs) {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(WorktreeError::IoPath { path: abs, source: e }),
        };

        if meta.file_type().is_symlink() {
            let target = fs::read_link(&abs)?;
            return Ok(Some(target.to_string_lossy().into_owned().into_bytes()));
        }
        if meta.is_dir() {
            return Err(WorktreeError::NotAFile(rel.to_owned()));
        }
        Ok(Some(fs::read(&abs)?))
    }

    /// Write file content with the requested mode.
    pub fn write_content(
        &self,
        rel: &BStr,
        content: &[u8],
        opts: &WriteOptions,
    ) -> Result<(), WorktreeError> {
        let abs = self.abs_path(rel)?;

        if !opts.overwrite && abs.exists() {
            return Err(WorktreeError::WouldOverwrite(rel.to_owned()));
        }
        if let Some(parent) = abs.parent() {
            if opts.create_parents {
                fs::create_dir_all(parent)?;
            }
        }

        match opts.mode {
            FileMode::Symlink => {
                if abs.exists() || fs::symlink_metadata(&abs).is_ok() {
                    fs::remove_file(&abs)?;
                }
                #[cfg(unix)]
                {
                    let target = String::from_utf8_lossy(content).into_owned();
                    std::os::unix::fs::symlink(target, &abs)?;
                }
                #[cfg(not(unix))]
                {
                    fs::write(&abs, content)?;
                }
            }
            FileMode::Gitlink => {
                fs::create_dir_all(&abs)?;
            }
            _ => {
                // A symlink at the target would redirect the write.
                if fs::symlink_metadata(&abs)
                    .map(|m| m.file_type().is_symlink())
                    .unwrap_or(false)
                {
                    fs::remove_file(&abs)?;
                }
                fs::write(&abs, content)?;
                #[cfg(unix)]
                {
                    use std::os::unix::fs::PermissionsExt;
                    let bits = if opts.mode == FileMode::Executable {
                        0o755
                    } else {
                        0o644
                    };
                    fs::set_permissions(&abs, fs::Permissions::from_mode(bits))?;
                }
            }
        }
        Ok(())
    }

    /// Remove a path. Directories need `recursive`. Empty parent
    /// directories are cleaned up opportunistically.
    pub fn remove(&self, rel: &BStr, recursive: bool) -> Result<bool, WorktreeError> {
        let abs = self.abs_path(rel)?;
        let meta = match fs::symlink_metadata(&abs) {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(WorktreeError::IoPath { path: abs, source: e }),
        };

        if meta.is_dir() {
            if recursive {
                fs::remove_dir_all(&abs)?;
            } else {
                fs::remove_dir(&abs)?;
            }
        } else {
            fs::remove_file(&abs)?;
        }

        let mut dir = abs.parent().map(Path::to_path_buf);
        while let Some(d) = dir {
            if d == self.root {
                break;
            }
            if d.read_dir().map(|mut e| e.next().is_none()).unwrap_or(false) {
                let _ = fs::remove_dir(&d);
                dir = d.parent().map(Path::to_path_buf);
            } else {
                break;
            }
        }
        Ok(true)
    }

    pub fn mkdir(&self, rel: &BStr) -> Result<(), WorktreeError> {
        let abs = self.abs_path(rel)?;
        Ok(fs::create_dir_all(abs)?)
    }

    pub fn rename(&self, from: &BStr, to: &BStr) -> Result<(), WorktreeError> {
        let from_abs = self.abs_path(from)?;
        let to_abs = self.abs_path(to)?;
        if let Some(parent) = to_abs.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(fs::rename(from_abs, to_abs)?)
    }

    /// Paths whose worktree content no longer matches the staging entry,
    /// plus staged paths missing from disk.
    pub fn dirty_paths(&self, staging: &Staging) -> Result<Vec<BString>, WorktreeError> {
        let mut dirty = Vec::new();
        for entry in staging.entries() {
            if entry.stage != vault_index::Stage::Normal {
                continue;
            }
            match self.compute_hash(entry.path.as_bstr())? {
                Some(hash) if hash == entry.id => {}
                _ => dirty.push(entry.path.clone()),
            }
        }
        Ok(dirty)
    }
}

fn is_executable(meta: &fs::Metadata) -> bool {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        meta.permissions().mode() & 0o111 != 0 && meta.is_file()
    }
    #[cfg(not(unix))]
    {
        let _ = meta;
        false
    }
}

fn mtime_secs(meta: &fs::Metadata) -> i64 {
    meta.modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
