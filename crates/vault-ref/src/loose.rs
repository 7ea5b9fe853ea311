//! Loose ref files: one file per ref under the git directory.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use bstr::ByteSlice;
use vault_hash::ObjectId;
use vault_util::lockfile::LockFile;

use crate::{RefError, RefName, Reference};

/// Read a loose ref. The content is either `<hex>\n` or `ref: <target>\n`.
pub(crate) fn read_loose(git_dir: &Path, name: &RefName) -> Result<Option<Reference>, RefError> {
    let path = loose_path(git_dir, name);
    let contents = match fs::read(&path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(RefError::IoPath { path, source: e }),
    };

    let trimmed = contents.trim();
    if let Some(target_bytes) = trimmed.strip_prefix(b"ref: ") {
        let target_str = std::str::from_utf8(target_bytes.trim())
            .map_err(|_| RefError::Parse("non-UTF-8 symbolic target".into()))?;
        Ok(Some(Reference::Symbolic {
            name: name.clone(),
            target: RefName::new(target_str)?,
        }))
    } else {
        let hex = std::str::from_utf8(trimmed)
            .map_err(|_| RefError::Parse("non-UTF-8 ref content".into()))?;
        Ok(Some(Reference::Direct {
            name: name.clone(),
            id: ObjectId::from_hex(hex)?,
        }))
    }
}

/// Write a direct ref atomically.
pub(crate) fn write_loose(git_dir: &Path, name: &RefName, id: &ObjectId) -> Result<(), RefError> {
    write_loose_content(git_dir, name, format!("{}\n", id.to_hex()).as_bytes())
}

/// Write a symbolic ref atomically.
pub(crate) fn write_symbolic(
    git_dir: &Path,
    name: &RefName,
    target: &RefName,
) -> Result<(), RefError> {
    write_loose_content(git_dir, name, format!("ref: {target}\n").as_bytes())
}

fn write_loose_content(git_dir: &Path, name: &RefName, content: &[u8]) -> Result<(), RefError> {
    let path = loose_path(git_dir, name);
    check_dir_file_conflict(git_dir, name)?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| RefError::IoPath {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }

    let mut lock = LockFile::acquire(&path)?;
    lock.write_all(content).map_err(|e| RefError::IoPath {
        path: path.clone(),
        source: e,
    })?;
    lock.commit()?;
    Ok(())
}

/// Delete a loose ref file; empty parent directories under `refs/` are
/// cleaned up opportunistically.
pub(crate) fn delete_loose(git_dir: &Path, name: &RefName) -> Result<bool, RefError> {
    let path = loose_path(git_dir, name);
    match fs::remove_file(&path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(RefError::IoPath { path, source: e }),
    }

    let refs_dir = git_dir.join("refs");
    let mut dir = path.parent().map(Path::to_path_buf);
    while let Some(d) = dir {
        if d == refs_dir || d == *git_dir {
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

/// Refuse a ref whose path collides with an existing file or directory,
/// e.g. `refs/heads/a/b` when `refs/heads/a` is already a ref.
fn check_dir_file_conflict(git_dir: &Path, name: &RefName) -> Result<(), RefError> {
    let ref_path = loose_path(git_dir, name);

    let mut current = git_dir.to_path_buf();
    for component in name.as_str().split('/') {
        current = current.join(component);
        if current == ref_path {
            break;
        }
        if current.is_file() {
            return Err(RefError::DirectoryConflict {
                name: name.to_string(),
                conflict: current
                    .strip_prefix(git_dir)
                    .unwrap_or(&current)
                    .display()
                    .to_string(),
            });
        }
    }

    if ref_path.is_dir() {
        return Err(RefError::DirectoryConflict {
            name: name.to_string(),
            conflict: format!("{} (is a directory)", name),
        });
    }
    Ok(())
}

/// All loose refs under `prefix` (or all of `refs/` plus `HEAD`-style refs
/// when `prefix` is `None`), sorted by name.
pub(crate) fn enumerate_loose(
    git_dir: &Path,
    prefix: Option<&str>,
) -> Result<Vec<RefName>, RefError> {
    let refs_base = git_dir.join("refs");
    let mut result = Vec::new();

    if refs_base.is_dir() {
        collect_recursive(git_dir, &refs_base, prefix, &mut result)?;
    }

    if prefix.is_none() {
        for special in ["HEAD", "MERGE_HEAD", "CHERRY_PICK_HEAD", "ORIG_HEAD", "FETCH_HEAD"] {
            if git_dir.join(special).is_file() {
                if let Ok(name) = RefName::new(special) {
                    result.push(name);
                }
            }
        }
    }

    result.sort();
    Ok(result)
}

fn collect_recursive(
    git_dir: &Path,
    dir: &Path,
    prefix: Option<&str>,
    result: &mut Vec<RefName>,
) -> Result<(), RefError> {
    let entries = match fs::read_dir(dir) {
        Ok(e) => e,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => {
            return Err(RefError::IoPath {
                path: dir.to_path_buf(),
                source: e,
            })
        }
    };

    for entry in entries {
        let entry = entry.map_err(|e| RefError::IoPath {
            path: dir.to_path_buf(),
            source: e,
        })?;
        let path = entry.path();

        if path.is_dir() {
            collect_recursive(git_dir, &path, prefix, result)?;
        } else if path.is_file() {
            let rel = path
                .strip_prefix(git_dir)
                .map_err(|_| RefError::Parse("ref path outside the git directory".into()))?;
            let Some(name_str) = rel.to_str() else {
                continue;
            };
            if name_str.ends_with(".lock") {
                continue;
            }
            let Ok(name) = RefName::new(name_str) else {
                continue;
            };
            if let Some(p) = prefix {
                if !name.as_str().starts_with(p) {
                    continue;
                }
            }
            result.push(name);
        }
    }
    Ok(())
}

pub(crate) fn loose_path(git_dir: &Path, name: &RefName) -> PathBuf {
    git_dir.join(name.as_str())
}
