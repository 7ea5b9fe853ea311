//! File-backed store using git's loose object layout.
//!
//! Values live at `<root>/xx/yyyy…` (the key's hex split after two chars),
//! zlib-compressed. Writes go to a temp file in the root and are renamed
//! into place, so concurrent readers never see partial values and racing
//! writers of the same key are harmless.

use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use vault_hash::ObjectId;

use crate::{RawError, RawStore};

pub struct FilesStore {
    root: PathBuf,
    compression: Compression,
}

impl FilesStore {
    /// Open a store rooted at `root`. The directory is created lazily on
    /// first write.
    pub fn open(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            compression: Compression::default(),
        }
    }

    /// Set the zlib level (0-9) for subsequent writes.
    pub fn set_compression_level(&mut self, level: u32) {
        self.compression = Compression::new(level);
    }

    /// The on-disk path for a key.
    pub fn value_path(&self, id: &ObjectId) -> PathBuf {
        self.root.join(id.loose_path())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Size of the stored (compressed) file, or `None` when absent.
    pub fn compressed_size(&self, id: &ObjectId) -> Option<u64> {
        fs::metadata(self.value_path(id)).ok().map(|m| m.len())
    }

    fn write_temp(&self, bytes: &[u8]) -> Result<PathBuf, RawError> {
        fs::create_dir_all(&self.root)?;
        let tmp_path = self.root.join(format!(
            "tmp_val_{}_{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .subsec_nanos()
        ));

        let file = fs::File::create(&tmp_path)?;
        let mut encoder = ZlibEncoder::new(file, self.compression);
        encoder.write_all(bytes)?;
        let file = encoder.finish()?;
        file.sync_all()?;

        // Finalized values are read-only, matching the loose object layout.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&tmp_path, fs::Permissions::from_mode(0o444))?;
        }

        Ok(tmp_path)
    }
}

impl RawStore for FilesStore {
    fn store(&self, id: &ObjectId, bytes: &[u8]) -> Result<(), RawError> {
        if self.has(id) {
            return Ok(());
        }

        let final_path = self.value_path(id);
        if let Some(parent) = final_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let tmp_path = self.write_temp(bytes)?;
        match fs::rename(&tmp_path, &final_path) {
            Ok(()) => Ok(()),
            Err(_) if final_path.exists() => {
                // Another writer landed the same content first.
                let _ = fs::remove_file(&tmp_path);
                Ok(())
            }
            Err(e) => {
                let _ = fs::remove_file(&tmp_path);
                Err(RawError::IoFor { id: *id, source: e })
            }
        }
    }

    fn load(&self, id: &ObjectId) -> Result<Option<Vec<u8>>, RawError> {
        let compressed = match fs::read(self.value_path(id)) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(RawError::IoFor { id: *id, source: e }),
        };

        let mut out = Vec::new();
        ZlibDecoder::new(&compressed[..])
            .read_to_end(&mut out)
            .map_err(|e| RawError::Corrupt {
                id: *id,
                reason: format!("zlib: {e}"),
            })?;
        Ok(Some(out))
    }

    fn load_stream(&self, id: &ObjectId) -> Result<Option<Box<dyn Read + '_>>, RawError> {
        let file = match fs::File::open(self.value_path(id)) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(RawError::IoFor { id: *id, source: e }),
        };
        Ok(Some(Box::new(ZlibDecoder::new(file))))
    }

    fn has(&self, id: &ObjectId) -> bool {
        self.value_path(id).is_file()
    }

    fn remove(&self, id: &ObjectId) -> Result<bool, RawError> {
        let path = self.value_path(id);
        match fs::remove_file(&path) {
            Ok(()) => {
                // Drop the fan-out directory once empty; failures here are
                // cosmetic.
                if let Some(parent) = path.parent() {
                    let _ = fs::remove_dir(parent);
                }
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                // Loose values are stored read-only; lift that and retry.
                #[cfg(unix)]
                {
                    use std::os::unix::fs::PermissionsExt;
                    let _ = fs::set_permissions(&path, fs::Permissions::from_mode(0o644));
                }
                fs::remove_file(&path).map_err(|e| RawError::IoFor { id: *id, source: e })?;
                if let Some(parent) = path.parent() {
                    let _ = fs::remove_dir(parent);
                }
                Ok(true)
            }
            Err(e) => Err(RawError::IoFor { id: *id, source: e }),
        }
    }

    fn keys(&self) -> Result<Vec<ObjectId>, RawError> {
        let mut result = Vec::new();
        let entries = match fs::read_dir(&self.root) {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(result),
            Err(e) => return Err(RawError::Io(e)),
        };

        for fanout in entries {
            let fanout = fanout?;
            let dir_name = fanout.file_name();
            let Some(prefix) = dir_name.to_str() else {
                continue;
            };
            if prefix.len() != 2 || !prefix.bytes().all(|b| b.is_ascii_hexdigit()) {
                continue;
            }
            if !fanout.path().is_dir() {
                continue;
            }
            for file in fs::read_dir(fanout.path())? {
                let file = file?;
                let Some(rest) = file.file_name().to_str().map(str::to_owned) else {
                    continue;
                };
                let hex = format!("{prefix}{rest}");
                if let Ok(id) = ObjectId::from_hex(&hex) {
                    result.push(id);
                }
            }
        }

        result.sort();
        Ok(result)
    }
}
