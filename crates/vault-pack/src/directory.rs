//! Pack directory: the set of `pack-*.pack`/`.idx` pairs under
//! `objects/pack/`, with a bounded LRU of open readers.
//!
//! Lookup order is newest-first (reverse-lexicographic name order). Open
//! readers are shared via `Arc`, so evicting one from the LRU never
//! invalidates a read already in flight; the mmap closes when the last
//! reference drops.

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use lru::LruCache;
use vault_hash::ObjectId;
use vault_object::ObjectType;

use crate::read::PackFile;
use crate::{PackError, PackedObject};

/// Default number of open pack readers.
pub const DEFAULT_READER_CAPACITY: usize = 10;

pub struct PackDirectory {
    dir: PathBuf,
    readers: Mutex<LruCache<String, Arc<PackFile>>>,
}

impl PackDirectory {
    /// Open the directory with the default reader capacity. The directory
    /// may not exist yet; it is created on the first pack install.
    pub fn open(dir: impl AsRef<Path>) -> Self {
        Self::with_capacity(dir, DEFAULT_READER_CAPACITY)
    }

    pub fn with_capacity(dir: impl AsRef<Path>, capacity: usize) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            readers: Mutex::new(LruCache::new(
                NonZeroUsize::new(capacity.max(1)).expect("nonzero capacity"),
            )),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Pack names (`pack-<hex>`) with both `.pack` and `.idx` present,
    /// newest first.
    pub fn scan(&self) -> Result<Vec<String>, PackError> {
        let mut names = Vec::new();
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(names),
            Err(e) => return Err(PackError::Io(e)),
        };

        for entry in entries {
            let entry = entry?;
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "pack") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    if path.with_extension("idx").is_file() {
                        names.push(stem.to_string());
                    }
                }
            }
        }

        names.sort_by(|a, b| b.cmp(a));
        Ok(names)
    }

    /// Open a pack by name, going through the reader LRU.
    pub fn open_pack(&self, name: &str) -> Result<Arc<PackFile>, PackError> {
        let mut readers = self.readers.lock().expect("reader cache lock poisoned");
        if let Some(pack) = readers.get(name) {
            return Ok(Arc::clone(pack));
        }
        drop(readers);

        let pack_path = self.dir.join(format!("{name}.pack"));
        let pack = Arc::new(PackFile::open(&pack_path)?);

        let mut readers = self.readers.lock().expect("reader cache lock poisoned");
        readers.put(name.to_string(), Arc::clone(&pack));
        Ok(pack)
    }

    /// Find the newest pack containing `id`.
    pub fn find_pack(&self, id: &ObjectId) -> Result<Option<Arc<PackFile>>, PackError> {
        for name in self.scan()? {
            match self.open_pack(&name) {
                Ok(pack) if pack.contains(id) => return Ok(Some(pack)),
                Ok(_) => {}
                // A pack that fails to open is skipped; other packs or the
                // loose layer may still satisfy the read.
                Err(_) => continue,
            }
        }
        Ok(None)
    }

    /// Whether any pack contains `id`.
    pub fn has(&self, id: &ObjectId) -> bool {
        matches!(self.find_pack(id), Ok(Some(_)))
    }

    /// Read an object, resolving cross-pack REF_DELTA bases through the
    /// other packs first and then through `fallback` (the loose layer).
    pub fn read_object(
        &self,
        id: &ObjectId,
        fallback: &dyn Fn(&ObjectId) -> Option<(ObjectType, Vec<u8>)>,
    ) -> Result<Option<PackedObject>, PackError> {
        let Some(pack) = self.find_pack(id)? else {
            return Ok(None);
        };
        let resolver = |base_id: &ObjectId| -> Option<(ObjectType, Vec<u8>)> {
            if let Ok(Some(other)) = self.find_pack(base_id) {
                if !Arc::ptr_eq(&other, &pack) {
                    if let Ok(Some(obj)) = other.read_object(base_id) {
                        return Some((obj.obj_type, obj.data));
                    }
                }
            }
            fallback(base_id)
        };
        pack.read_object_with_resolver(id, resolver)
    }

    /// Union of all pack indices, sorted and deduplicated.
    pub fn keys(&self) -> Result<Vec<ObjectId>, PackError> {
        let mut ids = Vec::new();
        for name in self.scan()? {
            let pack = self.open_pack(&name)?;
            ids.extend(pack.index().iter().map(|(id, _)| id));
        }
        ids.sort();
        ids.dedup();
        Ok(ids)
    }

    /// Install a pack from serialized bytes. The `.pack` lands before the
    /// `.idx`, so a reader never sees an index without its pack. Returns
    /// the pack name.
    pub fn add_pack(
        &self,
        pack_bytes: &[u8],
        index_bytes: &[u8],
        checksum: &ObjectId,
    ) -> Result<String, PackError> {
        std::fs::create_dir_all(&self.dir)?;
        let name = format!("pack-{}", checksum.to_hex());

        let pack_path = self.dir.join(format!("{name}.pack"));
        let idx_path = self.dir.join(format!("{name}.idx"));

        let tmp_pack = self.dir.join(format!("{name}.pack.tmp"));
        std::fs::write(&tmp_pack, pack_bytes)?;
        let pack_file = std::fs::File::open(&tmp_pack)?;
        pack_file.sync_all()?;
        std::fs::rename(&tmp_pack, &pack_path)?;

        let tmp_idx = self.dir.join(format!("{name}.idx.tmp"));
        std::fs::write(&tmp_idx, index_bytes)?;
        let idx_file = std::fs::File::open(&tmp_idx)?;
        idx_file.sync_all()?;
        std::fs::rename(&tmp_idx, &idx_path)?;

        Ok(name)
    }

    /// Whether a `.keep` marker protects this pack from pruning.
    pub fn has_keep(&self, name: &str) -> bool {
        self.dir.join(format!("{name}.keep")).is_file()
    }

    /// Close the reader and delete both files. The index goes first so a
    /// concurrent scan stops offering the pack before its data vanishes.
    pub fn remove_pack(&self, name: &str) -> Result<bool, PackError> {
        self.readers
            .lock()
            .expect("reader cache lock poisoned")
            .pop(name);

        let idx_path = self.dir.join(format!("{name}.idx"));
        let pack_path = self.dir.join(format!("{name}.pack"));
        if !pack_path.exists() && !idx_path.exists() {
            return Ok(false);
        }
        if idx_path.exists() {
            std::fs::remove_file(&idx_path)?;
        }
        if pack_path.exists() {
            std::fs::remove_file(&pack_path)?;
        }
        Ok(true)
    }

    /// Drop all cached readers (after a repack).
    pub fn invalidate_readers(&self) {
        self.readers
            .lock()
            .expect("reader cache lock poisoned")
            .clear();
    }
}
