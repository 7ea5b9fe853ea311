//! Storage-level delta engine.
//!
//! Values (blobs, in practice) can be stored as deltas against a base
//! instead of as full content. A delta record lives in a sibling raw store
//! under the target's ID and holds the base ID plus the compressed delta;
//! full content stays bit-compatible with the loose layout. All mutations
//! happen inside a batch and publish together on [`DeltaStore::end_batch`].

mod record;

pub use record::DeltaRecord;

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::num::NonZeroUsize;
use std::sync::Mutex;

use lru::LruCache;
use vault_hash::ObjectId;
use vault_pack::delta::{apply::apply_delta, compute::compute_delta};
use vault_raw::{RawError, RawStore};
use vault_util::zlib::deflate;

/// Hard ceiling when resolving stored chains.
const MAX_RESOLVE_DEPTH: usize = 512;

/// Resolved payloads kept for chain re-reads.
const CHAIN_CACHE_CAPACITY: usize = 64;

/// Errors from the delta engine.
#[derive(Debug, thiserror::Error)]
pub enum DeltaError {
    #[error("cannot remove {id}: {count} stored delta(s) depend on it")]
    HasDependents { id: ObjectId, count: usize },

    #[error("deltifying {target} against {base} would create a cycle")]
    Cycle { target: ObjectId, base: ObjectId },

    #[error("no delta batch is active")]
    NoBatch,

    #[error("a delta batch is already active")]
    BatchActive,

    #[error("delta chain for {id} exceeds {max} entries")]
    ChainTooDeep { id: ObjectId, max: usize },

    #[error("corrupt delta record {id}: {reason}")]
    CorruptRecord { id: ObjectId, reason: String },

    #[error("delta base {base} of {target} is missing")]
    MissingBase { target: ObjectId, base: ObjectId },

    #[error(transparent)]
    Raw(#[from] RawError),

    #[error(transparent)]
    Pack(#[from] vault_pack::PackError),

    #[error(transparent)]
    Util(#[from] vault_util::UtilError),
}

/// Acceptance rules for new deltas.
#[derive(Debug, Clone, Copy)]
pub struct DeltaPolicy {
    /// Both target and base must be at least this many bytes.
    pub min_object_size: usize,
    /// The compressed delta must be at most this fraction of the currently
    /// stored compressed target size.
    pub max_compression_ratio: f64,
}

impl Default for DeltaPolicy {
    fn default() -> Self {
        Self {
            min_object_size: 50,
            max_compression_ratio: 0.75,
        }
    }
}

/// Chain description for one stored value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainInfo {
    /// Number of delta hops to reach full content (0 = stored full).
    pub depth: usize,
    /// Sum of the compressed delta payload sizes along the chain.
    pub total_compressed: u64,
    /// Base IDs from the immediate base down to the full object.
    pub base_ids: Vec<ObjectId>,
}

/// Staged mutations of an open batch.
#[derive(Debug, Default)]
struct Batch {
    /// Records to write (target -> serialized record).
    put_records: BTreeMap<ObjectId, Vec<u8>>,
    /// Records to drop.
    drop_records: BTreeSet<ObjectId>,
    /// Full contents to write (from undeltify).
    put_content: BTreeMap<ObjectId, Vec<u8>>,
    /// Full contents to drop (replaced by records).
    drop_content: BTreeSet<ObjectId>,
}

/// Delta-aware store layered over full content and a record store.
pub struct DeltaStore<C, R> {
    content: C,
    records: R,
    policy: DeltaPolicy,
    batch: Mutex<Option<Batch>>,
    /// Resolved full payloads; cleared when a batch publishes.
    resolved: Mutex<LruCache<ObjectId, Vec<u8>>>,
}

impl<C: RawStore, R: RawStore> DeltaStore<C, R> {
    pub fn new(content: C, records: R) -> Self {
        Self::with_policy(content, records, DeltaPolicy::default())
    }

    pub fn with_policy(content: C, records: R, policy: DeltaPolicy) -> Self {
        Self {
            content,
            records,
            policy,
            batch: Mutex::new(None),
            resolved: Mutex::new(LruCache::new(
                NonZeroUsize::new(CHAIN_CACHE_CAPACITY).expect("nonzero capacity"),
            )),
        }
    }

    pub fn policy(&self) -> &DeltaPolicy {
        &self.policy
    }

    pub fn content(&self) -> &C {
        &self.content
    }

    /// Store full content. Allowed outside batches; storing never touches
    /// existing delta records.
    pub fn store(&self, id: &ObjectId, bytes: &[u8]) -> Result<(), DeltaError> {
        Ok(self.content.store(id, bytes)?)
    }

    /// Load the full value, resolving any delta chain.
    pub fn load(&self, id: &ObjectId) -> Result<Option<Vec<u8>>, DeltaError> {
        let mut visited = HashSet::new();
        self.resolve(id, &mut visited)
    }

    pub fn has(&self, id: &ObjectId) -> bool {
        self.records.has(id) || self.content.has(id)
    }

    /// Remove a value. Fails while stored deltas depend on it.
    pub fn remove(&self, id: &ObjectId) -> Result<bool, DeltaError> {
        let dependents = self.dependents(id)?;
        if !dependents.is_empty() {
            return Err(DeltaError::HasDependents {
                id: *id,
                count: dependents.len(),
            });
        }
        let record_removed = self.records.remove(id)?;
        let content_removed = self.content.remove(id)?;
        if record_removed || content_removed {
            self.resolved
                .lock()
                .expect("resolved cache lock poisoned")
                .pop(id);
        }
        Ok(record_removed || content_removed)
    }

    /// All keys, full and deltified, sorted.
    pub fn keys(&self) -> Result<Vec<ObjectId>, DeltaError> {
        let mut keys = self.content.keys()?;
        keys.extend(self.records.keys()?);
        keys.sort();
        keys.dedup();
        Ok(keys)
    }

    /// Whether the value is stored as a delta.
    pub fn is_delta(&self, id: &ObjectId) -> bool {
        self.records.has(id)
    }

    /// Immediate base of a deltified value.
    pub fn delta_base(&self, id: &ObjectId) -> Result<Option<ObjectId>, DeltaError> {
        match self.read_record(id)? {
            Some(record) => Ok(Some(record.base)),
            None => Ok(None),
        }
    }

    /// Describe the chain under `id`.
    pub fn chain(&self, id: &ObjectId) -> Result<ChainInfo, DeltaError> {
        let mut base_ids = Vec::new();
        let mut total_compressed = 0u64;
        let mut current = *id;
        let mut seen = HashSet::new();
        seen.insert(current);

        while let Some(record) = self.read_record(&current)? {
            total_compressed += record.compressed_delta.len() as u64;
            base_ids.push(record.base);
            if !seen.insert(record.base) {
                return Err(DeltaError::CorruptRecord {
                    id: *id,
                    reason: "cycle in stored chain".into(),
                });
            }
            if base_ids.len() > MAX_RESOLVE_DEPTH {
                return Err(DeltaError::ChainTooDeep {
                    id: *id,
                    max: MAX_RESOLVE_DEPTH,
                });
            }
            current = record.base;
        }

        Ok(ChainInfo {
            depth: base_ids.len(),
            total_compressed,
            base_ids,
        })
    }

    /// All deltified target IDs, sorted.
    pub fn delta_keys(&self) -> Result<Vec<ObjectId>, DeltaError> {
        Ok(self.records.keys()?)
    }

    /// The uncompressed delta wire bytes stored for `id`, when deltified.
    pub fn delta_payload(&self, id: &ObjectId) -> Result<Option<Vec<u8>>, DeltaError> {
        match self.read_record(id)? {
            Some(record) => Ok(Some(vault_util::zlib::inflate(
                &record.compressed_delta,
                false,
            )?)),
            None => Ok(None),
        }
    }

    /// Drop every delta record, leaving full content untouched.
    ///
    /// Used after a repack has captured the chains in a pack; targets must
    /// have been re-stored full (or packed) by the caller first.
    pub fn purge_records(&self) -> Result<usize, DeltaError> {
        let keys = self.records.keys()?;
        let mut removed = 0;
        for id in &keys {
            if self.records.remove(id)? {
                removed += 1;
            }
        }
        self.resolved
            .lock()
            .expect("resolved cache lock poisoned")
            .clear();
        Ok(removed)
    }

    /// IDs of stored deltas whose immediate base is `id` (linear scan).
    pub fn dependents(&self, id: &ObjectId) -> Result<Vec<ObjectId>, DeltaError> {
        let mut out = Vec::new();
        for key in self.records.keys()? {
            if let Some(record) = self.read_record(&key)? {
                if record.base == *id {
                    out.push(key);
                }
            }
        }
        Ok(out)
    }

    // ---- batches ----

    /// Open a batch. Exactly one batch may be active.
    pub fn start_batch(&self) -> Result<(), DeltaError> {
        let mut batch = self.batch.lock().expect("batch lock poisoned");
        if batch.is_some() {
            return Err(DeltaError::BatchActive);
        }
        *batch = Some(Batch::default());
        Ok(())
    }

    /// Discard all staged mutations.
    pub fn cancel_batch(&self) -> Result<(), DeltaError> {
        let mut batch = self.batch.lock().expect("batch lock poisoned");
        if batch.take().is_none() {
            return Err(DeltaError::NoBatch);
        }
        Ok(())
    }

    /// Publish staged mutations.
    ///
    /// Additions land before removals so a reader always finds either the
    /// old representation or the new one, never neither.
    pub fn end_batch(&self) -> Result<(), DeltaError> {
        let staged = {
            let mut batch = self.batch.lock().expect("batch lock poisoned");
            batch.take().ok_or(DeltaError::NoBatch)?
        };

        for (id, bytes) in &staged.put_content {
            self.content.store(id, bytes)?;
        }
        for (id, record) in &staged.put_records {
            self.records.store(id, record)?;
        }
        for id in &staged.drop_content {
            self.content.remove(id)?;
        }
        for id in &staged.drop_records {
            self.records.remove(id)?;
        }

        self.resolved
            .lock()
            .expect("resolved cache lock poisoned")
            .clear();
        Ok(())
    }

    /// Try to deltify `target` against the given candidates.
    ///
    /// All acceptance rules must hold: both sides at least
    /// `min_object_size`, no dependency cycle, compressed delta within
    /// `max_compression_ratio` of the current stored size, and the
    /// smallest qualifying candidate wins. Returns the chosen base, or
    /// `None` when no candidate qualifies. A single explicitly-cyclic
    /// candidate is an error rather than a silent rejection.
    pub fn deltify(
        &self,
        target: &ObjectId,
        candidates: &[ObjectId],
    ) -> Result<Option<ObjectId>, DeltaError> {
        {
            let batch = self.batch.lock().expect("batch lock poisoned");
            if batch.is_none() {
                return Err(DeltaError::NoBatch);
            }
        }

        let Some(target_full) = self.load(target)? else {
            return Ok(None);
        };
        if target_full.len() < self.policy.min_object_size {
            return Ok(None);
        }

        let current_compressed = self.stored_compressed_size(target, &target_full)?;
        let budget = (current_compressed as f64 * self.policy.max_compression_ratio) as usize;

        let mut best: Option<(ObjectId, Vec<u8>)> = None;
        let mut sole_cycle: Option<ObjectId> = None;

        for base in candidates {
            if base == target || !self.has(base) {
                continue;
            }
            if self.depends_on(base, target)? {
                if candidates.len() == 1 {
                    sole_cycle = Some(*base);
                }
                continue;
            }
            let Some(base_full) = self.load(base)? else {
                continue;
            };
            if base_full.len() < self.policy.min_object_size {
                continue;
            }

            let delta = compute_delta(&base_full, &target_full);
            let compressed = deflate(&delta, false)?;
            if compressed.len() > budget {
                continue;
            }
            match &best {
                Some((_, prev)) if prev.len() <= compressed.len() => {}
                _ => best = Some((*base, compressed)),
            }
        }

        if let Some(base) = sole_cycle {
            return Err(DeltaError::Cycle {
                target: *target,
                base,
            });
        }

        let Some((base, compressed_delta)) = best else {
            return Ok(None);
        };

        let record = DeltaRecord {
            base,
            compressed_delta,
        };
        let mut batch = self.batch.lock().expect("batch lock poisoned");
        let staged = batch.as_mut().ok_or(DeltaError::NoBatch)?;
        staged.put_records.insert(*target, record.serialize());
        staged.drop_content.insert(*target);
        staged.put_content.remove(target);
        Ok(Some(base))
    }

    /// Break a chain link: re-store `id` as full content and drop its
    /// record. No-op for values already stored full.
    pub fn undeltify(&self, id: &ObjectId) -> Result<(), DeltaError> {
        {
            let batch = self.batch.lock().expect("batch lock poisoned");
            if batch.is_none() {
                return Err(DeltaError::NoBatch);
            }
        }
        if !self.is_delta(id) {
            return Ok(());
        }
        let Some(full) = self.load(id)? else {
            return Ok(());
        };

        let mut batch = self.batch.lock().expect("batch lock poisoned");
        let staged = batch.as_mut().ok_or(DeltaError::NoBatch)?;
        staged.put_content.insert(*id, full);
        staged.drop_records.insert(*id);
        staged.put_records.remove(id);
        staged.drop_content.remove(id);
        Ok(())
    }

    // ---- internals ----

    /// Whether `id` transitively depends on `needle` (including staged
    /// records, so in-batch deltas cannot form cycles).
    fn depends_on(&self, id: &ObjectId, needle: &ObjectId) -> Result<bool, DeltaError> {
        let mut current = *id;
        let mut hops = 0;
        loop {
            if current == *needle {
                return Ok(true);
            }
            let staged_base = {
                let batch = self.batch.lock().expect("batch lock poisoned");
                batch.as_ref().and_then(|b| {
                    b.put_records
                        .get(&current)
                        .and_then(|bytes| DeltaRecord::parse(bytes).ok())
                        .map(|r| r.base)
                })
            };
            let next = match staged_base {
                Some(base) => Some(base),
                None => self.read_record(&current)?.map(|r| r.base),
            };
            match next {
                Some(base) => {
                    hops += 1;
                    if hops > MAX_RESOLVE_DEPTH {
                        return Err(DeltaError::ChainTooDeep {
                            id: *id,
                            max: MAX_RESOLVE_DEPTH,
                        });
                    }
                    current = base;
                }
                None => return Ok(false),
            }
        }
    }

    fn stored_compressed_size(
        &self,
        id: &ObjectId,
        full: &[u8],
    ) -> Result<usize, DeltaError> {
        if let Some(record) = self.read_record(id)? {
            return Ok(record.compressed_delta.len());
        }
        Ok(deflate(full, false)?.len())
    }

    fn read_record(&self, id: &ObjectId) -> Result<Option<DeltaRecord>, DeltaError> {
        match self.records.load(id)? {
            Some(bytes) => DeltaRecord::parse(&bytes)
                .map(Some)
                .map_err(|reason| DeltaError::CorruptRecord { id: *id, reason }),
            None => Ok(None),
        }
    }

    fn resolve(
        &self,
        id: &ObjectId,
        visited: &mut HashSet<ObjectId>,
    ) -> Result<Option<Vec<u8>>, DeltaError> {
        if let Some(hit) = self
            .resolved
            .lock()
            .expect("resolved cache lock poisoned")
            .get(id)
            .cloned()
        {
            return Ok(Some(hit));
        }

        let Some(record) = self.read_record(id)? else {
            return Ok(self.content.load(id)?);
        };

        if !visited.insert(*id) {
            return Err(DeltaError::CorruptRecord {
                id: *id,
                reason: "cycle in stored chain".into(),
            });
        }
        if visited.len() > MAX_RESOLVE_DEPTH {
            return Err(DeltaError::ChainTooDeep {
                id: *id,
                max: MAX_RESOLVE_DEPTH,
            });
        }

        let base_full =
            self.resolve(&record.base, visited)?
                .ok_or_else(|| DeltaError::MissingBase {
                    target: *id,
                    base: record.base,
                })?;

        let delta = vault_util::zlib::inflate(&record.compressed_delta, false)?;
        let full = apply_delta(&base_full, &delta)?;

        self.resolved
            .lock()
            .expect("resolved cache lock poisoned")
            .put(*id, full.clone());
        Ok(Some(full))
    }
}
