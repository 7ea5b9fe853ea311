//! Garbage collection and repack.
//!
//! A run walks everything reachable from the refs, breaks over-deep delta
//! chains, deltifies blob candidates inside a batch, writes one new pack
//! (commits, tags, trees, then blobs, with OFS_DELTA entries where the
//! base landed earlier in the pack), publishes it atomically, and prunes
//! loose objects and superseded packs.

mod reachability;

pub use reachability::{collect_reachable, Reachable};

use std::time::{Duration, Instant};

use vault_delta::{DeltaError, DeltaStore};
use vault_hash::ObjectId;
use vault_history::History;
use vault_object::ObjectType;
use vault_pack::index::serialize_index;
use vault_pack::write::PackWriter;
use vault_raw::{FilesStore, RawError, RawStore};

/// Errors from GC operations.
#[derive(Debug, thiserror::Error)]
pub enum GcError {
    #[error("object vanished during repack: {0}")]
    ObjectVanished(ObjectId),

    #[error(transparent)]
    History(#[from] vault_history::HistoryError),

    #[error(transparent)]
    Delta(#[from] DeltaError),

    #[error(transparent)]
    Pack(#[from] vault_pack::PackError),

    #[error(transparent)]
    Odb(#[from] vault_odb::OdbError),

    #[error(transparent)]
    Ref(#[from] vault_ref::RefError),

    #[error(transparent)]
    Raw(#[from] RawError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Tuning knobs and scheduling gates.
#[derive(Debug, Clone, Copy)]
pub struct GcPolicy {
    /// Automatic runs trigger past this many loose blobs.
    pub loose_blob_threshold: usize,
    /// Chains deeper than this are broken (and trigger a run).
    pub max_chain_depth: usize,
    /// Automatic runs never happen closer together than this.
    pub min_interval: Duration,
    /// How many earlier candidates each blob is compared against.
    pub window: usize,
    /// Blobs larger than this are never deltified.
    pub max_delta_size: u64,
    /// Candidate sizes must be within this ratio of the target.
    pub size_ratio_bound: u64,
}

impl Default for GcPolicy {
    fn default() -> Self {
        Self {
            loose_blob_threshold: 100,
            max_chain_depth: 50,
            min_interval: Duration::from_secs(60),
            window: 10,
            max_delta_size: 512 * 1024 * 1024,
            size_ratio_bound: 16,
        }
    }
}

/// Repack phases, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GcPhase {
    Scan,
    BreakChains,
    Deltify,
    WritePack,
    Prune,
}

/// One progress report.
#[derive(Debug, Clone, Copy)]
pub struct GcProgress {
    pub phase: GcPhase,
    pub processed: u64,
    pub bytes_saved: u64,
    pub current: Option<ObjectId>,
}

/// Outcome of a repack.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GcStats {
    pub reachable_objects: usize,
    pub packed_objects: usize,
    pub deltified_blobs: usize,
    pub pruned_loose: usize,
    pub removed_packs: usize,
    pub bytes_saved: u64,
}

/// Blob payloads of one repository as a raw store, so the delta engine
/// can read through packs and write loose.
///
/// `remove` deletes only the loose full copy: the repository's own read
/// layer resolves delta records, and the engine replaces full content with
/// a record in the same batch that would call this.
pub struct BlobPayloads<'a> {
    history: &'a History,
    loose: FilesStore,
}

impl RawStore for BlobPayloads<'_> {
    fn store(&self, id: &ObjectId, bytes: &[u8]) -> Result<(), RawError> {
        let written = self.history.blobs.store(bytes).map_err(to_raw(*id))?;
        debug_assert_eq!(written, *id);
        Ok(())
    }
    fn load(&self, id: &ObjectId) -> Result<Option<Vec<u8>>, RawError> {
        self.history.blobs.load(id).map_err(to_raw(*id))
    }
    fn has(&self, id: &ObjectId) -> bool {
        self.history.blobs.has(id)
    }
    fn remove(&self, id: &ObjectId) -> Result<bool, RawError> {
        self.loose.remove(id)
    }
    fn keys(&self) -> Result<Vec<ObjectId>, RawError> {
        self.history.blobs.keys().map_err(to_raw(ObjectId::NULL))
    }
}

fn to_raw(id: ObjectId) -> impl Fn(vault_odb::OdbError) -> RawError {
    move |e| RawError::Corrupt {
        id,
        reason: e.to_string(),
    }
}

/// The collector: policy plus scheduling state.
pub struct Gc {
    policy: GcPolicy,
    last_run: Option<Instant>,
}

impl Gc {
    pub fn new(policy: GcPolicy) -> Self {
        Self {
            policy,
            last_run: None,
        }
    }

    pub fn policy(&self) -> &GcPolicy {
        &self.policy
    }

    /// The delta engine for a repository: blob payloads through the
    /// overlay, records in a sibling directory under `objects/`.
    pub fn delta_store<'a>(
        &self,
        history: &'a History,
    ) -> DeltaStore<BlobPayloads<'a>, FilesStore> {
        DeltaStore::new(
            BlobPayloads {
                history,
                loose: FilesStore::open(history.git_dir().join("objects")),
            },
            FilesStore::open(vault_history::delta_records_dir(history.git_dir())),
        )
    }

    /// Whether an automatic run is due: past the minimum interval AND
    /// (too many loose blobs OR an over-deep chain).
    pub fn should_run(&self, history: &History) -> Result<bool, GcError> {
        if let Some(last) = self.last_run {
            if last.elapsed() < self.policy.min_interval {
                return Ok(false);
            }
        }

        if self.count_loose_blobs(history)? > self.policy.loose_blob_threshold {
            return Ok(true);
        }

        let delta = self.delta_store(history);
        for id in delta.delta_keys()? {
            if delta.chain(&id)?.depth > self.policy.max_chain_depth {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn count_loose_blobs(&self, history: &History) -> Result<usize, GcError> {
        let loose = FilesStore::open(history.git_dir().join("objects"));
        let mut count = 0;
        for id in loose.keys()? {
            if let Some(bytes) = loose.load(&id)? {
                if let Ok((ObjectType::Blob, _, _)) = vault_object::header::parse_header(&bytes) {
                    count += 1;
                }
            }
        }
        Ok(count)
    }

    /// Run a full repack, reporting progress through `report`.
    pub fn run(
        &mut self,
        history: &History,
        report: &mut dyn FnMut(&GcProgress),
    ) -> Result<GcStats, GcError> {
        let mut stats = GcStats::default();
        let delta = self.delta_store(history);

        // Phase 1: everything reachable from the refs.
        let reachable = collect_reachable(history)?;
        stats.reachable_objects = reachable.total();
        report(&GcProgress {
            phase: GcPhase::Scan,
            processed: stats.reachable_objects as u64,
            bytes_saved: 0,
            current: None,
        });

        // Phase 2: break chains past the depth ceiling.
        delta.start_batch()?;
        let mut broken = 0u64;
        for id in delta.delta_keys()? {
            if delta.chain(&id)?.depth > self.policy.max_chain_depth {
                delta.undeltify(&id)?;
                broken += 1;
                report(&GcProgress {
                    phase: GcPhase::BreakChains,
                    processed: broken,
                    bytes_saved: 0,
                    current: Some(id),
                });
            }
        }
        delta.end_batch()?;

        // Phase 3: windowed candidate selection and batch deltify.
        delta.start_batch()?;
        let mut sized: Vec<(ObjectId, u64)> = Vec::new();
        for id in &reachable.blobs {
            let Some(size) = history.blobs.size(id)? else {
                continue;
            };
            sized.push((*id, size as u64));
        }
        sized.sort_by_key(|(_, size)| *size);

        for i in 0..sized.len() {
            let (target, target_size) = sized[i];
            if target_size > self.policy.max_delta_size {
                continue;
            }
            if delta.chain(&target)?.depth >= self.policy.max_chain_depth {
                continue;
            }

            let candidates: Vec<ObjectId> = sized[..i]
                .iter()
                .rev()
                .take(self.policy.window)
                .filter(|(candidate, size)| {
                    within_ratio(target_size, *size, self.policy.size_ratio_bound)
                        && delta
                            .chain(candidate)
                            .map(|c| c.depth < self.policy.max_chain_depth)
                            .unwrap_or(false)
                })
                .map(|(candidate, _)| *candidate)
                .collect();
            if candidates.is_empty() {
                continue;
            }

            if delta.deltify(&target, &candidates)?.is_some() {
                stats.deltified_blobs += 1;
                report(&GcProgress {
                    phase: GcPhase::Deltify,
                    processed: stats.deltified_blobs as u64,
                    bytes_saved: stats.bytes_saved,
                    current: Some(target),
                });
            }
        }
        delta.end_batch()?;

        // Phase 4: one new pack with all reachable objects.
        let old_packs = history.packs().scan()?;
        if reachable.total() > 0 {
            self.write_pack(history, &delta, &reachable, &mut stats, report)?;
        }
        history.packs().invalidate_readers();

        // Phase 5: drop loose copies, redundant delta records, and
        // superseded packs.
        delta.purge_records()?;
        let loose = FilesStore::open(history.git_dir().join("objects"));
        for id in loose.keys()? {
            if loose.remove(&id)? {
                stats.pruned_loose += 1;
                report(&GcProgress {
                    phase: GcPhase::Prune,
                    processed: stats.pruned_loose as u64,
                    bytes_saved: stats.bytes_saved,
                    current: Some(id),
                });
            }
        }
        for name in old_packs {
            if history.packs().has_keep(&name) {
                continue;
            }
            if history.packs().remove_pack(&name)? {
                stats.removed_packs += 1;
            }
        }

        self.last_run = Some(Instant::now());
        Ok(stats)
    }

    fn write_pack(
        &self,
        history: &History,
        delta: &DeltaStore<BlobPayloads<'_>, FilesStore>,
        reachable: &Reachable,
        stats: &mut GcStats,
        report: &mut dyn FnMut(&GcProgress),
    ) -> Result<(), GcError> {
        // Blobs ordered by chain depth so every delta base precedes its
        // dependents.
        let mut blobs: Vec<(ObjectId, usize)> = Vec::with_capacity(reachable.blobs.len());
        for id in &reachable.blobs {
            blobs.push((*id, delta.chain(id)?.depth));
        }
        blobs.sort_by(|a, b| a.1.cmp(&b.1).then(a.0.cmp(&b.0)));

        let total = reachable.total() as u32;
        let tmp_pack = history.git_dir().join("objects").join("gc-tmp.pack");
        let mut writer = PackWriter::create(&tmp_pack, total)?;

        for id in &reachable.commits {
            let commit = history
                .commits
                .load(id)?
                .ok_or(GcError::ObjectVanished(*id))?;
            self.report_written(&mut writer, ObjectType::Commit, &commit.serialize_payload(), stats, report, id)?;
        }
        for id in &reachable.tags {
            let tag = history.tags.load(id)?.ok_or(GcError::ObjectVanished(*id))?;
            self.report_written(&mut writer, ObjectType::Tag, &tag.serialize_payload(), stats, report, id)?;
        }
        for id in &reachable.trees {
            let tree = history.trees.load(id)?.ok_or(GcError::ObjectVanished(*id))?;
            self.report_written(&mut writer, ObjectType::Tree, &tree.serialize_payload(), stats, report, id)?;
        }
        for (id, _) in &blobs {
            let base = delta.delta_base(id)?;
            let base_offset = base.and_then(|b| writer.offset_of(&b));
            match (base, base_offset) {
                (Some(_), Some(offset)) => {
                    let delta_bytes = delta
                        .delta_payload(id)?
                        .ok_or(GcError::ObjectVanished(*id))?;
                    let payload_size = delta
                        .load(id)?
                        .ok_or(GcError::ObjectVanished(*id))?
                        .len() as u64;
                    writer.add_ofs_delta(*id, offset, &delta_bytes)?;
                    stats.bytes_saved += payload_size.saturating_sub(delta_bytes.len() as u64);
                    stats.packed_objects += 1;
                    report(&GcProgress {
                        phase: GcPhase::WritePack,
                        processed: stats.packed_objects as u64,
                        bytes_saved: stats.bytes_saved,
                        current: Some(*id),
                    });
                }
                _ => {
                    let payload = delta.load(id)?.ok_or(GcError::ObjectVanished(*id))?;
                    self.report_written(&mut writer, ObjectType::Blob, &payload, stats, report, id)?;
                }
            }
        }

        let mut entries = writer.entries().to_vec();
        let (tmp_pack, checksum) = writer.finish()?;
        let index_bytes = serialize_index(&mut entries, &checksum)?;
        let pack_bytes = std::fs::read(&tmp_pack)?;
        history
            .packs()
            .add_pack(&pack_bytes, &index_bytes, &checksum)?;
        std::fs::remove_file(&tmp_pack)?;
        Ok(())
    }

    fn report_written(
        &self,
        writer: &mut PackWriter,
        obj_type: ObjectType,
        payload: &[u8],
        stats: &mut GcStats,
        report: &mut dyn FnMut(&GcProgress),
        id: &ObjectId,
    ) -> Result<(), GcError> {
        writer.add_object(obj_type, payload)?;
        stats.packed_objects += 1;
        report(&GcProgress {
            phase: GcPhase::WritePack,
            processed: stats.packed_objects as u64,
            bytes_saved: stats.bytes_saved,
            current: Some(*id),
        });
        Ok(())
    }
}

impl Default for Gc {
    fn default() -> Self {
        Self::new(GcPolicy::default())
    }
}

fn within_ratio(a: u64, b: u64, bound: u64) -> bool {
    if a == 0 || b == 0 {
        return false;
    }
    let (small, large) = if a < b { (a, b) } else { (b, a) };
    large / small <= bound
}
