//! The history facade: typed stores, refs, staging, and graph walks behind
//! one handle.
//!
//! [`History::open`] wires the loose file store under `objects/`, the pack
//! directory overlay, the ref store, and the staging file into a single
//! repository view. Walks (`walk_ancestry`, `find_merge_base`,
//! `is_ancestor`) live in [`walk`] and are re-exported as methods.

pub mod config;
pub mod identity;
mod loose_layer;
mod packed_layer;
pub mod walk;

pub use config::Config;
pub use loose_layer::LooseLayer;
pub use packed_layer::PackedLayer;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use vault_hash::ObjectId;
use vault_index::Staging;
use vault_object::Commit;
use vault_odb::{Blobs, CachingStore, Commits, Odb, Tags, Trees};
use vault_pack::directory::PackDirectory;
use vault_raw::{FilesStore, OverlayStore};
use vault_ref::{RefName, RefStore, Reference};
use vault_util::date::Signature;

/// Bytes of decompressed object content kept hot.
const CONTENT_CACHE_BYTES: usize = 16 * 1024 * 1024;

/// Errors from repository-level operations.
#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error("not a repository: {0}")]
    NotARepository(PathBuf),

    #[error("commit not found: {0}")]
    CommitNotFound(ObjectId),

    #[error("object {0} is not a commit")]
    NotACommit(ObjectId),

    #[error("HEAD does not name a branch or commit")]
    UnbornHead,

    #[error("config error: {0}")]
    Config(String),

    #[error("no identity configured (set user.name/user.email or GIT_AUTHOR_*)")]
    NoIdentity,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Raw(#[from] vault_raw::RawError),

    #[error(transparent)]
    Odb(#[from] vault_odb::OdbError),

    #[error(transparent)]
    Ref(#[from] vault_ref::RefError),

    #[error(transparent)]
    Index(#[from] vault_index::IndexError),

    #[error(transparent)]
    Pack(#[from] vault_pack::PackError),

    #[error(transparent)]
    Util(#[from] vault_util::UtilError),
}

/// One repository: typed stores over the pack+loose overlay, refs, and
/// the staging file.
pub struct History {
    git_dir: PathBuf,
    pub blobs: Blobs,
    pub trees: Trees,
    pub commits: Commits,
    pub tags: Tags,
    pub refs: RefStore,
    packs: Arc<PackDirectory>,
    config: Config,
}

impl History {
    /// Open a repository at `git_dir`. With `create` set, the layout is
    /// initialized first: object and ref directories, a `HEAD` pointing at
    /// `refs/heads/main`, and a minimal config.
    pub fn open(git_dir: impl AsRef<Path>, create: bool) -> Result<Self, HistoryError> {
        let git_dir = git_dir.as_ref().to_path_buf();

        if create {
            initialize_layout(&git_dir)?;
        } else if !git_dir.join("objects").is_dir() {
            return Err(HistoryError::NotARepository(git_dir));
        }

        let loose = Arc::new(LooseLayer::new(
            Arc::new(FilesStore::open(git_dir.join("objects"))),
            FilesStore::open(delta_records_dir(&git_dir)),
        ));
        let packs = Arc::new(PackDirectory::open(git_dir.join("objects").join("pack")));
        let layered = OverlayStore::new(
            PackedLayer::new(Arc::clone(&packs), Arc::clone(&loose)),
            SharedLayer(loose),
        );
        let store: vault_odb::SharedStore =
            Arc::new(CachingStore::new(layered, CONTENT_CACHE_BYTES));

        let Odb {
            blobs,
            trees,
            commits,
            tags,
        } = Odb::new(store);

        let config = Config::load(&git_dir.join("config"))?;

        Ok(Self {
            refs: RefStore::open(&git_dir),
            git_dir,
            blobs,
            trees,
            commits,
            tags,
            packs,
            config,
        })
    }

    /// Open the repository named by `GIT_DIR`, falling back to `.git` in
    /// the current directory.
    pub fn from_env() -> Result<Self, HistoryError> {
        let git_dir = std::env::var_os("GIT_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(".git"));
        Self::open(git_dir, false)
    }

    pub fn git_dir(&self) -> &Path {
        &self.git_dir
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The pack directory backing the overlay.
    pub fn packs(&self) -> &Arc<PackDirectory> {
        &self.packs
    }

    /// Read the staging file, or an empty staging area when absent.
    pub fn read_staging(&self) -> Result<Staging, HistoryError> {
        let path = self.git_dir.join("index");
        if !path.is_file() {
            return Ok(Staging::new());
        }
        Ok(Staging::read_from(path)?)
    }

    /// Persist the staging area.
    pub fn write_staging(&self, staging: &Staging) -> Result<(), HistoryError> {
        Ok(staging.write_to(self.git_dir.join("index"))?)
    }

    /// Resolve `HEAD` to a commit, if born.
    pub fn head_commit(&self) -> Result<Option<ObjectId>, HistoryError> {
        let head = RefName::new("HEAD")?;
        Ok(self.refs.resolve(&head)?)
    }

    /// The branch `HEAD` points at, or `None` when detached.
    pub fn head_branch(&self) -> Result<Option<RefName>, HistoryError> {
        let head = RefName::new("HEAD")?;
        match self.refs.get(&head)? {
            Some(Reference::Symbolic { target, .. }) => Ok(Some(target)),
            _ => Ok(None),
        }
    }

    /// Commit the current staging contents.
    ///
    /// Folds staging into trees, writes the commit with `HEAD` as parent
    /// (none for the root commit), and advances the current branch (or
    /// `HEAD` itself when detached).
    pub fn commit_staged(
        &self,
        staging: &Staging,
        message: &str,
        author: &Signature,
    ) -> Result<ObjectId, HistoryError> {
        let tree = staging.write_tree(&self.trees)?;
        let parents = self.head_commit()?.into_iter().collect();

        let commit = Commit {
            tree,
            parents,
            author: author.clone(),
            committer: author.clone(),
            encoding: None,
            gpgsig: None,
            message: message.into(),
        };
        let commit_id = self.commits.store(&commit)?;

        match self.head_branch()? {
            Some(branch) => self.refs.set(&branch, &commit_id)?,
            None => self.refs.set(&RefName::new("HEAD")?, &commit_id)?,
        }
        Ok(commit_id)
    }

    /// BFS over ancestry: the start commit first, parents level by level,
    /// each commit once.
    pub fn walk_ancestry(
        &self,
        start: &ObjectId,
        limit: Option<usize>,
    ) -> Result<Vec<ObjectId>, HistoryError> {
        walk::walk_ancestry(&self.commits, start, limit)
    }

    /// Whether `ancestor` is reachable from `descendant`.
    pub fn is_ancestor(
        &self,
        ancestor: &ObjectId,
        descendant: &ObjectId,
    ) -> Result<bool, HistoryError> {
        walk::is_ancestor(&self.commits, ancestor, descendant)
    }

    /// Minimal common ancestors of two commits.
    pub fn find_merge_base(
        &self,
        a: &ObjectId,
        b: &ObjectId,
    ) -> Result<Vec<ObjectId>, HistoryError> {
        walk::find_merge_base(&self.commits, a, b)
    }
}

/// Where the delta engine keeps its records for this repository.
pub fn delta_records_dir(git_dir: &Path) -> PathBuf {
    git_dir.join("objects").join("vdelta")
}

/// `Arc<LooseLayer>` as a store in its own right, so the pack layer and
/// the overlay share one handle.
struct SharedLayer(Arc<LooseLayer>);

impl vault_raw::RawStore for SharedLayer {
    fn store(&self, id: &ObjectId, bytes: &[u8]) -> Result<(), vault_raw::RawError> {
        self.0.store(id, bytes)
    }
    fn load(&self, id: &ObjectId) -> Result<Option<Vec<u8>>, vault_raw::RawError> {
        self.0.load(id)
    }
    fn load_stream(
        &self,
        id: &ObjectId,
    ) -> Result<Option<Box<dyn std::io::Read + '_>>, vault_raw::RawError> {
        self.0.load_stream(id)
    }
    fn has(&self, id: &ObjectId) -> bool {
        self.0.has(id)
    }
    fn remove(&self, id: &ObjectId) -> Result<bool, vault_raw::RawError> {
        self.0.remove(id)
    }
    fn keys(&self) -> Result<Vec<ObjectId>, vault_raw::RawError> {
        self.0.keys()
    }
}

fn initialize_layout(git_dir: &Path) -> Result<(), HistoryError> {
    std::fs::create_dir_all(git_dir.join("objects").join("pack"))?;
    std::fs::create_dir_all(git_dir.join("refs").join("heads"))?;
    std::fs::create_dir_all(git_dir.join("refs").join("tags"))?;

    let head = git_dir.join("HEAD");
    if !head.exists() {
        std::fs::write(&head, b"ref: refs/heads/main\n")?;
    }

    let config = git_dir.join("config");
    if !config.exists() {
        std::fs::write(
            &config,
            b"[core]\n\trepositoryformatversion = 0\n\tbare = false\n",
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use vault_util::date::GitDate;

    fn sig() -> Signature {
        Signature::new("Test", "test@example.com", GitDate::new(1_700_000_000, 0)).unwrap()
    }

    #[test]
    fn initialize_creates_layout() {
        let dir = tempfile::tempdir().unwrap();
        let history = History::open(dir.path(), true).unwrap();

        assert!(dir.path().join("objects/pack").is_dir());
        assert!(dir.path().join("refs/heads").is_dir());
        assert_eq!(
            std::fs::read_to_string(dir.path().join("HEAD")).unwrap(),
            "ref: refs/heads/main\n"
        );
        assert_eq!(
            history.head_branch().unwrap().unwrap().as_str(),
            "refs/heads/main"
        );
        assert!(history.head_commit().unwrap().is_none());
    }

    #[test]
    fn open_without_create_requires_layout() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            History::open(dir.path(), false),
            Err(HistoryError::NotARepository(_))
        ));
    }

    #[test]
    fn commit_staged_advances_branch() {
        let dir = tempfile::tempdir().unwrap();
        let history = History::open(dir.path(), true).unwrap();

        let blob = history.blobs.store(b"# A\n").unwrap();
        let mut staging = history.read_staging().unwrap();
        let mut builder = vault_index::StagingBuilder::new();
        builder.add(vault_index::StagingEntry::new(
            "README.md",
            blob,
            vault_object::FileMode::Regular,
        ));
        builder.finish(&mut staging).unwrap();
        history.write_staging(&staging).unwrap();

        let c1 = history.commit_staged(&staging, "first\n", &sig()).unwrap();
        assert_eq!(history.head_commit().unwrap(), Some(c1));

        let c2 = history.commit_staged(&staging, "second\n", &sig()).unwrap();
        assert_eq!(history.head_commit().unwrap(), Some(c2));
        assert_eq!(
            history.commits.get_parents(&c2).unwrap().unwrap(),
            vec![c1]
        );
    }

    #[test]
    fn objects_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let blob_id = {
            let history = History::open(dir.path(), true).unwrap();
            history.blobs.store(b"persistent").unwrap()
        };

        let history = History::open(dir.path(), false).unwrap();
        assert_eq!(history.blobs.load(&blob_id).unwrap().unwrap(), b"persistent");
    }
}
