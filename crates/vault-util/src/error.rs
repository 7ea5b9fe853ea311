use std::path::PathBuf;

/// Errors from lock file operations.
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("lock file already held: {path}")]
    AlreadyLocked { path: PathBuf },

    #[error("failed to create lock file {path}: {source}")]
    Create {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to commit lock file {path}: {source}")]
    Commit {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors produced by the utility layer.
#[derive(Debug, thiserror::Error)]
pub enum UtilError {
    #[error(transparent)]
    Lock(#[from] LockError),

    #[error("zlib stream error: {0}")]
    Zlib(String),

    #[error("truncated zlib stream after {consumed} input bytes")]
    ZlibTruncated { consumed: usize },

    #[error("truncated varint")]
    TruncatedVarint,

    #[error("varint overflows u64")]
    VarintOverflow,

    #[error("date parse error: {0}")]
    DateParse(String),

    #[error("signature parse error: {0}")]
    SignatureParse(String),

    #[error("invalid identity: {0}")]
    InvalidIdentity(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
