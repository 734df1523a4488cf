use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object {0} not found")]
    NotFound(String),
    #[error("backend unreachable: {0}")]
    Unreachable(String),
}

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("failed to decode image: {0}")]
    Decode(String),
    #[error("image metadata missing or unreadable: {0}")]
    MetadataMissing(String),
    #[error("failed to write thumbnail: {0}")]
    ThumbnailWrite(String),
}

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("worker {0} did not come online within {1} seconds")]
    StartupTimeout(usize, u64),
    #[error("failed to spawn worker {0}: {1}")]
    Spawn(usize, std::io::Error),
    #[error("wire protocol error: {0}")]
    Protocol(String),
}

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("failed to list storage backend: {0}")]
    Listing(#[from] StorageError),
    #[error("duplicate photo id `{id}` produced by keys `{first}` and `{second}`")]
    DuplicateId {
        id: String,
        first: String,
        second: String,
    },
    #[error("failed to write manifest: {0}")]
    ManifestWrite(std::io::Error),
    #[error(transparent)]
    Pool(#[from] PoolError),
}
