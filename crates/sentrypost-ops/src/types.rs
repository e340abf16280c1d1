use thiserror::Error;

#[derive(Error, Debug)]
pub enum OpsError {
    #[error("database error: {0}")]
    Database(#[from] sentrypost_storage::StorageError),

    #[error("memory error: {0}")]
    Memory(#[from] sentrypost_memory::MemoryError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type OpsResult<T> = Result<T, OpsError>;
