use thiserror::Error;

#[derive(Error, Debug)]
pub enum GrowthError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type GrowthResult<T> = Result<T, GrowthError>;
