use thiserror::Error;

#[derive(Error, Debug)]
pub enum CmfsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Request loop error: {0}")]
    Api(#[from] api::ApiError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Task failed: {0}")]
    Task(String),
}

impl From<serde_json::Error> for CmfsError {
    fn from(err: serde_json::Error) -> Self {
        CmfsError::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CmfsError>;
