use thiserror::Error;

#[derive(Error, Debug)]
pub enum RegScanError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(#[from] object_store::Error),

    #[error("S3 error: {0}")]
    S3(String),

    #[error("Timed out: {0}")]
    Timeout(String),
}

impl RegScanError {
    /// Converts an object_store error, keeping missing objects distinguishable
    /// from transport failures.
    pub fn from_object_store(key: &str, error: object_store::Error) -> Self {
        match error {
            object_store::Error::NotFound { .. } => Self::NotFound(key.to_string()),
            other => Self::Storage(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, RegScanError>;
