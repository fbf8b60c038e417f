use thiserror::Error;

#[derive(Debug, Error)]
pub enum NetAuditError {
    #[error("invalid target: {0}")]
    InvalidTarget(String),
    #[error("invalid port value: {0}")]
    InvalidPort(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("cache decode error: {0}")]
    CacheDecode(String),
    #[error("cache schema mismatch: expected {expected}, found {found}")]
    CacheSchema { expected: u32, found: u32 },
    #[error("scan failed: {0}")]
    Scan(String),
}

pub type Result<T> = std::result::Result<T, NetAuditError>;
