use std::path::PathBuf;

/// Result type for sentinel operations
pub type Result<T> = std::result::Result<T, SentinelError>;

/// Errors produced by the baseline registry and the check pipeline
#[derive(Debug, thiserror::Error)]
pub enum SentinelError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Path already tracked: {0}")]
    Duplicate(String),

    #[error("Refusing to track symbolic link: {0}")]
    Symlink(String),

    #[error("Not a regular file: {0}")]
    NotRegularFile(String),

    #[error("Path not found: {0}")]
    NotFound(String),

    #[error("Cannot read {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("File is not tracked: {0}")]
    UnknownFile(String),

    #[error("Store already exists at {0}")]
    StoreExists(String),

    #[error("Store does not exist at {0}; run generate first")]
    StoreMissing(String),

    #[error("Environment check failed: {0}")]
    Environment(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Privilege change failed on {path}: {reason}")]
    Privilege { path: String, reason: String },

    #[error("Alert delivery failed: {0}")]
    Alert(String),
}

impl SentinelError {
    pub fn unreadable(path: &std::path::Path, source: std::io::Error) -> Self {
        Self::Unreadable {
            path: path.to_path_buf(),
            source,
        }
    }
}
