use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Workbook error: {0}")]
    Workbook(#[from] calamine::Error),

    #[cfg(feature = "rest")]
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Missing credentials: {0}")]
    MissingCredentials(String),

    #[error("Unknown source: {0}")]
    UnknownSource(String),

    #[error("Invalid descriptor: {0}")]
    Descriptor(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Settings error: {0}")]
    Settings(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, SyncError>;
