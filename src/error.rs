use thiserror::Error;

/// Failure to obtain the category page.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The site answered 403; the run stops here.
    #[error("access forbidden (HTTP 403), the server may be blocking requests")]
    Blocked,

    #[error("unexpected HTTP status {0}")]
    Status(u16),

    #[error("invalid request header: {0}")]
    InvalidHeader(String),

    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Failure to pull the item list out of the page markup.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("embedded __NEXT_DATA__ script not found in the page")]
    NoEmbeddedData,

    #[error("embedded payload is not valid JSON: {0}")]
    MalformedJson(#[from] serde_json::Error),

    /// `key` is the first segment that could not be resolved, `path` the
    /// segments walked before it.
    #[error("'{key}' is not a recognized key (after '{path}')")]
    UnexpectedSchema { key: String, path: String },
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Check-only mode found no database file to check against.
    #[error("database {0} not initialised; run once with --write to create it")]
    NotInitialised(String),

    #[error("invalid SQL identifier {0:?}")]
    InvalidIdentifier(String),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}
