use thiserror::Error;

/// Errors raised by store, file and upload capabilities.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unknown collection: {0}")]
    UnknownCollection(String),
    #[error("duplicate value for {collection}.{field}: {value}")]
    Duplicate {
        collection: String,
        field: String,
        value: String,
    },
    #[error("entity not found: {collection}/{id}")]
    NotFound { collection: String, id: String },
    #[error("create hook failed for {collection}: {message}")]
    Hook { collection: String, message: String },
    #[error("io error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;
