use thiserror::Error;

use fixtura_store::StoreError;

/// Errors emitted by the import engine.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("no fixture definition found for `{0}`")]
    NotFound(String),
    #[error("unknown model: {0}")]
    UnknownModel(String),
    #[error("invalid schema: {0}")]
    InvalidSchema(String),
    #[error("unknown custom transform: {0}")]
    UnknownTransform(String),
    #[error("custom transform `{name}` failed: {message}")]
    Transform { name: String, message: String },
    #[error("circular reference: {0}")]
    CircularReference(String),
    #[error("generated fixtures for `{0}` are still being imported")]
    GeneratedConflict(String),
    #[error("failed to load fixture `{id}`: {message}")]
    Load { id: String, message: String },
    #[error("`{0}` does not resolve to a single entity")]
    NotAnEntity(String),
    #[error("generated collection `{base}` has no fixture named `{name}`")]
    MissingGenerated { base: String, name: String },
    #[error("dynamic reference at `{path}` has no model name in `{ref_path}`")]
    DynamicReference { path: String, ref_path: String },
    #[error("custom key must resolve to a string, got {0}")]
    InvalidKey(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("invalid pattern: {0}")]
    Pattern(#[from] regex::Error),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("{source} (while importing {chain})")]
    Fixture {
        id: String,
        chain: String,
        #[source]
        source: Box<ImportError>,
    },
}

impl ImportError {
    /// Strips `Fixture` breadcrumbs down to the underlying error.
    pub fn root_cause(&self) -> &ImportError {
        match self {
            ImportError::Fixture { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Conditions the resolver answers with a placeholder instead of failing.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self.root_cause(),
            ImportError::CircularReference(_) | ImportError::GeneratedConflict(_)
        )
    }
}

impl From<fixtura_core::Error> for ImportError {
    fn from(err: fixtura_core::Error) -> Self {
        match err {
            fixtura_core::Error::UnknownModel(name) => ImportError::UnknownModel(name),
            other => ImportError::InvalidSchema(other.to_string()),
        }
    }
}

pub type ImportResult<T> = std::result::Result<T, ImportError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recoverable_errors_survive_breadcrumbs() {
        let err = ImportError::Fixture {
            id: "users/admin".to_string(),
            chain: "users/admin".to_string(),
            source: Box::new(ImportError::CircularReference("a -> b -> a".to_string())),
        };
        assert!(err.is_recoverable());
        assert!(!ImportError::NotFound("users/ghost".to_string()).is_recoverable());
    }

    #[test]
    fn core_unknown_model_maps_to_import_error() {
        let err: ImportError = fixtura_core::Error::UnknownModel("Ghost".to_string()).into();
        assert!(matches!(err, ImportError::UnknownModel(name) if name == "Ghost"));
    }
}
