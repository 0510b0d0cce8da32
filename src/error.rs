/// Centralized error types for history-replay using thiserror
///
/// Each concern gets its own enum; `ReplayError` folds them together so the
/// engine and the binary can propagate with `?`.
use thiserror::Error;

/// Main error type for a reconstruction run
#[derive(Error, Debug)]
pub enum ReplayError {
    #[error("Source repository error: {0}")]
    Source(#[from] SourceError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Resolution error: {0}")]
    Resolve(#[from] ResolveError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Review tracker error: {0}")]
    Review(#[from] ReviewError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

/// Errors raised by the source repository collaborator
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    /// Concurrent access on the server side; the same request may succeed later
    #[error("Transient conflict while reading item {item}: {reason}")]
    TransientConflict { item: i32, reason: String },

    #[error("Item not found: {0}")]
    NotFound(i32),

    #[error("Recycle bin is not supported by this source")]
    RecycleBinUnsupported,

    #[error("Gave up on revision {version} of '{path}' after {attempts} attempts")]
    RetriesExhausted {
        path: String,
        version: i32,
        attempts: u32,
    },

    #[error("Property population failed: {0}")]
    PopulateFailed(String),
}

/// Errors related to the persisted registration store
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Failed to load registry from '{path}': {reason}")]
    LoadFailed { path: String, reason: String },

    #[error("Failed to save registry to '{path}': {reason}")]
    SaveFailed { path: String, reason: String },

    #[error("Branch '{0}' is locked by another run")]
    BranchLocked(String),
}

/// Errors raised while mapping items back to target paths
#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("Parent hierarchy of '{path}' never reaches root folder '{root}'")]
    AmbiguousParent { path: String, root: String },
}

/// Errors related to configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration file: {0}")]
    LoadFailed(String),

    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),

    #[error("Invalid configuration value for '{key}': {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("Failed to save configuration: {0}")]
    SaveFailed(String),

    #[error("Configuration file not found: {0}")]
    FileNotFound(String),
}

/// Errors related to review tracker lookups
#[derive(Error, Debug)]
pub enum ReviewError {
    #[error("Request to '{url}' failed: {reason}")]
    RequestFailed { url: String, reason: String },

    #[error("Unexpected review response: {0}")]
    InvalidResponse(String),
}

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, ReplayError>;

impl From<anyhow::Error> for ReplayError {
    fn from(err: anyhow::Error) -> Self {
        ReplayError::Other(format!("{:#}", err))
    }
}

impl ReplayError {
    /// Check if the same operation may succeed when retried
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ReplayError::Source(SourceError::TransientConflict { .. }) | ReplayError::Io(_)
        )
    }
}

impl SourceError {
    pub fn is_transient(&self) -> bool {
        matches!(self, SourceError::TransientConflict { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ReplayError::Resolve(ResolveError::AmbiguousParent {
            path: "a/b.txt".to_string(),
            root: "Root".to_string(),
        });
        assert_eq!(
            err.to_string(),
            "Resolution error: Parent hierarchy of 'a/b.txt' never reaches root folder 'Root'"
        );
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: ReplayError = io_err.into();
        assert!(matches!(err, ReplayError::Io(_)));
    }

    #[test]
    fn test_error_from_anyhow() {
        let err: ReplayError = anyhow::anyhow!("test error").into();
        assert!(matches!(err, ReplayError::Other(_)));
        assert_eq!(err.to_string(), "test error");
    }

    #[test]
    fn test_is_retryable() {
        let transient = ReplayError::Source(SourceError::TransientConflict {
            item: 7,
            reason: "locked".to_string(),
        });
        assert!(transient.is_retryable());

        let exhausted = ReplayError::Source(SourceError::RetriesExhausted {
            path: "a.txt".to_string(),
            version: 3,
            attempts: 5,
        });
        assert!(!exhausted.is_retryable());
    }

    #[test]
    fn test_retries_exhausted_display() {
        let err = SourceError::RetriesExhausted {
            path: "src/main.c".to_string(),
            version: 4,
            attempts: 8,
        };
        assert_eq!(
            err.to_string(),
            "Gave up on revision 4 of 'src/main.c' after 8 attempts"
        );
    }

    #[test]
    fn test_source_error_is_transient() {
        assert!(
            SourceError::TransientConflict {
                item: 1,
                reason: String::new()
            }
            .is_transient()
        );
        assert!(!SourceError::NotFound(1).is_transient());
        assert!(!SourceError::RecycleBinUnsupported.is_transient());
    }

    #[test]
    fn test_config_error_invalid_value() {
        let err = ConfigError::InvalidValue {
            key: "retry.max_attempts".to_string(),
            reason: "must be greater than 0".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid configuration value for 'retry.max_attempts': must be greater than 0"
        );
    }

    #[test]
    fn test_registry_error_chain() {
        let err: ReplayError = RegistryError::BranchLocked("main".to_string()).into();
        assert_eq!(
            err.to_string(),
            "Registry error: Branch 'main' is locked by another run"
        );
    }
}
