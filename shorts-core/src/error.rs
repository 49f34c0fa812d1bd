/// Errors produced by the title library, its caches and its remote store.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The remote store could not be reached, answered with a failure, or
    /// did not answer within the configured timeout.
    #[error("Remote store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("Not found: {0}")]
    NotFound(String),
    /// Only produced by the strict insertion path; `add` and `bulk_add`
    /// report duplicates through their return values instead.
    #[error("Title already used in channel {channel}: {title}")]
    DuplicateTitle { channel: String, title: String },
    #[error("Already exists: {0}")]
    AlreadyExists(String),
    #[error("Content generation failed: {0}")]
    GeneratorFailure(String),
    #[error("Invalid configuration: {0}")]
    ConfigError(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Unexpected payload shape: {0}")]
    InvalidPayload(String),
    #[error("Invalid status transition: {0}")]
    InvalidTransition(String),
    #[error("Malformed payload: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Failures the caller should surface with a retry affordance.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::StoreUnavailable(_) | Error::GeneratorFailure(_))
    }
}

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Error::ConfigError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(Error::StoreUnavailable("timeout".to_string()).is_retryable());
        assert!(Error::GeneratorFailure("empty".to_string()).is_retryable());
        assert!(!Error::NotFound("users.json".to_string()).is_retryable());
        assert!(!Error::ConfigError("ttl".to_string()).is_retryable());
    }
}
