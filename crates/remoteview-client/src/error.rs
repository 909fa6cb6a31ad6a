use thiserror::Error;

/// Errors constructing a [`crate::RestSessionService`].
#[derive(Debug, Error)]
pub enum ClientError {
    /// The HTTP client could not be built (TLS backend setup).
    #[error("failed to build HTTP client: {0}")]
    Build(#[from] reqwest::Error),
}
