//! Error taxonomy of image resolution.
//!
//! Every failure of the resolution pipeline is one of three variants. The two
//! client-facing outcomes ([`Error::NotFound`], [`Error::NotAllowed`]) carry the
//! offending path; everything else is [`Error::Internal`] with the underlying
//! cause attached so it can be logged in full.

use std::path::{Path, PathBuf};

/// Common error type for picserve.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No filesystem entry exists at the requested path.
    #[error("not found: {}", path.display())]
    NotFound {
        /// The path as requested by the client.
        path: PathBuf,
    },

    /// The requested path is outside the allow-list or escapes the image root.
    #[error("not allowed: {}: {reason}", path.display())]
    NotAllowed {
        /// The path as requested by the client.
        path: PathBuf,
        /// Short, client-safe explanation.
        reason: String,
    },

    /// A filesystem or conversion failure.
    #[error("{context}: {source}")]
    Internal {
        /// What was being attempted.
        context: String,
        /// The underlying failure.
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl Error {
    /// Create a new NotFound error.
    pub fn not_found(path: impl AsRef<Path>) -> Self {
        Self::NotFound {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Create a new NotAllowed error.
    pub fn not_allowed(path: impl AsRef<Path>, reason: impl Into<String>) -> Self {
        Self::NotAllowed {
            path: path.as_ref().to_path_buf(),
            reason: reason.into(),
        }
    }

    /// Create a new Internal error wrapping `source`.
    pub fn internal(
        context: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::Internal {
            context: context.into(),
            source: source.into(),
        }
    }

    /// Map this error to an HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            Error::NotFound { .. } => 404,
            Error::NotAllowed { .. } => 403,
            Error::Internal { .. } => 500,
        }
    }

    /// Whether the error is an expected, client-facing outcome.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, Error::Internal { .. })
    }
}

/// Result type alias using the common Error type.
pub type Result<T> = std::result::Result<T, Error>;
