//! Error types for the media-relay client

use thiserror::Error;

/// Result type for relay operations
pub type Result<T> = std::result::Result<T, RelayError>;

/// Errors raised while requesting or decoding MRAS credentials
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RelayError {
    /// XML could not be produced or decoded
    #[error("MRAS XML error: {0}")]
    Xml(String),

    /// The server answered with a non-OK reason phrase
    #[error("MRAS request rejected: {reason}")]
    Rejected {
        /// The `reasonPhrase` the server returned
        reason: String,
    },

    /// The response parsed but carried no credentials
    #[error("MRAS response carries no credentials")]
    MissingCredentials,
}
