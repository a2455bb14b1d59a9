//! Error types for SDP parsing and serialization

use thiserror::Error;

/// Result type for SDP operations
pub type Result<T> = std::result::Result<T, SdpError>;

/// Errors raised while decoding SDP bodies
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SdpError {
    /// A line did not match the `<type>=<value>` shape
    #[error("malformed SDP line: {line}")]
    MalformedLine {
        /// The offending line, verbatim
        line: String,
    },

    /// A field inside an otherwise well-formed line could not be decoded
    #[error("invalid {item} in SDP: {value}")]
    InvalidField {
        /// What was being parsed (e.g. "candidate port")
        item: &'static str,
        /// The offending token
        value: String,
    },

    /// The message contained no `m=` section at all
    #[error("SDP message carries no media sections")]
    NoMediaSections,
}
