//! Error types for the media call subsystem
//!
//! Peer-visible failures (declined calls, protocol mismatches) are surfaced
//! to the host through [`HostApi::notify_error`](crate::host::HostApi) with
//! a user-facing title and body; the variants here cover what the API
//! itself can return to its callers.

use commlink_sdp_core::SdpError;
use thiserror::Error;

/// Result type for call operations
pub type Result<T> = std::result::Result<T, CallError>;

/// Errors returned by the media call entry points
#[derive(Debug, Error)]
pub enum CallError {
    /// A second voice call was requested while one is active
    #[error("a voice call is already in progress")]
    VoiceCallInProgress,

    /// The Call-ID does not match any registered call
    #[error("no call with id {call_id}")]
    UnknownCall {
        /// The unmatched Call-ID
        call_id: String,
    },

    /// The backend could not create a media stream
    #[error("unable to create media stream {stream_id}: {reason}")]
    StreamCreation {
        /// Stream that failed
        stream_id: String,
        /// Backend-reported reason
        reason: String,
    },

    /// A SIP message was missing a header the state machine needs
    #[error("message is missing the {header} header")]
    MissingHeader {
        /// The absent header
        header: &'static str,
    },

    /// An SDP body could not be decoded
    #[error("malformed SDP: {source}")]
    Sdp {
        /// The underlying parse failure
        #[source]
        source: SdpError,
    },

    /// Local and remote encryption requirements cannot be reconciled
    #[error("encryption levels are not compatible")]
    EncryptionIncompatible,

    /// The conference focus does not advertise audio/video support
    #[error("the conference does not support audio/video")]
    ConferenceUnsupported,

    /// A feature was used that the account has no provisioning for
    #[error("{what} is not provisioned for this account")]
    NotProvisioned {
        /// What is missing, e.g. "audio test service"
        what: &'static str,
    },

    /// A file-transfer control or data plane violation
    #[error("file transfer error: {reason}")]
    Transfer {
        /// What went wrong
        reason: String,
    },

    /// The backend reported a failure
    #[error("media backend error: {reason}")]
    Backend {
        /// Backend-reported reason
        reason: String,
    },
}

impl From<SdpError> for CallError {
    fn from(source: SdpError) -> CallError {
        CallError::Sdp { source }
    }
}
