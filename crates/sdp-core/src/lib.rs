//! SDP model and codec for the commlink media stack
//!
//! This crate owns the wire form of the session descriptions exchanged in
//! Communicator/Lync media calls: media sections, payload formats, ICE
//! candidates in both deployed dialects, and the SRTP key attribute. It is
//! deliberately free of call state; the signalling layer in
//! `commlink-media-core` decides what to put into a message and what to do
//! with a parsed one.
//!
//! Interoperability quirks of real deployments live here too, next to the
//! types they affect: payload-id de-duplication, the IPv6 candidate filter,
//! and the mistagged-TCP candidate workaround.

pub mod candidate;
pub mod codec;
pub mod error;
pub mod message;
pub mod parser;

pub use candidate::{
    normalize_candidates, select_media_address, sort_candidates, Candidate, CandidateComponent,
    CandidateKind, CandidateProtocol, IceVersion, MediaAddress,
};
pub use codec::{insert_codec, Codec, MediaType};
pub use error::{Result, SdpError};
pub use message::{EncryptionLevel, SdpAttribute, SdpMedia, SdpMessage, SRTP_KEY_LEN};
