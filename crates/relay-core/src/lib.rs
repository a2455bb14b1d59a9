//! MRAS media-relay client for the commlink media stack
//!
//! Communicator/Lync servers hand out short-lived media-relay credentials
//! through the MRAS service. This crate builds the credential request,
//! decodes the response, and keeps the relay list while the host resolves
//! each relay hostname. Transport is someone else's problem: the caller
//! sends the request over its SIP service channel and feeds the response
//! body back in.

pub mod error;
pub mod list;
pub mod mras;

pub use error::{RelayError, Result};
pub use list::{DnsQuery, DnsResolver, MediaRelay, RelayList};
pub use mras::{MrasRequest, MrasResponse, RelayCredentials, RelayLocation, REQUESTED_DURATION_SECS};
