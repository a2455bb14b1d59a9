//! Media call signalling for the commlink stack
//!
//! This crate is the stateful heart of the Communicator/Lync media
//! subsystem: it owns the Call-ID registry, runs the INVITE/response/ACK
//! state machine with its ICE-version and encryption recovery paths, keeps
//! the MRAS relay state, and carries the Lync file-transfer overlay on top
//! of the same call substrate.
//!
//! Everything environmental is a capability trait the host implements:
//! [`MediaBackend`] for the media engine, [`SignalingApi`] for the dialog
//! layer, [`HostApi`] for user-visible notifications, and the DNS resolver
//! from `commlink-relay-core`. The [`MediaManager`] is driven exclusively
//! from the host event loop through `&mut self` entry points; there is no
//! interior threading and no locking.
//!
//! ```no_run
//! # use commlink_media_core::*;
//! # fn demo(backend: Box<dyn MediaBackend>, signaling: Box<dyn SignalingApi>,
//! #         host: Box<dyn HostApi>, resolver: Box<dyn commlink_relay_core::DnsResolver>) {
//! let config = MediaConfig::new("sip:alice@contoso.com");
//! let mut manager = MediaManager::new(config, backend, signaling, host, resolver);
//! manager.connect_call("sip:bob@contoso.com", false).unwrap();
//! # }
//! ```

pub mod backend;
pub mod call;
pub mod conference;
pub mod config;
pub mod encryption;
pub mod error;
pub mod host;
pub mod manager;
pub mod signaling;
pub mod transfer;

pub use backend::{BackendCodec, MediaBackend};
pub use call::{Call, CallState, Stream, StreamOverlay};
pub use config::{MediaConfig, PortRange};
pub use encryption::EncryptionPolicy;
pub use error::{CallError, Result};
pub use host::HostApi;
pub use manager::MediaManager;
pub use signaling::{InviteContext, SignalingApi, SipMessage};
pub use transfer::{FileSink, FileSource};
