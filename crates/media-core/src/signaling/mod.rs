//! Signalling-facing types: dialogs, message views, and the outbound
//! capability surface

pub mod api;
pub mod dialog;
pub mod message;

pub use api::{InviteContext, SignalingApi};
pub use dialog::Dialog;
pub use message::{build_multipart, MessagePart, SipMessage};
