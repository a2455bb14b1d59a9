//! Call and stream records
//!
//! A call is one media session with one remote party, indexed process-wide
//! by its Call-ID. Streams are the per-media-section state within it.
//! Overlays (currently only file transfer) attach their state to a stream
//! through the [`StreamOverlay`] tag instead of an opaque pointer, so the
//! call itself never needs to know what is inside.

use commlink_sdp_core::{EncryptionLevel, IceVersion, MediaType, SdpAttribute, SdpMedia, SdpMessage};

use crate::signaling::dialog::Dialog;
use crate::signaling::message::{MessagePart, SipMessage};
use crate::transfer::FileTransfer;

/// Lifecycle states of a call
///
/// ```text
/// Idle → LocalOffering ─┐           ┌─→ Reinviting ─┐
///   │                   ├─→ Established ←───────────┘
///   └─→ RemoteOffering ─┘           └─→ Terminating → Terminated
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    /// Created, streams still initialising
    Idle,
    /// Outbound INVITE sent, awaiting the response
    LocalOffering,
    /// Inbound INVITE ringing, awaiting local answer and stream readiness
    RemoteOffering,
    /// Media committed on both sides
    Established,
    /// Re-INVITE in flight (hold/unhold)
    Reinviting,
    /// Teardown started
    Terminating,
    /// Gone; the record leaves the registry right after
    Terminated,
}

/// Overlay state attached to a stream
#[derive(Debug, Default)]
pub enum StreamOverlay {
    /// Plain media stream
    #[default]
    None,
    /// Lync file transfer riding on a `data` stream
    FileTransfer(Box<FileTransfer>),
}

/// One media direction-pair inside a call
#[derive(Debug)]
pub struct Stream {
    /// SDP section name: `audio`, `video`, `data`, `applicationsharing`
    pub id: String,
    /// Media classification
    pub media_type: MediaType,
    /// Our 30-byte SRTP key, when the policy allows one
    pub key: Option<Vec<u8>>,
    /// Key id we advertise with our key
    pub key_id: u32,
    /// Key id the peer advertised with theirs
    pub remote_key_id: Option<u32>,
    /// True once the peer's codecs and candidates have been applied
    pub remote_set: bool,
    /// True once the backend reported the stream ready
    pub initialized: bool,
    /// Held by us
    pub locally_held: bool,
    /// Held by the peer
    pub remotely_held: bool,
    /// Extra SDP attributes emitted verbatim, in insertion order
    pub attributes: Vec<SdpAttribute>,
    /// Overlay state
    pub overlay: StreamOverlay,
}

impl Stream {
    /// A fresh stream, nothing negotiated yet
    pub fn new(id: &str, media_type: MediaType) -> Stream {
        Stream {
            id: id.to_string(),
            media_type,
            key: None,
            key_id: 1,
            remote_key_id: None,
            remote_set: false,
            initialized: false,
            locally_held: false,
            remotely_held: false,
            attributes: Vec::new(),
            overlay: StreamOverlay::None,
        }
    }

    /// Attach an extra SDP attribute
    pub fn add_attribute(&mut self, name: &str, value: &str) {
        self.attributes.push(SdpAttribute::new(name, value));
    }

    /// Whether SRTP is actually in force on this stream
    ///
    /// True iff a local key exists, the call's compatibility flag is set,
    /// the remote side has been applied, and the policy is not `rejected`.
    pub fn encryption_active(&self, encryption_compatible: bool, level: EncryptionLevel) -> bool {
        self.key.is_some()
            && encryption_compatible
            && self.remote_set
            && level != EncryptionLevel::Rejected
    }
}

/// One media call
#[derive(Debug)]
pub struct Call {
    /// The SIP Call-ID, also the registry key
    pub id: String,
    /// Remote party URI (possibly an `app:conf:audio-video:` focus)
    pub with: String,
    /// Dialog fields we own
    pub dialog: Dialog,
    /// Lifecycle state
    pub state: CallState,
    /// Negotiated ICE dialect
    pub ice_version: IceVersion,
    /// True when we placed the call
    pub initiator: bool,
    /// Video was requested; retries preserve this choice
    pub with_video: bool,
    /// Call targets the audio test bot
    pub test_call: bool,
    /// Cleared when a remote `rejected` meets a local `required`
    pub encryption_compatible: bool,
    /// Retained inbound INVITE; taken when the single final response goes out
    pub invite_msg: Option<SipMessage>,
    /// Extra body parts staged for the next outbound INVITE
    pub extra_invite_parts: Vec<MessagePart>,
    /// Last-received remote SDP, pending application
    pub remote_message: Option<SdpMessage>,
    /// Live streams
    pub streams: Vec<Stream>,
    /// Sections we refused; echoed back with port 0 for the rest of the call
    pub failed_media: Vec<SdpMedia>,
    /// Local side has accepted (always true for calls we place)
    pub local_accepted: bool,
    /// The final answer to the inbound INVITE has been sent
    pub answer_sent: bool,
    /// The candidate-commit re-offer has been sent
    pub final_offer_sent: bool,
}

impl Call {
    /// A call we originate
    pub fn outgoing(call_id: &str, with: &str, ice_version: IceVersion, with_video: bool) -> Call {
        Call {
            id: call_id.to_string(),
            with: with.to_string(),
            dialog: Dialog::outgoing(call_id, with),
            state: CallState::Idle,
            ice_version,
            initiator: true,
            with_video,
            test_call: false,
            encryption_compatible: true,
            invite_msg: None,
            extra_invite_parts: Vec::new(),
            remote_message: None,
            streams: Vec::new(),
            failed_media: Vec::new(),
            local_accepted: true,
            answer_sent: false,
            final_offer_sent: false,
        }
    }

    /// A call created from an inbound INVITE
    pub fn incoming(dialog: Dialog, ice_version: IceVersion) -> Call {
        Call {
            id: dialog.call_id.clone(),
            with: dialog.with.clone(),
            dialog,
            state: CallState::RemoteOffering,
            ice_version,
            initiator: false,
            with_video: false,
            test_call: false,
            encryption_compatible: true,
            invite_msg: None,
            extra_invite_parts: Vec::new(),
            remote_message: None,
            streams: Vec::new(),
            failed_media: Vec::new(),
            local_accepted: false,
            answer_sent: false,
            final_offer_sent: false,
        }
    }

    /// Find a stream by id
    pub fn stream(&self, id: &str) -> Option<&Stream> {
        self.streams.iter().find(|s| s.id == id)
    }

    /// Find a stream by id, mutably
    pub fn stream_mut(&mut self, id: &str) -> Option<&mut Stream> {
        self.streams.iter_mut().find(|s| s.id == id)
    }

    /// True when a stream with this id exists
    pub fn has_stream(&self, id: &str) -> bool {
        self.stream(id).is_some()
    }

    /// All streams have reported initialisation
    pub fn all_streams_initialized(&self) -> bool {
        self.streams.iter().all(|s| s.initialized)
    }

    /// A data-bearing call (file transfer or application sharing)
    pub fn is_data_call(&self) -> bool {
        self.has_stream("data") || self.has_stream("applicationsharing")
    }

    /// The file-transfer overlay of the data stream, if any
    pub fn transfer_mut(&mut self) -> Option<&mut FileTransfer> {
        match self.stream_mut("data").map(|s| &mut s.overlay) {
            Some(StreamOverlay::FileTransfer(transfer)) => Some(transfer.as_mut()),
            _ => None,
        }
    }

    /// Transition to a new lifecycle state
    pub fn set_state(&mut self, state: CallState) {
        if self.state != state {
            tracing::debug!(call_id = %self.id, from = ?self.state, to = ?state, "call state change");
            self.state = state;
        }
    }
}

/// Linear scan answering "is there already a voice call?"
pub fn has_voice_call<'a>(
    calls: impl Iterator<Item = &'a Call>,
    excluding: Option<&str>,
) -> bool {
    calls
        .filter(|call| excluding != Some(call.id.as_str()))
        .any(|call| call.has_stream("audio"))
}
