//! The per-session media manager
//!
//! One [`MediaManager`] exists per signed-in session and owns everything
//! that used to be process-global: the Call-ID registry, the MRAS
//! credentials, and the resolved relay list. Every entry point takes
//! `&mut self`; the host event loop is the only caller, so there is no
//! locking and reentrancy cannot be expressed.

mod events;
mod inbound;
mod outbound;
mod response;

use std::collections::HashMap;
use std::net::IpAddr;

use commlink_relay_core::{
    DnsQuery, DnsResolver, MrasRequest, MrasResponse, RelayCredentials, RelayList, RelayLocation,
};

use crate::backend::MediaBackend;
use crate::call::{has_voice_call, Call, CallState, StreamOverlay};
use crate::config::MediaConfig;
use crate::error::{CallError, Result};
use crate::host::HostApi;
use crate::signaling::{InviteContext, SignalingApi};
use crate::transfer::{FileInfo, FtBody, FtMessage, FT_CONTENT_TYPE};

/// Content type of the MRAS credential request
const MRAS_CONTENT_TYPE: &str = "application/msrtc-media-relay-auth+xml";

/// Title used for user-visible call failures
pub(crate) const CALL_ERROR_TITLE: &str = "Unable to establish a call";

/// The media call subsystem of one signed-in session
pub struct MediaManager {
    pub(crate) config: MediaConfig,
    pub(crate) backend: Box<dyn MediaBackend>,
    pub(crate) signaling: Box<dyn SignalingApi>,
    pub(crate) host: Box<dyn HostApi>,
    pub(crate) resolver: Box<dyn DnsResolver>,
    pub(crate) calls: HashMap<String, Call>,
    pub(crate) relay_credentials: Option<RelayCredentials>,
    pub(crate) relay_list: RelayList,
    pub(crate) mras_pending: bool,
}

impl MediaManager {
    /// Wire the subsystem to its host capabilities
    pub fn new(
        config: MediaConfig,
        backend: Box<dyn MediaBackend>,
        signaling: Box<dyn SignalingApi>,
        host: Box<dyn HostApi>,
        resolver: Box<dyn DnsResolver>,
    ) -> MediaManager {
        MediaManager {
            config,
            backend,
            signaling,
            host,
            resolver,
            calls: HashMap::new(),
            relay_credentials: None,
            relay_list: RelayList::default(),
            mras_pending: false,
        }
    }

    /// The session configuration
    pub fn config(&self) -> &MediaConfig {
        &self.config
    }

    /// Look a call up by Call-ID
    pub fn call(&self, call_id: &str) -> Option<&Call> {
        self.calls.get(call_id)
    }

    /// Number of registered calls
    pub fn call_count(&self) -> usize {
        self.calls.len()
    }

    /// True when any registered call carries an `audio` stream
    pub fn has_voice_call(&self) -> bool {
        has_voice_call(self.calls.values(), None)
    }

    /// Put a call on hold, or resume it
    ///
    /// A change of held state triggers exactly one re-INVITE carrying
    /// `a=inactive`; repeating the current state produces no wire output.
    pub fn set_held(&mut self, call_id: &str, held: bool) -> Result<()> {
        let mut changed = false;
        {
            let Self { backend, calls, .. } = self;
            let call = calls
                .get_mut(call_id)
                .ok_or_else(|| CallError::UnknownCall { call_id: call_id.to_string() })?;
            for stream in &mut call.streams {
                if stream.locally_held != held {
                    backend.set_held(call_id, &stream.id, held);
                    stream.locally_held = held;
                    changed = true;
                }
            }
            if changed && call.state == CallState::Established {
                call.set_state(CallState::Reinviting);
            }
        }
        if changed {
            self.send_invite_offer(call_id, InviteContext::CallResponse)?;
        }
        Ok(())
    }

    /// Accept a ringing inbound voice/video call
    pub fn accept_call(&mut self, call_id: &str) -> Result<()> {
        let call = self
            .calls
            .get_mut(call_id)
            .ok_or_else(|| CallError::UnknownCall { call_id: call_id.to_string() })?;
        call.local_accepted = true;
        self.backend.accept(call_id);
        self.send_invite_response_if_ready(call_id)
    }

    /// Accept an offered file transfer, storing into `sink`
    pub fn accept_file(&mut self, call_id: &str, sink: Box<dyn crate::transfer::FileSink>) -> Result<()> {
        let call = self
            .calls
            .get_mut(call_id)
            .ok_or_else(|| CallError::UnknownCall { call_id: call_id.to_string() })?;
        match call.transfer_mut() {
            Some(transfer) => transfer.attach_sink(sink),
            None => {
                return Err(CallError::Transfer { reason: "call carries no file transfer".to_string() })
            }
        }
        call.local_accepted = true;
        self.backend.accept(call_id);
        self.send_invite_response_if_ready(call_id)
    }

    /// Decline a ringing inbound call
    pub fn reject_call(&mut self, call_id: &str) -> Result<()> {
        let invite = {
            let call = self
                .calls
                .get_mut(call_id)
                .ok_or_else(|| CallError::UnknownCall { call_id: call_id.to_string() })?;
            call.invite_msg.take()
        };
        if let Some(invite) = invite {
            self.signaling.send_response(&invite, 603, "Decline", &[], None);
        }
        self.backend.reject(call_id);
        self.remove_call(call_id, false);
        Ok(())
    }

    /// Hang a call up
    pub fn hang_up(&mut self, call_id: &str) -> Result<()> {
        if !self.calls.contains_key(call_id) {
            return Err(CallError::UnknownCall { call_id: call_id.to_string() });
        }
        self.remove_call(call_id, true);
        Ok(())
    }

    /// Cancel a running file transfer; inbound data keeps draining until
    /// the peer hangs up
    pub fn cancel_transfer(&mut self, call_id: &str) -> Result<()> {
        let Self { signaling, calls, .. } = self;
        let call = calls
            .get_mut(call_id)
            .ok_or_else(|| CallError::UnknownCall { call_id: call_id.to_string() })?;
        let Call { dialog, streams, .. } = call;
        let transfer = streams
            .iter_mut()
            .find(|s| s.id == "data")
            .and_then(|s| match &mut s.overlay {
                StreamOverlay::FileTransfer(t) => Some(t),
                _ => None,
            })
            .ok_or_else(|| CallError::Transfer { reason: "call carries no file transfer".to_string() })?;

        let request_id = transfer.next_request_id();
        let cancel = FtMessage::Request {
            request_id,
            body: FtBody::CancelTransfer(FileInfo {
                id: transfer.file.id.clone(),
                name: None,
                size: None,
            }),
        };
        let xml = cancel.to_xml()?;
        transfer.cancel_local();
        let cseq = dialog.bump_cseq();
        signaling.send_info(dialog, cseq, FT_CONTENT_TYPE, &xml);
        Ok(())
    }

    /// Sign-out teardown
    ///
    /// Unanswered inbound calls get `480 Temporarily Unavailable`; every
    /// other call has its session closed. Backend media is always hung up.
    pub fn shutdown(&mut self) {
        let ids: Vec<String> = self.calls.keys().cloned().collect();
        for id in ids {
            if let Some(mut call) = self.calls.remove(&id) {
                call.set_state(CallState::Terminating);
                if !call.initiator && !call.answer_sent {
                    if let Some(invite) = call.invite_msg.take() {
                        self.signaling.send_response(
                            &invite,
                            480,
                            "Temporarily Unavailable",
                            &[],
                            None,
                        );
                    }
                } else {
                    self.signaling.close_session(&call.dialog);
                }
                self.backend.hang_up(&id);
                self.host.call_ended(&id);
            }
        }
        self.relay_list.cancel_pending(&mut *self.resolver);
    }

    /// Response to the MRAS service request
    pub fn on_mras_response(&mut self, status: u16, body: &str) {
        self.mras_pending = false;
        if !(200..300).contains(&status) {
            tracing::warn!(status, "MRAS request failed, continuing without relays");
            return;
        }
        match MrasResponse::parse(body) {
            Ok(response) => {
                tracing::info!(relays = response.relays.len(), "MRAS credentials issued");
                self.relay_credentials = Some(response.credentials);
                self.relay_list = RelayList::new(response.relays);
                self.relay_list.resolve_all(&mut *self.resolver);
                self.push_relays_if_ready();
            }
            Err(e) => {
                tracing::warn!(error = %e, "ignoring malformed MRAS response");
            }
        }
    }

    /// A DNS answer for a relay hostname arrived
    pub fn on_dns_resolved(&mut self, query: DnsQuery, address: Option<IpAddr>) {
        if self.relay_list.on_resolved(query, address) {
            self.push_relays_if_ready();
        }
    }

    /// Generic backend failure on a call
    pub fn on_backend_error(&mut self, call_id: &str, message: &str) {
        tracing::error!(call_id, message, "backend error");
        self.host.notify_error("Media error", message);
        if self.calls.contains_key(call_id) {
            self.remove_call(call_id, true);
        }
    }

    /// Request MRAS credentials when absent, expiring, and not in flight
    pub(crate) fn ensure_relay_credentials(&mut self) {
        let Some(mras_uri) = self.config.mras_uri.clone() else { return };
        if self.mras_pending {
            return;
        }
        if matches!(&self.relay_credentials, Some(c) if !c.needs_refresh()) {
            return;
        }
        let location = if self.config.remote_session {
            RelayLocation::Internet
        } else {
            RelayLocation::Intranet
        };
        let request = MrasRequest::new(&mras_uri, &self.config.self_uri, location);
        match request.to_xml() {
            Ok(xml) => {
                self.signaling.send_service(&mras_uri, MRAS_CONTENT_TYPE, &xml);
                self.mras_pending = true;
            }
            Err(e) => tracing::warn!(error = %e, "could not build MRAS request"),
        }
    }

    fn push_relays_if_ready(&mut self) {
        if self.relay_list.resolving() {
            return;
        }
        if let Some(credentials) = &self.relay_credentials {
            let usable = self.relay_list.usable();
            self.backend.set_media_relays(&usable, &credentials.username, &credentials.password);
        }
    }

    /// Drop a call from the registry, optionally closing its session
    pub(crate) fn remove_call(&mut self, call_id: &str, close_session: bool) {
        if let Some(mut call) = self.calls.remove(call_id) {
            call.set_state(CallState::Terminating);
            if close_session {
                self.signaling.close_session(&call.dialog);
            }
            self.backend.hang_up(call_id);
            call.set_state(CallState::Terminated);
            self.host.call_ended(call_id);
        }
    }
}
