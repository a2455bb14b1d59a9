//! Answering calls: inbound INVITE handling and remote SDP application

use commlink_sdp_core::{sort_candidates, EncryptionLevel, SdpMedia, SdpMessage};

use crate::backend::{BackendCodec, MediaBackend};
use crate::call::{has_voice_call, Call, CallState, StreamOverlay};
use crate::config::MediaConfig;
use crate::error::{CallError, Result};
use crate::manager::{MediaManager, CALL_ERROR_TITLE};
use crate::signaling::{Dialog, SipMessage};
use crate::transfer::{FileTransfer, FtBody, FtMessage, FT_CONTENT_TYPE};

const ENCRYPTION_WARNING: &str = "308 lcs.microsoft.com \"Encryption Levels not compatible\"";

/// What applying a remote description did to the call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ApplyOutcome {
    /// At least one section is live
    Applied,
    /// Every offered section was refused; the call cannot continue
    AllFailed,
}

impl MediaManager {
    /// An INVITE arrived: a new call, or a re-INVITE on a known Call-ID
    pub fn on_invite(&mut self, message: &SipMessage) -> Result<()> {
        let call_id = message.call_id()?.to_string();
        let Some(sdp_text) = message.sdp_body() else {
            self.signaling.send_response(message, 488, "Not Acceptable Here", &[], None);
            return Err(CallError::MissingHeader { header: "Content-Type" });
        };

        let known_call = self.calls.contains_key(&call_id);
        // Raw body sniff, as deployed clients do: data calls bypass the
        // single-voice-call rule
        let is_data_invite = sdp_text.contains("m=data") || sdp_text.contains("m=applicationsharing");

        if !known_call {
            if !is_data_invite && has_voice_call(self.calls.values(), Some(&call_id)) {
                self.signaling.send_response(message, 486, "Busy Here", &[], None);
                return Ok(());
            }
            if message.from_uri().as_deref() == Some(self.config.self_uri.as_str()) {
                self.signaling.send_response(message, 488, "Not Acceptable Here", &[], None);
                return Ok(());
            }
        }

        let smsg = match SdpMessage::parse(&sdp_text) {
            Ok(smsg) => smsg,
            Err(e) => {
                self.signaling.send_response(message, 488, "Not Acceptable Here", &[], None);
                if known_call {
                    self.remove_call(&call_id, false);
                }
                return Err(e.into());
            }
        };

        if !known_call {
            let dialog = Dialog::from_invite(message)?;
            let mut call = Call::incoming(dialog, smsg.ice_version);
            call.local_accepted = false;
            self.calls.insert(call_id.clone(), call);
        }

        // The file-transfer publish rides the INVITE body next to the SDP
        let publish = message
            .part_of_type(FT_CONTENT_TYPE)
            .and_then(|xml| FtMessage::parse(&xml).ok());

        let mut added_transfer: Option<(String, u64)> = None;
        for section in &smsg.media {
            if section.port == 0 {
                continue;
            }
            let known = self
                .calls
                .get(&call_id)
                .map(|c| {
                    c.has_stream(&section.name)
                        || c.failed_media.iter().any(|f| f.name == section.name)
                })
                .unwrap_or(true);
            if known {
                continue;
            }
            let media_type = section.media_type();
            if let Err(e) = self.add_stream(&call_id, &section.name, media_type) {
                self.stream_creation_failed(&call_id, &e);
                return Err(e);
            }
            let Some(call) = self.calls.get_mut(&call_id) else { continue };
            let Some(stream) = call.stream_mut(&section.name) else { continue };
            match section.name.as_str() {
                "data" => {
                    stream.add_attribute("recvonly", "");
                    if let Some(FtMessage::Request {
                        request_id,
                        body: FtBody::PublishFile(info),
                    }) = &publish
                    {
                        let name = info.name.clone().unwrap_or_default();
                        let size = info.size.unwrap_or(0);
                        stream.overlay = StreamOverlay::FileTransfer(Box::new(
                            FileTransfer::receiver(info.clone(), *request_id),
                        ));
                        added_transfer = Some((name, size));
                    }
                }
                "applicationsharing" => {
                    stream.add_attribute("x-applicationsharing-session-id", "1");
                    stream.add_attribute("x-applicationsharing-role", "viewer");
                    stream.add_attribute("x-applicationsharing-media-type", "rdp");
                }
                _ => {}
            }
        }

        if let Some(call) = self.calls.get_mut(&call_id) {
            call.invite_msg = Some(message.clone());
            call.remote_message = Some(smsg);
            if call.dialog.remote_tag.is_none() {
                call.dialog.remote_tag = message.from_tag();
            }
        }

        if !known_call {
            self.signaling.send_response(message, 180, "Ringing", &[], None);
            let from = message.from_uri().unwrap_or_default();
            match &added_transfer {
                Some((name, size)) => self.host.incoming_file(&call_id, &from, name, *size),
                None => {
                    let with_video = sdp_text.contains("m=video");
                    if let Some(call) = self.calls.get_mut(&call_id) {
                        call.with_video = with_video;
                    }
                    self.host.incoming_call(&call_id, &from, with_video);
                }
            }
        }

        // Re-INVITEs on running calls have every stream initialised
        // already; fresh calls wait for the backend callbacks
        if self.calls.get(&call_id).is_some_and(|c| c.all_streams_initialized()) {
            self.apply_pending_remote(&call_id)?;
        }
        Ok(())
    }

    /// The peer acknowledged our answer
    pub fn on_ack(&mut self, message: &SipMessage) -> Result<()> {
        let call_id = message.call_id()?;
        let Some(call) = self.calls.get_mut(call_id) else { return Ok(()) };
        if !call.initiator && call.answer_sent && call.state == CallState::RemoteOffering {
            call.set_state(CallState::Established);
            let call_id = call_id.to_string();
            self.host.call_established(&call_id);
        }
        Ok(())
    }

    /// The caller gave up on a still-ringing INVITE
    pub fn on_cancel(&mut self, message: &SipMessage) -> Result<()> {
        let call_id = message.call_id()?.to_string();
        let Some(call) = self.calls.get_mut(&call_id) else { return Ok(()) };
        if call.state != CallState::RemoteOffering {
            return Ok(());
        }
        let invite = call.invite_msg.take();
        self.signaling.send_response(message, 200, "OK", &[], None);
        if let Some(invite) = invite {
            self.signaling.send_response(&invite, 487, "Request Terminated", &[], None);
        }
        self.backend.reject(&call_id);
        self.remove_call(&call_id, false);
        Ok(())
    }

    /// The peer hung up
    pub fn on_bye(&mut self, message: &SipMessage) -> Result<()> {
        let call_id = message.call_id()?.to_string();
        if self.calls.contains_key(&call_id) {
            self.remove_call(&call_id, false);
        }
        Ok(())
    }

    /// Apply a stored remote description and answer when possible
    pub(crate) fn apply_pending_remote(&mut self, call_id: &str) -> Result<()> {
        let pending = {
            let Some(call) = self.calls.get_mut(call_id) else { return Ok(()) };
            call.remote_message.take()
        };
        let Some(smsg) = pending else {
            return self.send_invite_response_if_ready(call_id);
        };
        let outcome = {
            let Self { config, backend, calls, .. } = self;
            let Some(call) = calls.get_mut(call_id) else { return Ok(()) };
            apply_remote_message(&mut **backend, config, call, smsg)
        };

        if outcome == ApplyOutcome::AllFailed {
            let invite = self.calls.get_mut(call_id).and_then(|c| c.invite_msg.take());
            if let Some(invite) = invite {
                self.signaling.send_response(&invite, 488, "Not Acceptable Here", &[], None);
            }
            self.backend.reject(call_id);
            self.remove_call(call_id, false);
            return Ok(());
        }
        self.send_invite_response_if_ready(call_id)
    }

    /// Send the single final answer once everything is in place
    ///
    /// Gated on the local side having accepted and every stream having
    /// initialised. An unresolvable encryption mismatch turns into the
    /// `488` with the warning header instead.
    pub(crate) fn send_invite_response_if_ready(&mut self, call_id: &str) -> Result<()> {
        let (ready, accepted, compatible) = {
            let Some(call) = self.calls.get(call_id) else { return Ok(()) };
            (
                call.all_streams_initialized()
                    && call.remote_message.is_none()
                    && call.invite_msg.is_some(),
                call.local_accepted,
                call.encryption_compatible,
            )
        };
        if !ready {
            return Ok(());
        }
        if !compatible {
            let invite = self.calls.get_mut(call_id).and_then(|c| c.invite_msg.take());
            if let Some(invite) = invite {
                self.signaling.send_response(
                    &invite,
                    488,
                    "Encryption Levels not compatible",
                    &[("Warning".to_string(), ENCRYPTION_WARNING.to_string())],
                    None,
                );
            }
            self.backend.reject(call_id);
            self.host.notify_error(
                CALL_ERROR_TITLE,
                "Encryption settings of the peer are incompatible with ours.",
            );
            self.remove_call(call_id, false);
            return Ok(());
        }
        if !accepted {
            return Ok(());
        }

        let Self { config, backend, signaling, calls, .. } = self;
        let Some(call) = calls.get_mut(call_id) else { return Ok(()) };
        let message = crate::manager::outbound::build_sdp_message(&**backend, config, call);
        let body = message.to_string();
        let contact = signaling.contact();
        let Some(invite) = call.invite_msg.take() else { return Ok(()) };
        signaling.send_response(
            &invite,
            200,
            "OK",
            &[("Contact".to_string(), contact)],
            Some(("application/sdp", &body)),
        );
        call.answer_sent = true;
        Ok(())
    }
}

/// Fold a remote description into the call and the backend
pub(crate) fn apply_remote_message(
    backend: &mut dyn MediaBackend,
    config: &MediaConfig,
    call: &mut Call,
    mut smsg: SdpMessage,
) -> ApplyOutcome {
    let call_id = call.id.clone();
    let effective = config.effective_encryption();

    // Fresh offer, fresh verdict
    call.encryption_compatible = true;
    if effective == EncryptionLevel::Required
        && smsg
            .media
            .iter()
            .any(|s| s.encryption_level() == Some(EncryptionLevel::Rejected))
    {
        call.encryption_compatible = false;
    }

    let mut applied = 0usize;
    let mut failed: Vec<SdpMedia> = Vec::new();
    let mut ended: Vec<String> = Vec::new();

    for section in smsg.media.drain(..) {
        if section.port == 0 {
            if call.has_stream(&section.name) {
                backend.end_stream(&call_id, &section.name);
                ended.push(section.name.clone());
            }
            continue;
        }
        let Some(stream) = call.stream_mut(&section.name) else {
            failed.push(section);
            continue;
        };

        let codecs: Vec<BackendCodec> = section.codecs.iter().map(BackendCodec::from_codec).collect();
        if !codecs.is_empty() && !backend.set_remote_codecs(&call_id, &section.name, &codecs) {
            tracing::warn!(call_id = %call_id, stream = %section.name, "backend refused every codec");
            backend.end_stream(&call_id, &section.name);
            ended.push(section.name.clone());
            failed.push(section);
            continue;
        }

        if let (Some(remote_key), Some(local_key)) = (&section.encryption_key, &stream.key) {
            backend.set_encryption_key(&call_id, &section.name, local_key);
            backend.set_decryption_key(&call_id, &section.name, remote_key, section.encryption_key_id);
            stream.remote_key_id = Some(section.encryption_key_id);
        }

        let mut candidates = section.candidates.clone();
        sort_candidates(&mut candidates);
        backend.set_remote_candidates(&call_id, &section.name, &candidates);

        if section.is_inactive() {
            if !stream.remotely_held {
                backend.set_held(&call_id, &section.name, true);
                stream.remotely_held = true;
            }
        } else if stream.remotely_held {
            backend.set_held(&call_id, &section.name, false);
            stream.remotely_held = false;
        }

        stream.remote_set = true;
        applied += 1;
    }

    for stream_id in ended {
        call.streams.retain(|s| s.id != stream_id);
    }
    for section in failed {
        if !call.failed_media.iter().any(|f| f.name == section.name) {
            call.failed_media.push(section);
        }
    }

    if applied == 0 && !call.failed_media.is_empty() {
        ApplyOutcome::AllFailed
    } else {
        ApplyOutcome::Applied
    }
}
