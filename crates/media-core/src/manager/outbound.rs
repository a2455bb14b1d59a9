//! Placing calls: stream setup, SDP offers, and the INVITE itself

use commlink_sdp_core::{
    insert_codec, normalize_candidates, select_media_address, sort_candidates, EncryptionLevel,
    IceVersion, MediaType, SdpMedia, SdpMessage, SRTP_KEY_LEN,
};
use rand::rngs::OsRng;
use rand::RngCore;
use uuid::Uuid;

use crate::backend::MediaBackend;
use crate::call::{Call, CallState, Stream, StreamOverlay};
use crate::conference;
use crate::config::MediaConfig;
use crate::error::{CallError, Result};
use crate::manager::{MediaManager, CALL_ERROR_TITLE};
use crate::signaling::{build_multipart, InviteContext, MessagePart};
use crate::transfer::{FileInfo, FileSource, FileTransfer, FtBody, FtMessage, FT_CONTENT_TYPE};

impl MediaManager {
    /// Place a voice (optionally video) call
    ///
    /// Refused outright while another call holds an `audio` stream; no SIP
    /// traffic is generated in that case.
    pub fn connect_call(&mut self, with: &str, with_video: bool) -> Result<String> {
        self.start_call(with, with_video, IceVersion::Rfc5245, false)
    }

    /// Place a call to the provisioned audio test bot
    pub fn connect_test_call(&mut self) -> Result<String> {
        let Some(bot_uri) = self.config.test_call_uri.clone() else {
            return Err(CallError::NotProvisioned { what: "audio test service" });
        };
        self.start_call(&bot_uri, false, IceVersion::Rfc5245, true)
    }

    /// Join the audio/video part of a conference
    ///
    /// The A/V focus URI is derived from the chat session id; refusal when
    /// the conference advertises no focus is surfaced to the host.
    pub fn connect_conference(&mut self, session_uri: &str) -> Result<String> {
        let Some(av_uri) = conference::audio_video_uri(session_uri) else {
            self.host.notify_error(
                CALL_ERROR_TITLE,
                "This conference does not support audio/video.",
            );
            return Err(CallError::ConferenceUnsupported);
        };
        let ice_version = conference::ice_version(&self.config);
        self.start_call(&av_uri, false, ice_version, false)
    }

    /// Offer a file to a peer over a Lync file-transfer call
    pub fn send_file(
        &mut self,
        with: &str,
        file_name: &str,
        file_size: u64,
        source: Box<dyn FileSource>,
    ) -> Result<String> {
        self.ensure_relay_credentials();
        let call_id = generate_call_id();
        let mut call = Call::outgoing(&call_id, with, IceVersion::Rfc5245, false);

        let file = FileInfo {
            id: generate_file_id(),
            name: Some(file_name.to_string()),
            size: Some(file_size),
        };
        let transfer = FileTransfer::sender(file.clone(), source);
        let publish = FtMessage::Request {
            request_id: transfer.publish_request_id,
            body: FtBody::PublishFile(file),
        };
        call.extra_invite_parts.push(MessagePart::new(FT_CONTENT_TYPE, &publish.to_xml()?));
        self.calls.insert(call_id.clone(), call);

        if let Err(e) = self.add_stream(&call_id, "data", MediaType::Application) {
            self.stream_creation_failed(&call_id, &e);
            return Err(e);
        }
        if let Some(call) = self.calls.get_mut(&call_id) {
            if let Some(stream) = call.stream_mut("data") {
                stream.add_attribute("sendonly", "");
                stream.overlay = StreamOverlay::FileTransfer(Box::new(transfer));
            }
        }
        Ok(call_id)
    }

    /// Shared outbound call setup
    pub(crate) fn start_call(
        &mut self,
        with: &str,
        with_video: bool,
        ice_version: IceVersion,
        test_call: bool,
    ) -> Result<String> {
        if crate::call::has_voice_call(self.calls.values(), None) {
            self.host.notify_error(
                CALL_ERROR_TITLE,
                "You are already in a call. Hang it up before placing another.",
            );
            return Err(CallError::VoiceCallInProgress);
        }
        self.ensure_relay_credentials();

        let call_id = generate_call_id();
        let mut call = Call::outgoing(&call_id, with, ice_version, with_video);
        call.test_call = test_call;
        self.calls.insert(call_id.clone(), call);

        if let Err(e) = self.add_stream(&call_id, "audio", MediaType::Audio) {
            self.stream_creation_failed(&call_id, &e);
            return Err(e);
        }
        if with_video {
            if let Err(e) = self.add_stream(&call_id, "video", MediaType::Video) {
                self.stream_creation_failed(&call_id, &e);
                return Err(e);
            }
        }
        Ok(call_id)
    }

    /// Create one stream: backend gathering plus the local record
    pub(crate) fn add_stream(
        &mut self,
        call_id: &str,
        stream_id: &str,
        media_type: MediaType,
    ) -> Result<()> {
        let Self { config, backend, calls, .. } = self;
        let call = calls
            .get_mut(call_id)
            .ok_or_else(|| CallError::UnknownCall { call_id: call_id.to_string() })?;

        let ports = config.ports_for_stream(stream_id);
        backend
            .create_stream(call_id, stream_id, media_type, call.ice_version, ports)
            .map_err(|e| CallError::StreamCreation {
                stream_id: stream_id.to_string(),
                reason: e.to_string(),
            })?;
        if call.streams.is_empty() {
            backend.set_cname(call_id, &config.cname());
        }

        let mut stream = Stream::new(stream_id, media_type);
        if config.effective_encryption() != EncryptionLevel::Rejected {
            stream.key = Some(generate_srtp_key());
        }
        call.streams.push(stream);
        Ok(())
    }

    /// Serialise the current local state and send the INVITE
    pub(crate) fn send_invite_offer(&mut self, call_id: &str, context: InviteContext) -> Result<()> {
        let Self { config, backend, signaling, calls, .. } = self;
        let call = calls
            .get_mut(call_id)
            .ok_or_else(|| CallError::UnknownCall { call_id: call_id.to_string() })?;

        let message = build_sdp_message(&**backend, config, call);
        let sdp = message.to_string();

        let (content_type, body) = if !call.extra_invite_parts.is_empty() {
            let mut parts = call.extra_invite_parts.clone();
            parts.push(MessagePart::new("application/sdp", &sdp));
            build_multipart("mixed", &parts)
        } else if call.dialog.cseq == 0
            && call.ice_version == IceVersion::Rfc5245
            && !call.test_call
        {
            // First-time ICEv19 offers carry a minimal alternative so 2007
            // era proxies still find an SDP they can parse
            let parts = [
                MessagePart::new("application/sdp", &sdp),
                MessagePart::new("application/sdp", &legacy_fallback_sdp(&message.origin_ip)),
            ];
            build_multipart("alternative", &parts)
        } else {
            ("application/sdp".to_string(), sdp)
        };

        let mut headers = vec![
            ("Contact".to_string(), signaling.contact()),
            ("ms-keep-alive".to_string(), "UAC;hop-hop=yes".to_string()),
        ];
        if let Some(line_uri) = &config.line_uri {
            headers.push(("P-Preferred-Identity".to_string(), format!("<{}>", line_uri)));
        }

        let cseq = call.dialog.bump_cseq();
        signaling.send_invite(&call.dialog, cseq, &headers, &content_type, &body, context);
        if call.state == CallState::Idle {
            call.set_state(CallState::LocalOffering);
        }
        Ok(())
    }

    pub(crate) fn stream_creation_failed(&mut self, call_id: &str, error: &CallError) {
        self.host.notify_error("Unable to create media stream", &error.to_string());
        self.remove_call(call_id, false);
    }
}

/// Serialise a call's local view into an SDP message
pub(crate) fn build_sdp_message(
    backend: &dyn MediaBackend,
    config: &MediaConfig,
    call: &Call,
) -> SdpMessage {
    let effective = config.effective_encryption();
    let mut message = SdpMessage::new("", call.ice_version);

    for stream in &call.streams {
        let mut section = SdpMedia::new(&stream.id);

        let mut candidates = normalize_candidates(backend.local_candidates(&call.id, &stream.id));
        sort_candidates(&mut candidates);
        match select_media_address(&candidates) {
            Some(address) => {
                section.ip = address.ip;
                section.port = address.rtp_port;
                if let Some(rtcp_port) = address.rtcp_port {
                    if rtcp_port != address.rtp_port {
                        section.add_attribute("rtcp", &rtcp_port.to_string());
                    }
                }
            }
            None => section.ip = backend.network_ip().unwrap_or_default(),
        }
        section.candidates = candidates;

        let remote_active: Vec<_> = backend
            .active_remote_candidates(&call.id, &stream.id)
            .into_iter()
            .filter(|c| !c.ip.contains(':'))
            .collect();
        if call.ice_version == IceVersion::Rfc5245 && !remote_active.is_empty() {
            section.remote_candidates = remote_active;
        }

        for codec in backend.local_codecs(&call.id, &stream.id) {
            insert_codec(&mut section.codecs, codec.to_codec());
        }

        if effective != config.server_encryption_level {
            section.add_attribute("encryption", effective.as_str());
        }
        if effective != EncryptionLevel::Rejected {
            if let Some(key) = &stream.key {
                section.encryption_key = Some(key.clone());
                section.encryption_key_id = stream.key_id;
                section.encryption_active =
                    stream.encryption_active(call.encryption_compatible, effective);
            }
        }
        if stream.locally_held {
            section.add_attribute("inactive", "");
        }
        for attribute in &stream.attributes {
            section.attributes.push(attribute.clone());
        }

        message.media.push(section);
    }

    // Refused sections come back on every message with port 0
    for failed in &call.failed_media {
        let mut section = failed.clone();
        section.port = 0;
        section.candidates.clear();
        section.remote_candidates.clear();
        section.encryption_key = None;
        message.media.push(section);
    }

    message.origin_ip = message
        .media
        .iter()
        .find(|s| !s.ip.is_empty())
        .map(|s| s.ip.clone())
        .or_else(|| backend.network_ip())
        .unwrap_or_else(|| "0.0.0.0".to_string());

    message
}

fn legacy_fallback_sdp(ip: &str) -> String {
    format!(
        "v=0\r\no=- 0 0 IN IP4 {ip}\r\ns=session\r\nc=IN IP4 {ip}\r\nb=CT:99980\r\nt=0 0\r\nm=audio 0 RTP/AVP\r\n"
    )
}

fn generate_call_id() -> String {
    Uuid::new_v4().to_string()
}

fn generate_file_id() -> String {
    format!("{{{}}}", Uuid::new_v4().to_string().to_uppercase())
}

fn generate_srtp_key() -> Vec<u8> {
    let mut key = vec![0u8; SRTP_KEY_LEN];
    OsRng.fill_bytes(&mut key);
    key
}
