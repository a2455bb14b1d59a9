//! Shared mocks for the scenario tests
//!
//! The mocks record every capability call so tests can assert on the exact
//! wire traffic the state machine produced. Everything is single-threaded,
//! matching the subsystem's execution model, so plain `Rc<RefCell<_>>`
//! handles are enough.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use commlink_media_core::backend::{BackendCodec, MediaBackend};
use commlink_media_core::config::PortRange;
use commlink_media_core::error::Result;
use commlink_media_core::signaling::{Dialog, InviteContext, SignalingApi, SipMessage};
use commlink_media_core::transfer::{FileSink, FileSource};
use commlink_media_core::{HostApi, MediaConfig, MediaManager};
use commlink_relay_core::{DnsQuery, DnsResolver, MediaRelay};
use commlink_sdp_core::{
    Candidate, CandidateComponent, CandidateKind, CandidateProtocol, IceVersion, MediaType,
};

/// Everything the mock backend was asked to do
#[derive(Default)]
pub struct BackendState {
    pub created_streams: Vec<(String, String, MediaType, IceVersion, PortRange)>,
    pub cnames: Vec<(String, String)>,
    pub local_codecs: HashMap<String, Vec<BackendCodec>>,
    pub local_candidates: HashMap<String, Vec<Candidate>>,
    pub remote_codecs: Vec<(String, String, Vec<BackendCodec>)>,
    pub refuse_codecs_for: Vec<String>,
    pub remote_candidates: Vec<(String, String, Vec<Candidate>)>,
    pub encryption_keys: Vec<(String, String, Vec<u8>)>,
    pub decryption_keys: Vec<(String, String, Vec<u8>, u32)>,
    pub held: Vec<(String, String, bool)>,
    pub accepted: Vec<String>,
    pub rejected: Vec<String>,
    pub hung_up: Vec<String>,
    pub ended_streams: Vec<(String, String)>,
    pub written: Vec<u8>,
    pub write_capacity: Option<usize>,
    pub read_buffer: Vec<u8>,
    pub relays: Vec<(Vec<MediaRelay>, String, String)>,
}

pub struct MockBackend(pub Rc<RefCell<BackendState>>);

fn default_codecs(stream_id: &str) -> Vec<BackendCodec> {
    match stream_id {
        "audio" => vec![BackendCodec {
            payload_id: 0,
            name: "PCMU".to_string(),
            clock_rate: 8000,
            media_type: MediaType::Audio,
            parameters: Vec::new(),
        }],
        "video" => vec![BackendCodec {
            payload_id: 121,
            name: "x-rtvc1".to_string(),
            clock_rate: 90000,
            media_type: MediaType::Video,
            parameters: Vec::new(),
        }],
        _ => vec![BackendCodec {
            payload_id: 127,
            name: "x-data".to_string(),
            clock_rate: 90000,
            media_type: MediaType::Application,
            parameters: Vec::new(),
        }],
    }
}

fn default_candidates() -> Vec<Candidate> {
    let host = |component, port| Candidate {
        foundation: "1".to_string(),
        component,
        kind: CandidateKind::Host,
        protocol: CandidateProtocol::Udp,
        ip: "10.0.0.1".to_string(),
        port,
        base_ip: Some("10.0.0.1".to_string()),
        base_port: Some(port),
        priority: 2130706431,
        username: Some("LocUfrag".to_string()),
        password: Some("LocPwd".to_string()),
    };
    vec![host(CandidateComponent::Rtp, 5062), host(CandidateComponent::Rtcp, 5063)]
}

impl MediaBackend for MockBackend {
    fn create_stream(
        &mut self,
        call_id: &str,
        stream_id: &str,
        media_type: MediaType,
        ice_version: IceVersion,
        ports: PortRange,
    ) -> Result<()> {
        self.0.borrow_mut().created_streams.push((
            call_id.to_string(),
            stream_id.to_string(),
            media_type,
            ice_version,
            ports,
        ));
        Ok(())
    }

    fn set_cname(&mut self, call_id: &str, cname: &str) {
        self.0.borrow_mut().cnames.push((call_id.to_string(), cname.to_string()));
    }

    fn local_codecs(&self, _call_id: &str, stream_id: &str) -> Vec<BackendCodec> {
        self.0
            .borrow()
            .local_codecs
            .get(stream_id)
            .cloned()
            .unwrap_or_else(|| default_codecs(stream_id))
    }

    fn local_candidates(&self, _call_id: &str, stream_id: &str) -> Vec<Candidate> {
        self.0
            .borrow()
            .local_candidates
            .get(stream_id)
            .cloned()
            .unwrap_or_else(default_candidates)
    }

    fn active_local_candidates(&self, call_id: &str, stream_id: &str) -> Vec<Candidate> {
        self.local_candidates(call_id, stream_id)
    }

    fn active_remote_candidates(&self, _call_id: &str, _stream_id: &str) -> Vec<Candidate> {
        Vec::new()
    }

    fn set_remote_codecs(&mut self, call_id: &str, stream_id: &str, codecs: &[BackendCodec]) -> bool {
        let mut state = self.0.borrow_mut();
        state
            .remote_codecs
            .push((call_id.to_string(), stream_id.to_string(), codecs.to_vec()));
        !state.refuse_codecs_for.iter().any(|s| s == stream_id)
    }

    fn set_remote_candidates(&mut self, call_id: &str, stream_id: &str, candidates: &[Candidate]) {
        self.0.borrow_mut().remote_candidates.push((
            call_id.to_string(),
            stream_id.to_string(),
            candidates.to_vec(),
        ));
    }

    fn set_encryption_key(&mut self, call_id: &str, stream_id: &str, key: &[u8]) {
        self.0
            .borrow_mut()
            .encryption_keys
            .push((call_id.to_string(), stream_id.to_string(), key.to_vec()));
    }

    fn set_decryption_key(&mut self, call_id: &str, stream_id: &str, key: &[u8], key_id: u32) {
        self.0.borrow_mut().decryption_keys.push((
            call_id.to_string(),
            stream_id.to_string(),
            key.to_vec(),
            key_id,
        ));
    }

    fn set_held(&mut self, call_id: &str, stream_id: &str, held: bool) {
        self.0
            .borrow_mut()
            .held
            .push((call_id.to_string(), stream_id.to_string(), held));
    }

    fn accept(&mut self, call_id: &str) {
        self.0.borrow_mut().accepted.push(call_id.to_string());
    }

    fn reject(&mut self, call_id: &str) {
        self.0.borrow_mut().rejected.push(call_id.to_string());
    }

    fn hang_up(&mut self, call_id: &str) {
        self.0.borrow_mut().hung_up.push(call_id.to_string());
    }

    fn end_stream(&mut self, call_id: &str, stream_id: &str) {
        self.0
            .borrow_mut()
            .ended_streams
            .push((call_id.to_string(), stream_id.to_string()));
    }

    fn read(&mut self, _call_id: &str, _stream_id: &str, buf: &mut [u8]) -> Result<usize> {
        let mut state = self.0.borrow_mut();
        let n = buf.len().min(state.read_buffer.len());
        buf[..n].copy_from_slice(&state.read_buffer[..n]);
        state.read_buffer.drain(..n);
        Ok(n)
    }

    fn write(&mut self, _call_id: &str, _stream_id: &str, data: &[u8]) -> Result<usize> {
        let mut state = self.0.borrow_mut();
        let n = match state.write_capacity {
            Some(capacity) => data.len().min(capacity),
            None => data.len(),
        };
        if let Some(capacity) = state.write_capacity.as_mut() {
            *capacity -= n;
        }
        let taken = &data[..n];
        state.written.extend_from_slice(taken);
        Ok(n)
    }

    fn set_media_relays(&mut self, relays: &[MediaRelay], username: &str, password: &str) {
        self.0.borrow_mut().relays.push((
            relays.to_vec(),
            username.to_string(),
            password.to_string(),
        ));
    }

    fn network_ip(&self) -> Option<String> {
        Some("10.0.0.1".to_string())
    }
}

/// One outbound signalling action
#[derive(Debug, Clone)]
pub enum Sent {
    Invite {
        call_id: String,
        cseq: u32,
        headers: Vec<(String, String)>,
        content_type: String,
        body: String,
        context: InviteContext,
    },
    Ack {
        call_id: String,
        cseq: u32,
    },
    Response {
        to_method: Option<String>,
        status: u16,
        reason: String,
        headers: Vec<(String, String)>,
        body: Option<(String, String)>,
    },
    Info {
        call_id: String,
        cseq: u32,
        content_type: String,
        body: String,
    },
    Close {
        call_id: String,
    },
    Service {
        uri: String,
        content_type: String,
        body: String,
    },
}

#[derive(Default)]
pub struct SignalingState {
    pub sent: Vec<Sent>,
}

impl SignalingState {
    pub fn invites(&self) -> Vec<&Sent> {
        self.sent
            .iter()
            .filter(|s| matches!(s, Sent::Invite { .. }))
            .collect()
    }

    pub fn responses(&self) -> Vec<(u16, String)> {
        self.sent
            .iter()
            .filter_map(|s| match s {
                Sent::Response { status, reason, .. } => Some((*status, reason.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn infos(&self) -> Vec<(String, String)> {
        self.sent
            .iter()
            .filter_map(|s| match s {
                Sent::Info { content_type, body, .. } => Some((content_type.clone(), body.clone())),
                _ => None,
            })
            .collect()
    }
}

pub struct MockSignaling(pub Rc<RefCell<SignalingState>>);

impl SignalingApi for MockSignaling {
    fn contact(&self) -> String {
        "<sip:alice@10.0.0.1:5061;transport=tls>".to_string()
    }

    fn send_invite(
        &mut self,
        dialog: &Dialog,
        cseq: u32,
        extra_headers: &[(String, String)],
        content_type: &str,
        body: &str,
        context: InviteContext,
    ) {
        self.0.borrow_mut().sent.push(Sent::Invite {
            call_id: dialog.call_id.clone(),
            cseq,
            headers: extra_headers.to_vec(),
            content_type: content_type.to_string(),
            body: body.to_string(),
            context,
        });
    }

    fn send_ack(&mut self, dialog: &Dialog, cseq: u32) {
        self.0
            .borrow_mut()
            .sent
            .push(Sent::Ack { call_id: dialog.call_id.clone(), cseq });
    }

    fn send_response(
        &mut self,
        to: &SipMessage,
        status: u16,
        reason: &str,
        extra_headers: &[(String, String)],
        body: Option<(&str, &str)>,
    ) {
        self.0.borrow_mut().sent.push(Sent::Response {
            to_method: to.method.clone(),
            status,
            reason: reason.to_string(),
            headers: extra_headers.to_vec(),
            body: body.map(|(ct, b)| (ct.to_string(), b.to_string())),
        });
    }

    fn send_info(&mut self, dialog: &Dialog, cseq: u32, content_type: &str, body: &str) {
        self.0.borrow_mut().sent.push(Sent::Info {
            call_id: dialog.call_id.clone(),
            cseq,
            content_type: content_type.to_string(),
            body: body.to_string(),
        });
    }

    fn close_session(&mut self, dialog: &Dialog) {
        self.0
            .borrow_mut()
            .sent
            .push(Sent::Close { call_id: dialog.call_id.clone() });
    }

    fn send_service(&mut self, uri: &str, content_type: &str, body: &str) {
        self.0.borrow_mut().sent.push(Sent::Service {
            uri: uri.to_string(),
            content_type: content_type.to_string(),
            body: body.to_string(),
        });
    }
}

#[derive(Default)]
pub struct HostState {
    pub errors: Vec<(String, String)>,
    pub incoming_calls: Vec<(String, String, bool)>,
    pub incoming_files: Vec<(String, String, String, u64)>,
    pub established: Vec<String>,
    pub ended: Vec<String>,
}

pub struct MockHost(pub Rc<RefCell<HostState>>);

impl HostApi for MockHost {
    fn notify_error(&mut self, title: &str, message: &str) {
        self.0.borrow_mut().errors.push((title.to_string(), message.to_string()));
    }

    fn incoming_call(&mut self, call_id: &str, from: &str, with_video: bool) {
        self.0
            .borrow_mut()
            .incoming_calls
            .push((call_id.to_string(), from.to_string(), with_video));
    }

    fn incoming_file(&mut self, call_id: &str, from: &str, file_name: &str, file_size: u64) {
        self.0.borrow_mut().incoming_files.push((
            call_id.to_string(),
            from.to_string(),
            file_name.to_string(),
            file_size,
        ));
    }

    fn call_established(&mut self, call_id: &str) {
        self.0.borrow_mut().established.push(call_id.to_string());
    }

    fn call_ended(&mut self, call_id: &str) {
        self.0.borrow_mut().ended.push(call_id.to_string());
    }
}

#[derive(Default)]
pub struct ResolverState {
    pub next: u64,
    pub queries: Vec<(DnsQuery, String)>,
    pub cancelled: Vec<DnsQuery>,
}

pub struct MockResolver(pub Rc<RefCell<ResolverState>>);

impl DnsResolver for MockResolver {
    fn query_a(&mut self, hostname: &str) -> DnsQuery {
        let mut state = self.0.borrow_mut();
        state.next += 1;
        let query = DnsQuery(state.next);
        state.queries.push((query, hostname.to_string()));
        query
    }

    fn cancel(&mut self, query: DnsQuery) {
        self.0.borrow_mut().cancelled.push(query);
    }
}

/// A manager wired to recording mocks
pub struct Fixture {
    pub manager: MediaManager,
    pub backend: Rc<RefCell<BackendState>>,
    pub signaling: Rc<RefCell<SignalingState>>,
    pub host: Rc<RefCell<HostState>>,
    pub resolver: Rc<RefCell<ResolverState>>,
}

pub fn fixture(config: MediaConfig) -> Fixture {
    let backend = Rc::new(RefCell::new(BackendState::default()));
    let signaling = Rc::new(RefCell::new(SignalingState::default()));
    let host = Rc::new(RefCell::new(HostState::default()));
    let resolver = Rc::new(RefCell::new(ResolverState::default()));
    let manager = MediaManager::new(
        config,
        Box::new(MockBackend(backend.clone())),
        Box::new(MockSignaling(signaling.clone())),
        Box::new(MockHost(host.clone())),
        Box::new(MockResolver(resolver.clone())),
    );
    Fixture { manager, backend, signaling, host, resolver }
}

pub fn default_config() -> MediaConfig {
    MediaConfig::new("sip:alice@contoso.com")
}

/// A remote SDP answer/offer with one audio section
pub fn audio_sdp(extra_lines: &str) -> String {
    format!(
        "v=0\r\n\
         o=- 0 0 IN IP4 192.0.2.7\r\n\
         s=session\r\n\
         c=IN IP4 192.0.2.7\r\n\
         t=0 0\r\n\
         m=audio 30000 RTP/AVP 0\r\n\
         a=candidate:1 1 UDP 2130706431 192.0.2.7 30000 typ host\r\n\
         a=candidate:1 2 UDP 2130705918 192.0.2.7 30001 typ host\r\n\
         a=rtpmap:0 PCMU/8000\r\n{extra_lines}"
    )
}

/// A remote SDP with one data section, as file transfers use
pub fn data_sdp() -> String {
    "v=0\r\n\
     o=- 0 0 IN IP4 192.0.2.7\r\n\
     s=session\r\n\
     c=IN IP4 192.0.2.7\r\n\
     t=0 0\r\n\
     m=data 30000 RTP/AVP 127\r\n\
     a=candidate:1 1 UDP 2130706431 192.0.2.7 30000 typ host\r\n\
     a=candidate:1 2 UDP 2130705918 192.0.2.7 30001 typ host\r\n\
     a=rtpmap:127 x-data/90000\r\n"
        .to_string()
}

/// An inbound INVITE carrying a bare SDP body
pub fn invite(call_id: &str, from: &str, sdp: &str) -> SipMessage {
    SipMessage::request("INVITE", "sip:alice@contoso.com")
        .with_header("Call-ID", call_id)
        .with_header("From", &format!("<{}>;tag=remote1", from))
        .with_header("To", "<sip:alice@contoso.com>")
        .with_body("application/sdp", sdp)
}

/// A response to one of our requests on the given call
pub fn peer_response(call_id: &str, status: u16, reason: &str) -> SipMessage {
    SipMessage::response(status, reason)
        .with_header("Call-ID", call_id)
        .with_header("From", "<sip:alice@contoso.com>;tag=local1")
        .with_header("To", "<sip:bob@contoso.com>;tag=remote1")
}

/// The Call-ID the manager allocated for its most recent INVITE
pub fn last_invite_call_id(signaling: &Rc<RefCell<SignalingState>>) -> String {
    signaling
        .borrow()
        .sent
        .iter()
        .rev()
        .find_map(|s| match s {
            Sent::Invite { call_id, .. } => Some(call_id.clone()),
            _ => None,
        })
        .expect("no INVITE was sent")
}
