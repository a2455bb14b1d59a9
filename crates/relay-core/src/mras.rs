//! MRAS credential request and response documents
//!
//! The client POSTs a `request` document to the MRAS URI over the SIP
//! service channel and gets back short-lived relay credentials plus the
//! list of media relays to hand to the backend.

use std::io::Cursor;
use std::time::{Duration, Instant};

use quick_xml::events::{BytesDecl, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use rand::rngs::OsRng;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{RelayError, Result};
use crate::list::MediaRelay;

const MRAS_NS: &str = "http://schemas.microsoft.com/2006/09/sip/mrasp";

/// Credential lifetime the client asks for, in seconds
pub const REQUESTED_DURATION_SECS: u64 = 480;

/// Whether the signed-in session reaches the server from inside the
/// corporate network or across the access edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelayLocation {
    /// Inside the corporate network
    Intranet,
    /// Outside, through the access edge
    Internet,
}

impl RelayLocation {
    fn as_str(self) -> &'static str {
        match self {
            RelayLocation::Intranet => "intranet",
            RelayLocation::Internet => "internet",
        }
    }
}

/// An outbound credentials request
#[derive(Debug, Clone)]
pub struct MrasRequest {
    /// Random request id echoed by the server
    pub request_id: u32,
    /// The MRAS service URI the request is addressed to
    pub mras_uri: String,
    /// Our own SIP URI
    pub self_uri: String,
    /// Where the session connects from
    pub location: RelayLocation,
}

impl MrasRequest {
    /// Build a request with a fresh random id
    pub fn new(mras_uri: &str, self_uri: &str, location: RelayLocation) -> MrasRequest {
        MrasRequest {
            request_id: OsRng.gen(),
            mras_uri: mras_uri.to_string(),
            self_uri: self_uri.to_string(),
            location,
        }
    }

    /// Serialise the request document
    pub fn to_xml(&self) -> Result<String> {
        let mut writer = Writer::new(Cursor::new(Vec::new()));

        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
            .map_err(|e| RelayError::Xml(e.to_string()))?;

        let request_id = self.request_id.to_string();
        let mut request = BytesStart::new("request");
        request.push_attribute(("xmlns", MRAS_NS));
        request.push_attribute(("requestID", request_id.as_str()));
        request.push_attribute(("version", "2.0"));
        request.push_attribute(("to", self.mras_uri.as_str()));
        request.push_attribute(("from", self.self_uri.as_str()));
        writer
            .write_event(Event::Start(request))
            .map_err(|e| RelayError::Xml(e.to_string()))?;

        let mut credentials = BytesStart::new("credentialsRequest");
        credentials.push_attribute(("credentialsRequestID", request_id.as_str()));
        writer
            .write_event(Event::Start(credentials))
            .map_err(|e| RelayError::Xml(e.to_string()))?;

        for (element, text) in [
            ("identity", self.self_uri.as_str()),
            ("location", self.location.as_str()),
            ("duration", &REQUESTED_DURATION_SECS.to_string()),
        ] {
            writer
                .write_event(Event::Start(BytesStart::new(element)))
                .map_err(|e| RelayError::Xml(e.to_string()))?;
            writer
                .write_event(Event::Text(BytesText::new(text)))
                .map_err(|e| RelayError::Xml(e.to_string()))?;
            writer
                .write_event(Event::End(BytesStart::new(element).to_end()))
                .map_err(|e| RelayError::Xml(e.to_string()))?;
        }

        writer
            .write_event(Event::End(BytesStart::new("credentialsRequest").to_end()))
            .map_err(|e| RelayError::Xml(e.to_string()))?;
        writer
            .write_event(Event::End(BytesStart::new("request").to_end()))
            .map_err(|e| RelayError::Xml(e.to_string()))?;

        let xml = writer.into_inner().into_inner();
        String::from_utf8(xml).map_err(|e| RelayError::Xml(e.to_string()))
    }
}

/// Relay credentials issued by MRAS
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayCredentials {
    /// Username for relay allocations
    pub username: String,
    /// Password for relay allocations
    pub password: String,
    duration: Duration,
    issued_at: Instant,
}

impl RelayCredentials {
    /// True once less than a tenth of the advertised lifetime remains;
    /// callers re-issue the MRAS request on the next call setup
    pub fn needs_refresh(&self) -> bool {
        let elapsed = self.issued_at.elapsed();
        elapsed + self.duration / 10 >= self.duration
    }

    #[cfg(test)]
    pub(crate) fn aged(username: &str, password: &str, duration: Duration, age: Duration) -> RelayCredentials {
        RelayCredentials {
            username: username.to_string(),
            password: password.to_string(),
            duration,
            issued_at: Instant::now() - age,
        }
    }
}

/// A decoded MRAS response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MrasResponse {
    /// Issued credentials
    pub credentials: RelayCredentials,
    /// Advertised relays, hostnames not yet resolved
    pub relays: Vec<MediaRelay>,
}

impl MrasResponse {
    /// Decode the body of a 2xx service response
    pub fn parse(xml: &str) -> Result<MrasResponse> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut reason_phrase = String::new();
        let mut username = None;
        let mut password = None;
        let mut duration_secs = REQUESTED_DURATION_SECS;
        let mut relays = Vec::new();

        let mut relay: Option<MediaRelay> = None;
        let mut element: Vec<u8> = Vec::new();

        let mut buf = Vec::new();
        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(ref e)) => {
                    element = e.name().as_ref().to_vec();
                    if element == b"response" {
                        for attr in e.attributes().flatten() {
                            if attr.key.as_ref() == b"reasonPhrase" {
                                reason_phrase = String::from_utf8_lossy(&attr.value).to_string();
                            }
                        }
                    } else if element == b"mediaRelay" {
                        relay = Some(MediaRelay::default());
                    }
                }
                Ok(Event::Text(ref e)) => {
                    let text = e
                        .unescape()
                        .map_err(|err| RelayError::Xml(err.to_string()))?
                        .to_string();
                    match element.as_slice() {
                        b"username" => username = Some(text),
                        b"password" => password = Some(text),
                        b"duration" => duration_secs = text.parse().unwrap_or(REQUESTED_DURATION_SECS),
                        b"hostName" => {
                            if let Some(relay) = relay.as_mut() {
                                relay.host_name = Some(text);
                            }
                        }
                        b"udpPort" => {
                            if let Some(relay) = relay.as_mut() {
                                relay.udp_port = text.parse().unwrap_or(0);
                            }
                        }
                        b"tcpPort" => {
                            if let Some(relay) = relay.as_mut() {
                                relay.tcp_port = text.parse().unwrap_or(0);
                            }
                        }
                        _ => {}
                    }
                }
                Ok(Event::End(ref e)) => {
                    if e.name().as_ref() == b"mediaRelay" {
                        if let Some(relay) = relay.take() {
                            relays.push(relay);
                        }
                    }
                    element.clear();
                }
                Ok(Event::Eof) => break,
                Err(e) => return Err(RelayError::Xml(e.to_string())),
                _ => {}
            }
            buf.clear();
        }

        if reason_phrase != "OK" {
            return Err(RelayError::Rejected { reason: reason_phrase });
        }
        let (username, password) = match (username, password) {
            (Some(u), Some(p)) => (u, p),
            _ => return Err(RelayError::MissingCredentials),
        };

        Ok(MrasResponse {
            credentials: RelayCredentials {
                username,
                password,
                duration: Duration::from_secs(duration_secs),
                issued_at: Instant::now(),
            },
            relays,
        })
    }
}
