//! The decoded SDP message model and its wire form
//!
//! A message is one session block plus an ordered list of media sections.
//! The serialiser writes the session block the way deployed Communicator
//! servers expect it (`s=session`, `b=CT:99980`) and one media block per
//! section, including refused sections repeated with port 0 by the caller.

use std::fmt;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::candidate::{Candidate, CandidateComponent, CandidateKind, CandidateProtocol, IceVersion};
use crate::codec::{insert_codec, parse_fmtp, parse_rtpmap, Codec, MediaType};
use crate::error::{Result, SdpError};
use crate::parser::parse_sdp_lines;

/// SRTP keys carried in SDP are always 30 bytes
pub const SRTP_KEY_LEN: usize = 30;

/// Value space of the `a=encryption` attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EncryptionLevel {
    /// Media encryption refused
    Rejected,
    /// Media encryption supported but not demanded
    Optional,
    /// Media encryption demanded
    Required,
}

impl EncryptionLevel {
    /// Wire token of this level
    pub fn as_str(self) -> &'static str {
        match self {
            EncryptionLevel::Rejected => "rejected",
            EncryptionLevel::Optional => "optional",
            EncryptionLevel::Required => "required",
        }
    }

    /// Parse a wire token
    pub fn from_token(token: &str) -> Option<EncryptionLevel> {
        match token {
            "rejected" => Some(EncryptionLevel::Rejected),
            "optional" => Some(EncryptionLevel::Optional),
            "required" => Some(EncryptionLevel::Required),
            _ => None,
        }
    }
}

/// One `a=` attribute, order-preserving
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SdpAttribute {
    /// Attribute name
    pub name: String,
    /// Attribute value; empty for flag attributes such as `inactive`
    pub value: String,
}

impl SdpAttribute {
    /// Build an attribute
    pub fn new(name: &str, value: &str) -> SdpAttribute {
        SdpAttribute { name: name.to_string(), value: value.to_string() }
    }
}

/// One media section of an SDP message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SdpMedia {
    /// Section name: `audio`, `video`, `data` or `applicationsharing`
    pub name: String,
    /// Advertised RTP port; 0 marks a refused section
    pub port: u16,
    /// Transport IP for the `c=` line
    pub ip: String,
    /// Payload formats, sorted by id and unique on id
    pub codecs: Vec<Codec>,
    /// Local candidates
    pub candidates: Vec<Candidate>,
    /// Remote (in-use) candidates
    pub remote_candidates: Vec<Candidate>,
    /// Remaining attributes in insertion order
    pub attributes: Vec<SdpAttribute>,
    /// SRTP key when one is carried
    pub encryption_key: Option<Vec<u8>>,
    /// Key id accompanying the SRTP key
    pub encryption_key_id: u32,
    /// True when the section carried a key attribute
    pub encryption_active: bool,
}

impl SdpMedia {
    /// Create an empty section
    pub fn new(name: &str) -> SdpMedia {
        SdpMedia {
            name: name.to_string(),
            port: 0,
            ip: String::new(),
            codecs: Vec::new(),
            candidates: Vec::new(),
            remote_candidates: Vec::new(),
            attributes: Vec::new(),
            encryption_key: None,
            encryption_key_id: 0,
            encryption_active: false,
        }
    }

    /// Media classification derived from the section name
    pub fn media_type(&self) -> MediaType {
        MediaType::from_section_name(&self.name)
    }

    /// First value of the named attribute
    pub fn attribute_value(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.value.as_str())
    }

    /// True when the named attribute is present, with or without a value
    pub fn has_attribute(&self, name: &str) -> bool {
        self.attributes.iter().any(|a| a.name == name)
    }

    /// Append an attribute
    pub fn add_attribute(&mut self, name: &str, value: &str) {
        self.attributes.push(SdpAttribute::new(name, value));
    }

    /// Drop every attribute with the given name
    pub fn remove_attribute(&mut self, name: &str) {
        self.attributes.retain(|a| a.name != name);
    }

    /// The advertised encryption level, when the section carries one
    pub fn encryption_level(&self) -> Option<EncryptionLevel> {
        self.attribute_value("encryption").and_then(EncryptionLevel::from_token)
    }

    /// True when the section is on hold
    pub fn is_inactive(&self) -> bool {
        self.has_attribute("inactive")
    }

    /// RTCP port from the `a=rtcp` attribute
    pub fn rtcp_port(&self) -> Option<u16> {
        self.attribute_value("rtcp").and_then(|v| v.parse().ok())
    }
}

/// A decoded SDP message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SdpMessage {
    /// IP carried on the `o=` line
    pub origin_ip: String,
    /// Dialect of the candidate attributes
    pub ice_version: IceVersion,
    /// Ordered media sections
    pub media: Vec<SdpMedia>,
}

impl SdpMessage {
    /// Create an empty message
    pub fn new(origin_ip: &str, ice_version: IceVersion) -> SdpMessage {
        SdpMessage { origin_ip: origin_ip.to_string(), ice_version, media: Vec::new() }
    }

    /// Decode wire SDP text
    ///
    /// The ICE version is detected from the candidate attributes; a body
    /// without candidates keeps the RFC 5245 assumption.
    pub fn parse(body: &str) -> Result<SdpMessage> {
        let lines = parse_sdp_lines(body)?;

        let mut message = SdpMessage::new("", IceVersion::Rfc5245);
        let mut session_ip = String::new();
        let mut saw_draft6 = false;
        let mut saw_rfc5245 = false;
        // ice-ufrag / ice-pwd of the section currently being parsed
        let mut section_ufrag: Option<String> = None;
        let mut section_pwd: Option<String> = None;

        fn finish_section(media: &mut [SdpMedia], ufrag: &mut Option<String>, pwd: &mut Option<String>) {
            if let Some(section) = media.last_mut() {
                for candidate in &mut section.candidates {
                    if candidate.username.is_none() {
                        candidate.username = ufrag.clone();
                    }
                    if candidate.password.is_none() {
                        candidate.password = pwd.clone();
                    }
                }
            }
            *ufrag = None;
            *pwd = None;
        }

        for (key, value) in lines {
            match key {
                'o' => {
                    let fields: Vec<&str> = value.split_whitespace().collect();
                    if fields.len() < 6 {
                        return Err(SdpError::InvalidField { item: "origin", value });
                    }
                    message.origin_ip = fields[5].to_string();
                }
                'c' => {
                    let fields: Vec<&str> = value.split_whitespace().collect();
                    if fields.len() < 3 {
                        return Err(SdpError::InvalidField { item: "connection", value });
                    }
                    match message.media.last_mut() {
                        Some(section) => section.ip = fields[2].to_string(),
                        None => session_ip = fields[2].to_string(),
                    }
                }
                'm' => {
                    finish_section(&mut message.media, &mut section_ufrag, &mut section_pwd);
                    let fields: Vec<&str> = value.split_whitespace().collect();
                    if fields.len() < 3 {
                        return Err(SdpError::InvalidField { item: "media line", value });
                    }
                    let mut section = SdpMedia::new(fields[0]);
                    section.port = fields[1]
                        .parse()
                        .map_err(|_| SdpError::InvalidField { item: "media port", value: fields[1].to_string() })?;
                    section.ip = session_ip.clone();
                    message.media.push(section);
                }
                'a' => {
                    let (name, attr_value) = match value.split_once(':') {
                        Some((name, rest)) => (name, rest),
                        None => (value.as_str(), ""),
                    };
                    let Some(section) = message.media.last_mut() else {
                        continue; // session-level attributes are not modelled
                    };
                    match name {
                        "rtpmap" => {
                            let media_type = section.media_type();
                            let codec = parse_rtpmap(attr_value, media_type)?;
                            insert_codec(&mut section.codecs, codec);
                        }
                        "fmtp" => {
                            let (id, parameters) = parse_fmtp(attr_value)?;
                            if let Some(codec) = section.codecs.iter_mut().find(|c| c.id == id) {
                                codec.parameters = parameters;
                            }
                        }
                        "candidate" => {
                            if Candidate::value_is_rfc5245(attr_value) {
                                saw_rfc5245 = true;
                            } else {
                                saw_draft6 = true;
                            }
                            section.candidates.push(Candidate::parse(attr_value)?);
                        }
                        "remote-candidates" | "remote-candidate" => {
                            parse_remote_candidates(attr_value, &mut section.remote_candidates)?;
                        }
                        "crypto" => {
                            let (key_id, key) = parse_crypto(attr_value)?;
                            section.encryption_key = Some(key);
                            section.encryption_key_id = key_id;
                            section.encryption_active = true;
                        }
                        "ice-ufrag" => section_ufrag = Some(attr_value.to_string()),
                        "ice-pwd" => section_pwd = Some(attr_value.to_string()),
                        _ => section.add_attribute(name, attr_value),
                    }
                }
                // v=, s=, b=, t= and friends carry nothing the model keeps
                _ => {}
            }
        }
        finish_section(&mut message.media, &mut section_ufrag, &mut section_pwd);

        if message.media.is_empty() {
            return Err(SdpError::NoMediaSections);
        }
        if saw_draft6 && !saw_rfc5245 {
            message.ice_version = IceVersion::Draft6;
        }

        Ok(message)
    }
}

fn parse_remote_candidates(value: &str, out: &mut Vec<Candidate>) -> Result<()> {
    let fields: Vec<&str> = value.split_whitespace().collect();
    if fields.is_empty() || fields.len() % 3 != 0 {
        return Err(SdpError::InvalidField { item: "remote-candidates", value: value.to_string() });
    }
    for triple in fields.chunks(3) {
        let component = triple[0]
            .parse::<u32>()
            .ok()
            .and_then(|id| match id {
                1 => Some(CandidateComponent::Rtp),
                2 => Some(CandidateComponent::Rtcp),
                _ => None,
            })
            .ok_or(SdpError::InvalidField { item: "remote-candidate component", value: triple[0].to_string() })?;
        let port = triple[2]
            .parse::<u16>()
            .map_err(|_| SdpError::InvalidField { item: "remote-candidate port", value: triple[2].to_string() })?;
        out.push(Candidate {
            foundation: "1".to_string(),
            component,
            kind: CandidateKind::Any,
            protocol: CandidateProtocol::Udp,
            ip: triple[1].to_string(),
            port,
            base_ip: None,
            base_port: None,
            priority: 0,
            username: None,
            password: None,
        });
    }
    Ok(())
}

fn parse_crypto(value: &str) -> Result<(u32, Vec<u8>)> {
    let fields: Vec<&str> = value.split_whitespace().collect();
    if fields.len() < 3 {
        return Err(SdpError::InvalidField { item: "crypto", value: value.to_string() });
    }
    let key_id = fields[0]
        .parse::<u32>()
        .map_err(|_| SdpError::InvalidField { item: "crypto key id", value: fields[0].to_string() })?;
    let inline = fields[2]
        .strip_prefix("inline:")
        .ok_or(SdpError::InvalidField { item: "crypto key", value: fields[2].to_string() })?;
    let key = BASE64
        .decode(inline)
        .map_err(|_| SdpError::InvalidField { item: "crypto key", value: inline.to_string() })?;
    if key.len() != SRTP_KEY_LEN {
        return Err(SdpError::InvalidField { item: "crypto key length", value: key.len().to_string() });
    }
    Ok((key_id, key))
}

impl fmt::Display for SdpMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v=0\r\n")?;
        write!(f, "o=- 0 0 IN IP4 {}\r\n", self.origin_ip)?;
        write!(f, "s=session\r\n")?;
        write!(f, "c=IN IP4 {}\r\n", self.origin_ip)?;
        write!(f, "b=CT:99980\r\n")?;
        write!(f, "t=0 0\r\n")?;

        for section in &self.media {
            let ids = section
                .codecs
                .iter()
                .map(|c| format!(" {}", c.id))
                .collect::<String>();
            write!(f, "m={} {} RTP/AVP{}\r\n", section.name, section.port, ids)?;
            let ip = if section.ip.is_empty() { &self.origin_ip } else { &section.ip };
            write!(f, "c=IN IP4 {}\r\n", ip)?;

            if self.ice_version == IceVersion::Rfc5245 {
                if let Some(first) = section.candidates.first() {
                    if let Some(username) = &first.username {
                        write!(f, "a=ice-ufrag:{}\r\n", username)?;
                    }
                    if let Some(password) = &first.password {
                        write!(f, "a=ice-pwd:{}\r\n", password)?;
                    }
                }
            }
            for candidate in &section.candidates {
                write!(f, "a=candidate:{}\r\n", candidate.to_attribute_value(self.ice_version))?;
            }
            if !section.remote_candidates.is_empty() {
                let triples = section
                    .remote_candidates
                    .iter()
                    .map(|c| format!("{} {} {}", c.component.id(), c.ip, c.port))
                    .collect::<Vec<_>>()
                    .join(" ");
                let name = match self.ice_version {
                    IceVersion::Rfc5245 => "remote-candidates",
                    IceVersion::Draft6 => "remote-candidate",
                };
                write!(f, "a={}:{}\r\n", name, triples)?;
            }
            if let Some(key) = &section.encryption_key {
                write!(
                    f,
                    "a=crypto:{} AES_CM_128_HMAC_SHA1_80 inline:{}\r\n",
                    section.encryption_key_id,
                    BASE64.encode(key)
                )?;
            }
            for codec in &section.codecs {
                write!(f, "a=rtpmap:{}\r\n", codec.rtpmap_value())?;
                if let Some(fmtp) = codec.fmtp_value() {
                    write!(f, "a=fmtp:{}\r\n", fmtp)?;
                }
            }
            for attribute in &section.attributes {
                if attribute.value.is_empty() {
                    write!(f, "a={}\r\n", attribute.name)?;
                } else {
                    write!(f, "a={}:{}\r\n", attribute.name, attribute.value)?;
                }
            }
        }
        Ok(())
    }
}
