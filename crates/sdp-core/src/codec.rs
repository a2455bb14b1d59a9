//! Codec model and the `a=rtpmap` / `a=fmtp` attribute forms
//!
//! Codecs within a media section are kept sorted by payload id and
//! de-duplicated on id: backends have been observed reporting non-unique
//! payload ids, and those must never reach the wire.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SdpError};

/// Top-level media classification of a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaType {
    /// Audio streams
    Audio,
    /// Video streams
    Video,
    /// Data-bearing streams (file transfer, application sharing)
    Application,
}

impl MediaType {
    /// Classify an SDP media section name (`audio`, `video`, `data`,
    /// `applicationsharing`)
    pub fn from_section_name(name: &str) -> MediaType {
        match name {
            "audio" => MediaType::Audio,
            "video" => MediaType::Video,
            _ => MediaType::Application,
        }
    }
}

/// A single payload format inside a media section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Codec {
    /// RTP payload id (0-127)
    pub id: u8,
    /// Encoding name as it appears in `a=rtpmap` (e.g. "PCMU", "x-msrta")
    pub name: String,
    /// Clock rate in Hertz
    pub clock_rate: u32,
    /// Media classification this codec belongs to
    pub media_type: MediaType,
    /// Ordered free-form format parameters carried in `a=fmtp`
    pub parameters: Vec<(String, String)>,
}

impl Codec {
    /// Create a codec without format parameters
    pub fn new(id: u8, name: &str, clock_rate: u32, media_type: MediaType) -> Codec {
        Codec {
            id,
            name: name.to_string(),
            clock_rate,
            media_type,
            parameters: Vec::new(),
        }
    }

    /// Append a format parameter, preserving insertion order
    pub fn with_parameter(mut self, name: &str, value: &str) -> Codec {
        self.parameters.push((name.to_string(), value.to_string()));
        self
    }

    /// The `a=rtpmap` attribute value for this codec
    pub fn rtpmap_value(&self) -> String {
        format!("{} {}/{}", self.id, self.name, self.clock_rate)
    }

    /// The `a=fmtp` attribute value, or None when there are no parameters
    pub fn fmtp_value(&self) -> Option<String> {
        if self.parameters.is_empty() {
            return None;
        }
        let params: Vec<String> = self
            .parameters
            .iter()
            .map(|(name, value)| {
                if value.is_empty() {
                    name.clone()
                } else {
                    format!("{}={}", name, value)
                }
            })
            .collect();
        Some(format!("{} {}", self.id, params.join(";")))
    }
}

/// Insert a codec keeping the list sorted by payload id
///
/// A codec whose id is already present is silently dropped.
pub fn insert_codec(codecs: &mut Vec<Codec>, codec: Codec) {
    match codecs.binary_search_by_key(&codec.id, |c| c.id) {
        Ok(_) => {
            tracing::debug!(id = codec.id, name = %codec.name, "dropping duplicate payload id");
        }
        Err(pos) => codecs.insert(pos, codec),
    }
}

/// Parse an `a=rtpmap` value, e.g. `0 PCMU/8000`
pub(crate) fn parse_rtpmap(value: &str, media_type: MediaType) -> Result<Codec> {
    let (id_token, mapping) = value
        .trim()
        .split_once(char::is_whitespace)
        .ok_or(SdpError::InvalidField { item: "rtpmap", value: value.to_string() })?;

    let id = id_token
        .parse::<u8>()
        .map_err(|_| SdpError::InvalidField { item: "rtpmap payload id", value: id_token.to_string() })?;

    let mut fields = mapping.trim().split('/');
    let name = fields
        .next()
        .filter(|n| !n.is_empty())
        .ok_or(SdpError::InvalidField { item: "rtpmap encoding", value: mapping.to_string() })?;
    let clock_rate = fields
        .next()
        .and_then(|r| r.parse::<u32>().ok())
        .ok_or(SdpError::InvalidField { item: "rtpmap clock rate", value: mapping.to_string() })?;

    Ok(Codec::new(id, name, clock_rate, media_type))
}

/// Parse an `a=fmtp` value, e.g. `97 bitrate=29000;mode=30`
pub(crate) fn parse_fmtp(value: &str) -> Result<(u8, Vec<(String, String)>)> {
    let (id_token, rest) = value
        .trim()
        .split_once(char::is_whitespace)
        .ok_or(SdpError::InvalidField { item: "fmtp", value: value.to_string() })?;

    let id = id_token
        .parse::<u8>()
        .map_err(|_| SdpError::InvalidField { item: "fmtp payload id", value: id_token.to_string() })?;

    let mut parameters = Vec::new();
    for token in rest.split(';') {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }
        match token.split_once('=') {
            Some((name, value)) => parameters.push((name.to_string(), value.to_string())),
            None => parameters.push((token.to_string(), String::new())),
        }
    }

    Ok((id, parameters))
}
