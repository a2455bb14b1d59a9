//! A decoded view of inbound SIP traffic
//!
//! Wire parsing belongs to the transport layer; the host hands the state
//! machine messages in this already-split form. The helpers here cover the
//! headers the call flows actually consult: identity and dialog headers,
//! multipart bodies, and the Microsoft diagnostics extensions carried on
//! failure responses.

use uuid::Uuid;

use crate::error::{CallError, Result};

/// One part of a (possibly multipart) message body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessagePart {
    /// The part's content type
    pub content_type: String,
    /// The part's body
    pub body: String,
}

impl MessagePart {
    /// Build a part
    pub fn new(content_type: &str, body: &str) -> MessagePart {
        MessagePart { content_type: content_type.to_string(), body: body.to_string() }
    }
}

/// A parsed SIP request or response
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SipMessage {
    /// Request method, None for responses
    pub method: Option<String>,
    /// Request URI, None for responses
    pub uri: Option<String>,
    /// Status code, None for requests
    pub status: Option<u16>,
    /// Reason phrase of a response
    pub reason: Option<String>,
    /// Headers in wire order
    pub headers: Vec<(String, String)>,
    /// Raw body
    pub body: String,
}

impl SipMessage {
    /// Build a request shell
    pub fn request(method: &str, uri: &str) -> SipMessage {
        SipMessage {
            method: Some(method.to_string()),
            uri: Some(uri.to_string()),
            ..SipMessage::default()
        }
    }

    /// Build a response shell
    pub fn response(status: u16, reason: &str) -> SipMessage {
        SipMessage {
            status: Some(status),
            reason: Some(reason.to_string()),
            ..SipMessage::default()
        }
    }

    /// Append a header
    pub fn with_header(mut self, name: &str, value: &str) -> SipMessage {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// Attach a body and its content type
    pub fn with_body(mut self, content_type: &str, body: &str) -> SipMessage {
        self.headers.push(("Content-Type".to_string(), content_type.to_string()));
        self.body = body.to_string();
        self
    }

    /// First value of the named header, case-insensitive
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// The Call-ID header
    pub fn call_id(&self) -> Result<&str> {
        self.header("Call-ID")
            .ok_or(CallError::MissingHeader { header: "Call-ID" })
    }

    /// The Content-Type header
    pub fn content_type(&self) -> Option<&str> {
        self.header("Content-Type")
    }

    /// Bare URI of the From header
    pub fn from_uri(&self) -> Option<String> {
        self.header("From").map(|v| parse_address(v).0)
    }

    /// Tag parameter of the From header
    pub fn from_tag(&self) -> Option<String> {
        self.header("From").and_then(|v| parse_address(v).1)
    }

    /// Tag parameter of the To header
    pub fn to_tag(&self) -> Option<String> {
        self.header("To").and_then(|v| parse_address(v).1)
    }

    /// Split the body into its parts; a single-part body yields one entry
    pub fn parts(&self) -> Vec<MessagePart> {
        let content_type = self.content_type().unwrap_or("");
        if !content_type.starts_with("multipart/") {
            return vec![MessagePart::new(content_type, &self.body)];
        }
        let Some(boundary) = content_type_parameter(content_type, "boundary") else {
            return Vec::new();
        };

        let delimiter = format!("--{}", boundary);
        let mut parts = Vec::new();
        for chunk in self.body.split(delimiter.as_str()).skip(1) {
            if chunk.starts_with("--") {
                break; // closing delimiter
            }
            let chunk = chunk.trim_start_matches(['\r', '\n']);
            let (head, body) = match chunk.split_once("\r\n\r\n") {
                Some(split) => split,
                None => match chunk.split_once("\n\n") {
                    Some(split) => split,
                    None => continue,
                },
            };
            let part_type = head
                .lines()
                .filter_map(|line| line.split_once(':'))
                .find(|(name, _)| name.trim().eq_ignore_ascii_case("Content-Type"))
                .map(|(_, value)| value.trim().to_string())
                .unwrap_or_default();
            parts.push(MessagePart {
                content_type: part_type,
                body: body.trim_end_matches(['\r', '\n']).to_string(),
            });
        }
        parts
    }

    /// The first part with the given content type
    pub fn part_of_type(&self, content_type: &str) -> Option<String> {
        self.parts()
            .into_iter()
            .find(|p| p.content_type.starts_with(content_type))
            .map(|p| p.body)
    }

    /// The SDP body, whether bare or inside a multipart
    pub fn sdp_body(&self) -> Option<String> {
        self.part_of_type("application/sdp")
    }

    /// Leading error code of the `ms-diagnostics` header
    pub fn ms_diagnostics_code(&self) -> Option<u32> {
        self.header("ms-diagnostics").and_then(leading_code)
    }

    /// Leading error code of the `ms-client-diagnostics` header
    pub fn ms_client_diagnostics_code(&self) -> Option<u32> {
        self.header("ms-client-diagnostics").and_then(leading_code)
    }

    /// The quoted `reason` of either diagnostics header
    pub fn ms_diagnostics_reason(&self) -> Option<String> {
        self.header("ms-diagnostics")
            .or_else(|| self.header("ms-client-diagnostics"))
            .and_then(quoted_parameter)
    }

    /// Numeric code of the Warning header
    pub fn warning_code(&self) -> Option<u32> {
        self.header("Warning")
            .and_then(|v| v.split_whitespace().next())
            .and_then(|code| code.parse().ok())
    }
}

/// Assemble a multipart body; returns the Content-Type value and the body
pub fn build_multipart(subtype: &str, parts: &[MessagePart]) -> (String, String) {
    let boundary = format!("----={}", Uuid::new_v4().simple());
    let mut body = String::new();
    for part in parts {
        body.push_str(&format!("--{}\r\n", boundary));
        body.push_str(&format!("Content-Type: {}\r\n\r\n", part.content_type));
        body.push_str(&part.body);
        body.push_str("\r\n");
    }
    body.push_str(&format!("--{}--\r\n", boundary));
    let content_type = format!("multipart/{}; boundary={}", subtype, boundary);
    (content_type, body)
}

/// Split an address header value into its bare URI and tag parameter
fn parse_address(value: &str) -> (String, Option<String>) {
    let (uri, params) = match value.find('<') {
        Some(start) => {
            let rest = &value[start + 1..];
            match rest.find('>') {
                Some(end) => (rest[..end].to_string(), &rest[end + 1..]),
                None => (rest.to_string(), ""),
            }
        }
        None => match value.split_once(';') {
            Some((uri, params)) => (uri.trim().to_string(), params),
            None => (value.trim().to_string(), ""),
        },
    };
    let tag = params
        .split(';')
        .find_map(|p| p.trim().strip_prefix("tag="))
        .map(|t| t.to_string());
    (uri, tag)
}

fn content_type_parameter(value: &str, name: &str) -> Option<String> {
    value.split(';').skip(1).find_map(|param| {
        let (key, val) = param.split_once('=')?;
        if key.trim().eq_ignore_ascii_case(name) {
            Some(val.trim().trim_matches('"').to_string())
        } else {
            None
        }
    })
}

fn leading_code(value: &str) -> Option<u32> {
    let digits: String = value.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

fn quoted_parameter(value: &str) -> Option<String> {
    let start = value.find("reason=\"")? + "reason=\"".len();
    let end = value[start..].find('"')? + start;
    Some(value[start..end].to_string())
}
