//! Low-level SDP line parsing
//!
//! Every SDP line has the shape `<type>=<value>` with a single-character
//! type. The split is done with `nom`; the per-type value grammars live
//! with their model types.

use nom::{
    character::complete::{anychar, char, not_line_ending},
    sequence::separated_pair,
    IResult,
};

use crate::error::{Result, SdpError};

/// Parse one SDP line into its `(type, value)` pair
pub fn parse_sdp_line(input: &str) -> IResult<&str, (char, &str)> {
    separated_pair(anychar, char('='), not_line_ending)(input)
}

/// Split an SDP body into `(type, value)` pairs, rejecting malformed lines
///
/// Blank lines (trailing CRLF artifacts) are skipped.
pub fn parse_sdp_lines(body: &str) -> Result<Vec<(char, String)>> {
    let mut lines = Vec::new();
    for raw in body.lines() {
        let raw = raw.trim_end_matches('\r');
        if raw.is_empty() {
            continue;
        }
        match parse_sdp_line(raw) {
            Ok((_, (key, value))) => lines.push((key, value.to_string())),
            Err(_) => return Err(SdpError::MalformedLine { line: raw.to_string() }),
        }
    }
    Ok(lines)
}
