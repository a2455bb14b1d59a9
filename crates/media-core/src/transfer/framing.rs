//! The 3-byte frame protocol on the file-transfer data stream
//!
//! Every frame is a 1-byte type, a 2-byte big-endian payload length, and
//! that many payload bytes. Start and end frames carry the control-plane
//! request id as ASCII text; data frames carry file bytes.

use crate::error::{CallError, Result};

/// Largest data-frame payload the sender emits
pub const CHUNK_SIZE: usize = 1024;

/// Frame type byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// File bytes
    Data,
    /// Start of stream; payload is the request id
    Start,
    /// End of stream; payload is the request id
    End,
}

impl FrameKind {
    fn from_byte(byte: u8) -> Option<FrameKind> {
        match byte {
            0x00 => Some(FrameKind::Data),
            0x01 => Some(FrameKind::Start),
            0x02 => Some(FrameKind::End),
            _ => None,
        }
    }

    fn byte(self) -> u8 {
        match self {
            FrameKind::Data => 0x00,
            FrameKind::Start => 0x01,
            FrameKind::End => 0x02,
        }
    }
}

/// One decoded frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Frame type
    pub kind: FrameKind,
    /// Frame payload
    pub payload: Vec<u8>,
}

/// Encode a frame; payloads are bounded by [`CHUNK_SIZE`] at the call sites
pub fn encode_frame(kind: FrameKind, payload: &[u8]) -> Vec<u8> {
    debug_assert!(payload.len() <= u16::MAX as usize);
    let len = payload.len().min(u16::MAX as usize) as u16;
    let mut frame = Vec::with_capacity(3 + payload.len());
    frame.push(kind.byte());
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(&payload[..len as usize]);
    frame
}

enum ReadState {
    /// Waiting for the 3-byte header
    Header,
    /// Consuming the announced payload
    Payload { kind: FrameKind, remaining: usize },
}

/// Incremental frame decoder for the receiving side
///
/// Strictly state-machine driven: read type and length, then consume
/// exactly the announced number of bytes, whatever the chunking of the
/// underlying stream reads.
pub struct FrameReader {
    state: ReadState,
    buffer: Vec<u8>,
}

impl std::fmt::Debug for FrameReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameReader").field("buffered", &self.buffer.len()).finish()
    }
}

impl Default for FrameReader {
    fn default() -> FrameReader {
        FrameReader::new()
    }
}

impl FrameReader {
    /// An empty reader
    pub fn new() -> FrameReader {
        FrameReader { state: ReadState::Header, buffer: Vec::new() }
    }

    /// Feed stream bytes in; returns every frame that completed
    pub fn push(&mut self, bytes: &[u8]) -> Result<Vec<Frame>> {
        self.buffer.extend_from_slice(bytes);

        let mut frames = Vec::new();
        loop {
            match self.state {
                ReadState::Header => {
                    if self.buffer.len() < 3 {
                        break;
                    }
                    let kind = FrameKind::from_byte(self.buffer[0]).ok_or_else(|| {
                        CallError::Transfer {
                            reason: format!("unknown frame type 0x{:02x}", self.buffer[0]),
                        }
                    })?;
                    let len = u16::from_be_bytes([self.buffer[1], self.buffer[2]]) as usize;
                    self.buffer.drain(..3);
                    self.state = ReadState::Payload { kind, remaining: len };
                }
                ReadState::Payload { kind, remaining } => {
                    if self.buffer.len() < remaining {
                        break;
                    }
                    let payload: Vec<u8> = self.buffer.drain(..remaining).collect();
                    frames.push(Frame { kind, payload });
                    self.state = ReadState::Header;
                }
            }
        }
        Ok(frames)
    }
}
