//! The Lync file-transfer overlay
//!
//! A transfer is an ordinary media call whose single stream is `data`,
//! `sendonly` from the sender, with an XML control plane over SIP INFO
//! and a 3-byte frame protocol on the stream itself. The overlay owns all
//! of that state; the call only carries the tag.

pub mod control;
pub mod framing;

pub use control::{FileInfo, FtBody, FtMessage, FT_CONTENT_TYPE};
pub use framing::{encode_frame, Frame, FrameKind, FrameReader, CHUNK_SIZE};

use crate::error::{CallError, Result};

/// Host capability: the file being sent, read on demand
pub trait FileSource {
    /// Read up to `buf.len()` bytes; 0 means end of file
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize>;
}

/// Host capability: the file being received, written as chunks arrive
pub trait FileSink {
    /// Append received bytes
    fn write_all(&mut self, data: &[u8]) -> std::io::Result<()>;
}

/// Which end of the transfer this overlay is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferRole {
    /// We publish and send the file
    Send,
    /// We download and store the file
    Receive,
}

/// Coarse progress of the transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferPhase {
    /// Control handshake incomplete
    Setup,
    /// Bytes are moving
    Transferring,
    /// Locally cancelled; inbound data is drained and discarded until BYE
    Draining,
    /// Finished, one way or the other
    Done,
}

/// Per-stream state of one file transfer
pub struct FileTransfer {
    /// Sender or receiver
    pub role: TransferRole,
    /// The published file
    pub file: FileInfo,
    /// Request id of the `publishFile`
    pub publish_request_id: u32,
    /// Request id of the `downloadFile`, once seen; its decimal form is
    /// the payload of the start and end frames
    pub download_request_id: Option<u32>,
    /// Progress
    pub phase: TransferPhase,
    /// Candidate pair is up, the data stream is usable
    pub connected: bool,
    /// Receiver has sent its success + downloadFile pair
    pub handshake_sent: bool,
    /// Bytes handed to the wire
    pub bytes_sent: u64,
    /// File bytes taken off the wire
    pub bytes_received: u64,
    next_request_id: u32,
    start_frame_sent: bool,
    end_frame_sent: bool,
    end_frame_seen: bool,
    completion_reported: bool,
    source: Option<Box<dyn FileSource>>,
    sink: Option<Box<dyn FileSink>>,
    reader: FrameReader,
    pending_write: Vec<u8>,
}

impl std::fmt::Debug for FileTransfer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileTransfer")
            .field("role", &self.role)
            .field("file", &self.file)
            .field("phase", &self.phase)
            .field("bytes_sent", &self.bytes_sent)
            .field("bytes_received", &self.bytes_received)
            .finish()
    }
}

impl FileTransfer {
    /// Sender-side overlay; the publish request id is always 1
    pub fn sender(file: FileInfo, source: Box<dyn FileSource>) -> FileTransfer {
        FileTransfer {
            role: TransferRole::Send,
            file,
            publish_request_id: 1,
            download_request_id: None,
            phase: TransferPhase::Setup,
            connected: false,
            handshake_sent: false,
            bytes_sent: 0,
            bytes_received: 0,
            next_request_id: 2,
            start_frame_sent: false,
            end_frame_sent: false,
            end_frame_seen: false,
            completion_reported: false,
            source: Some(source),
            sink: None,
            reader: FrameReader::new(),
            pending_write: Vec::new(),
        }
    }

    /// Receiver-side overlay, built from a parsed `publishFile`
    pub fn receiver(file: FileInfo, publish_request_id: u32) -> FileTransfer {
        FileTransfer {
            role: TransferRole::Receive,
            file,
            publish_request_id,
            download_request_id: None,
            phase: TransferPhase::Setup,
            connected: false,
            handshake_sent: false,
            bytes_sent: 0,
            bytes_received: 0,
            next_request_id: publish_request_id + 1,
            start_frame_sent: false,
            end_frame_sent: false,
            end_frame_seen: false,
            completion_reported: false,
            source: None,
            sink: None,
            reader: FrameReader::new(),
            pending_write: Vec::new(),
        }
    }

    /// Attach the destination the receiver writes into
    pub fn attach_sink(&mut self, sink: Box<dyn FileSink>) {
        self.sink = Some(sink);
    }

    /// Allocate the next control-plane request id
    pub fn next_request_id(&mut self) -> u32 {
        let id = self.next_request_id;
        self.next_request_id += 1;
        id
    }

    /// Published file size
    pub fn size(&self) -> u64 {
        self.file.size.unwrap_or(0)
    }

    /// Locally cancel; inbound bytes keep draining until the peer BYEs
    pub fn cancel_local(&mut self) {
        self.phase = TransferPhase::Draining;
    }

    /// The peer cancelled; nothing more moves
    pub fn cancel_remote(&mut self) {
        self.phase = TransferPhase::Done;
    }

    /// Sender write pump
    ///
    /// Emits the start frame, then data frames of at most [`CHUNK_SIZE`]
    /// bytes, then the end frame. `write` returns how many bytes the
    /// stream took; 0 parks the pump until the next writable event.
    pub fn pump<W>(&mut self, mut write: W) -> Result<()>
    where
        W: FnMut(&[u8]) -> Result<usize>,
    {
        if self.phase != TransferPhase::Transferring || self.role != TransferRole::Send {
            return Ok(());
        }
        let rid = self
            .download_request_id
            .ok_or(CallError::Transfer { reason: "no download request yet".to_string() })?
            .to_string();

        loop {
            if self.pending_write.is_empty() {
                if !self.start_frame_sent {
                    self.pending_write = encode_frame(FrameKind::Start, rid.as_bytes());
                    self.start_frame_sent = true;
                } else if self.bytes_sent < self.size() {
                    let want = (self.size() - self.bytes_sent).min(CHUNK_SIZE as u64) as usize;
                    let mut chunk = vec![0u8; want];
                    let source = self
                        .source
                        .as_mut()
                        .ok_or(CallError::Transfer { reason: "no file source".to_string() })?;
                    let n = source
                        .read(&mut chunk)
                        .map_err(|e| CallError::Transfer { reason: e.to_string() })?;
                    if n == 0 {
                        return Err(CallError::Transfer {
                            reason: "file ended before the published size".to_string(),
                        });
                    }
                    chunk.truncate(n);
                    self.bytes_sent += n as u64;
                    self.pending_write = encode_frame(FrameKind::Data, &chunk);
                } else if !self.end_frame_sent {
                    self.pending_write = encode_frame(FrameKind::End, rid.as_bytes());
                    self.end_frame_sent = true;
                } else {
                    // Everything is on the wire; completion comes from the
                    // peer's progress notify
                    return Ok(());
                }
            }

            let taken = write(&self.pending_write)?;
            if taken == 0 {
                return Ok(());
            }
            self.pending_write.drain(..taken);
            if !self.pending_write.is_empty() {
                return Ok(());
            }
        }
    }

    /// Receiver data-plane ingest
    ///
    /// Returns true exactly once, when the full published size has been
    /// received and stored.
    pub fn ingest(&mut self, data: &[u8]) -> Result<bool> {
        let frames = self.reader.push(data)?;
        for frame in frames {
            match frame.kind {
                FrameKind::Start => {
                    let expected =
                        self.download_request_id.map(|id| id.to_string()).unwrap_or_default();
                    if frame.payload != expected.as_bytes() {
                        tracing::debug!(
                            expected = %expected,
                            "start frame references a different request id"
                        );
                    }
                }
                FrameKind::Data => {
                    if self.phase == TransferPhase::Draining {
                        continue; // discard, keep the stream drained
                    }
                    self.bytes_received += frame.payload.len() as u64;
                    if let Some(sink) = self.sink.as_mut() {
                        sink.write_all(&frame.payload)
                            .map_err(|e| CallError::Transfer { reason: e.to_string() })?;
                    }
                }
                FrameKind::End => self.end_frame_seen = true,
            }
        }

        let complete = self.phase == TransferPhase::Transferring
            && self.size() > 0
            && self.bytes_received >= self.size()
            && !self.completion_reported;
        if complete {
            self.completion_reported = true;
            self.phase = TransferPhase::Done;
        }
        Ok(complete)
    }
}
