//! The media backend capability surface
//!
//! The core never touches sockets, codecs, RTP, or SRTP itself. Everything
//! it needs from the host's media engine goes through [`MediaBackend`];
//! everything the engine reports back arrives as `on_*` entry points on
//! [`MediaManager`](crate::MediaManager) (stream-initialised,
//! candidate-pair-established, stream-end, read-available, and friends).
//!
//! All calls are made from the host event loop; implementations must not
//! re-enter the manager synchronously.

use commlink_relay_core::MediaRelay;
use commlink_sdp_core::{Candidate, Codec, IceVersion, MediaType};

use crate::config::PortRange;
use crate::error::Result;

/// A codec as the media engine reports it
///
/// Shape-compatible with the SDP codec, but kept distinct: engine reports
/// are untrusted (duplicate payload ids happen) and are normalised on the
/// way into a message.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendCodec {
    /// RTP payload id
    pub payload_id: u8,
    /// Encoding name
    pub name: String,
    /// Clock rate in Hertz
    pub clock_rate: u32,
    /// Media classification
    pub media_type: MediaType,
    /// Free-form parameters in engine order
    pub parameters: Vec<(String, String)>,
}

impl BackendCodec {
    /// Convert to the SDP codec model
    pub fn to_codec(&self) -> Codec {
        Codec {
            id: self.payload_id,
            name: self.name.clone(),
            clock_rate: self.clock_rate,
            media_type: self.media_type,
            parameters: self.parameters.clone(),
        }
    }

    /// Convert from the SDP codec model
    pub fn from_codec(codec: &Codec) -> BackendCodec {
        BackendCodec {
            payload_id: codec.id,
            name: codec.name.clone(),
            clock_rate: codec.clock_rate,
            media_type: codec.media_type,
            parameters: codec.parameters.clone(),
        }
    }
}

/// Host capability: the media engine
pub trait MediaBackend {
    /// Create a stream and start gathering candidates in the given port range
    fn create_stream(
        &mut self,
        call_id: &str,
        stream_id: &str,
        media_type: MediaType,
        ice_version: IceVersion,
        ports: PortRange,
    ) -> Result<()>;

    /// Set the RTP cname used for this call's streams
    fn set_cname(&mut self, call_id: &str, cname: &str);

    /// Locally supported codecs for a stream
    fn local_codecs(&self, call_id: &str, stream_id: &str) -> Vec<BackendCodec>;

    /// Gathered local candidates for a stream
    fn local_candidates(&self, call_id: &str, stream_id: &str) -> Vec<Candidate>;

    /// Local halves of the nominated candidate pairs, once ICE completed
    fn active_local_candidates(&self, call_id: &str, stream_id: &str) -> Vec<Candidate>;

    /// Remote halves of the nominated candidate pairs, once ICE completed
    fn active_remote_candidates(&self, call_id: &str, stream_id: &str) -> Vec<Candidate>;

    /// Push the peer's codec list; false when the engine accepted none
    fn set_remote_codecs(&mut self, call_id: &str, stream_id: &str, codecs: &[BackendCodec]) -> bool;

    /// Push the peer's candidates
    fn set_remote_candidates(&mut self, call_id: &str, stream_id: &str, candidates: &[Candidate]);

    /// Install our SRTP key on the sending side
    fn set_encryption_key(&mut self, call_id: &str, stream_id: &str, key: &[u8]);

    /// Install the peer's SRTP key on the receiving side
    fn set_decryption_key(&mut self, call_id: &str, stream_id: &str, key: &[u8], key_id: u32);

    /// Pause or resume a stream
    fn set_held(&mut self, call_id: &str, stream_id: &str, held: bool);

    /// Commit to the call's media
    fn accept(&mut self, call_id: &str);

    /// Refuse the call's media
    fn reject(&mut self, call_id: &str);

    /// Tear the call's media down
    fn hang_up(&mut self, call_id: &str);

    /// Tear one stream down
    fn end_stream(&mut self, call_id: &str, stream_id: &str);

    /// Read available bytes from a data stream; 0 when nothing is buffered
    fn read(&mut self, call_id: &str, stream_id: &str, buf: &mut [u8]) -> Result<usize>;

    /// Write bytes to a data stream; may accept fewer than offered,
    /// 0 when the stream cannot take more right now
    fn write(&mut self, call_id: &str, stream_id: &str, data: &[u8]) -> Result<usize>;

    /// Hand over the resolved media-relay list and its credentials
    fn set_media_relays(&mut self, relays: &[MediaRelay], username: &str, password: &str);

    /// The local network IP, when the engine knows one
    fn network_ip(&self) -> Option<String>;
}
