//! Per-session configuration for the media subsystem
//!
//! Everything that used to be process-global in older Communicator clients
//! lives here and travels inside the [`MediaManager`](crate::MediaManager):
//! identity URIs, server generation flags, encryption policy, and the
//! per-media-type port ranges the backend gathers candidates from.

use commlink_sdp_core::EncryptionLevel;
use serde::{Deserialize, Serialize};

use crate::encryption::EncryptionPolicy;

/// An inclusive local port range for candidate gathering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortRange {
    /// Lowest usable port
    pub min: u16,
    /// Highest usable port
    pub max: u16,
}

impl Default for PortRange {
    fn default() -> PortRange {
        PortRange { min: 1024, max: 65535 }
    }
}

/// Session-wide settings consumed by the call state machine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaConfig {
    /// Our own SIP URI
    pub self_uri: String,
    /// Unified-communications line URI; when set, outbound INVITEs carry
    /// `P-Preferred-Identity`
    pub line_uri: Option<String>,
    /// MRAS service URI for media-relay credentials
    pub mras_uri: Option<String>,
    /// Server is OCS 2007 or newer (SRTP capable)
    pub ocs2007: bool,
    /// Account is homed on Lync 2013
    pub lync2013: bool,
    /// URI of the audio test bot, when provisioned
    pub test_call_uri: Option<String>,
    /// Session connects from outside the corporate network
    pub remote_session: bool,
    /// Account encryption policy
    pub encryption_policy: EncryptionPolicy,
    /// Server-advertised default encryption level
    pub server_encryption_level: EncryptionLevel,
    /// General port range, used when no media-specific one is set
    pub port_range: PortRange,
    /// Port range for audio streams
    pub audio_ports: Option<PortRange>,
    /// Port range for video streams
    pub video_ports: Option<PortRange>,
    /// Port range for file-transfer data streams
    pub filetransfer_ports: Option<PortRange>,
    /// Port range for application-sharing streams
    pub appsharing_ports: Option<PortRange>,
}

impl MediaConfig {
    /// Defaults for a signed-in account
    pub fn new(self_uri: &str) -> MediaConfig {
        MediaConfig {
            self_uri: self_uri.to_string(),
            line_uri: None,
            mras_uri: None,
            ocs2007: true,
            lync2013: false,
            test_call_uri: None,
            remote_session: false,
            encryption_policy: EncryptionPolicy::Obey,
            server_encryption_level: EncryptionLevel::Optional,
            port_range: PortRange::default(),
            audio_ports: None,
            video_ports: None,
            filetransfer_ports: None,
            appsharing_ports: None,
        }
    }

    /// The port range to gather candidates from for a given stream
    pub fn ports_for_stream(&self, stream_id: &str) -> PortRange {
        let specific = match stream_id {
            "audio" => self.audio_ports,
            "video" => self.video_ports,
            "data" => self.filetransfer_ports,
            "applicationsharing" => self.appsharing_ports,
            _ => None,
        };
        specific.unwrap_or(self.port_range)
    }

    /// The encryption level this session actually runs at
    pub fn effective_encryption(&self) -> EncryptionLevel {
        // Pre-2007 servers have no SRTP; force-reject so no key material
        // is ever generated against them
        if !self.ocs2007 && !self.lync2013 {
            return EncryptionLevel::Rejected;
        }
        self.encryption_policy.resolve(self.server_encryption_level)
    }

    /// User part of our SIP URI, used as the RTP cname
    pub fn cname(&self) -> String {
        let uri = self.self_uri.strip_prefix("sip:").unwrap_or(&self.self_uri);
        uri.split('@').next().unwrap_or(uri).to_string()
    }
}
