//! Conference audio/video specialisation
//!
//! Joining a conference call means dialling the audio/video focus, whose
//! URI is derived from the chat session id by swapping the focus marker.

use commlink_sdp_core::IceVersion;

use crate::config::MediaConfig;

const FOCUS_MARKER: &str = "app:conf:focus:";
const AV_MARKER: &str = "app:conf:audio-video:";

/// Derive the A/V focus URI from a conference session id
///
/// Returns None when the session id carries no focus marker, i.e. the
/// conference does not advertise audio/video support.
pub fn audio_video_uri(session_uri: &str) -> Option<String> {
    if !session_uri.contains(FOCUS_MARKER) {
        return None;
    }
    Some(session_uri.replace(FOCUS_MARKER, AV_MARKER))
}

/// ICE dialect for conference calls, decided by the server generation
pub fn ice_version(config: &MediaConfig) -> IceVersion {
    if config.lync2013 {
        IceVersion::Rfc5245
    } else {
        IceVersion::Draft6
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn focus_uri_is_rewritten() {
        let uri = audio_video_uri("sip:bob@contoso.com;gruu;opaque=app:conf:focus:id:abc").unwrap();
        assert_eq!(uri, "sip:bob@contoso.com;gruu;opaque=app:conf:audio-video:id:abc");
    }

    #[test]
    fn non_focus_uri_is_refused() {
        assert_eq!(audio_video_uri("sip:bob@contoso.com"), None);
    }

    #[test]
    fn lync2013_accounts_use_rfc5245() {
        let mut config = MediaConfig::new("sip:alice@contoso.com");
        assert_eq!(ice_version(&config), IceVersion::Draft6);
        config.lync2013 = true;
        assert_eq!(ice_version(&config), IceVersion::Rfc5245);
    }
}
