//! Conference A/V join scenarios

mod common;

use commlink_media_core::CallError;
use commlink_sdp_core::IceVersion;
use common::*;

#[test]
fn lync2013_conference_join_targets_the_av_focus() {
    let mut config = default_config();
    config.lync2013 = true;
    let mut fx = fixture(config);

    let call_id = fx
        .manager
        .connect_conference("sip:org@contoso.com;gruu;opaque=app:conf:focus:id:abc")
        .unwrap();

    let call = fx.manager.call(&call_id).unwrap();
    assert_eq!(call.with, "sip:org@contoso.com;gruu;opaque=app:conf:audio-video:id:abc");
    assert_eq!(call.ice_version, IceVersion::Rfc5245);
    assert!(call.has_stream("audio"));
    assert_eq!(call.streams.len(), 1);

    let backend = fx.backend.borrow();
    let (_, stream_id, _, ice, _) = backend.created_streams.last().unwrap();
    assert_eq!(stream_id, "audio");
    assert_eq!(*ice, IceVersion::Rfc5245);
}

#[test]
fn pre_lync2013_accounts_join_with_draft6() {
    let mut fx = fixture(default_config());
    let call_id = fx
        .manager
        .connect_conference("sip:org@contoso.com;gruu;opaque=app:conf:focus:id:abc")
        .unwrap();
    assert_eq!(fx.manager.call(&call_id).unwrap().ice_version, IceVersion::Draft6);
}

#[test]
fn conference_without_av_support_is_refused_with_a_notice() {
    let mut fx = fixture(default_config());
    let result = fx.manager.connect_conference("sip:org@contoso.com;gruu;opaque=app:conf:chat:id:abc");
    assert!(matches!(result, Err(CallError::ConferenceUnsupported)));
    assert_eq!(fx.manager.call_count(), 0);
    let host = fx.host.borrow();
    assert!(host.errors.iter().any(|(_, m)| m.contains("does not support audio/video")));
}
