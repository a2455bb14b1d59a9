//! Inbound call scenarios: answering, refusing, encryption policy, and
//! partial failure on re-INVITE

mod common;

use commlink_media_core::{CallState, EncryptionPolicy, InviteContext, SipMessage};
use common::*;

#[test]
fn inbound_call_rings_and_answers_after_accept() {
    let mut fx = fixture(default_config());
    let invite = invite("in-1", "sip:bob@contoso.com", &audio_sdp(""));
    fx.manager.on_invite(&invite).unwrap();

    assert_eq!(fx.signaling.borrow().responses(), vec![(180, "Ringing".to_string())]);
    assert_eq!(fx.host.borrow().incoming_calls.len(), 1);
    assert_eq!(fx.manager.call("in-1").unwrap().state, CallState::RemoteOffering);

    // Stream readiness applies the stored offer but answers nothing yet
    fx.manager.on_stream_initialized("in-1", "audio");
    assert_eq!(fx.signaling.borrow().responses().len(), 1);
    assert_eq!(fx.backend.borrow().remote_codecs.len(), 1);

    fx.manager.accept_call("in-1").unwrap();
    {
        let signaling = fx.signaling.borrow();
        let Some(Sent::Response { status: 200, body: Some((content_type, body)), .. }) =
            signaling.sent.last()
        else {
            panic!("no 200 OK with SDP was sent");
        };
        assert_eq!(content_type, "application/sdp");
        assert!(body.contains("m=audio 5062 RTP/AVP 0"));
    }

    let ack = SipMessage::request("ACK", "sip:alice@contoso.com").with_header("Call-ID", "in-1");
    fx.manager.on_ack(&ack).unwrap();
    assert_eq!(fx.manager.call("in-1").unwrap().state, CallState::Established);
}

#[test]
fn encryption_rejection_yields_488_with_warning() {
    let mut config = default_config();
    config.encryption_policy = EncryptionPolicy::Required;
    let mut fx = fixture(config);

    let sdp = audio_sdp("a=rtpmap:8 PCMA/8000\r\na=encryption:rejected\r\n");
    let invite = invite("in-2", "sip:bob@contoso.com", &sdp);
    fx.manager.on_invite(&invite).unwrap();
    fx.manager.on_stream_initialized("in-2", "audio");

    {
        let signaling = fx.signaling.borrow();
        let Some(Sent::Response { status, reason, headers, .. }) = signaling.sent.last() else {
            panic!("no final response");
        };
        assert_eq!(*status, 488);
        assert_eq!(reason, "Encryption Levels not compatible");
        assert!(headers.iter().any(|(n, v)| {
            n == "Warning" && v == "308 lcs.microsoft.com \"Encryption Levels not compatible\""
        }));
    }
    assert_eq!(fx.backend.borrow().rejected, vec!["in-2".to_string()]);
    assert!(fx.manager.call("in-2").is_none());
    assert!(!fx.host.borrow().errors.is_empty());
}

#[test]
fn second_voice_call_is_answered_busy() {
    let mut fx = fixture(default_config());
    fx.manager.connect_call("sip:bob@contoso.com", false).unwrap();

    let invite = invite("in-3", "sip:carol@contoso.com", &audio_sdp(""));
    fx.manager.on_invite(&invite).unwrap();

    assert_eq!(fx.signaling.borrow().responses(), vec![(486, "Busy Here".to_string())]);
    assert!(fx.manager.call("in-3").is_none());
}

#[test]
fn self_loop_invite_is_refused() {
    let mut fx = fixture(default_config());
    let invite = invite("in-4", "sip:alice@contoso.com", &audio_sdp(""));
    fx.manager.on_invite(&invite).unwrap();

    assert_eq!(
        fx.signaling.borrow().responses(),
        vec![(488, "Not Acceptable Here".to_string())]
    );
    assert!(fx.manager.call("in-4").is_none());
}

#[test]
fn malformed_sdp_is_refused() {
    let mut fx = fixture(default_config());
    let invite = invite("in-5", "sip:bob@contoso.com", "this is not sdp at all");
    assert!(fx.manager.on_invite(&invite).is_err());

    assert_eq!(
        fx.signaling.borrow().responses(),
        vec![(488, "Not Acceptable Here".to_string())]
    );
    assert!(fx.manager.call("in-5").is_none());
}

#[test]
fn cancel_answers_both_transactions() {
    let mut fx = fixture(default_config());
    let invite = invite("in-6", "sip:bob@contoso.com", &audio_sdp(""));
    fx.manager.on_invite(&invite).unwrap();

    let cancel = SipMessage::request("CANCEL", "sip:alice@contoso.com")
        .with_header("Call-ID", "in-6")
        .with_header("From", "<sip:bob@contoso.com>;tag=remote1");
    fx.manager.on_cancel(&cancel).unwrap();

    let signaling = fx.signaling.borrow();
    let tail: Vec<(Option<String>, u16)> = signaling
        .sent
        .iter()
        .filter_map(|s| match s {
            Sent::Response { to_method, status, .. } => Some((to_method.clone(), *status)),
            _ => None,
        })
        .collect();
    assert_eq!(
        tail,
        vec![
            (Some("INVITE".to_string()), 180),
            (Some("CANCEL".to_string()), 200),
            (Some("INVITE".to_string()), 487),
        ]
    );
    assert_eq!(fx.backend.borrow().rejected, vec!["in-6".to_string()]);
    assert!(fx.manager.call("in-6").is_none());
}

#[test]
fn reinvite_with_empty_codec_intersection_fails_only_that_section() {
    let mut fx = fixture(default_config());
    // Establish an audio+video call
    let call_id = fx.manager.connect_call("sip:bob@contoso.com", true).unwrap();
    fx.manager.on_stream_initialized(&call_id, "audio");
    fx.manager.on_stream_initialized(&call_id, "video");
    let answer = audio_sdp("")
        + "m=video 30002 RTP/AVP 121\r\n\
           a=candidate:2 1 UDP 2130706431 192.0.2.7 30002 typ host\r\n\
           a=rtpmap:121 x-rtvc1/90000\r\n";
    let ok = peer_response(&call_id, 200, "OK").with_body("application/sdp", &answer);
    fx.manager.on_invite_response(InviteContext::CallResponse, &ok).unwrap();
    fx.manager.on_candidate_pair_established(&call_id, "audio");
    let ok = peer_response(&call_id, 200, "OK").with_body("application/sdp", &answer);
    fx.manager.on_invite_response(InviteContext::FinalAck, &ok).unwrap();
    assert_eq!(fx.manager.call(&call_id).unwrap().state, CallState::Established);

    // The peer re-INVITEs with a video codec list we refuse entirely
    fx.backend.borrow_mut().refuse_codecs_for.push("video".to_string());
    let reinvite = SipMessage::request("INVITE", "sip:alice@contoso.com")
        .with_header("Call-ID", &call_id)
        .with_header("From", "<sip:bob@contoso.com>;tag=remote1")
        .with_header("To", "<sip:alice@contoso.com>;tag=local1")
        .with_body(
            "application/sdp",
            &(audio_sdp("")
                + "m=video 30002 RTP/AVP 96\r\n\
                   a=candidate:2 1 UDP 2130706431 192.0.2.7 30002 typ host\r\n\
                   a=rtpmap:96 H264/90000\r\n"),
        );
    fx.manager.on_invite(&reinvite).unwrap();

    // The answer keeps audio and echoes video refused with port 0
    {
        let signaling = fx.signaling.borrow();
        let Some(Sent::Response { status: 200, body: Some((_, body)), .. }) =
            signaling.sent.last()
        else {
            panic!("no answer to the re-INVITE");
        };
        assert!(body.contains("m=audio 5062"));
        assert!(body.contains("m=video 0 RTP/AVP"));
    }
    let call = fx.manager.call(&call_id).unwrap();
    assert_eq!(call.state, CallState::Established);
    assert!(call.has_stream("audio"));
    assert!(!call.has_stream("video"));
    assert_eq!(call.failed_media.len(), 1);
    assert_eq!(fx.backend.borrow().ended_streams, vec![(call_id.clone(), "video".to_string())]);
}

#[test]
fn sign_out_answers_unaccepted_calls_and_closes_the_rest() {
    let mut fx = fixture(default_config());
    // One ringing inbound data call (exempt from the voice-call rule) and
    // one established-ish outbound call
    let out_id = fx.manager.connect_call("sip:bob@contoso.com", false).unwrap();
    fx.manager.on_stream_initialized(&out_id, "audio");

    let publish = r#"<request xmlns="http://schemas.microsoft.com/rtc/2009/05/filetransfer" requestId="1"><publishFile><fileInfo event="publish"><id>{X}</id><name>y.bin</name><size>10</size></fileInfo></publishFile></request>"#;
    let (content_type, body) = commlink_media_core::signaling::build_multipart(
        "mixed",
        &[
            commlink_media_core::signaling::MessagePart::new(
                "application/ms-filetransfer+xml",
                publish,
            ),
            commlink_media_core::signaling::MessagePart::new("application/sdp", &data_sdp()),
        ],
    );
    let invite = SipMessage::request("INVITE", "sip:alice@contoso.com")
        .with_header("Call-ID", "in-7")
        .with_header("From", "<sip:carol@contoso.com>;tag=remote2")
        .with_body(&content_type, &body);
    fx.manager.on_invite(&invite).unwrap();

    fx.manager.shutdown();

    let signaling = fx.signaling.borrow();
    assert!(signaling
        .sent
        .iter()
        .any(|s| matches!(s, Sent::Response { status: 480, .. })));
    assert!(signaling
        .sent
        .iter()
        .any(|s| matches!(s, Sent::Close { call_id } if call_id == &out_id)));
    let hung = &fx.backend.borrow().hung_up;
    assert!(hung.contains(&out_id));
    assert!(hung.contains(&"in-7".to_string()));
    assert_eq!(fx.manager.call_count(), 0);
}
