//! Round-trip properties for the SDP wire forms

use commlink_sdp_core::{
    insert_codec, Candidate, CandidateComponent, CandidateKind, CandidateProtocol, Codec,
    IceVersion, MediaType,
};
use proptest::prelude::*;

fn ip_strategy() -> impl Strategy<Value = String> {
    (0u8..=255, 0u8..=255, 0u8..=255, 0u8..=255)
        .prop_map(|(a, b, c, d)| format!("{}.{}.{}.{}", a, b, c, d))
}

fn candidate_strategy() -> impl Strategy<Value = Candidate> {
    (
        "[a-zA-Z0-9]{1,8}",
        prop_oneof![Just(CandidateComponent::Rtp), Just(CandidateComponent::Rtcp)],
        prop_oneof![
            Just(CandidateKind::Host),
            Just(CandidateKind::Relay),
            Just(CandidateKind::ServerReflexive),
        ],
        prop_oneof![
            Just(CandidateProtocol::Udp),
            Just(CandidateProtocol::TcpActive),
            Just(CandidateProtocol::TcpPassive),
        ],
        ip_strategy(),
        1u16..=65535,
        0u32..=4_000_000_000,
    )
        .prop_map(|(foundation, component, kind, protocol, ip, port, priority)| Candidate {
            foundation,
            component,
            kind,
            protocol,
            ip,
            port,
            base_ip: None,
            base_port: None,
            priority,
            username: None,
            password: None,
        })
}

proptest! {
    #[test]
    fn rfc5245_candidate_round_trips(candidate in candidate_strategy()) {
        let value = candidate.to_attribute_value(IceVersion::Rfc5245);
        let reparsed = Candidate::parse(&value).unwrap();
        prop_assert_eq!(reparsed.component, candidate.component);
        prop_assert_eq!(reparsed.kind, candidate.kind);
        prop_assert_eq!(reparsed.protocol, candidate.protocol);
        prop_assert_eq!(reparsed.ip, candidate.ip);
        prop_assert_eq!(reparsed.port, candidate.port);
        prop_assert_eq!(reparsed.priority, candidate.priority);
    }

    #[test]
    fn codec_insertion_never_duplicates_ids(ids in proptest::collection::vec(0u8..=127, 0..32)) {
        let mut codecs: Vec<Codec> = Vec::new();
        for id in ids {
            insert_codec(&mut codecs, Codec::new(id, "PCMU", 8000, MediaType::Audio));
        }
        let mut seen = std::collections::HashSet::new();
        for codec in &codecs {
            prop_assert!(seen.insert(codec.id));
        }
        prop_assert!(codecs.windows(2).all(|w| w[0].id < w[1].id));
    }
}
