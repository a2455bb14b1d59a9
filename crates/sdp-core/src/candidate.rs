//! ICE candidate model and both wire dialects
//!
//! Deployed Communicator/Lync servers speak one of two candidate formats:
//! the legacy draft-6 form
//! `a=candidate:<username> <component> <password> <transport> 0.<priority> <ip> <port>`
//! and the RFC 5245 form
//! `a=candidate:<foundation> <component> <transport> <priority> <ip> <port> typ <type> [raddr <ip>] [rport <port>]`.
//! The `typ` keyword is what tells them apart on parse.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SdpError};

/// Which ICE dialect a call negotiates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IceVersion {
    /// Legacy MS draft-6 dialect, spoken by OCS 2007 era servers
    Draft6,
    /// RFC 5245 dialect, spoken by Lync servers
    Rfc5245,
}

impl IceVersion {
    /// The other dialect, used when recovering from version-mismatch rejections
    pub fn toggled(self) -> IceVersion {
        match self {
            IceVersion::Draft6 => IceVersion::Rfc5245,
            IceVersion::Rfc5245 => IceVersion::Draft6,
        }
    }
}

/// Candidate component, RTP or RTCP
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CandidateComponent {
    /// RTP flow (component id 1)
    Rtp,
    /// RTCP flow (component id 2)
    Rtcp,
}

impl CandidateComponent {
    /// Numeric component id as carried on the wire
    pub fn id(self) -> u32 {
        match self {
            CandidateComponent::Rtp => 1,
            CandidateComponent::Rtcp => 2,
        }
    }

    fn from_id(id: u32) -> Option<CandidateComponent> {
        match id {
            1 => Some(CandidateComponent::Rtp),
            2 => Some(CandidateComponent::Rtcp),
            _ => None,
        }
    }
}

/// Candidate type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CandidateKind {
    /// Directly attached address
    Host,
    /// Media-relay allocated address
    Relay,
    /// Server-reflexive address
    ServerReflexive,
    /// Peer-reflexive address
    PeerReflexive,
    /// Unknown type; draft-6 candidates do not carry one on the wire
    Any,
}

impl CandidateKind {
    fn token(self) -> &'static str {
        match self {
            CandidateKind::Host => "host",
            CandidateKind::Relay => "relay",
            CandidateKind::ServerReflexive => "srflx",
            CandidateKind::PeerReflexive => "prflx",
            CandidateKind::Any => "host",
        }
    }

    fn from_token(token: &str) -> Option<CandidateKind> {
        match token {
            "host" => Some(CandidateKind::Host),
            "relay" => Some(CandidateKind::Relay),
            "srflx" => Some(CandidateKind::ServerReflexive),
            "prflx" => Some(CandidateKind::PeerReflexive),
            _ => None,
        }
    }
}

/// Transport protocol of a candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CandidateProtocol {
    /// Plain UDP
    Udp,
    /// TCP, this side connects
    TcpActive,
    /// TCP, this side listens
    TcpPassive,
}

impl CandidateProtocol {
    fn token(self) -> &'static str {
        match self {
            CandidateProtocol::Udp => "UDP",
            CandidateProtocol::TcpActive => "TCP-ACT",
            CandidateProtocol::TcpPassive => "TCP-PASS",
        }
    }

    fn from_token(token: &str) -> Option<CandidateProtocol> {
        match token.to_ascii_uppercase().as_str() {
            "UDP" => Some(CandidateProtocol::Udp),
            "TCP-ACT" => Some(CandidateProtocol::TcpActive),
            "TCP-PASS" => Some(CandidateProtocol::TcpPassive),
            _ => None,
        }
    }
}

/// A single ICE candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// Foundation string grouping related candidates
    pub foundation: String,
    /// RTP or RTCP component
    pub component: CandidateComponent,
    /// Candidate type
    pub kind: CandidateKind,
    /// Transport protocol
    pub protocol: CandidateProtocol,
    /// Advertised address
    pub ip: String,
    /// Advertised port
    pub port: u16,
    /// Base (related) address, when known
    pub base_ip: Option<String>,
    /// Base (related) port, when known
    pub base_port: Option<u16>,
    /// Candidate priority
    pub priority: u32,
    /// Per-candidate ICE username (draft-6 carries it on the line itself)
    pub username: Option<String>,
    /// Per-candidate ICE password
    pub password: Option<String>,
}

impl Candidate {
    /// Parse a candidate attribute value, auto-detecting the dialect
    pub fn parse(value: &str) -> Result<Candidate> {
        let parts: Vec<&str> = value.split_whitespace().collect();
        if parts.iter().any(|p| *p == "typ") {
            Candidate::parse_rfc5245(&parts, value)
        } else {
            Candidate::parse_draft6(&parts, value)
        }
    }

    /// True when the attribute value is in the RFC 5245 form
    pub fn value_is_rfc5245(value: &str) -> bool {
        value.split_whitespace().any(|p| p == "typ")
    }

    fn parse_rfc5245(parts: &[&str], raw: &str) -> Result<Candidate> {
        if parts.len() < 8 {
            return Err(SdpError::InvalidField { item: "candidate", value: raw.to_string() });
        }

        let component = parts[1]
            .parse::<u32>()
            .ok()
            .and_then(CandidateComponent::from_id)
            .ok_or(SdpError::InvalidField { item: "candidate component", value: parts[1].to_string() })?;
        let protocol = CandidateProtocol::from_token(parts[2])
            .ok_or(SdpError::InvalidField { item: "candidate transport", value: parts[2].to_string() })?;
        let priority = parts[3]
            .parse::<u32>()
            .map_err(|_| SdpError::InvalidField { item: "candidate priority", value: parts[3].to_string() })?;
        let port = parts[5]
            .parse::<u16>()
            .map_err(|_| SdpError::InvalidField { item: "candidate port", value: parts[5].to_string() })?;
        if parts[6] != "typ" {
            return Err(SdpError::InvalidField { item: "candidate", value: raw.to_string() });
        }
        let kind = CandidateKind::from_token(parts[7])
            .ok_or(SdpError::InvalidField { item: "candidate type", value: parts[7].to_string() })?;

        let mut base_ip = None;
        let mut base_port = None;
        let mut idx = 8;
        while idx + 1 < parts.len() {
            match parts[idx] {
                "raddr" => base_ip = Some(parts[idx + 1].to_string()),
                "rport" => {
                    base_port = Some(parts[idx + 1].parse::<u16>().map_err(|_| {
                        SdpError::InvalidField { item: "candidate rport", value: parts[idx + 1].to_string() }
                    })?)
                }
                _ => {}
            }
            idx += 2;
        }

        Ok(Candidate {
            foundation: parts[0].to_string(),
            component,
            kind,
            protocol,
            ip: parts[4].to_string(),
            port,
            base_ip,
            base_port,
            priority,
            username: None,
            password: None,
        })
    }

    fn parse_draft6(parts: &[&str], raw: &str) -> Result<Candidate> {
        if parts.len() < 7 {
            return Err(SdpError::InvalidField { item: "candidate", value: raw.to_string() });
        }

        let component = parts[1]
            .parse::<u32>()
            .ok()
            .and_then(CandidateComponent::from_id)
            .ok_or(SdpError::InvalidField { item: "candidate component", value: parts[1].to_string() })?;
        let protocol = CandidateProtocol::from_token(parts[3])
            .ok_or(SdpError::InvalidField { item: "candidate transport", value: parts[3].to_string() })?;
        // Priority is a q-value, "0.830" meaning 830
        let priority = parts[4]
            .strip_prefix("0.")
            .and_then(|digits| digits.parse::<u32>().ok())
            .ok_or(SdpError::InvalidField { item: "candidate priority", value: parts[4].to_string() })?;
        let port = parts[6]
            .parse::<u16>()
            .map_err(|_| SdpError::InvalidField { item: "candidate port", value: parts[6].to_string() })?;

        Ok(Candidate {
            foundation: parts[0].to_string(),
            component,
            kind: CandidateKind::Any,
            protocol,
            ip: parts[5].to_string(),
            port,
            base_ip: None,
            base_port: None,
            priority,
            username: Some(parts[0].to_string()),
            password: Some(parts[2].to_string()),
        })
    }

    /// Serialise the attribute value in the requested dialect
    pub fn to_attribute_value(&self, ice_version: IceVersion) -> String {
        match ice_version {
            IceVersion::Rfc5245 => {
                let mut line = format!(
                    "{} {} {} {} {} {} typ {}",
                    self.foundation,
                    self.component.id(),
                    self.protocol.token(),
                    self.priority,
                    self.ip,
                    self.port,
                    self.kind.token(),
                );
                if let (Some(base_ip), Some(base_port)) = (&self.base_ip, self.base_port) {
                    line.push_str(&format!(" raddr {} rport {}", base_ip, base_port));
                }
                line
            }
            IceVersion::Draft6 => format!(
                "{} {} {} {} 0.{} {} {}",
                self.username.as_deref().unwrap_or(&self.foundation),
                self.component.id(),
                self.password.as_deref().unwrap_or("-"),
                self.protocol.token(),
                self.priority,
                self.ip,
                self.port,
            ),
        }
    }
}

/// Stable sort by (foundation, username, component)
pub fn sort_candidates(candidates: &mut [Candidate]) {
    candidates.sort_by(|a, b| {
        (&a.foundation, &a.username, a.component).cmp(&(&b.foundation, &b.username, b.component))
    });
}

/// Normalise a backend-reported candidate list into something servers accept
///
/// Three interoperability fixups, applied in order:
/// 1. IPv6 candidates are dropped outright (the wire dialect is IP4 only).
/// 2. Among UDP candidates sharing a foundation, two non-host entries on the
///    same IP with an equal port or equal base port are both discarded; old
///    backends misreport TCP candidate pairs as UDP this way.
/// 3. TCP-active candidates advertised with port 0 inherit the port of the
///    matching TCP-passive candidate, and relay candidates missing a base
///    port inherit it from a host candidate with the same base IP.
pub fn normalize_candidates(candidates: Vec<Candidate>) -> Vec<Candidate> {
    let mut kept: Vec<Candidate> = candidates
        .into_iter()
        .filter(|c| {
            let v6 = c.ip.contains(':') || c.base_ip.as_deref().is_some_and(|ip| ip.contains(':'));
            if v6 {
                tracing::debug!(ip = %c.ip, "dropping IPv6 candidate");
            }
            !v6
        })
        .collect();

    let mut discard = vec![false; kept.len()];
    for i in 0..kept.len() {
        for j in (i + 1)..kept.len() {
            let (a, b) = (&kept[i], &kept[j]);
            if a.protocol != CandidateProtocol::Udp || b.protocol != CandidateProtocol::Udp {
                continue;
            }
            if a.foundation != b.foundation || a.ip != b.ip {
                continue;
            }
            if a.kind == CandidateKind::Host || b.kind == CandidateKind::Host {
                continue;
            }
            let same_port = a.port == b.port;
            let same_base = a.base_port.is_some() && a.base_port == b.base_port;
            if same_port || same_base {
                // Mistagged TCP pair, both halves are useless as UDP
                discard[i] = true;
                discard[j] = true;
            }
        }
    }
    let mut index = 0;
    kept.retain(|_| {
        let keep = !discard[index];
        index += 1;
        keep
    });

    for i in 0..kept.len() {
        if kept[i].protocol == CandidateProtocol::TcpActive && kept[i].port == 0 {
            let inherited = kept.iter().find_map(|other| {
                (other.protocol == CandidateProtocol::TcpPassive
                    && other.kind == kept[i].kind
                    && other.ip == kept[i].ip
                    && other.base_ip == kept[i].base_ip)
                    .then_some(other.port)
            });
            if let Some(port) = inherited {
                kept[i].port = port;
            }
        }
        if kept[i].kind == CandidateKind::Relay && kept[i].base_port.unwrap_or(0) == 0 {
            let inherited = kept.iter().find_map(|other| {
                (other.kind == CandidateKind::Host
                    && other.base_ip.is_some()
                    && other.base_ip == kept[i].base_ip)
                    .then_some(other.base_port)
            });
            if let Some(base_port) = inherited {
                kept[i].base_port = base_port;
            }
        }
    }

    kept
}

/// Transport address chosen for a media section's `m=`/`c=` lines
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaAddress {
    /// Connection IP for the section
    pub ip: String,
    /// RTP port for the `m=` line
    pub rtp_port: u16,
    /// RTCP port for the `a=rtcp` attribute, when one exists
    pub rtcp_port: Option<u16>,
}

/// Pick the section address from a candidate list
///
/// Prefers a host candidate's IP, then fills the RTP port from the
/// component-RTP entry on that IP and the RTCP port from the component-RTCP
/// entry. Scanning stops as soon as both are filled. Falls back to the
/// first candidate of any type when no host candidate exists.
pub fn select_media_address(candidates: &[Candidate]) -> Option<MediaAddress> {
    let anchor = candidates
        .iter()
        .find(|c| c.kind == CandidateKind::Host)
        .or_else(|| candidates.first())?;

    let ip = anchor.ip.clone();
    let mut rtp_port = None;
    let mut rtcp_port = None;
    for candidate in candidates.iter().filter(|c| c.ip == ip) {
        match candidate.component {
            CandidateComponent::Rtp if rtp_port.is_none() => rtp_port = Some(candidate.port),
            CandidateComponent::Rtcp if rtcp_port.is_none() => rtcp_port = Some(candidate.port),
            _ => {}
        }
        if rtp_port.is_some() && rtcp_port.is_some() {
            break;
        }
    }

    Some(MediaAddress { ip, rtp_port: rtp_port.unwrap_or(anchor.port), rtcp_port })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host(foundation: &str, component: CandidateComponent, ip: &str, port: u16) -> Candidate {
        Candidate {
            foundation: foundation.to_string(),
            component,
            kind: CandidateKind::Host,
            protocol: CandidateProtocol::Udp,
            ip: ip.to_string(),
            port,
            base_ip: Some(ip.to_string()),
            base_port: Some(port),
            priority: 830,
            username: Some("ufrag".to_string()),
            password: Some("pass".to_string()),
        }
    }

    #[test]
    fn parse_rfc5245_host() {
        let c = Candidate::parse("1 1 UDP 2130706431 10.0.1.1 8998 typ host").unwrap();
        assert_eq!(c.foundation, "1");
        assert_eq!(c.component, CandidateComponent::Rtp);
        assert_eq!(c.kind, CandidateKind::Host);
        assert_eq!(c.protocol, CandidateProtocol::Udp);
        assert_eq!(c.ip, "10.0.1.1");
        assert_eq!(c.port, 8998);
        assert_eq!(c.base_ip, None);
    }

    #[test]
    fn parse_rfc5245_relay_with_raddr() {
        let c = Candidate::parse("3 2 TCP-PASS 16777215 192.0.2.3 45664 typ relay raddr 10.0.1.1 rport 8998")
            .unwrap();
        assert_eq!(c.kind, CandidateKind::Relay);
        assert_eq!(c.protocol, CandidateProtocol::TcpPassive);
        assert_eq!(c.component, CandidateComponent::Rtcp);
        assert_eq!(c.base_ip.as_deref(), Some("10.0.1.1"));
        assert_eq!(c.base_port, Some(8998));
    }

    #[test]
    fn parse_draft6() {
        let c = Candidate::parse("dl0fR8KK 1 fVpqzD8h UDP 0.830 10.1.1.1 21244").unwrap();
        assert_eq!(c.kind, CandidateKind::Any);
        assert_eq!(c.priority, 830);
        assert_eq!(c.username.as_deref(), Some("dl0fR8KK"));
        assert_eq!(c.password.as_deref(), Some("fVpqzD8h"));
        assert_eq!(c.port, 21244);
    }

    #[test]
    fn draft6_round_trip() {
        let value = "dl0fR8KK 1 fVpqzD8h UDP 0.830 10.1.1.1 21244";
        let c = Candidate::parse(value).unwrap();
        assert_eq!(c.to_attribute_value(IceVersion::Draft6), value);
    }

    #[test]
    fn rfc5245_round_trip() {
        let value = "3 1 UDP 16777215 192.0.2.3 45664 typ relay raddr 10.0.1.1 rport 8998";
        let c = Candidate::parse(value).unwrap();
        assert_eq!(c.to_attribute_value(IceVersion::Rfc5245), value);
    }

    #[test]
    fn parse_rejects_malformed() {
        assert!(Candidate::parse("1 1 UDP 2130706431 10.0.1.1").is_err());
        assert!(Candidate::parse("1 9 UDP 2130706431 10.0.1.1 8998 typ host").is_err());
        assert!(Candidate::parse("1 1 SCTP 2130706431 10.0.1.1 8998 typ host").is_err());
        assert!(Candidate::parse("1 1 UDP 2130706431 10.0.1.1 8998 typ unknown").is_err());
    }

    #[test]
    fn sort_is_stable_by_foundation_username_component() {
        let mut list = vec![
            host("2", CandidateComponent::Rtcp, "10.0.0.1", 5001),
            host("1", CandidateComponent::Rtcp, "10.0.0.1", 4001),
            host("1", CandidateComponent::Rtp, "10.0.0.1", 4000),
            host("2", CandidateComponent::Rtp, "10.0.0.1", 5000),
        ];
        sort_candidates(&mut list);
        let order: Vec<(String, u32)> =
            list.iter().map(|c| (c.foundation.clone(), c.component.id())).collect();
        assert_eq!(
            order,
            vec![
                ("1".to_string(), 1),
                ("1".to_string(), 2),
                ("2".to_string(), 1),
                ("2".to_string(), 2),
            ]
        );
    }

    #[test]
    fn normalize_drops_ipv6() {
        let mut v6 = host("1", CandidateComponent::Rtp, "2001:db8::1", 4000);
        v6.base_ip = None;
        let kept = normalize_candidates(vec![v6, host("1", CandidateComponent::Rtp, "10.0.0.1", 4000)]);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].ip, "10.0.0.1");
    }

    #[test]
    fn normalize_discards_mistagged_tcp_pair() {
        let mut a = host("f1", CandidateComponent::Rtp, "192.0.2.1", 7000);
        a.kind = CandidateKind::Relay;
        let mut b = host("f1", CandidateComponent::Rtcp, "192.0.2.1", 7000);
        b.kind = CandidateKind::Relay;
        // A genuine host pair on distinct ports survives
        let keep_a = host("f2", CandidateComponent::Rtp, "10.0.0.1", 4000);
        let keep_b = host("f2", CandidateComponent::Rtcp, "10.0.0.1", 4001);

        let kept = normalize_candidates(vec![a, b, keep_a, keep_b]);
        assert_eq!(kept.len(), 2);
        assert!(kept.iter().all(|c| c.foundation == "f2"));
    }

    #[test]
    fn normalize_infers_tcp_active_port() {
        let mut active = host("f1", CandidateComponent::Rtp, "192.0.2.1", 0);
        active.protocol = CandidateProtocol::TcpActive;
        active.kind = CandidateKind::Relay;
        let mut passive = host("f2", CandidateComponent::Rtp, "192.0.2.1", 7100);
        passive.protocol = CandidateProtocol::TcpPassive;
        passive.kind = CandidateKind::Relay;

        let kept = normalize_candidates(vec![active, passive]);
        let active = kept
            .iter()
            .find(|c| c.protocol == CandidateProtocol::TcpActive)
            .unwrap();
        assert_eq!(active.port, 7100);
    }

    #[test]
    fn normalize_inherits_relay_base_port_from_host() {
        let mut relay = host("f1", CandidateComponent::Rtp, "198.51.100.7", 3478);
        relay.kind = CandidateKind::Relay;
        relay.base_ip = Some("10.0.0.1".to_string());
        relay.base_port = None;
        let anchor = host("f2", CandidateComponent::Rtp, "10.0.0.1", 4000);

        let kept = normalize_candidates(vec![relay, anchor]);
        let relay = kept.iter().find(|c| c.kind == CandidateKind::Relay).unwrap();
        assert_eq!(relay.base_port, Some(4000));
    }

    #[test]
    fn select_address_prefers_host() {
        let mut relay = host("f1", CandidateComponent::Rtp, "198.51.100.7", 3478);
        relay.kind = CandidateKind::Relay;
        let list = vec![
            relay,
            host("f2", CandidateComponent::Rtp, "10.0.0.1", 4000),
            host("f2", CandidateComponent::Rtcp, "10.0.0.1", 4001),
        ];
        let addr = select_media_address(&list).unwrap();
        assert_eq!(addr.ip, "10.0.0.1");
        assert_eq!(addr.rtp_port, 4000);
        assert_eq!(addr.rtcp_port, Some(4001));
    }

    #[test]
    fn select_address_falls_back_to_any_candidate() {
        let mut relay = host("f1", CandidateComponent::Rtp, "198.51.100.7", 3478);
        relay.kind = CandidateKind::Relay;
        let addr = select_media_address(&[relay]).unwrap();
        assert_eq!(addr.ip, "198.51.100.7");
        assert_eq!(addr.rtp_port, 3478);
        assert_eq!(addr.rtcp_port, None);
    }

    #[test]
    fn select_address_empty_list() {
        assert_eq!(select_media_address(&[]), None);
    }
}
