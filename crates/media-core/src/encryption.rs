//! SRTP encryption policy negotiation
//!
//! The wire carries three levels (`rejected`, `optional`, `required`); the
//! account setting adds a fourth, "obey the server", which resolves to the
//! server's advertised default. Calls running at the server default emit no
//! `encryption` attribute at all, so they look identical to pre-policy
//! clients.

use commlink_sdp_core::EncryptionLevel;
use serde::{Deserialize, Serialize};

/// Per-account encryption policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EncryptionPolicy {
    /// Follow the server's advertised default
    Obey,
    /// Never encrypt media
    Rejected,
    /// Encrypt when the peer can
    Optional,
    /// Refuse calls that cannot be encrypted
    Required,
}

impl EncryptionPolicy {
    /// Resolve the policy against the server default
    pub fn resolve(self, server_default: EncryptionLevel) -> EncryptionLevel {
        match self {
            EncryptionPolicy::Obey => server_default,
            EncryptionPolicy::Rejected => EncryptionLevel::Rejected,
            EncryptionPolicy::Optional => EncryptionLevel::Optional,
            EncryptionPolicy::Required => EncryptionLevel::Required,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn obey_takes_server_default() {
        assert_eq!(
            EncryptionPolicy::Obey.resolve(EncryptionLevel::Required),
            EncryptionLevel::Required
        );
        assert_eq!(
            EncryptionPolicy::Obey.resolve(EncryptionLevel::Optional),
            EncryptionLevel::Optional
        );
    }

    #[test]
    fn explicit_policy_wins() {
        assert_eq!(
            EncryptionPolicy::Rejected.resolve(EncryptionLevel::Required),
            EncryptionLevel::Rejected
        );
    }
}
