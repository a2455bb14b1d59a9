//! The dialog fields the call state machine owns
//!
//! Retransmission, route sets, and transaction matching live in the
//! external dialog layer. The call state machine only needs the identity
//! tuple and the cseq counter it bumps on each request it originates.

use rand::rngs::OsRng;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{CallError, Result};
use crate::signaling::message::SipMessage;

/// Dialog state for one media call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dialog {
    /// SIP Call-ID
    pub call_id: String,
    /// Remote party URI
    pub with: String,
    /// Our tag
    pub local_tag: String,
    /// Peer tag, once learned
    pub remote_tag: Option<String>,
    /// Sequence number of the last request we sent
    pub cseq: u32,
}

impl Dialog {
    /// Dialog for a call we originate; cseq starts at zero
    pub fn outgoing(call_id: &str, with: &str) -> Dialog {
        Dialog {
            call_id: call_id.to_string(),
            with: with.to_string(),
            local_tag: generate_tag(),
            remote_tag: None,
            cseq: 0,
        }
    }

    /// Dialog initialised from an inbound INVITE
    pub fn from_invite(message: &SipMessage) -> Result<Dialog> {
        let call_id = message.call_id()?.to_string();
        let with = message
            .from_uri()
            .ok_or(CallError::MissingHeader { header: "From" })?;
        Ok(Dialog {
            call_id,
            with,
            local_tag: generate_tag(),
            remote_tag: message.from_tag(),
            cseq: 0,
        })
    }

    /// Advance the sequence counter for the next request
    pub fn bump_cseq(&mut self) -> u32 {
        self.cseq += 1;
        self.cseq
    }
}

fn generate_tag() -> String {
    format!("{:08x}", OsRng.gen::<u32>())
}
