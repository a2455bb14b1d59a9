//! The outbound signalling capability surface
//!
//! The external dialog layer owns transactions, retransmission, and route
//! handling; the state machine only describes what to send. Responses to
//! requests we originate come back through
//! [`MediaManager::on_invite_response`](crate::MediaManager::on_invite_response)
//! tagged with the [`InviteContext`] given here, so there are no callback
//! pointers to juggle.

use crate::signaling::dialog::Dialog;
use crate::signaling::message::SipMessage;

/// Which continuation handles the response to an outbound INVITE
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InviteContext {
    /// First offer or re-offer: the full response state machine runs
    CallResponse,
    /// Candidate-commit re-offer: the response only needs the final ACK
    FinalAck,
}

/// Host capability: the SIP dialog layer
pub trait SignalingApi {
    /// Our Contact header value
    fn contact(&self) -> String;

    /// Send an INVITE on the dialog with the given sequence number
    fn send_invite(
        &mut self,
        dialog: &Dialog,
        cseq: u32,
        extra_headers: &[(String, String)],
        content_type: &str,
        body: &str,
        context: InviteContext,
    );

    /// Send an ACK with the sequence number of the INVITE it acknowledges
    fn send_ack(&mut self, dialog: &Dialog, cseq: u32);

    /// Send a response to a retained inbound request
    fn send_response(
        &mut self,
        to: &SipMessage,
        status: u16,
        reason: &str,
        extra_headers: &[(String, String)],
        body: Option<(&str, &str)>,
    );

    /// Send an INFO on the dialog
    fn send_info(&mut self, dialog: &Dialog, cseq: u32, content_type: &str, body: &str);

    /// Close the session the dialog belongs to (BYE or CANCEL as fits)
    fn close_session(&mut self, dialog: &Dialog);

    /// Send a service request (the MRAS credential post)
    fn send_service(&mut self, uri: &str, content_type: &str, body: &str);
}
