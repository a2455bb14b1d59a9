//! Responses to INVITEs we sent: error mapping, ICE-version recovery,
//! and the final ACK

use commlink_sdp_core::{IceVersion, SdpMessage};

use crate::call::CallState;
use crate::error::{CallError, Result};
use crate::manager::inbound::{apply_remote_message, ApplyOutcome};
use crate::manager::{MediaManager, CALL_ERROR_TITLE};
use crate::signaling::{InviteContext, SipMessage};

/// Verbatim reason phrase of the archiving proxy that cannot stomach
/// multipart ICEv19 offers; note the server-side typo
const ARCHIVING_REASON: &str =
    "Mutipart mime in content type not supported by Archiving CDR service";

const ENCRYPTION_REASON: &str = "Encryption Levels not compatible";

/// What a failure response leads to
enum FailureAction {
    /// Surface and tear down
    Fatal(String),
    /// Hang up and redial under the other ICE dialect
    Retry(IceVersion),
}

impl MediaManager {
    /// A response to one of our INVITEs arrived
    pub fn on_invite_response(&mut self, context: InviteContext, message: &SipMessage) -> Result<()> {
        let call_id = message.call_id()?.to_string();
        if !self.calls.contains_key(&call_id) {
            tracing::debug!(call_id = %call_id, "response for a call that is gone");
            return Ok(());
        }
        let status = message.status.unwrap_or(0);

        match context {
            InviteContext::CallResponse => {
                if status >= 400 {
                    self.handle_invite_failure(&call_id, status, message)
                } else if (200..300).contains(&status) {
                    self.handle_invite_success(&call_id, message)
                } else {
                    Ok(()) // provisional, nothing to do
                }
            }
            InviteContext::FinalAck => self.handle_final_ack_response(&call_id, status, message),
        }
    }

    /// A usable candidate pair exists; initiators commit it with a re-offer
    pub fn on_candidate_pair_established(&mut self, call_id: &str, stream_id: &str) {
        tracing::debug!(call_id, stream_id, "candidate pair established");
        let send_commit = {
            let Some(call) = self.calls.get_mut(call_id) else { return };
            if let Some(transfer) = call.transfer_mut() {
                transfer.connected = true;
            }
            call.initiator
                && call.state == CallState::LocalOffering
                && !call.final_offer_sent
                && call.streams.iter().any(|s| s.remote_set)
        };
        if send_commit {
            if let Some(call) = self.calls.get_mut(call_id) {
                call.final_offer_sent = true;
            }
            if let Err(e) = self.send_invite_offer(call_id, InviteContext::FinalAck) {
                tracing::warn!(call_id, error = %e, "could not send the commit re-offer");
            }
        }
        self.drive_transfer(call_id);
    }

    fn handle_invite_failure(
        &mut self,
        call_id: &str,
        status: u16,
        message: &SipMessage,
    ) -> Result<()> {
        let (with, with_video, test_call, cseq) = {
            let Some(call) = self.calls.get(call_id) else { return Ok(()) };
            (call.with.clone(), call.with_video, call.test_call, call.dialog.cseq)
        };
        let reason = message.reason.clone().unwrap_or_default();
        let first_request = cseq == 1;

        let action = match status {
            480 => {
                if message.warning_code() == Some(391) {
                    FailureAction::Fatal(format!("{} does not want to be disturbed", with))
                } else {
                    FailureAction::Fatal(format!("{} is currently not available", with))
                }
            }
            603 | 605 => FailureAction::Fatal(format!("{} rejected the call", with)),
            415 if reason == ARCHIVING_REASON && first_request => {
                FailureAction::Retry(IceVersion::Draft6)
            }
            488 if reason == ENCRYPTION_REASON
                || message.ms_client_diagnostics_code() == Some(52017) =>
            {
                FailureAction::Fatal(
                    "Encryption settings of the peer are incompatible with ours.".to_string(),
                )
            }
            488 if message.ms_diagnostics_code() == Some(7008) && first_request => {
                FailureAction::Retry(IceVersion::Rfc5245)
            }
            _ => {
                let mut text = format!("{} {}", status, reason);
                if let Some(diag) = message.ms_diagnostics_reason() {
                    text.push_str(&format!(" ({})", diag));
                }
                FailureAction::Fatal(text)
            }
        };

        match action {
            FailureAction::Fatal(text) => {
                self.host.notify_error(CALL_ERROR_TITLE, &text);
                self.remove_call(call_id, false);
                Ok(())
            }
            FailureAction::Retry(ice_version) => {
                tracing::info!(call_id, ?ice_version, "peer wants the other ICE dialect, redialling");
                self.remove_call(call_id, false);
                self.start_call(&with, with_video, ice_version, test_call)?;
                Ok(())
            }
        }
    }

    fn handle_invite_success(&mut self, call_id: &str, message: &SipMessage) -> Result<()> {
        let parsed = message.sdp_body().ok_or(CallError::Sdp {
            source: commlink_sdp_core::SdpError::NoMediaSections,
        }).and_then(|text| SdpMessage::parse(&text).map_err(CallError::from));
        let smsg = match parsed {
            Ok(smsg) => smsg,
            Err(e) => {
                self.ack_current(call_id);
                self.host.notify_error(CALL_ERROR_TITLE, "The peer sent an unusable answer.");
                self.remove_call(call_id, true);
                return Err(e);
            }
        };

        let outcome = {
            let Self { config, backend, calls, .. } = self;
            let Some(call) = calls.get_mut(call_id) else { return Ok(()) };
            call.dialog.remote_tag = message.to_tag().or(call.dialog.remote_tag.take());
            apply_remote_message(&mut **backend, config, call, smsg)
        };

        self.ack_current(call_id);

        if outcome == ApplyOutcome::AllFailed {
            self.host.notify_error(CALL_ERROR_TITLE, "The peer refused every media stream.");
            self.remove_call(call_id, true);
            return Ok(());
        }
        let compatible = self.calls.get(call_id).map(|c| c.encryption_compatible).unwrap_or(true);
        if !compatible {
            self.host.notify_error(
                CALL_ERROR_TITLE,
                "Encryption settings of the peer are incompatible with ours.",
            );
            self.remove_call(call_id, true);
            return Err(CallError::EncryptionIncompatible);
        }

        if let Some(call) = self.calls.get_mut(call_id) {
            if call.state == CallState::Reinviting {
                // Hold/unhold round trip finished
                call.set_state(CallState::Established);
            }
            // Initial offers stay in LocalOffering until the backend
            // reports a usable candidate pair
        }
        Ok(())
    }

    fn handle_final_ack_response(
        &mut self,
        call_id: &str,
        status: u16,
        message: &SipMessage,
    ) -> Result<()> {
        if !(200..300).contains(&status) {
            if status >= 400 {
                let reason = message.reason.clone().unwrap_or_default();
                self.host
                    .notify_error(CALL_ERROR_TITLE, &format!("{} {}", status, reason));
                self.remove_call(call_id, true);
            }
            return Ok(());
        }
        self.ack_current(call_id);
        if let Some(call) = self.calls.get_mut(call_id) {
            call.set_state(CallState::Established);
        }
        self.backend.accept(call_id);
        self.host.call_established(call_id);
        self.drive_transfer(call_id);
        Ok(())
    }

    /// ACK the transaction whose cseq the dialog currently points at
    fn ack_current(&mut self, call_id: &str) {
        if let Some(call) = self.calls.get(call_id) {
            self.signaling.send_ack(&call.dialog, call.dialog.cseq);
        }
    }
}
