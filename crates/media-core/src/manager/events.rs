//! Backend event entry points and the file-transfer plumbing they drive

use crate::call::{Call, CallState, StreamOverlay};
use crate::error::Result;
use crate::manager::MediaManager;
use crate::signaling::{InviteContext, SipMessage};
use crate::transfer::{
    FileInfo, FtBody, FtMessage, TransferPhase, TransferRole, FT_CONTENT_TYPE,
};

impl MediaManager {
    /// The backend finished setting a stream up
    ///
    /// Outbound calls send their INVITE from here once every stream is
    /// ready; inbound calls apply the stored remote description instead.
    pub fn on_stream_initialized(&mut self, call_id: &str, stream_id: &str) {
        let (ready, initiator, state) = {
            let Some(call) = self.calls.get_mut(call_id) else { return };
            if let Some(stream) = call.stream_mut(stream_id) {
                stream.initialized = true;
            }
            (call.all_streams_initialized(), call.initiator, call.state)
        };
        if !ready {
            return;
        }

        let result = if initiator && state == CallState::Idle {
            self.send_invite_offer(call_id, InviteContext::CallResponse)
        } else if !initiator {
            self.apply_pending_remote(call_id)
        } else {
            Ok(())
        };
        if let Err(e) = result {
            tracing::warn!(call_id, error = %e, "stream-initialised handling failed");
        }
    }

    /// The backend tore one stream down
    pub fn on_stream_end(&mut self, call_id: &str, stream_id: &str) {
        let empty = {
            let Some(call) = self.calls.get_mut(call_id) else { return };
            call.streams.retain(|s| s.id != stream_id);
            call.streams.is_empty()
        };
        if empty {
            // A call with no streams left is over
            self.remove_call(call_id, true);
        }
    }

    /// The backend tore the whole call's media down
    pub fn on_media_end(&mut self, call_id: &str) {
        if self.calls.contains_key(call_id) {
            self.remove_call(call_id, true);
        }
    }

    /// Data is waiting on a stream; only transfers consume it
    pub fn on_read_available(&mut self, call_id: &str, stream_id: &str) {
        let mut data = Vec::new();
        let mut chunk = [0u8; 2048];
        loop {
            match self.backend.read(call_id, stream_id, &mut chunk) {
                Ok(0) => break,
                Ok(n) => data.extend_from_slice(&chunk[..n]),
                Err(e) => {
                    self.on_backend_error(call_id, &e.to_string());
                    return;
                }
            }
        }
        if data.is_empty() {
            return;
        }
        if let Err(e) = self.transfer_ingest(call_id, &data) {
            tracing::warn!(call_id, error = %e, "file-transfer ingest failed");
            self.host.notify_error("File transfer failed", &e.to_string());
            self.remove_call(call_id, true);
        }
    }

    /// The stream can take more bytes; resume the sender pump
    pub fn on_stream_writable(&mut self, call_id: &str, _stream_id: &str) {
        self.drive_transfer(call_id);
    }

    /// An INFO arrived on a call dialog; only the file-transfer control
    /// plane uses these
    pub fn on_info(&mut self, message: &SipMessage) -> Result<()> {
        let call_id = message.call_id()?.to_string();
        self.signaling.send_response(message, 200, "OK", &[], None);

        if !message
            .content_type()
            .is_some_and(|ct| ct.starts_with(FT_CONTENT_TYPE))
        {
            return Ok(());
        }
        let control = FtMessage::parse(&message.body)?;

        let mut hang_up = false;
        {
            let Self { signaling, calls, .. } = self;
            let Some(call) = calls.get_mut(&call_id) else { return Ok(()) };
            let Call { dialog, streams, .. } = call;
            let Some(transfer) = streams.iter_mut().find(|s| s.id == "data").and_then(|s| {
                match &mut s.overlay {
                    StreamOverlay::FileTransfer(t) => Some(t.as_mut()),
                    _ => None,
                }
            }) else {
                return Ok(());
            };

            let mut reply = |dialog: &mut crate::signaling::Dialog, msg: FtMessage| -> Result<()> {
                let xml = msg.to_xml()?;
                let cseq = dialog.bump_cseq();
                signaling.send_info(dialog, cseq, FT_CONTENT_TYPE, &xml);
                Ok(())
            };

            match control {
                FtMessage::Request { request_id, body: FtBody::DownloadFile(info) } => {
                    if info.id == transfer.file.id && transfer.role == TransferRole::Send {
                        transfer.download_request_id = Some(request_id);
                        reply(
                            dialog,
                            FtMessage::Response {
                                request_id,
                                code: "pending".to_string(),
                                reason: None,
                            },
                        )?;
                    }
                }
                FtMessage::Request { request_id, body: FtBody::CancelTransfer(_) } => {
                    reply(
                        dialog,
                        FtMessage::Response {
                            request_id,
                            code: "failure".to_string(),
                            reason: Some("requestCancelled".to_string()),
                        },
                    )?;
                    transfer.cancel_remote();
                }
                FtMessage::Request { body: FtBody::PublishFile(_), .. } => {
                    // The publish travels in the INVITE; an INFO republish
                    // is unexpected and ignored
                }
                FtMessage::Notify { notify_id, bytes_to, .. } => {
                    let done = transfer.role == TransferRole::Send
                        && transfer.size() > 0
                        && bytes_to == Some(transfer.size() - 1);
                    if done {
                        reply(
                            dialog,
                            FtMessage::Response {
                                request_id: notify_id,
                                code: "success".to_string(),
                                reason: None,
                            },
                        )?;
                        transfer.phase = TransferPhase::Done;
                        hang_up = true;
                    }
                }
                FtMessage::Response { .. } => {
                    // Acks of our own requests need no action
                }
            }
        }

        if hang_up {
            self.remove_call(&call_id, true);
        } else {
            self.drive_transfer(&call_id);
        }
        Ok(())
    }

    /// Move a transfer forward whenever its preconditions change
    pub(crate) fn drive_transfer(&mut self, call_id: &str) {
        if let Err(e) = self.transfer_step(call_id) {
            tracing::warn!(call_id, error = %e, "file transfer failed");
            self.host.notify_error("File transfer failed", &e.to_string());
            self.remove_call(call_id, true);
        }
    }

    fn transfer_step(&mut self, call_id: &str) -> Result<()> {
        let Self { backend, signaling, calls, .. } = self;
        let Some(call) = calls.get_mut(call_id) else { return Ok(()) };
        let answered = call.answer_sent || call.state == CallState::Established;
        let Call { dialog, streams, .. } = call;
        let Some(transfer) = streams.iter_mut().find(|s| s.id == "data").and_then(|s| {
            match &mut s.overlay {
                StreamOverlay::FileTransfer(t) => Some(t.as_mut()),
                _ => None,
            }
        }) else {
            return Ok(());
        };

        match transfer.role {
            TransferRole::Receive => {
                // Once the data stream is live and answered, ask for the file
                if transfer.connected && answered && !transfer.handshake_sent {
                    let success = FtMessage::Response {
                        request_id: transfer.publish_request_id,
                        code: "success".to_string(),
                        reason: None,
                    };
                    let download_id = transfer.next_request_id();
                    transfer.download_request_id = Some(download_id);
                    let download = FtMessage::Request {
                        request_id: download_id,
                        body: FtBody::DownloadFile(FileInfo {
                            id: transfer.file.id.clone(),
                            name: None,
                            size: None,
                        }),
                    };
                    for msg in [success, download] {
                        let xml = msg.to_xml()?;
                        let cseq = dialog.bump_cseq();
                        signaling.send_info(dialog, cseq, FT_CONTENT_TYPE, &xml);
                    }
                    transfer.handshake_sent = true;
                    transfer.phase = TransferPhase::Transferring;
                }
            }
            TransferRole::Send => {
                if transfer.connected
                    && transfer.download_request_id.is_some()
                    && transfer.phase == TransferPhase::Setup
                {
                    transfer.phase = TransferPhase::Transferring;
                }
                if transfer.phase == TransferPhase::Transferring {
                    transfer.pump(|bytes| backend.write(call_id, "data", bytes))?;
                }
            }
        }
        Ok(())
    }

    fn transfer_ingest(&mut self, call_id: &str, data: &[u8]) -> Result<()> {
        let Self { signaling, calls, .. } = self;
        let Some(call) = calls.get_mut(call_id) else { return Ok(()) };
        let Call { dialog, streams, .. } = call;
        let Some(transfer) = streams.iter_mut().find(|s| s.id == "data").and_then(|s| {
            match &mut s.overlay {
                StreamOverlay::FileTransfer(t) => Some(t.as_mut()),
                _ => None,
            }
        }) else {
            return Ok(());
        };

        let complete = transfer.ingest(data)?;
        if complete {
            // Tell the sender the last byte landed; it answers success
            // and hangs the call up
            let notify = FtMessage::Notify {
                notify_id: transfer.next_request_id(),
                transfer_id: Some(transfer.file.id.clone()),
                bytes_from: Some(0),
                bytes_to: Some(transfer.size().saturating_sub(1)),
            };
            let xml = notify.to_xml()?;
            let cseq = dialog.bump_cseq();
            signaling.send_info(dialog, cseq, FT_CONTENT_TYPE, &xml);
        }
        Ok(())
    }
}
