//! The file-transfer XML control plane
//!
//! Control messages ride SIP INFO on the call's dialog (plus the initial
//! `publishFile` inside the INVITE body). Three shapes exist: `request`
//! with a verb element, `response` with a result code, and `notify` with a
//! progress report.

use std::io::Cursor;

use quick_xml::events::{BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::error::{CallError, Result};

/// Content type of the control messages
pub const FT_CONTENT_TYPE: &str = "application/ms-filetransfer+xml";

const FT_NS: &str = "http://schemas.microsoft.com/rtc/2009/05/filetransfer";

/// The published file's identity
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FileInfo {
    /// GUID-shaped file id, shared by every message of one transfer
    pub id: String,
    /// File name; only the publish carries it
    pub name: Option<String>,
    /// File size in bytes; only the publish carries it
    pub size: Option<u64>,
}

/// Verb of a `request` message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FtBody {
    /// Sender announces a file
    PublishFile(FileInfo),
    /// Receiver asks for the announced file
    DownloadFile(FileInfo),
    /// Either side aborts the transfer
    CancelTransfer(FileInfo),
}

/// One control-plane message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FtMessage {
    /// A request carrying a verb
    Request {
        /// Id echoed by the matching response
        request_id: u32,
        /// The verb
        body: FtBody,
    },
    /// A response to a request
    Response {
        /// Id of the request being answered
        request_id: u32,
        /// `success`, `pending` or `failure`
        code: String,
        /// Failure reason, e.g. `requestCancelled`
        reason: Option<String>,
    },
    /// A progress notification
    Notify {
        /// Notification id
        notify_id: u32,
        /// File id the progress refers to
        transfer_id: Option<String>,
        /// First byte of the reported range
        bytes_from: Option<u64>,
        /// Last byte of the reported range
        bytes_to: Option<u64>,
    },
}

impl FtMessage {
    /// Serialise to the wire XML
    pub fn to_xml(&self) -> Result<String> {
        let mut writer = Writer::new(Cursor::new(Vec::new()));

        match self {
            FtMessage::Request { request_id, body } => {
                let mut request = BytesStart::new("request");
                request.push_attribute(("xmlns", FT_NS));
                request.push_attribute(("requestId", request_id.to_string().as_str()));
                writer.write_event(Event::Start(request)).map_err(xml_err)?;

                let (verb, info, publish) = match body {
                    FtBody::PublishFile(info) => ("publishFile", info, true),
                    FtBody::DownloadFile(info) => ("downloadFile", info, false),
                    FtBody::CancelTransfer(info) => ("cancelTransfer", info, false),
                };
                writer.write_event(Event::Start(BytesStart::new(verb))).map_err(xml_err)?;

                let mut file_info = BytesStart::new("fileInfo");
                if publish {
                    file_info.push_attribute(("event", "publish"));
                }
                writer.write_event(Event::Start(file_info)).map_err(xml_err)?;
                write_text_element(&mut writer, "id", &info.id)?;
                if let Some(name) = &info.name {
                    write_text_element(&mut writer, "name", name)?;
                }
                if let Some(size) = info.size {
                    write_text_element(&mut writer, "size", &size.to_string())?;
                }
                writer
                    .write_event(Event::End(BytesStart::new("fileInfo").to_end()))
                    .map_err(xml_err)?;
                writer.write_event(Event::End(BytesStart::new(verb).to_end())).map_err(xml_err)?;
                writer
                    .write_event(Event::End(BytesStart::new("request").to_end()))
                    .map_err(xml_err)?;
            }
            FtMessage::Response { request_id, code, reason } => {
                let mut response = BytesStart::new("response");
                response.push_attribute(("xmlns", FT_NS));
                response.push_attribute(("requestId", request_id.to_string().as_str()));
                response.push_attribute(("code", code.as_str()));
                if let Some(reason) = reason {
                    response.push_attribute(("reason", reason.as_str()));
                }
                writer.write_event(Event::Empty(response)).map_err(xml_err)?;
            }
            FtMessage::Notify { notify_id, transfer_id, bytes_from, bytes_to } => {
                let mut notify = BytesStart::new("notify");
                notify.push_attribute(("xmlns", FT_NS));
                notify.push_attribute(("notifyId", notify_id.to_string().as_str()));
                writer.write_event(Event::Start(notify)).map_err(xml_err)?;
                writer
                    .write_event(Event::Start(BytesStart::new("fileTransferProgress")))
                    .map_err(xml_err)?;
                if let Some(transfer_id) = transfer_id {
                    write_text_element(&mut writer, "transferId", transfer_id)?;
                }
                writer
                    .write_event(Event::Start(BytesStart::new("bytesReceived")))
                    .map_err(xml_err)?;
                if let Some(from) = bytes_from {
                    write_text_element(&mut writer, "from", &from.to_string())?;
                }
                if let Some(to) = bytes_to {
                    write_text_element(&mut writer, "to", &to.to_string())?;
                }
                writer
                    .write_event(Event::End(BytesStart::new("bytesReceived").to_end()))
                    .map_err(xml_err)?;
                writer
                    .write_event(Event::End(BytesStart::new("fileTransferProgress").to_end()))
                    .map_err(xml_err)?;
                writer
                    .write_event(Event::End(BytesStart::new("notify").to_end()))
                    .map_err(xml_err)?;
            }
        }

        let xml = writer.into_inner().into_inner();
        String::from_utf8(xml).map_err(|e| CallError::Transfer { reason: e.to_string() })
    }

    /// Decode a control-plane document
    pub fn parse(xml: &str) -> Result<FtMessage> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut root: Option<Vec<u8>> = None;
        let mut request_id = 0u32;
        let mut code = String::new();
        let mut reason = None;
        let mut verb: Option<Vec<u8>> = None;
        let mut info = FileInfo::default();
        let mut transfer_id = None;
        let mut bytes_from = None;
        let mut bytes_to = None;
        let mut element: Vec<u8> = Vec::new();

        let mut buf = Vec::new();
        loop {
            let event = reader
                .read_event_into(&mut buf)
                .map_err(|e| CallError::Transfer { reason: e.to_string() })?;
            match event {
                Event::Start(ref e) | Event::Empty(ref e) => {
                    let name = e.name().as_ref().to_vec();
                    match name.as_slice() {
                        b"request" | b"response" | b"notify" => {
                            root = Some(name.clone());
                            for attr in e.attributes().flatten() {
                                let value = String::from_utf8_lossy(&attr.value).to_string();
                                match attr.key.as_ref() {
                                    b"requestId" | b"notifyId" => {
                                        request_id = value.parse().unwrap_or(0)
                                    }
                                    b"code" => code = value,
                                    b"reason" => reason = Some(value),
                                    _ => {}
                                }
                            }
                        }
                        b"publishFile" | b"downloadFile" | b"cancelTransfer" => {
                            verb = Some(name.clone())
                        }
                        _ => element = name,
                    }
                }
                Event::Text(ref e) => {
                    let text = e
                        .unescape()
                        .map_err(|err| CallError::Transfer { reason: err.to_string() })?
                        .to_string();
                    match element.as_slice() {
                        b"id" => info.id = text,
                        b"name" => info.name = Some(text),
                        b"size" => info.size = text.parse().ok(),
                        b"transferId" => transfer_id = Some(text),
                        b"from" => bytes_from = text.parse().ok(),
                        b"to" => bytes_to = text.parse().ok(),
                        _ => {}
                    }
                }
                Event::End(_) => element.clear(),
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        match root.as_deref() {
            Some(b"request") => {
                let body = match verb.as_deref() {
                    Some(b"publishFile") => FtBody::PublishFile(info),
                    Some(b"downloadFile") => FtBody::DownloadFile(info),
                    Some(b"cancelTransfer") => FtBody::CancelTransfer(info),
                    _ => {
                        return Err(CallError::Transfer {
                            reason: "request carries no known verb".to_string(),
                        })
                    }
                };
                Ok(FtMessage::Request { request_id, body })
            }
            Some(b"response") => Ok(FtMessage::Response { request_id, code, reason }),
            Some(b"notify") => Ok(FtMessage::Notify {
                notify_id: request_id,
                transfer_id,
                bytes_from,
                bytes_to,
            }),
            _ => Err(CallError::Transfer { reason: "not a file-transfer document".to_string() }),
        }
    }
}

fn xml_err<E: std::fmt::Display>(e: E) -> CallError {
    CallError::Transfer { reason: e.to_string() }
}

fn write_text_element(writer: &mut Writer<Cursor<Vec<u8>>>, name: &str, text: &str) -> Result<()> {
    writer.write_event(Event::Start(BytesStart::new(name))).map_err(xml_err)?;
    writer.write_event(Event::Text(BytesText::new(text))).map_err(xml_err)?;
    writer.write_event(Event::End(BytesStart::new(name).to_end())).map_err(xml_err)?;
    Ok(())
}
