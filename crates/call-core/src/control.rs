//! The text command grammar carried over the (opaque) control bus: `CALL:`,
//! `HANGUP`, `WAV_UPLOAD:`, `PLAY_WAV:` inbound; `RTP:` and `WAV_ACK:`
//! outbound. Framing and transport are someone else's problem — this module
//! only knows how to turn a complete text message into a typed value and
//! back.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

use crate::error::{Error, Result};

/// One megabyte, the upload size limit for `WAV_UPLOAD`.
pub const MAX_UPLOAD_BYTES: usize = 1024 * 1024;

/// A parsed inbound control message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlMessage {
    Call(String),
    Hangup,
    UploadWav { filename: String, bytes: Vec<u8> },
    PlayWav { filename: String },
}

impl ControlMessage {
    /// Parses a single complete text message. Callers are responsible for
    /// reassembling fragments before calling this.
    pub fn parse(text: &str) -> Result<Self> {
        if let Some(digits) = text.strip_prefix("CALL:") {
            if digits.len() < 3 || !digits.bytes().all(|b| b.is_ascii_digit()) {
                return Err(Error::MalformedControlMessage(format!(
                    "CALL digits must be >=3 ASCII digits, got {digits:?}"
                )));
            }
            return Ok(ControlMessage::Call(digits.to_string()));
        }

        if text == "HANGUP" {
            return Ok(ControlMessage::Hangup);
        }

        if let Some(rest) = text.strip_prefix("WAV_UPLOAD:") {
            let mut parts = rest.splitn(2, ':');
            let filename = parts
                .next()
                .filter(|s| !s.is_empty())
                .ok_or_else(|| Error::MalformedControlMessage("WAV_UPLOAD missing filename".into()))?;
            let encoded = parts
                .next()
                .ok_or_else(|| Error::MalformedControlMessage("WAV_UPLOAD missing payload".into()))?;
            let bytes = BASE64
                .decode(encoded)
                .map_err(|e| Error::MalformedControlMessage(format!("invalid base64: {e}")))?;
            if bytes.len() > MAX_UPLOAD_BYTES {
                return Err(Error::UploadTooLarge { actual: bytes.len(), limit: MAX_UPLOAD_BYTES });
            }
            return Ok(ControlMessage::UploadWav { filename: filename.to_string(), bytes });
        }

        if let Some(filename) = text.strip_prefix("PLAY_WAV:") {
            if filename.is_empty() {
                return Err(Error::MalformedControlMessage("PLAY_WAV missing filename".into()));
            }
            return Ok(ControlMessage::PlayWav { filename: filename.to_string() });
        }

        Err(Error::MalformedControlMessage(format!("unrecognized message: {text:?}")))
    }
}

/// An outbound event destined for the control bus.
#[derive(Debug, Clone)]
pub enum ControlEvent {
    /// One full RTP datagram, hex-encoded uppercase per §6.
    Rtp(Vec<u8>),
    WavAck(String),
}

impl ControlEvent {
    pub fn to_wire(&self) -> String {
        match self {
            ControlEvent::Rtp(datagram) => format!("RTP:{}", hex_upper(datagram)),
            ControlEvent::WavAck(text) => format!("WAV_ACK:{text}"),
        }
    }
}

fn hex_upper(data: &[u8]) -> String {
    data.iter().map(|b| format!("{b:02X}")).collect()
}
