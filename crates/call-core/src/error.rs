//! Error handling for the call orchestrator and control surface.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("SIP error: {0}")]
    Sip(#[from] sipline_sip_core::Error),

    #[error("RTP error: {0}")]
    Rtp(#[from] sipline_rtp_core::Error),

    #[error("transport error: {0}")]
    Transport(#[from] sipline_udp_transport::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("a call is already active")]
    CallAlreadyActive,

    #[error("no call is active")]
    NoActiveCall,

    #[error("malformed control message: {0}")]
    MalformedControlMessage(String),

    #[error("upload payload of {actual} bytes exceeds the {limit}-byte limit")]
    UploadTooLarge { actual: usize, limit: usize },

    #[error("file not found in upload directory: {0}")]
    FileNotFound(String),
}
