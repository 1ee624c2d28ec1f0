use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while building, sending, or interpreting SIP messages.
#[derive(Debug, Error)]
pub enum Error {
    /// Socket create/bind/send failure underneath the dialog.
    #[error("SIP transport error: {0}")]
    Transport(#[from] sipline_udp_transport::Error),

    /// A status line, header, or SDP body line couldn't be parsed.
    #[error("SIP protocol error: {0}")]
    Protocol(String),

    /// Missing realm/nonce on challenge, or a second challenge after retry.
    #[error("digest authentication failed: {0}")]
    AuthFailure(String),

    /// A final response in the 3xx-6xx range that isn't a handled challenge.
    #[error("call rejected: {code} {reason}")]
    Rejected { code: u16, reason: String },

    /// No progress within the signalling wait window.
    #[error("timed out waiting for {0}")]
    Timeout(String),
}

impl Error {
    pub fn protocol(msg: impl Into<String>) -> Self {
        Error::Protocol(msg.into())
    }
}
