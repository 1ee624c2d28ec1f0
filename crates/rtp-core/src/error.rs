//! Error handling for the RTP send/receive engine.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("RTP transport error: {0}")]
    Transport(#[from] sipline_udp_transport::Error),

    #[error("WAV container error: {0}")]
    Media(#[from] sipline_media_io::Error),

    #[error("worker task panicked or was cancelled")]
    WorkerJoin,
}
