//! Error handling for WAV container I/O.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("WAV I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not a RIFF/WAVE file")]
    NotRiffWave,

    #[error("WAV file has no data chunk")]
    MissingDataChunk,

    #[error("WAV chunk header truncated")]
    TruncatedChunkHeader,
}
