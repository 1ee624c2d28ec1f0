//! μ-law WAV container I/O and the silence-fallback tone used when a
//! receiver finalizes a file with no real audio in it.

pub mod error;
pub mod tone;
pub mod wav;

pub use error::{Error, Result};
pub use wav::{WavReader, WavWriter, HEADER_LEN};
