//! G.711 μ-law sample conversion for 20ms/8kHz telephony frames.
//!
//! This crate owns exactly one concern: turning a linear PCM sample into a
//! μ-law byte and back, bit-exact with the ITU-T reference implementation.
//! RTP framing, WAV containers, and payload-type negotiation all live above
//! this crate.

pub mod codecs;

pub use codecs::g711::{ulaw_compress, ulaw_expand};
