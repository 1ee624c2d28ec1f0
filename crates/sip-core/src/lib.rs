//! SIP message/SDP wire codec, digest authentication, and the single-call
//! UA dialog engine.
//!
//! This crate owns the parts of the endpoint described as "SIP Transaction &
//! Dialog Engine" and "Wire codecs" — everything up to and including a
//! confirmed or failed INVITE/ACK/BYE exchange. It knows nothing about RTP
//! or the call orchestrator above it.

pub mod digest;
pub mod dialog;
pub mod error;
pub mod message;
pub mod sdp;

pub use dialog::{Credentials, SipSession};
pub use error::{Error, Result};
