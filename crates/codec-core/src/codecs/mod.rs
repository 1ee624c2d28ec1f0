//! Audio codec implementations.
//!
//! A single codec family lives here: G.711. There is no factory or
//! registry — the call orchestrator always builds a PCMU (or, if a peer's
//! answer insists, PCMA) path directly.

pub mod g711;
