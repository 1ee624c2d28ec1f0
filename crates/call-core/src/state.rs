//! Call lifecycle state. One orchestrator manages exactly one call at a
//! time, so this is a plain enum rather than a per-call map.

/// `Idle → Dialing → Authenticating? → Established → Terminating → Idle`.
/// `Authenticating` is folded into the SIP dialog engine's own retry (it
/// never surfaces here as a separate wait) since the digest challenge and
/// reissue happen inside a single `invite()` call; the orchestrator only
/// observes the before/after.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    Idle,
    Dialing,
    Established,
    Terminating,
}

impl CallState {
    pub fn is_active(self) -> bool {
        !matches!(self, CallState::Idle)
    }
}
