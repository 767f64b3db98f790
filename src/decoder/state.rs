//! Decode session state management

use std::sync::atomic::{AtomicU8, Ordering};

/// Decode session state machine
///
/// `Created → Initializing → Running → (Closed | Failed)`. A finished
/// session may be restarted, which begins again at `Initializing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No session was ever started
    Created,

    /// Worker is opening the input and negotiating a decoder
    Initializing,

    /// Frames are being decoded
    Running,

    /// Session ended on stop request or end of stream
    Closed,

    /// Initialization or decoding failed
    Failed,
}

impl SessionState {
    /// Check if this state transition is valid
    pub fn can_transition_to(&self, target: &SessionState) -> bool {
        use SessionState::*;

        match (self, target) {
            (Created, Initializing) => true,

            (Initializing, Running) => true,
            (Initializing, Failed) => true,
            // stop requested while the input was still opening
            (Initializing, Closed) => true,

            (Running, Closed) => true,
            (Running, Failed) => true,

            // restart
            (Closed | Failed, Initializing) => true,

            (a, b) if a == b => true,

            _ => false,
        }
    }

    /// Get a human-readable description of this state
    pub fn description(&self) -> &'static str {
        match self {
            SessionState::Created => "Created",
            SessionState::Initializing => "Initializing",
            SessionState::Running => "Running",
            SessionState::Closed => "Closed",
            SessionState::Failed => "Failed",
        }
    }

    /// Check if a worker is attached to this state
    pub fn is_active(&self) -> bool {
        matches!(self, SessionState::Initializing | SessionState::Running)
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, SessionState::Closed | SessionState::Failed)
    }

    fn to_u8(self) -> u8 {
        self as u8
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => SessionState::Initializing,
            2 => SessionState::Running,
            3 => SessionState::Closed,
            4 => SessionState::Failed,
            _ => SessionState::Created,
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Session state readable from any thread
#[derive(Debug)]
pub(crate) struct AtomicSessionState(AtomicU8);

impl AtomicSessionState {
    pub(crate) fn new(state: SessionState) -> Self {
        Self(AtomicU8::new(state.to_u8()))
    }

    pub(crate) fn load(&self) -> SessionState {
        SessionState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Move to `target`, ignoring invalid transitions. Returns whether the
    /// state changed.
    pub(crate) fn transition(&self, target: SessionState) -> bool {
        let current = self.load();
        if !current.can_transition_to(&target) {
            log::warn!("SessionState: ignoring transition {} -> {}", current, target);
            return false;
        }
        self.0.store(target.to_u8(), Ordering::Release);
        current != target
    }
}
