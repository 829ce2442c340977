//! Session lifecycle states.

use std::fmt;

use crate::error::SyncError;

/// Lifecycle of a channel session.
///
/// `Idle → Authorizing → Connecting → Connected → Closed`. Authorizing may be
/// skipped when the caller already holds a token, and any state may fall to
/// `Closed` on failure. `Closed` is terminal: reconnecting means building a
/// new session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Idle,
    Authorizing,
    Connecting,
    Connected,
    Closed,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Authorizing => "authorizing",
            SessionState::Connecting => "connecting",
            SessionState::Connected => "connected",
            SessionState::Closed => "closed",
        }
    }

    pub fn can_transition_to(&self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Idle, Authorizing)
                | (Idle, Connecting)
                | (Authorizing, Connecting)
                | (Connecting, Connected)
                | (Idle | Authorizing | Connecting | Connected, Closed)
        )
    }

    /// Moves to `next`, or reports why the move is not allowed.
    pub fn transition(&mut self, next: SessionState) -> Result<(), SyncError> {
        if !self.can_transition_to(next) {
            return Err(SyncError::InvalidTransition {
                from: *self,
                to: next,
            });
        }
        *self = next;
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        *self == SessionState::Closed
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_with_authorization() {
        let mut state = SessionState::Idle;
        for next in [
            SessionState::Authorizing,
            SessionState::Connecting,
            SessionState::Connected,
            SessionState::Closed,
        ] {
            state.transition(next).unwrap();
        }
        assert!(state.is_closed());
    }

    #[test]
    fn test_pre_authorized_path() {
        let mut state = SessionState::Idle;
        state.transition(SessionState::Connecting).unwrap();
        state.transition(SessionState::Connected).unwrap();
        assert_eq!(state, SessionState::Connected);
    }

    #[test]
    fn test_closed_is_terminal() {
        for next in [
            SessionState::Idle,
            SessionState::Authorizing,
            SessionState::Connecting,
            SessionState::Connected,
            SessionState::Closed,
        ] {
            assert!(!SessionState::Closed.can_transition_to(next));
        }
    }

    #[test]
    fn test_cannot_skip_connecting() {
        let mut state = SessionState::Authorizing;
        let err = state.transition(SessionState::Connected).unwrap_err();
        assert_eq!(
            err,
            SyncError::InvalidTransition {
                from: SessionState::Authorizing,
                to: SessionState::Connected,
            }
        );
        assert_eq!(state, SessionState::Authorizing);
    }

    #[test]
    fn test_failure_can_close_from_any_live_state() {
        for from in [
            SessionState::Idle,
            SessionState::Authorizing,
            SessionState::Connecting,
            SessionState::Connected,
        ] {
            assert!(from.can_transition_to(SessionState::Closed));
        }
    }
}
