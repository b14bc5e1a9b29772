use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionPhase {
    Uninitialized,
    Initializing,
    Ready,
    Connecting,
    Connected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionAction {
    BeginInit,
    InitSucceeded,
    InitFailed,
    BeginConnect,
    Paired,
    AdoptExternal,
    ConnectTimedOut,
    ConnectFailed,
    Disconnect,
    Reset,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateTransition {
    pub from: SessionPhase,
    pub to: SessionPhase,
    pub reason: &'static str,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("illegal session transition: {from:?} on {action:?}")]
pub struct TransitionError {
    pub from: SessionPhase,
    pub action: SessionAction,
}

pub fn session_transition(
    from: SessionPhase,
    action: SessionAction,
) -> Result<(SessionPhase, &'static str), TransitionError> {
    use SessionAction as A;
    use SessionPhase as P;

    let next = match (from, action) {
        (_, A::Reset) => (P::Uninitialized, "session reset"),
        (P::Uninitialized, A::BeginInit) => (P::Initializing, "transport init requested"),
        (P::Initializing, A::InitSucceeded) => (P::Ready, "transport init completed"),
        (P::Initializing, A::InitFailed) => (P::Uninitialized, "transport init failed"),
        // Events fired synchronously from init are recorded; the phase settles after init.
        (P::Initializing, A::Paired) => (P::Initializing, "pairing recorded during init"),
        (P::Ready, A::BeginConnect) => (P::Connecting, "connect requested"),
        (P::Ready | P::Connecting | P::Connected, A::Paired) => (P::Connected, "pairing adopted"),
        (P::Uninitialized | P::Ready | P::Connecting | P::Connected, A::AdoptExternal) => {
            (P::Connected, "external account adopted")
        }
        (P::Connecting, A::ConnectTimedOut) => (P::Ready, "connect timed out"),
        (P::Connecting, A::ConnectFailed) => (P::Ready, "connect request failed"),
        (P::Ready | P::Connecting | P::Connected, A::Disconnect) => (P::Ready, "disconnected"),
        (P::Uninitialized, A::Disconnect) => (P::Uninitialized, "disconnected"),
        _ => return Err(TransitionError { from, action }),
    };
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_is_legal_from_every_phase() {
        for phase in [
            SessionPhase::Uninitialized,
            SessionPhase::Initializing,
            SessionPhase::Ready,
            SessionPhase::Connecting,
            SessionPhase::Connected,
        ] {
            let (to, _) = session_transition(phase, SessionAction::Reset).expect("reset");
            assert_eq!(to, SessionPhase::Uninitialized);
        }
    }

    #[test]
    fn pairing_during_init_keeps_phase() {
        let (to, _) = session_transition(SessionPhase::Initializing, SessionAction::Paired)
            .expect("pairing during init");
        assert_eq!(to, SessionPhase::Initializing);
    }
}
