use message_saver_core::state_machine::{session_transition, TransitionError};
use message_saver_core::{SessionAction, SessionPhase};

#[test]
fn session_happy_path_transitions() {
    let (s1, _) = session_transition(SessionPhase::Uninitialized, SessionAction::BeginInit)
        .expect("uninitialized -> init");
    assert_eq!(s1, SessionPhase::Initializing);
    let (s2, _) = session_transition(s1, SessionAction::InitSucceeded).expect("init -> ready");
    assert_eq!(s2, SessionPhase::Ready);
    let (s3, _) = session_transition(s2, SessionAction::BeginConnect).expect("ready -> connecting");
    assert_eq!(s3, SessionPhase::Connecting);
    let (s4, _) = session_transition(s3, SessionAction::Paired).expect("connecting -> connected");
    assert_eq!(s4, SessionPhase::Connected);
    let (s5, _) = session_transition(s4, SessionAction::Disconnect).expect("connected -> ready");
    assert_eq!(s5, SessionPhase::Ready);
}

#[test]
fn connecting_times_out_back_to_ready() {
    let (to, reason) = session_transition(SessionPhase::Connecting, SessionAction::ConnectTimedOut)
        .expect("timeout");
    assert_eq!(to, SessionPhase::Ready);
    assert_eq!(reason, "connect timed out");
}

#[test]
fn failed_init_is_retryable() {
    let (to, _) = session_transition(SessionPhase::Initializing, SessionAction::InitFailed)
        .expect("init failed");
    assert_eq!(to, SessionPhase::Uninitialized);
    session_transition(to, SessionAction::BeginInit).expect("init again");
}

#[test]
fn late_pairing_is_accepted_from_ready() {
    let (to, _) =
        session_transition(SessionPhase::Ready, SessionAction::Paired).expect("late pairing");
    assert_eq!(to, SessionPhase::Connected);
}

#[test]
fn injected_wallet_can_connect_without_transport_init() {
    let (to, _) = session_transition(SessionPhase::Uninitialized, SessionAction::AdoptExternal)
        .expect("external adoption");
    assert_eq!(to, SessionPhase::Connected);
}

#[test]
fn session_rejects_illegal_transitions() {
    let err = session_transition(SessionPhase::Uninitialized, SessionAction::BeginConnect)
        .expect_err("connect before init");
    assert_eq!(
        err,
        TransitionError {
            from: SessionPhase::Uninitialized,
            action: SessionAction::BeginConnect,
        }
    );
    assert!(session_transition(SessionPhase::Connected, SessionAction::BeginInit).is_err());
    assert!(session_transition(SessionPhase::Ready, SessionAction::ConnectTimedOut).is_err());
    assert!(session_transition(SessionPhase::Uninitialized, SessionAction::Paired).is_err());
}
