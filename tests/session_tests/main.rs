//! Session Tests
//!
//! These tests verify:
//! - The session type notice must come first and is fixed once sent
//! - Boot sessions may only fetch keyfiles
//! - Nothing is accepted after `Done`
//! - A shared session serialises builders from several threads

use std::collections::HashSet;
use std::sync::Arc;
use std::thread;

use keyward::protocol::{
    build_notification, build_request, build_response, classify, AuthError, AuthMessage,
    AuthNotice, NoticeCode, NoticeSchema, Payload, SessionType, Tag,
};
use keyward::session::SharedSession;
use keyward::{ErrorClass, KeywardError, Session, SessionState};

const NO_ARGS: [Payload; 0] = [];

fn started(session_type: SessionType) -> Session {
    let mut s = Session::new();
    s.start(session_type).unwrap();
    s
}

// =============================================================================
// Lifecycle Tests
// =============================================================================

#[test]
fn test_new_session_is_unstarted() {
    let s = Session::new();
    assert_eq!(s.state(), SessionState::Unstarted);
    assert_eq!(s.session_type(), None);
    assert!(!s.is_ended());
}

#[test]
fn test_request_before_start_is_rejected() {
    let mut s = Session::new();
    let err = s.request(1, AuthMessage::GetKeyFile, [b"k"]).unwrap_err();
    assert!(matches!(err, KeywardError::SessionNotStarted));
    assert_eq!(err.class(), ErrorClass::Lifecycle);
}

#[test]
fn test_received_request_before_start_is_rejected() {
    let mut server = Session::new();
    let env = build_request(1, AuthMessage::GetKeyFile, [b"k"]).unwrap();
    assert!(matches!(server.receive(&env), Err(KeywardError::SessionNotStarted)));
    assert_eq!(server.state(), SessionState::Unstarted);
}

#[test]
fn test_done_before_start_is_rejected() {
    let mut server = Session::new();
    let env = build_notification(AuthNotice::Done, NO_ARGS).unwrap();
    assert!(matches!(server.receive(&env), Err(KeywardError::SessionNotStarted)));
}

#[test]
fn test_second_session_notice_is_rejected() {
    let mut s = started(SessionType::Boot);
    assert!(matches!(
        s.start(SessionType::Auth),
        Err(KeywardError::SessionAlreadyStarted(SessionType::Boot))
    ));
    assert_eq!(s.session_type(), Some(SessionType::Boot));
}

#[test]
fn test_response_before_start_is_rejected() {
    let mut client = Session::new();
    let env = build_response(1, AuthError::Nil, b"x").unwrap();
    assert!(matches!(client.receive(&env), Err(KeywardError::SessionNotStarted)));
}

// =============================================================================
// Gating Tests
// =============================================================================

#[test]
fn test_boot_allows_only_get_keyfile() {
    for op in AuthMessage::ALL.iter().copied() {
        let mut s = started(SessionType::Boot);
        let args = vec![b"k".to_vec(); op.arity()];
        let result = s.request(1, op, args);
        if op == AuthMessage::GetKeyFile {
            assert!(result.is_ok());
        } else {
            assert!(
                matches!(result, Err(KeywardError::OperationNotPermitted { operation, .. }) if operation == op),
                "{:?} allowed in boot session",
                op
            );
        }
    }
}

#[test]
fn test_auth_allows_every_operation() {
    let mut s = started(SessionType::Auth);
    for (i, op) in AuthMessage::ALL.iter().copied().enumerate() {
        let args = vec![b"k".to_vec(); op.arity()];
        assert!(s.request(i as i64, op, args).is_ok(), "{:?} rejected", op);
    }
    assert_eq!(s.state(), SessionState::Started(SessionType::Auth));
}

// =============================================================================
// Termination Tests
// =============================================================================

#[test]
fn test_ended_session_rejects_everything() {
    let mut s = started(SessionType::Auth);
    s.finish().unwrap();

    assert!(matches!(s.request(1, AuthMessage::GetKeyFile, [b"k"]), Err(KeywardError::SessionClosed)));
    assert!(matches!(s.response(1, AuthError::Nil, Payload::empty()), Err(KeywardError::SessionClosed)));
    assert!(matches!(s.start(SessionType::Auth), Err(KeywardError::SessionClosed)));
    assert!(matches!(s.finish(), Err(KeywardError::SessionClosed)));

    let env = build_request(2, AuthMessage::GetKeyFile, [b"k"]).unwrap();
    assert!(matches!(s.receive(&env), Err(KeywardError::SessionClosed)));
    assert_eq!(s.state(), SessionState::Ended);
}

#[test]
fn test_rejected_message_does_not_move_the_session() {
    let mut s = started(SessionType::Boot);
    let env = build_request(1, AuthMessage::DeleteKeyFile, [b"k"]).unwrap();
    let msg = classify(&env).unwrap();
    assert!(s.check(&msg).is_err());
    assert!(s.observe(&msg).is_err());
    assert_eq!(s.state(), SessionState::Started(SessionType::Boot));
}

// =============================================================================
// Schema Tests
// =============================================================================

#[test]
fn test_session_builds_against_custom_schema() {
    let schema = NoticeSchema::default().with_arity(NoticeCode::Notice(AuthNotice::Done), 1);
    let mut s = Session::with_schema(schema);
    s.start(SessionType::Auth).unwrap();
    assert!(s.finish().is_err());
    assert!(s.notify(AuthNotice::Done, [b"bye"]).is_ok());
    assert!(s.is_ended());
}

// =============================================================================
// Concurrency Tests
// =============================================================================

#[test]
fn test_shared_session_across_threads() {
    let session: SharedSession = started(SessionType::Auth).shared();

    let handles: Vec<_> = (0..8u32)
        .map(|t| {
            let session = Arc::clone(&session);
            thread::spawn(move || {
                (0..25u32)
                    .map(|i| {
                        let msgid = t * 100 + i;
                        session
                            .lock()
                            .request(i64::from(msgid), AuthMessage::KeyExists, [b"k"])
                            .unwrap();
                        msgid
                    })
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut ids = HashSet::new();
    for h in handles {
        ids.extend(h.join().unwrap());
    }
    assert_eq!(ids.len(), 200);

    session.lock().finish().unwrap();
    assert!(session.lock().is_ended());
}
