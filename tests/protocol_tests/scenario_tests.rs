//! Scenario Tests
//!
//! Client and server sessions talking through encoded bytes only.

use keyward::protocol::{
    decode, encode, AuthError, AuthMessage, Message, NoticeCode, Notification, Request,
    Response, SessionType,
};
use keyward::{KeywardError, Session, SessionState};

/// Encode on one side, decode and observe on the other
fn deliver(envelope: &keyward::protocol::Envelope, peer: &mut Session) -> Message {
    let bytes = encode(envelope).unwrap();
    peer.receive(&decode(&bytes).unwrap()).unwrap()
}

#[test]
fn test_session_type_opens_the_session() {
    let mut client = Session::new();
    let mut server = Session::new();

    let msg = deliver(&client.start(SessionType::Auth).unwrap(), &mut server);
    assert_eq!(
        msg,
        Message::Notification(Notification {
            code: NoticeCode::Session(SessionType::Auth),
            args: vec![],
        })
    );
    assert_eq!(server.state(), SessionState::Started(SessionType::Auth));
    assert_eq!(client.state(), SessionState::Started(SessionType::Auth));
}

#[test]
fn test_request_response_round_trip() {
    let mut client = Session::new();
    let mut server = Session::new();
    deliver(&client.start(SessionType::Auth).unwrap(), &mut server);

    let req = client.request(1, AuthMessage::GetKeyFile, [b"42"]).unwrap();
    match deliver(&req, &mut server) {
        Message::Request(Request { msgid, operation, args }) => {
            assert_eq!(msgid, 1);
            assert_eq!(operation, AuthMessage::GetKeyFile);
            assert_eq!(args[0].as_bytes(), b"42");
        }
        other => panic!("expected request, got {:?}", other),
    }

    let resp = server.response(1, AuthError::Nil, b"keyfile-bytes").unwrap();
    match deliver(&resp, &mut client) {
        Message::Response(Response { msgid, error, result }) => {
            assert_eq!(msgid, 1);
            assert_eq!(error, AuthError::Nil);
            assert_eq!(result.as_bytes(), b"keyfile-bytes");
        }
        other => panic!("expected response, got {:?}", other),
    }
}

#[test]
fn test_short_request_fails_before_encoding() {
    let mut client = Session::new();
    client.start(SessionType::Auth).unwrap();
    assert!(matches!(
        client.request(2, AuthMessage::CreateKeyFile, [b"k1"]),
        Err(KeywardError::ArityMismatch { expected: 2, actual: 1, .. })
    ));
    // The failed build leaves the session untouched
    assert_eq!(client.state(), SessionState::Started(SessionType::Auth));
}

#[test]
fn test_done_closes_the_session() {
    let mut client = Session::new();
    let mut server = Session::new();
    deliver(&client.start(SessionType::Auth).unwrap(), &mut server);
    deliver(&client.finish().unwrap(), &mut server);

    assert!(client.is_ended());
    assert!(server.is_ended());
    assert!(matches!(
        client.request(3, AuthMessage::KeyExists, [b"k"]),
        Err(KeywardError::SessionClosed)
    ));
    assert!(matches!(
        server.response(3, AuthError::Nil, b"late"),
        Err(KeywardError::SessionClosed)
    ));
}

#[test]
fn test_boot_session_rejects_mutations_on_receipt() {
    let mut client = Session::new();
    let mut server = Session::new();
    deliver(&client.start(SessionType::Auth).unwrap(), &mut server);

    // A misbehaving client claims Boot on the server side only
    let mut booted = Session::new();
    deliver(&Session::new().start(SessionType::Boot).unwrap(), &mut booted);

    let req = client.request(4, AuthMessage::DeleteKeyFile, [b"k"]).unwrap();
    let env = decode(&encode(&req).unwrap()).unwrap();
    assert!(server.receive(&env).is_ok());
    assert!(matches!(
        booted.receive(&env),
        Err(KeywardError::OperationNotPermitted {
            operation: AuthMessage::DeleteKeyFile,
            session: SessionType::Boot,
        })
    ));
}
