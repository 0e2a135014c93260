//! Dispatch Tests
//!
//! Classification of decoded envelopes into typed messages.

use keyward::protocol::{
    classify, decode, decode_message, notice_code, AuthError, AuthMessage, AuthNotice, Enumeration,
    Message, NoticeCode, SessionType,
};
use keyward::KeywardError;
use rmpv::Value;

fn raw(fields: Vec<Value>) -> Vec<u8> {
    let mut buf = Vec::new();
    rmpv::encode::write_value(&mut buf, &Value::Array(fields)).unwrap();
    buf
}

fn bin(bytes: &[u8]) -> Value {
    Value::Binary(bytes.to_vec())
}

// =============================================================================
// Unknown Tag Tests
// =============================================================================

#[test]
fn test_unknown_operation_code() {
    let bytes = raw(vec![
        Value::from(0),
        Value::from(1),
        Value::from(9),
        Value::Array(vec![bin(b"k")]),
    ]);
    assert!(matches!(
        decode_message(&bytes),
        Err(KeywardError::UnknownOperation { enumeration: Enumeration::AuthMessage, code: 9 })
    ));
}

#[test]
fn test_unknown_error_code() {
    let bytes = raw(vec![Value::from(1), Value::from(1), Value::from(4), Value::Nil]);
    assert!(matches!(
        decode_message(&bytes),
        Err(KeywardError::UnknownOperation { enumeration: Enumeration::AuthError, code: 4 })
    ));
}

#[test]
fn test_unknown_notice_code() {
    let bytes = raw(vec![Value::from(2), Value::from(3), Value::Array(vec![])]);
    assert!(matches!(
        decode_message(&bytes),
        Err(KeywardError::UnknownOperation { enumeration: Enumeration::AuthNotice, code: 3 })
    ));
}

#[test]
fn test_unknown_message_type_is_malformed() {
    let bytes = raw(vec![Value::from(5), Value::from(1), Value::Array(vec![])]);
    let env = decode(&bytes).unwrap();
    assert!(matches!(classify(&env), Err(KeywardError::MalformedEnvelope(_))));
}

// =============================================================================
// Shape Tests
// =============================================================================

#[test]
fn test_string_argument_is_malformed() {
    let bytes = raw(vec![
        Value::from(0),
        Value::from(1),
        Value::from(0),
        Value::Array(vec![Value::from("42")]),
    ]);
    assert!(matches!(decode_message(&bytes), Err(KeywardError::MalformedEnvelope(_))));
}

#[test]
fn test_negative_msgid_is_malformed() {
    let bytes = raw(vec![
        Value::from(0),
        Value::from(-4),
        Value::from(0),
        Value::Array(vec![bin(b"k")]),
    ]);
    assert!(matches!(decode_message(&bytes), Err(KeywardError::MalformedEnvelope(_))));
}

#[test]
fn test_response_result_must_be_bin_or_nil() {
    let bytes = raw(vec![Value::from(1), Value::from(1), Value::from(0), Value::from(12)]);
    assert!(matches!(decode_message(&bytes), Err(KeywardError::MalformedEnvelope(_))));
}

#[test]
fn test_nil_result_classifies_as_empty() {
    let bytes = raw(vec![Value::from(1), Value::from(8), Value::from(1), Value::Nil]);
    match decode_message(&bytes).unwrap() {
        Message::Response(resp) => {
            assert_eq!(resp.msgid, 8);
            assert_eq!(resp.error, AuthError::KeyFileNotFound);
            assert!(resp.result.is_empty());
            assert!(!resp.is_ok());
        }
        other => panic!("expected response, got {:?}", other),
    }
}

#[test]
fn test_request_with_wrong_arity_still_classifies() {
    // Arity is the receiver's concern, not the dispatcher's
    let bytes = raw(vec![
        Value::from(0),
        Value::from(2),
        Value::from(AuthMessage::CreateKeyFile as u8),
        Value::Array(vec![bin(b"k1")]),
    ]);
    match decode_message(&bytes).unwrap() {
        Message::Request(req) => {
            assert_eq!(req.operation, AuthMessage::CreateKeyFile);
            assert_eq!(req.args.len(), 1);
        }
        other => panic!("expected request, got {:?}", other),
    }
}

// =============================================================================
// Notice Code Tests
// =============================================================================

#[test]
fn test_notice_codes_resolve_across_both_spaces() {
    assert_eq!(notice_code(0).unwrap(), NoticeCode::Session(SessionType::Boot));
    assert_eq!(notice_code(1).unwrap(), NoticeCode::Session(SessionType::Auth));
    assert_eq!(notice_code(2).unwrap(), NoticeCode::Notice(AuthNotice::Done));
    assert!(notice_code(3).is_err());
}
