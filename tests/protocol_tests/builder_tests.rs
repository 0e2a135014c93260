//! Builder Tests
//!
//! Argument validation performed before any bytes are produced.

use keyward::protocol::{
    build_notification, build_notification_with, build_request, build_response, name_for,
    request, tag_for, AuthError, AuthMessage, AuthNotice, Enumeration, NoticeCode, NoticeSchema,
    Payload, SessionType, Tag,
};
use keyward::KeywardError;
use rmpv::Value;

const NO_ARGS: [Payload; 0] = [];

// =============================================================================
// Request Tests
// =============================================================================

#[test]
fn test_every_operation_accepts_exactly_its_arity() {
    for op in AuthMessage::ALL.iter().copied() {
        for count in 0..=4 {
            let args = vec![b"x".to_vec(); count];
            let result = build_request(1, op, args);
            if count == op.arity() {
                assert!(result.is_ok(), "{:?} rejected {} args", op, count);
            } else {
                match result {
                    Err(KeywardError::ArityMismatch { operation, expected, actual }) => {
                        assert_eq!(operation, op);
                        assert_eq!(expected, op.arity());
                        assert_eq!(actual, count);
                    }
                    other => panic!("{:?} with {} args gave {:?}", op, count, other),
                }
            }
        }
    }
}

#[test]
fn test_arities() {
    assert_eq!(AuthMessage::GetKeyFile.arity(), 1);
    assert_eq!(AuthMessage::CreateKeyFile.arity(), 2);
    assert_eq!(AuthMessage::ChangeKeyFile.arity(), 2);
    assert_eq!(AuthMessage::ChangeKey.arity(), 2);
    assert_eq!(AuthMessage::ReplaceKeyFile.arity(), 3);
    assert_eq!(AuthMessage::DeleteKeyFile.arity(), 1);
    assert_eq!(AuthMessage::KeyExists.arity(), 1);
}

#[test]
fn test_request_rejects_non_bytes() {
    let args = vec![Value::Binary(b"k".to_vec()), Value::from("text")];
    match build_request(1, AuthMessage::CreateKeyFile, args) {
        Err(KeywardError::ArgumentType { index, found }) => {
            assert_eq!(index, 1);
            assert_eq!(found, "str");
        }
        other => panic!("expected ArgumentType, got {:?}", other),
    }
}

#[test]
fn test_request_rejects_out_of_range_msgid() {
    assert!(matches!(
        build_request(-1, AuthMessage::GetKeyFile, [b"k"]),
        Err(KeywardError::InvalidMsgId(-1))
    ));
    let too_big = i64::from(u32::MAX) + 1;
    assert!(matches!(
        build_request(too_big, AuthMessage::GetKeyFile, [b"k"]),
        Err(KeywardError::InvalidMsgId(id)) if id == too_big
    ));
    assert!(request(i64::from(u32::MAX), AuthMessage::GetKeyFile, [b"k"]).is_ok());
}

#[test]
fn test_empty_byte_string_is_a_valid_argument() {
    let req = request(5, AuthMessage::DeleteKeyFile, [Vec::new()]).unwrap();
    assert_eq!(req.args.len(), 1);
    assert!(req.args[0].is_empty());
}

// =============================================================================
// Response Tests
// =============================================================================

#[test]
fn test_error_response_must_have_empty_result() {
    for error in [AuthError::KeyFileNotFound, AuthError::KeyFileExists, AuthError::DatabaseError] {
        assert!(matches!(
            build_response(1, error, b"oops"),
            Err(KeywardError::InconsistentResult(e)) if e == error
        ));
        assert!(build_response(1, error, Payload::empty()).is_ok());
    }
}

#[test]
fn test_success_response_may_carry_result() {
    assert!(build_response(1, AuthError::Nil, b"keyfile-bytes").is_ok());
    assert!(build_response(1, AuthError::Nil, Payload::empty()).is_ok());
}

// =============================================================================
// Notification Tests
// =============================================================================

#[test]
fn test_defined_notices_take_no_arguments() {
    assert!(build_notification(SessionType::Boot, NO_ARGS).is_ok());
    assert!(build_notification(AuthNotice::Done, NO_ARGS).is_ok());
    assert!(matches!(
        build_notification(AuthNotice::Done, [b"extra"]),
        Err(KeywardError::MalformedEnvelope(_))
    ));
}

#[test]
fn test_schema_declares_notice_arity() {
    let schema = NoticeSchema::default().with_arity(NoticeCode::Notice(AuthNotice::Done), 1);
    assert!(build_notification_with(&schema, AuthNotice::Done, [b"reason"]).is_ok());
    assert!(build_notification_with(&schema, AuthNotice::Done, NO_ARGS).is_err());
    assert_eq!(schema.arity(NoticeCode::Session(SessionType::Auth)), Some(0));
}

// =============================================================================
// Vocabulary Lookup Tests
// =============================================================================

#[test]
fn test_tag_lookup_by_name() {
    assert_eq!(tag_for("KeyExists").unwrap(), 6);
    assert_eq!(tag_for("AuthError.DatabaseError").unwrap(), 3);
    assert_eq!(tag_for("SessionType.Auth").unwrap(), 1);
    assert!(matches!(tag_for("Reboot"), Err(KeywardError::UnknownTag(_))));
    assert!(matches!(tag_for("Bogus.Nil"), Err(KeywardError::UnknownTag(_))));
}

#[test]
fn test_name_lookup_by_tag() {
    assert_eq!(name_for(2, Enumeration::AuthNotice).unwrap(), "Done");
    assert_eq!(name_for(4, Enumeration::AuthMessage).unwrap(), "ReplaceKeyFile");
    assert!(matches!(name_for(9, Enumeration::AuthError), Err(KeywardError::UnknownTag(_))));
}

#[test]
fn test_from_code_rejects_unknown() {
    assert!(matches!(
        AuthMessage::from_code(7),
        Err(KeywardError::UnknownOperation { enumeration: Enumeration::AuthMessage, code: 7 })
    ));
}

// =============================================================================
// Property Tests
// =============================================================================

mod properties {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn prop_arity_is_exact(op_index in 0usize..7, count in 0usize..6) {
            let op = AuthMessage::ALL[op_index];
            let result = build_request(1, op, vec![Vec::<u8>::new(); count]);
            prop_assert_eq!(result.is_ok(), count == op.arity());
        }

        #[test]
        fn prop_msgid_domain(msgid in any::<i64>()) {
            let result = build_request(msgid, AuthMessage::KeyExists, [b"k"]);
            let in_range = (0..=i64::from(u32::MAX)).contains(&msgid);
            prop_assert_eq!(result.is_ok(), in_range);
        }
    }
}
