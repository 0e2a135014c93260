//! Message dispatcher
//!
//! Turns a decoded [`Envelope`] into a typed [`Message`]. Shape problems are
//! reported as `MalformedEnvelope`; a well-formed envelope whose sub-tag is
//! outside its enumeration is reported as `UnknownOperation`, which points at
//! vocabulary skew between peers rather than corruption.

use rmpv::Value;

use crate::error::{KeywardError, Result};
use super::codec::decode;
use super::envelope::{value_kind, Envelope, Payload};
use super::message::{Message, MsgId, NoticeCode, Notification, Request, Response};
use super::vocabulary::{
    AuthError, AuthMessage, AuthNotice, Enumeration, MessageType, SessionType, Tag,
};

/// Classify an envelope into a typed message
pub fn classify(envelope: &Envelope) -> Result<Message> {
    let fields = envelope.fields();
    match envelope.message_type()? {
        MessageType::Request => {
            expect_len(fields, 4, "request")?;
            let msgid = read_msgid(&fields[1])?;
            let operation = AuthMessage::from_code(read_code(&fields[2], "operation")?)?;
            let args = read_args(&fields[3])?;
            Ok(Message::Request(Request {
                msgid,
                operation,
                args,
            }))
        }
        MessageType::Response => {
            expect_len(fields, 4, "response")?;
            let msgid = read_msgid(&fields[1])?;
            let error = AuthError::from_code(read_code(&fields[2], "error")?)?;
            let result = match &fields[3] {
                Value::Nil => Payload::empty(),
                Value::Binary(bytes) => Payload::new(bytes.clone()),
                other => {
                    return Err(KeywardError::MalformedEnvelope(format!(
                        "response result must be bin or nil, got {}",
                        value_kind(other)
                    )))
                }
            };
            Ok(Message::Response(Response {
                msgid,
                error,
                result,
            }))
        }
        MessageType::Notification => {
            expect_len(fields, 3, "notification")?;
            let code = notice_code(read_code(&fields[1], "notification code")?)?;
            let args = read_args(&fields[2])?;
            Ok(Message::Notification(Notification { code, args }))
        }
    }
}

/// Decode bytes and classify the result in one step
pub fn decode_message(bytes: &[u8]) -> Result<Message> {
    classify(&decode(bytes)?)
}

/// Resolve a notification code against both code spaces
pub fn notice_code(code: u64) -> Result<NoticeCode> {
    if let Ok(s) = SessionType::from_code(code) {
        return Ok(NoticeCode::Session(s));
    }
    match AuthNotice::from_code(code) {
        Ok(n) => Ok(NoticeCode::Notice(n)),
        Err(_) => Err(KeywardError::UnknownOperation {
            enumeration: Enumeration::AuthNotice,
            code,
        }),
    }
}

fn expect_len(fields: &[Value], len: usize, what: &str) -> Result<()> {
    if fields.len() != len {
        return Err(KeywardError::MalformedEnvelope(format!(
            "{} expects {} fields, got {}",
            what,
            len,
            fields.len()
        )));
    }
    Ok(())
}

fn read_msgid(value: &Value) -> Result<MsgId> {
    value
        .as_u64()
        .and_then(|id| MsgId::try_from(id).ok())
        .ok_or_else(|| {
            KeywardError::MalformedEnvelope(format!(
                "msgid must be an unsigned 32-bit integer, got {}",
                describe(value)
            ))
        })
}

fn read_code(value: &Value, what: &str) -> Result<u64> {
    value.as_u64().ok_or_else(|| {
        KeywardError::MalformedEnvelope(format!(
            "{} must be an unsigned integer, got {}",
            what,
            describe(value)
        ))
    })
}

fn read_args(value: &Value) -> Result<Vec<Payload>> {
    let items = value.as_array().ok_or_else(|| {
        KeywardError::MalformedEnvelope(format!(
            "arguments must be an array, got {}",
            value_kind(value)
        ))
    })?;

    items
        .iter()
        .enumerate()
        .map(|(i, v)| match v {
            Value::Binary(bytes) => Ok(Payload::new(bytes.clone())),
            other => Err(KeywardError::MalformedEnvelope(format!(
                "argument {} must be bin, got {}",
                i,
                value_kind(other)
            ))),
        })
        .collect()
}

fn describe(value: &Value) -> String {
    if let Some(i) = value.as_i64() {
        i.to_string()
    } else if let Some(u) = value.as_u64() {
        u.to_string()
    } else {
        value_kind(value).to_string()
    }
}
