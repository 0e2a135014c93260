//! Envelope and payload definitions
//!
//! An [`Envelope`] is one protocol message as it exists on the wire: a
//! MessagePack array whose first field is the [`MessageType`] code. Its
//! sub-tags are kept as raw integers so a peer speaking a newer vocabulary
//! can still be decoded and reported precisely by the dispatcher.

use rmpv::Value;

use crate::error::{KeywardError, Result};
use super::vocabulary::{MessageType, Tag};

/// Number of fields in a request envelope
pub const REQUEST_LEN: usize = 4;

/// Number of fields in a response envelope
pub const RESPONSE_LEN: usize = 4;

/// Number of fields in a notification envelope
pub const NOTIFICATION_LEN: usize = 3;

/// Name of a MessagePack value's kind, for error messages
pub fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Nil => "nil",
        Value::Boolean(_) => "bool",
        Value::Integer(_) => "int",
        Value::F32(_) => "float32",
        Value::F64(_) => "float64",
        Value::String(_) => "str",
        Value::Binary(_) => "bin",
        Value::Array(_) => "array",
        Value::Map(_) => "map",
        Value::Ext(_, _) => "ext",
    }
}

// =============================================================================
// Payload
// =============================================================================

/// An opaque byte string carried as a request argument or response result.
///
/// The protocol never interprets these bytes. Converting text to and from
/// bytes is the caller's job, which is why there is no `From<&str>`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Payload(Vec<u8>);

impl Payload {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn empty() -> Self {
        Self(Vec::new())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub(crate) fn to_value(&self) -> Value {
        Value::Binary(self.0.clone())
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl From<&[u8]> for Payload {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

impl AsRef<[u8]> for Payload {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Anything a builder accepts as an argument.
///
/// On failure returns the kind of value that was found instead of bytes.
pub trait IntoPayload {
    fn into_payload(self) -> std::result::Result<Payload, &'static str>;
}

impl IntoPayload for Payload {
    fn into_payload(self) -> std::result::Result<Payload, &'static str> {
        Ok(self)
    }
}

impl IntoPayload for &Payload {
    fn into_payload(self) -> std::result::Result<Payload, &'static str> {
        Ok(self.clone())
    }
}

impl IntoPayload for Vec<u8> {
    fn into_payload(self) -> std::result::Result<Payload, &'static str> {
        Ok(Payload(self))
    }
}

impl IntoPayload for &[u8] {
    fn into_payload(self) -> std::result::Result<Payload, &'static str> {
        Ok(Payload(self.to_vec()))
    }
}

impl<const N: usize> IntoPayload for &[u8; N] {
    fn into_payload(self) -> std::result::Result<Payload, &'static str> {
        Ok(Payload(self.to_vec()))
    }
}

impl IntoPayload for Value {
    fn into_payload(self) -> std::result::Result<Payload, &'static str> {
        match self {
            Value::Binary(bytes) => Ok(Payload(bytes)),
            other => Err(value_kind(&other)),
        }
    }
}

// =============================================================================
// Envelope
// =============================================================================

/// One protocol message in wire form
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    fields: Vec<Value>,
}

impl Envelope {
    /// Wrap fields that are already known to be well shaped
    pub(crate) fn from_fields(fields: Vec<Value>) -> Self {
        Self { fields }
    }

    /// Wrap a decoded MessagePack value.
    ///
    /// Checks the outer shape only: an array whose first field is a
    /// message type code and whose length matches that message type.
    /// Unrecognised message types are accepted with 3 or 4 fields and left
    /// for the dispatcher to reject.
    pub fn from_value(value: Value) -> Result<Self> {
        let fields = match value {
            Value::Array(fields) => fields,
            other => {
                return Err(KeywardError::Decoding(format!(
                    "expected array but got {}",
                    value_kind(&other)
                )))
            }
        };

        let code = match fields.first() {
            Some(v) => v.as_u64().filter(|c| *c <= u64::from(u8::MAX)).ok_or_else(|| {
                KeywardError::Decoding(format!(
                    "message type must be a small unsigned integer, got {}",
                    value_kind(v)
                ))
            })?,
            None => return Err(KeywardError::Decoding("empty envelope".to_string())),
        };

        let expected: &[usize] = match MessageType::from_code(code) {
            Ok(MessageType::Request) => &[REQUEST_LEN],
            Ok(MessageType::Response) => &[RESPONSE_LEN],
            Ok(MessageType::Notification) => &[NOTIFICATION_LEN],
            Err(_) => &[NOTIFICATION_LEN, REQUEST_LEN],
        };
        if !expected.contains(&fields.len()) {
            return Err(KeywardError::Decoding(format!(
                "message type {} expects {:?} fields, got {}",
                code,
                expected,
                fields.len()
            )));
        }

        Ok(Self { fields })
    }

    /// All fields, message type first
    pub fn fields(&self) -> &[Value] {
        &self.fields
    }

    /// The raw message type code
    pub fn message_type_code(&self) -> u64 {
        self.fields.first().and_then(Value::as_u64).unwrap_or(u64::MAX)
    }

    /// The message type, if it is one this crate knows
    pub fn message_type(&self) -> Result<MessageType> {
        MessageType::from_code(self.message_type_code()).map_err(|_| {
            KeywardError::MalformedEnvelope(format!(
                "unknown message type {}",
                self.message_type_code()
            ))
        })
    }

    /// Borrow the envelope as a MessagePack array value
    pub fn to_value(&self) -> Value {
        Value::Array(self.fields.clone())
    }

    pub fn into_value(self) -> Value {
        Value::Array(self.fields)
    }
}
