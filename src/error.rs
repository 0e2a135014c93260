//! Error types for Keyward
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

use crate::protocol::{AuthError, AuthMessage, Enumeration, MessageType, SessionType};
use crate::store::StoreError;

/// Result type alias using KeywardError
pub type Result<T> = std::result::Result<T, KeywardError>;

/// Unified error type for Keyward operations
#[derive(Debug, Error)]
pub enum KeywardError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Codec Errors
    // -------------------------------------------------------------------------
    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("Decoding error: {0}")]
    Decoding(String),

    // -------------------------------------------------------------------------
    // Validation Errors
    // -------------------------------------------------------------------------
    #[error("{operation:?} expects {expected} argument(s), got {actual}")]
    ArityMismatch {
        operation: AuthMessage,
        expected: usize,
        actual: usize,
    },

    #[error("Argument {index} is not a byte string (found {found})")]
    ArgumentType { index: usize, found: &'static str },

    #[error("Invalid message id: {0}")]
    InvalidMsgId(i64),

    #[error("Response with error {0:?} must carry an empty result")]
    InconsistentResult(AuthError),

    #[error("Malformed envelope: {0}")]
    MalformedEnvelope(String),

    #[error("Unknown {enumeration} code: {code}")]
    UnknownOperation { enumeration: Enumeration, code: u64 },

    #[error("Unknown tag: {0}")]
    UnknownTag(String),

    #[error("Unexpected {0:?} message")]
    UnexpectedMessage(MessageType),

    // -------------------------------------------------------------------------
    // Session Lifecycle Errors
    // -------------------------------------------------------------------------
    #[error("{operation:?} is not permitted in a {session:?} session")]
    OperationNotPermitted {
        operation: AuthMessage,
        session: SessionType,
    },

    #[error("Session is closed")]
    SessionClosed,

    #[error("Session has not been started")]
    SessionNotStarted,

    #[error("Session already started as {0:?}")]
    SessionAlreadyStarted(SessionType),

    // -------------------------------------------------------------------------
    // Storage Errors
    // -------------------------------------------------------------------------
    /// Every keyfile store failure, snapshot corruption included
    #[error(transparent)]
    Store(#[from] StoreError),

    // -------------------------------------------------------------------------
    // Network Errors
    // -------------------------------------------------------------------------
    #[error("Network error: {0}")]
    Network(String),

    #[error("Connection closed")]
    ConnectionClosed,

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Broad grouping of errors by who has to deal with them
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Bytes could not be turned into an envelope or back. Fatal to one envelope.
    Codec,
    /// A message was shaped wrong. Reported to the immediate caller.
    Validation,
    /// The session state machine rejected a message. Fatal to the session.
    Lifecycle,
    /// I/O, storage, or configuration failures outside the protocol.
    Environment,
}

impl KeywardError {
    /// Classify this error
    pub fn class(&self) -> ErrorClass {
        match self {
            KeywardError::Encoding(_) | KeywardError::Decoding(_) => ErrorClass::Codec,
            KeywardError::ArityMismatch { .. }
            | KeywardError::ArgumentType { .. }
            | KeywardError::InvalidMsgId(_)
            | KeywardError::InconsistentResult(_)
            | KeywardError::MalformedEnvelope(_)
            | KeywardError::UnknownOperation { .. }
            | KeywardError::UnknownTag(_)
            | KeywardError::UnexpectedMessage(_) => ErrorClass::Validation,
            KeywardError::OperationNotPermitted { .. }
            | KeywardError::SessionClosed
            | KeywardError::SessionNotStarted
            | KeywardError::SessionAlreadyStarted(_) => ErrorClass::Lifecycle,
            KeywardError::Io(_)
            | KeywardError::Store(_)
            | KeywardError::Network(_)
            | KeywardError::ConnectionClosed
            | KeywardError::Config(_) => ErrorClass::Environment,
        }
    }

    /// True if the logical session cannot continue after this error
    pub fn is_fatal_to_session(&self) -> bool {
        matches!(self.class(), ErrorClass::Lifecycle | ErrorClass::Environment)
    }
}
