//! Session lifecycle
//!
//! Every connection carries exactly one session:
//!
//! ```text
//!   Unstarted ──(SessionType notice)──▶ Started(Boot | Auth) ──(Done)──▶ Ended
//! ```
//!
//! The session type notice must be the first message on a connection. While
//! `Started(Boot)` only `GetKeyFile` may be requested. Nothing is legal after
//! `Ended`, and there is no way back.
//!
//! Both peers run the same machine: the client feeds it what it sends, the
//! server feeds it what it receives. All transitions go through
//! [`Session::observe`].

use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{KeywardError, Result};
use crate::protocol::{
    self, classify, AuthError, AuthMessage, AuthNotice, Envelope, IntoPayload, Message,
    NoticeCode, NoticeSchema, SessionType,
};

/// Where a session is in its life
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unstarted,
    Started(SessionType),
    Ended,
}

/// A session shared between workers servicing one connection
pub type SharedSession = Arc<Mutex<Session>>;

/// Per-connection session state machine
#[derive(Debug, Clone)]
pub struct Session {
    state: SessionState,
    schema: NoticeSchema,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self::with_schema(NoticeSchema::default())
    }

    /// Create a session that builds notifications against a custom schema
    pub fn with_schema(schema: NoticeSchema) -> Self {
        Self {
            state: SessionState::Unstarted,
            schema,
        }
    }

    pub fn shared(self) -> SharedSession {
        Arc::new(Mutex::new(self))
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The session type, once started
    pub fn session_type(&self) -> Option<SessionType> {
        match self.state {
            SessionState::Started(t) => Some(t),
            _ => None,
        }
    }

    pub fn is_ended(&self) -> bool {
        self.state == SessionState::Ended
    }

    // =========================================================================
    // Transitions
    // =========================================================================

    /// Compute the state `msg` would move the session to, without moving it
    pub fn check(&self, msg: &Message) -> Result<SessionState> {
        match (self.state, msg) {
            (SessionState::Ended, _) => Err(KeywardError::SessionClosed),

            (SessionState::Unstarted, Message::Notification(n)) => match n.code {
                NoticeCode::Session(t) => Ok(SessionState::Started(t)),
                NoticeCode::Notice(_) => Err(KeywardError::SessionNotStarted),
            },
            (SessionState::Unstarted, _) => Err(KeywardError::SessionNotStarted),

            (SessionState::Started(t), Message::Notification(n)) => match n.code {
                NoticeCode::Session(_) => Err(KeywardError::SessionAlreadyStarted(t)),
                NoticeCode::Notice(AuthNotice::Done) => Ok(SessionState::Ended),
            },
            (SessionState::Started(t), Message::Request(req)) => {
                check_operation(t, req.operation)?;
                Ok(self.state)
            }
            (SessionState::Started(_), Message::Response(_)) => Ok(self.state),
        }
    }

    /// Validate `msg` against the current state and apply its transition
    pub fn observe(&mut self, msg: &Message) -> Result<SessionState> {
        let next = match self.check(msg) {
            Ok(next) => next,
            Err(e) => {
                tracing::warn!(state = ?self.state, "Rejected {:?}: {}", msg.message_type(), e);
                return Err(e);
            }
        };
        if next != self.state {
            tracing::debug!(from = ?self.state, to = ?next, "Session transition");
        }
        self.state = next;
        Ok(next)
    }

    /// Classify an incoming envelope and observe it
    pub fn receive(&mut self, envelope: &Envelope) -> Result<Message> {
        let msg = classify(envelope)?;
        self.observe(&msg)?;
        Ok(msg)
    }

    // =========================================================================
    // Building through the session
    // =========================================================================

    /// Build the opening notice
    pub fn start(&mut self, session_type: SessionType) -> Result<Envelope> {
        self.notify(session_type, Vec::<Vec<u8>>::new())
    }

    /// Build the closing `Done` notice
    pub fn finish(&mut self) -> Result<Envelope> {
        self.notify(AuthNotice::Done, Vec::<Vec<u8>>::new())
    }

    /// Build a request, rejecting it if the session does not allow it
    pub fn request<I>(&mut self, msgid: i64, operation: AuthMessage, args: I) -> Result<Envelope>
    where
        I: IntoIterator,
        I::Item: IntoPayload,
    {
        match self.state {
            SessionState::Ended => return Err(KeywardError::SessionClosed),
            SessionState::Unstarted => return Err(KeywardError::SessionNotStarted),
            SessionState::Started(t) => check_operation(t, operation)?,
        }
        let req = protocol::request(msgid, operation, args)?;
        let msg = Message::Request(req);
        self.observe(&msg)?;
        Ok(Envelope::from(&msg))
    }

    /// Build a response to a request received on this session
    pub fn response(
        &mut self,
        msgid: i64,
        error: AuthError,
        result: impl IntoPayload,
    ) -> Result<Envelope> {
        let msg = Message::Response(protocol::response(msgid, error, result)?);
        self.observe(&msg)?;
        Ok(Envelope::from(&msg))
    }

    /// Build any notification
    pub fn notify<I>(&mut self, code: impl Into<NoticeCode>, args: I) -> Result<Envelope>
    where
        I: IntoIterator,
        I::Item: IntoPayload,
    {
        if self.is_ended() {
            return Err(KeywardError::SessionClosed);
        }
        let msg = Message::Notification(protocol::notification(&self.schema, code.into(), args)?);
        self.observe(&msg)?;
        Ok(Envelope::from(&msg))
    }
}

fn check_operation(session: SessionType, operation: AuthMessage) -> Result<()> {
    if operation.permitted_in(session) {
        Ok(())
    } else {
        Err(KeywardError::OperationNotPermitted { operation, session })
    }
}
