//! Service Module
//!
//! Server-side protocol logic, independent of any transport.
//!
//! A [`SessionHandler`] owns one connection's [`Session`] and answers each
//! incoming envelope:
//!
//! ```text
//!  bytes ─▶ decode ─▶ Session::receive ─▶ handle_request ─▶ Session::response ─▶ bytes
//!                      (classify + gate)    (KeyFileStore)
//! ```

mod handler;

pub use handler::{handle_request, KEY_ABSENT, KEY_PRESENT};

use crate::error::{KeywardError, Result};
use crate::protocol::{Envelope, Message, MessageType};
use crate::session::{Session, SessionState};
use crate::store::SharedStore;

/// Answers the envelopes of a single connection
pub struct SessionHandler {
    session: Session,
    store: SharedStore,
}

impl SessionHandler {
    pub fn new(store: SharedStore) -> Self {
        Self {
            session: Session::new(),
            store,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    pub fn is_ended(&self) -> bool {
        self.session.is_ended()
    }

    /// Process one incoming envelope
    ///
    /// Returns the reply to send, if the message calls for one.
    pub fn handle(&mut self, envelope: &Envelope) -> Result<Option<Envelope>> {
        let msg = self.session.receive(envelope)?;
        match msg {
            Message::Request(req) => {
                tracing::trace!(msgid = req.msgid, operation = ?req.operation, "Request");
                let resp = handle_request(&self.store, &req)?;
                let reply = self
                    .session
                    .response(i64::from(resp.msgid), resp.error, resp.result)?;
                Ok(Some(reply))
            }
            Message::Notification(info) => {
                tracing::debug!("Notice {} -> {:?}", info.code.name(), self.session.state());
                Ok(None)
            }
            Message::Response(_) => Err(KeywardError::UnexpectedMessage(MessageType::Response)),
        }
    }
}
