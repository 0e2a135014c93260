//! Typed messages
//!
//! What the dispatcher hands back after validating an [`Envelope`].

use rmpv::Value;

use super::envelope::{Envelope, Payload};
use super::vocabulary::{AuthError, AuthMessage, AuthNotice, MessageType, SessionType, Tag};

/// Caller-assigned id correlating a request with its response
pub type MsgId = u32;

/// Code carried by a notification.
///
/// Session types and notices share the notification slot but never a code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NoticeCode {
    /// Announces the session kind; must open the connection
    Session(SessionType),
    /// An in-session signal
    Notice(AuthNotice),
}

impl NoticeCode {
    pub fn code(self) -> u8 {
        match self {
            NoticeCode::Session(s) => s.code(),
            NoticeCode::Notice(n) => n.code(),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            NoticeCode::Session(s) => s.name(),
            NoticeCode::Notice(n) => n.name(),
        }
    }
}

impl From<SessionType> for NoticeCode {
    fn from(s: SessionType) -> Self {
        NoticeCode::Session(s)
    }
}

impl From<AuthNotice> for NoticeCode {
    fn from(n: AuthNotice) -> Self {
        NoticeCode::Notice(n)
    }
}

/// A request for a keyfile operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub msgid: MsgId,
    pub operation: AuthMessage,
    pub args: Vec<Payload>,
}

/// The answer to a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub msgid: MsgId,
    pub error: AuthError,
    /// Meaningful only when `error` is `Nil`
    pub result: Payload,
}

impl Response {
    pub fn is_ok(&self) -> bool {
        self.error == AuthError::Nil
    }
}

/// A one-way signal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub code: NoticeCode,
    pub args: Vec<Payload>,
}

/// A validated protocol message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Request(Request),
    Response(Response),
    Notification(Notification),
}

impl Message {
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::Request(_) => MessageType::Request,
            Message::Response(_) => MessageType::Response,
            Message::Notification(_) => MessageType::Notification,
        }
    }
}

fn args_value(args: &[Payload]) -> Value {
    Value::Array(args.iter().map(Payload::to_value).collect())
}

impl From<&Request> for Envelope {
    fn from(req: &Request) -> Self {
        Envelope::from_fields(vec![
            Value::from(MessageType::Request.code()),
            Value::from(req.msgid),
            Value::from(req.operation.code()),
            args_value(&req.args),
        ])
    }
}

impl From<&Response> for Envelope {
    fn from(resp: &Response) -> Self {
        // An empty result travels as nil
        let result = if resp.result.is_empty() {
            Value::Nil
        } else {
            resp.result.to_value()
        };
        Envelope::from_fields(vec![
            Value::from(MessageType::Response.code()),
            Value::from(resp.msgid),
            Value::from(resp.error.code()),
            result,
        ])
    }
}

impl From<&Notification> for Envelope {
    fn from(info: &Notification) -> Self {
        Envelope::from_fields(vec![
            Value::from(MessageType::Notification.code()),
            Value::from(info.code.code()),
            args_value(&info.args),
        ])
    }
}

impl From<&Message> for Envelope {
    fn from(msg: &Message) -> Self {
        match msg {
            Message::Request(r) => r.into(),
            Message::Response(r) => r.into(),
            Message::Notification(n) => n.into(),
        }
    }
}

impl From<Request> for Message {
    fn from(r: Request) -> Self {
        Message::Request(r)
    }
}

impl From<Response> for Message {
    fn from(r: Response) -> Self {
        Message::Response(r)
    }
}

impl From<Notification> for Message {
    fn from(n: Notification) -> Self {
        Message::Notification(n)
    }
}
