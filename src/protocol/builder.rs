//! Message builders
//!
//! The only way to produce an outgoing [`Envelope`] from typed arguments.
//! Every builder validates before returning, so a successfully built envelope
//! always encodes.

use std::collections::HashMap;

use crate::error::{KeywardError, Result};
use super::envelope::{Envelope, IntoPayload, Payload};
use super::message::{MsgId, NoticeCode, Notification, Request, Response};
use super::vocabulary::{AuthError, AuthMessage, AuthNotice, SessionType, Tag};

/// Declared argument counts for notifications
///
/// Every notice defined today takes no arguments. A schema lets a caller
/// declare arities for notices it introduces without touching the builder.
#[derive(Debug, Clone)]
pub struct NoticeSchema {
    arities: HashMap<NoticeCode, usize>,
}

impl Default for NoticeSchema {
    fn default() -> Self {
        let arities = SessionType::ALL
            .iter()
            .map(|s| (NoticeCode::Session(*s), 0))
            .chain(AuthNotice::ALL.iter().map(|n| (NoticeCode::Notice(*n), 0)))
            .collect();
        Self { arities }
    }
}

impl NoticeSchema {
    /// Declare the argument count of a notice
    pub fn with_arity(mut self, code: NoticeCode, arity: usize) -> Self {
        self.arities.insert(code, arity);
        self
    }

    pub fn arity(&self, code: NoticeCode) -> Option<usize> {
        self.arities.get(&code).copied()
    }
}

/// Check a caller-supplied msgid against the u32 wire domain
pub fn check_msgid(msgid: i64) -> Result<MsgId> {
    MsgId::try_from(msgid).map_err(|_| KeywardError::InvalidMsgId(msgid))
}

fn collect_args<I>(args: I) -> Result<Vec<Payload>>
where
    I: IntoIterator,
    I::Item: IntoPayload,
{
    args.into_iter()
        .enumerate()
        .map(|(index, arg)| {
            arg.into_payload()
                .map_err(|found| KeywardError::ArgumentType { index, found })
        })
        .collect()
}

/// Build a typed request, validating msgid, arity, and argument types
pub fn request<I>(msgid: i64, operation: AuthMessage, args: I) -> Result<Request>
where
    I: IntoIterator,
    I::Item: IntoPayload,
{
    let msgid = check_msgid(msgid)?;
    let args = collect_args(args)?;
    if args.len() != operation.arity() {
        return Err(KeywardError::ArityMismatch {
            operation,
            expected: operation.arity(),
            actual: args.len(),
        });
    }
    Ok(Request {
        msgid,
        operation,
        args,
    })
}

/// Build a typed response, rejecting results attached to errors
pub fn response(msgid: i64, error: AuthError, result: impl IntoPayload) -> Result<Response> {
    let msgid = check_msgid(msgid)?;
    let result = result
        .into_payload()
        .map_err(|found| KeywardError::ArgumentType { index: 0, found })?;
    if error != AuthError::Nil && !result.is_empty() {
        return Err(KeywardError::InconsistentResult(error));
    }
    Ok(Response {
        msgid,
        error,
        result,
    })
}

/// Build a typed notification checked against a schema
pub fn notification<I>(schema: &NoticeSchema, code: NoticeCode, args: I) -> Result<Notification>
where
    I: IntoIterator,
    I::Item: IntoPayload,
{
    let args = collect_args(args)?;
    let expected = schema
        .arity(code)
        .ok_or_else(|| KeywardError::UnknownTag(format!("undeclared notice {}", code.name())))?;
    if args.len() != expected {
        return Err(KeywardError::MalformedEnvelope(format!(
            "notice {} expects {} argument(s), got {}",
            code.name(),
            expected,
            args.len()
        )));
    }
    Ok(Notification { code, args })
}

/// Build a request envelope
///
/// ```
/// use keyward::protocol::{build_request, AuthMessage};
///
/// let env = build_request(1, AuthMessage::GetKeyFile, [b"42"]).unwrap();
/// assert_eq!(env.fields().len(), 4);
/// ```
pub fn build_request<I>(msgid: i64, operation: AuthMessage, args: I) -> Result<Envelope>
where
    I: IntoIterator,
    I::Item: IntoPayload,
{
    request(msgid, operation, args).map(|r| Envelope::from(&r))
}

/// Build a response envelope
pub fn build_response(msgid: i64, error: AuthError, result: impl IntoPayload) -> Result<Envelope> {
    response(msgid, error, result).map(|r| Envelope::from(&r))
}

/// Build a notification envelope using the default notice schema
pub fn build_notification<I>(code: impl Into<NoticeCode>, args: I) -> Result<Envelope>
where
    I: IntoIterator,
    I::Item: IntoPayload,
{
    build_notification_with(&NoticeSchema::default(), code, args)
}

/// Build a notification envelope using a caller-declared schema
pub fn build_notification_with<I>(
    schema: &NoticeSchema,
    code: impl Into<NoticeCode>,
    args: I,
) -> Result<Envelope>
where
    I: IntoIterator,
    I::Item: IntoPayload,
{
    notification(schema, code.into(), args).map(|n| Envelope::from(&n))
}
