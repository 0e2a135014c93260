//! Protocol Module
//!
//! Defines the wire protocol spoken between keyfile clients and the server.
//!
//! ## Envelope Format (MessagePack array)
//!
//! ```text
//! ┌──────────┬──────────┬─────────────┬──────────────────┐
//! │ Type (0) │ MsgId    │ Operation   │ [bin, ...]       │  Request
//! ├──────────┼──────────┼─────────────┼──────────────────┤
//! │ Type (1) │ MsgId    │ AuthError   │ bin | nil        │  Response
//! ├──────────┼──────────┼─────────────┴──────────────────┘
//! │ Type (2) │ Code     │ [bin, ...]                         Notification
//! └──────────┴──────────┴──────────────┘
//! ```
//!
//! ### Operations
//! - 0: GetKeyFile     - key
//! - 1: CreateKeyFile  - key, keyfile
//! - 2: ChangeKeyFile  - key, new keyfile
//! - 3: ChangeKey      - old key, new key
//! - 4: ReplaceKeyFile - old key, new key, new keyfile
//! - 5: DeleteKeyFile  - key
//! - 6: KeyExists      - key
//!
//! ### Error Codes
//! - 0: Nil
//! - 1: KeyFileNotFound
//! - 2: KeyFileExists
//! - 3: DatabaseError
//!
//! ### Notification Codes
//! - 0: SessionType::Boot
//! - 1: SessionType::Auth
//! - 2: AuthNotice::Done

mod vocabulary;
mod envelope;
mod message;
mod builder;
mod dispatch;
mod codec;

pub use vocabulary::{
    name_for, tag_for, AuthError, AuthMessage, AuthNotice, Enumeration, MessageType, SessionType,
    Tag,
};
pub use envelope::{value_kind, Envelope, IntoPayload, Payload};
pub use message::{Message, MsgId, NoticeCode, Notification, Request, Response};
pub use builder::{
    build_notification, build_notification_with, build_request, build_response, check_msgid,
    notification, request, response, NoticeSchema,
};
pub use dispatch::{classify, decode_message, notice_code};
pub use codec::{
    decode, encode, frame_len, scan_frame, write_envelope, FrameReader, FrameScan, MAX_FRAME_SIZE,
};
