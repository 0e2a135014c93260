//! Protocol vocabulary
//!
//! Every integer tag that appears on the wire belongs to one of the closed
//! enumerations defined here. The lookup table is static and read-only.

use std::fmt;

use crate::error::{KeywardError, Result};

/// The enumerations that make up the protocol vocabulary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Enumeration {
    MessageType,
    SessionType,
    AuthMessage,
    AuthError,
    AuthNotice,
}

impl Enumeration {
    pub const ALL: [Enumeration; 5] = [
        Enumeration::MessageType,
        Enumeration::SessionType,
        Enumeration::AuthMessage,
        Enumeration::AuthError,
        Enumeration::AuthNotice,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Enumeration::MessageType => "MessageType",
            Enumeration::SessionType => "SessionType",
            Enumeration::AuthMessage => "AuthMessage",
            Enumeration::AuthError => "AuthError",
            Enumeration::AuthNotice => "AuthNotice",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|e| e.name() == name)
    }

    /// `(name, code)` pairs for every member
    pub fn members(self) -> &'static [(&'static str, u8)] {
        match self {
            Enumeration::MessageType => MessageType::TABLE,
            Enumeration::SessionType => SessionType::TABLE,
            Enumeration::AuthMessage => AuthMessage::TABLE,
            Enumeration::AuthError => AuthError::TABLE,
            Enumeration::AuthNotice => AuthNotice::TABLE,
        }
    }
}

impl fmt::Display for Enumeration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Conversion between a closed enum and its wire code
pub trait Tag: Sized + Copy + 'static {
    /// Which enumeration this type is
    const ENUMERATION: Enumeration;

    /// Every member, in code order
    const ALL: &'static [Self];

    /// The integer written on the wire
    fn code(self) -> u8;

    /// The member's name
    fn name(self) -> &'static str;

    /// Map a wire code back to a member
    fn from_code(code: u64) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| u64::from(t.code()) == code)
            .ok_or(KeywardError::UnknownOperation {
                enumeration: Self::ENUMERATION,
                code,
            })
    }

    /// Map a member name back to a member
    fn from_name(name: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.name() == name)
            .ok_or_else(|| KeywardError::UnknownTag(format!("{}.{}", Self::ENUMERATION, name)))
    }
}

macro_rules! vocabulary {
    (
        $(#[$meta:meta])*
        $enumeration:ident {
            $( $(#[$vmeta:meta])* $variant:ident = $code:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u8)]
        pub enum $enumeration {
            $( $(#[$vmeta])* $variant = $code ),+
        }

        impl $enumeration {
            const TABLE: &'static [(&'static str, u8)] = &[ $( (stringify!($variant), $code) ),+ ];
        }

        impl Tag for $enumeration {
            const ENUMERATION: Enumeration = Enumeration::$enumeration;
            const ALL: &'static [Self] = &[ $( $enumeration::$variant ),+ ];

            fn code(self) -> u8 {
                self as u8
            }

            fn name(self) -> &'static str {
                match self {
                    $( $enumeration::$variant => stringify!($variant) ),+
                }
            }
        }
    };
}

vocabulary! {
    /// Role of an envelope
    MessageType {
        /// A message initiating a request
        Request = 0,
        /// A message sent in response to a request
        Response = 1,
        /// A message carrying a signal with no reply
        Notification = 2,
    }
}

vocabulary! {
    /// Kind of session announced at the start of a connection
    SessionType {
        /// Agent bootstrap. Authentication services are likely unavailable,
        /// so only GetKeyFile may be requested.
        Boot = 0,
        /// Authenticated access. Every request is available.
        Auth = 1,
    }
}

vocabulary! {
    /// Keyfile operations carried by requests
    AuthMessage {
        /// key
        GetKeyFile = 0,
        /// key, keyfile. Fails if the key already has a keyfile.
        CreateKeyFile = 1,
        /// key, new keyfile. Requires an existing keyfile.
        ChangeKeyFile = 2,
        /// old key, new key. Requires an existing keyfile.
        ChangeKey = 3,
        /// old key, new key, new keyfile. Requires an existing keyfile.
        ReplaceKeyFile = 4,
        /// key. Requires an existing keyfile.
        DeleteKeyFile = 5,
        /// key. Always succeeds.
        KeyExists = 6,
    }
}

vocabulary! {
    /// Outcome carried by responses
    AuthError {
        Nil = 0,
        KeyFileNotFound = 1,
        KeyFileExists = 2,
        DatabaseError = 3,
    }
}

vocabulary! {
    /// Signals sent by the client during a session.
    ///
    /// Codes start at 2 so they never collide with [`SessionType`].
    AuthNotice {
        /// No more requests will be made
        Done = 2,
    }
}

impl AuthMessage {
    /// Number of byte-string arguments the operation takes
    pub fn arity(self) -> usize {
        match self {
            AuthMessage::GetKeyFile | AuthMessage::DeleteKeyFile | AuthMessage::KeyExists => 1,
            AuthMessage::CreateKeyFile | AuthMessage::ChangeKeyFile | AuthMessage::ChangeKey => 2,
            AuthMessage::ReplaceKeyFile => 3,
        }
    }

    /// Whether the operation may be requested in the given session
    pub fn permitted_in(self, session: SessionType) -> bool {
        match session {
            SessionType::Boot => self == AuthMessage::GetKeyFile,
            SessionType::Auth => true,
        }
    }
}

/// Look up the wire code for a name.
///
/// Accepts either a bare member name (`"GetKeyFile"`) or a qualified one
/// (`"AuthMessage.GetKeyFile"`). Bare names are unique across enumerations.
pub fn tag_for(name: &str) -> Result<u8> {
    let (scope, member) = match name.split_once('.') {
        Some((scope, member)) => {
            let scope = Enumeration::from_name(scope)
                .ok_or_else(|| KeywardError::UnknownTag(name.to_string()))?;
            (Some(scope), member)
        }
        None => (None, name),
    };

    Enumeration::ALL
        .into_iter()
        .filter(|e| scope.map_or(true, |s| s == *e))
        .flat_map(|e| e.members().iter())
        .find(|(n, _)| *n == member)
        .map(|(_, code)| *code)
        .ok_or_else(|| KeywardError::UnknownTag(name.to_string()))
}

/// Look up the member name for a wire code within an enumeration
pub fn name_for(tag: u64, enumeration: Enumeration) -> Result<&'static str> {
    enumeration
        .members()
        .iter()
        .find(|(_, code)| u64::from(*code) == tag)
        .map(|(n, _)| *n)
        .ok_or_else(|| KeywardError::UnknownTag(format!("{} in {}", tag, enumeration)))
}
