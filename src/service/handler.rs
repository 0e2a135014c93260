//! Request handler
//!
//! Executes one keyfile operation against the store and wraps the outcome in
//! a [`Response`]. Store outcomes such as a missing key are domain results,
//! carried in the response's error code, never protocol errors.

use crate::error::{KeywardError, Result};
use crate::protocol::{self, AuthError, AuthMessage, Payload, Request, Response};
use crate::store::{KeyFileStore, SharedStore, StoreError};

/// Result byte for a key that exists
pub const KEY_PRESENT: u8 = 1;

/// Result byte for a key that does not exist
pub const KEY_ABSENT: u8 = 0;

/// Run a request against the store
///
/// Fails only if the request itself is malformed (wrong argument count).
pub fn handle_request(store: &SharedStore, req: &Request) -> Result<Response> {
    let expected = req.operation.arity();
    if req.args.len() != expected {
        return Err(KeywardError::ArityMismatch {
            operation: req.operation,
            expected,
            actual: req.args.len(),
        });
    }

    let arg = |i: usize| req.args[i].as_bytes();
    let outcome = match req.operation {
        AuthMessage::GetKeyFile => {
            let db = store.read();
            get_keyfile(&*db, arg(0))
        }
        AuthMessage::KeyExists => {
            let db = store.read();
            let flag = if db.exists(arg(0)) { KEY_PRESENT } else { KEY_ABSENT };
            Ok(vec![flag])
        }
        AuthMessage::CreateKeyFile => {
            let mut db = store.write();
            create_keyfile(&mut *db, arg(0), arg(1))
        }
        AuthMessage::ChangeKeyFile => {
            let mut db = store.write();
            change_keyfile(&mut *db, arg(0), arg(1))
        }
        AuthMessage::ChangeKey => {
            let mut db = store.write();
            move_keyfile(&mut *db, arg(0), arg(1), None)
        }
        AuthMessage::ReplaceKeyFile => {
            let mut db = store.write();
            move_keyfile(&mut *db, arg(0), arg(1), Some(arg(2)))
        }
        AuthMessage::DeleteKeyFile => {
            let mut db = store.write();
            delete_keyfile(&mut *db, arg(0))
        }
    };

    let msgid = i64::from(req.msgid);
    match outcome {
        Ok(result) => protocol::response(msgid, AuthError::Nil, result),
        Err(error) => {
            tracing::debug!(msgid, operation = ?req.operation, "Request failed: {:?}", error);
            protocol::response(msgid, error, Payload::empty())
        }
    }
}

type Outcome = std::result::Result<Vec<u8>, AuthError>;

fn store_error(err: StoreError) -> AuthError {
    match err {
        StoreError::KeyNotFound(_) => AuthError::KeyFileNotFound,
        StoreError::KeyExists(_) => AuthError::KeyFileExists,
        other => {
            tracing::warn!("Keyfile store failure: {}", other);
            AuthError::DatabaseError
        }
    }
}

fn get_keyfile(db: &(dyn KeyFileStore + Send + Sync), key: &[u8]) -> Outcome {
    db.get(key).map_err(store_error)
}

fn create_keyfile(db: &mut (dyn KeyFileStore + Send + Sync), key: &[u8], keyfile: &[u8]) -> Outcome {
    if db.exists(key) {
        return Err(AuthError::KeyFileExists);
    }
    db.set(key, keyfile).map_err(store_error)?;
    Ok(Vec::new())
}

fn change_keyfile(db: &mut (dyn KeyFileStore + Send + Sync), key: &[u8], keyfile: &[u8]) -> Outcome {
    if !db.exists(key) {
        return Err(AuthError::KeyFileNotFound);
    }
    db.set(key, keyfile).map_err(store_error)?;
    Ok(Vec::new())
}

/// Move a keyfile to a new key, optionally replacing its contents.
///
/// The store performs the move as a single step, so a failure leaves the
/// keyfile under its old key only.
fn move_keyfile(
    db: &mut (dyn KeyFileStore + Send + Sync),
    old_key: &[u8],
    new_key: &[u8],
    new_keyfile: Option<&[u8]>,
) -> Outcome {
    db.rename(old_key, new_key, new_keyfile).map_err(store_error)?;
    Ok(Vec::new())
}

fn delete_keyfile(db: &mut (dyn KeyFileStore + Send + Sync), key: &[u8]) -> Outcome {
    db.delete(key).map_err(store_error)?;
    Ok(Vec::new())
}
