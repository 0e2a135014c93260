//! TCP Client
//!
//! Speaks the keyfile protocol to a server. Requests may be pipelined: each
//! one registers a waiter under its msgid, and a reader thread hands every
//! incoming response to the matching waiter, in whatever order they arrive.
//! Once the reader stops, the waiter table is closed and new requests fail
//! with [`KeywardError::ConnectionClosed`].

use std::collections::HashMap;
use std::io::{BufReader, BufWriter};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;

use crate::error::{KeywardError, Result};
use crate::protocol::{
    classify, decode, write_envelope, AuthError, AuthMessage, FrameReader, IntoPayload, Message, MsgId,
    Response, SessionType,
};
use crate::service::KEY_PRESENT;
use crate::session::{Session, SessionState, SharedSession};

/// Waiters by msgid; `None` once the reader has stopped
type PendingMap = Arc<Mutex<Option<HashMap<MsgId, Sender<Response>>>>>;

/// Client side of one connection
pub struct Client {
    stream: TcpStream,
    writer: Mutex<BufWriter<TcpStream>>,
    session: SharedSession,
    pending: PendingMap,
    next_id: AtomicU32,
    timeout: Option<Duration>,
    reader: Option<JoinHandle<()>>,
}

/// A request in flight
pub struct PendingResponse {
    msgid: MsgId,
    rx: Receiver<Response>,
    pending: PendingMap,
    timeout: Option<Duration>,
}

impl PendingResponse {
    pub fn msgid(&self) -> MsgId {
        self.msgid
    }

    /// Block until the matching response arrives
    pub fn wait(self) -> Result<Response> {
        let received = match self.timeout {
            Some(timeout) => self.rx.recv_timeout(timeout),
            None => self.rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };
        match received {
            Ok(resp) => Ok(resp),
            Err(RecvTimeoutError::Timeout) => {
                // Abandon the id; a late response is dropped by the reader
                if let Some(waiters) = self.pending.lock().as_mut() {
                    waiters.remove(&self.msgid);
                }
                Err(KeywardError::Network(format!(
                    "timed out waiting for response {}",
                    self.msgid
                )))
            }
            Err(RecvTimeoutError::Disconnected) => Err(KeywardError::ConnectionClosed),
        }
    }
}

impl Client {
    /// Connect to a server
    pub fn connect(addr: impl ToSocketAddrs) -> Result<Self> {
        let stream = TcpStream::connect(addr)?;
        stream.set_nodelay(true)?;

        let session = Session::new().shared();
        let pending: PendingMap = Arc::new(Mutex::new(Some(HashMap::new())));

        let reader = {
            let stream = stream.try_clone()?;
            let session = Arc::clone(&session);
            let pending = Arc::clone(&pending);
            thread::Builder::new()
                .name("keyward-client-reader".to_string())
                .spawn(move || read_loop(stream, session, pending))?
        };

        Ok(Self {
            writer: Mutex::new(BufWriter::new(stream.try_clone()?)),
            stream,
            session,
            pending,
            next_id: AtomicU32::new(0),
            timeout: None,
            reader: Some(reader),
        })
    }

    /// Give up on responses that take longer than `timeout`
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn session_state(&self) -> SessionState {
        self.session.lock().state()
    }

    /// Announce the session type. Must be the first thing sent.
    pub fn start(&self, session_type: SessionType) -> Result<()> {
        let mut session = self.session.lock();
        let envelope = session.start(session_type)?;
        write_envelope(&mut *self.writer.lock(), &envelope)?;
        tracing::debug!("Started {:?} session", session_type);
        Ok(())
    }

    /// Send a request without waiting for its response
    pub fn send_request<I>(&self, operation: AuthMessage, args: I) -> Result<PendingResponse>
    where
        I: IntoIterator,
        I::Item: IntoPayload,
    {
        let msgid = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = channel::bounded(1);

        // Session order must match wire order, so hold the session across the write
        let mut session = self.session.lock();
        let envelope = session.request(i64::from(msgid), operation, args)?;

        match self.pending.lock().as_mut() {
            Some(waiters) => waiters.insert(msgid, tx),
            None => return Err(KeywardError::ConnectionClosed),
        };
        if let Err(e) = write_envelope(&mut *self.writer.lock(), &envelope) {
            if let Some(waiters) = self.pending.lock().as_mut() {
                waiters.remove(&msgid);
            }
            return Err(e);
        }
        tracing::trace!(msgid, operation = ?operation, "Request sent");

        Ok(PendingResponse {
            msgid,
            rx,
            pending: Arc::clone(&self.pending),
            timeout: self.timeout,
        })
    }

    /// Send a request and block for its response
    pub fn call<I>(&self, operation: AuthMessage, args: I) -> Result<Response>
    where
        I: IntoIterator,
        I::Item: IntoPayload,
    {
        self.send_request(operation, args)?.wait()
    }

    // =========================================================================
    // Operations
    // =========================================================================

    pub fn get_keyfile(&self, key: &[u8]) -> Result<Response> {
        self.call(AuthMessage::GetKeyFile, [key])
    }

    pub fn create_keyfile(&self, key: &[u8], keyfile: &[u8]) -> Result<Response> {
        self.call(AuthMessage::CreateKeyFile, [key, keyfile])
    }

    pub fn change_keyfile(&self, key: &[u8], keyfile: &[u8]) -> Result<Response> {
        self.call(AuthMessage::ChangeKeyFile, [key, keyfile])
    }

    pub fn change_key(&self, old_key: &[u8], new_key: &[u8]) -> Result<Response> {
        self.call(AuthMessage::ChangeKey, [old_key, new_key])
    }

    pub fn replace_keyfile(&self, old_key: &[u8], new_key: &[u8], keyfile: &[u8]) -> Result<Response> {
        self.call(AuthMessage::ReplaceKeyFile, [old_key, new_key, keyfile])
    }

    pub fn delete_keyfile(&self, key: &[u8]) -> Result<Response> {
        self.call(AuthMessage::DeleteKeyFile, [key])
    }

    pub fn key_exists(&self, key: &[u8]) -> Result<bool> {
        let resp = self.call(AuthMessage::KeyExists, [key])?;
        if resp.error != AuthError::Nil {
            return Err(KeywardError::Network(format!(
                "KeyExists answered with {:?}",
                resp.error
            )));
        }
        Ok(resp.result.as_bytes() == [KEY_PRESENT])
    }

    /// Send `Done`, ending the session
    ///
    /// Collect outstanding responses first: anything arriving after `Done`
    /// is discarded.
    pub fn finish(&self) -> Result<()> {
        let mut session = self.session.lock();
        let envelope = session.finish()?;
        write_envelope(&mut *self.writer.lock(), &envelope)?;
        tracing::debug!("Session finished");
        Ok(())
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        let _ = self.stream.shutdown(Shutdown::Both);
        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }
    }
}

fn read_loop(stream: TcpStream, session: SharedSession, pending: PendingMap) {
    let mut reader = FrameReader::new(BufReader::new(stream));
    loop {
        let frame = match reader.read_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                tracing::debug!("Server closed the connection");
                break;
            }
            Err(e) => {
                // The stream cannot be resynchronised after a bad frame
                tracing::debug!("Reader stopped: {}", e);
                break;
            }
        };

        let envelope = match decode(&frame) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!("Dropping undecodable envelope: {}", e);
                continue;
            }
        };

        let msg = match classify(&envelope) {
            Ok(msg) => msg,
            Err(e) => {
                tracing::warn!("Dropping envelope: {}", e);
                continue;
            }
        };

        if let Err(e) = session.lock().observe(&msg) {
            tracing::warn!("Dropping {:?}: {}", msg.message_type(), e);
            continue;
        }

        match msg {
            Message::Response(resp) => {
                let waiter = pending.lock().as_mut().and_then(|w| w.remove(&resp.msgid));
                match waiter {
                    Some(tx) => {
                        let _ = tx.send(resp);
                    }
                    None => tracing::debug!("No waiter for response {}", resp.msgid),
                }
            }
            other => tracing::debug!("Ignoring {:?} from server", other.message_type()),
        }
    }

    // Close the table and wake every waiter with a disconnect
    pending.lock().take();
}
