//! Connection Handler
//!
//! Handles individual client connections.

use std::io::{BufReader, BufWriter};
use std::net::TcpStream;
use std::time::Duration;

use crate::error::{ErrorClass, KeywardError, Result};
use crate::protocol::{decode, write_envelope, Envelope, FrameReader, MAX_FRAME_SIZE};
use crate::service::SessionHandler;
use crate::store::SharedStore;

/// Handles a single client connection
pub struct Connection {
    /// Frame reader over the TCP stream (buffered for efficiency)
    reader: FrameReader<BufReader<TcpStream>>,

    /// TCP stream writer (buffered for efficiency)
    writer: BufWriter<TcpStream>,

    /// Session state and request execution for this connection
    handler: SessionHandler,

    /// Peer address for logging
    peer_addr: String,
}

impl Connection {
    /// Create a new connection handler
    pub fn new(stream: TcpStream, store: SharedStore) -> Result<Self> {
        Self::with_max_frame_size(stream, store, MAX_FRAME_SIZE)
    }

    /// Create a connection handler with a custom envelope size limit
    pub fn with_max_frame_size(
        stream: TcpStream,
        store: SharedStore,
        max_frame_size: usize,
    ) -> Result<Self> {
        // Get peer address for logging before we split the stream
        let peer_addr = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        // Disable Nagle's algorithm for low latency
        stream.set_nodelay(true)?;

        let read_stream = stream.try_clone()?;
        let write_stream = stream;

        Ok(Self {
            reader: FrameReader::with_max_frame_size(BufReader::new(read_stream), max_frame_size),
            writer: BufWriter::new(write_stream),
            handler: SessionHandler::new(store),
            peer_addr,
        })
    }

    /// Configure connection timeouts
    pub fn set_timeouts(&mut self, read_ms: u64, write_ms: u64) -> Result<()> {
        let read_stream = self.reader.get_ref().get_ref();
        let write_stream = self.writer.get_ref();

        if read_ms > 0 {
            read_stream.set_read_timeout(Some(Duration::from_millis(read_ms)))?;
        }
        if write_ms > 0 {
            write_stream.set_write_timeout(Some(Duration::from_millis(write_ms)))?;
        }

        Ok(())
    }

    /// Handle the connection (blocking until closed)
    ///
    /// Reads envelopes in a loop and sends replies. Returns when the client
    /// disconnects, ends its session, or breaks the session rules.
    pub fn handle(&mut self) -> Result<()> {
        tracing::debug!("Connection established from {}", self.peer_addr);

        loop {
            let frame = match self.reader.read_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    tracing::debug!("Client {} disconnected", self.peer_addr);
                    return Ok(());
                }
                Err(KeywardError::Io(ref e)) if is_disconnect(e.kind()) => {
                    tracing::debug!("Connection to {} closed: {}", self.peer_addr, e);
                    return Ok(());
                }
                Err(e) => {
                    // The stream cannot be resynchronised after a bad frame
                    tracing::warn!("Error reading from {}: {}", self.peer_addr, e);
                    return Err(e);
                }
            };

            let envelope = match decode(&frame) {
                Ok(envelope) => envelope,
                Err(e) => {
                    tracing::warn!("Dropping undecodable envelope from {}: {}", self.peer_addr, e);
                    continue;
                }
            };

            tracing::trace!("Received from {}: {:?}", self.peer_addr, envelope);

            match self.handler.handle(&envelope) {
                Ok(Some(reply)) => self.send(&reply)?,
                Ok(None) => {}
                Err(e) if e.class() == ErrorClass::Lifecycle => {
                    tracing::warn!("Closing {}: {}", self.peer_addr, e);
                    return Err(e);
                }
                Err(e) => {
                    tracing::warn!("Dropping envelope from {}: {}", self.peer_addr, e);
                    if e.is_fatal_to_session() {
                        return Err(e);
                    }
                }
            }

            if self.handler.is_ended() {
                tracing::debug!("Session with {} ended", self.peer_addr);
                return Ok(());
            }
        }
    }

    /// Send an envelope to the client
    fn send(&mut self, envelope: &Envelope) -> Result<()> {
        match write_envelope(&mut self.writer, envelope) {
            Err(KeywardError::Io(ref e)) if is_disconnect(e.kind()) => {
                // Client went away before the reply could be sent
                tracing::debug!("Client {} disconnected before reply: {}", self.peer_addr, e);
                Err(KeywardError::ConnectionClosed)
            }
            other => other,
        }
    }

    /// Get the peer address string
    pub fn peer_addr(&self) -> &str {
        &self.peer_addr
    }
}

fn is_disconnect(kind: std::io::ErrorKind) -> bool {
    use std::io::ErrorKind;
    matches!(
        kind,
        ErrorKind::UnexpectedEof
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe
            | ErrorKind::WouldBlock
            | ErrorKind::TimedOut
    )
}
