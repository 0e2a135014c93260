//! TCP Server
//!
//! Accepts connections and runs each one on its own thread.

use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::config::Config;
use crate::error::Result;
use crate::store::{self, FileStore, MemoryStore, SharedStore};
use super::Connection;

/// How long the accept loop sleeps when no client is waiting
const ACCEPT_POLL: Duration = Duration::from_millis(20);

/// TCP server for Keyward
pub struct Server {
    config: Config,
    store: SharedStore,
    listener: TcpListener,
    active: Arc<AtomicUsize>,
    shutdown: Arc<AtomicBool>,
}

impl Server {
    /// Bind the listen address and serve keyfiles from `store`
    pub fn bind(config: Config, store: SharedStore) -> Result<Self> {
        config.validate()?;

        let listener = TcpListener::bind(&config.listen_addr)?;
        listener.set_nonblocking(true)?;
        tracing::info!("Listening on {}", listener.local_addr()?);

        Ok(Self {
            config,
            store,
            listener,
            active: Arc::new(AtomicUsize::new(0)),
            shutdown: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Open the store described by `config`, then bind
    pub fn open(config: Config) -> Result<Self> {
        let store = match &config.store_path {
            Some(path) => {
                tracing::info!("Keyfile snapshot: {}", path.display());
                store::shared(FileStore::open(path)?)
            }
            None => {
                tracing::info!("Keyfiles kept in memory");
                store::shared(MemoryStore::new())
            }
        };
        Self::bind(config, store)
    }

    /// The address actually bound (useful with port 0)
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// The store this server answers from
    pub fn store(&self) -> SharedStore {
        Arc::clone(&self.store)
    }

    /// Flag that stops the accept loop when set
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Number of connections currently being served
    pub fn active_connections(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    /// Start the server (blocking until shutdown)
    pub fn run(&self) -> Result<()> {
        while !self.shutdown.load(Ordering::Relaxed) {
            match self.listener.accept() {
                Ok((stream, addr)) => self.dispatch(stream, addr),
                Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    thread::sleep(ACCEPT_POLL);
                }
                Err(e) => {
                    tracing::warn!("Accept failed: {}", e);
                    thread::sleep(ACCEPT_POLL);
                }
            }
        }

        tracing::info!(
            "Server shutting down with {} active connection(s)",
            self.active_connections()
        );
        Ok(())
    }

    /// Signal the server to shutdown gracefully
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    fn dispatch(&self, stream: TcpStream, addr: SocketAddr) {
        if self.active.load(Ordering::Acquire) >= self.config.max_connections {
            tracing::warn!(
                "Refusing {}: {} connections already open",
                addr,
                self.config.max_connections
            );
            return;
        }

        // Accepted sockets inherit non-blocking mode on some platforms
        if let Err(e) = stream.set_nonblocking(false) {
            tracing::warn!("Could not configure socket for {}: {}", addr, e);
            return;
        }

        let mut conn = match Connection::with_max_frame_size(
            stream,
            Arc::clone(&self.store),
            self.config.max_frame_size,
        ) {
            Ok(conn) => conn,
            Err(e) => {
                tracing::warn!("Could not set up connection for {}: {}", addr, e);
                return;
            }
        };
        if let Err(e) = conn.set_timeouts(self.config.read_timeout_ms, self.config.write_timeout_ms) {
            tracing::warn!("Could not set timeouts for {}: {}", addr, e);
            return;
        }

        let active = Arc::clone(&self.active);
        active.fetch_add(1, Ordering::AcqRel);
        let spawned = thread::Builder::new()
            .name(format!("keyward-conn-{}", addr))
            .spawn({
                let active = Arc::clone(&active);
                move || {
                    if let Err(e) = conn.handle() {
                        tracing::debug!("Connection {} ended with error: {}", conn.peer_addr(), e);
                    }
                    active.fetch_sub(1, Ordering::AcqRel);
                }
            });

        if let Err(e) = spawned {
            tracing::warn!("Could not spawn connection thread for {}: {}", addr, e);
            active.fetch_sub(1, Ordering::AcqRel);
        }
    }
}
