//! Configuration for Keyward
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;

use crate::error::{KeywardError, Result};
use crate::protocol::MAX_FRAME_SIZE;

/// Main configuration for a Keyward server
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Snapshot file for keyfiles. `None` keeps keyfiles in memory only.
    pub store_path: Option<PathBuf>,

    // -------------------------------------------------------------------------
    // Network Configuration
    // -------------------------------------------------------------------------
    /// TCP listen address
    pub listen_addr: String,

    /// Max concurrent client connections
    pub max_connections: usize,

    /// Connection read timeout (milliseconds, 0 = none)
    pub read_timeout_ms: u64,

    /// Connection write timeout (milliseconds, 0 = none)
    pub write_timeout_ms: u64,

    // -------------------------------------------------------------------------
    // Protocol Configuration
    // -------------------------------------------------------------------------
    /// Largest envelope accepted from a peer (bytes)
    pub max_frame_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store_path: None,
            listen_addr: "127.0.0.1:9999".to_string(),
            max_connections: 1024,
            read_timeout_ms: 5000,
            write_timeout_ms: 5000,
            max_frame_size: MAX_FRAME_SIZE,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Reject settings the server cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.listen_addr.is_empty() {
            return Err(KeywardError::Config("listen address is empty".to_string()));
        }
        if self.max_connections == 0 {
            return Err(KeywardError::Config("max_connections must be at least 1".to_string()));
        }
        if self.max_frame_size == 0 {
            return Err(KeywardError::Config("max_frame_size must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Persist keyfiles to a snapshot file
    pub fn store_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.store_path = Some(path.into());
        self
    }

    /// Keep keyfiles in memory only
    pub fn in_memory(mut self) -> Self {
        self.config.store_path = None;
        self
    }

    /// Set the TCP listen address
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.listen_addr = addr.into();
        self
    }

    /// Set the maximum number of concurrent connections
    pub fn max_connections(mut self, count: usize) -> Self {
        self.config.max_connections = count;
        self
    }

    /// Set the read timeout (in milliseconds)
    pub fn read_timeout_ms(mut self, ms: u64) -> Self {
        self.config.read_timeout_ms = ms;
        self
    }

    /// Set the write timeout (in milliseconds)
    pub fn write_timeout_ms(mut self, ms: u64) -> Self {
        self.config.write_timeout_ms = ms;
        self
    }

    /// Set the largest accepted envelope (in bytes)
    pub fn max_frame_size(mut self, bytes: usize) -> Self {
        self.config.max_frame_size = bytes;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
