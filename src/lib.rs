//! # Keyward
//!
//! A keyfile service spoken over a small MessagePack RPC protocol:
//! - Closed vocabularies for operations, errors and notices
//! - Typed builders that refuse malformed messages
//! - Per-connection session lifecycle (Boot / Auth, ended by `Done`)
//! - Pluggable keyfile store (in memory or checksummed snapshot file)
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 TCP Server / Pipelined Client                │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ framed MessagePack envelopes
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                        Protocol                              │
//! │          (codec, classify, typed builders)                   │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                        Session                               │
//! │         Unstarted ─▶ Started(Boot | Auth) ─▶ Ended           │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!                       ▼
//!               ┌───────────────┐
//!               │ KeyFileStore  │
//!               │ (Memory/File) │
//!               └───────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod protocol;
pub mod session;
pub mod store;
pub mod service;
pub mod network;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{ErrorClass, KeywardError, Result};
pub use config::Config;
pub use session::{Session, SessionState};
pub use network::{Client, Server};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of Keyward
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
