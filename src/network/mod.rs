//! Network Module
//!
//! TCP server and client handling.
//!
//! ## Architecture
//! - Single acceptor thread, one thread per connection
//! - Each connection owns a [`SessionHandler`](crate::service::SessionHandler)
//! - Every connection answers out of the same shared keyfile store
//! - The client pipelines requests and matches responses by msgid

mod server;
mod connection;
mod client;

pub use server::Server;
pub use connection::Connection;
pub use client::{Client, PendingResponse};
