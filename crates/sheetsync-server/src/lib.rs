//! Collaborative spreadsheet server.
//!
//! # Architecture
//!
//! - **protocol**: client/server wire message shapes.
//! - **hub**: session pools (the "registry lock") and broadcast fan-out.
//! - **session**: per-connection handshake and request dispatch.
//! - **server**: process-wide state, the TCP accept loop, and shutdown.

pub mod error;
pub mod hub;
pub mod protocol;
pub mod server;
pub mod session;

pub use error::{ServerError, ServerResult};
pub use hub::{Hub, Peer};
pub use protocol::{ClientMessage, ServerMessage};
pub use server::{Server, ServerConfig, serve};
pub use session::SessionState;
