//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept loop, connection limits)
//!     → connection.rs (lifecycle tracking, connection ids)
//!     → Hand off to HTTP layer (plain serve or raw upgrade relay)
//!
//! Relay sockets:
//!     socket.rs  — keep-alive / no-delay tuning for long-lived relays
//!     replay.rs  — pre-read ("head") byte replay in front of a socket
//! ```
//!
//! # Design Decisions
//! - Bounded accept queue prevents resource exhaustion
//! - Each connection tracked for graceful shutdown
//! - Pre-read bytes are replayed through a wrapper stream instead of being
//!   pushed back into kernel buffers

pub mod connection;
pub mod listener;
pub mod replay;
pub mod socket;

pub use connection::{ConnectionGuard, ConnectionId, ConnectionTracker};
pub use listener::Listener;
pub use replay::ReplayStream;
