//! Relay socket tuning.
//!
//! # Responsibilities
//! - Disable send-coalescing delay (favor latency for small writes)
//! - Enable keep-alive probing with OS-default timing
//! - Keep relay sockets free of idle deadlines
//!
//! # Design Decisions
//! - Applied to both raw sockets of an upgrade relay; plain-path sockets
//!   keep the transport's defaults
//! - Idempotent; safe to call repeatedly on the same socket

use std::io;

use socket2::SockRef;
use tokio::net::TcpStream;

/// Apply the standard relay settings to a socket.
///
/// No read or write deadline is installed here or anywhere else on relay
/// sockets: upgraded connections must be allowed to idle indefinitely.
pub fn tune(stream: &TcpStream) -> io::Result<()> {
    stream.set_nodelay(true)?;
    SockRef::from(stream).set_keepalive(true)?;
    Ok(())
}
