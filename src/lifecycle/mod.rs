//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGINT/Ctrl+C → Shutdown::trigger()
//!
//! Shutdown (shutdown.rs):
//!     trigger → server stops accepting → drain connections → exit
//! ```
//!
//! # Design Decisions
//! - Ordered shutdown: stop accept, drain, close
//! - Drain has a grace period; long-lived splices may be abandoned at exit

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
