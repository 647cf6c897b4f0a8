//! HTTP forwarding subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (read head, classify upgrade vs plain, dispatch)
//!       ├─ plain   → relay.rs (outgoing.rs builds the descriptor,
//!       │            passes.rs shapes the response, hyper client forwards)
//!       └─ upgrade → upgrade.rs (raw handshake relay via head.rs,
//!                    then full-duplex socket splicing)
//! ```
//!
//! The destination of every request travels inside the request itself, in
//! the configured target header, as an absolute URL.

pub mod error;
pub mod head;
pub mod options;
pub mod outgoing;
pub mod passes;
pub mod relay;
pub mod server;
pub mod upgrade;

pub use error::RelayError;
pub use options::ForwardOptions;
pub use outgoing::{build_outgoing, OutgoingRequest, TargetSource};
pub use passes::{PassOutcome, ResponsePass, ResponsePassPipeline};
pub use server::{ProxyServer, RelayHook};
