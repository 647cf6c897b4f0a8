//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize, environment overrides)
//!     → validation.rs (semantic checks)
//!     → ProxyConfig (validated, immutable)
//!     → shared via Arc to all relays
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; every relay reads the same snapshot
//! - All fields have defaults so the proxy runs with no config file at all
//! - Validation separates syntactic (serde) from semantic checks
//! - `PORT` in the environment overrides the configured listener port, since
//!   hosting runtimes assign the port that way

pub mod loader;
pub mod schema;
pub mod validation;

pub use schema::ForwardConfig;
pub use schema::ListenerConfig;
pub use schema::ObservabilityConfig;
pub use schema::ProxyConfig;
