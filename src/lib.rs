//! Header-Driven HTTP/WebSocket Forwarding Proxy Library

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;

pub use config::schema::ProxyConfig;
pub use http::ProxyServer;
pub use lifecycle::Shutdown;
pub use net::Listener;
