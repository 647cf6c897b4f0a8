//! Proxy server façade.
//!
//! # Responsibilities
//! - Accept connections and read each first request head
//! - Dispatch to the upgrade relay or the plain hyper-served path
//! - Map relay errors to client-facing status codes
//! - Expose extension points: relay hooks and additional response passes
//!
//! # Design Decisions
//! - Upgrade vs. plain is decided on the first request of a connection, the
//!   point where the transport hands over the raw socket; later requests on
//!   a kept-alive connection are served by the plain path
//! - The consumed head bytes are replayed into hyper, which re-parses and
//!   answers malformed requests itself
//! - Header casing is preserved end to end: the outbound client records the
//!   upstream's casing and the inbound server honors it on re-emission

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::{request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::Router;
use bytes::BytesMut;
use hyper::server::conn::http1;
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::service::TowerToHyperService;
use std::net::SocketAddr;
use tokio::net::TcpStream;
use tower_http::trace::TraceLayer;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::loader::ConfigError;
use crate::config::validation::validate_config;
use crate::config::ProxyConfig;
use crate::http::error::RelayError;
use crate::http::head::{parse_request_head, read_head};
use crate::http::options::ForwardOptions;
use crate::http::outgoing::OutgoingRequest;
use crate::http::passes::{ResponsePass, ResponsePassPipeline};
use crate::http::{relay, upgrade};
use crate::lifecycle::Shutdown;
use crate::net::connection::{ConnectionGuard, ConnectionTracker};
use crate::net::listener::Listener;
use crate::net::replay::ReplayStream;
use crate::observability::metrics;

/// Request ID header consulted before generating one.
pub const X_REQUEST_ID: &str = "x-request-id";

/// How long shutdown waits for in-flight relays before giving up.
const DRAIN_GRACE: Duration = Duration::from_secs(5);

/// Observer of outgoing requests.
///
/// Fired once per plain relay, after the outgoing descriptor is known and
/// before the request body is flushed upstream.
pub trait RelayHook: Send + Sync {
    fn on_proxy_request(&self, outgoing: &OutgoingRequest, request: &request::Parts);
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub options: Arc<ForwardOptions>,
    pub client: Client<HttpConnector, Body>,
    pub hooks: Arc<Vec<Arc<dyn RelayHook>>>,
    pub passes: Arc<ResponsePassPipeline>,
}

/// The listener-facing proxy server.
pub struct ProxyServer {
    config: ProxyConfig,
    options: ForwardOptions,
    hooks: Vec<Arc<dyn RelayHook>>,
    passes: ResponsePassPipeline,
    shutdown: Shutdown,
    tracker: ConnectionTracker,
}

impl ProxyServer {
    /// Create a new proxy server from validated configuration.
    pub fn new(config: ProxyConfig) -> Result<Self, ConfigError> {
        validate_config(&config).map_err(ConfigError::Validation)?;
        let options = ForwardOptions::from_config(&config.forward)?;

        Ok(Self {
            config,
            options,
            hooks: Vec::new(),
            passes: ResponsePassPipeline::standard(),
            shutdown: Shutdown::new(),
            tracker: ConnectionTracker::new(),
        })
    }

    /// Register an observer for outgoing requests.
    pub fn with_hook(mut self, hook: Arc<dyn RelayHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    /// Append a response pass after the built-in pipeline.
    pub fn with_response_pass(mut self, pass: Box<dyn ResponsePass>) -> Self {
        self.passes.push(pass);
        self
    }

    /// Handle for triggering shutdown from elsewhere (signal task, tests).
    pub fn shutdown_handle(&self) -> Shutdown {
        self.shutdown.clone()
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(self, listener: Listener) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            target_header = %self.options.target_header,
            "Proxy server starting"
        );

        // A fresh connection per outgoing request: the descriptor forbids
        // reuse, so the pool keeps nothing idle.
        let client = Client::builder(TokioExecutor::new())
            .pool_max_idle_per_host(0)
            .http1_preserve_header_case(true)
            .build(HttpConnector::new());

        let state = AppState {
            options: Arc::new(self.options),
            client,
            hooks: Arc::new(self.hooks),
            passes: Arc::new(self.passes),
        };
        let router = build_router(state.clone());

        let mut shutdown_rx = self.shutdown.subscribe();
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    tracing::info!("Shutdown requested, draining connections");
                    break;
                }
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, peer, permit)) => {
                            let guard = self.tracker.track();
                            let router = router.clone();
                            let state = state.clone();
                            tokio::spawn(async move {
                                handle_connection(stream, peer, router, state, guard).await;
                                drop(permit);
                            });
                        }
                        Err(error) => {
                            tracing::warn!(error = %error, "Failed to accept connection");
                        }
                    }
                }
            }
        }

        if !self.tracker.wait_for_drain(DRAIN_GRACE).await {
            tracing::warn!(
                active = self.tracker.active_count(),
                "Drain grace elapsed with connections still active"
            );
        }
        tracing::info!("Proxy server stopped");
        Ok(())
    }
}

/// Build the Axum router serving the plain path.
fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/{*path}", any(proxy_handler))
        .route("/", any(proxy_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Read the first request head, classify, and dispatch the connection.
async fn handle_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    router: Router,
    state: AppState,
    guard: ConnectionGuard,
) {
    let span = tracing::debug_span!("connection", id = %guard.id(), peer = %peer);
    async move {
        let mut buf = BytesMut::with_capacity(8 * 1024);
        let head_end = match read_head(&mut stream, &mut buf).await {
            Ok(Some(end)) => end,
            Ok(None) => return,
            Err(error) => {
                tracing::debug!(error = %error, "failed to read request head");
                return;
            }
        };

        match parse_request_head(&buf[..head_end]) {
            Ok(head) if head.headers.contains_key(axum::http::header::UPGRADE) => {
                let pre_read = buf.split_off(head_end).freeze();
                upgrade::relay_upgrade(stream, peer, head, pre_read, &state.options).await;
            }
            // Plain requests, and heads hyper should reject itself: replay
            // everything consumed and let the HTTP server take over.
            _ => {
                let io = TokioIo::new(ReplayStream::new(buf.freeze(), stream));
                let service = TowerToHyperService::new(router);
                if let Err(error) = http1::Builder::new()
                    .preserve_header_case(true)
                    .half_close(true)
                    .serve_connection(io, service)
                    .await
                {
                    tracing::debug!(error = %error, "connection closed with error");
                }
            }
        }
    }
    .instrument(span)
    .await
}

/// Main proxy handler for the plain path.
/// Answers reserved paths, then delegates to the relay and maps its errors.
async fn proxy_handler(State(state): State<AppState>, request: Request) -> Response {
    let start = Instant::now();
    let request_id = request
        .headers()
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let method = request.method().to_string();
    let path = request.uri().path().to_string();

    tracing::debug!(
        request_id = %request_id,
        method = %method,
        path = %path,
        "Proxying request"
    );

    if state.options.reserved_paths.iter().any(|p| p == &path) {
        metrics::record_request(&method, 404, start);
        return (
            StatusCode::NOT_FOUND,
            [(CONTENT_TYPE, "text/plain")],
            "",
        )
            .into_response();
    }

    match relay::relay_http(&state, request).await {
        Ok(response) => {
            metrics::record_request(&method, response.status().as_u16(), start);
            response
        }
        Err(error) => {
            let (status, message) = match &error {
                RelayError::InvalidTarget | RelayError::BadOutgoingRequest(_) => {
                    (StatusCode::BAD_REQUEST, "Invalid forwarding target")
                }
                RelayError::UpstreamTimeout => {
                    (StatusCode::GATEWAY_TIMEOUT, "Upstream request timed out")
                }
                RelayError::Upstream(_) => (StatusCode::BAD_GATEWAY, "Upstream request failed"),
            };
            tracing::error!(request_id = %request_id, error = %error, "Relay failed");
            metrics::record_request(&method, status.as_u16(), start);
            (status, message).into_response()
        }
    }
}
