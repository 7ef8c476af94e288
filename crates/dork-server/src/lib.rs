//! `DorkServer` — the Axum HTTP + SSE front door onto the Relay, Mesh,
//! Pulse, and Session subsystems.
//!
//! Request handlers are thin: validate the request, delegate to the
//! corresponding service on [`AppState`], and translate the typed error
//! hierarchy into the wire [`dork_core::errors::rpc::RpcErrorBody`] shape
//! via [`error::ApiError`]. No business logic lives in this crate.

pub mod error;
pub mod health;
pub mod routes;
pub mod shutdown;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use dork_db::ConnectionPool;
use dork_mesh::MeshService;
use dork_pulse::{PulseStore, Scheduler};
use dork_relay::RelayCore;
use dork_session::SessionManager;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::compression::CompressionLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tracing::{info, instrument};

use crate::health::{health_check, HealthResponse};
use crate::shutdown::ShutdownCoordinator;

/// Generates UUIDv7 request IDs.
#[derive(Clone)]
struct UuidV7RequestId;

impl MakeRequestId for UuidV7RequestId {
    fn make_request_id<B>(&mut self, _request: &axum::http::Request<B>) -> Option<RequestId> {
        let id = uuid::Uuid::now_v7().to_string();
        axum::http::HeaderValue::from_str(&id).ok().map(RequestId::new)
    }
}

/// Shared state accessible from every Axum handler.
#[derive(Clone)]
pub struct AppState {
    /// Session lifecycle manager and streaming dispatch.
    pub sessions: Arc<SessionManager>,
    /// Agent registry and discovery.
    pub mesh: Arc<MeshService>,
    /// Subject-addressed message bus.
    pub relay: Arc<RelayCore>,
    /// Cron schedule persistence.
    pub pulse_store: Arc<PulseStore>,
    /// Cron dispatch and run execution.
    pub scheduler: Arc<Scheduler>,
    /// Shared SQLite pool, used directly by the log-tail route.
    pub db_pool: ConnectionPool,
    /// Boundary root every path-accepting route validates against.
    pub boundary_root: PathBuf,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// When the server started.
    pub start_time: Instant,
    /// Prometheus metrics handle for `/metrics` rendering.
    pub metrics_handle: Arc<PrometheusHandle>,
}

/// Configuration accepted by [`DorkServer::new`].
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Bind address.
    pub host: String,
    /// Bind port. `0` lets the OS assign one (used in tests).
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: "127.0.0.1".into(), port: 0 }
    }
}

/// The dork daemon's HTTP server.
pub struct DorkServer {
    config: ServerConfig,
    state: AppState,
}

impl DorkServer {
    /// Build a server over an already-wired [`AppState`].
    #[must_use]
    pub fn new(config: ServerConfig, state: AppState) -> Self {
        Self { config, state }
    }

    /// Build the Axum router with every route and middleware layer.
    #[must_use]
    pub fn router(&self) -> Router {
        Router::new()
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .merge(routes::sessions::router())
            .merge(routes::mesh::router())
            .merge(routes::git::router())
            .merge(routes::pulse::router())
            .merge(routes::relay::router())
            .merge(routes::logs::router())
            .with_state(self.state.clone())
            // Outermost layers execute first on request, last on response.
            .layer(CatchPanicLayer::new())
            .layer(CompressionLayer::new())
            .layer(RequestBodyLimitLayer::new(8 * 1024 * 1024))
            .layer(TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, Duration::from_secs(60)))
            .layer(SetRequestIdLayer::x_request_id(UuidV7RequestId))
            .layer(PropagateRequestIdLayer::x_request_id())
    }

    /// Bind to a TCP port and start serving. Returns the bound address and
    /// a join handle for the server task, driven until the shutdown
    /// coordinator's token cancels.
    #[instrument(skip_all, fields(host = %self.config.host, port = self.config.port))]
    pub async fn listen(&self) -> Result<(SocketAddr, tokio::task::JoinHandle<()>), std::io::Error> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr).await?;
        let bound_addr = listener.local_addr()?;

        info!(addr = %bound_addr, "server started");

        let router = self.router();
        let shutdown_token = self.state.shutdown.token();

        let handle = tokio::spawn(async move {
            let _ = axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    shutdown_token.cancelled().await;
                    info!("server shutdown initiated");
                })
                .await;
            info!("server shutdown complete");
        });

        Ok((bound_addr, handle))
    }

    /// The server configuration.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// The shared app state.
    #[must_use]
    pub fn state(&self) -> &AppState {
        &self.state
    }
}

async fn health_handler(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> axum::Json<HealthResponse> {
    let active_sessions = state.sessions.list_sessions().len();
    let active_runs = state.scheduler.get_active_run_count();
    axum::Json(health_check(state.start_time, active_sessions, active_runs))
}

async fn metrics_handler(axum::extract::State(state): axum::extract::State<AppState>) -> String {
    state.metrics_handle.render()
}

/// Shared test fixtures reused by the top-level router tests and every
/// `routes::*` test module.
#[cfg(test)]
pub(crate) mod tests_support {
    use super::{AppState, Instant, MeshService, PulseStore, RelayCore, Scheduler, SessionManager, ShutdownCoordinator};
    use dork_db::ConnectionConfig;
    use std::sync::Arc;

    pub(crate) struct EchoBackend;

    #[async_trait::async_trait]
    impl dork_session::AgentBackend for EchoBackend {
        async fn dispatch(
            &self,
            request: dork_session::DispatchRequest,
            _cancellation: tokio_util::sync::CancellationToken,
        ) -> Result<dork_session::BackendStream, dork_core::SessionError> {
            let text = request.message;
            let stream = async_stream::stream! {
                yield dork_session::BackendEvent::TextDelta(format!("echo: {text}"));
                yield dork_session::BackendEvent::Done;
            };
            Ok(Box::pin(stream))
        }
    }

    pub(crate) fn test_state() -> (tempfile::TempDir, AppState) {
        let dir = tempfile::tempdir().unwrap();
        let pool = dork_db::new_in_memory(&ConnectionConfig::default()).unwrap();

        let mesh = Arc::new(MeshService::new(pool.clone()).unwrap());
        let relay = Arc::new(RelayCore::new(dir.path().join("mailboxes").to_str().unwrap(), pool.clone()).unwrap());
        let pulse_store = Arc::new(PulseStore::new(pool.clone()).unwrap());

        let sessions = Arc::new(SessionManager::new(Arc::new(EchoBackend), dir.path()));
        let scheduler = Arc::new(Scheduler::new(pulse_store.clone(), sessions.clone()));

        let metrics_handle = Arc::new(
            metrics_exporter_prometheus::PrometheusBuilder::new()
                .build_recorder()
                .handle(),
        );

        let state = AppState {
            sessions,
            mesh,
            relay,
            pulse_store,
            scheduler,
            db_pool: pool,
            boundary_root: dir.path().to_path_buf(),
            shutdown: Arc::new(ShutdownCoordinator::new()),
            start_time: Instant::now(),
            metrics_handle,
        };
        (dir, state)
    }
}

#[cfg(test)]
mod tests {
    use super::tests_support::test_state;
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn test_server() -> (tempfile::TempDir, DorkServer) {
        let (dir, state) = test_state();
        (dir, DorkServer::new(ServerConfig::default(), state))
    }

    #[tokio::test]
    async fn health_endpoint_returns_ok() {
        let (_dir, server) = test_server();
        let app = server.router();
        let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unknown_route_returns_404() {
        let (_dir, server) = test_server();
        let app = server.router();
        let req = Request::builder().uri("/nope").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn server_listen_binds_and_shuts_down() {
        let (_dir, server) = test_server();
        let (addr, handle) = server.listen().await.unwrap();
        assert!(addr.port() > 0);
        server.state().shutdown.shutdown();
        let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
    }
}
