//! HTTP server.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::Request;
use hyper_util::rt::TokioIo;
use rollbook_core::{AttendanceSource, CourseConfigStore, LmsConnector};
use rollbook_tasks::LockService;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use crate::app::App;
use crate::error::{ServerError, ServerResult};
use crate::shutdown::{ConnectionTracker, ShutdownSignal};

/// Listener settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// Address to listen on.
    pub addr: SocketAddr,
    /// Time in-flight connections and jobs get to finish on shutdown.
    pub shutdown_timeout: Duration,
    /// Deadline for handling one request.
    pub request_timeout: Duration,
    /// Connections served at once; further accepts wait.
    pub max_connections: usize,
    /// Interval between idle session sweeps.
    pub session_purge_interval: Duration,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], 3001)),
            shutdown_timeout: Duration::from_secs(30),
            request_timeout: Duration::from_secs(30),
            max_connections: 1024,
            session_purge_interval: Duration::from_secs(60),
        }
    }
}

/// The Rollbook HTTP server.
#[derive(Debug)]
pub struct Server<C, A, S, L> {
    app: App<C, A, S, L>,
    settings: ServerSettings,
}

impl<C, A, S, L> Server<C, A, S, L>
where
    C: LmsConnector,
    A: AttendanceSource + 'static,
    S: CourseConfigStore + 'static,
    L: LockService + 'static,
{
    /// Create a server for `app`.
    pub const fn new(app: App<C, A, S, L>, settings: ServerSettings) -> Self {
        Self { app, settings }
    }

    /// The request handler.
    pub const fn app(&self) -> &App<C, A, S, L> {
        &self.app
    }

    /// Run until SIGTERM or SIGINT.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener cannot be bound.
    pub async fn run(self) -> ServerResult<()> {
        self.run_with_shutdown(ShutdownSignal::with_os_signals())
            .await
    }

    /// Run until `shutdown` triggers.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener cannot be bound.
    pub async fn run_with_shutdown(self, shutdown: ShutdownSignal) -> ServerResult<()> {
        let listener = TcpListener::bind(self.settings.addr)
            .await
            .map_err(|e| ServerError::server(format!("failed to bind {}: {e}", self.settings.addr)))?;
        self.serve(listener, shutdown).await
    }

    /// Serve connections from a bound listener until `shutdown` triggers.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener's address cannot be read.
    pub async fn serve(self, listener: TcpListener, shutdown: ShutdownSignal) -> ServerResult<()> {
        let local_addr = listener.local_addr()?;
        info!(addr = %local_addr, "Rollbook listening");

        let server = Arc::new(self);
        let tracker = ConnectionTracker::new();
        let permits = Arc::new(Semaphore::new(server.settings.max_connections.max(1)));
        let purger = tokio::spawn(purge_sessions(Arc::clone(&server), shutdown.clone()));

        server.app.health().set_ready(true);

        loop {
            let permit = tokio::select! {
                permit = Arc::clone(&permits).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
                () = shutdown.recv() => break,
            };

            tokio::select! {
                result = listener.accept() => match result {
                    Ok((stream, peer)) => {
                        let server = Arc::clone(&server);
                        let token = tracker.acquire();
                        let shutdown = shutdown.clone();
                        tokio::spawn(async move {
                            server.serve_connection(stream, peer, shutdown).await;
                            drop(permit);
                            drop(token);
                        });
                    }
                    Err(e) => error!(error = %e, "Failed to accept connection"),
                },
                () = shutdown.recv() => break,
            }
        }

        info!("Shutdown signal received, draining");
        server.app.health().set_ready(false);

        let timeout = server.settings.shutdown_timeout;
        tokio::select! {
            () = tracker.wait_for_shutdown() => debug!("All connections closed"),
            () = tokio::time::sleep(timeout) => warn!(
                active = tracker.active_connections(),
                "Shutdown timeout reached with connections still open"
            ),
        }

        server.app.queue().spawner().shutdown(timeout).await;
        purger.abort();
        info!("Rollbook stopped");
        Ok(())
    }

    async fn serve_connection(
        self: &Arc<Self>,
        stream: TcpStream,
        peer: SocketAddr,
        shutdown: ShutdownSignal,
    ) {
        let io = TokioIo::new(stream);
        let server = Arc::clone(self);

        let service = service_fn(move |req: Request<Incoming>| {
            let server = Arc::clone(&server);
            async move { Ok::<_, Infallible>(server.handle_with_timeout(req).await) }
        });

        let conn = http1::Builder::new().serve_connection(io, service);
        tokio::pin!(conn);

        tokio::select! {
            result = conn.as_mut() => {
                if let Err(e) = result {
                    debug!(peer = %peer, error = %e, "Connection error");
                }
            }
            () = shutdown.recv() => {
                conn.as_mut().graceful_shutdown();
                if let Err(e) = conn.await {
                    debug!(peer = %peer, error = %e, "Connection error during shutdown");
                }
            }
        }
    }

    async fn handle_with_timeout(
        &self,
        req: Request<Incoming>,
    ) -> http::Response<http_body_util::Full<bytes::Bytes>> {
        match tokio::time::timeout(self.settings.request_timeout, self.app.handle(req)).await {
            Ok(response) => response,
            Err(_) => {
                warn!(timeout_ms = %self.settings.request_timeout.as_millis(), "Request timed out");
                crate::app::json_response(
                    http::StatusCode::GATEWAY_TIMEOUT,
                    &crate::error::ErrorResponse::new("timeout", "request timed out"),
                )
            }
        }
    }
}

async fn purge_sessions<C, A, S, L>(server: Arc<Server<C, A, S, L>>, shutdown: ShutdownSignal)
where
    C: LmsConnector,
    A: AttendanceSource + 'static,
    S: CourseConfigStore + 'static,
    L: LockService + 'static,
{
    let mut interval = tokio::time::interval(server.settings.session_purge_interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = interval.tick() => {
                let purged = server.app.sessions().purge_expired();
                if purged > 0 {
                    debug!(purged, remaining = server.app.sessions().len(), "Purged idle sessions");
                }
            }
            () = shutdown.recv() => return,
        }
    }
}
