//! TCP listener.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Notify, Semaphore};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::auth::RateLimiter;
use crate::commands::CommandRegistry;
use crate::config::Settings;
use crate::error::{AuthdError, ProtocolErrorKind};
use crate::protocol::{FrameCodec, Response};
use crate::services::AuthServices;

use super::handle_connection;

/// Connection metrics for monitoring.
#[derive(Debug, Default)]
pub struct ConnectionMetrics {
    /// Total requests processed.
    pub requests_total: AtomicU64,
    /// Requests answered with an error envelope.
    pub requests_failed: AtomicU64,
    /// Requests refused by the rate limiter.
    pub requests_rate_limited: AtomicU64,
    /// Verifications that ended in OK.
    pub verifications_ok: AtomicU64,
    /// Verifications that ended in DENIED.
    pub verifications_denied: AtomicU64,
    /// Currently active connections.
    pub active_connections: AtomicUsize,
}

impl ConnectionMetrics {
    /// Create new connection metrics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment request count.
    pub fn record_request(&self, success: bool) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.requests_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_rate_limited(&self) {
        self.requests_rate_limited.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a verification verdict.
    pub fn record_verdict(&self, ok: bool) {
        if ok {
            self.verifications_ok.fetch_add(1, Ordering::Relaxed);
        } else {
            self.verifications_denied.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Get total request count.
    pub fn total_requests(&self) -> u64 {
        self.requests_total.load(Ordering::Relaxed)
    }

    /// Get failed request count.
    pub fn failed_requests(&self) -> u64 {
        self.requests_failed.load(Ordering::Relaxed)
    }

    pub fn rate_limited(&self) -> u64 {
        self.requests_rate_limited.load(Ordering::Relaxed)
    }

    pub fn verifications_ok(&self) -> u64 {
        self.verifications_ok.load(Ordering::Relaxed)
    }

    pub fn verifications_denied(&self) -> u64 {
        self.verifications_denied.load(Ordering::Relaxed)
    }

    /// Get active connection count.
    pub fn active(&self) -> usize {
        self.active_connections.load(Ordering::Relaxed)
    }
}

/// Framed JSON server over TCP.
pub struct SocketListener {
    listener: TcpListener,
    settings: Arc<Settings>,
    command_registry: Arc<CommandRegistry>,
    metrics: Arc<ConnectionMetrics>,
    /// Semaphore for connection limiting
    connection_semaphore: Arc<Semaphore>,
    /// Per-peer rate limiter
    rate_limiter: Arc<RateLimiter>,
}

impl SocketListener {
    /// Bind the listen address and build the command registry.
    pub async fn bind(settings: Arc<Settings>, services: &AuthServices) -> Result<Self, AuthdError> {
        let addr = settings.server.listen_addr;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| AuthdError::Socket {
                message: format!("Failed to bind to {}: {}", addr, e),
            })?;

        let metrics = Arc::new(ConnectionMetrics::new());

        // Create connection semaphore for limiting concurrent connections
        let connection_semaphore =
            Arc::new(Semaphore::new(settings.limits.max_concurrent_connections));
        info!(
            max_connections = settings.limits.max_concurrent_connections,
            "Connection limiting enabled"
        );

        let rate_limiter = Arc::new(RateLimiter::from_limits(&settings.limits));
        rate_limiter.start_cleanup_task(Duration::from_secs(60));
        info!(
            max_requests = settings.limits.rate_limit_requests,
            max_challenges_per_tag = settings.limits.challenge_limit_requests,
            window_seconds = settings.limits.rate_limit_window_seconds,
            "Per-peer rate limiting enabled"
        );

        let command_registry = Arc::new(CommandRegistry::new(
            services,
            Arc::clone(&metrics),
            Arc::clone(&rate_limiter),
        ));

        info!(addr = %listener.local_addr()?, "Listener bound");

        Ok(Self {
            listener,
            settings,
            command_registry,
            metrics,
            connection_semaphore,
            rate_limiter,
        })
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, AuthdError> {
        Ok(self.listener.local_addr()?)
    }

    /// Get connection metrics.
    pub fn metrics(&self) -> Arc<ConnectionMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Run the listener, accepting connections.
    ///
    /// The listener will stop accepting new connections when `shutdown` is notified.
    /// Active connections will continue until they complete or are explicitly closed.
    pub async fn run(&self, shutdown: Arc<Notify>) -> Result<(), AuthdError> {
        info!("Listener running, waiting for connections...");

        loop {
            tokio::select! {
                result = self.listener.accept() => {
                    match result {
                        Ok((stream, peer)) => self.accept(stream, peer),
                        Err(e) => {
                            warn!(error = %e, "Failed to accept connection");
                        }
                    }
                }
                _ = shutdown.notified() => {
                    info!("Shutdown signal received, stopping listener");
                    break;
                }
            }
        }

        Ok(())
    }

    fn accept(&self, stream: TcpStream, peer: SocketAddr) {
        // Try to acquire a connection permit
        let permit = match Arc::clone(&self.connection_semaphore).try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                warn!(
                    peer = %peer,
                    max = self.settings.limits.max_concurrent_connections,
                    "Connection limit reached, rejecting connection"
                );
                tokio::spawn(reject_busy(stream, FrameCodec::from_limits(&self.settings.limits)));
                return;
            }
        };

        let settings = Arc::clone(&self.settings);
        let command_registry = Arc::clone(&self.command_registry);
        let metrics = Arc::clone(&self.metrics);
        let rate_limiter = Arc::clone(&self.rate_limiter);

        // Track active connection
        metrics.active_connections.fetch_add(1, Ordering::Relaxed);
        debug!(peer = %peer, active = metrics.active(), "New connection accepted");

        // Permit is moved into the task and dropped when the task completes
        tokio::spawn(async move {
            let _permit = permit;
            if let Err(e) = handle_connection(
                stream,
                peer,
                settings,
                command_registry,
                Arc::clone(&metrics),
                rate_limiter,
            )
            .await
            {
                if !matches!(
                    &e,
                    AuthdError::Protocol {
                        kind: ProtocolErrorKind::ConnectionClosed
                    }
                ) {
                    error!(peer = %peer, error = %e, "Connection handler error");
                }
            }

            metrics.active_connections.fetch_sub(1, Ordering::Relaxed);
            debug!(peer = %peer, active = metrics.active(), "Connection closed");
        });
    }

    /// Wait for all active connections to drain.
    ///
    /// Returns immediately if there are no active connections.
    pub async fn wait_for_drain(&self) {
        let poll_interval = Duration::from_millis(100);

        while self.metrics.active() > 0 {
            debug!(
                active = self.metrics.active(),
                "Waiting for connections to drain"
            );
            tokio::time::sleep(poll_interval).await;
        }

        info!("All connections drained");
    }
}

/// Tell a client over the connection limit to back off, then close.
async fn reject_busy(mut stream: TcpStream, codec: FrameCodec) {
    let response = Response::error_with_id(Uuid::new_v4(), "SERVER_BUSY", "connection limit reached");
    if let Err(e) = codec.send(&mut stream, &response).await {
        debug!(error = %e, "Could not deliver busy response");
    }
}
