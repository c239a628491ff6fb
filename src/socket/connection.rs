//! Per-connection handler.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::auth::RateLimiter;
use crate::commands::{CommandParams, CommandRegistry, ExecutionContext};
use crate::config::Settings;
use crate::error::{AuthdError, ProtocolErrorKind};
use crate::protocol::{FrameCodec, Request, Response};

use super::ConnectionMetrics;

/// Fallback bound for commands the registry does not know.
const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

/// Bound on discarding the body of an oversized frame before closing.
const DISCARD_DEADLINE: Duration = Duration::from_secs(2);

/// Handle a single client connection.
///
/// Serves framed requests until the peer disconnects, goes idle past the
/// socket timeout, or sends a frame over the size cap.
pub async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    settings: Arc<Settings>,
    command_registry: Arc<CommandRegistry>,
    metrics: Arc<ConnectionMetrics>,
    rate_limiter: Arc<RateLimiter>,
) -> Result<(), AuthdError> {
    if let Err(e) = stream.set_nodelay(true) {
        debug!(peer = %peer, error = %e, "Failed to set TCP_NODELAY");
    }

    let codec = FrameCodec::from_limits(&settings.limits);
    let (mut reader, mut writer) = stream.into_split();

    loop {
        let result = process_request(
            &mut reader,
            &mut writer,
            peer,
            codec,
            &command_registry,
            &metrics,
            &rate_limiter,
        )
        .await;

        match result {
            Ok(()) => continue,
            Err(AuthdError::Protocol {
                kind: ProtocolErrorKind::ConnectionClosed,
            }) => {
                debug!(peer = %peer, "Client disconnected");
                return Ok(());
            }
            Err(AuthdError::Protocol {
                kind: ProtocolErrorKind::ConnectionTimeout,
            }) => {
                debug!(peer = %peer, "Connection idle, closing");
                return Ok(());
            }
            Err(AuthdError::Protocol {
                kind: ProtocolErrorKind::MessageTooLarge { size, .. },
            }) => {
                debug!(peer = %peer, size, "Oversized frame answered, closing");
                // Unread input on close turns the FIN into a RST, which can
                // destroy the reply still in flight.
                if let Err(e) = writer.shutdown().await {
                    debug!(peer = %peer, error = %e, "Shutdown after oversized frame failed");
                }
                let mut rest = (&mut reader).take(size as u64);
                let mut sink = tokio::io::sink();
                let discard = tokio::io::copy(&mut rest, &mut sink);
                if tokio::time::timeout(DISCARD_DEADLINE, discard).await.is_err() {
                    debug!(peer = %peer, "Gave up discarding oversized frame");
                }
                return Ok(());
            }
            Err(e) => return Err(e),
        }
    }
}

/// Process a single request from the client.
///
/// An oversized frame is answered with a `PROTOCOL_ERROR` envelope and then
/// reported as an error, since its payload is still unread on the stream.
async fn process_request<R, W>(
    reader: &mut R,
    writer: &mut W,
    peer: SocketAddr,
    codec: FrameCodec,
    command_registry: &Arc<CommandRegistry>,
    metrics: &ConnectionMetrics,
    rate_limiter: &RateLimiter,
) -> Result<(), AuthdError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let request_id = Uuid::new_v4();

    let msg = match codec.read_frame(reader).await {
        Ok(msg) => msg,
        Err(
            e @ AuthdError::Protocol {
                kind: ProtocolErrorKind::MessageTooLarge { .. },
            },
        ) => {
            warn!(request_id = %request_id, peer = %peer, error = %e, "Rejected frame");
            metrics.record_request(false);
            codec
                .send(writer, &Response::from_error(request_id, &e))
                .await?;
            return Err(e);
        }
        Err(e) => return Err(e),
    };

    let response = respond(
        request_id,
        &msg,
        peer,
        command_registry,
        metrics,
        rate_limiter,
    )
    .await;

    metrics.record_request(response.success);
    codec.send(writer, &response).await
}

/// Turn one frame into one response envelope.
async fn respond(
    request_id: Uuid,
    msg: &[u8],
    peer: SocketAddr,
    command_registry: &Arc<CommandRegistry>,
    metrics: &ConnectionMetrics,
    rate_limiter: &RateLimiter,
) -> Response {
    let request: Request = match serde_json::from_slice(msg) {
        Ok(request) => request,
        Err(e) => {
            let err = AuthdError::Protocol {
                kind: ProtocolErrorKind::InvalidMessageFormat {
                    message: format!("Invalid JSON: {}", e),
                },
            };
            warn!(request_id = %request_id, peer = %peer, error = %err, "Rejected request");
            return Response::from_error(request_id, &err);
        }
    };

    debug!(
        request_id = %request_id,
        command = %request.command,
        peer = %peer,
        "Received request"
    );

    if let Err(e) = rate_limiter.admit_request(peer.ip()) {
        metrics.record_rate_limited();
        warn!(request_id = %request_id, peer = %peer, "Rate limit exceeded");
        return Response::from_error(request_id, &e);
    }

    let start_time = Instant::now();
    let timeout = command_registry
        .get(&request.command)
        .map(|cmd| cmd.timeout())
        .unwrap_or(DEFAULT_COMMAND_TIMEOUT);

    let ctx = ExecutionContext::new(request_id, peer, request.command.clone());
    let params = CommandParams::new(request.params);

    // Commands do blocking store I/O
    let registry = Arc::clone(command_registry);
    let command_name = request.command.clone();
    let task = tokio::task::spawn_blocking(move || registry.dispatch(&ctx, &command_name, params));

    match tokio::time::timeout(timeout, task).await {
        Ok(Ok(Ok(result))) => {
            info!(
                request_id = %request_id,
                command = %request.command,
                duration_ms = start_time.elapsed().as_millis() as u64,
                "Command executed"
            );
            Response::success_with_id(request_id, result.data)
        }
        Ok(Ok(Err(e))) => {
            if e.is_client_error() {
                warn!(
                    request_id = %request_id,
                    command = %request.command,
                    code = e.error_code(),
                    error = %e,
                    "Command rejected"
                );
            } else {
                error!(
                    request_id = %request_id,
                    command = %request.command,
                    error = %e,
                    "Command execution failed"
                );
            }
            Response::from_error(request_id, &e)
        }
        Ok(Err(e)) => {
            error!(
                request_id = %request_id,
                command = %request.command,
                error = %e,
                "Command task panicked"
            );
            Response::error_with_id(request_id, "INTERNAL_ERROR", "Command execution failed")
        }
        Err(_) => {
            error!(
                request_id = %request_id,
                command = %request.command,
                timeout_ms = timeout.as_millis() as u64,
                "Command timed out"
            );
            Response::error_with_id(request_id, "INTERNAL_ERROR", "Command timed out")
        }
    }
}
