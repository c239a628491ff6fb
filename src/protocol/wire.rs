//! Frame codec: `[u32 big-endian length][JSON payload]`.

use std::future::Future;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::config::LimitsConfig;
use crate::error::{AuthdError, ProtocolErrorKind};

/// Default frame size cap. Nonce and verify payloads are a few hundred bytes.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 16_384;

const PREFIX_LEN: usize = 4;

/// Reads and writes length-prefixed JSON frames, optionally under an I/O
/// deadline per frame.
#[derive(Debug, Clone, Copy)]
pub struct FrameCodec {
    max_size: usize,
    deadline: Option<Duration>,
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_MESSAGE_SIZE)
    }
}

impl FrameCodec {
    pub fn new(max_size: usize) -> Self {
        Self {
            max_size,
            deadline: None,
        }
    }

    /// Codec for the daemon side of a connection.
    pub fn from_limits(limits: &LimitsConfig) -> Self {
        Self::new(limits.max_message_size)
            .with_deadline(Duration::from_secs(limits.socket_timeout_seconds))
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Read one frame payload.
    ///
    /// A clean EOF before the prefix is `ConnectionClosed`. A declared length
    /// above the cap is `MessageTooLarge` and the payload is left unread, so
    /// the stream cannot be resynchronised afterwards.
    pub async fn read_frame<R>(&self, reader: &mut R) -> Result<Vec<u8>, AuthdError>
    where
        R: AsyncRead + Unpin,
    {
        self.bounded(async {
            let mut prefix = [0u8; PREFIX_LEN];
            if let Err(e) = reader.read_exact(&mut prefix).await {
                return Err(match e.kind() {
                    std::io::ErrorKind::UnexpectedEof => AuthdError::Protocol {
                        kind: ProtocolErrorKind::ConnectionClosed,
                    },
                    _ => AuthdError::Io(e),
                });
            }

            let size = u32::from_be_bytes(prefix) as usize;
            self.check_size(size)?;

            let mut payload = vec![0u8; size];
            reader.read_exact(&mut payload).await?;
            Ok(payload)
        })
        .await
    }

    /// Write one frame. The inbound cap does not apply: an `audit.logs` page
    /// may be larger than any request.
    pub async fn write_frame<W>(&self, writer: &mut W, payload: &[u8]) -> Result<(), AuthdError>
    where
        W: AsyncWrite + Unpin,
    {
        let prefix = u32::try_from(payload.len())
            .map_err(|_| too_large(payload.len(), u32::MAX as usize))?
            .to_be_bytes();

        self.bounded(async {
            writer.write_all(&prefix).await?;
            writer.write_all(payload).await?;
            writer.flush().await?;
            Ok(())
        })
        .await
    }

    /// Serialize `value` and write it as one frame.
    pub async fn send<W, T>(&self, writer: &mut W, value: &T) -> Result<(), AuthdError>
    where
        W: AsyncWrite + Unpin,
        T: Serialize,
    {
        let payload = serde_json::to_vec(value)?;
        self.write_frame(writer, &payload).await
    }

    /// Read one frame and decode it as `T`.
    pub async fn recv<R, T>(&self, reader: &mut R) -> Result<T, AuthdError>
    where
        R: AsyncRead + Unpin,
        T: DeserializeOwned,
    {
        let payload = self.read_frame(reader).await?;
        serde_json::from_slice(&payload).map_err(|e| AuthdError::Protocol {
            kind: ProtocolErrorKind::InvalidMessageFormat {
                message: e.to_string(),
            },
        })
    }

    fn check_size(&self, size: usize) -> Result<(), AuthdError> {
        if size > self.max_size {
            return Err(too_large(size, self.max_size));
        }
        Ok(())
    }

    async fn bounded<T, F>(&self, io: F) -> Result<T, AuthdError>
    where
        F: Future<Output = Result<T, AuthdError>>,
    {
        match self.deadline {
            Some(deadline) => tokio::time::timeout(deadline, io)
                .await
                .map_err(|_| AuthdError::Protocol {
                    kind: ProtocolErrorKind::ConnectionTimeout,
                })?,
            None => io.await,
        }
    }
}

fn too_large(size: usize, max: usize) -> AuthdError {
    AuthdError::Protocol {
        kind: ProtocolErrorKind::MessageTooLarge { size, max },
    }
}
