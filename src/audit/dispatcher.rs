//! Asynchronous audit dispatch.
//!
//! Appends never block the verification path. Entries are queued and a
//! background writer delivers them to every sink with a per-attempt timeout
//! and bounded retries.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, warn};

use crate::config::AuditConfig;

use super::entry::LogEntry;
use super::logger::AuditSink;

/// Pause between attempts; multiplied by the attempt number.
const RETRY_BACKOFF: Duration = Duration::from_millis(50);

enum AuditMessage {
    Append(LogEntry),
    Flush(oneshot::Sender<()>),
}

/// Fire-and-forget front end of the audit subsystem.
pub struct AuditLog {
    sender: Option<mpsc::Sender<AuditMessage>>,
    dropped: AtomicU64,
}

impl AuditLog {
    /// Start the background writer. Must be called inside a tokio runtime.
    pub fn spawn(sinks: Vec<Arc<dyn AuditSink>>, config: &AuditConfig) -> Self {
        if !config.enabled || sinks.is_empty() {
            return Self::disabled();
        }

        let (sender, receiver) = mpsc::channel(config.queue_capacity.max(1));
        let timeout = Duration::from_millis(config.write_timeout_ms);
        let attempts = config.max_retries.max(1);

        tokio::spawn(run_writer(receiver, sinks, timeout, attempts));

        Self {
            sender: Some(sender),
            dropped: AtomicU64::new(0),
        }
    }

    /// An audit log that discards everything.
    pub fn disabled() -> Self {
        Self {
            sender: None,
            dropped: AtomicU64::new(0),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.sender.is_some()
    }

    /// Queue an entry. Never blocks; a full queue drops the entry.
    pub fn append(&self, entry: LogEntry) {
        let Some(sender) = &self.sender else {
            return;
        };

        match sender.try_send(AuditMessage::Append(entry)) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(AuditMessage::Append(entry))) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(uid = %entry.uid, result = entry.result.as_str(), "Audit queue full, entry dropped");
            }
            Err(_) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!("Audit writer stopped, entry dropped");
            }
        }
    }

    /// Wait until every entry queued before this call has been handled.
    pub async fn flush(&self) {
        let Some(sender) = &self.sender else {
            return;
        };

        let (tx, rx) = oneshot::channel();
        if sender.send(AuditMessage::Flush(tx)).await.is_err() {
            return;
        }
        let _ = rx.await;
    }

    /// Entries lost to a full queue or a stopped writer.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

async fn run_writer(
    mut receiver: mpsc::Receiver<AuditMessage>,
    sinks: Vec<Arc<dyn AuditSink>>,
    timeout: Duration,
    attempts: u32,
) {
    while let Some(message) = receiver.recv().await {
        match message {
            AuditMessage::Append(entry) => {
                for sink in &sinks {
                    deliver(sink, &entry, timeout, attempts).await;
                }
            }
            AuditMessage::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
    debug!("Audit writer stopped");
}

async fn deliver(sink: &Arc<dyn AuditSink>, entry: &LogEntry, timeout: Duration, attempts: u32) {
    for attempt in 1..=attempts {
        let writer = Arc::clone(sink);
        let record = entry.clone();
        let outcome =
            tokio::time::timeout(timeout, tokio::task::spawn_blocking(move || writer.write(&record))).await;

        match outcome {
            Ok(Ok(Ok(()))) => return,
            Ok(Ok(Err(e))) => {
                warn!(sink = sink.name(), attempt, error = %e, "Audit write failed");
            }
            Ok(Err(e)) => {
                warn!(sink = sink.name(), attempt, error = %e, "Audit write task panicked");
            }
            Err(_) => {
                // The write may still land; retrying could duplicate the entry.
                error!(
                    sink = sink.name(),
                    uid = %entry.uid,
                    timeout_ms = timeout.as_millis() as u64,
                    "Audit write timed out"
                );
                return;
            }
        }

        if attempt < attempts {
            tokio::time::sleep(RETRY_BACKOFF * attempt).await;
        }
    }

    error!(
        sink = sink.name(),
        uid = %entry.uid,
        result = entry.result.as_str(),
        "Audit entry lost after retries"
    );
}
