//! Construction of the daemon's shared components.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::alias::AliasRotator;
use crate::audit::{AuditLog, AuditSink, JsonLinesAuditSink, SqliteAuditSink};
use crate::auth::Verifier;
use crate::config::Settings;
use crate::error::AuthdError;
use crate::registry::SqliteTagRegistry;
use crate::session::{MemorySessionStore, NonceSessionStore, SessionStore, SqliteSessionStore};
use crate::storage::StorePool;

/// Shared components, built once at startup.
pub struct AuthServices {
    pub pool: StorePool,
    pub tags: Arc<SqliteTagRegistry>,
    pub sessions: Arc<NonceSessionStore>,
    pub verifier: Arc<Verifier>,
    pub access_log: Arc<SqliteAuditSink>,
    pub audit: Arc<AuditLog>,
}

impl AuthServices {
    /// Open the store and assemble every component.
    ///
    /// Must be called inside a tokio runtime; the audit writer is spawned here.
    pub fn open(settings: &Settings) -> Result<Self, AuthdError> {
        let pool = StorePool::open(&settings.storage)?;

        let backend: Arc<dyn SessionStore> = match settings.session.backend.to_lowercase().as_str() {
            "sqlite" => Arc::new(SqliteSessionStore::new(pool.clone())),
            _ => Arc::new(MemorySessionStore::new()),
        };
        let sessions = Arc::new(NonceSessionStore::new(backend, settings.session.ttl()));
        info!(
            backend = sessions.backend_name(),
            ttl_seconds = settings.session.ttl_seconds,
            "Session store ready"
        );

        let tags = Arc::new(SqliteTagRegistry::new(pool.clone()));
        let rotator = Arc::new(AliasRotator::new(tags.clone(), &settings.alias));

        let access_log = Arc::new(SqliteAuditSink::new(pool.clone()));
        let mut sinks: Vec<Arc<dyn AuditSink>> = vec![access_log.clone()];
        if let Some(path) = &settings.audit.log_path {
            sinks.push(Arc::new(JsonLinesAuditSink::new(path)?));
            info!(path = %path.display(), "Audit mirror file enabled");
        }
        let audit = Arc::new(AuditLog::spawn(sinks, &settings.audit));
        if audit.is_enabled() {
            info!(queue_capacity = settings.audit.queue_capacity, "Audit logging enabled");
        } else {
            info!("Audit logging disabled");
        }

        let verifier = Arc::new(Verifier::new(
            sessions.clone(),
            tags.clone(),
            rotator,
            audit.clone(),
        ));

        Ok(Self {
            pool,
            tags,
            sessions,
            verifier,
            access_log,
            audit,
        })
    }

    /// Start periodic reclamation of expired sessions, if configured.
    pub fn start_background_tasks(&self, settings: &Settings) {
        let interval = settings.session.cleanup_interval_seconds;
        if interval > 0 {
            self.sessions
                .start_cleanup_task(Duration::from_secs(interval));
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use tempfile::TempDir;

    /// Services over a fresh database with tag `C59B3706` (secret `MiEjemplo`).
    pub(crate) fn open_services() -> (TempDir, AuthServices) {
        let dir = TempDir::new().unwrap();
        let settings = Settings::local(dir.path().join("authd.db"));
        let services = AuthServices::open(&settings).unwrap();
        services.tags.seed_tag("C59B3706", b"MiEjemplo", true).unwrap();
        (dir, services)
    }
}
