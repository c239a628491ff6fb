//! Challenge-response verification.
//!
//! A verification walks `Received → Parsed → SessionResolved → Authorized →
//! HmacChecked` and ends in `OK` or `DENIED`. Denials are ordinary results;
//! only malformed input and storage faults are errors.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::alias::AliasRotator;
use crate::audit::{AuditLog, LogEntry};
use crate::error::{AuthdError, AuthdResult, ValidationErrorKind};
use crate::registry::TagRegistry;
use crate::session::{Consumed, NonceSessionStore};
use crate::validation::{parse_hmac, Identifier, HMAC_LEN};

use super::hmac::TagMac;

/// Reason recorded when a verified tag could not be given a new alias.
const ALIAS_ROTATION_FAILED: &str = "ALIAS_ROTATION_FAILED";

/// Reason recorded when a fault interrupted verification.
const INTERNAL_ERROR: &str = "INTERNAL_ERROR";

/// Parameters of a verification request.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    pub identifier: String,
    pub session_id: String,
    pub hmac: String,
}

/// Progress through the verification state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Received,
    Parsed,
    SessionResolved,
    Authorized,
    HmacChecked,
}

/// Why a verification was denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DenyReason {
    SessionInvalid,
    SessionExpired,
    NotAuthorized,
    HmacInvalid,
}

impl DenyReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DenyReason::SessionInvalid => "SESSION_INVALID",
            DenyReason::SessionExpired => "SESSION_EXPIRED",
            DenyReason::NotAuthorized => "NOT_AUTHORIZED",
            DenyReason::HmacInvalid => "HMAC_INVALID",
        }
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal outcome of a verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// The tag proved possession of its key. Carries the new alias when one
    /// was issued.
    Ok { alias: Option<String> },
    Denied(DenyReason),
}

impl Verdict {
    pub fn is_ok(&self) -> bool {
        matches!(self, Verdict::Ok { .. })
    }

    /// Wire form of the verdict.
    pub fn into_response(self) -> VerifyResponse {
        match self {
            Verdict::Ok { alias } => VerifyResponse {
                result: "OK",
                reason: None,
                alias,
            },
            Verdict::Denied(reason) => VerifyResponse {
                result: "DENIED",
                reason: Some(reason),
                alias: None,
            },
        }
    }
}

/// Verification payload returned to clients.
#[derive(Debug, Clone, Serialize)]
pub struct VerifyResponse {
    pub result: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<DenyReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

/// Where a single verification currently stands.
struct Attempt {
    stage: Stage,
    /// Real uid once the tag is resolved, the submitted identifier before.
    subject: String,
}

/// Runs the verification state machine against the stores.
pub struct Verifier {
    sessions: Arc<NonceSessionStore>,
    registry: Arc<dyn TagRegistry>,
    rotator: Arc<AliasRotator>,
    audit: Arc<AuditLog>,
}

impl Verifier {
    pub fn new(
        sessions: Arc<NonceSessionStore>,
        registry: Arc<dyn TagRegistry>,
        rotator: Arc<AliasRotator>,
        audit: Arc<AuditLog>,
    ) -> Self {
        Self {
            sessions,
            registry,
            rotator,
            audit,
        }
    }

    /// Verify a tag response and rotate its alias on success.
    pub fn verify(&self, request: &VerifyRequest) -> AuthdResult<Verdict> {
        self.run(request, true)
    }

    /// Verify a tag response without issuing a new alias.
    pub fn verify_without_rotation(&self, request: &VerifyRequest) -> AuthdResult<Verdict> {
        self.run(request, false)
    }

    fn run(&self, request: &VerifyRequest, rotate: bool) -> AuthdResult<Verdict> {
        debug!(stage = ?Stage::Received, rotate, "Verification request received");

        // Nothing is touched or logged for input that does not parse.
        let (identifier, mac) = parse_request(request)?;

        let mut attempt = Attempt {
            stage: Stage::Parsed,
            subject: identifier.as_str().to_string(),
        };

        let verdict = match self.check(&mut attempt, &identifier, &request.session_id, &mac) {
            Ok(verdict) => verdict,
            Err(e) => {
                error!(
                    identifier = %identifier,
                    stage = ?attempt.stage,
                    error = %e,
                    "Verification interrupted"
                );
                self.audit
                    .append(LogEntry::denied(attempt.subject, INTERNAL_ERROR));
                return Err(e);
            }
        };

        match verdict {
            Verdict::Denied(reason) => {
                info!(
                    identifier = %identifier,
                    uid = %attempt.subject,
                    reason = reason.as_str(),
                    "Verification denied"
                );
                self.audit
                    .append(LogEntry::denied(attempt.subject, reason.as_str()));
                Ok(Verdict::Denied(reason))
            }
            Verdict::Ok { .. } if !rotate => {
                info!(uid = %attempt.subject, "Verification succeeded");
                self.audit.append(LogEntry::ok(attempt.subject));
                Ok(Verdict::Ok { alias: None })
            }
            Verdict::Ok { .. } => match self.rotator.rotate(&attempt.subject) {
                Ok(alias) => {
                    info!(uid = %attempt.subject, "Verification succeeded");
                    self.audit.append(LogEntry::ok(attempt.subject));
                    Ok(Verdict::Ok { alias: Some(alias) })
                }
                Err(e) => {
                    error!(uid = %attempt.subject, error = %e, "Verified tag could not be given a new alias");
                    self.audit
                        .append(LogEntry::ok(attempt.subject).with_reason(ALIAS_ROTATION_FAILED));
                    Err(e)
                }
            },
        }
    }

    /// Steps 2 through 5. Returns `Ok { alias: None }` on a matching HMAC.
    fn check(
        &self,
        attempt: &mut Attempt,
        identifier: &Identifier,
        session_id: &str,
        mac: &[u8; HMAC_LEN],
    ) -> AuthdResult<Verdict> {
        // The session is consumed before the tag is looked up, so every
        // challenge is single use whatever happens next.
        let nonce = match self.sessions.get_and_consume(session_id, identifier)? {
            Consumed::Valid { nonce, .. } => nonce,
            Consumed::Expired => return Ok(Verdict::Denied(DenyReason::SessionExpired)),
            Consumed::NotFound => return Ok(Verdict::Denied(DenyReason::SessionInvalid)),
        };
        attempt.stage = Stage::SessionResolved;

        let tag = match self.registry.lookup(identifier.as_str())? {
            Some(tag) if tag.enabled => tag,
            Some(tag) => {
                debug!(uid = %tag.uid, "Tag is disabled");
                attempt.subject = tag.uid;
                return Ok(Verdict::Denied(DenyReason::NotAuthorized));
            }
            None => return Ok(Verdict::Denied(DenyReason::NotAuthorized)),
        };
        attempt.subject = tag.uid;
        attempt.stage = Stage::Authorized;

        let matches = TagMac::new(&tag.secret_key).verify(identifier.as_bytes(), &nonce, mac);
        attempt.stage = Stage::HmacChecked;

        if !matches {
            return Ok(Verdict::Denied(DenyReason::HmacInvalid));
        }

        Ok(Verdict::Ok { alias: None })
    }
}

/// Step 1. Every parse failure is reported as `MALFORMED_INPUT`.
fn parse_request(request: &VerifyRequest) -> AuthdResult<(Identifier, [u8; HMAC_LEN])> {
    let identifier = Identifier::parse(&request.identifier).map_err(|e| match e {
        AuthdError::Validation {
            kind: ValidationErrorKind::MalformedIdentifier { message },
        } => AuthdError::malformed("identifier", message),
        other => other,
    })?;

    if request.session_id.trim().is_empty() {
        return Err(AuthdError::malformed("sessionId", "must not be empty"));
    }

    let mac = parse_hmac(&request.hmac)?;

    Ok((identifier, mac))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{AuditResult, MemoryAuditSink};
    use crate::config::{AliasConfig, AuditConfig, StorageConfig};
    use crate::alias::AliasGenerator;
    use crate::registry::{AliasAssignment, SqliteTagRegistry, TagRecord};
    use crate::session::MemorySessionStore;
    use crate::storage::StorePool;
    use chrono::{DateTime, Utc};
    use std::sync::Barrier;
    use std::thread;
    use std::time::Duration;
    use tempfile::TempDir;

    const UID: &str = "C59B3706";
    const SECRET: &[u8] = b"MiEjemplo";

    struct Fixture {
        _dir: TempDir,
        registry: Arc<SqliteTagRegistry>,
        sessions: Arc<NonceSessionStore>,
        audit: Arc<AuditLog>,
        sink: Arc<MemoryAuditSink>,
        verifier: Verifier,
    }

    fn fixture(ttl: Duration) -> Fixture {
        let dir = TempDir::new().unwrap();
        let pool = StorePool::open(&StorageConfig::at(dir.path().join("authd.db"))).unwrap();
        let registry = Arc::new(SqliteTagRegistry::new(pool));
        registry.seed_tag(UID, SECRET, true).unwrap();

        let sessions = Arc::new(NonceSessionStore::new(
            Arc::new(MemorySessionStore::new()),
            ttl,
        ));
        let rotator = Arc::new(AliasRotator::new(registry.clone(), &AliasConfig::default()));
        let sink = Arc::new(MemoryAuditSink::default());
        let audit = Arc::new(AuditLog::spawn(vec![sink.clone()], &AuditConfig::default()));

        let verifier = Verifier::new(sessions.clone(), registry.clone(), rotator, audit.clone());

        Fixture {
            _dir: dir,
            registry,
            sessions,
            audit,
            sink,
            verifier,
        }
    }

    fn signed_request(fx: &Fixture, identifier: &str, secret: &[u8]) -> VerifyRequest {
        let challenge = fx.sessions.create_session(identifier).unwrap();
        let id = Identifier::parse(identifier).unwrap();
        let mac = TagMac::new(secret).sign(id.as_bytes(), &challenge.nonce);
        VerifyRequest {
            identifier: identifier.to_string(),
            session_id: challenge.session_id,
            hmac: hex::encode(mac),
        }
    }

    #[tokio::test]
    async fn test_valid_response_issues_alias() {
        let fx = fixture(Duration::from_secs(5));
        let request = signed_request(&fx, UID, SECRET);

        let verdict = fx.verifier.verify(&request).unwrap();
        let Verdict::Ok { alias: Some(alias) } = verdict else {
            panic!("expected OK with alias");
        };
        assert_eq!(alias.len(), 16);

        let record = fx.registry.lookup(&alias).unwrap().unwrap();
        assert_eq!(record.uid, UID);

        fx.audit.flush().await;
        let entries = fx.sink.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].uid, UID);
        assert_eq!(entries[0].result, AuditResult::Ok);
        assert_eq!(entries[0].reason, None);
    }

    #[tokio::test]
    async fn test_replay_is_session_invalid() {
        let fx = fixture(Duration::from_secs(5));
        let request = signed_request(&fx, UID, SECRET);

        assert!(fx.verifier.verify(&request).unwrap().is_ok());
        assert_eq!(
            fx.verifier.verify(&request).unwrap(),
            Verdict::Denied(DenyReason::SessionInvalid)
        );

        fx.audit.flush().await;
        let entries = fx.sink.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].reason.as_deref(), Some("SESSION_INVALID"));
    }

    #[tokio::test]
    async fn test_expired_session() {
        let fx = fixture(Duration::from_millis(50));
        let request = signed_request(&fx, UID, SECRET);

        tokio::time::sleep(Duration::from_millis(120)).await;

        assert_eq!(
            fx.verifier.verify(&request).unwrap(),
            Verdict::Denied(DenyReason::SessionExpired)
        );
        // The expired session is gone for good.
        assert_eq!(
            fx.verifier.verify(&request).unwrap(),
            Verdict::Denied(DenyReason::SessionInvalid)
        );
    }

    #[tokio::test]
    async fn test_unregistered_tag_not_authorized() {
        let fx = fixture(Duration::from_secs(5));
        let request = signed_request(&fx, "DEADBEEF", b"anything");

        assert_eq!(
            fx.verifier.verify(&request).unwrap(),
            Verdict::Denied(DenyReason::NotAuthorized)
        );

        fx.audit.flush().await;
        let entries = fx.sink.entries();
        assert_eq!(entries[0].uid, "DEADBEEF");
        assert_eq!(entries[0].result, AuditResult::Denied);
    }

    #[tokio::test]
    async fn test_disabled_tag_not_authorized() {
        let fx = fixture(Duration::from_secs(5));
        fx.registry.set_enabled(UID, false).unwrap();
        let request = signed_request(&fx, UID, SECRET);

        assert_eq!(
            fx.verifier.verify(&request).unwrap(),
            Verdict::Denied(DenyReason::NotAuthorized)
        );
    }

    #[tokio::test]
    async fn test_random_hmac_invalid() {
        let fx = fixture(Duration::from_secs(5));
        let mut request = signed_request(&fx, UID, SECRET);
        request.hmac = hex::encode([0x5Au8; 32]);

        assert_eq!(
            fx.verifier.verify(&request).unwrap(),
            Verdict::Denied(DenyReason::HmacInvalid)
        );
        // The session was consumed by the failed attempt.
        assert!(fx.sessions.is_empty().unwrap());
    }

    #[tokio::test]
    async fn test_malformed_input_touches_nothing() {
        let fx = fixture(Duration::from_secs(5));
        let mut request = signed_request(&fx, UID, SECRET);
        request.hmac = "zz".to_string();

        let err = fx.verifier.verify(&request).unwrap_err();
        assert_eq!(err.error_code(), "MALFORMED_INPUT");

        let mut bad_identifier = request.clone();
        bad_identifier.identifier = "C59B370".to_string();
        let err = fx.verifier.verify(&bad_identifier).unwrap_err();
        assert_eq!(err.error_code(), "MALFORMED_INPUT");

        // Session untouched, nothing logged.
        assert_eq!(fx.sessions.len().unwrap(), 1);
        fx.audit.flush().await;
        assert!(fx.sink.entries().is_empty());
    }

    #[tokio::test]
    async fn test_verify_by_alias() {
        let fx = fixture(Duration::from_secs(5));
        let first = signed_request(&fx, UID, SECRET);
        let Verdict::Ok { alias: Some(alias) } = fx.verifier.verify(&first).unwrap() else {
            panic!("expected alias");
        };

        let second = signed_request(&fx, &alias, SECRET);
        let Verdict::Ok { alias: Some(next) } = fx.verifier.verify(&second).unwrap() else {
            panic!("expected alias");
        };
        assert_ne!(alias, next);

        fx.audit.flush().await;
        assert!(fx.sink.entries().iter().all(|e| e.uid == UID));
    }

    #[tokio::test]
    async fn test_verify_without_rotation() {
        let fx = fixture(Duration::from_secs(5));
        let request = signed_request(&fx, UID, SECRET);

        assert_eq!(
            fx.verifier.verify_without_rotation(&request).unwrap(),
            Verdict::Ok { alias: None }
        );
        assert_eq!(fx.registry.reserved_alias_count().unwrap(), 0);
    }

    /// Always proposes the same alias.
    struct FixedAlias(String);

    impl AliasGenerator for FixedAlias {
        fn generate(&self, _len: usize) -> Result<String, AuthdError> {
            Ok(self.0.clone())
        }
    }

    /// Registry whose backing database never answers.
    struct LockedRegistry;

    impl TagRegistry for LockedRegistry {
        fn lookup(&self, _identifier: &str) -> Result<Option<TagRecord>, AuthdError> {
            Err(AuthdError::query("database is locked"))
        }

        fn assign_alias(
            &self,
            _uid: &str,
            _alias: &str,
            _at: DateTime<Utc>,
        ) -> Result<AliasAssignment, AuthdError> {
            Err(AuthdError::query("database is locked"))
        }
    }

    #[tokio::test]
    async fn test_concurrent_verify_single_winner() {
        let fx = fixture(Duration::from_secs(5));
        let request = signed_request(&fx, UID, SECRET);
        let barrier = Barrier::new(2);

        let verdicts: Vec<Verdict> = thread::scope(|scope| {
            let handles: Vec<_> = (0..2)
                .map(|_| {
                    scope.spawn(|| {
                        barrier.wait();
                        fx.verifier.verify(&request).unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(verdicts.iter().filter(|v| v.is_ok()).count(), 1);
        assert_eq!(
            verdicts
                .iter()
                .filter(|v| **v == Verdict::Denied(DenyReason::SessionInvalid))
                .count(),
            1
        );

        fx.audit.flush().await;
        assert_eq!(fx.sink.entries().len(), 2);
    }

    #[tokio::test]
    async fn test_rotation_failure_is_internal_error() {
        let fx = fixture(Duration::from_secs(5));
        let taken = "00112233445566FF".to_string();
        fx.registry.seed_tag("A1B2C3D4", b"other", true).unwrap();
        assert_eq!(
            fx.registry
                .assign_alias("A1B2C3D4", &taken, Utc::now())
                .unwrap(),
            AliasAssignment::Assigned
        );

        let rotator = Arc::new(AliasRotator::with_generator(
            fx.registry.clone(),
            &AliasConfig::default(),
            Box::new(FixedAlias(taken)),
        ));
        let verifier = Verifier::new(
            fx.sessions.clone(),
            fx.registry.clone(),
            rotator,
            fx.audit.clone(),
        );
        let request = signed_request(&fx, UID, SECRET);

        let err = verifier.verify(&request).unwrap_err();
        assert_eq!(err.error_code(), "INTERNAL_ERROR");

        fx.audit.flush().await;
        let entries = fx.sink.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].uid, UID);
        assert_eq!(entries[0].result, AuditResult::Ok);
        assert_eq!(entries[0].reason.as_deref(), Some(ALIAS_ROTATION_FAILED));

        let record = fx.registry.lookup(UID).unwrap().unwrap();
        assert_eq!(record.current_alias, None);
    }

    #[tokio::test]
    async fn test_storage_fault_is_denied_internal_error() {
        let fx = fixture(Duration::from_secs(5));
        let registry: Arc<dyn TagRegistry> = Arc::new(LockedRegistry);
        let rotator = Arc::new(AliasRotator::new(registry.clone(), &AliasConfig::default()));
        let verifier = Verifier::new(fx.sessions.clone(), registry, rotator, fx.audit.clone());
        let request = signed_request(&fx, UID, SECRET);

        let err = verifier.verify(&request).unwrap_err();
        assert_eq!(err.error_code(), "INTERNAL_ERROR");
        assert!(fx.sessions.is_empty().unwrap());

        fx.audit.flush().await;
        let entries = fx.sink.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].uid, UID);
        assert_eq!(entries[0].result, AuditResult::Denied);
        assert_eq!(entries[0].reason.as_deref(), Some(INTERNAL_ERROR));
    }

    #[test]
    fn test_response_shape() {
        let ok = serde_json::to_value(
            Verdict::Ok {
                alias: Some("0123456789ABCDEF".to_string()),
            }
            .into_response(),
        )
        .unwrap();
        assert_eq!(ok["result"], "OK");
        assert_eq!(ok["alias"], "0123456789ABCDEF");
        assert!(ok.get("reason").is_none());

        let denied =
            serde_json::to_value(Verdict::Denied(DenyReason::HmacInvalid).into_response()).unwrap();
        assert_eq!(denied["result"], "DENIED");
        assert_eq!(denied["reason"], "HMAC_INVALID");
        assert!(denied.get("alias").is_none());
    }

    #[test]
    fn test_request_uses_camel_case() {
        let request: VerifyRequest = serde_json::from_str(
            r#"{"identifier":"C59B3706","sessionId":"abc","hmac":"00"}"#,
        )
        .unwrap();
        assert_eq!(request.session_id, "abc");
    }
}
