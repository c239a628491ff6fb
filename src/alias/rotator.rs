//! Alias rotation with bounded collision retries.

use std::sync::Arc;

use chrono::Utc;
use ring::rand::{SecureRandom, SystemRandom};
use tracing::{debug, info, warn};

use crate::config::AliasConfig;
use crate::error::{AliasErrorKind, AuthdError};
use crate::registry::{AliasAssignment, TagRegistry};

/// Source of alias candidates.
pub trait AliasGenerator: Send + Sync {
    /// Produce a new upper-case hex candidate of `len` random bytes.
    fn generate(&self, len: usize) -> Result<String, AuthdError>;
}

/// Candidates from the system CSPRNG.
pub struct RandomAliasGenerator {
    rng: SystemRandom,
}

impl RandomAliasGenerator {
    pub fn new() -> Self {
        Self {
            rng: SystemRandom::new(),
        }
    }
}

impl Default for RandomAliasGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl AliasGenerator for RandomAliasGenerator {
    fn generate(&self, len: usize) -> Result<String, AuthdError> {
        let mut bytes = vec![0u8; len];
        self.rng
            .fill(&mut bytes)
            .map_err(|_| AuthdError::internal("system RNG failed to produce an alias"))?;
        Ok(hex::encode_upper(bytes))
    }
}

/// Issues a fresh, globally unique pseudonym for a tag.
pub struct AliasRotator {
    registry: Arc<dyn TagRegistry>,
    generator: Box<dyn AliasGenerator>,
    length_bytes: usize,
    max_retries: u32,
}

impl AliasRotator {
    /// Create a rotator drawing candidates from the system RNG.
    pub fn new(registry: Arc<dyn TagRegistry>, config: &AliasConfig) -> Self {
        Self::with_generator(registry, config, Box::new(RandomAliasGenerator::new()))
    }

    /// Create a rotator with a custom candidate source.
    pub fn with_generator(
        registry: Arc<dyn TagRegistry>,
        config: &AliasConfig,
        generator: Box<dyn AliasGenerator>,
    ) -> Self {
        Self {
            registry,
            generator,
            length_bytes: config.length_bytes,
            max_retries: config.max_retries.max(1),
        }
    }

    /// Reserve a new alias and assign it to `uid`.
    ///
    /// Each attempt reserves and assigns in one transaction. Collisions are
    /// retried with a fresh candidate up to the configured cap.
    pub fn rotate(&self, uid: &str) -> Result<String, AuthdError> {
        for attempt in 1..=self.max_retries {
            let candidate = self.generator.generate(self.length_bytes)?;

            match self.registry.assign_alias(uid, &candidate, Utc::now())? {
                AliasAssignment::Assigned => {
                    info!(uid = %uid, attempt, "Alias rotated");
                    return Ok(candidate);
                }
                AliasAssignment::Collision => {
                    debug!(uid = %uid, attempt, "Alias candidate already reserved, retrying");
                }
                AliasAssignment::TagUnavailable => {
                    warn!(uid = %uid, "Tag became unavailable during alias rotation");
                    return Err(AuthdError::Alias {
                        kind: AliasErrorKind::TagUnavailable {
                            uid: uid.to_string(),
                        },
                    });
                }
            }
        }

        warn!(uid = %uid, attempts = self.max_retries, "Alias rotation gave up after repeated collisions");
        Err(AuthdError::Alias {
            kind: AliasErrorKind::RetriesExhausted {
                attempts: self.max_retries,
            },
        })
    }
}
