//! Alias rotation module.
//!
//! After each successful verification a tag receives a fresh random
//! pseudonym, reserved in a global set so it is never handed out twice.

mod rotator;

pub use rotator::{AliasGenerator, AliasRotator, RandomAliasGenerator};
