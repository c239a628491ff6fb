//! Service wiring module.
//!
//! Opens the store and assembles the session store, tag registry, alias
//! rotator, audit log and verifier that commands are served from.

mod stack;

pub use stack::AuthServices;

#[cfg(test)]
pub(crate) use stack::testing;
