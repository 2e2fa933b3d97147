//! Sensitive-input handling
//!
//! Keyed one-way hashing for blocklist lookups and cross-record correlation,
//! and reversible encryption for operator disclosure. Plaintext PII only ever
//! exists inside the evaluator's request scope; everything persisted or
//! logged goes through one of these two.

mod hasher;
mod vault;

pub use hasher::FieldHasher;
pub use vault::SensitiveVault;
