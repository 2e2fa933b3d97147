//! Keyed, normalized one-way hashing

use crate::error::{Result, RuntimeError};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Number of hex characters in an index hash
const INDEX_HASH_LEN: usize = 16;

/// HMAC-SHA-256 hasher over normalized values.
///
/// The same logical value must hash identically across the whole service so
/// blocklist membership never needs plaintext; normalization (trim +
/// lowercase) prevents trivial case and whitespace evasion.
pub struct FieldHasher {
    key: Vec<u8>,
}

impl FieldHasher {
    /// Create a hasher from the configured secret. An empty key is a fatal
    /// initialization error.
    pub fn new(key: &str) -> Result<Self> {
        if key.is_empty() {
            return Err(RuntimeError::Sensitive(
                "hash key must not be empty".to_string(),
            ));
        }
        Ok(Self {
            key: key.as_bytes().to_vec(),
        })
    }

    fn normalize(value: &str) -> String {
        value.trim().to_lowercase()
    }

    fn mac(&self, value: &str) -> HmacSha256 {
        // Key length is unconstrained for HMAC; new_from_slice cannot fail.
        let mut mac =
            HmacSha256::new_from_slice(&self.key).expect("HMAC accepts any key length");
        mac.update(Self::normalize(value).as_bytes());
        mac
    }

    /// Keyed hash of the normalized value, as 64 hex characters
    pub fn hash(&self, value: &str) -> String {
        hex::encode(self.mac(value).finalize().into_bytes())
    }

    /// Short hash for index columns: the first 16 hex characters
    pub fn index_hash(&self, value: &str) -> String {
        let mut full = self.hash(value);
        full.truncate(INDEX_HASH_LEN);
        full
    }

    /// Order-independent hash over several values: normalized values are
    /// sorted and joined with `|` before hashing
    pub fn composite_hash(&self, values: &[&str]) -> String {
        let mut parts: Vec<String> = values.iter().map(|v| Self::normalize(v)).collect();
        parts.sort();
        self.hash(&parts.join("|"))
    }

    /// Constant-time comparison of a value against a hex digest
    pub fn verify(&self, value: &str, expected_hex: &str) -> bool {
        let Ok(expected) = hex::decode(expected_hex) else {
            return false;
        };
        self.mac(value).verify_slice(&expected).is_ok()
    }
}
