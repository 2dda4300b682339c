//! Content hashing for file identity

use sha2::{Digest, Sha256};

/// Hash data using SHA-256, hex-encoded in lower case
pub fn sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let result = hasher.finalize();
    hex::encode(result)
}
