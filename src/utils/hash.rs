use sha2::{Digest, Sha256};

pub fn calculate_hash(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// First `len` hex chars of the content hash, used in object keys.
pub fn short_hash(data: &[u8], len: usize) -> String {
    let mut hash = calculate_hash(data);
    hash.truncate(len);
    hash
}
