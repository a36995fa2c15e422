use sha2::{Digest, Sha256};

/// 32 random bytes, hex encoded. Used for email verification and password reset links.
pub fn generate_token() -> String {
    let bytes: [u8; 32] = rand::random();
    hex::encode(bytes)
}

/// SHA-256 hex digest. Only digests of emailed tokens are ever stored.
pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.trim().as_bytes()))
}

/// Twelve upper-case hex characters: the public patient UID printed on a card.
pub fn generate_profile_uid() -> String {
    let bytes: [u8; 6] = rand::random();
    hex::encode_upper(bytes)
}
