use rand::RngCore;
use sha2::{Digest, Sha256};

/// Hash a password with a fresh random salt. Stored form is
/// `salt_hex$digest_hex`.
pub fn hash_password(password: &str) -> String {
    let mut salt = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut salt);
    let digest = salted_digest(&salt, password);
    format!("{}${}", to_hex(&salt), to_hex(&digest))
}

/// Check a candidate password against a stored `salt_hex$digest_hex` value.
/// Malformed stored values never match.
pub fn verify_password(candidate: &str, stored: &str) -> bool {
    let Some((salt_hex, digest_hex)) = stored.split_once('$') else {
        return false;
    };
    let Some(salt) = from_hex(salt_hex) else {
        return false;
    };
    to_hex(&salted_digest(&salt, candidate)) == digest_hex
}

fn salted_digest(salt: &[u8], password: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(password.as_bytes());
    hasher.finalize().to_vec()
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn from_hex(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).ok())
        .collect()
}
