//! Password Hasher
//! Mission: Salted adaptive hashing that always fails closed

use anyhow::{bail, Context, Result};
use tracing::warn;

/// bcrypt only reads this many bytes of input; anything past it would be ignored
pub const MAX_PASSWORD_BYTES: usize = 72;

/// bcrypt wrapper. Hashes are self-describing (`$2b$<cost>$<salt+digest>`), so
/// verification needs nothing but the stored string.
#[derive(Debug, Clone)]
pub struct PasswordHasher {
    cost: u32,
    // Compared against when the username is unknown, so a miss costs one bcrypt
    // round just like a wrong password does.
    dummy_hash: String,
}

impl PasswordHasher {
    pub fn new(cost: u32) -> Result<Self> {
        let dummy_hash = bcrypt::hash("assignhub-dummy-password", cost)
            .context("Failed to initialise password hasher")?;
        Ok(Self { cost, dummy_hash })
    }

    pub fn cost(&self) -> u32 {
        self.cost
    }

    pub fn hash(&self, plaintext: &str) -> Result<String> {
        if plaintext.len() > MAX_PASSWORD_BYTES {
            bail!("Password longer than {} bytes", MAX_PASSWORD_BYTES);
        }
        bcrypt::hash(plaintext, self.cost).context("Failed to hash password")
    }

    /// Returns `false` on mismatch, on input bcrypt would truncate, and on any
    /// malformed stored hash.
    pub fn verify(&self, plaintext: &str, hash: &str) -> bool {
        if plaintext.len() > MAX_PASSWORD_BYTES {
            return false;
        }
        match bcrypt::verify(plaintext, hash) {
            Ok(valid) => valid,
            Err(e) => {
                warn!("Rejecting password check against unusable hash: {}", e);
                false
            }
        }
    }

    /// Burn one verification for a login against an unknown account.
    pub fn verify_dummy(&self, plaintext: &str) -> bool {
        let _ = self.verify(plaintext, &self.dummy_hash);
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hasher() -> PasswordHasher {
        PasswordHasher::new(4).unwrap()
    }

    #[test]
    fn test_hash_and_verify() {
        let hasher = hasher();
        let hash = hasher.hash("correct horse").unwrap();

        assert!(hash.starts_with("$2b$04$"));
        assert!(hasher.verify("correct horse", &hash));
        assert!(!hasher.verify("correct horsf", &hash));
    }

    #[test]
    fn test_single_bit_flip_rejected() {
        let hasher = hasher();
        let password = "password123";
        let hash = hasher.hash(password).unwrap();

        for i in 0..password.len() {
            let mut bytes = password.as_bytes().to_vec();
            bytes[i] ^= 0x01;
            let flipped = String::from_utf8(bytes).unwrap();
            assert!(!hasher.verify(&flipped, &hash), "flip at byte {} accepted", i);
        }
    }

    #[test]
    fn test_input_past_bcrypt_limit_refused() {
        let hasher = hasher();
        let at_limit = "é".repeat(MAX_PASSWORD_BYTES / 2);
        let hash = hasher.hash(&at_limit).unwrap();
        assert!(hasher.verify(&at_limit, &hash));

        // 60 two-byte chars: bcrypt would only see the first 72 bytes
        let long = "é".repeat(60);
        assert!(hasher.hash(&long).is_err());

        let mut tail_flipped = long.clone().into_bytes();
        let last = tail_flipped.len() - 1;
        tail_flipped[last] ^= 0x01;
        let tail_flipped = String::from_utf8(tail_flipped).unwrap();
        assert!(!hasher.verify(&tail_flipped, &hash));
        assert!(!hasher.verify(&format!("{}x", at_limit), &hash));
    }

    #[test]
    fn test_same_password_different_salts() {
        let hasher = hasher();
        let h1 = hasher.hash("password").unwrap();
        let h2 = hasher.hash("password").unwrap();

        assert_ne!(h1, h2);
        assert!(hasher.verify("password", &h1));
        assert!(hasher.verify("password", &h2));
    }

    #[test]
    fn test_malformed_hash_fails_closed() {
        let hasher = hasher();

        assert!(!hasher.verify("password", ""));
        assert!(!hasher.verify("password", "not-a-bcrypt-hash"));
        assert!(!hasher.verify("password", "$2b$04$truncated"));
        assert!(!hasher.verify("password", "$9z$99$AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA"));
    }

    #[test]
    fn test_dummy_verification_never_succeeds() {
        let hasher = hasher();
        assert!(!hasher.verify_dummy("assignhub-dummy-password"));
    }

    #[test]
    fn test_invalid_cost_rejected() {
        assert!(PasswordHasher::new(2).is_err());
    }
}
