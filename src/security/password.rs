//! Pluggable password hashing.
//!
//! Stored passwords are self-describing: the text before the first `$`
//! names the encoder that produced them, so several encoders can coexist
//! in one user store.

use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD};
use base64::Engine as _;
use rand::RngCore;
use sha2::Sha256;

/// Capability set every password encoder provides.
pub trait PasswordEncoder: Send + Sync {
    /// Prefix of the stored form, e.g. `pbkdf2_sha256`.
    fn name(&self) -> &'static str;

    /// Produce a stored form for `raw`.
    fn encode(&self, raw: &str) -> String;

    /// Check `raw` against a stored form produced by `encode`.
    fn matches(&self, raw: &str, stored: &str) -> bool;
}

/// PBKDF2-HMAC-SHA256 with a random salt.
///
/// Stored as `pbkdf2_sha256$<rounds>$<salt>$<derived>`, salt and derived key
/// base64 encoded.
#[derive(Debug, Clone)]
pub struct Pbkdf2Sha256Encoder {
    iterations: u32,
    key_length: usize,
}

impl Pbkdf2Sha256Encoder {
    pub const NAME: &'static str = "pbkdf2_sha256";
    pub const DEFAULT_ITERATIONS: u32 = 30_000;
    pub const DEFAULT_KEY_LENGTH: usize = 32;

    pub fn new(iterations: u32) -> Self {
        Self {
            iterations: iterations.max(1),
            key_length: Self::DEFAULT_KEY_LENGTH,
        }
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    fn derive(salt: &str, raw: &str, rounds: u32, key_length: usize) -> Vec<u8> {
        let mut derived = vec![0u8; key_length];
        pbkdf2::pbkdf2_hmac::<Sha256>(raw.as_bytes(), salt.as_bytes(), rounds, &mut derived);
        derived
    }
}

impl Default for Pbkdf2Sha256Encoder {
    fn default() -> Self {
        Self::new(Self::DEFAULT_ITERATIONS)
    }
}

impl PasswordEncoder for Pbkdf2Sha256Encoder {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn encode(&self, raw: &str) -> String {
        let mut salt_bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut salt_bytes);
        let salt = STANDARD_NO_PAD.encode(salt_bytes);
        let derived = Self::derive(&salt, raw, self.iterations, self.key_length);
        format!(
            "{}${}${}${}",
            Self::NAME,
            self.iterations,
            salt,
            STANDARD.encode(derived)
        )
    }

    fn matches(&self, raw: &str, stored: &str) -> bool {
        let mut parts = stored.splitn(4, '$');
        let (Some(name), Some(rounds), Some(salt), Some(expected)) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return false;
        };
        if name != Self::NAME || salt.is_empty() {
            return false;
        }
        let Ok(rounds) = rounds.parse::<u32>() else {
            return false;
        };
        let Ok(expected) = STANDARD.decode(expected) else {
            return false;
        };
        if rounds == 0 || expected.is_empty() {
            return false;
        }
        let derived = Self::derive(salt, raw, rounds, expected.len());
        constant_time_eq(&derived, &expected)
    }
}

/// Compare without exiting early on the first differing byte.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_then_match() {
        let encoder = Pbkdf2Sha256Encoder::new(100);
        let stored = encoder.encode("tiger");
        assert!(stored.starts_with("pbkdf2_sha256$100$"));
        assert_eq!(stored.split('$').count(), 4);
        assert!(encoder.matches("tiger", &stored));
        assert!(!encoder.matches("Tiger", &stored));
    }

    #[test]
    fn salts_differ() {
        let encoder = Pbkdf2Sha256Encoder::new(10);
        assert_ne!(encoder.encode("same"), encoder.encode("same"));
    }

    #[test]
    fn uses_rounds_from_stored_form() {
        let stored = Pbkdf2Sha256Encoder::new(50).encode("pw");
        assert!(Pbkdf2Sha256Encoder::new(7).matches("pw", &stored));
    }

    #[test]
    fn rejects_malformed_stored_forms() {
        let encoder = Pbkdf2Sha256Encoder::default();
        assert!(!encoder.matches("pw", "pbkdf2_sha256$abc$salt$AAAA"));
        assert!(!encoder.matches("pw", "pbkdf2_sha256$10$salt"));
        assert!(!encoder.matches("pw", "md5$10$salt$AAAA"));
        assert!(!encoder.matches("pw", "pbkdf2_sha256$10$salt$!!!"));
    }

    #[test]
    fn constant_time_compare() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"ab"));
    }
}
