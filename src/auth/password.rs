//! Password hashing compatible with the legacy `pbkdf2_sha256` format.
//!
//! Stored hashes use four `$`-delimited ASCII fields:
//!
//! ```text
//! pbkdf2_sha256$320000$<22 char salt>$<base64 digest>
//! ```
//!
//! This is the format written by Django's default password hasher, so
//! accounts created by the legacy admin keep working here and vice versa.
//!
//! # Security
//!
//! - Salts come from the thread-local CSPRNG, restricted to `[a-zA-Z0-9]`
//! - Digest comparison is constant-time (`subtle`)
//! - A hash whose iteration field does not parse is rejected, never
//!   treated as zero iterations

use std::fmt;
use std::str::FromStr;

use base64ct::{Base64, Encoding};
use pbkdf2::pbkdf2_hmac;
use rand::Rng;
use rand::distr::Alphanumeric;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

/// Algorithm tag written into new hashes.
pub const ALGORITHM: &str = "pbkdf2_sha256";

/// Default PBKDF2 iteration count for new hashes.
pub const DEFAULT_ITERATIONS: u32 = 320_000;

/// Default salt length in characters.
pub const SALT_LENGTH: usize = 22;

/// Field delimiter of the stored representation.
const DELIMITER: char = '$';

/// Salt of [`CredentialHash::decoy`].
const DECOY_SALT: &str = "decoySaltForUnknownUsr";

/// SHA-256 output size; also the derived key length.
const DIGEST_SIZE: usize = 32;

/// Errors produced while decoding a stored credential hash.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CredentialError {
    #[error("stored password hash must have exactly 4 '$'-delimited fields, found {0}")]
    MalformedHash(usize),

    #[error("stored password hash has an invalid iteration count: {0:?}")]
    InvalidIterations(String),
}

/// A password hash at rest: algorithm, iterations, salt, and base64 digest.
///
/// Parsing and [`Display`](fmt::Display) round-trip byte-for-byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialHash {
    algorithm: String,
    iterations: u32,
    salt: String,
    hash: String,
}

impl CredentialHash {
    /// Parse a stored hash string.
    ///
    /// # Errors
    ///
    /// - [`CredentialError::MalformedHash`] unless there are exactly four fields
    /// - [`CredentialError::InvalidIterations`] if the iteration field is not a
    ///   positive integer written as plain digits without leading zeros
    pub fn parse(stored: &str) -> Result<Self, CredentialError> {
        let fields: Vec<&str> = stored.split(DELIMITER).collect();
        let [algorithm, iterations, salt, hash] = fields.as_slice() else {
            return Err(CredentialError::MalformedHash(fields.len()));
        };

        let iterations = Some(*iterations)
            .filter(|text| is_canonical_count(text))
            .and_then(|text| text.parse::<u32>().ok())
            .ok_or_else(|| CredentialError::InvalidIterations((*iterations).to_string()))?;

        Ok(Self {
            algorithm: (*algorithm).to_string(),
            iterations,
            salt: (*salt).to_string(),
            hash: (*hash).to_string(),
        })
    }

    /// A hash no password verifies against, costing `iterations` rounds.
    ///
    /// Login checks an unknown email against this so that it costs as much as
    /// a wrong password for a known one.
    pub fn decoy(iterations: u32) -> Self {
        Self {
            algorithm: ALGORITHM.to_string(),
            iterations,
            salt: DECOY_SALT.to_string(),
            // Not valid base64, so no derived digest can equal it
            hash: "!".repeat(44),
        }
    }

    pub fn algorithm(&self) -> &str {
        &self.algorithm
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    pub fn salt(&self) -> &str {
        &self.salt
    }

    /// Base64-encoded digest.
    pub fn hash(&self) -> &str {
        &self.hash
    }

    /// Check a plaintext password against this hash.
    ///
    /// Re-derives the digest with this hash's own salt and iteration count and
    /// compares in constant time. Unknown algorithm tags never verify.
    pub fn verify(&self, plaintext: &str) -> bool {
        if self.algorithm != ALGORITHM {
            return false;
        }

        let derived = derive(plaintext, &self.salt, self.iterations);
        derived.as_bytes().ct_eq(self.hash.as_bytes()).into()
    }
}

impl FromStr for CredentialHash {
    type Err = CredentialError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for CredentialHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{DELIMITER}{}{DELIMITER}{}{DELIMITER}{}",
            self.algorithm, self.iterations, self.salt, self.hash
        )
    }
}

/// Hash a plaintext password with a fresh salt and the default iteration count.
///
/// Returns the stored `<algorithm>$<iterations>$<salt>$<hash>` representation.
pub fn hash_password(plaintext: &str) -> String {
    hash_password_with_cost(plaintext, DEFAULT_ITERATIONS)
}

/// Hash a plaintext password with a fresh salt and `iterations` rounds.
pub fn hash_password_with_cost(plaintext: &str, iterations: u32) -> String {
    hash_password_with(plaintext, &generate_salt(), iterations)
}

/// Hash a plaintext password with an explicit salt and iteration count.
pub fn hash_password_with(plaintext: &str, salt: &str, iterations: u32) -> String {
    CredentialHash {
        algorithm: ALGORITHM.to_string(),
        iterations,
        salt: salt.to_string(),
        hash: derive(plaintext, salt, iterations),
    }
    .to_string()
}

/// Verify a plaintext password against a parsed hash. Never errors on mismatch.
pub fn verify_password(hash: &CredentialHash, plaintext: &str) -> bool {
    hash.verify(plaintext)
}

/// Generate a salt of [`SALT_LENGTH`] characters from `[a-zA-Z0-9]`.
fn generate_salt() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(SALT_LENGTH)
        .map(char::from)
        .collect()
}

/// Plain ASCII digits with no sign and no leading zero.
fn is_canonical_count(text: &str) -> bool {
    !text.is_empty() && !text.starts_with('0') && text.bytes().all(|b| b.is_ascii_digit())
}

/// PBKDF2-HMAC-SHA256 with a digest-sized output, base64 encoded.
fn derive(plaintext: &str, salt: &str, iterations: u32) -> String {
    let mut digest = [0u8; DIGEST_SIZE];
    pbkdf2_hmac::<Sha256>(plaintext.as_bytes(), salt.as_bytes(), iterations, &mut digest);
    Base64::encode_string(&digest)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    // Low iteration count keeps the suite fast; the format is identical.
    const TEST_ITERATIONS: u32 = 1_000;

    #[test]
    fn test_parse_rejects_wrong_field_count() {
        assert_eq!(
            CredentialHash::parse("onlyonepart"),
            Err(CredentialError::MalformedHash(1))
        );
        assert_eq!(
            CredentialHash::parse("a$b$c"),
            Err(CredentialError::MalformedHash(3))
        );
        assert_eq!(
            CredentialHash::parse("a$1$c$d$e"),
            Err(CredentialError::MalformedHash(5))
        );
    }

    #[test]
    fn test_parse_accepts_four_fields() {
        let parsed = CredentialHash::parse("a$1$c$d").unwrap();
        assert_eq!(parsed.algorithm(), "a");
        assert_eq!(parsed.iterations(), 1);
        assert_eq!(parsed.salt(), "c");
        assert_eq!(parsed.hash(), "d");
    }

    #[test]
    fn test_parse_fails_closed_on_bad_iterations() {
        // Four fields, but the iteration count does not parse: rejected rather
        // than decoded as zero iterations like the legacy reader did
        assert_eq!(
            CredentialHash::parse("a$b$c$d"),
            Err(CredentialError::InvalidIterations("b".to_string()))
        );
        assert!(matches!(
            CredentialHash::parse("pbkdf2_sha256$0$salt$hash"),
            Err(CredentialError::InvalidIterations(_))
        ));
        assert!(matches!(
            CredentialHash::parse("pbkdf2_sha256$-5$salt$hash"),
            Err(CredentialError::InvalidIterations(_))
        ));
    }

    #[test]
    fn test_parse_rejects_non_canonical_iterations() {
        for field in ["+5", "0320000", " 5", "5 ", "1_000", ""] {
            assert_eq!(
                CredentialHash::parse(&format!("pbkdf2_sha256${field}$salt$hash")),
                Err(CredentialError::InvalidIterations(field.to_string())),
                "{field:?}"
            );
        }
    }

    #[test]
    fn test_accepted_hashes_display_unchanged() {
        for stored in ["a$1$c$d", "pbkdf2_sha256$320000$s$h", "x$4294967295$$"] {
            assert_eq!(CredentialHash::parse(stored).unwrap().to_string(), stored);
        }
    }

    #[test]
    fn test_decoy_never_verifies() {
        let decoy = CredentialHash::decoy(TEST_ITERATIONS);
        assert_eq!(decoy.algorithm(), ALGORITHM);
        assert_eq!(decoy.iterations(), TEST_ITERATIONS);
        assert_eq!(decoy.salt().len(), SALT_LENGTH);
        for password in ["", "password", "Espresso42", "!!!!"] {
            assert!(!decoy.verify(password));
        }
    }

    #[test]
    fn test_hash_password_format() {
        let stored = hash_password_with("hunter22", "abcdefghijklmnopqrstuv", TEST_ITERATIONS);
        let parts: Vec<&str> = stored.split('$').collect();

        assert_eq!(parts.len(), 4);
        assert_eq!(parts[0], "pbkdf2_sha256");
        assert_eq!(parts[1], "1000");
        assert_eq!(parts[2], "abcdefghijklmnopqrstuv");
        // 32-byte digest -> 44 base64 chars with padding
        assert_eq!(parts[3].len(), 44);
    }

    #[test]
    fn test_default_hash_uses_default_parameters() {
        let stored = hash_password("correct horse");
        let parsed = CredentialHash::parse(&stored).unwrap();

        assert_eq!(parsed.algorithm(), ALGORITHM);
        assert_eq!(parsed.iterations(), DEFAULT_ITERATIONS);
        assert_eq!(parsed.salt().len(), SALT_LENGTH);
        assert!(parsed.salt().chars().all(|c| c.is_ascii_alphanumeric()));
        assert!(parsed.verify("correct horse"));
    }

    #[test]
    fn test_parse_display_round_trip() {
        let stored = hash_password_with("p@ss", "SaltSaltSaltSaltSalt12", TEST_ITERATIONS);
        let parsed: CredentialHash = stored.parse().unwrap();
        assert_eq!(parsed.to_string(), stored);
    }

    #[test]
    fn test_verify_matching_and_mismatching_passwords() {
        for password in ["a", "password123", "with spaces ok", "~!@#$%^&*()_+"] {
            let stored = hash_password_with(password, "abcdefghijklmnopqrstuv", TEST_ITERATIONS);
            let parsed = CredentialHash::parse(&stored).unwrap();

            assert!(verify_password(&parsed, password), "{password:?} should verify");
            assert!(!verify_password(&parsed, &format!("{password}x")));
            assert!(!verify_password(&parsed, ""));
        }
    }

    #[test]
    fn test_fresh_salts_differ() {
        let a = CredentialHash::parse(&hash_password("same")).unwrap();
        let b = CredentialHash::parse(&hash_password("same")).unwrap();
        assert_ne!(a.salt(), b.salt());
        assert_ne!(a.hash(), b.hash());
    }

    #[test]
    fn test_verify_rejects_unknown_algorithm() {
        let stored = hash_password_with("pw", "salt", TEST_ITERATIONS);
        let tampered = stored.replacen(ALGORITHM, "md5", 1);
        let parsed = CredentialHash::parse(&tampered).unwrap();
        assert!(!parsed.verify("pw"));
    }

    #[test]
    fn test_verify_known_pbkdf2_vector() {
        // RFC 7914 section 11: PBKDF2-HMAC-SHA256("passwd", "salt", c=1, dkLen=64),
        // truncated to the 32-byte digest used here.
        let expected = Base64::encode_string(&[
            0x55, 0xac, 0x04, 0x6e, 0x56, 0xe3, 0x08, 0x9f, 0xec, 0x16, 0x91, 0xc2, 0x25, 0x44,
            0xb6, 0x05, 0xf9, 0x41, 0x85, 0x21, 0x6d, 0xde, 0x04, 0x65, 0xe6, 0x8b, 0x9d, 0x57,
            0xc2, 0x0d, 0xac, 0xbc,
        ]);
        let parsed = CredentialHash::parse(&format!("pbkdf2_sha256$1$salt${expected}")).unwrap();
        assert!(parsed.verify("passwd"));
    }
}
