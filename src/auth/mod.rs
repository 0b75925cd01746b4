//! Credentials and bearer tokens.
//!
//! - [`password`]: legacy-compatible PBKDF2 password hashes
//! - [`token`]: HS256 token issuance and verification
//! - [`claims`]: pulling typed claims out of a request's bearer token

pub mod claims;
pub mod password;
pub mod token;

pub use claims::{
    ClaimName, ClaimValue, TokenError, claim_from_token, claim_from_token_named,
    claims_from_request, token_from_header,
};
pub use password::{
    CredentialError, CredentialHash, DEFAULT_ITERATIONS, hash_password, hash_password_with_cost,
    verify_password,
};
pub use token::{DEFAULT_TOKEN_TTL, TokenClaims, TokenKeys};
