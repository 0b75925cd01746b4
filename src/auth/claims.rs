//! Claim extraction from the bearer token on an inbound request.
//!
//! The `Authorization` header must have exactly two space-separated parts,
//! `<scheme> <token>`. The token is verified (signature + expiry) before any
//! claim is read.

use std::fmt;
use std::str::FromStr;

use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use thiserror::Error;

use super::token::{TokenClaims, TokenKeys};

/// Errors produced while extracting claims from a request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("Authorization header not provided")]
    MissingHeader,

    #[error("Authorization header is not in the format: <Bearer Token>")]
    MalformedHeader,

    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("Token doesn't contain the {0} claim")]
    UnknownClaim(String),

    #[error("Failed to sign token: {0}")]
    Encoding(String),
}

/// The recognized claim names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimName {
    /// `userId`
    SubjectId,
    /// `isStaff`
    IsElevated,
}

impl ClaimName {
    pub fn as_str(self) -> &'static str {
        match self {
            ClaimName::SubjectId => "userId",
            ClaimName::IsElevated => "isStaff",
        }
    }
}

impl fmt::Display for ClaimName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClaimName {
    type Err = TokenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "userId" => Ok(ClaimName::SubjectId),
            "isStaff" => Ok(ClaimName::IsElevated),
            other => Err(TokenError::UnknownClaim(other.to_string())),
        }
    }
}

/// A typed claim value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimValue {
    SubjectId(String),
    IsElevated(bool),
}

impl ClaimValue {
    fn from_claims(claims: TokenClaims, name: ClaimName) -> Self {
        match name {
            ClaimName::SubjectId => ClaimValue::SubjectId(claims.user_id),
            ClaimName::IsElevated => ClaimValue::IsElevated(claims.is_staff),
        }
    }
}

/// Extract the raw token from the `Authorization` header.
///
/// # Errors
///
/// - [`TokenError::MissingHeader`] if the header is absent or blank
/// - [`TokenError::MalformedHeader`] if it is not exactly `<scheme> <token>`
pub fn token_from_header(headers: &HeaderMap) -> Result<&str, TokenError> {
    let value = headers
        .get(AUTHORIZATION)
        .ok_or(TokenError::MissingHeader)?
        .to_str()
        .map_err(|_| TokenError::MalformedHeader)?;

    parse_authorization(value)
}

/// Split an `Authorization` header value into its token part.
pub fn parse_authorization(value: &str) -> Result<&str, TokenError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(TokenError::MissingHeader);
    }

    let mut parts = value.split(' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(_scheme), Some(token), None) => Ok(token),
        _ => Err(TokenError::MalformedHeader),
    }
}

/// Verify the request's bearer token and return all of its claims.
pub fn claims_from_request(headers: &HeaderMap, keys: &TokenKeys) -> Result<TokenClaims, TokenError> {
    let token = token_from_header(headers)?;
    keys.verify(token)
}

/// Verify the request's bearer token and return the named claim.
pub fn claim_from_token(
    headers: &HeaderMap,
    keys: &TokenKeys,
    name: ClaimName,
) -> Result<ClaimValue, TokenError> {
    claims_from_request(headers, keys).map(|claims| ClaimValue::from_claims(claims, name))
}

/// Like [`claim_from_token`], for a claim named at runtime.
///
/// Unknown names fail before any token work is done.
pub fn claim_from_token_named(
    headers: &HeaderMap,
    keys: &TokenKeys,
    name: &str,
) -> Result<ClaimValue, TokenError> {
    let name: ClaimName = name.parse()?;
    claim_from_token(headers, keys, name)
}
