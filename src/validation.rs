//! Multi-field input validation.
//!
//! A [`Validator`] collects one message per field and converts into
//! [`AppError::Validation`], rendered as `{ "errors": { field: message } }`.
//! The first failed rule for a field wins; later failures for the same field
//! are dropped so the client sees the most basic problem first.

use std::collections::BTreeMap;

use crate::error::{AppError, AppResult};
use crate::models::SignUpRequest;

// =============================================================================
// Validation Constants
// =============================================================================

/// Minimum password length.
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Emails must be shorter than this.
pub const MAX_EMAIL_LENGTH: usize = 254;

/// Maximum username length.
pub const MAX_USERNAME_LENGTH: usize = 150;

/// Accumulates per-field validation errors.
#[derive(Debug, Default)]
pub struct Validator {
    errors: BTreeMap<String, String>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    /// `true` if no rule has failed.
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Record an error for `field` unless one is already recorded.
    pub fn add_error(&mut self, field: &str, message: &str) {
        self.errors
            .entry(field.to_string())
            .or_insert_with(|| message.to_string());
    }

    /// Record `message` for `field` when `ok` is false.
    pub fn check(&mut self, ok: bool, field: &str, message: &str) {
        if !ok {
            self.add_error(field, message);
        }
    }

    pub fn errors(&self) -> &BTreeMap<String, String> {
        &self.errors
    }

    /// `Ok(())` if valid, otherwise [`AppError::Validation`].
    pub fn finish(self) -> AppResult<()> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(AppError::Validation(self.errors))
        }
    }
}

/// Rough email shape check: one `@`, non-empty local part, dotted domain.
///
/// Shape only; no deliverability check.
pub fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };

    !local.is_empty()
        && !domain.contains('@')
        && !email.chars().any(char::is_whitespace)
        && domain.contains('.')
        && domain.split('.').all(|label| !label.is_empty())
}

/// Validate a signup request.
///
/// Rules:
/// - Email must look like an address and be shorter than 254 characters
/// - Username must not be blank and at most 150 characters
/// - Password must match its confirmation
/// - Password must be at least 8 characters with a lowercase letter, an
///   uppercase letter and a digit
pub fn validate_signup(request: &SignUpRequest) -> AppResult<()> {
    let mut v = Validator::new();
    let password = request.password.as_str();

    v.check(
        is_valid_email(&request.email),
        "Email",
        "Please enter a valid email address",
    );
    v.check(
        request.email.len() < MAX_EMAIL_LENGTH,
        "Email",
        "Email must be shorter than 254 characters",
    );
    v.check(
        !request.username.trim().is_empty(),
        "Username",
        "Username can't be empty",
    );
    v.check(
        request.username.chars().count() <= MAX_USERNAME_LENGTH,
        "Username",
        "Username can't be longer than 150 characters",
    );
    v.check(
        password == request.password_confirmation,
        "Password confirmation",
        "Password and password confirmation didn't match",
    );
    v.check(
        password.chars().count() >= MIN_PASSWORD_LENGTH,
        "Password",
        "Password length must be equal or longer than 8 characters",
    );
    v.check(
        password.chars().any(|c| c.is_ascii_lowercase()),
        "Password",
        "Password must contain a lowercase character",
    );
    v.check(
        password.chars().any(|c| c.is_ascii_uppercase()),
        "Password",
        "Password must contain an uppercase character",
    );
    v.check(
        password.chars().any(|c| c.is_ascii_digit()),
        "Password",
        "Password must contain a digit",
    );

    v.finish()
}
