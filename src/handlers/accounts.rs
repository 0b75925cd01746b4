//! Account endpoints: signup and login.
//!
//! # Endpoints
//!
//! - `POST /api/v1/signup` - create an account, 201 `{}`
//! - `POST /api/v1/login` - exchange email + password for a bearer token
//!
//! Both routes are on the default public allow-list, so they are reachable
//! without a token. PBKDF2 work runs on the blocking pool.
//!
//! Login answers an unknown email and a wrong password identically
//! (404 "Invalid credentials") so the response does not reveal which
//! emails are registered.

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use tokio::task;
use tracing::{info, instrument, warn};

use crate::auth::{CredentialHash, hash_password_with_cost};
use crate::error::{AppError, AppResult};
use crate::models::{EmptyBody, LoginRequest, SignUpRequest, TokenResponse};
use crate::state::AppState;
use crate::store::NewUser;
use crate::validation::validate_signup;

const INVALID_CREDENTIALS: &str = "Invalid credentials";

/// Run a CPU-heavy closure off the async workers.
async fn blocking<T, F>(f: F) -> AppResult<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    task::spawn_blocking(f)
        .await
        .map_err(|e| AppError::Internal(format!("Blocking task failed: {e}")))
}

/// Create an account.
///
/// # Errors
///
/// - 400 with `{ "message" }` if the body is not a signup request
/// - 400 with `{ "errors" }` if any field fails validation
/// - 409 if the email is already registered
#[instrument(skip(state, payload))]
pub async fn signup(
    State(state): State<AppState>,
    payload: Result<Json<SignUpRequest>, JsonRejection>,
) -> AppResult<(StatusCode, Json<EmptyBody>)> {
    let Json(request) = payload.map_err(|_| {
        AppError::BadRequest(
            "Invalid syntax. Request body must include an email, password, \
             passwordConfirmation and username fields."
                .to_string(),
        )
    })?;

    validate_signup(&request)?;

    let iterations = state.config.password_iterations;
    let password = request.password;
    let password_hash = blocking(move || hash_password_with_cost(&password, iterations)).await?;

    let user = state
        .users
        .create(NewUser {
            email: request.email,
            username: request.username,
            password_hash,
            is_staff: false,
        })
        .await?;

    info!(user_id = %user.id, "User registered");
    Ok((StatusCode::CREATED, Json(EmptyBody::default())))
}

/// Exchange credentials for a bearer token.
///
/// # Errors
///
/// - 400 if the body is not a login request
/// - 404 "Invalid credentials" for an unknown email or wrong password
/// - 500 if the stored hash cannot be parsed
#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> AppResult<(StatusCode, Json<TokenResponse>)> {
    let Json(request) = payload.map_err(|_| {
        AppError::BadRequest(
            "Invalid syntax. Request body must include an email and a password.".to_string(),
        )
    })?;

    let password = request.password;
    let Some(user) = state.users.find_by_email(&request.email).await? else {
        // Same PBKDF2 cost as a wrong password for a known email
        let decoy = CredentialHash::decoy(state.config.password_iterations);
        blocking(move || decoy.verify(&password)).await?;

        warn!("Login attempt for unknown email");
        return Err(AppError::NotFound(INVALID_CREDENTIALS.to_string()));
    };

    let stored: CredentialHash = user.password_hash.parse()?;
    let matched = blocking(move || stored.verify(&password)).await?;

    if !matched {
        warn!(user_id = %user.id, "Login attempt with wrong password");
        return Err(AppError::NotFound(INVALID_CREDENTIALS.to_string()));
    }

    let token = state.keys.issue(&user.id.to_string(), user.is_staff)?;

    info!(user_id = %user.id, "User logged in");
    Ok((StatusCode::CREATED, Json(TokenResponse { token })))
}
