use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Login request body.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Signup request body.
///
/// Unknown fields are rejected.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SignUpRequest {
    pub email: String,
    pub username: String,
    pub password: String,
    pub password_confirmation: String,
}

/// Successful login response.
#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    /// Signed bearer token
    pub token: String,
}

/// Empty JSON object, `{}`.
#[derive(Debug, Default, Serialize)]
pub struct EmptyBody {}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Always "ok" while the process serves requests
    pub status: &'static str,
    /// Service version
    pub version: &'static str,
    /// Uptime in seconds
    pub uptime_seconds: u64,
    /// Current timestamp
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_signup_request_uses_camel_case() {
        let json = r#"{
            "email": "ana@example.com",
            "username": "ana",
            "password": "Espresso42",
            "passwordConfirmation": "Espresso42"
        }"#;
        let req: SignUpRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.password_confirmation, "Espresso42");
    }

    #[test]
    fn test_signup_request_rejects_unknown_fields() {
        let json = r#"{
            "email": "ana@example.com",
            "username": "ana",
            "password": "Espresso42",
            "passwordConfirmation": "Espresso42",
            "isStaff": true
        }"#;
        assert!(serde_json::from_str::<SignUpRequest>(json).is_err());
    }

    #[test]
    fn test_empty_body_serializes_to_object() {
        assert_eq!(serde_json::to_string(&EmptyBody::default()).unwrap(), "{}");
    }

    #[test]
    fn test_health_response_serialization() {
        let response = HealthResponse {
            status: "ok",
            version: "0.1.0",
            uptime_seconds: 3,
            timestamp: Utc::now(),
        };

        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"status\":\"ok\""));
        assert!(json.contains("\"uptime_seconds\":3"));
    }
}
