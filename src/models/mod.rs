mod api;

pub use api::{EmptyBody, HealthResponse, LoginRequest, SignUpRequest, TokenResponse};
