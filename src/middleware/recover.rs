//! Panic containment, the outermost stage of the chain.
//!
//! A panic anywhere below this layer becomes a 500 with
//! `{ "message": "Closed connection" }` and `Connection: close`, so a
//! connection that may have observed a half-finished request is not reused.
//!
//! Requires unwinding panics (`panic = "unwind"`, the default profile
//! setting).

use std::any::Any;

use axum::body::Body;
use axum::http::Response;
use axum::response::IntoResponse;
use tower_http::catch_panic::CatchPanicLayer;
use tracing::error;

use crate::error::AppError;
use crate::metrics;

/// Handler type used by [`recover_layer`].
pub type PanicHandler = fn(Box<dyn Any + Send + 'static>) -> Response<Body>;

/// Build the panic containment layer.
pub fn recover_layer() -> CatchPanicLayer<PanicHandler> {
    CatchPanicLayer::custom(panic_response as PanicHandler)
}

/// Turn a caught panic payload into the wire response.
pub fn panic_response(payload: Box<dyn Any + Send + 'static>) -> Response<Body> {
    let detail = panic_message(payload.as_ref());

    error!(panic = %detail, "Recovered from panic in request handler");
    metrics::record_panic();

    AppError::Fault(detail).into_response()
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::http::header::CONNECTION;
    use axum::http::{Request, StatusCode};
    use axum::routing::get;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    async fn boom() -> &'static str {
        panic!("handler exploded")
    }

    #[test]
    fn test_panic_message_payloads() {
        assert_eq!(panic_message(&"static"), "static");
        assert_eq!(panic_message(&"owned".to_string()), "owned");
        assert_eq!(panic_message(&42_u8), "unknown panic payload");
    }

    #[tokio::test]
    async fn test_panic_becomes_500_with_connection_close() {
        let app = Router::new()
            .route("/boom", get(boom))
            .layer(recover_layer());

        let response = app
            .oneshot(Request::builder().uri("/boom").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.headers().get(CONNECTION).unwrap(), "close");

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["message"], "Closed connection");
        // The panic text stays in the logs
        assert!(!String::from_utf8_lossy(&body).contains("exploded"));
    }
}
