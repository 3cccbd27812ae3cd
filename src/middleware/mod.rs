//! Lightweight per-request plumbing. No identity/authorization layer is
//! carried forward here: this is a single-tenant benchmarking service,
//! not a multi-tenant admin surface.

use std::time::Duration;

use axum::extract::Request;
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::Response;
use uuid::Uuid;

use crate::utils::ApiError;

const REQUEST_ID_HEADER: &str = "x-request-id";

/// Attaches an `x-request-id` to every response and fails the request
/// with `Unavailable` if the handler doesn't finish inside `deadline`.
pub async fn request_context(deadline: Duration, mut req: Request, next: Next) -> Result<Response, ApiError> {
    let request_id = Uuid::new_v4().to_string();
    req.extensions_mut().insert(RequestId(request_id.clone()));

    let span = tracing::info_span!("request", request_id = %request_id, method = %req.method(), path = %req.uri().path());
    let _enter = span.enter();

    let mut response = match tokio::time::timeout(deadline, next.run(req)).await {
        Ok(response) => response,
        Err(_) => return Err(ApiError::unavailable(format!("request exceeded {}s deadline", deadline.as_secs()))),
    };

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    Ok(response)
}

/// Request-extension carrier for the generated id; handlers may pull
/// this out for structured logging if they need to correlate.
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::routing::get;
    use axum::Router;
    use tower::ServiceExt;

    async fn ok_handler() -> &'static str {
        "ok"
    }

    async fn slow_handler() -> &'static str {
        tokio::time::sleep(Duration::from_millis(50)).await;
        "slow"
    }

    #[tokio::test]
    async fn fast_request_gets_a_request_id_header() {
        let app = Router::new()
            .route("/", get(ok_handler))
            .layer(axum::middleware::from_fn(|req, next| request_context(Duration::from_secs(5), req, next)));

        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert!(response.headers().contains_key(REQUEST_ID_HEADER));
    }

    #[tokio::test]
    async fn slow_request_trips_the_deadline() {
        let app = Router::new()
            .route("/", get(slow_handler))
            .layer(axum::middleware::from_fn(|req, next| request_context(Duration::from_millis(5), req, next)));

        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::SERVICE_UNAVAILABLE);
    }
}
