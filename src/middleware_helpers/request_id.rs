use axum::{
    extract::Request,
    http::{header::HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};

use crate::tracing::{scope_request_id, RequestId};

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Keeps a usable inbound `x-request-id` or mints a UUID, exposes it to
/// handlers as an extension and to error bodies through the task-local, and
/// echoes it on the response. Must sit outside the trace layer so request
/// spans pick the id up.
pub async fn request_id_middleware(mut request: Request, next: Next) -> Response {
    let inbound = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .filter(|value| value.to_str().is_ok_and(|text| !text.trim().is_empty()))
        .cloned();

    let (request_id, header_value) = match inbound {
        Some(value) => (RequestId::new(value.to_str().unwrap_or_default()), value),
        None => {
            let id = RequestId::default();
            match HeaderValue::from_str(id.as_str()) {
                Ok(value) => (id, value),
                Err(_) => (id, HeaderValue::from_static("unknown")),
            }
        }
    };

    let header = HeaderName::from_static(REQUEST_ID_HEADER);
    request.headers_mut().insert(header.clone(), header_value.clone());
    request.extensions_mut().insert(request_id.clone());

    let mut response = scope_request_id(request_id, next.run(request)).await;
    response.headers_mut().insert(header, header_value);
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{to_bytes, Body},
        extract::Extension,
        http::{Request as HttpRequest, StatusCode},
        routing::get,
        Router,
    };
    use tower::ServiceExt;

    async fn extension_handler(
        Extension(request_id): Extension<RequestId>,
    ) -> (StatusCode, String) {
        (StatusCode::OK, format!("request-id:{}", request_id.as_str()))
    }

    fn app() -> Router {
        Router::new()
            .route("/", get(extension_handler))
            .layer(axum::middleware::from_fn(request_id_middleware))
    }

    #[tokio::test]
    async fn middleware_adds_request_id_header_and_extension() {
        let response = app()
            .oneshot(HttpRequest::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert!(response.headers().get(REQUEST_ID_HEADER).is_some());

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body_str = String::from_utf8(body.to_vec()).unwrap();
        assert!(body_str.starts_with("request-id:"));
    }

    #[tokio::test]
    async fn middleware_keeps_caller_request_id() {
        let response = app()
            .oneshot(
                HttpRequest::builder()
                    .uri("/")
                    .header(REQUEST_ID_HEADER, "req-from-gateway")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(
            response.headers().get(REQUEST_ID_HEADER).unwrap(),
            "req-from-gateway"
        );
    }
}
