//! Middleware: response headers that browsers need before they grant
//! camera and microphone access.

use axum::{extract::Request, http::HeaderValue, middleware::Next, response::Response};

/// Headers applied to every response:
/// - `Permissions-Policy`: camera, microphone and screen capture for any origin
/// - `Strict-Transport-Security`: media capture needs a secure context on mobile
/// - `Cross-Origin-Embedder-Policy: credentialless`
/// - `X-Content-Type-Options: nosniff`
pub async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let h = response.headers_mut();

    macro_rules! set {
        ($name:expr, $val:expr) => {
            h.insert(
                axum::http::header::HeaderName::from_static($name),
                HeaderValue::from_static($val),
            );
        };
    }

    set!("permissions-policy", "camera=*, microphone=*, display-capture=*");
    set!(
        "strict-transport-security",
        "max-age=31536000; includeSubDomains"
    );
    set!("cross-origin-embedder-policy", "credentialless");
    set!("x-content-type-options", "nosniff");

    response
}
