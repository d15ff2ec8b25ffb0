//! Security response headers.
//!
//! Every response carries the fixed headers in [`SECURITY_HEADERS`] and a
//! `Content-Security-Policy` whose `script-src` allows one nonce, generated per request by
//! [`csp_nonce`]. Pages put the same nonce on their inline scripts.

use std::sync::Arc;

use axum::{
    extract::Request,
    http::{header, HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use rand::{distributions::Alphanumeric, Rng};

const CSP_NONCE_LENGTH: usize = 16;

const CDN: &str = "https://cdn.ons.gov.uk";
const ANALYTICS: &str = "https://www.google-analytics.com";

/// Headers set on every response, apart from the content security policy.
pub const SECURITY_HEADERS: [(HeaderName, &str); 4] = [
    (
        header::STRICT_TRANSPORT_SECURITY,
        "max-age=31536000; includeSubDomains",
    ),
    (header::X_XSS_PROTECTION, "1"),
    (header::X_CONTENT_TYPE_OPTIONS, "nosniff"),
    (header::REFERRER_POLICY, "same-origin"),
];

/// The script nonce of the current request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CspNonce(Arc<str>);

impl CspNonce {
    /// A fresh random alphanumeric nonce.
    pub fn generate() -> Self {
        let nonce: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(CSP_NONCE_LENGTH)
            .map(char::from)
            .collect();
        Self(nonce.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// The content security policy for a response whose inline scripts carry `nonce`.
pub fn content_security_policy(nonce: &str) -> String {
    format!(
        "default-src 'self' {CDN}; \
         font-src 'self' data: {CDN}; \
         script-src 'self' {ANALYTICS} {CDN} 'nonce-{nonce}'; \
         connect-src 'self' {ANALYTICS} {CDN}; \
         img-src 'self' data: {ANALYTICS} {CDN}"
    )
}

/// Middleware that makes a [`CspNonce`] available to handlers and sets the matching
/// `Content-Security-Policy` on the response.
pub async fn csp_nonce(mut request: Request, next: Next) -> Response {
    let nonce = CspNonce::generate();
    request.extensions_mut().insert(nonce.clone());

    let mut response = next.run(request).await;
    match HeaderValue::from_str(&content_security_policy(nonce.as_str())) {
        Ok(value) => {
            response
                .headers_mut()
                .insert(header::CONTENT_SECURITY_POLICY, value);
        }
        Err(e) => tracing::error!("Invalid content security policy: {:?}", e),
    }
    response
}
