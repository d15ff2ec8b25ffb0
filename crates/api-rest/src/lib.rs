//! # API REST
//!
//! HTTP front end for the respondent home gateway.
//!
//! Handles:
//! - The access code form and its submission (mounted under `URL_PATH_PREFIX`)
//! - `/info`, optionally checking backend readiness
//! - Security response headers and request tracing
//!
//! Uses `rh-core` for the redemption itself.

#![warn(rust_2018_idioms)]

pub mod handlers;
pub mod render;
pub mod security;

use std::sync::Arc;

use axum::{http::HeaderValue, middleware, routing::get, Router};
use rh_core::Redeemer;
use tower_http::{set_header::SetResponseHeaderLayer, trace::TraceLayer};

use crate::render::{Frame, Pages};
use crate::security::{CspNonce, SECURITY_HEADERS};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub redeemer: Redeemer,
    pub pages: Arc<Pages>,
    /// Post target of the access code form, `{URL_PATH_PREFIX}/`.
    pub form_action: Arc<str>,
}

impl AppState {
    pub fn new(redeemer: Redeemer, pages: Pages, url_path_prefix: &str) -> Self {
        Self {
            redeemer,
            pages: Arc::new(pages),
            form_action: format!("{url_path_prefix}/").into(),
        }
    }

    /// Page values for a request carrying `nonce`.
    pub fn frame<'a>(&'a self, nonce: &'a CspNonce) -> Frame<'a> {
        Frame {
            action: &self.form_action,
            nonce: nonce.as_str(),
        }
    }
}

/// Builds the application router.
///
/// The index routes are mounted under `url_path_prefix` (empty, or `/segment`); `/info` and the
/// OpenAPI document are not prefixed.
pub fn build_router(state: AppState, url_path_prefix: &str) -> Router {
    let index = get(handlers::get_index).post(handlers::post_index);

    let mut router = Router::new().route(&format!("{url_path_prefix}/"), index.clone());
    if !url_path_prefix.is_empty() {
        router = router.route(url_path_prefix, index);
    }

    let mut router = router
        .route("/info", get(handlers::info))
        .route("/api-docs/openapi.json", get(handlers::openapi))
        .with_state(state);

    for (name, value) in SECURITY_HEADERS {
        router = router.layer(SetResponseHeaderLayer::overriding(
            name,
            HeaderValue::from_static(value),
        ));
    }

    router
        .layer(middleware::from_fn(security::csp_nonce))
        .layer(TraceLayer::new_for_http())
}
