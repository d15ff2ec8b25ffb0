//! Request handlers.

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Json, Response},
    Extension, Form,
};
use rh_core::AccessCodeForm;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, OpenApi, ToSchema};

use crate::security::CspNonce;
use crate::AppState;

const SERVICE_NAME: &str = "respondent-home";

#[derive(OpenApi)]
#[openapi(paths(info), components(schemas(InfoResponse)))]
pub struct ApiDoc;

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct InfoQuery {
    /// `true` to query every backend registry.
    pub check: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct InfoResponse {
    pub name: String,
    pub version: String,
    /// Present only when `check=true` was requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ready: Option<bool>,
}

/// Access code entry form.
#[axum::debug_handler]
pub async fn get_index(
    State(state): State<AppState>,
    Extension(nonce): Extension<CspNonce>,
) -> Response {
    match state.pages.index(state.frame(&nonce), None) {
        Ok(html) => Html(html).into_response(),
        Err(e) => render_failure(e),
    }
}

/// Redeems a submitted access code.
///
/// # Returns
/// * `302 Found` to the eQ session on success.
/// * The page chosen by [`rh_core::translate`] otherwise, with its status.
#[axum::debug_handler]
pub async fn post_index(
    State(state): State<AppState>,
    Extension(nonce): Extension<CspNonce>,
    Form(form): Form<AccessCodeForm>,
) -> Response {
    match state.redeemer.redeem(&form).await {
        Ok(redirect) => (
            StatusCode::FOUND,
            [(header::LOCATION, redirect.location.to_string())],
        )
            .into_response(),
        Err(aborted) => {
            rh_core::translate::log(&aborted.error);
            tracing::debug!(stage = %aborted.stage, "Redemption aborted");

            let translation = rh_core::translate(&aborted.error);
            let status = StatusCode::from_u16(translation.status)
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            match state.pages.page(state.frame(&nonce), &translation.page) {
                Ok(html) => (status, Html(html)).into_response(),
                Err(e) => render_failure(e),
            }
        }
    }
}

#[utoipa::path(
    get,
    path = "/info",
    params(InfoQuery),
    responses(
        (status = 200, description = "Service name and version, with readiness when checked", body = InfoResponse)
    )
)]
/// Service information endpoint.
///
/// With `check=true`, queries the `/info` endpoint of every backend registry and reports
/// `ready: true` only if all of them answered successfully.
#[axum::debug_handler]
pub async fn info(
    State(state): State<AppState>,
    Query(query): Query<InfoQuery>,
) -> Json<InfoResponse> {
    let ready = match query.check.as_deref() {
        Some(check) if check.eq_ignore_ascii_case("true") => {
            Some(state.redeemer.registry().check_services().await)
        }
        _ => None,
    };
    Json(InfoResponse {
        name: SERVICE_NAME.into(),
        version: env!("CARGO_PKG_VERSION").into(),
        ready,
    })
}

pub async fn openapi() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

fn render_failure(e: handlebars::RenderError) -> Response {
    tracing::error!("Template render error: {:?}", e);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "Sorry, something went wrong",
    )
        .into_response()
}
