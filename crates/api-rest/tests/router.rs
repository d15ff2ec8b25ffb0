#[path = "../../core/tests/common/mod.rs"]
mod common;

use std::sync::Arc;

use api_rest::{build_router, render::Pages, AppState};
use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use common::*;
use http_body_util::BodyExt;
use rh_core::{Redeemer, RegistryClient};
use serde_json::{json, Value};
use tower::ServiceExt;

fn app(registry_url: &str) -> Router {
    let cfg = config(registry_url);
    let prefix = cfg.url_path_prefix().to_string();
    let registry = RegistryClient::new(cfg.services().clone(), cfg.http_timeout()).unwrap();
    let redeemer = Redeemer::new(
        Arc::new(cfg),
        registry,
        Arc::new(RecordingSigner::default()),
    );
    let state = AppState::new(redeemer, Pages::new().unwrap(), &prefix);
    build_router(state, &prefix)
}

fn post_form(body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/surveys/")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(body.to_string()))
        .unwrap()
}

const CODE_FORM: &str = "iac1=ABCD&iac2=1234&iac3=EFGH&action%5Bsave_continue%5D=";

async fn body_text(resp: axum::response::Response) -> String {
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8_lossy(&bytes).to_string()
}

#[tokio::test]
async fn test_get_index_renders_form_with_security_headers() {
    let resp = app("http://127.0.0.1:9")
        .oneshot(Request::builder().uri("/surveys/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let headers = resp.headers().clone();
    assert_eq!(headers[header::X_CONTENT_TYPE_OPTIONS], "nosniff");
    assert_eq!(headers[header::REFERRER_POLICY], "same-origin");
    assert_eq!(headers[header::X_XSS_PROTECTION], "1");
    assert!(headers.contains_key(header::STRICT_TRANSPORT_SECURITY));
    assert!(headers[header::CONTENT_SECURITY_POLICY]
        .to_str()
        .unwrap()
        .starts_with("default-src 'self'"));

    let html = body_text(resp).await;
    assert_eq!(html.matches("input-text").count(), 3);
    assert!(html.contains(r#"action="/surveys/""#));
}

fn csp_nonce(resp: &axum::response::Response) -> String {
    let policy = resp.headers()[header::CONTENT_SECURITY_POLICY]
        .to_str()
        .unwrap()
        .to_string();
    let start = policy.find("'nonce-").expect("nonce in policy") + "'nonce-".len();
    let len = policy[start..].find('\'').expect("closing quote");
    policy[start..start + len].to_string()
}

#[tokio::test]
async fn test_each_response_gets_a_fresh_script_nonce() {
    let app = app("http://127.0.0.1:9");

    let first = app
        .clone()
        .oneshot(Request::builder().uri("/surveys/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let second = app
        .oneshot(Request::builder().uri("/surveys/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    let nonce = csp_nonce(&first);
    assert_eq!(nonce.len(), 16);
    assert_ne!(nonce, csp_nonce(&second));

    let html = body_text(first).await;
    assert!(html.contains(&format!(r#"<script nonce="{nonce}">"#)));
}

#[tokio::test]
async fn test_error_pages_carry_the_response_nonce() {
    let resp = app("http://127.0.0.1:9")
        .oneshot(post_form("iac1=1234&iac2=5678&iac3="))
        .await
        .unwrap();

    let nonce = csp_nonce(&resp);
    let html = body_text(resp).await;
    assert!(html.contains(&format!(r#"<script nonce="{nonce}">"#)));
}

#[tokio::test]
async fn test_index_is_mounted_under_prefix_only() {
    let resp = app("http://127.0.0.1:9")
        .oneshot(Request::builder().uri("/surveys").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = app("http://127.0.0.1:9")
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_post_malformed_code_renders_panel() {
    let resp = app("http://127.0.0.1:9")
        .oneshot(post_form("iac1=1234&iac2=5678&iac3="))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let html = body_text(resp).await;
    assert!(html.contains("Please enter your access code."));
    assert!(html.contains("panel--error"));
    assert!(html.contains("must be corrected"));
    assert!(html.contains("js-inpagelink"));
}

#[tokio::test]
async fn test_post_valid_code_redirects_to_eq() {
    let stub = StubRegistry::start().await;
    stub.with_happy_path();

    let resp = app(&stub.url()).oneshot(post_form(CODE_FORM)).await.unwrap();

    assert_eq!(resp.status(), StatusCode::FOUND);
    assert_eq!(
        resp.headers()[header::LOCATION],
        "https://eq.example/session?token=signed.test.token"
    );
    assert!(stub.was_requested(Method::POST, &format!("/cases/{CASE_ID}/events")));
}

#[tokio::test]
async fn test_post_unknown_code_is_accepted_with_panel() {
    let stub = StubRegistry::start().await;
    stub.respond(Method::GET, &format!("/iacs/{CODE}"), 404, json!({}));

    let resp = app(&stub.url()).oneshot(post_form(CODE_FORM)).await.unwrap();

    assert_eq!(resp.status(), StatusCode::ACCEPTED);
    let html = body_text(resp).await;
    assert!(html.contains("Please re-enter your access code and try again."));
    assert!(!stub.was_requested(Method::GET, &format!("/cases/{CASE_ID}")));
}

#[tokio::test]
async fn test_post_inactive_code_renders_study_complete() {
    let stub = StubRegistry::start().await;
    stub.respond(
        Method::GET,
        &format!("/iacs/{CODE}"),
        200,
        json!({ "active": false, "caseId": CASE_ID }),
    );

    let resp = app(&stub.url()).oneshot(post_form(CODE_FORM)).await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    assert!(body_text(resp).await.contains("Study complete"));
}

#[tokio::test]
async fn test_post_closed_exercise_renders_notice() {
    let stub = StubRegistry::start().await;
    stub.with_happy_path();
    stub.respond(
        Method::GET,
        &format!("/collectionexercises/{CE_ID}/events"),
        200,
        events_json("2018-01-01T12:00:00.000Z"),
    );

    let resp = app(&stub.url()).oneshot(post_form(CODE_FORM)).await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    assert!(body_text(resp).await.contains("This study is now closed"));
}

#[tokio::test]
async fn test_post_with_unreachable_registry_is_server_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let closed = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let resp = app(&closed).oneshot(post_form(CODE_FORM)).await.unwrap();

    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let html = body_text(resp).await;
    assert!(html.contains("Sorry, something went wrong"));
    assert!(html.contains("Service connection error"));
}

#[tokio::test]
async fn test_post_case_event_failure_is_server_error() {
    let stub = StubRegistry::start().await;
    stub.with_happy_path();
    stub.respond(
        Method::POST,
        &format!("/cases/{CASE_ID}/events"),
        500,
        json!({}),
    );

    let resp = app(&stub.url()).oneshot(post_form(CODE_FORM)).await.unwrap();

    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(resp.headers().get(header::LOCATION).is_none());
}

#[tokio::test]
async fn test_info_without_check() {
    let resp = app("http://127.0.0.1:9")
        .oneshot(Request::builder().uri("/info").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = serde_json::from_str(&body_text(resp).await).unwrap();
    assert_eq!(body["name"], "respondent-home");
    assert!(body["version"].is_string());
    assert!(body.get("ready").is_none());
}

#[tokio::test]
async fn test_info_with_check_reports_readiness() {
    let stub = StubRegistry::start().await;

    let resp = app(&stub.url())
        .oneshot(
            Request::builder()
                .uri("/info?check=true")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let body: Value = serde_json::from_str(&body_text(resp).await).unwrap();
    assert_eq!(body["ready"], false);

    stub.respond(Method::GET, "/info", 200, json!({ "name": "stub" }));
    let resp = app(&stub.url())
        .oneshot(
            Request::builder()
                .uri("/info?check=true")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let body: Value = serde_json::from_str(&body_text(resp).await).unwrap();
    assert_eq!(body["ready"], true);
}

#[tokio::test]
async fn test_openapi_document_lists_info() {
    let resp = app("http://127.0.0.1:9")
        .oneshot(
            Request::builder()
                .uri("/api-docs/openapi.json")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let body: Value = serde_json::from_str(&body_text(resp).await).unwrap();
    assert!(body["paths"]["/info"].is_object());
}
