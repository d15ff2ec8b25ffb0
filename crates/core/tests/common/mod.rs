#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;
use rh_core::AppConfig;
use rh_signing::{ClaimSigner, SigningResult};
use serde_json::{json, Map, Value};

pub const CODE_FIELDS: [&str; 3] = ["ABCD", "1234", "EFGH"];
pub const CODE: &str = "abcd1234efgh";
pub const CASE_ID: &str = "8849c299-5014-4637-bd2b-fc866aeccdf5";
pub const CI_ID: &str = "68ad4018-2ddd-4894-89e7-33f0135887a2";
pub const CE_ID: &str = "6d2b41d2-e3ce-4f0b-8e1f-4c8b19e6c8a2";
pub const SAMPLE_UNIT_ID: &str = "f1e2b5a6-8d04-4bd4-9a3e-1f5c6d7e8a9b";

#[derive(Clone, Debug)]
pub struct RecordedRequest {
    pub method: Method,
    pub path: String,
    pub body: String,
}

#[derive(Default)]
struct StubState {
    routes: Mutex<HashMap<(Method, String), (StatusCode, String)>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

/// A fake registry serving every backend from one listener. Unconfigured paths answer 404.
pub struct StubRegistry {
    addr: SocketAddr,
    state: Arc<StubState>,
    server: tokio::task::JoinHandle<()>,
}

impl StubRegistry {
    pub async fn start() -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("addr");
        let state = Arc::new(StubState::default());

        let app = Router::new().fallback(handle).with_state(state.clone());
        let server = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self {
            addr,
            state,
            server,
        }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn respond(&self, method: Method, path: &str, status: u16, body: Value) {
        self.respond_raw(method, path, status, &body.to_string());
    }

    pub fn respond_raw(&self, method: Method, path: &str, status: u16, body: &str) {
        let status = StatusCode::from_u16(status).expect("status");
        self.state
            .routes
            .lock()
            .unwrap()
            .insert((method, path.to_string()), (status, body.to_string()));
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.requests.lock().unwrap().clone()
    }

    pub fn was_requested(&self, method: Method, path: &str) -> bool {
        self.requests()
            .iter()
            .any(|r| r.method == method && r.path == path)
    }

    /// Configures a registry that redeems [`CODE`] successfully.
    pub fn with_happy_path(&self) {
        self.respond(
            Method::GET,
            &format!("/iacs/{CODE}"),
            200,
            json!({ "iac": CODE, "active": true, "caseId": CASE_ID }),
        );
        self.respond(Method::GET, &format!("/cases/{CASE_ID}"), 200, case_json());
        self.respond(
            Method::POST,
            &format!("/cases/{CASE_ID}/events"),
            201,
            json!({}),
        );
        self.respond(Method::GET, &ci_path(), 200, collection_instrument_json());
        self.respond(
            Method::GET,
            &format!("/collectionexercises/{CE_ID}"),
            200,
            collection_exercise_json(),
        );
        self.respond(
            Method::GET,
            &format!("/collectionexercises/{CE_ID}/events"),
            200,
            events_json("2099-01-31T12:00:00.000Z"),
        );
        self.respond(
            Method::GET,
            &format!("/samples/{SAMPLE_UNIT_ID}/attributes"),
            200,
            sample_attributes_json(),
        );
    }
}

impl Drop for StubRegistry {
    fn drop(&mut self) {
        self.server.abort();
    }
}

async fn handle(
    State(state): State<Arc<StubState>>,
    method: Method,
    uri: Uri,
    body: Bytes,
) -> Response {
    let path = uri.path().to_string();
    state.requests.lock().unwrap().push(RecordedRequest {
        method: method.clone(),
        path: path.clone(),
        body: String::from_utf8_lossy(&body).into_owned(),
    });

    let route = state.routes.lock().unwrap().get(&(method, path)).cloned();
    match route {
        Some((status, body)) => {
            (status, [(header::CONTENT_TYPE, "application/json")], body).into_response()
        }
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

pub fn ci_path() -> String {
    format!("/collection-instrument-api/1.0.2/collectioninstrument/id/{CI_ID}")
}

pub fn case_json() -> Value {
    json!({
        "id": CASE_ID,
        "caseRef": "1000000000000001",
        "sampleUnitId": SAMPLE_UNIT_ID,
        "sampleUnitType": "H",
        "collectionInstrumentId": CI_ID,
        "state": "ACTIONABLE",
        "caseGroup": {
            "collectionExerciseId": CE_ID,
            "sampleUnitRef": "10000000010",
            "sampleUnitType": "H",
            "caseGroupStatus": "NOTSTARTED"
        }
    })
}

pub fn collection_instrument_json() -> Value {
    json!({
        "id": CI_ID,
        "type": "EQ",
        "surveyId": "b8d6ffa5-3c4b-4b0f-8e1e-0b4c1b6c7a3d",
        "classifiers": { "eq_id": "lms", "form_type": "1" }
    })
}

pub fn collection_exercise_json() -> Value {
    json!({
        "id": CE_ID,
        "exerciseRef": "201806",
        "name": "Labour Market Survey",
        "state": "LIVE"
    })
}

pub fn events_json(exercise_end: &str) -> Value {
    json!([
        { "tag": "mps", "timestamp": "2018-06-01T12:00:00.000Z" },
        { "tag": "ref_period_start", "timestamp": "2018-06-01T12:00:00.000Z" },
        { "tag": "ref_period_end", "timestamp": "2018-06-30T12:00:00.000Z" },
        { "tag": "return_by", "timestamp": "2018-07-07T12:00:00.000Z" },
        { "tag": "exercise_end", "timestamp": exercise_end }
    ])
}

pub fn sample_attributes_json() -> Value {
    json!({
        "id": SAMPLE_UNIT_ID,
        "attributes": {
            "ADDRESS_LINE1": "1 Main Street",
            "ADDRESS_LINE2": "Upper Upperingham",
            "LOCALITY": "",
            "TOWN_NAME": "Upton",
            "POSTCODE": "UP103UP",
            "COUNTRY": "E",
            "REFERENCE": "0000000001"
        }
    })
}

/// Configuration with every registry pointing at `registry_url`.
pub fn config(registry_url: &str) -> AppConfig {
    let env: HashMap<&str, String> = HashMap::from([
        ("EQ_URL", "https://eq.example".to_string()),
        ("ACCOUNT_SERVICE_URL", "https://rh.example".to_string()),
        ("URL_PATH_PREFIX", "/surveys".to_string()),
        ("JSON_SECRET_KEYS", "{}".to_string()),
        ("HTTP_TIMEOUT_SECS", "2".to_string()),
        ("CASE_URL", registry_url.to_string()),
        ("CASE_USERNAME", "admin".to_string()),
        ("CASE_PASSWORD", "secret".to_string()),
        ("COLLECTION_EXERCISE_URL", registry_url.to_string()),
        ("COLLECTION_INSTRUMENT_URL", registry_url.to_string()),
        ("IAC_URL", registry_url.to_string()),
        ("SAMPLE_URL", registry_url.to_string()),
        ("SURVEY_URL", registry_url.to_string()),
    ]);
    AppConfig::from_lookup(|k| env.get(k).cloned()).expect("config")
}

/// Signer that records the claims it was asked to sign.
#[derive(Default)]
pub struct RecordingSigner {
    claims: Mutex<Vec<Map<String, Value>>>,
}

impl RecordingSigner {
    pub fn signed(&self) -> Vec<Map<String, Value>> {
        self.claims.lock().unwrap().clone()
    }
}

impl ClaimSigner for RecordingSigner {
    fn sign(&self, claims: &Map<String, Value>) -> SigningResult<String> {
        self.claims.lock().unwrap().push(claims.clone());
        Ok("signed.test.token".to_string())
    }
}
