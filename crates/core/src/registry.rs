//! HTTP client for the backend registries.
//!
//! One pooled [`reqwest::Client`] is shared by every request. The configured timeout bounds each
//! call end to end; a timeout is reported like any other transport failure.
//!
//! The access code registry has its own status handling (see [`RegistryClient::get_iac`]); every
//! other registry treats any non-2xx status as [`SystemFailure::UpstreamStatus`].

use std::time::Duration;

use futures::future::join_all;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use url::Url;

use crate::access_code::AccessCode;
use crate::config::{Service, ServiceEndpoints};
use crate::constants::COLLECTION_INSTRUMENT_PATH;
use crate::error::{BadResponse, RedemptionResult, Rejection, SystemFailure};
use crate::models::{
    Case, CaseEvent, CollectionExercise, CollectionInstrument, ExerciseEvent, IacRecord,
    SampleAttributes,
};

#[derive(Clone, Debug)]
pub struct RegistryClient {
    http: Client,
    services: ServiceEndpoints,
}

impl RegistryClient {
    /// Creates a client whose requests all time out after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns a [`reqwest::Error`] if the TLS backend cannot be initialised.
    pub fn new(services: ServiceEndpoints, timeout: Duration) -> reqwest::Result<Self> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self { http, services })
    }

    pub fn services(&self) -> &ServiceEndpoints {
        &self.services
    }

    /// Looks up an access code.
    ///
    /// # Status handling
    ///
    /// - `404`: [`Rejection::InvalidCode`]
    /// - `401` / `403`: [`SystemFailure::Unauthorized`]
    /// - any other 4xx: [`SystemFailure::BadUpstreamResponse`] of the status kind
    /// - `5xx`, timeout or transport failure: [`SystemFailure::UpstreamConnection`]
    /// - success with a body that is not JSON: [`SystemFailure::BadUpstreamResponse`] of the
    ///   invalid body kind
    ///
    /// Error detail and logs carry a redacted URL; the full code never leaves this function.
    pub async fn get_iac(&self, code: &AccessCode) -> RedemptionResult<IacRecord> {
        let service = Service::Iac;
        let endpoint = self.services.get(service);
        let url = endpoint.url(&["iacs", code.as_str()]);
        let label = endpoint.url(&["iacs", &code.redacted()]).to_string();

        let response = self.send(service, Method::GET, url, &label, None).await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Err(Rejection::InvalidCode.into());
        }
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(SystemFailure::Unauthorized {
                service,
                url: label,
                status: status.as_u16(),
            }
            .into());
        }
        if status.is_server_error() {
            tracing::error!(url = %label, status_code = status.as_u16(), "Error in response");
            return Err(SystemFailure::UpstreamConnection {
                service,
                url: label,
                message: format!("status {}", status.as_u16()),
            }
            .into());
        }
        if !status.is_success() {
            return Err(SystemFailure::BadUpstreamResponse {
                service,
                url: label,
                reason: BadResponse::Status(status.as_u16()),
            }
            .into());
        }

        read_json(service, &label, response).await
    }

    pub async fn get_case(&self, case_id: &str) -> RedemptionResult<Case> {
        self.get_json(Service::Case, &["cases", case_id]).await
    }

    /// Records an event against a case.
    pub async fn post_case_event(&self, case_id: &str, event: &CaseEvent) -> RedemptionResult<()> {
        let service = Service::Case;
        let url = self.services.get(service).url(&["cases", case_id, "events"]);
        let label = url.to_string();

        let response = self.send(service, Method::POST, url, &label, Some(event)).await?;
        check_status(service, &label, response.status())
    }

    pub async fn get_collection_instrument(
        &self,
        collection_instrument_id: &str,
    ) -> RedemptionResult<CollectionInstrument> {
        let mut segments = COLLECTION_INSTRUMENT_PATH.to_vec();
        segments.push(collection_instrument_id);
        self.get_json(Service::CollectionInstrument, &segments).await
    }

    pub async fn get_collection_exercise(
        &self,
        collection_exercise_id: &str,
    ) -> RedemptionResult<CollectionExercise> {
        self.get_json(
            Service::CollectionExercise,
            &["collectionexercises", collection_exercise_id],
        )
        .await
    }

    pub async fn get_collection_exercise_events(
        &self,
        collection_exercise_id: &str,
    ) -> RedemptionResult<Vec<ExerciseEvent>> {
        self.get_json(
            Service::CollectionExercise,
            &["collectionexercises", collection_exercise_id, "events"],
        )
        .await
    }

    pub async fn get_sample_attributes(
        &self,
        sample_unit_id: &str,
    ) -> RedemptionResult<SampleAttributes> {
        self.get_json(Service::Sample, &["samples", sample_unit_id, "attributes"])
            .await
    }

    /// Queries every registry's `/info` endpoint concurrently.
    ///
    /// # Returns
    ///
    /// `true` only if every registry answered with a 2xx status.
    pub async fn check_services(&self) -> bool {
        let checks = Service::ALL.into_iter().map(|service| async move {
            let url = self.services.get(service).status_url();
            let label = url.to_string();
            match self.send(service, Method::GET, url, &label, None).await {
                Ok(response) if response.status().is_success() => true,
                Ok(response) => {
                    tracing::warn!(
                        service = %service,
                        url = %label,
                        status_code = response.status().as_u16(),
                        "Service not ready"
                    );
                    false
                }
                Err(err) => {
                    tracing::warn!(service = %service, error = %err, "Service not reachable");
                    false
                }
            }
        });
        join_all(checks).await.into_iter().all(|ready| ready)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        service: Service,
        segments: &[&str],
    ) -> RedemptionResult<T> {
        let url = self.services.get(service).url(segments);
        let label = url.to_string();

        let response = self.send(service, Method::GET, url, &label, None).await?;
        check_status(service, &label, response.status())?;
        read_json(service, &label, response).await
    }

    fn request(&self, service: Service, method: Method, url: Url) -> RequestBuilder {
        let builder = self.http.request(method, url);
        match self.services.get(service).auth() {
            Some(auth) => builder.basic_auth(&auth.username, Some(&auth.password)),
            None => builder,
        }
    }

    async fn send(
        &self,
        service: Service,
        method: Method,
        url: Url,
        label: &str,
        body: Option<&CaseEvent>,
    ) -> RedemptionResult<Response> {
        let mut builder = self.request(service, method, url);
        if let Some(body) = body {
            builder = builder.json(body);
        }

        builder.send().await.map_err(|err| {
            SystemFailure::UpstreamConnection {
                service,
                url: label.to_string(),
                message: transport_message(&err),
            }
            .into()
        })
    }
}

fn check_status(service: Service, label: &str, status: StatusCode) -> RedemptionResult<()> {
    if status.is_success() {
        return Ok(());
    }
    tracing::error!(url = %label, status_code = status.as_u16(), "Error in response");
    Err(SystemFailure::UpstreamStatus {
        service,
        url: label.to_string(),
        status: status.as_u16(),
    }
    .into())
}

async fn read_json<T: DeserializeOwned>(
    service: Service,
    label: &str,
    response: Response,
) -> RedemptionResult<T> {
    let body = response.text().await.map_err(|err| SystemFailure::UpstreamConnection {
        service,
        url: label.to_string(),
        message: transport_message(&err),
    })?;

    serde_json::from_str(&body).map_err(|err| {
        SystemFailure::BadUpstreamResponse {
            service,
            url: label.to_string(),
            reason: BadResponse::InvalidBody(err.to_string()),
        }
        .into()
    })
}

// reqwest errors embed the request URL, which may contain an access code.
fn transport_message(err: &reqwest::Error) -> String {
    let kind = if err.is_timeout() {
        "timed out"
    } else if err.is_connect() {
        "connection failed"
    } else if err.is_body() || err.is_decode() {
        "failed reading body"
    } else {
        "request failed"
    };
    kind.to_string()
}
