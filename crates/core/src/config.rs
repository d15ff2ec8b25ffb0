//! Gateway configuration.
//!
//! [`AppConfig`] holds the listen address, the eQ and account service URLs, the form's path
//! prefix, the signing key store and one [`ServiceEndpoint`] per backend registry. Values are
//! read and checked once when the process starts; a missing variable or a URL that cannot carry
//! path segments stops startup.
//!
//! [`AppConfig::from_lookup`] takes a lookup function rather than reading `std::env`, so tests
//! can supply plain maps.

use std::time::Duration;

use url::Url;

use crate::constants::{DEFAULT_HOST, DEFAULT_HTTP_TIMEOUT_SECS, DEFAULT_PORT};

/// The backend registries this service talks to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Service {
    Case,
    CollectionExercise,
    CollectionInstrument,
    Iac,
    Sample,
    Survey,
}

impl Service {
    pub const ALL: [Service; 6] = [
        Service::Case,
        Service::CollectionExercise,
        Service::CollectionInstrument,
        Service::Iac,
        Service::Sample,
        Service::Survey,
    ];

    /// Environment variable prefix, e.g. `COLLECTION_EXERCISE` for `COLLECTION_EXERCISE_URL`.
    pub fn env_prefix(&self) -> &'static str {
        match self {
            Service::Case => "CASE",
            Service::CollectionExercise => "COLLECTION_EXERCISE",
            Service::CollectionInstrument => "COLLECTION_INSTRUMENT",
            Service::Iac => "IAC",
            Service::Sample => "SAMPLE",
            Service::Survey => "SURVEY",
        }
    }
}

impl std::fmt::Display for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Service::Case => "case service",
            Service::CollectionExercise => "collection exercise service",
            Service::CollectionInstrument => "collection instrument service",
            Service::Iac => "iac service",
            Service::Sample => "sample service",
            Service::Survey => "survey service",
        };
        f.write_str(name)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} not set")]
    Missing(String),
    #[error("{name} is not a valid URL: {source}")]
    InvalidUrl {
        name: String,
        #[source]
        source: url::ParseError,
    },
    #[error("{name} is not a valid number: {value}")]
    InvalidNumber { name: String, value: String },
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// HTTP basic auth credentials for one registry.
#[derive(Clone)]
pub struct BasicAuth {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for BasicAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BasicAuth")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Where a registry lives and how to authenticate against it.
#[derive(Clone, Debug)]
pub struct ServiceEndpoint {
    base_url: Url,
    auth: Option<BasicAuth>,
}

impl ServiceEndpoint {
    pub fn new(base_url: Url, auth: Option<BasicAuth>) -> Self {
        Self { base_url, auth }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn auth(&self) -> Option<&BasicAuth> {
        self.auth.as_ref()
    }

    /// Appends `segments` to the base path. Each segment is percent-encoded, so identifiers
    /// taken from user input cannot change the path structure.
    pub fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// The registry's own `/info` endpoint, used for readiness checks.
    pub fn status_url(&self) -> Url {
        self.url(&["info"])
    }
}

/// Base URLs and credentials of every registry.
#[derive(Clone, Debug)]
pub struct ServiceEndpoints {
    pub case: ServiceEndpoint,
    pub collection_exercise: ServiceEndpoint,
    pub collection_instrument: ServiceEndpoint,
    pub iac: ServiceEndpoint,
    pub sample: ServiceEndpoint,
    pub survey: ServiceEndpoint,
}

impl ServiceEndpoints {
    pub fn get(&self, service: Service) -> &ServiceEndpoint {
        match service {
            Service::Case => &self.case,
            Service::CollectionExercise => &self.collection_exercise,
            Service::CollectionInstrument => &self.collection_instrument,
            Service::Iac => &self.iac,
            Service::Sample => &self.sample,
            Service::Survey => &self.survey,
        }
    }
}

/// Application configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct AppConfig {
    host: String,
    port: u16,
    eq_url: Url,
    account_service_url: String,
    url_path_prefix: String,
    http_timeout: Duration,
    json_secret_keys: String,
    services: ServiceEndpoints,
}

impl AppConfig {
    /// Resolve configuration through `lookup`, typically `|k| std::env::var(k).ok()`.
    ///
    /// Empty values are treated as unset.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if:
    /// - a required variable is missing,
    /// - `EQ_URL` or a registry URL is not a valid base URL, or
    /// - `PORT` / `HTTP_TIMEOUT_SECS` are not numbers.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> ConfigResult<Self> {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let require = |name: &str| get(name).ok_or_else(|| ConfigError::Missing(name.into()));

        let host = get("HOST").unwrap_or_else(|| DEFAULT_HOST.into());
        let port = match get("PORT") {
            Some(value) => value.parse().map_err(|_| ConfigError::InvalidNumber {
                name: "PORT".into(),
                value,
            })?,
            None => DEFAULT_PORT,
        };
        let http_timeout = match get("HTTP_TIMEOUT_SECS") {
            Some(value) => Duration::from_secs(value.parse().map_err(|_| {
                ConfigError::InvalidNumber {
                    name: "HTTP_TIMEOUT_SECS".into(),
                    value,
                }
            })?),
            None => Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
        };

        let require_url = |name: &str| -> ConfigResult<Url> {
            let url = Url::parse(&require(name)?).map_err(|source| ConfigError::InvalidUrl {
                name: name.into(),
                source,
            })?;
            if url.cannot_be_a_base() {
                return Err(ConfigError::InvalidUrl {
                    name: name.into(),
                    source: url::ParseError::RelativeUrlWithCannotBeABaseBase,
                });
            }
            Ok(url)
        };

        let eq_url = require_url("EQ_URL")?;

        let endpoint = |service: Service| -> ConfigResult<ServiceEndpoint> {
            let prefix = service.env_prefix();
            let base_url = require_url(&format!("{prefix}_URL"))?;
            let auth = match (
                get(&format!("{prefix}_USERNAME")),
                get(&format!("{prefix}_PASSWORD")),
            ) {
                (Some(username), Some(password)) => Some(BasicAuth { username, password }),
                _ => None,
            };
            Ok(ServiceEndpoint::new(base_url, auth))
        };

        Ok(Self {
            host,
            port,
            eq_url,
            account_service_url: require("ACCOUNT_SERVICE_URL")?,
            url_path_prefix: normalise_prefix(get("URL_PATH_PREFIX").unwrap_or_default()),
            http_timeout,
            json_secret_keys: require("JSON_SECRET_KEYS")?,
            services: ServiceEndpoints {
                case: endpoint(Service::Case)?,
                collection_exercise: endpoint(Service::CollectionExercise)?,
                collection_instrument: endpoint(Service::CollectionInstrument)?,
                iac: endpoint(Service::Iac)?,
                sample: endpoint(Service::Sample)?,
                survey: endpoint(Service::Survey)?,
            },
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn eq_url(&self) -> &Url {
        &self.eq_url
    }

    /// Account service URL as sent to eQ: `ACCOUNT_SERVICE_URL` followed by the path prefix.
    pub fn account_service_url(&self) -> String {
        format!("{}{}", self.account_service_url, self.url_path_prefix)
    }

    /// Path prefix the index routes are mounted under. Empty or `/segment` without a trailing slash.
    pub fn url_path_prefix(&self) -> &str {
        &self.url_path_prefix
    }

    pub fn http_timeout(&self) -> Duration {
        self.http_timeout
    }

    pub fn json_secret_keys(&self) -> &str {
        &self.json_secret_keys
    }

    pub fn services(&self) -> &ServiceEndpoints {
        &self.services
    }
}

fn normalise_prefix(prefix: String) -> String {
    let trimmed = prefix.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{trimmed}")
    }
}
