//! Access code redemption.
//!
//! A redemption walks a fixed sequence of stages. Each stage is a value that owns what the next
//! stage needs and is consumed by the transition to it, so a later stage cannot run on data an
//! earlier stage has not checked:
//!
//! `Start → CodeJoined → IacFetched → CaseValidated → CaseFetched → PayloadBuilt → Signed → Redirected`
//!
//! Any transition may fail, which aborts the redemption with an [`Aborted`] naming the last
//! stage reached.

use std::sync::Arc;

use rh_signing::ClaimSigner;
use url::Url;

use crate::access_code::{AccessCode, AccessCodeForm};
use crate::config::{AppConfig, Service};
use crate::constants::{EQ_LAUNCH_CATEGORY, HOUSEHOLD_SAMPLE_UNIT_TYPE};
use crate::eq::{EqClaimSet, EqPayloadBuilder};
use crate::error::{BadResponse, RedemptionError, RedemptionResult, Rejection, SystemFailure};
use crate::models::{Case, CaseEvent, IacRecord};
use crate::registry::RegistryClient;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RedemptionStage {
    Start,
    CodeJoined,
    IacFetched,
    CaseValidated,
    CaseFetched,
    PayloadBuilt,
    Signed,
    Redirected,
}

impl std::fmt::Display for RedemptionStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RedemptionStage::Start => "start",
            RedemptionStage::CodeJoined => "code joined",
            RedemptionStage::IacFetched => "iac fetched",
            RedemptionStage::CaseValidated => "case validated",
            RedemptionStage::CaseFetched => "case fetched",
            RedemptionStage::PayloadBuilt => "payload built",
            RedemptionStage::Signed => "signed",
            RedemptionStage::Redirected => "redirected",
        };
        f.write_str(name)
    }
}

/// A redemption that stopped before the redirect.
#[derive(Debug, thiserror::Error)]
#[error("redemption aborted after {stage}: {error}")]
pub struct Aborted {
    /// The last stage that completed.
    pub stage: RedemptionStage,
    #[source]
    pub error: RedemptionError,
}

/// A successful redemption: where to send the respondent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Redirect {
    pub case_id: String,
    pub location: Url,
}

struct CodeJoined {
    code: AccessCode,
}

struct IacFetched {
    code: AccessCode,
    iac: IacRecord,
}

struct CaseValidated {
    code: AccessCode,
    case_id: String,
}

struct CaseFetched {
    code: AccessCode,
    case_id: String,
    case: Case,
}

struct PayloadBuilt {
    case_id: String,
    claims: EqClaimSet,
}

struct Signed {
    case_id: String,
    token: String,
}

impl CodeJoined {
    fn from_form(form: &AccessCodeForm) -> RedemptionResult<Self> {
        Ok(Self {
            code: AccessCode::from_form(form)?,
        })
    }

    async fn fetch_iac(self, registry: &RegistryClient) -> RedemptionResult<IacFetched> {
        let iac = registry.get_iac(&self.code).await?;
        Ok(IacFetched {
            code: self.code,
            iac,
        })
    }
}

impl IacFetched {
    fn validate(self) -> RedemptionResult<CaseValidated> {
        let case_id = self.iac.case_id.clone().ok_or(SystemFailure::MissingCaseId)?;
        if !self.iac.is_active() {
            return Err(Rejection::CodeAlreadyUsed.into());
        }
        Ok(CaseValidated {
            code: self.code,
            case_id,
        })
    }
}

impl CaseValidated {
    async fn fetch_case(self, registry: &RegistryClient) -> RedemptionResult<CaseFetched> {
        let case = registry.get_case(&self.case_id).await.inspect_err(|_| {
            tracing::error!(case_id = %self.case_id, "Error retrieving case");
        })?;

        match case.sample_unit_type.as_deref() {
            None => {
                let url = registry
                    .services()
                    .get(Service::Case)
                    .url(&["cases", &self.case_id]);
                return Err(SystemFailure::BadUpstreamResponse {
                    service: Service::Case,
                    url: url.to_string(),
                    reason: BadResponse::MissingField("sampleUnitType"),
                }
                .into());
            }
            Some(kind) if kind != HOUSEHOLD_SAMPLE_UNIT_TYPE => {
                return Err(Rejection::UnexpectedSampleUnitType {
                    sample_unit_type: kind.to_string(),
                }
                .into());
            }
            Some(_) => {}
        }

        Ok(CaseFetched {
            code: self.code,
            case_id: self.case_id,
            case,
        })
    }
}

impl CaseFetched {
    async fn build_payload(
        self,
        registry: &RegistryClient,
        account_service_url: &str,
    ) -> RedemptionResult<PayloadBuilt> {
        let claims = EqPayloadBuilder::new(registry, account_service_url)
            .build(&self.case, &self.code)
            .await?;
        Ok(PayloadBuilt {
            case_id: self.case_id,
            claims,
        })
    }
}

impl PayloadBuilt {
    fn sign(self, signer: &dyn ClaimSigner) -> RedemptionResult<Signed> {
        let token = signer.sign(self.claims.as_map())?;
        Ok(Signed {
            case_id: self.case_id,
            token,
        })
    }
}

impl Signed {
    /// Records the launch against the case, then builds the eQ session URL.
    async fn redirect(self, registry: &RegistryClient, eq_url: &Url) -> RedemptionResult<Redirect> {
        let event = CaseEvent::new(
            EQ_LAUNCH_CATEGORY,
            format!("Respondent launched eQ for case {}", self.case_id),
        );
        registry
            .post_case_event(&self.case_id, &event)
            .await
            .inspect_err(|_| {
                tracing::error!(case_id = %self.case_id, "Error posting case event");
            })?;

        Ok(Redirect {
            location: session_url(eq_url, &self.token),
            case_id: self.case_id,
        })
    }
}

/// `{eq_url}/session?token={token}`.
pub fn session_url(eq_url: &Url, token: &str) -> Url {
    let mut url = eq_url.clone();
    if let Ok(mut path) = url.path_segments_mut() {
        path.pop_if_empty().push("session");
    }
    url.query_pairs_mut().clear().append_pair("token", token);
    url
}

/// Redeems access codes against the registries.
#[derive(Clone)]
pub struct Redeemer {
    cfg: Arc<AppConfig>,
    registry: RegistryClient,
    signer: Arc<dyn ClaimSigner>,
}

impl Redeemer {
    /// Creates a redeemer.
    ///
    /// # Arguments
    ///
    /// * `cfg` - Resolved configuration; supplies the eQ and account service URLs.
    /// * `registry` - Client for the backend registries.
    /// * `signer` - Signs the claim set handed to eQ.
    pub fn new(
        cfg: Arc<AppConfig>,
        registry: RegistryClient,
        signer: Arc<dyn ClaimSigner>,
    ) -> Self {
        Self {
            cfg,
            registry,
            signer,
        }
    }

    pub fn registry(&self) -> &RegistryClient {
        &self.registry
    }

    /// Runs a full redemption for a submitted form.
    ///
    /// # Returns
    ///
    /// The eQ session URL carrying the signed token.
    ///
    /// # Errors
    ///
    /// Returns [`Aborted`] with the last completed stage and the error that stopped the
    /// redemption. The error is not logged here; pass it to [`crate::translate`].
    pub async fn redeem(&self, form: &AccessCodeForm) -> Result<Redirect, Aborted> {
        let mut stage = RedemptionStage::Start;
        let result = self.run(form, &mut stage).await;
        result.map_err(|error| Aborted { stage, error })
    }

    async fn run(
        &self,
        form: &AccessCodeForm,
        stage: &mut RedemptionStage,
    ) -> RedemptionResult<Redirect> {
        let registry = &self.registry;

        let joined = CodeJoined::from_form(form)?;
        *stage = RedemptionStage::CodeJoined;

        let fetched = joined.fetch_iac(registry).await?;
        *stage = RedemptionStage::IacFetched;

        let validated = fetched.validate()?;
        *stage = RedemptionStage::CaseValidated;

        let case = validated.fetch_case(registry).await?;
        *stage = RedemptionStage::CaseFetched;

        let account_service_url = self.cfg.account_service_url();
        let built = case.build_payload(registry, &account_service_url).await?;
        *stage = RedemptionStage::PayloadBuilt;

        let signed = built.sign(self.signer.as_ref())?;
        *stage = RedemptionStage::Signed;

        let redirect = signed.redirect(registry, self.cfg.eq_url()).await?;
        *stage = RedemptionStage::Redirected;

        tracing::info!(case_id = %redirect.case_id, "Redirecting to eQ");
        Ok(redirect)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_session_url() {
        let eq = Url::parse("https://eq.example").unwrap();
        let url = session_url(&eq, "a.b.c");
        assert_eq!(url.as_str(), "https://eq.example/session?token=a.b.c");

        let eq = Url::parse("https://eq.example/launch/").unwrap();
        let url = session_url(&eq, "a.b.c");
        assert_eq!(url.as_str(), "https://eq.example/launch/session?token=a.b.c");
    }

    #[test]
    fn test_iac_validation_requires_case_id() {
        let fetched = IacFetched {
            code: AccessCode::join(["abcd", "efgh", "ijkl"]).unwrap(),
            iac: serde_json::from_value(json!({ "active": true })).unwrap(),
        };
        let err = fetched.validate().err().unwrap();
        assert!(matches!(
            err,
            RedemptionError::SystemFailure(SystemFailure::MissingCaseId)
        ));
    }

    #[test]
    fn test_iac_validation_rejects_inactive_code() {
        let fetched = IacFetched {
            code: AccessCode::join(["abcd", "efgh", "ijkl"]).unwrap(),
            iac: serde_json::from_value(json!({ "caseId": "c1", "active": false })).unwrap(),
        };
        let err = fetched.validate().err().unwrap();
        assert!(matches!(
            err,
            RedemptionError::Rejection(Rejection::CodeAlreadyUsed)
        ));
    }

    #[test]
    fn test_iac_validation_passes_case_id() {
        let fetched = IacFetched {
            code: AccessCode::join(["abcd", "efgh", "ijkl"]).unwrap(),
            iac: serde_json::from_value(json!({ "caseId": "c1", "active": "1" })).unwrap(),
        };
        let validated = fetched.validate().unwrap();
        assert_eq!(validated.case_id, "c1");
    }

    #[test]
    fn test_stage_display() {
        assert_eq!(RedemptionStage::CaseFetched.to_string(), "case fetched");
    }
}
