//! eQ launch payload construction.
//!
//! [`EqPayloadBuilder::build`] turns a validated case into the claim set eQ expects:
//! 1. The case itself is checked for every field the payload needs ([`CaseContext`]).
//! 2. The collection instrument, the collection exercise (followed by its events), and the
//!    sample attributes are fetched concurrently.
//! 3. The results are validated in that order, so the first problem reported is always the
//!    same for the same data.
//! 4. Claims are assembled into an [`EqClaimSet`].
//!
//! Every validation failure is [`SystemFailure::InvalidPayload`] carrying the diagnostic text,
//! except an ended collection exercise, which is [`Rejection::ExerciseClosed`].
//!
//! [`SystemFailure::InvalidPayload`]: crate::error::SystemFailure::InvalidPayload

use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::access_code::AccessCode;
use crate::constants::{
    CLAIM_TTL_SECS, COUNTRY_ATTRIBUTE, DISPLAY_ADDRESS_KEYS, EQ_INSTRUMENT_TYPE, EXERCISE_END_TAG,
    LANGUAGE_CODE, OPTIONAL_EVENT_CLAIMS,
};
use crate::error::{RedemptionError, RedemptionResult, Rejection};
use crate::models::{
    truthy, Case, CollectionExercise, CollectionInstrument, ExerciseEvent, SampleAttributes,
};
use crate::registry::RegistryClient;

/// The flat claim set handed to the signer.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EqClaimSet(Map<String, Value>);

impl EqClaimSet {
    pub fn get(&self, claim: &str) -> Option<&Value> {
        self.0.get(claim)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }

    fn insert(&mut self, claim: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(claim.into(), value.into());
    }
}

/// The fields of a case that the payload depends on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CaseContext {
    pub case_id: String,
    pub case_ref: String,
    pub sample_unit_ref: String,
    pub collection_instrument_id: String,
    pub collection_exercise_id: String,
    pub sample_unit_id: String,
}

impl CaseContext {
    /// Extracts the payload fields from `case`, checking them in a fixed order.
    ///
    /// # Errors
    ///
    /// Returns [`SystemFailure::InvalidPayload`](crate::error::SystemFailure::InvalidPayload)
    /// naming the first missing field.
    pub fn from_case(case: &Case) -> RedemptionResult<Self> {
        let group = case.case_group.as_ref();

        let case_id = required(case.id.as_ref(), || {
            "No case id in supplied case JSON".to_string()
        })?;
        let case_ref = required(case.case_ref.as_ref(), || {
            "No case ref in supplied case JSON".to_string()
        })?;
        let sample_unit_ref = required(group.and_then(|g| g.sample_unit_ref.as_ref()), || {
            format!("Could not retrieve sample unit ref for case {case_id}")
        })?;
        let collection_instrument_id = required(case.collection_instrument_id.as_ref(), || {
            format!("No collectionInstrumentId value for case id {case_id}")
        })?;
        let collection_exercise_id =
            required(group.and_then(|g| g.collection_exercise_id.as_ref()), || {
                format!("No collection id for case id {case_id}")
            })?;
        let sample_unit_id = required(case.sample_unit_id.as_ref(), || {
            format!("No sample unit id for case {case_id}")
        })?;

        Ok(Self {
            case_id,
            case_ref,
            sample_unit_ref,
            collection_instrument_id,
            collection_exercise_id,
            sample_unit_id,
        })
    }
}

fn required(
    value: Option<&String>,
    message: impl FnOnce() -> String,
) -> RedemptionResult<String> {
    value
        .cloned()
        .ok_or_else(|| RedemptionError::invalid_payload(message()))
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InstrumentDetails {
    pub eq_id: String,
    pub form_type: String,
}

impl InstrumentDetails {
    pub fn validate(
        context: &CaseContext,
        instrument: &CollectionInstrument,
    ) -> RedemptionResult<Self> {
        let ci_id = &context.collection_instrument_id;
        let case_id = &context.case_id;

        match instrument.instrument_type.as_deref() {
            None => {
                return Err(RedemptionError::invalid_payload(format!(
                    "No Collection Instrument type for {ci_id}"
                )));
            }
            Some(kind) if kind != EQ_INSTRUMENT_TYPE => {
                return Err(RedemptionError::invalid_payload(format!(
                    "Collection instrument {ci_id} type is not EQ"
                )));
            }
            Some(_) => {}
        }

        let classifiers = instrument.classifiers.as_ref().ok_or_else(|| {
            RedemptionError::invalid_payload(format!(
                "Could not retrieve classifiers for case {case_id}"
            ))
        })?;
        let eq_id = required(classifiers.eq_id.as_ref(), || {
            format!("Could not retrieve eq_id for case {case_id}")
        })?;
        let form_type = required(classifiers.form_type.as_ref(), || {
            format!("Could not retrieve form_type for eq_id {eq_id}")
        })?;

        Ok(Self { eq_id, form_type })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExerciseDetails {
    /// Collection exercise id as reported by the collection exercise registry.
    pub id: String,
    /// `exerciseRef`, sent to eQ as `period_id`.
    pub period_id: String,
}

impl ExerciseDetails {
    pub fn validate(
        context: &CaseContext,
        exercise: &CollectionExercise,
    ) -> RedemptionResult<Self> {
        let case_id = &context.case_id;
        let period_id = required(exercise.exercise_ref.as_ref(), || {
            format!("Could not retrieve period id for case {case_id}")
        })?;
        let id = required(exercise.id.as_ref(), || {
            format!("Could not retrieve ce id for case {case_id}")
        })?;
        Ok(Self { id, period_id })
    }
}

/// Formatted collection exercise dates to be sent as claims.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventDates {
    pub exercise_end: String,
    /// `(claim, date)` pairs for the optional events that were present.
    pub optional: Vec<(&'static str, String)>,
}

impl EventDates {
    /// Resolves event dates, rejecting an exercise whose end is before `now`.
    ///
    /// # Errors
    ///
    /// - [`Rejection::ExerciseClosed`] if `exercise_end` has passed.
    /// - `InvalidPayload` if `exercise_end` is absent or any used timestamp cannot be parsed.
    pub fn resolve(
        collection_exercise_id: &str,
        events: &[ExerciseEvent],
        now: DateTime<Utc>,
    ) -> RedemptionResult<Self> {
        let exercise_end = match find_event_timestamp(events, EXERCISE_END_TAG) {
            Some(timestamp) => {
                let end = parse_date(timestamp)?;
                if now > end {
                    return Err(Rejection::ExerciseClosed {
                        collection_exercise_id: collection_exercise_id.to_string(),
                    }
                    .into());
                }
                format_date(&end)
            }
            None => {
                return Err(RedemptionError::invalid_payload(format!(
                    "Mandatory event not found for collection {collection_exercise_id} for search param {EXERCISE_END_TAG}"
                )));
            }
        };

        let mut optional = Vec::new();
        for (tag, claim) in OPTIONAL_EVENT_CLAIMS {
            if let Some(timestamp) = find_event_timestamp(events, tag) {
                optional.push((claim, format_date(&parse_date(timestamp)?)));
            }
        }

        Ok(Self {
            exercise_end,
            optional,
        })
    }
}

/// First event with `tag` whose timestamp is present and non-empty.
fn find_event_timestamp<'a>(events: &'a [ExerciseEvent], tag: &str) -> Option<&'a str> {
    events
        .iter()
        .filter(|event| event.tag == tag)
        .find_map(|event| event.timestamp.as_deref().filter(|ts| !ts.is_empty()))
}

const OFFSET_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f%#z",
    "%Y-%m-%dT%H:%M%#z",
    "%Y%m%dT%H%M%S%.f%#z",
    "%Y%m%dT%H%M%#z",
];

const UTC_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y%m%dT%H%M%S%.f",
    "%Y%m%dT%H%M",
];

const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%Y%m%d"];

/// Parses an ISO-8601 timestamp into local time.
///
/// Extended (`2018-06-01T12:00:00`) and basic (`20180601T120000`) forms are accepted, with or
/// without seconds and fractional seconds. Offsets may be written `Z`, `+01:00`, `+0100` or
/// `+01`. Timestamps without an offset, and bare dates, are taken as UTC.
///
/// # Errors
///
/// Returns `InvalidPayload("Unable to parse {value}")` if no format matches.
pub fn parse_date(value: &str) -> RedemptionResult<DateTime<Local>> {
    parse_utc(value)
        .map(|dt| dt.with_timezone(&Local))
        .ok_or_else(|| RedemptionError::invalid_payload(format!("Unable to parse {value}")))
}

fn parse_utc(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Some(dt) = OFFSET_FORMATS
        .iter()
        .find_map(|format| DateTime::parse_from_str(value, format).ok())
    {
        return Some(dt.with_timezone(&Utc));
    }

    let utc = value
        .strip_suffix('Z')
        .or_else(|| value.strip_suffix('z'))
        .unwrap_or(value);
    if let Some(dt) = UTC_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(utc, format).ok())
    {
        return Some(dt.and_utc());
    }

    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(value, format).ok())
        .map(|date| date.and_time(NaiveTime::MIN).and_utc())
}

/// Formats a date as `YYYY-MM-DD`.
pub fn format_date(date: &DateTime<Local>) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// URL-safe, padded base64 of the SHA-256 of `case_id|collection_exercise_id|code`.
pub fn build_response_id(case_id: &str, collection_exercise_id: &str, code: &str) -> String {
    let digest = Sha256::digest(format!("{case_id}|{collection_exercise_id}|{code}").as_bytes());
    URL_SAFE.encode(digest)
}

/// Lower-cases an attribute name and strips leading underscores.
pub fn caps_to_snake(name: &str) -> String {
    name.to_lowercase().trim_start_matches('_').to_string()
}

/// Joins the first two non-empty address attributes, in [`DISPLAY_ADDRESS_KEYS`] order.
///
/// # Errors
///
/// Returns `InvalidPayload` if none of the address attributes has a value.
pub fn build_display_address(attributes: &Map<String, Value>) -> RedemptionResult<String> {
    let parts: Vec<String> = DISPLAY_ADDRESS_KEYS
        .iter()
        .filter_map(|key| attributes.get(*key).filter(|value| truthy(value)))
        .map(|value| match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .take(2)
        .collect();

    if parts.is_empty() {
        return Err(RedemptionError::invalid_payload(
            "Displayable address not in sample attributes",
        ));
    }
    Ok(parts.join(", "))
}

/// Everything the claim set is built from, after validation.
#[derive(Clone, Debug)]
pub struct ValidatedPayload {
    pub context: CaseContext,
    pub instrument: InstrumentDetails,
    pub exercise: ExerciseDetails,
    pub dates: EventDates,
    pub attributes: Map<String, Value>,
    pub country_code: Value,
    pub display_address: String,
    pub response_id: String,
}

impl ValidatedPayload {
    /// Validates fetched resources in payload order.
    ///
    /// The collection instrument is checked first, then the collection exercise and its events,
    /// then the sample attributes. Upstream errors for a resource surface at that resource's turn.
    pub fn validate(
        context: CaseContext,
        code: &AccessCode,
        instrument: RedemptionResult<CollectionInstrument>,
        exercise: RedemptionResult<(ExerciseDetails, Vec<ExerciseEvent>)>,
        sample: RedemptionResult<SampleAttributes>,
        now: DateTime<Utc>,
    ) -> RedemptionResult<Self> {
        let instrument = InstrumentDetails::validate(&context, &instrument?)?;

        let (exercise, events) = exercise?;
        let dates = EventDates::resolve(&exercise.id, &events, now)?;

        let attributes = sample?.attributes.ok_or_else(|| {
            RedemptionError::invalid_payload(format!(
                "Could not retrieve attributes for case {}",
                context.case_id
            ))
        })?;
        let country_code = attributes.get(COUNTRY_ATTRIBUTE).cloned().ok_or_else(|| {
            RedemptionError::invalid_payload(format!(
                "Could not retrieve country_code for case {}",
                context.case_id
            ))
        })?;
        let display_address = build_display_address(&attributes)?;
        let response_id = build_response_id(&context.case_id, &exercise.id, code.as_str());

        Ok(Self {
            context,
            instrument,
            exercise,
            dates,
            attributes,
            country_code,
            display_address,
            response_id,
        })
    }

    /// Assembles the claim set. Sample attributes are added after the fixed claims and may
    /// overwrite them; event dates are added last.
    pub fn into_claims(
        self,
        tx_id: Uuid,
        account_service_url: &str,
        now: DateTime<Utc>,
    ) -> EqClaimSet {
        let iat = now.timestamp();
        let context = self.context;

        let mut claims = EqClaimSet::default();
        claims.insert("jti", Uuid::new_v4().to_string());
        claims.insert("tx_id", tx_id.to_string());
        claims.insert("user_id", context.sample_unit_id);
        claims.insert("iat", iat);
        claims.insert("exp", iat + CLAIM_TTL_SECS);
        claims.insert("eq_id", self.instrument.eq_id);
        claims.insert("period_id", self.exercise.period_id);
        claims.insert("form_type", self.instrument.form_type);
        claims.insert("collection_exercise_sid", self.exercise.id);
        claims.insert("ru_ref", context.sample_unit_ref);
        claims.insert("case_id", context.case_id);
        claims.insert("case_ref", context.case_ref);
        claims.insert("account_service_url", account_service_url);
        claims.insert("country_code", self.country_code);
        claims.insert("language_code", LANGUAGE_CODE);
        claims.insert("display_address", self.display_address);
        claims.insert("response_id", self.response_id);

        for (name, value) in self.attributes {
            claims.insert(caps_to_snake(&name), value);
        }

        claims.insert(EXERCISE_END_TAG, self.dates.exercise_end);
        for (claim, date) in self.dates.optional {
            claims.insert(claim, date);
        }

        claims
    }
}

/// Builds eQ claim sets against the registries.
pub struct EqPayloadBuilder<'a> {
    registry: &'a RegistryClient,
    account_service_url: &'a str,
}

impl<'a> EqPayloadBuilder<'a> {
    pub fn new(registry: &'a RegistryClient, account_service_url: &'a str) -> Self {
        Self {
            registry,
            account_service_url,
        }
    }

    /// Builds the claim set for `case`, redeemed with `code`.
    ///
    /// # Errors
    ///
    /// - `InvalidPayload` with the diagnostic for the first missing or invalid field.
    /// - [`Rejection::ExerciseClosed`] if the collection exercise has ended.
    /// - Any registry error from the fetches.
    pub async fn build(&self, case: &Case, code: &AccessCode) -> RedemptionResult<EqClaimSet> {
        if code.as_str().is_empty() {
            return Err(RedemptionError::invalid_payload("IAC is empty"));
        }
        let context = CaseContext::from_case(case)?;
        let tx_id = Uuid::new_v4();

        tracing::info!(case_id = %context.case_id, tx_id = %tx_id, "Creating payload for JWT");

        let (instrument, exercise, sample) = tokio::join!(
            self.registry
                .get_collection_instrument(&context.collection_instrument_id),
            self.fetch_exercise(&context),
            self.registry.get_sample_attributes(&context.sample_unit_id),
        );

        let now = Utc::now();
        let payload = ValidatedPayload::validate(context, code, instrument, exercise, sample, now)?;

        tracing::debug!(
            case_id = %payload.context.case_id,
            collex_id = %payload.exercise.id,
            tx_id = %tx_id,
            "Payload validated"
        );

        Ok(payload.into_claims(tx_id, self.account_service_url, now))
    }

    /// Fetches and validates the collection exercise, then fetches its events by the id the
    /// registry reported.
    async fn fetch_exercise(
        &self,
        context: &CaseContext,
    ) -> RedemptionResult<(ExerciseDetails, Vec<ExerciseEvent>)> {
        let exercise = self
            .registry
            .get_collection_exercise(&context.collection_exercise_id)
            .await?;
        let details = ExerciseDetails::validate(context, &exercise)?;
        let events = self
            .registry
            .get_collection_exercise_events(&details.id)
            .await?;
        Ok((details, events))
    }
}
