//! Constants used throughout the RH core crate.
//!
//! Fixed values shared by the redemption pipeline and the payload builder, kept in one place so
//! the registries' vocabulary is spelled the same way everywhere.

/// Minimum length of a joined access code.
pub const ACCESS_CODE_LENGTH: usize = 12;

/// Sample unit type of a household case.
pub const HOUSEHOLD_SAMPLE_UNIT_TYPE: &str = "H";

/// Collection instrument type launched through eQ.
pub const EQ_INSTRUMENT_TYPE: &str = "EQ";

/// Language claim sent to eQ. Sample attributes do not carry a language yet.
pub const LANGUAGE_CODE: &str = "en";

/// Lifetime of a launch token in seconds.
pub const CLAIM_TTL_SECS: i64 = 5 * 60;

/// Category of the audit event posted to the case registry on launch.
pub const EQ_LAUNCH_CATEGORY: &str = "EQ_LAUNCH";

/// `createdBy` value on case events raised by this service.
pub const CASE_EVENT_CREATED_BY: &str = "RESPONDENT_HOME";

/// Path segments of the collection instrument lookup, before the instrument id.
pub const COLLECTION_INSTRUMENT_PATH: [&str; 4] = [
    "collection-instrument-api",
    "1.0.2",
    "collectioninstrument",
    "id",
];

/// Event tag marking the end of a collection exercise. Its date is also sent as a claim of the
/// same name.
pub const EXERCISE_END_TAG: &str = "exercise_end";

/// Optional collection exercise event tags and the claim each one populates.
pub const OPTIONAL_EVENT_CLAIMS: [(&str, &str); 3] = [
    ("ref_period_start", "ref_p_start_date"),
    ("ref_period_end", "ref_p_end_date"),
    ("return_by", "return_by"),
];

/// Sample attributes considered for `display_address`, in priority order.
pub const DISPLAY_ADDRESS_KEYS: [&str; 5] = [
    "ADDRESS_LINE1",
    "ADDRESS_LINE2",
    "LOCALITY",
    "TOWN_NAME",
    "POSTCODE",
];

/// Sample attribute holding the country code.
pub const COUNTRY_ATTRIBUTE: &str = "COUNTRY";

/// Default downstream request timeout in seconds.
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 10;

/// Default listen host.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default listen port.
pub const DEFAULT_PORT: u16 = 9092;
