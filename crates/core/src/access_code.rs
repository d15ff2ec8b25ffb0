//! Access code handling.
//!
//! The paper letter prints the 12 character code in three groups, and the entry form has one
//! input per group. [`AccessCode::join`] turns those inputs back into the canonical code.

use serde::Deserialize;

use crate::constants::ACCESS_CODE_LENGTH;
use crate::error::{RedemptionResult, Rejection};

/// The access code entry form. Any other submitted field (the submit action) is ignored.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct AccessCodeForm {
    #[serde(default)]
    pub iac1: Option<String>,
    #[serde(default)]
    pub iac2: Option<String>,
    #[serde(default)]
    pub iac3: Option<String>,
}

impl AccessCodeForm {
    /// The three groups in form order. Missing groups are empty.
    pub fn fields(&self) -> [&str; 3] {
        [
            self.iac1.as_deref().unwrap_or_default(),
            self.iac2.as_deref().unwrap_or_default(),
            self.iac3.as_deref().unwrap_or_default(),
        ]
    }
}

/// A canonical (lower-cased, joined) access code.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessCode(String);

impl AccessCode {
    /// Lower-cases and concatenates the three groups in order.
    ///
    /// Only the minimum length is enforced. Longer input is passed through unchanged and left
    /// for the access code registry to reject.
    ///
    /// # Errors
    ///
    /// Returns [`Rejection::MalformedCode`] if the joined code is shorter than
    /// [`ACCESS_CODE_LENGTH`].
    pub fn join(fields: [&str; 3]) -> RedemptionResult<Self> {
        let code = fields.concat().to_lowercase();
        if code.chars().count() < ACCESS_CODE_LENGTH {
            return Err(Rejection::MalformedCode.into());
        }
        Ok(Self(code))
    }

    pub fn from_form(form: &AccessCodeForm) -> RedemptionResult<Self> {
        Self::join(form.fields())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The code with everything after the first group masked, for logs and error detail.
    pub fn redacted(&self) -> String {
        let visible: String = self.0.chars().take(4).collect();
        format!("{visible}********")
    }
}

impl std::fmt::Debug for AccessCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AccessCode({})", self.redacted())
    }
}

impl AsRef<str> for AccessCode {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
