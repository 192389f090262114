//! Institutional email validation and roll number extraction.
//!
//! Student addresses look like `name.<roll number>@<domain>`, for example
//! `aditya.220btccse004@sushantuniversity.edu.in`. The roll number is the part
//! of the local part after the last `.`.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::{fmt, sync::LazyLock};

pub const DEFAULT_EMAIL_DOMAIN: &str = "sushantuniversity.edu.in";

static ROLL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{3}[a-z]+\d{3}$").expect("static regex is valid"));

/// Canonical (lower-case) roll number, e.g. `220btccse004`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RollNumber(String);

impl RollNumber {
    /// Parse a raw roll number in any case. Returns `None` if it does not match
    /// three digits, letters, three digits.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let candidate = raw.trim().to_ascii_lowercase();
        ROLL_RE.is_match(&candidate).then_some(Self(candidate))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Upper-case form used for object keys and user-facing labels.
    #[must_use]
    pub fn to_upper(&self) -> String {
        self.0.to_ascii_uppercase()
    }
}

impl fmt::Display for RollNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for RollNumber {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or_else(|| format!("invalid roll number: {value}"))
    }
}

impl From<RollNumber> for String {
    fn from(value: RollNumber) -> Self {
        value.0
    }
}

/// Normalize an email for use as the OTP store key.
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Validates student emails against a single institutional domain.
#[derive(Clone, Debug)]
pub struct IdentityValidator {
    domain: String,
}

impl IdentityValidator {
    #[must_use]
    pub fn new(domain: &str) -> Self {
        Self {
            domain: domain.trim().trim_start_matches('@').to_ascii_lowercase(),
        }
    }

    #[must_use]
    pub fn domain(&self) -> &str {
        &self.domain
    }

    #[must_use]
    pub fn validate(&self, email: &str) -> bool {
        self.extract_roll_number(email).is_some()
    }

    /// Extract the roll number, or `None` when any rule fails.
    #[must_use]
    pub fn extract_roll_number(&self, email: &str) -> Option<RollNumber> {
        let email = email.trim().to_ascii_lowercase();
        let local = email.strip_suffix(&self.domain)?.strip_suffix('@')?;
        if local.contains('@') {
            return None;
        }

        let (_, candidate) = local.rsplit_once('.')?;
        RollNumber::parse(candidate)
    }
}

impl Default for IdentityValidator {
    fn default() -> Self {
        Self::new(DEFAULT_EMAIL_DOMAIN)
    }
}
