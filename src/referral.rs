//! Referral codes: derivation from an email address and validation of
//! codes arriving from untrusted places (query strings, cookies, metadata).

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};

use crate::error::LedgerError;

/// Shortest accepted referral code.
pub const MIN_CODE_LEN: usize = 2;
/// Longest accepted referral code.
pub const MAX_CODE_LEN: usize = 64;

const LOCAL_PART_MAX: usize = 12;
const SUFFIX_LEN: usize = 8;
const FALLBACK_LOCAL: &str = "aff";

/// Returns true iff `code` is 2..=64 ASCII letters, digits, `_` or `-`.
pub fn is_valid_referral_code(code: &str) -> bool {
    (MIN_CODE_LEN..=MAX_CODE_LEN).contains(&code.len())
        && code
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

/// A validated referral code identifying one affiliate.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ReferralCode(String);

impl ReferralCode {
    /// Validates an untrusted value. Invalid input yields `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        is_valid_referral_code(raw).then(|| Self(raw.to_owned()))
    }

    /// Derives the referral code for an account email.
    ///
    /// The code is `<local>-<suffix>` where `<local>` is the alphanumeric
    /// part of the lowercased local part (at most 12 chars, `aff` when
    /// nothing survives) and `<suffix>` is the first 8 alphanumerics of the
    /// unpadded URL-safe base64 of the lowercased email. The same email
    /// always yields the same code.
    pub fn from_email(email: &str) -> Self {
        let email = email.to_lowercase();
        let local_part = email.split('@').next().unwrap_or_default();

        let local: String = local_part
            .chars()
            .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
            .take(LOCAL_PART_MAX)
            .collect();

        let suffix: String = URL_SAFE_NO_PAD
            .encode(email.as_bytes())
            .chars()
            .filter(char::is_ascii_alphanumeric)
            .take(SUFFIX_LEN)
            .collect::<String>()
            .to_ascii_lowercase();

        let local = if local.is_empty() { FALLBACK_LOCAL } else { &local };
        let mut code = format!("{local}-{suffix}");
        code.truncate(MAX_CODE_LEN);

        Self::parse(&code).unwrap_or_else(|| Self(format!("{FALLBACK_LOCAL}-{suffix}")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ReferralCode {
    type Error = LedgerError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if is_valid_referral_code(&value) {
            Ok(Self(value))
        } else {
            Err(LedgerError::InvalidReferralCode)
        }
    }
}

impl From<ReferralCode> for String {
    fn from(code: ReferralCode) -> Self {
        code.0
    }
}

impl AsRef<str> for ReferralCode {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReferralCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Derives the referral code for an account email.
pub fn generate_referral_code(email: &str) -> ReferralCode {
    ReferralCode::from_email(email)
}
