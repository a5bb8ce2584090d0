//! Affiliate state stored on the payment provider's customer metadata.
//!
//! The metadata map has no schema, so every field is validated on read and
//! anything unusable degrades to "not an affiliate" or the default rate.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::commission::CommissionRate;
use crate::referral::ReferralCode;
use crate::types::Metadata;

pub const META_STATUS: &str = "affiliateStatus";
pub const META_REF: &str = "affiliateRef";
pub const META_APPLIED_AT: &str = "affiliateAppliedAt";
pub const META_COMMISSION_BPS: &str = "affiliateCommissionBps";

const STATUS_ACTIVE: &str = "active";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AffiliateStatus {
    Active,
    None,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AffiliateProfile {
    pub status: AffiliateStatus,
    /// Present iff `status` is active.
    #[serde(rename = "ref", skip_serializing_if = "Option::is_none")]
    pub code: Option<ReferralCode>,
    #[serde(rename = "commission_bps")]
    pub commission_rate: CommissionRate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub applied_at: Option<DateTime<Utc>>,
}

impl AffiliateProfile {
    /// Profile of someone with no customer record yet.
    pub fn none() -> Self {
        Self {
            status: AffiliateStatus::None,
            code: None,
            commission_rate: CommissionRate::DEFAULT,
            applied_at: None,
        }
    }

    /// Reads a profile from customer metadata.
    pub fn from_metadata(metadata: &Metadata) -> Self {
        let code = metadata.get(META_REF).and_then(|raw| {
            let code = ReferralCode::parse(raw);
            if code.is_none() {
                debug!("ignoring invalid stored affiliate ref");
            }
            code
        });
        let active = metadata.get(META_STATUS).map(String::as_str) == Some(STATUS_ACTIVE);

        let commission_rate = metadata
            .get(META_COMMISSION_BPS)
            .and_then(|raw| raw.trim().parse::<i64>().ok())
            .and_then(|bps| CommissionRate::try_from_bps(bps).ok())
            .unwrap_or_default();

        let applied_at = metadata
            .get(META_APPLIED_AT)
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|ts| ts.with_timezone(&Utc));

        match code {
            Some(code) if active => Self {
                status: AffiliateStatus::Active,
                code: Some(code),
                commission_rate,
                applied_at,
            },
            _ => Self {
                commission_rate,
                applied_at,
                ..Self::none()
            },
        }
    }

    /// Activates the affiliate program for `email`.
    ///
    /// Keeps the first application time and any rate already negotiated on
    /// an active profile, so applying twice changes nothing.
    pub fn activate(current: &Self, email: &str, now: DateTime<Utc>) -> Self {
        let commission_rate = match current.status {
            AffiliateStatus::Active => current.commission_rate,
            AffiliateStatus::None => CommissionRate::DEFAULT,
        };
        Self {
            status: AffiliateStatus::Active,
            code: Some(ReferralCode::from_email(email)),
            commission_rate,
            applied_at: Some(current.applied_at.unwrap_or(now)),
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == AffiliateStatus::Active
    }

    /// Writes this profile's keys into `metadata`, leaving other keys alone.
    pub fn write_into(&self, metadata: &mut Metadata) {
        let status = match self.status {
            AffiliateStatus::Active => STATUS_ACTIVE,
            AffiliateStatus::None => "none",
        };
        metadata.insert(META_STATUS.to_string(), status.to_string());
        match &self.code {
            Some(code) => metadata.insert(META_REF.to_string(), code.to_string()),
            None => metadata.remove(META_REF),
        };
        metadata.insert(
            META_COMMISSION_BPS.to_string(),
            self.commission_rate.bps().to_string(),
        );
        // A readable stored time wins; an unreadable one is replaced.
        let stored_is_valid = metadata
            .get(META_APPLIED_AT)
            .is_some_and(|raw| DateTime::parse_from_rfc3339(raw).is_ok());
        if !stored_is_valid {
            if let Some(applied_at) = self.applied_at {
                metadata.insert(META_APPLIED_AT.to_string(), applied_at.to_rfc3339());
            }
        }
    }
}
