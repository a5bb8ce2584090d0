use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::referral::ReferralCode;

/// Free-form string metadata attached to customer and checkout records.
pub type Metadata = BTreeMap<String, String>;

/// Metadata key carrying the referral code on a checkout session.
pub const META_AFFILIATE_REF: &str = "affiliateRef";
/// Metadata key carrying the purchased package on a checkout session.
pub const META_PACKAGE_KEY: &str = "packageKey";
/// Metadata key carrying the buyer's locale on a checkout session.
pub const META_LOCALE: &str = "locale";
/// Metadata key carrying the buyer's email on a checkout session.
pub const META_USER_EMAIL: &str = "userEmail";

/// Payment state reported by the payment provider.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PaymentStatus {
    Paid,
    Unpaid,
    NoPaymentRequired,
    /// Any status this service does not interpret.
    Other(String),
}

impl PaymentStatus {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Paid => "paid",
            Self::Unpaid => "unpaid",
            Self::NoPaymentRequired => "no_payment_required",
            Self::Other(s) => s,
        }
    }
}

impl From<String> for PaymentStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "paid" => Self::Paid,
            "unpaid" => Self::Unpaid,
            "no_payment_required" => Self::NoPaymentRequired,
            _ => Self::Other(value),
        }
    }
}

impl From<PaymentStatus> for String {
    fn from(status: PaymentStatus) -> Self {
        status.as_str().to_owned()
    }
}

/// A checkout session as read from the payment provider. Read-only here.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub id: String,
    pub created_at: DateTime<Utc>,
    /// Total in minor currency units; absent totals count as zero.
    pub amount_total: Option<u64>,
    pub currency: String,
    pub payment_status: PaymentStatus,
    pub metadata: Metadata,
}

impl PaymentRecord {
    /// The attributed referral code, if the metadata carries a valid one.
    pub fn affiliate_ref(&self) -> Option<ReferralCode> {
        self.metadata
            .get(META_AFFILIATE_REF)
            .and_then(|raw| ReferralCode::parse(raw))
    }

    pub fn is_paid(&self) -> bool {
        self.payment_status == PaymentStatus::Paid
    }
}

/// The payment provider's customer record, keyed by email.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Customer {
    pub id: String,
    pub email: String,
    pub name: Option<String>,
    pub metadata: Metadata,
}

/// Input for opening a new checkout session.
#[derive(Clone, Debug)]
pub struct NewCheckoutSession {
    pub customer_id: String,
    pub amount_total: u64,
    pub currency: String,
    pub metadata: Metadata,
}

/// Per-referrer totals derived from payment records. Never persisted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AffiliateSummary {
    /// The referral code the totals belong to.
    #[serde(rename = "ref")]
    pub code: ReferralCode,
    /// Every attributed record.
    pub order_count: u64,
    /// Attributed records whose status is paid.
    pub paid_order_count: u64,
    /// Sum of paid totals.
    pub revenue_cents: u64,
    /// Commission owed on `revenue_cents`.
    pub commission_cents: u64,
}

#[cfg(test)]
impl AffiliateSummary {
    pub(crate) fn empty(code: ReferralCode) -> Self {
        Self {
            code,
            order_count: 0,
            paid_order_count: 0,
            revenue_cents: 0,
            commission_cents: 0,
        }
    }
}
