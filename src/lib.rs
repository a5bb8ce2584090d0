//! Affiliate attribution and commission accounting for the booking site.
//!
//! The pure ledger logic lives in [`referral`], [`commission`], [`ledger`]
//! and [`access`]. The rest wires it to the payment provider's records and
//! to an HTTP surface.

pub mod access;
mod api;
mod auth;
pub mod catalog;
pub mod commission;
pub mod config;
pub mod error;
pub mod ledger;
pub mod postgres;
pub mod profile;
pub mod referral;
pub mod responses;
pub mod store;
pub mod tracking;
pub mod types;

use anyhow::Context;
use anyhow::Result;
use sqlx::{PgPool, postgres::PgPoolOptions};

pub use access::{is_authorized_admin, parse_admin_allow_list};
pub use api::{AppState, init_router};
pub use auth::{CurrentUser, EMAIL_HEADER, NAME_HEADER, SUBJECT_HEADER};
pub use commission::{CommissionRate, DEFAULT_COMMISSION_BPS, compute_commission_cents};
pub use crate::config::Config;
pub use error::LedgerError;
pub use ledger::{aggregate_by_referrer, summarize_for_referrer};
pub use postgres::PgStore;
pub use profile::{AffiliateProfile, AffiliateStatus};
pub use referral::{ReferralCode, generate_referral_code, is_valid_referral_code};
pub use store::{CheckoutSessionStore, CustomerStore, MemoryStore};
pub use types::{AffiliateSummary, PaymentRecord, PaymentStatus};

/// Connects to Postgres and applies pending migrations.
pub async fn init_pool(database_url: &str) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(8)
        .connect(database_url)
        .await
        .context("Failed to connect to Postgres")?;
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run migrations")?;
    Ok(pool)
}
