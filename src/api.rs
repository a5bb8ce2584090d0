use std::collections::HashSet;
use std::sync::Arc;

use axum::{
    Extension, Json, Router,
    extract::{Path, Query, State},
    http::HeaderMap,
    middleware,
    routing::{get, post},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{Level, debug, info};

use crate::access::is_authorized_admin;
use crate::auth::CurrentUser;
use crate::catalog::{CHECKOUT_CURRENCY, Locale, PACKAGES, Package, find_package, referral_link};
use crate::commission::CommissionRate;
use crate::config::Config;
use crate::error::{
    ApiError, ApiErrorWithMeta, E_NOT_ADMIN, E_SESSION_NOT_FOUND, E_STORE_FAILURE,
    E_UNKNOWN_PACKAGE,
};
use crate::ledger::{aggregate_by_referrer, summarize_for_referrer};
use crate::profile::AffiliateProfile;
use crate::referral::ReferralCode;
use crate::responses::{ApiOk, RequestMeta, meta_middleware};
use crate::store::{CheckoutSessionStore, CustomerStore};
use crate::tracking::{referral_cookie_middleware, referral_from_cookies};
use crate::types::{
    AffiliateSummary, META_AFFILIATE_REF, META_LOCALE, META_PACKAGE_KEY, META_USER_EMAIL,
    Metadata, NewCheckoutSession,
};

/// The application state.
#[derive(Clone)]
pub struct AppState {
    /// Customer records holding affiliate profiles.
    pub customers: Arc<dyn CustomerStore>,
    /// Checkout sessions used for attribution.
    pub sessions: Arc<dyn CheckoutSessionStore>,
    /// The application configuration.
    pub config: Config,
    /// Lowercased admin emails parsed from the configuration.
    pub admins: Arc<HashSet<String>>,
}

impl AppState {
    pub fn new(
        customers: Arc<dyn CustomerStore>,
        sessions: Arc<dyn CheckoutSessionStore>,
        config: Config,
    ) -> Self {
        let admins = Arc::new(config.admin_allow_list());
        Self {
            customers,
            sessions,
            config,
            admins,
        }
    }
}

/// Query for the stats view.
#[derive(Deserialize)]
pub struct StatsQuery {
    /// Locale used in referral links.
    pub locale: Option<String>,
}

/// One row of the admin report.
#[derive(Serialize)]
pub struct AffiliateRow {
    #[serde(flatten)]
    pub summary: AffiliateSummary,
    /// Shareable link for the referral code.
    pub link: String,
}

/// What the caller gets to see on the stats page.
#[derive(Serialize)]
#[serde(tag = "view", rename_all = "snake_case")]
pub enum StatsResponse {
    /// Not an affiliate yet.
    Apply { commission_bps: u32 },
    /// The caller's own totals.
    Own {
        #[serde(rename = "ref")]
        code: ReferralCode,
        link: String,
        commission_bps: u32,
        summary: AffiliateSummary,
    },
    /// Every referrer, for admins.
    Admin { rows: Vec<AffiliateRow> },
}

/// The request to open a checkout session.
#[derive(Deserialize)]
pub struct CheckoutRequest {
    /// Key of the package being booked.
    pub package_key: String,
    /// Locale of the page the buyer is on.
    pub locale: Option<String>,
}

/// The response after opening a checkout session.
#[derive(Serialize)]
pub struct CheckoutResponse {
    /// The ID of the checkout session.
    pub id: String,
    pub success_url: String,
    pub cancel_url: String,
}

/// The response after completing a checkout session.
#[derive(Serialize)]
pub struct CompleteResponse {
    /// The ID of the completed session.
    pub completed: String,
}

pub fn init_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/packages", get(packages_handler))
        .route("/affiliate/apply", post(apply_handler))
        .route("/affiliate/stats", get(stats_handler))
        .route("/checkout", post(checkout_handler))
        .route("/checkout/{id}/complete", post(complete_checkout_handler))
        .with_state(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(middleware::from_fn(referral_cookie_middleware))
        .layer(middleware::from_fn(meta_middleware))
}

fn store_failure(meta: &RequestMeta) -> impl FnOnce(anyhow::Error) -> ApiErrorWithMeta + '_ {
    move |e| {
        ApiError::Internal(e)
            .with_meta(meta.clone())
            .with_code(E_STORE_FAILURE)
    }
}

async fn packages_handler(Extension(meta): Extension<RequestMeta>) -> ApiOk<&'static [Package]> {
    ApiOk::ok("packages fetched", &PACKAGES[..], meta)
}

async fn apply_handler(
    State(st): State<AppState>,
    Extension(meta): Extension<RequestMeta>,
    user: CurrentUser,
) -> Result<ApiOk<AffiliateProfile>, ApiErrorWithMeta> {
    let email = user.require_email(&meta)?;

    let customer = st
        .customers
        .find_or_create(email, user.name.as_deref())
        .await
        .map_err(store_failure(&meta))?;

    let current = AffiliateProfile::from_metadata(&customer.metadata);
    let profile = AffiliateProfile::activate(&current, email, Utc::now());

    let mut metadata = customer.metadata.clone();
    profile.write_into(&mut metadata);
    st.customers
        .update_metadata(&customer.id, &metadata)
        .await
        .map_err(store_failure(&meta))?;

    info!(
        customer_id = %customer.id,
        referral = ?profile.code,
        reapplied = current.is_active(),
        "affiliate activated"
    );

    Ok(ApiOk::ok("affiliate activated", profile, meta))
}

async fn stats_handler(
    State(st): State<AppState>,
    Extension(meta): Extension<RequestMeta>,
    user: CurrentUser,
    Query(query): Query<StatsQuery>,
) -> Result<ApiOk<StatsResponse>, ApiErrorWithMeta> {
    let email = user.require_email(&meta)?;
    let locale = Locale::parse(query.locale.as_deref());
    let is_admin = is_authorized_admin(Some(email), &st.admins);

    let profile = st
        .customers
        .find_by_email(email)
        .await
        .map_err(store_failure(&meta))?
        .map(|customer| AffiliateProfile::from_metadata(&customer.metadata))
        .unwrap_or_else(AffiliateProfile::none);

    let own_code = profile.code.clone().filter(|_| !is_admin);
    if !is_admin && own_code.is_none() {
        return Ok(ApiOk::ok(
            "affiliate not active",
            StatsResponse::Apply {
                commission_bps: CommissionRate::DEFAULT.bps(),
            },
            meta,
        ));
    }

    let records = st
        .sessions
        .list_recent(st.config.checkout_session_limit)
        .await
        .map_err(store_failure(&meta))?;
    let base_url = &st.config.app_base_url;

    let view = match own_code {
        Some(code) => StatsResponse::Own {
            link: referral_link(base_url, locale, code.as_str()),
            commission_bps: profile.commission_rate.bps(),
            summary: summarize_for_referrer(&records, &code, profile.commission_rate),
            code,
        },
        None => {
            let rows = aggregate_by_referrer(&records)
                .into_iter()
                .map(|summary| AffiliateRow {
                    link: referral_link(base_url, locale, summary.code.as_str()),
                    summary,
                })
                .collect::<Vec<_>>();
            debug!(referrers = rows.len(), records = records.len(), "admin affiliate report");
            StatsResponse::Admin { rows }
        }
    };

    Ok(ApiOk::ok("affiliate stats fetched", view, meta))
}

async fn checkout_handler(
    State(st): State<AppState>,
    Extension(meta): Extension<RequestMeta>,
    user: CurrentUser,
    headers: HeaderMap,
    Json(req): Json<CheckoutRequest>,
) -> Result<ApiOk<CheckoutResponse>, ApiErrorWithMeta> {
    let email = user.require_email(&meta)?;

    let Some(package) = find_package(&req.package_key) else {
        return Err(ApiError::BadRequest("invalid package".into())
            .with_meta(meta)
            .with_code(E_UNKNOWN_PACKAGE));
    };
    let locale = Locale::parse(req.locale.as_deref());

    let customer = st
        .customers
        .find_or_create(email, user.name.as_deref())
        .await
        .map_err(store_failure(&meta))?;

    let mut metadata = Metadata::from([
        (META_PACKAGE_KEY.to_string(), package.key.to_string()),
        (META_LOCALE.to_string(), locale.as_str().to_string()),
        (META_USER_EMAIL.to_string(), email.to_string()),
    ]);
    let referral = referral_from_cookies(&headers);
    if let Some(code) = &referral {
        metadata.insert(META_AFFILIATE_REF.to_string(), code.to_string());
    }

    let session = st
        .sessions
        .create(NewCheckoutSession {
            customer_id: customer.id,
            amount_total: package.amount_cents,
            currency: CHECKOUT_CURRENCY.to_string(),
            metadata,
        })
        .await
        .map_err(store_failure(&meta))?;

    info!(
        session_id = %session.id,
        package = package.key,
        label = package.label(locale),
        referral = ?referral,
        "checkout session created"
    );

    let base_url = st.config.app_base_url.trim_end_matches('/');
    let locale = locale.as_str();
    Ok(ApiOk::created(
        "checkout session created",
        CheckoutResponse {
            success_url: format!("{base_url}/{locale}/order/success?session_id={}", session.id),
            cancel_url: format!("{base_url}/{locale}/pricing"),
            id: session.id,
        },
        meta,
    ))
}

async fn complete_checkout_handler(
    State(st): State<AppState>,
    Path(id): Path<String>,
    Extension(meta): Extension<RequestMeta>,
    user: CurrentUser,
) -> Result<ApiOk<CompleteResponse>, ApiErrorWithMeta> {
    if !is_authorized_admin(user.email.as_deref(), &st.admins) {
        return Err(ApiError::Forbidden("admin access required".into())
            .with_meta(meta)
            .with_code(E_NOT_ADMIN));
    }

    let found = st
        .sessions
        .mark_paid(&id)
        .await
        .map_err(store_failure(&meta))?;
    if !found {
        return Err(ApiError::NotFound("checkout session not found".into())
            .with_meta(meta)
            .with_code(E_SESSION_NOT_FOUND));
    }

    info!(session_id = %id, "checkout session paid");
    Ok(ApiOk::ok(
        "checkout session completed",
        CompleteResponse { completed: id },
        meta,
    ))
}
