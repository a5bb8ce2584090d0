//! Carries a referral code from an inbound `?ref=` link to checkout time
//! through an HTTP-only cookie.

use std::collections::HashMap;

use axum::{
    body::Body,
    extract::Query,
    http::{HeaderMap, HeaderValue, Request, Uri, header},
    middleware::Next,
    response::Response,
};
use tracing::debug;

use crate::referral::ReferralCode;

pub const AFFILIATE_COOKIE_NAME: &str = "affiliate_ref";
pub const REF_QUERY_PARAM: &str = "ref";
/// 30 days.
pub const AFFILIATE_COOKIE_MAX_AGE_SECS: u64 = 30 * 24 * 60 * 60;

/// `Set-Cookie` value remembering `code`.
pub fn referral_cookie(code: &ReferralCode) -> String {
    format!(
        "{AFFILIATE_COOKIE_NAME}={code}; Path=/; Max-Age={AFFILIATE_COOKIE_MAX_AGE_SECS}; HttpOnly; SameSite=Lax"
    )
}

/// The `ref` query parameter, if present and valid.
pub fn referral_from_query(uri: &Uri) -> Option<ReferralCode> {
    let Query(params) = Query::<HashMap<String, String>>::try_from_uri(uri).ok()?;
    let raw = params.get(REF_QUERY_PARAM)?;
    let code = ReferralCode::parse(raw);
    if code.is_none() {
        debug!("dropping invalid ref query parameter");
    }
    code
}

/// The referral cookie sent back by the browser, re-validated.
pub fn referral_from_cookies(headers: &HeaderMap) -> Option<ReferralCode> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == AFFILIATE_COOKIE_NAME)
        .and_then(|(_, value)| ReferralCode::parse(value.trim()))
}

// Middleware: turns a valid `?ref=` into the affiliate cookie
pub async fn referral_cookie_middleware(req: Request<Body>, next: Next) -> Response {
    let code = referral_from_query(req.uri());
    let mut response = next.run(req).await;

    if let Some(code) = code {
        if let Ok(value) = HeaderValue::from_str(&referral_cookie(&code)) {
            debug!(referral = %code, "remembering referral");
            response.headers_mut().append(header::SET_COOKIE, value);
        }
    }
    response
}
