//! Axum extractors for the caller's identity

use axum::extract::FromRequestParts;
use axum::http::header::{AUTHORIZATION, COOKIE};
use axum::http::request::Parts;
use std::sync::Arc;
use tracing::debug;
use upscale_common::{Identity, UserProfile};

use super::token::TokenSigner;
use crate::error::ApiError;
use crate::AppState;

/// Name of the session cookie carrying the identity token
pub const TOKEN_COOKIE: &str = "token";

/// Identity for routes where login is optional.
///
/// A missing, malformed or expired token resolves to
/// [`Identity::Anonymous`]; it never rejects the request.
#[derive(Debug, Clone)]
pub struct OptionalIdentity(pub Identity);

/// Identity for routes that require login; rejects with 401 otherwise
#[derive(Debug, Clone)]
pub struct RequiredIdentity(pub UserProfile);

impl FromRequestParts<Arc<AppState>> for OptionalIdentity {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        Ok(OptionalIdentity(resolve_identity(parts, &state.tokens)))
    }
}

impl FromRequestParts<Arc<AppState>> for RequiredIdentity {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = token_from_parts(parts)
            .ok_or_else(|| ApiError::unauthorized("Authentication required"))?;

        let profile = state.tokens.verify(&token).map_err(|e| {
            debug!("Rejected token: {}", e);
            ApiError::unauthorized("Invalid or expired token")
        })?;

        Ok(RequiredIdentity(profile))
    }
}

/// Resolve the caller, degrading to anonymous on any token problem
pub fn resolve_identity(parts: &Parts, tokens: &TokenSigner) -> Identity {
    let Some(token) = token_from_parts(parts) else {
        return Identity::Anonymous;
    };

    match tokens.verify(&token) {
        Ok(profile) => Identity::Authenticated(profile),
        Err(e) => {
            debug!("Ignoring unusable token on optional-auth route: {}", e);
            Identity::Anonymous
        }
    }
}

/// The `token` cookie, or failing that an `Authorization: Bearer` header
fn token_from_parts(parts: &Parts) -> Option<String> {
    let from_cookie = parts
        .headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|header| header.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == TOKEN_COOKIE && !value.is_empty())
        .map(|(_, value)| value.to_string());

    from_cookie.or_else(|| {
        let value = parts.headers.get(AUTHORIZATION)?.to_str().ok()?;
        let (scheme, token) = value.split_once(' ')?;
        (scheme == "Bearer" && !token.is_empty()).then(|| token.to_string())
    })
}

/// `Set-Cookie` value delivering a freshly issued token
pub fn session_cookie(token: &str, max_age_secs: i64, secure: bool) -> String {
    let attributes = if secure {
        "SameSite=None; Secure"
    } else {
        "SameSite=Lax"
    };
    format!(
        "{}={}; HttpOnly; Path=/; Max-Age={}; {}",
        TOKEN_COOKIE, token, max_age_secs, attributes
    )
}

/// `Set-Cookie` value that removes the session cookie
pub fn clear_session_cookie(secure: bool) -> String {
    session_cookie("", 0, secure)
}
