use crate::state;

use axum::Json;
use axum::extract::FromRequestParts;
use axum::http::header::{AUTHORIZATION, COOKIE};
use axum::http::request::Parts;
use axum::http::{HeaderMap, StatusCode};

use super::ErrorResponse;

/// Header set by the trusted upstream proxy when token auth is not configured.
pub(crate) const USER_ID_HEADER: &str = "x-user-id";

/// The user id of the caller, resolved from a session token or the trusted
/// user header.
#[derive(Debug, Clone)]
pub(crate) struct CurrentUser(pub(crate) String);

impl FromRequestParts<state::AppState> for CurrentUser {
    type Rejection = (StatusCode, Json<ErrorResponse>);

    async fn from_request_parts(
        parts: &mut Parts,
        state: &state::AppState,
    ) -> Result<Self, Self::Rejection> {
        let user = match &state.identity {
            Some(identity) => bearer_token(&parts.headers)
                .or_else(|| auth_cookie(&parts.headers, identity.cookie_name()))
                .and_then(|token| match identity.verify_token(token) {
                    Ok(user) => Some(user),
                    Err(err) => {
                        tracing::debug!(error = %err, "rejected session token");
                        None
                    }
                }),
            None => parts
                .headers
                .get(USER_ID_HEADER)
                .and_then(|value| value.to_str().ok())
                .map(str::trim)
                .filter(|user| !user.is_empty())
                .map(str::to_string),
        };

        user.map(CurrentUser)
            .ok_or_else(|| super::api_error(StatusCode::UNAUTHORIZED, "unauthorized"))
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

fn auth_cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    for header in headers.get_all(COOKIE).iter() {
        if let Ok(raw) = header.to_str()
            && let Some(value) = cookie_from_header(raw, name)
        {
            return Some(value);
        }
    }
    None
}

fn cookie_from_header<'a>(header: &'a str, name: &str) -> Option<&'a str> {
    for part in header.split(';') {
        let trimmed = part.trim();
        if let Some((cookie_name, cookie_value)) = trimmed.split_once('=')
            && cookie_name == name
        {
            return Some(cookie_value);
        }
    }
    None
}
