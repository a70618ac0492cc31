//! Session and OAuth-state cookies.
//!
//! The `session` cookie holds the raw decimal user id, unsigned. Anyone holding the value
//! can act as that user until the cookie is discarded.

use axum::http::{header, HeaderMap};
use cookie::{Cookie, SameSite};
use rand::{distributions::Alphanumeric, Rng};
use time::Duration;

use crate::error::{AppError, AppResult};

pub const SESSION_COOKIE: &str = "session";
pub const STATE_COOKIE: &str = "oauth_state";

const STATE_COOKIE_PATH: &str = "/v1/auth/google";
const STATE_TTL: Duration = Duration::minutes(10);
const STATE_LEN: usize = 32;

/// First cookie named `name` across all `Cookie` headers.
pub fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    for value in headers.get_all(header::COOKIE) {
        let Ok(value) = value.to_str() else {
            continue;
        };
        for cookie in Cookie::split_parse(value).flatten() {
            if cookie.name() == name {
                return Some(cookie.value().to_string());
            }
        }
    }
    None
}

pub fn session_cookie(user_id: i64, secure: bool) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, user_id.to_string()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .build()
}

pub fn clear_session_cookie(secure: bool) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, ""))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .max_age(Duration::seconds(-1))
        .build()
}

/// Fresh, unpredictable value for the OAuth `state` parameter.
pub fn generate_state() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(STATE_LEN)
        .map(char::from)
        .collect()
}

pub fn state_cookie(state: &str, secure: bool) -> Cookie<'static> {
    Cookie::build((STATE_COOKIE, state.to_string()))
        .path(STATE_COOKIE_PATH)
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .max_age(STATE_TTL)
        .build()
}

pub fn clear_state_cookie(secure: bool) -> Cookie<'static> {
    Cookie::build((STATE_COOKIE, ""))
        .path(STATE_COOKIE_PATH)
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .max_age(Duration::seconds(-1))
        .build()
}

/// The `state` echoed back by the provider must equal the one we stored at login.
pub fn verify_state(headers: &HeaderMap, returned: Option<&str>) -> AppResult<()> {
    let expected = read_cookie(headers, STATE_COOKIE)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::auth("Missing OAuth state"))?;
    match returned {
        Some(state) if state == expected => Ok(()),
        _ => Err(AppError::auth("Invalid OAuth state")),
    }
}
