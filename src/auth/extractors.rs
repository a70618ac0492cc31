use std::convert::Infallible;

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use tracing::warn;

use super::session::{read_cookie, SESSION_COOKIE};
use crate::error::AppError;
use crate::users::{repo_types::User, services::UserService};

/// The user behind the `session` cookie. Rejects with 401 before the handler runs.
pub struct CurrentUser(pub User);

/// Like [`CurrentUser`], but any failure yields `None` instead of a rejection.
pub struct MaybeUser(pub Option<User>);

/// Looked up on every request; deleting a user ends their session immediately.
async fn resolve_session(parts: &Parts, users: &UserService) -> Result<User, AppError> {
    let raw = read_cookie(&parts.headers, SESSION_COOKIE)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::auth("Authentication required"))?;

    // Plain decimal digits only; `+5` or `-3` are not user ids.
    let user_id: i64 = Some(raw.as_str())
        .filter(|v| v.bytes().all(|b| b.is_ascii_digit()))
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| AppError::auth("Invalid session"))?;

    match users.get_by_id(user_id).await {
        Ok(user) => Ok(user),
        Err(AppError::NotFound(_)) => Err(AppError::auth("User not found")),
        Err(e) => {
            warn!(error = %e, user_id, "session lookup failed");
            Err(AppError::auth("User not found"))
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
    UserService: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let users = UserService::from_ref(state);
        match resolve_session(parts, &users).await {
            Ok(user) => Ok(CurrentUser(user)),
            Err(e) => {
                warn!(reason = %e, path = %parts.uri.path(), "session rejected");
                Err(e)
            }
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for MaybeUser
where
    S: Send + Sync,
    UserService: FromRef<S>,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let users = UserService::from_ref(state);
        Ok(MaybeUser(resolve_session(parts, &users).await.ok()))
    }
}
