use axum::{
    extract::{Query, State},
    http::{header::SET_COOKIE, HeaderMap},
    response::{AppendHeaders, IntoResponse, Redirect, Response},
    routing::{get, post},
    Router,
};
use tracing::{info, instrument, warn};

use crate::{
    auth::{
        dto::CallbackParams,
        extractors::{CurrentUser, MaybeUser},
        session::{
            clear_session_cookie, clear_state_cookie, generate_state, session_cookie,
            state_cookie, verify_state,
        },
    },
    error::{AppError, AppResult},
    response::ApiResponse,
    state::AppState,
    users::dto::UserResponse,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/google/login", get(google_login))
        .route("/auth/google/callback", get(google_callback))
        .route("/auth/logout", post(logout))
}

pub fn me_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/me", get(get_me))
        .route("/profile", get(get_profile))
}

/// 307 to Google's consent page, remembering the per-attempt `state` in a cookie.
#[instrument(skip(state))]
pub async fn google_login(State(state): State<AppState>) -> AppResult<Response> {
    let csrf = generate_state();
    let url = state.oauth.get_auth_url(&csrf)?;
    let secure = state.config.cookie_secure;

    Ok((
        AppendHeaders([(SET_COOKIE, state_cookie(&csrf, secure).to_string())]),
        Redirect::temporary(&url),
    )
        .into_response())
}

#[instrument(skip(state, headers, params))]
pub async fn google_callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<CallbackParams>,
) -> AppResult<Response> {
    verify_state(&headers, params.state.as_deref()).inspect_err(|e| {
        warn!(reason = %e, "oauth state check failed");
    })?;

    if let Some(error) = params.error {
        warn!(%error, "provider returned an error");
        return Err(AppError::auth(format!("Google sign-in failed: {error}")));
    }

    let code = params
        .code
        .filter(|c| !c.is_empty())
        .ok_or_else(|| AppError::validation("Authorization code not provided"))?;

    let token = state.oauth.exchange_code(&code).await?;
    let profile = state.oauth.get_user_info(&token).await?;
    let user = state
        .users
        .get_or_create_from_oauth(&profile.email, &profile.name)
        .await?;

    info!(user_id = user.id, email = %user.email, "user logged in");
    let secure = state.config.cookie_secure;
    Ok((
        AppendHeaders([
            (SET_COOKIE, session_cookie(user.id, secure).to_string()),
            (SET_COOKIE, clear_state_cookie(secure).to_string()),
        ]),
        Redirect::temporary(&state.config.frontend_url),
    )
        .into_response())
}

/// Resolves the session leniently and answers 401 itself when nobody is signed in.
#[instrument(skip_all)]
pub async fn get_me(MaybeUser(user): MaybeUser) -> AppResult<ApiResponse<UserResponse>> {
    let user = user.ok_or_else(|| AppError::auth("Authentication required"))?;
    Ok(ApiResponse::data(user.into()))
}

#[instrument(skip_all)]
pub async fn get_profile(CurrentUser(user): CurrentUser) -> ApiResponse<UserResponse> {
    ApiResponse::data(user.into())
}

#[instrument(skip_all)]
pub async fn logout(State(state): State<AppState>, CurrentUser(user): CurrentUser) -> impl IntoResponse {
    info!(user_id = user.id, "user logged out");
    (
        AppendHeaders([(
            SET_COOKIE,
            clear_session_cookie(state.config.cookie_secure).to_string(),
        )]),
        ApiResponse::message("Logged out successfully"),
    )
}
