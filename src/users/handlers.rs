use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    routing::get,
    Json, Router,
};
use tracing::{info, instrument};

use crate::{
    auth::extractors::CurrentUser,
    error::{AppError, AppResult},
    response::{ApiResponse, PaginatedResponse, Pagination},
    state::AppState,
    users::dto::{CreateUserRequest, ListQuery, UpdateUserRequest, UserResponse},
};

// Every route here requires a session; there are no roles.
pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users).post(create_user))
        .route(
            "/users/:id",
            get(get_user).put(update_user).delete(delete_user),
        )
}

fn parse_id(raw: &str) -> AppResult<i64> {
    raw.parse()
        .map_err(|_| AppError::parse("Invalid user ID"))
}

#[instrument(skip(state, _viewer))]
pub async fn get_user(
    State(state): State<AppState>,
    _viewer: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<ApiResponse<UserResponse>> {
    let user = state.users.get_by_id(parse_id(&id)?).await?;
    Ok(ApiResponse::data(user.into()))
}

#[instrument(skip(state, _viewer, query))]
pub async fn list_users(
    State(state): State<AppState>,
    _viewer: CurrentUser,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> AppResult<PaginatedResponse<UserResponse>> {
    let Query(query) = query?;
    let page = state.users.list_users(query.page, query.limit).await?;
    Ok(PaginatedResponse {
        success: true,
        pagination: Pagination::new(page.page.page, page.page.limit, page.total),
        data: page.users.into_iter().map(UserResponse::from).collect(),
    })
}

#[instrument(skip(state, viewer, payload))]
pub async fn create_user(
    State(state): State<AppState>,
    CurrentUser(viewer): CurrentUser,
    payload: Result<Json<CreateUserRequest>, JsonRejection>,
) -> AppResult<(StatusCode, ApiResponse<UserResponse>)> {
    let Json(payload) = payload?;
    let user = state
        .users
        .create_user(payload.email.trim(), payload.name.trim())
        .await?;
    info!(user_id = user.id, by = viewer.id, "user created via api");
    Ok((StatusCode::CREATED, ApiResponse::data(user.into())))
}

#[instrument(skip(state, viewer, payload))]
pub async fn update_user(
    State(state): State<AppState>,
    CurrentUser(viewer): CurrentUser,
    Path(id): Path<String>,
    payload: Result<Json<UpdateUserRequest>, JsonRejection>,
) -> AppResult<ApiResponse<UserResponse>> {
    let id = parse_id(&id)?;
    let Json(payload) = payload?;
    let user = state.users.update_user(id, payload.into()).await?;
    info!(user_id = user.id, by = viewer.id, "user updated via api");
    Ok(ApiResponse::data(user.into()))
}

#[instrument(skip(state, viewer))]
pub async fn delete_user(
    State(state): State<AppState>,
    CurrentUser(viewer): CurrentUser,
    Path(id): Path<String>,
) -> AppResult<ApiResponse<()>> {
    let id = parse_id(&id)?;
    state.users.delete_user(id).await?;
    info!(user_id = id, by = viewer.id, "user deleted via api");
    Ok(ApiResponse::message("User deleted"))
}
