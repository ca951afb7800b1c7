use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
};
use std::sync::Arc;

use super::meta::ClientMeta;
use super::types::{CreateUserRequest, UpdateUserRequest};
use super::validation;
use super::{ApiError, ApiResponse, AppState};
use crate::domain::Principal;
use crate::services::{CreatedUser, IssuedReset, UserView};

/// GET /users
pub async fn list_users(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<Vec<UserView>>>, ApiError> {
    let users = state.user_admin().list_users().await?;
    Ok(Json(ApiResponse::success(users)))
}

/// POST /users
/// The response carries the onboarding reset code; it is shown once.
pub async fn create_user(
    State(state): State<Arc<AppState>>,
    ClientMeta(ctx): ClientMeta,
    principal: Principal,
    payload: Result<Json<CreateUserRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse<CreatedUser>>), ApiError> {
    let Json(body) = payload?;
    let input = validation::validate_create_user(body)?;

    let created = state
        .user_admin()
        .create_user(&principal, input, &ctx)
        .await?;

    Ok((StatusCode::CREATED, Json(ApiResponse::success(created))))
}

/// PUT /users/{id}
pub async fn update_user(
    State(state): State<Arc<AppState>>,
    ClientMeta(ctx): ClientMeta,
    principal: Principal,
    Path(id): Path<String>,
    payload: Result<Json<UpdateUserRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<UserView>>, ApiError> {
    let id = validation::parse_user_id(&id)?;
    let Json(body) = payload?;
    let changes = validation::validate_update_user(body)?;

    let user = state
        .user_admin()
        .update_user(&principal, id, changes, &ctx)
        .await?;

    Ok(Json(ApiResponse::success(user)))
}

/// PATCH /users/{id}/deactivate
pub async fn deactivate_user(
    State(state): State<Arc<AppState>>,
    ClientMeta(ctx): ClientMeta,
    principal: Principal,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<UserView>>, ApiError> {
    let id = validation::parse_user_id(&id)?;

    let user = state
        .user_admin()
        .deactivate_user(&principal, id, &ctx)
        .await?;

    Ok(Json(ApiResponse::success(user)))
}

/// POST /users/{id}/reset-password
pub async fn issue_password_reset(
    State(state): State<Arc<AppState>>,
    ClientMeta(ctx): ClientMeta,
    principal: Principal,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<IssuedReset>>, ApiError> {
    let id = validation::parse_user_id(&id)?;

    let issued = state
        .user_admin()
        .issue_password_reset(&principal, id, &ctx)
        .await?;

    Ok(Json(ApiResponse::success(issued)))
}
