// src/handlers/auth.rs

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Json,
};

use crate::{
    common::error::AppError,
    config::AppState,
    middleware::auth::AuthenticatedUser,
    models::auth::{EditUserNamePayload, UserSignupPayload, UserSignupResponse},
};

/// Corpo JSON malformado vira INVALID_ARGUMENT no formato das demais falhas.
pub(crate) fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| AppError::InvalidArgument(rejection.body_text()))
}

// POST /api/users/signup
#[utoipa::path(
    post,
    path = "/api/users/signup",
    tag = "Users",
    request_body = UserSignupPayload,
    responses(
        (status = 200, description = "Cookie de login emitido", body = UserSignupResponse),
        (status = 401, description = "Token do provedor inválido")
    )
)]
pub async fn user_signup(
    State(app_state): State<AppState>,
    payload: Result<Json<UserSignupPayload>, JsonRejection>,
) -> Result<Json<UserSignupResponse>, AppError> {
    let payload = json_body(payload)?;
    let response = app_state.tenancy_service.user_signup(&payload).await?;
    Ok(Json(response))
}

// PUT /api/users/me/name
#[utoipa::path(
    put,
    path = "/api/users/me/name",
    tag = "Users",
    request_body = EditUserNamePayload,
    responses(
        (status = 204, description = "Nome alterado"),
        (status = 400, description = "Nome inválido")
    ),
    security(("login_cookie" = []))
)]
pub async fn edit_user_name(
    State(app_state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    payload: Result<Json<EditUserNamePayload>, JsonRejection>,
) -> Result<StatusCode, AppError> {
    let payload = json_body(payload)?;
    app_state.tenancy_service.edit_user_name(&user, &payload).await?;
    Ok(StatusCode::NO_CONTENT)
}
