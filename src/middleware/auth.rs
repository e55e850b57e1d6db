// src/middleware/auth.rs

use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};

use crate::{common::error::AppError, config::AppState, models::auth::User};

/// Cookie de login enviado como `Authorization: Bearer <cookie>`.
pub async fn login_cookie<S>(parts: &mut Parts, state: &S) -> Result<String, AppError>
where
    S: Send + Sync,
{
    let TypedHeader(Authorization(bearer)) = TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
        .await
        .map_err(|_| AppError::InvalidToken)?;
    Ok(bearer.token().to_string())
}

// Extrator para obter o usuário autenticado diretamente nos handlers
pub struct AuthenticatedUser(pub User);

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
    AppState: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let cookie = login_cookie(parts, state).await?;
        let app_state = AppState::from_ref(state);
        let user = app_state.auth_service.resolve_user(&cookie).await?;
        Ok(AuthenticatedUser(user))
    }
}
