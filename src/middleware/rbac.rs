// src/middleware/rbac.rs
//
// A autoridade da requisição: cookie + empresa → usuário e permissão.
// Resolvida uma vez; os serviços só leem o resultado.

use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};

use crate::{
    common::error::AppError,
    config::AppState,
    middleware::{auth::login_cookie, tenancy::CompanyContext},
    services::auth::Authority,
};

pub struct RequestAuthority(pub Authority);

impl<S> FromRequestParts<S> for RequestAuthority
where
    S: Send + Sync,
    AppState: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        // A. Cookie (UNAUTHENTICATED antes de qualquer outra coisa)
        let cookie = login_cookie(parts, state).await?;

        // B. Empresa
        let CompanyContext(company_id) = CompanyContext::from_request_parts(parts, state).await?;

        // C. Usuário + permissão na empresa
        let app_state = AppState::from_ref(state);
        let authority = app_state.auth_service.resolve(&cookie, company_id).await?;

        tracing::debug!(
            "Autoridade: usuário {} na empresa {} como {:?}",
            authority.user.user_id,
            company_id,
            authority.permission_type()
        );
        Ok(RequestAuthority(authority))
    }
}
