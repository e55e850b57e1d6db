// src/middleware/tenancy.rs

use axum::{extract::FromRequestParts, http::request::Parts};

use crate::common::error::AppError;

// O nome do nosso cabeçalho HTTP customizado
pub const COMPANY_ID_HEADER: &str = "x-company-id";

// A empresa em que o chamador quer operar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompanyContext(pub i64);

impl<S> FromRequestParts<S> for CompanyContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(COMPANY_ID_HEADER)
            .ok_or_else(|| AppError::InvalidArgument("O cabeçalho x-company-id é obrigatório.".into()))?;

        let company_id = value
            .to_str()
            .ok()
            .and_then(|v| v.trim().parse::<i64>().ok())
            .filter(|id| *id > 0)
            .ok_or_else(|| AppError::InvalidArgument("Cabeçalho x-company-id inválido.".into()))?;

        Ok(CompanyContext(company_id))
    }
}
