use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::common::db_utils::is_retryable;

/// Código de erro do protocolo RPC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RpcCode {
    Unauthenticated,
    PermissionDenied,
    InvalidArgument,
    NotFound,
    Aborted,
    Internal,
}

impl RpcCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RpcCode::Unauthenticated => "UNAUTHENTICATED",
            RpcCode::PermissionDenied => "PERMISSION_DENIED",
            RpcCode::InvalidArgument => "INVALID_ARGUMENT",
            RpcCode::NotFound => "NOT_FOUND",
            RpcCode::Aborted => "ABORTED",
            RpcCode::Internal => "INTERNAL",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            RpcCode::Unauthenticated => StatusCode::UNAUTHORIZED,
            RpcCode::PermissionDenied => StatusCode::FORBIDDEN,
            RpcCode::InvalidArgument => StatusCode::BAD_REQUEST,
            RpcCode::NotFound => StatusCode::NOT_FOUND,
            RpcCode::Aborted => StatusCode::CONFLICT,
            RpcCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

// Nosso tipo de erro, com `thiserror` para melhor ergonomia.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Erro de validação")]
    ValidationError(#[from] validator::ValidationErrors),

    #[error("Cookie de login inválido ou expirado")]
    InvalidToken,

    #[error("Usuário não encontrado")]
    UserNotFound,

    #[error("Permissão negada: {0}")]
    PermissionDenied(String),

    #[error("Argumento inválido: {0}")]
    InvalidArgument(String),

    #[error("{0} não encontrado")]
    NotFound(String),

    // Violação de unicidade que a idempotência não absorveu
    #[error("Conflito: {0}")]
    Conflict(String),

    #[error("Erro de banco de dados")]
    DatabaseError(#[from] sqlx::Error),

    // `anyhow::Error` é ótimo para capturar o contexto do erro.
    #[error("Erro interno do servidor")]
    InternalServerError(#[from] anyhow::Error),

    #[error("Erro de JWT: {0}")]
    JwtError(#[from] jsonwebtoken::errors::Error),
}

impl AppError {
    pub fn code(&self) -> RpcCode {
        match self {
            AppError::InvalidToken => RpcCode::Unauthenticated,
            AppError::UserNotFound | AppError::NotFound(_) => RpcCode::NotFound,
            AppError::PermissionDenied(_) => RpcCode::PermissionDenied,
            AppError::InvalidArgument(_) | AppError::ValidationError(_) => RpcCode::InvalidArgument,
            AppError::Conflict(_) => RpcCode::Aborted,
            AppError::DatabaseError(e) if is_retryable(e) => RpcCode::Aborted,
            _ => RpcCode::Internal,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let code = self.code();

        let message = match (&self, code) {
            // Retorna todos os detalhes da validação.
            (AppError::ValidationError(errors), _) => {
                let mut details = std::collections::HashMap::new();
                for (field, field_errors) in errors.field_errors() {
                    let messages: Vec<String> = field_errors.iter()
                        .filter_map(|e| e.message.as_ref().map(|m| m.to_string()))
                        .collect();
                    details.insert(field.to_string(), messages);
                }
                let body = Json(json!({
                    "code": code.as_str(),
                    "error": "Um ou mais campos são inválidos.",
                    "details": details,
                }));
                return (code.status(), body).into_response();
            }
            (AppError::DatabaseError(e), RpcCode::Aborted) => {
                tracing::warn!("Transação abortada por concorrência: {}", e);
                "Conflito de concorrência, tente novamente.".to_string()
            }
            // Erros internos: loga o detalhe e devolve uma mensagem genérica.
            (e, RpcCode::Internal) => {
                tracing::error!("Erro Interno do Servidor: {:?}", e);
                "Ocorreu um erro inesperado.".to_string()
            }
            (e, _) => e.to_string(),
        };

        let body = Json(json!({ "code": code.as_str(), "error": message }));
        (code.status(), body).into_response()
    }
}
