// src/handlers/sync.rs

use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use serde_json::Value;

use crate::{
    common::error::AppError,
    config::AppState,
    handlers::auth::json_body,
    middleware::rbac::RequestAuthority,
    models::sync::{SyncEntityResponse, SyncTransactionRequest, SyncTransactionResponse},
};

// POST /api/sync/entities
// O corpo é o documento esparso do upload; o parser valida a estrutura.
#[utoipa::path(
    post,
    path = "/api/sync/entities",
    tag = "Sync",
    request_body(content = Object, description = "Cursores por tipo + types[] + um bloco por tipo listado"),
    responses(
        (status = 200, description = "Ids globalizados e mudanças desde os cursores", body = SyncEntityResponse),
        (status = 400, description = "Upload inválido"),
        (status = 404, description = "Entidade referenciada não existe")
    ),
    params(
        ("x-company-id" = i64, Header, description = "ID da empresa")
    ),
    security(("login_cookie" = []))
)]
pub async fn sync_entities(
    State(app_state): State<AppState>,
    RequestAuthority(authority): RequestAuthority,
    document: Result<Json<Value>, JsonRejection>,
) -> Result<Json<SyncEntityResponse>, AppError> {
    let document = json_body(document)?;
    let response = app_state.sync_service.sync_entities(&authority, &document).await?;
    Ok(Json(response))
}

// POST /api/sync/transactions
#[utoipa::path(
    post,
    path = "/api/sync/transactions",
    tag = "Sync",
    request_body = SyncTransactionRequest,
    responses(
        (status = 200, description = "Ids das transações e saldos desde o cursor", body = SyncTransactionResponse),
        (status = 403, description = "Filial fora do escopo do chamador")
    ),
    params(
        ("x-company-id" = i64, Header, description = "ID da empresa")
    ),
    security(("login_cookie" = []))
)]
pub async fn sync_transactions(
    State(app_state): State<AppState>,
    RequestAuthority(authority): RequestAuthority,
    payload: Result<Json<SyncTransactionRequest>, JsonRejection>,
) -> Result<Json<SyncTransactionResponse>, AppError> {
    let payload = json_body(payload)?;
    let response = app_state.sync_service.sync_transactions(&authority, &payload).await?;
    Ok(Json(response))
}
