// src/handlers/tenancy.rs

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};

use crate::{
    common::error::AppError,
    config::AppState,
    handlers::auth::json_body,
    middleware::{auth::AuthenticatedUser, rbac::RequestAuthority},
    models::tenancy::{
        AddEmployeePayload, AddEmployeeResponse, CompanyResponse, CreateCompanyPayload, SyncCompaniesPayload,
        SyncCompaniesResponse,
    },
};

// POST /api/companies
#[utoipa::path(
    post,
    path = "/api/companies",
    tag = "Companies",
    request_body = CreateCompanyPayload,
    responses(
        (status = 201, description = "Empresa criada; o chamador é o OWNER", body = CompanyResponse)
    ),
    security(("login_cookie" = []))
)]
pub async fn create_company(
    State(app_state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    payload: Result<Json<CreateCompanyPayload>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let payload = json_body(payload)?;
    let company = app_state.tenancy_service.create_company(&user, &payload).await?;
    Ok((StatusCode::CREATED, Json(company)))
}

// POST /api/companies/sync
#[utoipa::path(
    post,
    path = "/api/companies/sync",
    tag = "Companies",
    request_body = SyncCompaniesPayload,
    responses(
        (status = 200, description = "Empresas do usuário com licenças novas", body = SyncCompaniesResponse)
    ),
    security(("login_cookie" = []))
)]
pub async fn sync_companies(
    State(app_state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    payload: Result<Json<SyncCompaniesPayload>, JsonRejection>,
) -> Result<Json<SyncCompaniesResponse>, AppError> {
    let payload = json_body(payload)?;
    let companies = app_state.tenancy_service.sync_companies(&user, &payload).await?;
    Ok(Json(companies))
}

// POST /api/companies/employees
#[utoipa::path(
    post,
    path = "/api/companies/employees",
    tag = "Companies",
    request_body = AddEmployeePayload,
    responses(
        (status = 201, description = "Funcionário adicionado", body = AddEmployeeResponse),
        (status = 403, description = "Permissão insuficiente"),
        (status = 409, description = "O usuário já é membro")
    ),
    params(
        ("x-company-id" = i64, Header, description = "ID da empresa")
    ),
    security(("login_cookie" = []))
)]
pub async fn add_employee(
    State(app_state): State<AppState>,
    RequestAuthority(authority): RequestAuthority,
    payload: Result<Json<AddEmployeePayload>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let payload = json_body(payload)?;
    let employee = app_state.tenancy_service.add_employee(&authority, &payload).await?;
    Ok((StatusCode::CREATED, Json(employee)))
}
