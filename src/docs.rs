// src/docs.rs

use utoipa::openapi::security::{Http, HttpAuthScheme, SecurityScheme};
use utoipa::OpenApi;

use crate::handlers;
use crate::models;

#[derive(OpenApi)]
#[openapi(
    paths(
        // --- Users ---
        handlers::auth::user_signup,
        handlers::auth::edit_user_name,

        // --- Companies ---
        handlers::tenancy::create_company,
        handlers::tenancy::sync_companies,
        handlers::tenancy::add_employee,

        // --- Sync ---
        handlers::sync::sync_entities,
        handlers::sync::sync_transactions,
    ),
    components(
        schemas(
            // --- Users ---
            models::auth::UserSignupPayload,
            models::auth::UserSignupResponse,
            models::auth::EditUserNamePayload,

            // --- Companies ---
            models::tenancy::PermissionType,
            models::tenancy::PermissionGrant,
            models::tenancy::Member,
            models::tenancy::CreateCompanyPayload,
            models::tenancy::SyncCompaniesPayload,
            models::tenancy::CompanyResponse,
            models::tenancy::SyncCompaniesResponse,
            models::tenancy::AddEmployeePayload,
            models::tenancy::AddEmployeeResponse,

            // --- Sync ---
            models::sync::UpdatedId,
            models::sync::SyncState,
            models::sync::SyncEntityResponse,
            models::sync::SyncTransactionRequest,
            models::sync::SyncTransactionResponse,
            models::operations::TransType,
            models::operations::Transaction,
            models::operations::TransactionItem,
            models::operations::PostedTransaction,
            models::operations::PostedTransactionItem,
        )
    ),
    tags(
        (name = "Users", description = "Cadastro via provedor de identidade e perfil"),
        (name = "Companies", description = "Empresas, licenças e funcionários"),
        (name = "Sync", description = "Sincronização de entidades e transações")
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme("login_cookie", SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)));
    }
}
