// src/models/auth.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

// Representa um usuário vindo do banco de dados.
// A identidade é externa: (provedor, id no provedor).
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow, ToSchema)]
pub struct User {
    pub user_id: i64,
    pub username: String,
    pub external_provider: String,
    pub external_provider_user_id: String,
    pub created_at: DateTime<Utc>,
}

// Dados para inserir um usuário novo (o id vem do banco)
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub external_provider: String,
    pub external_provider_user_id: String,
}

// Identidade confirmada pelo provedor externo
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalIdentity {
    pub provider: String,
    pub provider_user_id: String,
    pub display_name: String,
}

// Estrutura de dados ("claims") dentro do cookie de login
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i64,   // Subject (ID do usuário)
    pub exp: usize, // Expiration time
    pub iat: usize, // Issued At
}

// Claims do token emitido pelo provedor de identidade
#[derive(Debug, Serialize, Deserialize)]
pub struct IdentityClaims {
    pub iss: String,
    pub sub: String,
    #[serde(default)]
    pub name: Option<String>,
    pub exp: usize,
}

// --- UserSignup ---
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UserSignupPayload {
    #[validate(length(min = 1, message = "O token do provedor é obrigatório."))]
    pub auth_token: String,
    #[validate(length(min = 1, message = "O device_id é obrigatório."))]
    pub device_id: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UserSignupResponse {
    pub login_cookie: String,
    pub username: String,
}

// --- EditUserName ---
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct EditUserNamePayload {
    #[validate(length(min = 1, max = 120, message = "O nome deve ter entre 1 e 120 caracteres."))]
    pub new_name: String,
}
