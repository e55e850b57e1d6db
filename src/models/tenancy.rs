// src/models/tenancy.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use validator::Validate;

use crate::common::error::AppError;

// ---
// 1. Company (a "Empresa", o tenant)
// ---
// Criada por um usuário e nunca apagada. É dona de todo o resto.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Company {
    pub company_id: i64,
    pub name: String,
    pub encoded_payment: String,
    pub created_at: DateTime<Utc>,
}

// ---
// 2. Tipos de permissão (do mais forte para o mais fraco)
// ---
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "permission_type", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PermissionType {
    Owner,
    Admin,
    Manager,
    BranchManager,
    BranchCashier,
    BranchWorker,
}

impl PermissionType {
    fn rank(&self) -> u8 {
        match self {
            PermissionType::Owner => 6,
            PermissionType::Admin => 5,
            PermissionType::Manager => 4,
            PermissionType::BranchManager => 3,
            PermissionType::BranchCashier => 2,
            PermissionType::BranchWorker => 1,
        }
    }

    /// `true` se esta permissão é igual ou mais forte que `other`.
    pub fn at_least(&self, other: PermissionType) -> bool {
        self.rank() >= other.rank()
    }

    /// Permissões restritas às filiais de `branches_allowed`.
    pub fn is_branch_scoped(&self) -> bool {
        !self.at_least(PermissionType::Manager)
    }
}

// ---
// 3. O "blob" de permissão que o cliente conhece.
// ---
// O blob gravado é o JSON deste struct; as colunas estruturadas derivam dele.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PermissionGrant {
    pub permission_type: PermissionType,
    #[serde(default)]
    pub branches_allowed: Vec<i64>,
    #[serde(default)]
    pub stores_allowed: Vec<i64>,
}

impl PermissionGrant {
    pub fn owner() -> Self {
        Self {
            permission_type: PermissionType::Owner,
            branches_allowed: vec![],
            stores_allowed: vec![],
        }
    }

    pub fn encode(&self) -> Result<String, AppError> {
        serde_json::to_string(self).map_err(|e| AppError::InternalServerError(e.into()))
    }

    pub fn decode(encoded: &str) -> Result<Self, AppError> {
        serde_json::from_str(encoded)
            .map_err(|e| AppError::InvalidArgument(format!("Permissão codificada inválida: {}", e)))
    }
}

// ---
// 4. Permission (a "ponte" Usuário-Empresa)
// ---
// Chave (company_id, user_id): no máximo uma linha por usuário e empresa.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Permission {
    pub company_id: i64,
    pub user_id: i64,
    pub encoded_permission: String,
    pub permission_type: PermissionType,
    pub branches_allowed: Vec<i64>,
    pub stores_allowed: Vec<i64>,
}

impl Permission {
    pub fn from_grant(company_id: i64, user_id: i64, grant: &PermissionGrant) -> Result<Self, AppError> {
        Ok(Self {
            company_id,
            user_id,
            encoded_permission: grant.encode()?,
            permission_type: grant.permission_type,
            branches_allowed: grant.branches_allowed.clone(),
            stores_allowed: grant.stores_allowed.clone(),
        })
    }

    pub fn grant(&self) -> PermissionGrant {
        PermissionGrant {
            permission_type: self.permission_type,
            branches_allowed: self.branches_allowed.clone(),
            stores_allowed: self.stores_allowed.clone(),
        }
    }

    pub fn allows_branch(&self, branch_id: i64) -> bool {
        !self.permission_type.is_branch_scoped() || self.branches_allowed.contains(&branch_id)
    }
}

// ---
// 5. Member (o funcionário como o cliente enxerga: permissão + nome)
// ---
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Member {
    pub user_id: i64,
    pub company_id: i64,
    pub username: String,
    pub permission_type: PermissionType,
    pub branches_allowed: Vec<i64>,
    pub stores_allowed: Vec<i64>,
    pub encoded_permission: String,
}

impl Member {
    pub fn new(permission: Permission, username: String) -> Self {
        Self {
            user_id: permission.user_id,
            company_id: permission.company_id,
            username,
            permission_type: permission.permission_type,
            branches_allowed: permission.branches_allowed,
            stores_allowed: permission.stores_allowed,
            encoded_permission: permission.encoded_permission,
        }
    }
}

impl Default for Member {
    fn default() -> Self {
        Self {
            user_id: 0,
            company_id: 0,
            username: String::new(),
            permission_type: PermissionType::BranchWorker,
            branches_allowed: vec![],
            stores_allowed: vec![],
            encoded_permission: String::new(),
        }
    }
}

// ---
// Payloads e respostas das RPCs de empresa
// ---
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateCompanyPayload {
    #[validate(length(min = 1, max = 200, message = "O nome da empresa é obrigatório."))]
    pub company_name: String,
    #[validate(length(min = 1, message = "O device_id é obrigatório."))]
    pub device_id: String,
    pub local_user_time: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct SyncCompaniesPayload {
    #[validate(length(min = 1, message = "O device_id é obrigatório."))]
    pub device_id: String,
    pub local_user_time: DateTime<Utc>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CompanyResponse {
    pub id: i64,
    pub name: String,
    pub permission: String,
    pub signed_license: String,
    pub payment_id: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SyncCompaniesResponse {
    pub companies: Vec<CompanyResponse>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct AddEmployeePayload {
    #[validate(range(min = 1, message = "O id do funcionário é inválido."))]
    pub employee_user_id: i64,
    #[validate(length(min = 1, message = "A permissão é obrigatória."))]
    pub encoded_permission: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AddEmployeeResponse {
    pub employee_id: i64,
    pub employee_name: String,
}
