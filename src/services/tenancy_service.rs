// src/services/tenancy_service.rs

use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;
use validator::Validate;

use crate::{
    common::error::AppError,
    db::{Store, StoreTx},
    models::{
        auth::{EditUserNamePayload, NewUser, User, UserSignupPayload, UserSignupResponse},
        revision::{EntityKind, RevisionAction},
        tenancy::{
            AddEmployeePayload, AddEmployeeResponse, Company, CompanyResponse, CreateCompanyPayload, Permission,
            PermissionGrant, PermissionType, SyncCompaniesPayload, SyncCompaniesResponse,
        },
    },
    services::{
        auth::{AuthService, Authority, IdentityProvider},
        license::{LicenseClaims, LicenseSigner},
        revision_log,
    },
};

#[derive(Clone)]
pub struct TenancyService<S: Store> {
    store: S,
    auth: AuthService<S>,
    identity: Arc<dyn IdentityProvider>,
    license: Arc<LicenseSigner>,
}

impl<S: Store> TenancyService<S> {
    pub fn new(
        store: S,
        auth: AuthService<S>,
        identity: Arc<dyn IdentityProvider>,
        license: Arc<LicenseSigner>,
    ) -> Self {
        Self { store, auth, identity, license }
    }

    /// Confere o token do provedor, cria o usuário no primeiro acesso
    /// e devolve um cookie de login novo.
    pub async fn user_signup(&self, payload: &UserSignupPayload) -> Result<UserSignupResponse, AppError> {
        payload.validate()?;
        let identity = self.identity.verify(&payload.auth_token).await?;

        let mut tx = self.store.begin().await?;
        let user = match tx
            .get_user_by_external_id(&identity.provider, &identity.provider_user_id)
            .await?
        {
            Some(user) => user,
            None => {
                let user = tx
                    .insert_user(&NewUser {
                        username: identity.display_name.clone(),
                        external_provider: identity.provider.clone(),
                        external_provider_user_id: identity.provider_user_id.clone(),
                    })
                    .await?;
                tracing::info!("👤 Usuário {} criado via {}", user.user_id, identity.provider);
                user
            }
        };
        tx.commit().await?;

        tracing::debug!("Login do usuário {} no dispositivo {}", user.user_id, payload.device_id);
        let login_cookie = self.auth.mint_cookie(user.user_id)?;
        Ok(UserSignupResponse { login_cookie, username: user.username })
    }

    /// Cria a empresa e torna o chamador o seu OWNER, atomicamente.
    pub async fn create_company(&self, user: &User, payload: &CreateCompanyPayload) -> Result<CompanyResponse, AppError> {
        payload.validate()?;

        // Identificador do registro de pagamento da empresa
        let payment_id = Uuid::new_v4().to_string();

        let mut tx = self.store.begin().await?;
        let company = tx.insert_company(&payload.company_name, &payment_id).await?;
        let owner = Permission::from_grant(company.company_id, user.user_id, &PermissionGrant::owner())?;
        if !tx.insert_permission(&owner).await? {
            return Err(AppError::Conflict(format!("Permissão da empresa {} já existe", company.company_id)));
        }
        revision_log::record(&mut tx, company.company_id, EntityKind::Member, RevisionAction::Create, user.user_id, 0)
            .await?;
        tx.commit().await?;

        tracing::info!("🏢 Empresa {} criada pelo usuário {}", company.company_id, user.user_id);
        self.company_response(&company, &owner, &payload.device_id, payload.local_user_time)
    }

    /// Todas as empresas do usuário, cada uma com licença nova para o dispositivo.
    pub async fn sync_companies(&self, user: &User, payload: &SyncCompaniesPayload) -> Result<SyncCompaniesResponse, AppError> {
        payload.validate()?;

        let mut tx = self.store.begin_read().await?;
        let permissions = tx.list_user_permissions(user.user_id).await?;
        let mut memberships = Vec::with_capacity(permissions.len());
        for permission in permissions {
            if let Some(company) = tx.get_company(permission.company_id).await? {
                memberships.push((company, permission));
            }
        }
        tx.commit().await?;

        let companies = memberships
            .iter()
            .map(|(company, permission)| {
                self.company_response(company, permission, &payload.device_id, payload.local_user_time)
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(SyncCompaniesResponse { companies })
    }

    /// Renomeia o usuário; cada empresa dele recebe uma revisão MEMBER UPDATE.
    pub async fn edit_user_name(&self, user: &User, payload: &EditUserNamePayload) -> Result<(), AppError> {
        payload.validate()?;

        let mut tx = self.store.begin().await?;
        if !tx.update_username(user.user_id, &payload.new_name).await? {
            return Err(AppError::UserNotFound);
        }
        let permissions = tx.list_user_permissions(user.user_id).await?;
        for permission in &permissions {
            revision_log::record(
                &mut tx,
                permission.company_id,
                EntityKind::Member,
                RevisionAction::Update,
                user.user_id,
                0,
            )
            .await?;
        }
        tx.commit().await?;

        tracing::info!("✏️ Usuário {} renomeado ({} empresas)", user.user_id, permissions.len());
        Ok(())
    }

    /// Dá a um usuário existente uma permissão na empresa do chamador.
    pub async fn add_employee(
        &self,
        authority: &Authority,
        payload: &AddEmployeePayload,
    ) -> Result<AddEmployeeResponse, AppError> {
        payload.validate()?;
        authority.require(PermissionType::Manager)?;

        let grant = PermissionGrant::decode(&payload.encoded_permission)?;
        if grant.permission_type == PermissionType::Owner {
            return Err(AppError::PermissionDenied("Não é possível conceder OWNER.".into()));
        }
        if !authority.permission_type().at_least(grant.permission_type) {
            return Err(AppError::PermissionDenied(format!(
                "Não é possível conceder {:?} com a permissão {:?}.",
                grant.permission_type,
                authority.permission_type()
            )));
        }

        let company_id = authority.company_id;
        let mut tx = self.store.begin().await?;
        let employee = tx.get_user(payload.employee_user_id).await?.ok_or(AppError::UserNotFound)?;
        let permission = Permission::from_grant(company_id, employee.user_id, &grant)?;
        if !tx.insert_permission(&permission).await? {
            return Err(AppError::Conflict(format!(
                "O usuário {} já é membro da empresa {}",
                employee.user_id, company_id
            )));
        }
        revision_log::record(&mut tx, company_id, EntityKind::Member, RevisionAction::Create, employee.user_id, 0)
            .await?;
        tx.commit().await?;

        tracing::info!(
            "🤝 Usuário {} adicionado à empresa {} como {:?}",
            employee.user_id,
            company_id,
            grant.permission_type
        );
        Ok(AddEmployeeResponse { employee_id: employee.user_id, employee_name: employee.username })
    }

    fn company_response(
        &self,
        company: &Company,
        permission: &Permission,
        device_id: &str,
        local_user_time: DateTime<Utc>,
    ) -> Result<CompanyResponse, AppError> {
        let signed_license = self.license.sign(&LicenseClaims {
            company_id: company.company_id,
            user_id: permission.user_id,
            permission: permission.encoded_permission.clone(),
            device_id: device_id.to_string(),
            local_user_time,
            iat: Utc::now().timestamp(),
        })?;

        Ok(CompanyResponse {
            id: company.company_id,
            name: company.name.clone(),
            permission: permission.encoded_permission.clone(),
            signed_license,
            payment_id: company.encoded_payment.clone(),
        })
    }
}
