// src/services/auth.rs
//
// Cookie de login, contrato do provedor de identidade e a "autoridade"
// de cada requisição (usuário + empresa + permissão).

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};

use crate::{
    common::error::AppError,
    db::{Store, StoreTx},
    models::{
        auth::{Claims, ExternalIdentity, IdentityClaims, User},
        tenancy::{Permission, PermissionType},
    },
};

const COOKIE_LIFETIME_DAYS: i64 = 30;

/// Quem chama, em qual empresa e com qual permissão.
/// Resolvida uma vez por requisição; nada é reconsultado depois.
#[derive(Debug, Clone)]
pub struct Authority {
    pub user: User,
    pub company_id: i64,
    pub permission: Permission,
}

impl Authority {
    pub fn permission_type(&self) -> PermissionType {
        self.permission.permission_type
    }

    pub fn require(&self, minimum: PermissionType) -> Result<(), AppError> {
        if self.permission_type().at_least(minimum) {
            Ok(())
        } else {
            Err(AppError::PermissionDenied(format!(
                "Esta operação requer a permissão {:?} ou superior.",
                minimum
            )))
        }
    }
}

// ---
// Provedor de identidade externo
// ---

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Confere o token emitido pelo provedor e devolve a identidade externa.
    async fn verify(&self, auth_token: &str) -> Result<ExternalIdentity, AppError>;
}

/// Tokens HS256 assinados com o segredo do app no provedor.
pub struct HmacIdentityProvider {
    key: DecodingKey,
}

impl HmacIdentityProvider {
    pub fn new(app_secret: &str) -> Self {
        Self { key: DecodingKey::from_secret(app_secret.as_bytes()) }
    }
}

#[async_trait]
impl IdentityProvider for HmacIdentityProvider {
    async fn verify(&self, auth_token: &str) -> Result<ExternalIdentity, AppError> {
        let token_data = decode::<IdentityClaims>(auth_token, &self.key, &Validation::new(Algorithm::HS256))
            .map_err(|e| {
                tracing::debug!("Token do provedor recusado: {}", e);
                AppError::InvalidToken
            })?;

        let claims = token_data.claims;
        if claims.iss.is_empty() || claims.sub.is_empty() {
            return Err(AppError::InvalidToken);
        }

        Ok(ExternalIdentity {
            display_name: claims.name.filter(|n| !n.trim().is_empty()).unwrap_or_else(|| claims.sub.clone()),
            provider: claims.iss,
            provider_user_id: claims.sub,
        })
    }
}

// ---
// Cookie de login + resolução da autoridade
// ---

#[derive(Clone)]
pub struct AuthService<S: Store> {
    store: S,
    cookie_secret: Arc<str>,
}

impl<S: Store> AuthService<S> {
    pub fn new(store: S, cookie_secret: &str) -> Self {
        Self { store, cookie_secret: Arc::from(cookie_secret) }
    }

    pub fn mint_cookie(&self, user_id: i64) -> Result<String, AppError> {
        let now = Utc::now();
        let expires_at = now + chrono::Duration::days(COOKIE_LIFETIME_DAYS);

        let claims = Claims {
            sub: user_id,
            exp: expires_at.timestamp() as usize,
            iat: now.timestamp() as usize,
        };

        Ok(encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.cookie_secret.as_bytes()),
        )?)
    }

    /// Devolve o `user_id` do cookie.
    pub fn validate_cookie(&self, cookie: &str) -> Result<i64, AppError> {
        let token_data = decode::<Claims>(
            cookie,
            &DecodingKey::from_secret(self.cookie_secret.as_bytes()),
            &Validation::new(Algorithm::HS256),
        )
        .map_err(|_| AppError::InvalidToken)?;

        Ok(token_data.claims.sub)
    }

    pub async fn resolve_user(&self, cookie: &str) -> Result<User, AppError> {
        let user_id = self.validate_cookie(cookie)?;

        let mut tx = self.store.begin_read().await?;
        let user = tx.get_user(user_id).await?.ok_or(AppError::UserNotFound)?;
        tx.commit().await?;
        Ok(user)
    }

    pub async fn resolve(&self, cookie: &str, company_id: i64) -> Result<Authority, AppError> {
        let user_id = self.validate_cookie(cookie)?;

        let mut tx = self.store.begin_read().await?;
        let user = tx.get_user(user_id).await?.ok_or(AppError::UserNotFound)?;
        let permission = tx.get_permission(company_id, user_id).await?.ok_or_else(|| {
            AppError::PermissionDenied(format!("Sem acesso à empresa {}.", company_id))
        })?;
        tx.commit().await?;

        Ok(Authority { user, company_id, permission })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::error::RpcCode;
    use crate::db::MemoryStore;
    use crate::services::test_support::{seed_company, seed_user};

    fn service(store: &MemoryStore) -> AuthService<MemoryStore> {
        AuthService::new(store.clone(), "segredo-de-teste")
    }

    #[tokio::test]
    async fn cookie_round_trips_the_user_id() {
        let store = MemoryStore::new();
        let auth = service(&store);

        let cookie = auth.mint_cookie(42).unwrap();
        assert_eq!(auth.validate_cookie(&cookie).unwrap(), 42);

        let other = AuthService::new(store, "outro-segredo");
        assert!(matches!(other.validate_cookie(&cookie), Err(AppError::InvalidToken)));
    }

    #[tokio::test]
    async fn expired_cookie_is_unauthenticated() {
        let store = MemoryStore::new();
        let auth = service(&store);
        let past = (Utc::now() - chrono::Duration::days(1)).timestamp() as usize;
        let claims = Claims { sub: 7, exp: past, iat: past - 10 };
        let cookie = encode(&Header::default(), &claims, &EncodingKey::from_secret(b"segredo-de-teste")).unwrap();

        let err = auth.validate_cookie(&cookie).unwrap_err();
        assert_eq!(err.code(), RpcCode::Unauthenticated);
    }

    #[tokio::test]
    async fn resolve_checks_user_and_company() {
        let store = MemoryStore::new();
        let auth = service(&store);
        let (company_id, owner) = seed_company(&store).await;

        let cookie = auth.mint_cookie(owner.user_id).unwrap();
        let authority = auth.resolve(&cookie, company_id).await.unwrap();
        assert_eq!(authority.user.user_id, owner.user_id);
        assert_eq!(authority.permission_type(), PermissionType::Owner);

        let err = auth.resolve(&cookie, company_id + 1).await.unwrap_err();
        assert_eq!(err.code(), RpcCode::PermissionDenied);

        let stranger = seed_user(&store, "sem-empresa").await;
        let err = auth.resolve(&auth.mint_cookie(stranger).unwrap(), company_id).await.unwrap_err();
        assert_eq!(err.code(), RpcCode::PermissionDenied);

        let err = auth.resolve(&auth.mint_cookie(9_999).unwrap(), company_id).await.unwrap_err();
        assert_eq!(err.code(), RpcCode::NotFound);
    }

    #[tokio::test]
    async fn require_compares_ranks() {
        let store = MemoryStore::new();
        let auth = service(&store);
        let (company_id, owner) = seed_company(&store).await;
        let mut authority = auth.resolve(&auth.mint_cookie(owner.user_id).unwrap(), company_id).await.unwrap();

        assert!(authority.require(PermissionType::Manager).is_ok());
        authority.permission.permission_type = PermissionType::BranchCashier;
        assert!(authority.require(PermissionType::BranchManager).is_err());
        assert!(authority.require(PermissionType::BranchWorker).is_ok());
    }

    #[tokio::test]
    async fn identity_provider_reads_issuer_subject_and_name() {
        let provider = HmacIdentityProvider::new("app-secret");
        let exp = (Utc::now() + chrono::Duration::minutes(5)).timestamp() as usize;
        let claims = IdentityClaims { iss: "google".into(), sub: "abc".into(), name: Some("Ana".into()), exp };
        let token = encode(&Header::default(), &claims, &EncodingKey::from_secret(b"app-secret")).unwrap();

        let identity = provider.verify(&token).await.unwrap();
        assert_eq!(identity.provider, "google");
        assert_eq!(identity.provider_user_id, "abc");
        assert_eq!(identity.display_name, "Ana");

        let forged = encode(&Header::default(), &claims, &EncodingKey::from_secret(b"errado")).unwrap();
        assert!(matches!(provider.verify(&forged).await, Err(AppError::InvalidToken)));
    }
}
