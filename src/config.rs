// src/config.rs

use std::{env, sync::Arc, time::Duration};

use anyhow::Context;
use sqlx::{postgres::PgPoolOptions, PgPool};

use crate::{
    db::PgStore,
    services::{
        auth::{AuthService, HmacIdentityProvider},
        license::LicenseSigner,
        sync_service::SyncService,
        tenancy_service::TenancyService,
    },
};

const DEFAULT_MAX_CONNECTIONS: u32 = 5;

// Configuração lida uma vez na inicialização.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub login_cookie_secret: String,
    pub identity_provider_secret: String,
    pub license_signing_key_path: String,
    pub database_max_connections: u32,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let required = |key: &str| {
            lookup(key)
                .filter(|value| !value.trim().is_empty())
                .with_context(|| format!("{} deve ser definida", key))
        };

        let port = required("PORT")?
            .trim()
            .parse::<u16>()
            .context("PORT deve ser um número de porta válido")?;

        let database_max_connections = match lookup("DATABASE_MAX_CONNECTIONS") {
            Some(value) => value
                .trim()
                .parse::<u32>()
                .context("DATABASE_MAX_CONNECTIONS deve ser um inteiro positivo")?,
            None => DEFAULT_MAX_CONNECTIONS,
        };

        Ok(Self {
            port,
            database_url: required("DATABASE_URL")?,
            login_cookie_secret: required("LOGIN_COOKIE_SECRET")?,
            identity_provider_secret: required("IDENTITY_PROVIDER_SECRET")?,
            license_signing_key_path: required("LICENSE_SIGNING_KEY_PATH")?,
            database_max_connections,
        })
    }
}

// O estado compartilhado que será acessível em toda a aplicação
#[derive(Clone)]
pub struct AppState {
    pub db_pool: PgPool,
    pub auth_service: AuthService<PgStore>,
    pub tenancy_service: TenancyService<PgStore>,
    pub sync_service: SyncService<PgStore>,
}

impl AppState {
    pub async fn new(config: &Config) -> anyhow::Result<Self> {
        // A chave de licença é carregada antes do banco: sem ela nada sobe
        let license = LicenseSigner::load(&config.license_signing_key_path)?;

        let db_pool = PgPoolOptions::new()
            .max_connections(config.database_max_connections)
            .acquire_timeout(Duration::from_secs(3))
            .connect(&config.database_url)
            .await
            .context("Falha ao conectar ao banco de dados")?;

        tracing::info!("✅ Conexão com o banco de dados estabelecida com sucesso!");

        // --- Monta o gráfico de dependências ---
        let store = PgStore::new(db_pool.clone());
        let auth_service = AuthService::new(store.clone(), &config.login_cookie_secret);
        let identity = Arc::new(HmacIdentityProvider::new(&config.identity_provider_secret));
        let tenancy_service = TenancyService::new(store.clone(), auth_service.clone(), identity, Arc::new(license));
        let sync_service = SyncService::new(store);

        Ok(Self {
            db_pool,
            auth_service,
            tenancy_service,
            sync_service,
        })
    }
}
