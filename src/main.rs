//src/main.rs

use axum::{
    middleware as axum_middleware,
    routing::{get, post, put},
    Router,
};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

mod common;
mod config;
mod db;
mod docs;
mod handlers;
mod middleware;
mod models;
mod services;

use crate::config::{AppState, Config};

// Falha de inicialização: loga a causa e encerra com status 1.
fn fatal(context: &str, error: impl std::fmt::Debug) -> ! {
    tracing::error!("🔥 {}: {:?}", context, error);
    std::process::exit(1);
}

fn router(app_state: AppState) -> Router {
    let user_routes = Router::new()
        .route("/signup", post(handlers::auth::user_signup))
        .route("/me/name", put(handlers::auth::edit_user_name));

    let company_routes = Router::new()
        .route("/", post(handlers::tenancy::create_company))
        .route("/sync", post(handlers::tenancy::sync_companies))
        .route("/employees", post(handlers::tenancy::add_employee));

    let sync_routes = Router::new()
        .route("/entities", post(handlers::sync::sync_entities))
        .route("/transactions", post(handlers::sync::sync_transactions));

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", docs::ApiDoc::openapi()))
        .route("/api/health", get(|| async { "OK" }))
        .nest("/api/users", user_routes)
        .nest("/api/companies", company_routes)
        .nest("/api/sync", sync_routes)
        .layer(axum_middleware::from_fn(middleware::panic::panic_guard))
        .with_state(app_state)
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .compact()
        .init();

    let config = Config::from_env().unwrap_or_else(|e| fatal("Configuração inválida", e));

    let app_state = AppState::new(&config)
        .await
        .unwrap_or_else(|e| fatal("Falha ao inicializar o estado da aplicação", e));

    // Faz o app rodar as migrações do SQLx na inicialização
    if let Err(e) = sqlx::migrate!().run(&app_state.db_pool).await {
        fatal("Falha ao rodar as migrações do banco de dados", e);
    }
    tracing::info!("✅ Migrações do banco de dados executadas com sucesso!");

    let app = router(app_state);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| fatal("Falha ao iniciar o listener TCP", e));
    tracing::info!("🚀 Servidor escutando em {}", addr);

    if let Err(e) = axum::serve(listener, app).await {
        fatal("Erro no servidor Axum", e);
    }
}
