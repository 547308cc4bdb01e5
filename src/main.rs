//src/main.rs

use anyhow::Context;
use axum::{
    routing::{delete, get, post},
    Router,
};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use asset_hierarchy::{
    config::{AppState, Settings},
    handlers,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logger compacto; nível vem de RUST_LOG (padrão: info)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .compact()
        .init();

    let settings = Settings::from_env()?;
    let app_state = AppState::new(settings.clone())
        .await
        .context("Falha ao inicializar o estado da aplicação.")?;

    // Tabelas de permissões, cargos e concessões
    if settings.run_migrations {
        sqlx::migrate!()
            .run(&app_state.db_pool)
            .await
            .context("Falha ao rodar as migrações do banco de dados.")?;
        tracing::info!("✅ Migrações do banco de dados executadas com sucesso!");
    }

    let relation_routes = Router::new().route("/", get(handlers::relations::get_relations));

    let permission_routes = Router::new()
        .route(
            "/",
            post(handlers::rbac::create_permission).get(handlers::rbac::list_permissions),
        )
        .route("/{permission_id}", delete(handlers::rbac::delete_permission))
        .route("/check", post(handlers::permissions::check_permission))
        .route("/entities", get(handlers::permissions::list_accessible_entities))
        .route(
            "/entities/{entity_id}",
            delete(handlers::permissions::revoke_entity_access),
        );

    let role_routes = Router::new()
        .route(
            "/",
            post(handlers::rbac::create_role).get(handlers::rbac::list_roles),
        )
        .route("/{role_id}", delete(handlers::rbac::delete_role))
        .route("/{role_id}/permissions", get(handlers::rbac::list_role_permissions))
        .route(
            "/{role_id}/permissions/{name}",
            post(handlers::rbac::add_role_permission).delete(handlers::rbac::remove_role_permission),
        )
        .route("/{role_id}/assignments", post(handlers::rbac::assign_role))
        .route(
            "/{role_id}/assignments/{user_id}",
            delete(handlers::rbac::unassign_role),
        );

    // Combina tudo no router principal
    let app = Router::new()
        .route("/api/health", get(|| async { "OK" }))
        .nest("/api/relations", relation_routes)
        .nest("/api/permissions", permission_routes)
        .nest("/api/roles", role_routes)
        .route(
            "/api/users/{user_id}/permissions",
            get(handlers::rbac::list_user_grants),
        )
        .route(
            "/api/user-permissions",
            post(handlers::rbac::grant_permissions).delete(handlers::rbac::revoke_grant),
        )
        .with_state(app_state);

    // Inicia o servidor
    let listener = TcpListener::bind(&settings.bind_addr)
        .await
        .with_context(|| format!("Falha ao iniciar o listener TCP em {}", settings.bind_addr))?;
    tracing::info!("🚀 Servidor escutando em {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Erro no servidor Axum")?;

    tracing::info!("Servidor encerrado");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Falha ao escutar o sinal de desligamento: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Sinal de desligamento recebido, finalizando requisições em andamento");
}
