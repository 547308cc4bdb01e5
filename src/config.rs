// src/config.rs

use std::{env, str::FromStr, sync::Arc, time::Duration};

use anyhow::Context;
use sqlx::{postgres::PgPoolOptions, PgPool};

use crate::{
    db::{AttributeRepository, EntityRepository, RbacRepository, RelationRepository},
    services::{
        accessible_entity_service::AccessibleEntityService,
        attribute_service::AttributeService,
        permission_service::PermissionService,
        rbac_service::RbacService,
        relation_service::{RelationService, ResolverConfig},
    },
};

// Configuração lida do ambiente (.env opcional)
#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: String,
    pub bind_addr: String,
    pub db_max_connections: u32,
    pub db_acquire_timeout: Duration,
    pub request_timeout: Duration,
    pub resolver_max_depth: usize,
    pub resolver_fanout: usize,
    pub resolver_max_in_flight: usize,
    pub run_migrations: bool,
}

impl Settings {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let db_max_connections: u32 = parse_or("DB_MAX_CONNECTIONS", 5)?;

        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL deve ser definida")?,
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string()),
            db_max_connections,
            db_acquire_timeout: Duration::from_secs(parse_or("DB_ACQUIRE_TIMEOUT_SECS", 3)?),
            request_timeout: Duration::from_millis(parse_or("REQUEST_TIMEOUT_MS", 10_000)?),
            resolver_max_depth: parse_or("RESOLVER_MAX_DEPTH", 10)?,
            resolver_fanout: parse_or("RESOLVER_FANOUT", 8)?,
            // Padrão: o tamanho do pool, para o resolvedor não esperar conexão.
            resolver_max_in_flight: parse_or("RESOLVER_MAX_IN_FLIGHT", db_max_connections as usize)?,
            run_migrations: parse_or("RUN_MIGRATIONS", true)?,
        })
    }

    pub fn resolver(&self) -> ResolverConfig {
        ResolverConfig {
            max_depth: self.resolver_max_depth,
            fanout: self.resolver_fanout.max(1),
            max_in_flight: self.resolver_max_in_flight.max(1),
        }
    }
}

fn parse_or<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} inválida: '{}'", key, raw)),
        Err(_) => Ok(default),
    }
}

// O estado compartilhado que será acessível em toda a aplicação
#[derive(Clone)]
pub struct AppState {
    pub db_pool: PgPool,
    pub settings: Settings,
    pub relation_service: RelationService,
    pub permission_service: PermissionService,
    pub accessible_entity_service: AccessibleEntityService,
    pub rbac_service: RbacService,
}

impl AppState {
    pub async fn new(settings: Settings) -> anyhow::Result<Self> {
        let db_pool = PgPoolOptions::new()
            .max_connections(settings.db_max_connections)
            .acquire_timeout(settings.db_acquire_timeout)
            .connect(&settings.database_url)
            .await
            .context("Falha ao conectar ao banco de dados")?;

        tracing::info!("✅ Conexão com o banco de dados estabelecida com sucesso!");

        // --- Monta o gráfico de dependências ---
        let relation_repo = Arc::new(RelationRepository::new(db_pool.clone()));
        let attribute_repo = Arc::new(AttributeRepository::new(db_pool.clone()));
        let entity_repo = Arc::new(EntityRepository::new(db_pool.clone()));
        let rbac_repo = Arc::new(RbacRepository::new(db_pool.clone()));

        let attribute_service = AttributeService::new(attribute_repo);
        let permission_service = PermissionService::new(rbac_repo.clone(), rbac_repo.clone());
        let relation_service = RelationService::new(
            relation_repo,
            attribute_service.clone(),
            settings.resolver(),
        );
        let accessible_entity_service = AccessibleEntityService::new(
            permission_service.clone(),
            rbac_repo.clone(),
            entity_repo,
            attribute_service,
            settings.resolver_fanout,
        );
        let rbac_service = RbacService::new(rbac_repo.clone(), rbac_repo.clone(), rbac_repo);

        Ok(Self {
            db_pool,
            settings,
            relation_service,
            permission_service,
            accessible_entity_service,
            rbac_service,
        })
    }
}
