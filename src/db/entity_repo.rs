// src/db/entity_repo.rs

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::stores::EntityStore,
    models::{
        entity::{EntityRow, EntitySummary},
        relation::EntityKind,
    },
};

// Leitura em lote das tabelas `asset` e `device`
#[derive(Clone)]
pub struct EntityRepository {
    pool: PgPool,
}

impl EntityRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EntityStore for EntityRepository {
    async fn find_by_ids(
        &self,
        tenant_id: Uuid,
        kind: EntityKind,
        ids: &[Uuid],
    ) -> Result<Vec<EntitySummary>, AppError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let sql = match kind {
            EntityKind::Asset => {
                "SELECT id, name, type, tenant_id, customer_id FROM asset WHERE tenant_id = $1 AND id = ANY($2)"
            }
            EntityKind::Device => {
                "SELECT id, name, type, tenant_id, customer_id FROM device WHERE tenant_id = $1 AND id = ANY($2)"
            }
        };

        let rows = sqlx::query_as::<_, EntityRow>(sql)
            .bind(tenant_id)
            .bind(ids)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(|row| row.into_summary(kind)).collect())
    }
}
