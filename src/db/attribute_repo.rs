// src/db/attribute_repo.rs

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::stores::AttributeStore,
    models::{
        attribute::{AttributeScope, KvEntry},
        relation::EntityKind,
    },
};

// Atributos da plataforma: `attribute_kv` com as chaves no `key_dictionary`
#[derive(Clone)]
pub struct AttributeRepository {
    pool: PgPool,
}

impl AttributeRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AttributeStore for AttributeRepository {
    async fn find_all(
        &self,
        tenant_id: Uuid,
        entity_id: Uuid,
        kind: EntityKind,
        scope: AttributeScope,
    ) -> Result<Vec<KvEntry>, AppError> {
        let entries = sqlx::query_as::<_, KvEntry>(
            r#"
            SELECT kd.key, a.str_v, a.bool_v, a.dbl_v, a.long_v, a.json_v::jsonb AS json_v, a.last_update_ts
            FROM attribute_kv a
            JOIN key_dictionary kd ON kd.key_id = a.attribute_key
            WHERE a.entity_id = $1
              AND a.attribute_type = $2
            ORDER BY kd.key
            "#,
        )
            .bind(entity_id)
            .bind(scope.code())
            .fetch_all(&self.pool)
            .await?;

        tracing::trace!(%tenant_id, %entity_id, %kind, ?scope, count = entries.len(), "Atributos lidos");
        Ok(entries)
    }
}
