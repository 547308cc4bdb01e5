// src/db/relation_repo.rs

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::stores::EdgeStore,
    models::relation::{RelationEdge, RelationEdgeRow, RootSelector},
};

const EDGE_COLUMNS: &str = r#"
    from_id, relation_from, from_name, asset_profile_from,
    to_id, relation_to, to_name, asset_profile_to,
    tenant_id, customer_id, relation_type, additional_info
"#;

// Leitura da view achatada `asset_device_relation_view` (mantida pela plataforma)
#[derive(Clone)]
pub struct RelationRepository {
    pool: PgPool,
}

impl RelationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // Linhas com tipo de entidade desconhecido são descartadas, não abortam a leitura.
    fn into_edges(rows: Vec<RelationEdgeRow>) -> Vec<RelationEdge> {
        rows.into_iter()
            .filter_map(|row| {
                let (from_id, to_id) = (row.from_id, row.to_id);
                match RelationEdge::try_from(row) {
                    Ok(edge) => Some(edge),
                    Err(e) => {
                        tracing::warn!(%from_id, %to_id, error = %e, "Aresta ignorada");
                        None
                    }
                }
            })
            .collect()
    }
}

#[async_trait]
impl EdgeStore for RelationRepository {
    async fn find_root_edges(
        &self,
        selector: &RootSelector,
        tenant_id: Uuid,
        customer_id: Option<Uuid>,
    ) -> Result<Vec<RelationEdge>, AppError> {
        let rows = match selector {
            RootSelector::Profile(profile) => {
                let sql = format!(
                    r#"
                    SELECT {EDGE_COLUMNS}
                    FROM asset_device_relation_view
                    WHERE asset_profile_from = $1
                      AND tenant_id = $2
                      AND ($3::uuid IS NULL OR customer_id = $3)
                    ORDER BY from_name, from_id, to_name, to_id
                    "#
                );
                sqlx::query_as::<_, RelationEdgeRow>(&sql)
                    .bind(profile)
                    .bind(tenant_id)
                    .bind(customer_id)
                    .fetch_all(&self.pool)
                    .await?
            }
            RootSelector::Entity(entity_id) => {
                let sql = format!(
                    r#"
                    SELECT {EDGE_COLUMNS}
                    FROM asset_device_relation_view
                    WHERE from_id = $1
                      AND tenant_id = $2
                      AND ($3::uuid IS NULL OR customer_id = $3)
                    ORDER BY to_name, to_id
                    "#
                );
                sqlx::query_as::<_, RelationEdgeRow>(&sql)
                    .bind(entity_id)
                    .bind(tenant_id)
                    .bind(customer_id)
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        tracing::debug!(%selector, %tenant_id, rows = rows.len(), "Arestas raiz carregadas");
        Ok(Self::into_edges(rows))
    }

    async fn find_child_edges(&self, parent_ids: &[Uuid]) -> Result<Vec<RelationEdge>, AppError> {
        if parent_ids.is_empty() {
            return Ok(Vec::new());
        }

        // O SQLx lida bem com arrays usando ANY
        let sql = format!(
            r#"
            SELECT {EDGE_COLUMNS}
            FROM asset_device_relation_view
            WHERE from_id = ANY($1)
            ORDER BY to_name, to_id
            "#
        );
        let rows = sqlx::query_as::<_, RelationEdgeRow>(&sql)
            .bind(parent_ids)
            .fetch_all(&self.pool)
            .await?;

        Ok(Self::into_edges(rows))
    }
}
