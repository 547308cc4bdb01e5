// src/services/attribute_service.rs

use std::collections::BTreeSet;
use std::sync::Arc;

use futures::future::try_join_all;
use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::AttributeStore,
    models::{
        attribute::{AttributeMap, AttributeScope},
        relation::EntityKind,
    },
};

/// Projeta os atributos de uma entidade (um escopo por chamada ao armazenamento)
/// num único mapa.
///
/// Colisão de chave entre escopos: vence o escopo de maior precedência,
/// CLIENT > SERVER > SHARED, independente da ordem pedida.
#[derive(Clone)]
pub struct AttributeService {
    store: Arc<dyn AttributeStore>,
}

impl AttributeService {
    pub fn new(store: Arc<dyn AttributeStore>) -> Self {
        Self { store }
    }

    /// Escopos usados nos nós da árvore: devices juntam CLIENT e SERVER, assets só SERVER.
    pub fn default_scopes(kind: EntityKind) -> BTreeSet<AttributeScope> {
        match kind {
            EntityKind::Device => {
                BTreeSet::from([AttributeScope::ClientScope, AttributeScope::ServerScope])
            }
            EntityKind::Asset => BTreeSet::from([AttributeScope::ServerScope]),
        }
    }

    pub fn all_scopes() -> BTreeSet<AttributeScope> {
        BTreeSet::from([
            AttributeScope::ClientScope,
            AttributeScope::ServerScope,
            AttributeScope::SharedScope,
        ])
    }

    pub async fn project(
        &self,
        tenant_id: Uuid,
        entity_id: Uuid,
        kind: EntityKind,
        scopes: &BTreeSet<AttributeScope>,
    ) -> Result<AttributeMap, AppError> {
        // BTreeSet itera em ordem de precedência.
        let per_scope = try_join_all(
            scopes
                .iter()
                .map(|scope| self.store.find_all(tenant_id, entity_id, kind, *scope)),
        )
        .await?;

        let mut merged = AttributeMap::new();
        for entries in per_scope {
            for entry in entries {
                if !merged.contains_key(&entry.key) {
                    let value = entry.value();
                    merged.insert(entry.key, value);
                }
            }
        }

        Ok(merged)
    }

    /// Como `project`, mas uma falha do armazenamento vira mapa vazio.
    pub async fn project_or_empty(
        &self,
        tenant_id: Uuid,
        entity_id: Uuid,
        kind: EntityKind,
        scopes: &BTreeSet<AttributeScope>,
    ) -> AttributeMap {
        match self.project(tenant_id, entity_id, kind, scopes).await {
            Ok(attributes) => attributes,
            Err(e) => {
                tracing::warn!(%entity_id, %kind, error = %e, "Atributos indisponíveis, seguindo com mapa vazio");
                AttributeMap::new()
            }
        }
    }
}
