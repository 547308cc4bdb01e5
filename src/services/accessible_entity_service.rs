// src/services/accessible_entity_service.rs

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures::{stream, StreamExt};
use uuid::Uuid;

use crate::{
    common::{call_context::CallContext, error::AppError},
    db::{EntityStore, GrantStore},
    models::{
        entity::{AccessibleEntity, EntitySummary},
        relation::EntityKind,
    },
    services::{attribute_service::AttributeService, permission_service::PermissionService},
};

#[derive(Debug, Clone)]
pub struct AccessibleEntityQuery {
    pub user_id: Uuid,
    pub permission: String,
    pub kind: EntityKind,
    pub tenant_id: Uuid,
    pub customer_id: Option<Uuid>,
    pub profile: Option<String>,
}

/// Lista plana das entidades que o usuário alcança com uma permissão.
#[derive(Clone)]
pub struct AccessibleEntityService {
    permissions: PermissionService,
    grants: Arc<dyn GrantStore>,
    entities: Arc<dyn EntityStore>,
    attributes: AttributeService,
    fanout: usize,
}

impl AccessibleEntityService {
    pub fn new(
        permissions: PermissionService,
        grants: Arc<dyn GrantStore>,
        entities: Arc<dyn EntityStore>,
        attributes: AttributeService,
        fanout: usize,
    ) -> Self {
        Self {
            permissions,
            grants,
            entities,
            attributes,
            fanout: fanout.max(1),
        }
    }

    pub async fn list(
        &self,
        query: &AccessibleEntityQuery,
        ctx: &CallContext,
    ) -> Result<Vec<AccessibleEntity>, AppError> {
        ctx.run(self.list_entities(query)).await
    }

    async fn list_entities(&self, query: &AccessibleEntityQuery) -> Result<Vec<AccessibleEntity>, AppError> {
        // 1. Permissão pelo nome
        let permission = self
            .permissions
            .resolve_permission(&query.permission, query.tenant_id)
            .await?;

        // 2. Ids concedidos (sem repetição, na ordem das concessões)
        let mut seen = HashSet::new();
        let ids: Vec<Uuid> = self
            .grants
            .find_entity_ids(query.user_id, permission.id, query.kind)
            .await?
            .into_iter()
            .filter(|id| seen.insert(*id))
            .collect();

        if ids.is_empty() {
            return Ok(Vec::new());
        }

        // 3. Carga em lote + filtros de cliente e perfil
        let mut loaded = self
            .entities
            .find_by_ids(query.tenant_id, query.kind, &ids)
            .await?;
        // O banco não garante a ordem do `ANY`.
        let position: HashMap<Uuid, usize> = ids.iter().enumerate().map(|(i, id)| (*id, i)).collect();
        loaded.sort_by_key(|e| position.get(&e.id).copied().unwrap_or(usize::MAX));

        let visible: Vec<EntitySummary> = loaded
            .into_iter()
            .filter(|entity| match (query.customer_id, entity.owner()) {
                (Some(customer), Some(owner)) => customer == owner,
                _ => true,
            })
            .filter(|entity| match &query.profile {
                Some(profile) => entity.profile.eq_ignore_ascii_case(profile),
                None => true,
            })
            .collect();

        // 4. Atributos de todos os escopos
        let scopes = AttributeService::all_scopes();
        let listed: Vec<AccessibleEntity> = stream::iter(visible)
            .map(|entity| {
                let scopes = &scopes;
                async move {
                    let attributes = self
                        .attributes
                        .project_or_empty(query.tenant_id, entity.id, entity.kind, scopes)
                        .await;
                    AccessibleEntity {
                        id: entity.id,
                        name: entity.name,
                        profile: entity.profile,
                        attributes,
                    }
                }
            })
            .buffered(self.fanout)
            .collect()
            .await;

        tracing::debug!(
            user_id = %query.user_id,
            permission = %permission.name,
            kind = %query.kind,
            granted = ids.len(),
            listed = listed.len(),
            "Entidades acessíveis listadas"
        );
        Ok(listed)
    }
}
