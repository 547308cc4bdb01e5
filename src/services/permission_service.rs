// src/services/permission_service.rs

use std::sync::Arc;

use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::{GrantStore, PermissionStore},
    models::rbac::{Permission, ResolvedGrant, RevocationSummary, WILDCARD_PERMISSION},
};

/// Decide se um usuário pode agir sobre uma entidade ou superfície de API.
///
/// Não há cache: cada verificação lê as concessões do armazenamento.
#[derive(Clone)]
pub struct PermissionService {
    permissions: Arc<dyn PermissionStore>,
    grants: Arc<dyn GrantStore>,
}

impl PermissionService {
    pub fn new(permissions: Arc<dyn PermissionStore>, grants: Arc<dyn GrantStore>) -> Self {
        Self {
            permissions,
            grants,
        }
    }

    pub async fn authorize(
        &self,
        user_id: Uuid,
        entity_id: Option<Uuid>,
        api_url: Option<&str>,
        required: &[String],
    ) -> Result<(), AppError> {
        if required.is_empty() {
            return Err(AppError::InvalidArgument(
                "Informe ao menos uma permissão.".into(),
            ));
        }
        if entity_id.is_none() && api_url.is_none() {
            return Err(AppError::InvalidArgument(
                "Informe a entidade ou a URL da API.".into(),
            ));
        }

        // 1. Concessões da entidade
        if let Some(entity_id) = entity_id {
            let grants = self.grants.find_by_user_and_entity(user_id, entity_id).await?;
            if any_grant_matches(&grants, required) {
                tracing::debug!(%user_id, %entity_id, "Acesso liberado pela entidade");
                return Ok(());
            }
        }

        // 2. Concessões da API
        if let Some(api_url) = api_url {
            let grants = self.grants.find_by_user_and_api_url(user_id, api_url).await?;
            if any_grant_matches(&grants, required) {
                tracing::debug!(%user_id, api_url, "Acesso liberado pela API");
                return Ok(());
            }
        }

        tracing::info!(%user_id, ?entity_id, ?api_url, ?required, "Acesso negado");
        Err(AppError::Denied(
            "Você não tem permissão para realizar esta ação.".into(),
        ))
    }

    pub async fn resolve_permission(
        &self,
        name: &str,
        tenant_id: Uuid,
    ) -> Result<Permission, AppError> {
        self.permissions
            .find_by_name(tenant_id, name)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Permissão '{}' não encontrada.", name)))
    }

    /// Remove o acesso a uma entidade e a desvincula do cliente, tudo numa transação.
    /// Nenhuma concessão encontrada não é erro.
    pub async fn revoke_all_grants_for_entity(
        &self,
        entity_id: Uuid,
        permission_name: &str,
        tenant_id: Uuid,
        acting_user_id: Uuid,
    ) -> Result<RevocationSummary, AppError> {
        let permission = self.resolve_permission(permission_name, tenant_id).await?;

        let summary = self
            .grants
            .revoke_entity_access(tenant_id, entity_id, permission.id, acting_user_id)
            .await?;

        tracing::info!(
            %entity_id,
            permission = %permission.name,
            grants_removed = summary.grants_removed,
            detached = summary.detached,
            "Acesso à entidade revogado"
        );
        Ok(summary)
    }
}

fn any_grant_matches(grants: &[ResolvedGrant], required: &[String]) -> bool {
    grants.iter().any(|grant| {
        grant.permission_name.eq_ignore_ascii_case(WILDCARD_PERMISSION)
            || required
                .iter()
                .any(|name| grant.permission_name.eq_ignore_ascii_case(name))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::{fixtures::asset, InMemoryBackend};
    use crate::models::entity::NULL_CUSTOMER_ID;
    use crate::models::rbac::NewGrant;
    use crate::models::relation::EntityKind;

    struct Fixture {
        backend: InMemoryBackend,
        service: PermissionService,
        tenant: Uuid,
        user: Uuid,
    }

    fn fixture() -> Fixture {
        let backend = InMemoryBackend::new();
        let store = Arc::new(backend.clone());
        Fixture {
            service: PermissionService::new(store.clone(), store),
            backend,
            tenant: Uuid::new_v4(),
            user: Uuid::new_v4(),
        }
    }

    impl Fixture {
        fn grant_entity(&self, permission: &str, entity_id: Uuid) {
            let permission = self.backend.seed_permission(self.tenant, permission);
            self.backend.seed_grant(NewGrant {
                user_id: self.user,
                permission_id: permission.id,
                role_id: None,
                entity_id: Some(entity_id),
                entity_type: Some(EntityKind::Asset),
                api_url: None,
            });
        }

        fn grant_api(&self, permission: &str, api_url: &str) {
            let permission = self.backend.seed_permission(self.tenant, permission);
            self.backend.seed_grant(NewGrant {
                user_id: self.user,
                permission_id: permission.id,
                role_id: None,
                entity_id: None,
                entity_type: None,
                api_url: Some(api_url.to_string()),
            });
        }
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn wildcard_grant_satisfies_any_permission() {
        let fx = fixture();
        let entity = Uuid::new_v4();
        fx.grant_entity("all", entity);

        let result = fx
            .service
            .authorize(fx.user, Some(entity), None, &names(&["DELETE_EVERYTHING"]))
            .await;

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn read_does_not_satisfy_write() {
        let fx = fixture();
        let entity = Uuid::new_v4();
        fx.grant_entity("READ", entity);

        let result = fx
            .service
            .authorize(fx.user, Some(entity), None, &names(&["WRITE"]))
            .await;

        assert!(matches!(result, Err(AppError::Denied(_))));
    }

    #[tokio::test]
    async fn names_match_without_case() {
        let fx = fixture();
        let entity = Uuid::new_v4();
        fx.grant_entity("Write", entity);

        let result = fx
            .service
            .authorize(fx.user, Some(entity), None, &names(&["READ", "write"]))
            .await;

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn api_grant_is_the_fallback_for_entity_checks() {
        let fx = fixture();
        let entity = Uuid::new_v4();
        fx.grant_entity("READ", entity);
        fx.grant_api("WRITE", "/api/relations");

        let result = fx
            .service
            .authorize(fx.user, Some(entity), Some("/api/relations"), &names(&["WRITE"]))
            .await;

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn grants_of_other_users_do_not_count() {
        let fx = fixture();
        fx.grant_api("ALL", "/api/relations");

        let result = fx
            .service
            .authorize(Uuid::new_v4(), None, Some("/api/relations"), &names(&["READ"]))
            .await;

        assert!(matches!(result, Err(AppError::Denied(_))));
    }

    #[tokio::test]
    async fn missing_scope_or_names_is_invalid() {
        let fx = fixture();

        let no_scope = fx.service.authorize(fx.user, None, None, &names(&["READ"])).await;
        let no_names = fx
            .service
            .authorize(fx.user, Some(Uuid::new_v4()), None, &[])
            .await;

        assert!(matches!(no_scope, Err(AppError::InvalidArgument(_))));
        assert!(matches!(no_names, Err(AppError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn resolve_permission_ignores_case() {
        let fx = fixture();
        let seeded = fx.backend.seed_permission(fx.tenant, "WRITE");

        let found = fx.service.resolve_permission("write", fx.tenant).await.unwrap();
        let missing = fx.service.resolve_permission("WRITE", Uuid::new_v4()).await;

        assert_eq!(found.id, seeded.id);
        assert!(matches!(missing, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn revocation_without_grants_still_detaches() {
        let fx = fixture();
        fx.backend.seed_permission(fx.tenant, "WRITE");
        let mut building = asset(fx.tenant, "Building1", "Building");
        building.customer_id = Some(Uuid::new_v4());
        fx.backend.add_entity(building.clone());

        let summary = fx
            .service
            .revoke_all_grants_for_entity(building.id, "WRITE", fx.tenant, fx.user)
            .await
            .unwrap();

        assert_eq!(summary.grants_removed, 0);
        assert!(summary.detached);
        let stored = fx.backend.entity(building.id).unwrap();
        assert_eq!(stored.customer_id, Some(NULL_CUSTOMER_ID));
        assert_eq!(stored.owner(), None);
    }

    #[tokio::test]
    async fn revocation_removes_permission_and_acting_user_grants() {
        let fx = fixture();
        let building = asset(fx.tenant, "Building1", "Building");
        fx.backend.add_entity(building.clone());
        let write = fx.backend.seed_permission(fx.tenant, "WRITE");
        fx.grant_entity("READ", building.id);
        // Outro usuário com WRITE na mesma entidade.
        fx.backend.seed_grant(NewGrant {
            user_id: Uuid::new_v4(),
            permission_id: write.id,
            role_id: None,
            entity_id: Some(building.id),
            entity_type: Some(EntityKind::Asset),
            api_url: None,
        });
        // Concessão de outra entidade fica.
        fx.grant_entity("READ", Uuid::new_v4());

        let summary = fx
            .service
            .revoke_all_grants_for_entity(building.id, "write", fx.tenant, fx.user)
            .await
            .unwrap();

        assert_eq!(summary.grants_removed, 2);
        assert_eq!(fx.backend.grants().len(), 1);
    }

    #[tokio::test]
    async fn failed_revocation_leaves_everything_in_place() {
        let fx = fixture();
        let mut building = asset(fx.tenant, "Building1", "Building");
        let customer = Uuid::new_v4();
        building.customer_id = Some(customer);
        fx.backend.add_entity(building.clone());
        fx.backend.seed_permission(fx.tenant, "WRITE");
        fx.grant_entity("READ", building.id);
        fx.backend.fail_revocation();

        let result = fx
            .service
            .revoke_all_grants_for_entity(building.id, "WRITE", fx.tenant, fx.user)
            .await;

        assert!(matches!(result, Err(AppError::Upstream(_))));
        assert_eq!(fx.backend.grants().len(), 1);
        assert_eq!(fx.backend.entity(building.id).unwrap().customer_id, Some(customer));
    }

    #[tokio::test]
    async fn revocation_of_unknown_permission_is_not_found() {
        let fx = fixture();

        let result = fx
            .service
            .revoke_all_grants_for_entity(Uuid::new_v4(), "WRITE", fx.tenant, fx.user)
            .await;

        assert!(matches!(result, Err(AppError::NotFound(_))));
    }
}
