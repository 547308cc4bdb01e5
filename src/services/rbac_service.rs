// src/services/rbac_service.rs

use std::sync::Arc;

use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::{GrantStore, PermissionStore, RoleStore},
    models::{
        page::{PageData, PageLink},
        rbac::{
            GrantPermissionPayload, NewGrant, Permission, ResolvedGrant, Role, RoleResponse,
            UserPermission,
        },
        relation::EntityKind,
    },
};

/// Administração do catálogo de permissões, dos cargos e das atribuições.
#[derive(Clone)]
pub struct RbacService {
    permissions: Arc<dyn PermissionStore>,
    roles: Arc<dyn RoleStore>,
    grants: Arc<dyn GrantStore>,
}

impl RbacService {
    pub fn new(
        permissions: Arc<dyn PermissionStore>,
        roles: Arc<dyn RoleStore>,
        grants: Arc<dyn GrantStore>,
    ) -> Self {
        Self {
            permissions,
            roles,
            grants,
        }
    }

    // ---
    // Permissões
    // ---

    pub async fn create_permission(&self, tenant_id: Uuid, name: &str) -> Result<Permission, AppError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AppError::InvalidArgument(
                "O nome da permissão é obrigatório.".into(),
            ));
        }

        let permission = self.permissions.insert(tenant_id, name).await?;
        tracing::info!(%tenant_id, permission = %permission.name, "Permissão criada");
        Ok(permission)
    }

    pub async fn list_permissions(
        &self,
        tenant_id: Uuid,
        link: &PageLink,
    ) -> Result<PageData<Permission>, AppError> {
        self.permissions.find_page(tenant_id, link).await
    }

    pub async fn delete_permission(&self, tenant_id: Uuid, id: Uuid) -> Result<(), AppError> {
        // Permissão de outro tenant é tratada como inexistente.
        match self.permissions.find_by_id(id).await? {
            Some(p) if p.tenant_id == tenant_id => {}
            _ => return Err(AppError::NotFound(format!("Permissão {} não encontrada.", id))),
        }

        self.permissions.delete_unreferenced(id).await?;
        tracing::info!(%tenant_id, permission_id = %id, "Permissão removida");
        Ok(())
    }

    // ---
    // Cargos
    // ---

    pub async fn create_role(
        &self,
        tenant_id: Uuid,
        name: &str,
        permission_names: &[String],
    ) -> Result<RoleResponse, AppError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AppError::InvalidArgument("O nome do cargo é obrigatório.".into()));
        }

        // 1. Resolve nomes para IDs (nomes desconhecidos são ignorados)
        let mut linked: Vec<Permission> = Vec::new();
        for wanted in permission_names {
            if let Some(p) = self.permissions.find_by_name(tenant_id, wanted).await? {
                if !linked.iter().any(|l| l.id == p.id) {
                    linked.push(p);
                }
            }
        }

        // 2. Cria o cargo e o vínculo na mesma transação
        let ids: Vec<Uuid> = linked.iter().map(|p| p.id).collect();
        let role = self.roles.create_with_permissions(tenant_id, name, &ids).await?;

        tracing::info!(%tenant_id, role = %role.name, permissions = ids.len(), "Cargo criado");
        Ok(RoleResponse {
            role,
            permissions: linked.into_iter().map(|p| p.name).collect(),
        })
    }

    pub async fn add_permission_to_role(
        &self,
        tenant_id: Uuid,
        role_id: Uuid,
        permission_name: &str,
    ) -> Result<(), AppError> {
        let role = self.find_role(tenant_id, role_id).await?;
        let permission = self.find_permission(tenant_id, permission_name).await?;
        self.roles.add_permission(role.id, permission.id).await
    }

    pub async fn remove_permission_from_role(
        &self,
        tenant_id: Uuid,
        role_id: Uuid,
        permission_name: &str,
    ) -> Result<(), AppError> {
        let role = self.find_role(tenant_id, role_id).await?;
        let permission = self.find_permission(tenant_id, permission_name).await?;
        self.roles.remove_permission(role.id, permission.id).await
    }

    pub async fn list_roles(&self, tenant_id: Uuid, link: &PageLink) -> Result<PageData<Role>, AppError> {
        self.roles.find_page(tenant_id, link).await
    }

    pub async fn list_role_permissions(
        &self,
        tenant_id: Uuid,
        role_id: Uuid,
        link: &PageLink,
    ) -> Result<PageData<Permission>, AppError> {
        let role = self.find_role(tenant_id, role_id).await?;
        self.roles.permission_page(role.id, link).await
    }

    /// Remove o cargo e as concessões que ele gerou. Devolve quantas concessões saíram.
    pub async fn delete_role(&self, tenant_id: Uuid, role_id: Uuid) -> Result<u64, AppError> {
        let role = self.find_role(tenant_id, role_id).await?;
        let removed = self.roles.delete(role.id).await?;
        tracing::info!(%tenant_id, role = %role.name, grants_removed = removed, "Cargo removido");
        Ok(removed)
    }

    // ---
    // Atribuições
    // ---

    /// Concessões diretas (sem cargo), de entidade ou de API.
    pub async fn grant_permissions(
        &self,
        tenant_id: Uuid,
        requested: &[GrantPermissionPayload],
    ) -> Result<Vec<UserPermission>, AppError> {
        if requested.is_empty() {
            return Err(AppError::InvalidArgument("Informe ao menos uma concessão.".into()));
        }

        // 1. Valida o escopo e resolve os nomes antes de gravar qualquer coisa
        let mut grants = Vec::with_capacity(requested.len());
        for item in requested {
            let api_url = item.api_url.as_deref().map(str::trim).filter(|u| !u.is_empty());
            match (item.entity_id, item.entity_type, api_url) {
                (Some(_), Some(_), None) | (None, None, Some(_)) => {}
                (Some(_), None, None) => {
                    return Err(AppError::InvalidArgument(
                        "Informe o tipo da entidade (ASSET ou DEVICE).".into(),
                    ));
                }
                _ => {
                    return Err(AppError::InvalidArgument(
                        "A concessão precisa de uma entidade ou de uma URL de API (não ambas).".into(),
                    ));
                }
            }

            let permission = self.find_permission(tenant_id, &item.permission).await?;
            grants.push(NewGrant {
                user_id: item.user_id,
                permission_id: permission.id,
                role_id: None,
                entity_id: item.entity_id,
                entity_type: item.entity_type,
                api_url: api_url.map(str::to_string),
            });
        }

        // 2. Grava tudo na mesma transação
        let saved = self.grants.insert_all(grants).await?;
        tracing::info!(%tenant_id, grants = saved.len(), "Concessões diretas criadas");
        Ok(saved)
    }

    /// Remove a concessão `(user_id, entity_id, permission_id)`.
    pub async fn revoke_grant(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
        entity_id: Uuid,
        permission_id: Uuid,
    ) -> Result<u64, AppError> {
        match self.permissions.find_by_id(permission_id).await? {
            Some(p) if p.tenant_id == tenant_id => {}
            _ => {
                return Err(AppError::NotFound(format!(
                    "Permissão {} não encontrada.",
                    permission_id
                )));
            }
        }

        let removed = self.grants.delete_one(user_id, entity_id, permission_id).await?;
        tracing::info!(%user_id, %entity_id, %permission_id, removed, "Concessão removida");
        Ok(removed)
    }

    /// Cada permissão do cargo vira uma concessão do usuário (com `role_id` preenchido).
    pub async fn assign_role_to_user(
        &self,
        tenant_id: Uuid,
        role_id: Uuid,
        user_id: Uuid,
        entity_id: Option<Uuid>,
        entity_kind: Option<EntityKind>,
    ) -> Result<Vec<UserPermission>, AppError> {
        if entity_id.is_some() && entity_kind.is_none() {
            return Err(AppError::InvalidArgument(
                "Informe o tipo da entidade (ASSET ou DEVICE).".into(),
            ));
        }

        let role = self.find_role(tenant_id, role_id).await?;
        let permission_ids = self.roles.permission_ids(role.id).await?;
        if permission_ids.is_empty() {
            return Err(AppError::InvalidArgument(format!(
                "O cargo '{}' não possui permissões.",
                role.name
            )));
        }

        let grants = permission_ids
            .into_iter()
            .map(|permission_id| NewGrant {
                user_id,
                permission_id,
                role_id: Some(role.id),
                entity_id,
                entity_type: entity_id.and(entity_kind),
                api_url: None,
            })
            .collect();

        let saved = self.grants.insert_all(grants).await?;
        tracing::info!(%user_id, role = %role.name, grants = saved.len(), "Cargo atribuído");
        Ok(saved)
    }

    pub async fn unassign_role_from_user(
        &self,
        tenant_id: Uuid,
        role_id: Uuid,
        user_id: Uuid,
    ) -> Result<u64, AppError> {
        let role = self.find_role(tenant_id, role_id).await?;
        let removed = self.grants.delete_by_user_and_role(user_id, role.id).await?;
        tracing::info!(%user_id, role = %role.name, removed, "Cargo removido do usuário");
        Ok(removed)
    }

    pub async fn list_user_grants(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
        link: &PageLink,
    ) -> Result<PageData<ResolvedGrant>, AppError> {
        self.grants.find_page_by_user(tenant_id, user_id, link).await
    }

    async fn find_role(&self, tenant_id: Uuid, role_id: Uuid) -> Result<Role, AppError> {
        match self.roles.find_by_id(role_id).await? {
            Some(role) if role.tenant_id == tenant_id => Ok(role),
            _ => Err(AppError::NotFound(format!("Cargo {} não encontrado.", role_id))),
        }
    }

    async fn find_permission(&self, tenant_id: Uuid, name: &str) -> Result<Permission, AppError> {
        self.permissions
            .find_by_name(tenant_id, name)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Permissão '{}' não encontrada.", name)))
    }
}
