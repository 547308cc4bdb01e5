// src/db/stores.rs
//
// Contratos dos armazenamentos externos. Os serviços guardam `Arc<dyn ...>`,
// então os traits precisam ser object-safe (por isso o `async_trait`).

use async_trait::async_trait;
use uuid::Uuid;

use crate::common::error::AppError;
use crate::models::{
    attribute::{AttributeScope, KvEntry},
    entity::EntitySummary,
    page::{PageData, PageLink},
    rbac::{NewGrant, Permission, ResolvedGrant, RevocationSummary, Role, UserPermission},
    relation::{EntityKind, RelationEdge, RootSelector},
};

#[async_trait]
pub trait EdgeStore: Send + Sync {
    /// Arestas cuja origem casa com o seletor (perfil ou id), no escopo do tenant/cliente.
    async fn find_root_edges(
        &self,
        selector: &RootSelector,
        tenant_id: Uuid,
        customer_id: Option<Uuid>,
    ) -> Result<Vec<RelationEdge>, AppError>;

    /// Todas as arestas cuja origem está em `parent_ids`, numa única chamada.
    async fn find_child_edges(&self, parent_ids: &[Uuid]) -> Result<Vec<RelationEdge>, AppError>;
}

#[async_trait]
pub trait AttributeStore: Send + Sync {
    async fn find_all(
        &self,
        tenant_id: Uuid,
        entity_id: Uuid,
        kind: EntityKind,
        scope: AttributeScope,
    ) -> Result<Vec<KvEntry>, AppError>;
}

#[async_trait]
pub trait EntityStore: Send + Sync {
    async fn find_by_ids(
        &self,
        tenant_id: Uuid,
        kind: EntityKind,
        ids: &[Uuid],
    ) -> Result<Vec<EntitySummary>, AppError>;
}

#[async_trait]
pub trait PermissionStore: Send + Sync {
    /// Busca sem diferenciar maiúsculas de minúsculas.
    async fn find_by_name(&self, tenant_id: Uuid, name: &str)
    -> Result<Option<Permission>, AppError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Permission>, AppError>;

    /// Falha com `Conflict` se o nome já existe no tenant.
    async fn insert(&self, tenant_id: Uuid, name: &str) -> Result<Permission, AppError>;

    async fn find_page(
        &self,
        tenant_id: Uuid,
        link: &PageLink,
    ) -> Result<PageData<Permission>, AppError>;

    /// Falha com `Conflict` se algum cargo ou concessão ainda aponta para ela.
    async fn delete_unreferenced(&self, id: Uuid) -> Result<(), AppError>;
}

#[async_trait]
pub trait RoleStore: Send + Sync {
    /// Cria o cargo e o vincula às permissões, numa transação.
    async fn create_with_permissions(
        &self,
        tenant_id: Uuid,
        name: &str,
        permission_ids: &[Uuid],
    ) -> Result<Role, AppError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Role>, AppError>;

    async fn add_permission(&self, role_id: Uuid, permission_id: Uuid) -> Result<(), AppError>;

    async fn remove_permission(&self, role_id: Uuid, permission_id: Uuid) -> Result<(), AppError>;

    async fn permission_ids(&self, role_id: Uuid) -> Result<Vec<Uuid>, AppError>;

    async fn find_page(&self, tenant_id: Uuid, link: &PageLink) -> Result<PageData<Role>, AppError>;

    /// Permissões vinculadas ao cargo, ordenadas por nome.
    async fn permission_page(
        &self,
        role_id: Uuid,
        link: &PageLink,
    ) -> Result<PageData<Permission>, AppError>;

    /// Numa transação: apaga as concessões criadas pelo cargo, os vínculos e o cargo.
    /// Devolve quantas concessões saíram.
    async fn delete(&self, role_id: Uuid) -> Result<u64, AppError>;
}

#[async_trait]
pub trait GrantStore: Send + Sync {
    async fn find_by_user_and_entity(
        &self,
        user_id: Uuid,
        entity_id: Uuid,
    ) -> Result<Vec<ResolvedGrant>, AppError>;

    async fn find_by_user_and_api_url(
        &self,
        user_id: Uuid,
        api_url: &str,
    ) -> Result<Vec<ResolvedGrant>, AppError>;

    async fn find_entity_ids(
        &self,
        user_id: Uuid,
        permission_id: Uuid,
        kind: EntityKind,
    ) -> Result<Vec<Uuid>, AppError>;

    async fn insert_all(&self, grants: Vec<NewGrant>) -> Result<Vec<UserPermission>, AppError>;

    async fn delete_by_user_and_role(&self, user_id: Uuid, role_id: Uuid) -> Result<u64, AppError>;

    async fn delete_one(
        &self,
        user_id: Uuid,
        entity_id: Uuid,
        permission_id: Uuid,
    ) -> Result<u64, AppError>;

    /// Só concessões cujas permissões pertencem a `tenant_id`.
    async fn find_page_by_user(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
        link: &PageLink,
    ) -> Result<PageData<ResolvedGrant>, AppError>;

    /// Numa única transação: apaga as concessões `(permission_id, entity_id)`,
    /// as concessões `(acting_user_id, entity_id)` e desvincula a entidade do cliente.
    async fn revoke_entity_access(
        &self,
        tenant_id: Uuid,
        entity_id: Uuid,
        permission_id: Uuid,
        acting_user_id: Uuid,
    ) -> Result<RevocationSummary, AppError>;
}
