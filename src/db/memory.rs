// src/db/memory.rs
//
// Implementação em memória de todos os armazenamentos. Usada pelos testes
// (com injeção de falhas) e útil para rodar o núcleo sem Postgres.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::common::error::AppError;
use crate::db::stores::{
    AttributeStore, EdgeStore, EntityStore, GrantStore, PermissionStore, RoleStore,
};
use crate::models::{
    attribute::{AttributeScope, KvEntry},
    entity::{EntitySummary, NULL_CUSTOMER_ID},
    page::{PageData, PageLink},
    rbac::{
        NewGrant, Permission, ResolvedGrant, RevocationSummary, Role, RolePermission,
        UserPermission,
    },
    relation::{EntityKind, RelationEdge, RootSelector},
};

#[derive(Debug, Default)]
struct InnerState {
    edges: Vec<RelationEdge>,
    attributes: HashMap<(Uuid, AttributeScope), Vec<KvEntry>>,
    entities: Vec<EntitySummary>,
    permissions: Vec<Permission>,
    roles: Vec<Role>,
    role_permissions: Vec<RolePermission>,
    grants: Vec<UserPermission>,
}

#[derive(Debug, Default)]
struct Faults {
    attribute_entities: HashSet<Uuid>,
    edges: bool,
    entity_loads: bool,
    revocation: bool,
    edge_latency: Option<Duration>,
    loose_profile_match: bool,
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryBackend {
    state: Arc<Mutex<InnerState>>,
    faults: Arc<Mutex<Faults>>,
    child_edge_calls: Arc<AtomicUsize>,
    in_flight: Arc<AtomicUsize>,
    peak_in_flight: Arc<AtomicUsize>,
}

// Conta chamadas simultâneas às arestas e aos atributos enquanto vivo.
struct InFlight<'a> {
    current: &'a AtomicUsize,
}

impl<'a> InFlight<'a> {
    fn enter(current: &'a AtomicUsize, peak: &AtomicUsize) -> Self {
        let now = current.fetch_add(1, Ordering::SeqCst) + 1;
        peak.fetch_max(now, Ordering::SeqCst);
        Self { current }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }
}

// Recupera o estado mesmo se outro teste panicou segurando o lock.
fn guard<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, InnerState> {
        guard(&self.state)
    }

    fn faults(&self) -> MutexGuard<'_, Faults> {
        guard(&self.faults)
    }

    // ---
    // Sementes
    // ---

    pub fn add_entity(&self, entity: EntitySummary) {
        self.state().entities.push(entity);
    }

    pub fn add_edge(&self, edge: RelationEdge) {
        self.state().edges.push(edge);
    }

    /// Aresta "from contém to" entre duas entidades já conhecidas.
    pub fn link(&self, from: &EntitySummary, to: &EntitySummary) {
        self.add_edge(contains(from, to));
    }

    pub fn set_attributes(&self, entity_id: Uuid, scope: AttributeScope, entries: Vec<KvEntry>) {
        self.state().attributes.insert((entity_id, scope), entries);
    }

    pub fn seed_permission(&self, tenant_id: Uuid, name: &str) -> Permission {
        let permission = Permission {
            id: Uuid::new_v4(),
            tenant_id,
            name: name.to_string(),
            created_time: Utc::now(),
        };
        self.state().permissions.push(permission.clone());
        permission
    }

    pub fn seed_grant(&self, grant: NewGrant) -> UserPermission {
        let saved = to_user_permission(grant);
        self.state().grants.push(saved.clone());
        saved
    }

    pub fn grants(&self) -> Vec<UserPermission> {
        self.state().grants.clone()
    }

    pub fn entity(&self, id: Uuid) -> Option<EntitySummary> {
        self.state().entities.iter().find(|e| e.id == id).cloned()
    }

    pub fn child_edge_calls(&self) -> usize {
        self.child_edge_calls.load(Ordering::SeqCst)
    }

    /// Maior número de chamadas de arestas/atributos em andamento ao mesmo tempo.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    fn enter(&self) -> InFlight<'_> {
        InFlight::enter(&self.in_flight, &self.peak_in_flight)
    }

    // ---
    // Injeção de falhas
    // ---

    pub fn fail_attributes_for(&self, entity_id: Uuid) {
        self.faults().attribute_entities.insert(entity_id);
    }

    pub fn fail_edges(&self) {
        self.faults().edges = true;
    }

    pub fn fail_entity_loads(&self) {
        self.faults().entity_loads = true;
    }

    pub fn fail_revocation(&self) {
        self.faults().revocation = true;
    }

    pub fn slow_child_edges(&self, latency: Duration) {
        self.faults().edge_latency = Some(latency);
    }

    /// Simula uma consulta de raízes frouxa (perfil sem diferenciar maiúsculas).
    pub fn loose_profile_match(&self) {
        self.faults().loose_profile_match = true;
    }
}

// Entidades de teste com id novo e sem cliente.
#[cfg(test)]
pub(crate) mod fixtures {
    use uuid::Uuid;

    use crate::models::{entity::EntitySummary, relation::EntityKind};

    pub fn asset(tenant_id: Uuid, name: &str, profile: &str) -> EntitySummary {
        entity(tenant_id, EntityKind::Asset, name, profile)
    }

    pub fn device(tenant_id: Uuid, name: &str, profile: &str) -> EntitySummary {
        entity(tenant_id, EntityKind::Device, name, profile)
    }

    fn entity(tenant_id: Uuid, kind: EntityKind, name: &str, profile: &str) -> EntitySummary {
        EntitySummary {
            id: Uuid::new_v4(),
            kind,
            name: name.to_string(),
            profile: profile.to_string(),
            tenant_id,
            customer_id: None,
        }
    }
}

fn contains(from: &EntitySummary, to: &EntitySummary) -> RelationEdge {
    RelationEdge {
        from_id: from.id,
        from_kind: from.kind,
        from_name: from.name.clone(),
        from_profile: from.profile.clone(),
        to_id: to.id,
        to_kind: to.kind,
        to_name: to.name.clone(),
        to_profile: to.profile.clone(),
        tenant_id: from.tenant_id,
        customer_id: from.customer_id,
        relation_type: "Contains".to_string(),
        additional_info: None,
    }
}

// Mesma regra do ILIKE '%texto%'.
fn matches_search(name: &str, link: &PageLink) -> bool {
    match link.text_search.as_deref().filter(|s| !s.is_empty()) {
        Some(needle) => name.to_lowercase().contains(&needle.to_lowercase()),
        None => true,
    }
}

fn to_user_permission(grant: NewGrant) -> UserPermission {
    UserPermission {
        id: Uuid::new_v4(),
        user_id: grant.user_id,
        permission_id: grant.permission_id,
        role_id: grant.role_id,
        entity_id: grant.entity_id,
        entity_type: grant.entity_type,
        api_url: grant.api_url,
        created_time: Utc::now(),
    }
}

fn resolve_names(state: &InnerState, grants: Vec<&UserPermission>) -> Vec<ResolvedGrant> {
    grants
        .into_iter()
        .filter_map(|grant| {
            state
                .permissions
                .iter()
                .find(|p| p.id == grant.permission_id)
                .map(|p| ResolvedGrant {
                    grant: grant.clone(),
                    permission_name: p.name.clone(),
                })
        })
        .collect()
}

#[async_trait]
impl EdgeStore for InMemoryBackend {
    async fn find_root_edges(
        &self,
        selector: &RootSelector,
        tenant_id: Uuid,
        customer_id: Option<Uuid>,
    ) -> Result<Vec<RelationEdge>, AppError> {
        let loose = {
            let faults = self.faults();
            if faults.edges {
                return Err(AppError::Upstream("edge store indisponível".into()));
            }
            faults.loose_profile_match
        };

        let state = self.state();
        Ok(state
            .edges
            .iter()
            .filter(|e| e.tenant_id == tenant_id)
            .filter(|e| customer_id.is_none() || e.customer_id == customer_id)
            .filter(|e| match selector {
                RootSelector::Profile(p) if loose => e.from_profile.eq_ignore_ascii_case(p),
                RootSelector::Profile(p) => e.from_profile == *p,
                RootSelector::Entity(id) => e.from_id == *id,
            })
            .cloned()
            .collect())
    }

    async fn find_child_edges(&self, parent_ids: &[Uuid]) -> Result<Vec<RelationEdge>, AppError> {
        self.child_edge_calls.fetch_add(1, Ordering::SeqCst);
        let _call = self.enter();

        let latency = {
            let faults = self.faults();
            if faults.edges {
                return Err(AppError::Upstream("edge store indisponível".into()));
            }
            faults.edge_latency
        };
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let state = self.state();
        Ok(state
            .edges
            .iter()
            .filter(|e| parent_ids.contains(&e.from_id))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl AttributeStore for InMemoryBackend {
    async fn find_all(
        &self,
        _tenant_id: Uuid,
        entity_id: Uuid,
        _kind: EntityKind,
        scope: AttributeScope,
    ) -> Result<Vec<KvEntry>, AppError> {
        let _call = self.enter();
        if self.faults().attribute_entities.contains(&entity_id) {
            return Err(AppError::Upstream(format!(
                "atributos de {} indisponíveis",
                entity_id
            )));
        }

        Ok(self
            .state()
            .attributes
            .get(&(entity_id, scope))
            .cloned()
            .unwrap_or_default())
    }
}

#[async_trait]
impl EntityStore for InMemoryBackend {
    async fn find_by_ids(
        &self,
        tenant_id: Uuid,
        kind: EntityKind,
        ids: &[Uuid],
    ) -> Result<Vec<EntitySummary>, AppError> {
        if self.faults().entity_loads {
            return Err(AppError::Upstream("entity store indisponível".into()));
        }

        let state = self.state();
        Ok(ids
            .iter()
            .filter_map(|id| {
                state
                    .entities
                    .iter()
                    .find(|e| e.id == *id && e.kind == kind && e.tenant_id == tenant_id)
                    .cloned()
            })
            .collect())
    }
}

#[async_trait]
impl PermissionStore for InMemoryBackend {
    async fn find_by_name(
        &self,
        tenant_id: Uuid,
        name: &str,
    ) -> Result<Option<Permission>, AppError> {
        Ok(self
            .state()
            .permissions
            .iter()
            .find(|p| p.tenant_id == tenant_id && p.name.eq_ignore_ascii_case(name))
            .cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Permission>, AppError> {
        Ok(self.state().permissions.iter().find(|p| p.id == id).cloned())
    }

    async fn insert(&self, tenant_id: Uuid, name: &str) -> Result<Permission, AppError> {
        let mut state = self.state();
        if state
            .permissions
            .iter()
            .any(|p| p.tenant_id == tenant_id && p.name.eq_ignore_ascii_case(name))
        {
            return Err(AppError::Conflict(format!(
                "Já existe uma permissão chamada '{}'.",
                name
            )));
        }

        let permission = Permission {
            id: Uuid::new_v4(),
            tenant_id,
            name: name.to_string(),
            created_time: Utc::now(),
        };
        state.permissions.push(permission.clone());
        Ok(permission)
    }

    async fn find_page(
        &self,
        tenant_id: Uuid,
        link: &PageLink,
    ) -> Result<PageData<Permission>, AppError> {
        let mut all: Vec<Permission> = self
            .state()
            .permissions
            .iter()
            .filter(|p| p.tenant_id == tenant_id && matches_search(&p.name, link))
            .cloned()
            .collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(PageData::slice(all, link))
    }

    async fn delete_unreferenced(&self, id: Uuid) -> Result<(), AppError> {
        let mut state = self.state();
        if state.role_permissions.iter().any(|rp| rp.permission_id == id) {
            return Err(AppError::Conflict(
                "A permissão está atribuída a um cargo e não pode ser removida.".into(),
            ));
        }
        if state.grants.iter().any(|g| g.permission_id == id) {
            return Err(AppError::Conflict(
                "A permissão está atribuída a um usuário e não pode ser removida.".into(),
            ));
        }

        let before = state.permissions.len();
        state.permissions.retain(|p| p.id != id);
        if state.permissions.len() == before {
            return Err(AppError::NotFound(format!("Permissão {} não encontrada.", id)));
        }
        Ok(())
    }
}

#[async_trait]
impl RoleStore for InMemoryBackend {
    async fn create_with_permissions(
        &self,
        tenant_id: Uuid,
        name: &str,
        permission_ids: &[Uuid],
    ) -> Result<Role, AppError> {
        let mut state = self.state();
        if state.roles.iter().any(|r| r.tenant_id == tenant_id && r.name == name) {
            return Err(AppError::Conflict("Já existe um cargo com esse nome.".into()));
        }

        let role = Role {
            id: Uuid::new_v4(),
            tenant_id,
            name: name.to_string(),
            created_time: Utc::now(),
        };
        state.roles.push(role.clone());
        for permission_id in permission_ids {
            state.role_permissions.push(RolePermission {
                role_id: role.id,
                permission_id: *permission_id,
            });
        }
        Ok(role)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Role>, AppError> {
        Ok(self.state().roles.iter().find(|r| r.id == id).cloned())
    }

    async fn add_permission(&self, role_id: Uuid, permission_id: Uuid) -> Result<(), AppError> {
        let link = RolePermission {
            role_id,
            permission_id,
        };
        let mut state = self.state();
        if !state.role_permissions.contains(&link) {
            state.role_permissions.push(link);
        }
        Ok(())
    }

    async fn remove_permission(&self, role_id: Uuid, permission_id: Uuid) -> Result<(), AppError> {
        self.state()
            .role_permissions
            .retain(|rp| !(rp.role_id == role_id && rp.permission_id == permission_id));
        Ok(())
    }

    async fn permission_ids(&self, role_id: Uuid) -> Result<Vec<Uuid>, AppError> {
        Ok(self
            .state()
            .role_permissions
            .iter()
            .filter(|rp| rp.role_id == role_id)
            .map(|rp| rp.permission_id)
            .collect())
    }

    async fn find_page(&self, tenant_id: Uuid, link: &PageLink) -> Result<PageData<Role>, AppError> {
        let mut all: Vec<Role> = self
            .state()
            .roles
            .iter()
            .filter(|r| r.tenant_id == tenant_id && matches_search(&r.name, link))
            .cloned()
            .collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(PageData::slice(all, link))
    }

    async fn permission_page(
        &self,
        role_id: Uuid,
        link: &PageLink,
    ) -> Result<PageData<Permission>, AppError> {
        let state = self.state();
        let mut all: Vec<Permission> = state
            .role_permissions
            .iter()
            .filter(|rp| rp.role_id == role_id)
            .filter_map(|rp| state.permissions.iter().find(|p| p.id == rp.permission_id))
            .filter(|p| matches_search(&p.name, link))
            .cloned()
            .collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(PageData::slice(all, link))
    }

    async fn delete(&self, role_id: Uuid) -> Result<u64, AppError> {
        let mut state = self.state();
        if !state.roles.iter().any(|r| r.id == role_id) {
            return Err(AppError::NotFound(format!("Cargo {} não encontrado.", role_id)));
        }

        let before = state.grants.len();
        state.grants.retain(|g| g.role_id != Some(role_id));
        let grants_removed = (before - state.grants.len()) as u64;
        state.role_permissions.retain(|rp| rp.role_id != role_id);
        state.roles.retain(|r| r.id != role_id);

        Ok(grants_removed)
    }
}

#[async_trait]
impl GrantStore for InMemoryBackend {
    async fn find_by_user_and_entity(
        &self,
        user_id: Uuid,
        entity_id: Uuid,
    ) -> Result<Vec<ResolvedGrant>, AppError> {
        let state = self.state();
        let grants = state
            .grants
            .iter()
            .filter(|g| g.user_id == user_id && g.entity_id == Some(entity_id))
            .collect();
        Ok(resolve_names(&state, grants))
    }

    async fn find_by_user_and_api_url(
        &self,
        user_id: Uuid,
        api_url: &str,
    ) -> Result<Vec<ResolvedGrant>, AppError> {
        let state = self.state();
        let grants = state
            .grants
            .iter()
            .filter(|g| g.user_id == user_id && g.api_url.as_deref() == Some(api_url))
            .collect();
        Ok(resolve_names(&state, grants))
    }

    async fn find_entity_ids(
        &self,
        user_id: Uuid,
        permission_id: Uuid,
        kind: EntityKind,
    ) -> Result<Vec<Uuid>, AppError> {
        Ok(self
            .state()
            .grants
            .iter()
            .filter(|g| {
                g.user_id == user_id && g.permission_id == permission_id && g.entity_type == Some(kind)
            })
            .filter_map(|g| g.entity_id)
            .collect())
    }

    async fn insert_all(&self, grants: Vec<NewGrant>) -> Result<Vec<UserPermission>, AppError> {
        let saved: Vec<UserPermission> = grants.into_iter().map(to_user_permission).collect();
        self.state().grants.extend(saved.iter().cloned());
        Ok(saved)
    }

    async fn delete_by_user_and_role(&self, user_id: Uuid, role_id: Uuid) -> Result<u64, AppError> {
        let mut state = self.state();
        let before = state.grants.len();
        state
            .grants
            .retain(|g| !(g.user_id == user_id && g.role_id == Some(role_id)));
        Ok((before - state.grants.len()) as u64)
    }

    async fn delete_one(
        &self,
        user_id: Uuid,
        entity_id: Uuid,
        permission_id: Uuid,
    ) -> Result<u64, AppError> {
        let mut state = self.state();
        let before = state.grants.len();
        state.grants.retain(|g| {
            !(g.user_id == user_id
                && g.entity_id == Some(entity_id)
                && g.permission_id == permission_id)
        });
        Ok((before - state.grants.len()) as u64)
    }

    async fn find_page_by_user(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
        link: &PageLink,
    ) -> Result<PageData<ResolvedGrant>, AppError> {
        let state = self.state();
        let mine = state
            .grants
            .iter()
            .filter(|g| g.user_id == user_id)
            .filter(|g| {
                state
                    .permissions
                    .iter()
                    .any(|p| p.id == g.permission_id && p.tenant_id == tenant_id)
            })
            .rev()
            .collect();
        Ok(PageData::slice(resolve_names(&state, mine), link))
    }

    async fn revoke_entity_access(
        &self,
        tenant_id: Uuid,
        entity_id: Uuid,
        permission_id: Uuid,
        acting_user_id: Uuid,
    ) -> Result<RevocationSummary, AppError> {
        let fail = self.faults().revocation;
        let mut state = self.state();

        // Trabalha numa cópia e só "commita" no fim.
        let mut grants = state.grants.clone();
        let before = grants.len();
        grants.retain(|g| {
            let by_permission = g.permission_id == permission_id && g.entity_id == Some(entity_id);
            let by_user = g.user_id == acting_user_id && g.entity_id == Some(entity_id);
            !(by_permission || by_user)
        });
        let grants_removed = (before - grants.len()) as u64;

        if fail {
            return Err(AppError::Upstream("falha ao desvincular a entidade".into()));
        }

        let mut detached = false;
        for entity in state
            .entities
            .iter_mut()
            .filter(|e| e.id == entity_id && e.tenant_id == tenant_id)
        {
            entity.customer_id = Some(NULL_CUSTOMER_ID);
            detached = true;
        }
        state.grants = grants;

        Ok(RevocationSummary {
            grants_removed,
            detached,
        })
    }
}
