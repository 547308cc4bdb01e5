// src/services/relation_service.rs

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use futures::{stream, StreamExt, TryStreamExt};
use tokio::sync::Semaphore;
use uuid::Uuid;

use crate::{
    common::{call_context::CallContext, error::AppError},
    db::EdgeStore,
    models::relation::{RelationEdge, RelationNode, RootSelector},
    services::attribute_service::AttributeService,
};

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Maior profundidade aceita num pedido.
    pub max_depth: usize,
    /// Quantas buscas de filhos/atributos correm ao mesmo tempo por nível.
    pub fanout: usize,
    /// Teto de chamadas simultâneas aos armazenamentos, somando todos os níveis.
    pub max_in_flight: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            max_depth: 10,
            fanout: 8,
            max_in_flight: 5,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResolveRequest {
    pub selector: RootSelector,
    pub max_depth: usize,
    pub tenant_id: Uuid,
    pub customer_id: Option<Uuid>,
}

/// Monta a árvore de profundidade limitada a partir da tabela achatada de arestas.
///
/// O grafo pode ter ciclos. Cada ramo carrega o conjunto de ids dos seus
/// ancestrais: um id que reaparece no mesmo ramo é anexado sem filhos, enquanto
/// o mesmo id sob pais diferentes (diamante) é expandido normalmente.
///
/// O `fanout` vale por nível e os níveis se aninham, então o total de chamadas
/// simultâneas é limitado à parte por um semáforo compartilhado entre todas as
/// resoluções (`max_in_flight`). A vaga só é segurada durante a chamada ao
/// armazenamento, nunca durante a recursão.
#[derive(Clone)]
pub struct RelationService {
    edges: Arc<dyn EdgeStore>,
    attributes: AttributeService,
    config: ResolverConfig,
    in_flight: Arc<Semaphore>,
}

impl RelationService {
    pub fn new(edges: Arc<dyn EdgeStore>, attributes: AttributeService, config: ResolverConfig) -> Self {
        let in_flight = Arc::new(Semaphore::new(config.max_in_flight.max(1)));
        Self {
            edges,
            attributes,
            config,
            in_flight,
        }
    }

    pub async fn resolve(
        &self,
        request: &ResolveRequest,
        ctx: &CallContext,
    ) -> Result<Vec<RelationNode>, AppError> {
        if request.max_depth > self.config.max_depth {
            return Err(AppError::InvalidArgument(format!(
                "Profundidade {} acima do máximo permitido ({}).",
                request.max_depth, self.config.max_depth
            )));
        }

        let started = Instant::now();
        let roots = ctx.run(self.resolve_tree(request)).await?;

        tracing::info!(
            selector = %request.selector,
            tenant_id = %request.tenant_id,
            depth = request.max_depth,
            roots = roots.len(),
            nodes = count_nodes(&roots),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Árvore de relações resolvida"
        );
        Ok(roots)
    }

    async fn resolve_tree(&self, request: &ResolveRequest) -> Result<Vec<RelationNode>, AppError> {
        let tenant_id = request.tenant_id;

        // 1. Raízes: uma por `from_id` distinto, na ordem de descoberta
        let root_edges = self
            .edges
            .find_root_edges(&request.selector, tenant_id, request.customer_id)
            .await?;

        let mut seen = HashSet::new();
        let root_nodes: Vec<RelationNode> = root_edges
            .iter()
            .filter(|edge| seen.insert(edge.from_id))
            // A consulta de raízes pode trazer linhas de outro perfil.
            .filter(|edge| match request.selector.profile() {
                Some(profile) => edge.from_profile == profile,
                None => true,
            })
            .map(RelationNode::source_of)
            .collect();

        let mut roots = self.build_nodes(tenant_id, root_nodes).await;

        if request.max_depth == 0 || roots.is_empty() {
            return Ok(roots);
        }

        // 2. Filhos diretos de todas as raízes numa única chamada
        let root_ids: Vec<Uuid> = roots.iter().map(|r| r.id).collect();
        let child_edges = self.child_edges(&root_ids).await?;
        let by_parent = group_by_parent(&child_edges);

        // Atributos buscados uma vez por filho distinto, mesmo com vários pais.
        let mut distinct = HashSet::new();
        let targets: Vec<RelationNode> = by_parent
            .values()
            .flatten()
            .filter(|edge| distinct.insert(edge.to_id))
            .map(|edge| RelationNode::target_of(edge))
            .collect();
        let built: HashMap<Uuid, RelationNode> = self
            .build_nodes(tenant_id, targets)
            .await
            .into_iter()
            .map(|node| (node.id, node))
            .collect();

        // 3. Expansão recursiva dos níveis seguintes, raiz a raiz
        let remaining = request.max_depth - 1;
        let jobs: Vec<_> = roots
            .iter()
            .map(|root| {
                let children: Vec<RelationNode> = by_parent
                    .get(&root.id)
                    .into_iter()
                    .flatten()
                    .filter_map(|edge| built.get(&edge.to_id).cloned())
                    .collect();
                self.expand_all(children, remaining, HashSet::from([root.id]), tenant_id)
            })
            .collect();

        let expanded: Vec<Vec<RelationNode>> = stream::iter(jobs)
            .buffered(self.fanout())
            .try_collect()
            .await?;

        for (root, children) in roots.iter_mut().zip(expanded) {
            root.children = children;
        }

        Ok(roots)
    }

    // `path` contém os ancestrais dos nós em `children`.
    fn expand_all<'a>(
        &'a self,
        children: Vec<RelationNode>,
        remaining: usize,
        path: HashSet<Uuid>,
        tenant_id: Uuid,
    ) -> BoxFuture<'a, Result<Vec<RelationNode>, AppError>> {
        Box::pin(async move {
            let jobs: Vec<_> = children
                .into_iter()
                .map(|child| self.expand_node(child, remaining, path.clone(), tenant_id))
                .collect();

            stream::iter(jobs)
                .buffered(self.fanout())
                .try_collect()
                .await
        })
    }

    fn expand_node<'a>(
        &'a self,
        mut node: RelationNode,
        remaining: usize,
        mut path: HashSet<Uuid>,
        tenant_id: Uuid,
    ) -> BoxFuture<'a, Result<RelationNode, AppError>> {
        Box::pin(async move {
            if remaining == 0 {
                return Ok(node);
            }
            if path.contains(&node.id) {
                tracing::debug!(node_id = %node.id, "Ciclo detectado, nó anexado sem filhos");
                return Ok(node);
            }

            let edges = self.child_edges(&[node.id]).await?;
            let targets: Vec<RelationNode> = group_by_parent(&edges)
                .remove(&node.id)
                .unwrap_or_default()
                .into_iter()
                .map(RelationNode::target_of)
                .collect();
            let children = self.build_nodes(tenant_id, targets).await;

            path.insert(node.id);
            node.children = self
                .expand_all(children, remaining - 1, path, tenant_id)
                .await?;
            Ok(node)
        })
    }

    // Anexa os atributos aos nós (falha de atributo degrada para mapa vazio).
    async fn build_nodes(&self, tenant_id: Uuid, nodes: Vec<RelationNode>) -> Vec<RelationNode> {
        stream::iter(nodes)
            .map(|mut node| async move {
                let scopes = AttributeService::default_scopes(node.kind);
                // Uma vaga do semáforo por escopo: cada escopo é uma consulta.
                let wanted = scopes.len().clamp(1, self.config.max_in_flight.max(1)) as u32;
                let _permit = self.in_flight.acquire_many(wanted).await.ok();
                node.attributes = self
                    .attributes
                    .project_or_empty(tenant_id, node.id, node.kind, &scopes)
                    .await;
                node
            })
            .buffered(self.fanout())
            .collect()
            .await
    }

    async fn child_edges(&self, parent_ids: &[Uuid]) -> Result<Vec<RelationEdge>, AppError> {
        let _permit = self
            .in_flight
            .acquire()
            .await
            .map_err(|_| AppError::Cancelled)?;
        self.edges.find_child_edges(parent_ids).await
    }

    fn fanout(&self) -> usize {
        self.config.fanout.max(1)
    }
}

// Agrupa por pai, mantendo a ordem e descartando `to_id` repetido sob o mesmo pai.
fn group_by_parent(edges: &[RelationEdge]) -> HashMap<Uuid, Vec<&RelationEdge>> {
    let mut grouped: HashMap<Uuid, Vec<&RelationEdge>> = HashMap::new();
    for edge in edges {
        let siblings = grouped.entry(edge.from_id).or_default();
        if !siblings.iter().any(|e| e.to_id == edge.to_id) {
            siblings.push(edge);
        }
    }
    grouped
}

fn count_nodes(nodes: &[RelationNode]) -> usize {
    nodes.iter().map(|n| 1 + count_nodes(&n.children)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::{
        fixtures::{asset, device},
        InMemoryBackend,
    };
    use crate::models::attribute::{AttributeScope, KvEntry};
    use crate::models::entity::EntitySummary;
    use serde_json::json;
    use std::time::Duration;

    fn service(backend: &InMemoryBackend) -> RelationService {
        let store = Arc::new(backend.clone());
        RelationService::new(
            store.clone(),
            AttributeService::new(store),
            ResolverConfig::default(),
        )
    }

    fn by_profile(tenant: Uuid, profile: &str, depth: usize) -> ResolveRequest {
        ResolveRequest {
            selector: RootSelector::Profile(profile.to_string()),
            max_depth: depth,
            tenant_id: tenant,
            customer_id: None,
        }
    }

    fn names(nodes: &[RelationNode]) -> Vec<&str> {
        nodes.iter().map(|n| n.name.as_str()).collect()
    }

    struct Building {
        backend: InMemoryBackend,
        tenant: Uuid,
        building: EntitySummary,
        floor: EntitySummary,
        room: EntitySummary,
    }

    fn building_floor_room() -> Building {
        let backend = InMemoryBackend::new();
        let tenant = Uuid::new_v4();
        let building = asset(tenant, "Building1", "Building");
        let floor = asset(tenant, "Floor1", "Floor");
        let room = asset(tenant, "Room1", "Room");
        backend.link(&building, &floor);
        backend.link(&floor, &room);
        Building {
            backend,
            tenant,
            building,
            floor,
            room,
        }
    }

    #[tokio::test]
    async fn two_levels_below_the_root() {
        let fx = building_floor_room();

        let roots = service(&fx.backend)
            .resolve(&by_profile(fx.tenant, "Building", 2), &CallContext::default())
            .await
            .unwrap();

        assert_eq!(names(&roots), vec!["Building1"]);
        let floor = &roots[0].children[0];
        assert_eq!(floor.id, fx.floor.id);
        let room = &floor.children[0];
        assert_eq!(room.id, fx.room.id);
        assert!(room.children.is_empty());
        assert_eq!(roots[0].id, fx.building.id);
    }

    #[tokio::test]
    async fn depth_zero_returns_bare_roots() {
        let fx = building_floor_room();

        let roots = service(&fx.backend)
            .resolve(&by_profile(fx.tenant, "Building", 0), &CallContext::default())
            .await
            .unwrap();

        assert_eq!(roots.len(), 1);
        assert!(roots[0].children.is_empty());
        assert_eq!(fx.backend.child_edge_calls(), 0);
    }

    #[tokio::test]
    async fn depth_one_stops_at_immediate_children() {
        let fx = building_floor_room();

        let roots = service(&fx.backend)
            .resolve(&by_profile(fx.tenant, "Building", 1), &CallContext::default())
            .await
            .unwrap();

        assert_eq!(names(&roots[0].children), vec!["Floor1"]);
        assert!(roots[0].children[0].children.is_empty());
        // Só a chamada em lote das raízes.
        assert_eq!(fx.backend.child_edge_calls(), 1);
    }

    #[tokio::test]
    async fn root_children_are_fetched_in_one_batch() {
        let backend = InMemoryBackend::new();
        let tenant = Uuid::new_v4();
        for i in 0..3 {
            let b = asset(tenant, &format!("Building{}", i), "Building");
            let f = asset(tenant, &format!("Floor{}", i), "Floor");
            backend.link(&b, &f);
        }

        let roots = service(&backend)
            .resolve(&by_profile(tenant, "Building", 1), &CallContext::default())
            .await
            .unwrap();

        assert_eq!(roots.len(), 3);
        assert!(roots.iter().all(|r| r.children.len() == 1));
        assert_eq!(backend.child_edge_calls(), 1);
    }

    #[tokio::test]
    async fn cycle_stops_where_the_id_reappears() {
        let backend = InMemoryBackend::new();
        let tenant = Uuid::new_v4();
        let a = asset(tenant, "A", "Ring");
        let b = asset(tenant, "B", "Segment");
        let c = asset(tenant, "C", "Segment");
        backend.link(&a, &b);
        backend.link(&b, &c);
        backend.link(&c, &a);

        let roots = service(&backend)
            .resolve(&by_profile(tenant, "Ring", 10), &CallContext::default())
            .await
            .unwrap();

        let b_node = &roots[0].children[0];
        let c_node = &b_node.children[0];
        let a_again = &c_node.children[0];
        assert_eq!(a_again.id, a.id);
        assert!(a_again.children.is_empty());
    }

    #[tokio::test]
    async fn self_loop_is_attached_without_children() {
        let backend = InMemoryBackend::new();
        let tenant = Uuid::new_v4();
        let a = asset(tenant, "Loop", "Building");
        backend.link(&a, &a);

        let roots = service(&backend)
            .resolve(&by_profile(tenant, "Building", 5), &CallContext::default())
            .await
            .unwrap();

        assert_eq!(roots[0].children.len(), 1);
        assert_eq!(roots[0].children[0].id, a.id);
        assert!(roots[0].children[0].children.is_empty());
    }

    #[tokio::test]
    async fn diamond_keeps_the_shared_child_under_both_parents() {
        let backend = InMemoryBackend::new();
        let tenant = Uuid::new_v4();
        let building = asset(tenant, "Building1", "Building");
        let north = asset(tenant, "North", "Wing");
        let south = asset(tenant, "South", "Wing");
        let hall = asset(tenant, "Hall", "Room");
        let sensor = device(tenant, "Sensor", "Thermometer");
        backend.link(&building, &north);
        backend.link(&building, &south);
        backend.link(&north, &hall);
        backend.link(&south, &hall);
        backend.link(&hall, &sensor);

        let roots = service(&backend)
            .resolve(&by_profile(tenant, "Building", 3), &CallContext::default())
            .await
            .unwrap();

        for wing in &roots[0].children {
            assert_eq!(names(&wing.children), vec!["Hall"]);
            assert_eq!(names(&wing.children[0].children), vec!["Sensor"]);
        }
    }

    #[tokio::test]
    async fn repeated_edges_do_not_duplicate_children() {
        let fx = building_floor_room();
        fx.backend.link(&fx.building, &fx.floor);
        fx.backend.link(&fx.floor, &fx.room);

        let roots = service(&fx.backend)
            .resolve(&by_profile(fx.tenant, "Building", 3), &CallContext::default())
            .await
            .unwrap();

        assert_eq!(roots.len(), 1);
        assert_eq!(roots[0].children.len(), 1);
        assert_eq!(roots[0].children[0].children.len(), 1);
    }

    #[tokio::test]
    async fn chain_is_cut_exactly_at_max_depth() {
        let backend = InMemoryBackend::new();
        let tenant = Uuid::new_v4();
        let chain: Vec<_> = (0..6)
            .map(|i| asset(tenant, &format!("L{}", i), if i == 0 { "Site" } else { "Level" }))
            .collect();
        for pair in chain.windows(2) {
            backend.link(&pair[0], &pair[1]);
        }

        let roots = service(&backend)
            .resolve(&by_profile(tenant, "Site", 3), &CallContext::default())
            .await
            .unwrap();

        let mut depth = 0;
        let mut node = &roots[0];
        while let Some(child) = node.children.first() {
            depth += 1;
            node = child;
        }
        assert_eq!(depth, 3);
        assert_eq!(node.name, "L3");
    }

    #[tokio::test]
    async fn devices_merge_client_and_server_attributes() {
        let backend = InMemoryBackend::new();
        let tenant = Uuid::new_v4();
        let room = asset(tenant, "Room1", "Room");
        let sensor = device(tenant, "Sensor1", "Thermometer");
        backend.link(&room, &sensor);
        backend.set_attributes(room.id, AttributeScope::ClientScope, vec![KvEntry::long("ignored", 1)]);
        backend.set_attributes(room.id, AttributeScope::ServerScope, vec![KvEntry::double("area", 30.0)]);
        backend.set_attributes(sensor.id, AttributeScope::ClientScope, vec![KvEntry::string("fw", "2.1")]);
        backend.set_attributes(sensor.id, AttributeScope::ServerScope, vec![KvEntry::boolean("active", true)]);

        let roots = service(&backend)
            .resolve(&by_profile(tenant, "Room", 1), &CallContext::default())
            .await
            .unwrap();

        assert_eq!(roots[0].attributes.keys().collect::<Vec<_>>(), vec!["area"]);
        let sensor_node = &roots[0].children[0];
        assert_eq!(sensor_node.attributes.get("fw"), Some(&json!("2.1")));
        assert_eq!(sensor_node.attributes.get("active"), Some(&json!(true)));
    }

    #[tokio::test]
    async fn attribute_failure_only_empties_that_node() {
        let fx = building_floor_room();
        fx.backend.set_attributes(fx.floor.id, AttributeScope::ServerScope, vec![KvEntry::long("level", 1)]);
        fx.backend.set_attributes(fx.room.id, AttributeScope::ServerScope, vec![KvEntry::long("seats", 8)]);
        fx.backend.fail_attributes_for(fx.floor.id);

        let roots = service(&fx.backend)
            .resolve(&by_profile(fx.tenant, "Building", 2), &CallContext::default())
            .await
            .unwrap();

        let floor = &roots[0].children[0];
        assert!(floor.attributes.is_empty());
        assert_eq!(floor.children[0].attributes.get("seats"), Some(&json!(8)));
    }

    #[tokio::test]
    async fn edge_store_failure_returns_no_tree() {
        let fx = building_floor_room();
        fx.backend.fail_edges();

        let result = service(&fx.backend)
            .resolve(&by_profile(fx.tenant, "Building", 2), &CallContext::default())
            .await;

        assert!(matches!(result, Err(AppError::Upstream(_))));
    }

    #[tokio::test]
    async fn roots_with_another_profile_are_dropped() {
        let backend = InMemoryBackend::new();
        backend.loose_profile_match();
        let tenant = Uuid::new_v4();
        let exact = asset(tenant, "Building1", "Building");
        let loose = asset(tenant, "building-legacy", "building");
        let floor = asset(tenant, "Floor1", "Floor");
        backend.link(&exact, &floor);
        backend.link(&loose, &floor);

        let roots = service(&backend)
            .resolve(&by_profile(tenant, "Building", 1), &CallContext::default())
            .await
            .unwrap();

        assert_eq!(names(&roots), vec!["Building1"]);
    }

    #[tokio::test]
    async fn explicit_entity_selector_uses_that_root() {
        let fx = building_floor_room();

        let request = ResolveRequest {
            selector: RootSelector::Entity(fx.floor.id),
            max_depth: 1,
            tenant_id: fx.tenant,
            customer_id: None,
        };
        let roots = service(&fx.backend)
            .resolve(&request, &CallContext::default())
            .await
            .unwrap();

        assert_eq!(names(&roots), vec!["Floor1"]);
        assert_eq!(names(&roots[0].children), vec!["Room1"]);
    }

    #[tokio::test]
    async fn other_tenants_edges_are_invisible() {
        let fx = building_floor_room();

        let roots = service(&fx.backend)
            .resolve(&by_profile(Uuid::new_v4(), "Building", 2), &CallContext::default())
            .await
            .unwrap();

        assert!(roots.is_empty());
    }

    #[tokio::test]
    async fn cancellation_discards_the_partial_tree() {
        let fx = building_floor_room();
        fx.backend.slow_child_edges(Duration::from_secs(30));
        let ctx = CallContext::default();
        let token = ctx.cancellation_token().clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            token.cancel();
        });

        let result = service(&fx.backend)
            .resolve(&by_profile(fx.tenant, "Building", 2), &ctx)
            .await;

        assert!(matches!(result, Err(AppError::Cancelled)));
    }

    #[tokio::test]
    async fn slow_edge_store_hits_the_deadline() {
        let fx = building_floor_room();
        fx.backend.slow_child_edges(Duration::from_secs(30));

        let result = service(&fx.backend)
            .resolve(
                &by_profile(fx.tenant, "Building", 2),
                &CallContext::with_timeout(Duration::from_millis(20)),
            )
            .await;

        assert!(matches!(result, Err(AppError::DeadlineExceeded)));
    }

    #[tokio::test]
    async fn depth_above_the_ceiling_is_rejected() {
        let fx = building_floor_room();

        let result = service(&fx.backend)
            .resolve(&by_profile(fx.tenant, "Building", 11), &CallContext::default())
            .await;

        assert!(matches!(result, Err(AppError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn resolve_future_can_cross_threads() {
        fn assert_send<T: Send>(_: T) {}

        let fx = building_floor_room();
        let svc = service(&fx.backend);
        let request = by_profile(fx.tenant, "Building", 2);
        let ctx = CallContext::default();

        assert_send(svc.resolve(&request, &ctx));

        let roots = tokio::spawn(async move { svc.resolve(&request, &ctx).await })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(roots[0].children[0].children[0].id, fx.room.id);
    }

    #[tokio::test]
    async fn nested_levels_share_the_in_flight_limit() {
        let backend = InMemoryBackend::new();
        let tenant = Uuid::new_v4();
        let site = asset(tenant, "Site", "Site");
        for i in 0..6 {
            let zone = asset(tenant, &format!("Zone{}", i), "Zone");
            backend.link(&site, &zone);
            for j in 0..3 {
                let room = asset(tenant, &format!("Room{}-{}", i, j), "Room");
                backend.link(&zone, &room);
                backend.link(&room, &device(tenant, &format!("Sensor{}-{}", i, j), "Thermometer"));
            }
        }
        backend.slow_child_edges(Duration::from_millis(5));

        let store = Arc::new(backend.clone());
        let svc = RelationService::new(
            store.clone(),
            AttributeService::new(store),
            ResolverConfig {
                max_depth: 10,
                fanout: 8,
                max_in_flight: 2,
            },
        );
        let roots = svc
            .resolve(&by_profile(tenant, "Site", 3), &CallContext::default())
            .await
            .unwrap();

        assert_eq!(count_nodes(&roots), 1 + 6 + 18 + 18);
        assert!(backend.peak_in_flight() <= 2, "pico {}", backend.peak_in_flight());
    }
}
