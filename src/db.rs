pub mod stores;
pub use stores::{AttributeStore, EdgeStore, EntityStore, GrantStore, PermissionStore, RoleStore};

pub mod relation_repo;
pub use relation_repo::RelationRepository;
pub mod attribute_repo;
pub use attribute_repo::AttributeRepository;
pub mod entity_repo;
pub use entity_repo::EntityRepository;
pub mod rbac_repo;
pub use rbac_repo::RbacRepository;

pub mod memory;
pub use memory::InMemoryBackend;
