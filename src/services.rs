pub mod accessible_entity_service;
pub use accessible_entity_service::AccessibleEntityService;
pub mod attribute_service;
pub use attribute_service::AttributeService;
pub mod permission_service;
pub use permission_service::PermissionService;
pub mod rbac_service;
pub use rbac_service::RbacService;
pub mod relation_service;
pub use relation_service::RelationService;
