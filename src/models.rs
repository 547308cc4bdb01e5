pub mod attribute;
pub mod entity;
pub mod page;
pub mod rbac;
pub mod relation;
