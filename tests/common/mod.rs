// Entidades de teste para os testes de integração.

use uuid::Uuid;

use asset_hierarchy::models::{entity::EntitySummary, relation::EntityKind};

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
