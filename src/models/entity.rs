// src/models/entity.rs

use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

use crate::models::attribute::AttributeMap;
use crate::models::relation::EntityKind;

/// "Sem cliente": o UUID nulo que a plataforma grava em `customer_id`.
pub const NULL_CUSTOMER_ID: Uuid = Uuid::from_u128(0x13814000_1dd2_11b2_8080_808080808080);

// Um asset ou device, como carregado pelo EntityStore
#[derive(Debug, Clone, PartialEq)]
pub struct EntitySummary {
    pub id: Uuid,
    pub kind: EntityKind,
    pub name: String,
    pub profile: String,
    pub tenant_id: Uuid,
    pub customer_id: Option<Uuid>,
}

impl EntitySummary {
    /// Dono efetivo: o UUID nulo da plataforma conta como "sem cliente".
    pub fn owner(&self) -> Option<Uuid> {
        self.customer_id.filter(|id| *id != NULL_CUSTOMER_ID)
    }
}

// Linha das tabelas `asset` / `device` (a coluna `type` é o perfil)
#[derive(Debug, Clone, FromRow)]
pub struct EntityRow {
    pub id: Uuid,
    pub name: String,
    #[sqlx(rename = "type")]
    pub profile: String,
    pub tenant_id: Uuid,
    pub customer_id: Option<Uuid>,
}

impl EntityRow {
    pub fn into_summary(self, kind: EntityKind) -> EntitySummary {
        EntitySummary {
            id: self.id,
            kind,
            name: self.name,
            profile: self.profile,
            tenant_id: self.tenant_id,
            customer_id: self.customer_id,
        }
    }
}

// Item da listagem plana por permissão
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessibleEntity {
    pub id: Uuid,
    pub name: String,
    pub profile: String,
    pub attributes: AttributeMap,
}
