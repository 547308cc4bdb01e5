// src/models/relation.rs

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

use crate::common::error::AppError;
use crate::models::attribute::AttributeMap;

// ---
// 1. EntityKind (Asset ou Device)
// ---
// Resolvido uma única vez na fronteira (banco ou HTTP). Internamente
// nunca comparamos o tipo como string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EntityKind {
    Asset,
    Device,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Asset => "ASSET",
            EntityKind::Device => "DEVICE",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("ASSET") {
            Ok(EntityKind::Asset)
        } else if s.eq_ignore_ascii_case("DEVICE") {
            Ok(EntityKind::Device)
        } else {
            Err(AppError::InvalidArgument(format!(
                "Tipo de entidade desconhecido: '{}'.",
                s
            )))
        }
    }
}

// ---
// 2. RootSelector
// ---
// Ou um nome de perfil ("Building"), ou o id explícito de uma entidade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RootSelector {
    Profile(String),
    Entity(Uuid),
}

impl RootSelector {
    /// Nome do perfil, quando a seleção foi feita por perfil.
    pub fn profile(&self) -> Option<&str> {
        match self {
            RootSelector::Profile(name) => Some(name),
            RootSelector::Entity(_) => None,
        }
    }
}

impl fmt::Display for RootSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RootSelector::Profile(name) => write!(f, "profile:{}", name),
            RootSelector::Entity(id) => write!(f, "entity:{}", id),
        }
    }
}

// ---
// 3. RelationEdge (Uma aresta "A contém B")
// ---
// Vem da view achatada de relações. Imutável para o resolver.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationEdge {
    pub from_id: Uuid,
    pub from_kind: EntityKind,
    pub from_name: String,
    pub from_profile: String,
    pub to_id: Uuid,
    pub to_kind: EntityKind,
    pub to_name: String,
    pub to_profile: String,
    pub tenant_id: Uuid,
    pub customer_id: Option<Uuid>,
    pub relation_type: String,
    pub additional_info: Option<Value>,
}

// Linha crua da view, antes de resolvermos o tipo das entidades.
#[derive(Debug, Clone, FromRow)]
pub struct RelationEdgeRow {
    pub from_id: Uuid,
    pub relation_from: String,
    pub from_name: String,
    pub asset_profile_from: String,
    pub to_id: Uuid,
    pub relation_to: String,
    pub to_name: String,
    pub asset_profile_to: String,
    pub tenant_id: Uuid,
    pub customer_id: Option<Uuid>,
    pub relation_type: String,
    pub additional_info: Option<Value>,
}

impl TryFrom<RelationEdgeRow> for RelationEdge {
    type Error = AppError;

    fn try_from(row: RelationEdgeRow) -> Result<Self, Self::Error> {
        Ok(RelationEdge {
            from_id: row.from_id,
            from_kind: row.relation_from.parse()?,
            from_name: row.from_name,
            from_profile: row.asset_profile_from,
            to_id: row.to_id,
            to_kind: row.relation_to.parse()?,
            to_name: row.to_name,
            to_profile: row.asset_profile_to,
            tenant_id: row.tenant_id,
            customer_id: row.customer_id,
            relation_type: row.relation_type,
            additional_info: row.additional_info,
        })
    }
}

// ---
// 4. RelationNode (Um nó da árvore resolvida)
// ---
// Cada árvore é dona exclusiva dos seus nós.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationNode {
    pub id: Uuid,
    pub name: String,
    pub profile: String,
    pub kind: EntityKind,
    pub attributes: AttributeMap,
    pub children: Vec<RelationNode>,
}

impl RelationNode {
    pub fn source_of(edge: &RelationEdge) -> Self {
        Self {
            id: edge.from_id,
            name: edge.from_name.clone(),
            profile: edge.from_profile.clone(),
            kind: edge.from_kind,
            attributes: AttributeMap::new(),
            children: Vec::new(),
        }
    }

    pub fn target_of(edge: &RelationEdge) -> Self {
        Self {
            id: edge.to_id,
            name: edge.to_name.clone(),
            profile: edge.to_profile.clone(),
            kind: edge.to_kind,
            attributes: AttributeMap::new(),
            children: Vec::new(),
        }
    }
}
