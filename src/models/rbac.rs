// src/models/rbac.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

use crate::common::error::AppError;
use crate::models::relation::EntityKind;

/// Nome literal da permissão curinga: satisfaz qualquer permissão exigida.
pub const WILDCARD_PERMISSION: &str = "ALL";

// O que sai do banco (Tabela permission)
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Permission {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub created_time: DateTime<Utc>,
}

// O que sai do banco (Tabela role)
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Role {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub created_time: DateTime<Utc>,
}

// Vínculo Cargo <-> Permissão
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRow)]
pub struct RolePermission {
    pub role_id: Uuid,
    pub permission_id: Uuid,
}

// ---
// UserPermission (Uma concessão)
// ---
// Escopo de entidade (entity_id preenchido) ou de API (api_url preenchido).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPermission {
    pub id: Uuid,
    pub user_id: Uuid,
    pub permission_id: Uuid,
    pub role_id: Option<Uuid>,
    pub entity_id: Option<Uuid>,
    pub entity_type: Option<EntityKind>,
    pub api_url: Option<String>,
    pub created_time: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct UserPermissionRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub permission_id: Uuid,
    pub role_id: Option<Uuid>,
    pub entity_id: Option<Uuid>,
    pub entity_type: Option<String>,
    pub api_url: Option<String>,
    pub created_time: DateTime<Utc>,
}

impl TryFrom<UserPermissionRow> for UserPermission {
    type Error = AppError;

    fn try_from(row: UserPermissionRow) -> Result<Self, Self::Error> {
        Ok(UserPermission {
            id: row.id,
            user_id: row.user_id,
            permission_id: row.permission_id,
            role_id: row.role_id,
            entity_id: row.entity_id,
            entity_type: row.entity_type.as_deref().map(str::parse).transpose()?,
            api_url: row.api_url,
            created_time: row.created_time,
        })
    }
}

// Concessão já acompanhada do nome da permissão (JOIN com permission)
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedGrant {
    #[serde(flatten)]
    pub grant: UserPermission,
    pub permission_name: String,
}

#[derive(Debug, Clone, FromRow)]
pub struct ResolvedGrantRow {
    #[sqlx(flatten)]
    pub grant: UserPermissionRow,
    pub permission_name: String,
}

impl TryFrom<ResolvedGrantRow> for ResolvedGrant {
    type Error = AppError;

    fn try_from(row: ResolvedGrantRow) -> Result<Self, Self::Error> {
        Ok(ResolvedGrant {
            grant: row.grant.try_into()?,
            permission_name: row.permission_name,
        })
    }
}

// O que o serviço pede para gravar
#[derive(Debug, Clone, PartialEq)]
pub struct NewGrant {
    pub user_id: Uuid,
    pub permission_id: Uuid,
    pub role_id: Option<Uuid>,
    pub entity_id: Option<Uuid>,
    pub entity_type: Option<EntityKind>,
    pub api_url: Option<String>,
}

// Resultado da revogação em massa de uma entidade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RevocationSummary {
    pub grants_removed: u64,
    pub detached: bool,
}

// Resposta completa (Cargo + Lista de Permissões)
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleResponse {
    #[serde(flatten)]
    pub role: Role,
    pub permissions: Vec<String>,
}

// ---
// Payloads
// ---

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreatePermissionPayload {
    #[validate(length(min = 1, max = 255, message = "O nome da permissão é obrigatório."))]
    pub name: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateRolePayload {
    #[validate(length(min = 1, max = 255, message = "O nome do cargo é obrigatório."))]
    pub name: String,

    #[serde(default)]
    pub permissions: Vec<String>, // Nomes das permissões
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignRolePayload {
    pub user_id: Uuid,
    pub entity_id: Option<Uuid>,
    pub entity_type: Option<EntityKind>,
}

// Concessão direta, sem cargo. É o único jeito de criar concessão de API.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct GrantPermissionPayload {
    pub user_id: Uuid,

    #[validate(length(min = 1, max = 255, message = "Informe a permissão."))]
    pub permission: String,

    pub entity_id: Option<Uuid>,
    pub entity_type: Option<EntityKind>,

    #[validate(length(min = 1, max = 1024, message = "A URL da API não pode ser vazia."))]
    pub api_url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevokeGrantQuery {
    pub user_id: Uuid,
    pub entity_id: Uuid,
    pub permission_id: Uuid,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CheckPermissionPayload {
    pub entity_id: Option<Uuid>,
    pub api_url: Option<String>,

    #[validate(length(min = 1, message = "Informe ao menos uma permissão."))]
    pub permissions: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grant_row_resolves_entity_kind() {
        let row = UserPermissionRow {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            permission_id: Uuid::new_v4(),
            role_id: None,
            entity_id: Some(Uuid::new_v4()),
            entity_type: Some("device".into()),
            api_url: None,
            created_time: Utc::now(),
        };

        let grant = UserPermission::try_from(row).unwrap();
        assert_eq!(grant.entity_type, Some(EntityKind::Device));
    }

    #[test]
    fn api_grant_row_has_no_entity_kind() {
        let row = UserPermissionRow {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            permission_id: Uuid::new_v4(),
            role_id: None,
            entity_id: None,
            entity_type: None,
            api_url: Some("/api/relations".into()),
            created_time: Utc::now(),
        };

        let grant = UserPermission::try_from(row).unwrap();
        assert_eq!(grant.entity_type, None);
        assert_eq!(grant.api_url.as_deref(), Some("/api/relations"));
    }
}
