// src/handlers/permissions.rs

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::{
    common::{call_context::CallContext, error::AppError},
    config::AppState,
    middleware::tenancy::CallerContext,
    models::{
        rbac::{CheckPermissionPayload, RevocationSummary},
        relation::EntityKind,
    },
    services::{accessible_entity_service::AccessibleEntityQuery, PermissionService},
};

// POST /api/permissions/check
pub async fn check_permission(
    State(app_state): State<AppState>,
    caller: CallerContext,
    Json(payload): Json<CheckPermissionPayload>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    app_state
        .permission_service
        .authorize(
            caller.user_id,
            payload.entity_id,
            payload.api_url.as_deref(),
            &payload.permissions,
        )
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AccessibleEntitiesQuery {
    #[validate(length(min = 1, message = "Informe a permissão."))]
    pub permission: String,
    pub entity_type: String,
    pub profile: Option<String>,
    pub customer_id: Option<Uuid>,
}

// GET /api/permissions/entities?permission=READ&entityType=DEVICE
pub async fn list_accessible_entities(
    State(app_state): State<AppState>,
    caller: CallerContext,
    Query(query): Query<AccessibleEntitiesQuery>,
) -> Result<impl IntoResponse, AppError> {
    query.validate()?;
    let kind: EntityKind = query.entity_type.parse()?;

    let request = AccessibleEntityQuery {
        user_id: caller.user_id,
        permission: query.permission,
        kind,
        tenant_id: caller.tenant_id,
        customer_id: caller.customer_scope(query.customer_id),
        profile: query.profile,
    };

    let ctx = CallContext::with_timeout(app_state.settings.request_timeout);
    let entities = app_state.accessible_entity_service.list(&request, &ctx).await?;

    Ok(Json(entities))
}

#[derive(Debug, Deserialize, Validate)]
pub struct RevokeQuery {
    #[validate(length(min = 1, message = "Informe a permissão."))]
    pub permission: String,
}

// DELETE /api/permissions/entities/{entity_id}?permission=WRITE
pub async fn revoke_entity_access(
    State(app_state): State<AppState>,
    caller: CallerContext,
    Path(entity_id): Path<Uuid>,
    Query(query): Query<RevokeQuery>,
) -> Result<impl IntoResponse, AppError> {
    query.validate()?;

    let summary = revoke_as(
        &app_state.permission_service,
        &caller,
        entity_id,
        &query.permission,
    )
    .await?;

    Ok(Json(summary))
}

// Usuário de cliente precisa de DELETE (ou ALL) na própria entidade.
async fn revoke_as(
    gate: &PermissionService,
    caller: &CallerContext,
    entity_id: Uuid,
    permission: &str,
) -> Result<RevocationSummary, AppError> {
    if caller.is_customer_user() {
        gate.authorize(caller.user_id, Some(entity_id), None, &["DELETE".to_string()]).await?;
    }

    gate.revoke_all_grants_for_entity(entity_id, permission, caller.tenant_id, caller.user_id).await
}
