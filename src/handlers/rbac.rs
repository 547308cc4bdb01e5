// src/handlers/rbac.rs

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde_json::json;
use uuid::Uuid;
use validator::Validate;

use crate::{
    common::error::AppError,
    config::AppState,
    middleware::tenancy::CallerContext,
    models::{
        page::PageLink,
        rbac::{
            AssignRolePayload, CreatePermissionPayload, CreateRolePayload, GrantPermissionPayload,
            RevokeGrantQuery,
        },
    },
};

// =============================================================================
//  ÁREA 1: CATÁLOGO DE PERMISSÕES
// =============================================================================

// POST /api/permissions
pub async fn create_permission(
    State(app_state): State<AppState>,
    caller: CallerContext,
    Json(payload): Json<CreatePermissionPayload>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let permission = app_state
        .rbac_service
        .create_permission(caller.tenant_id, &payload.name)
        .await?;

    Ok((StatusCode::CREATED, Json(permission)))
}

// GET /api/permissions?page=0&pageSize=20&textSearch=read
pub async fn list_permissions(
    State(app_state): State<AppState>,
    caller: CallerContext,
    Query(link): Query<PageLink>,
) -> Result<impl IntoResponse, AppError> {
    link.validate()?;

    let page = app_state
        .rbac_service
        .list_permissions(caller.tenant_id, &link)
        .await?;

    Ok(Json(page))
}

// DELETE /api/permissions/{permission_id}
pub async fn delete_permission(
    State(app_state): State<AppState>,
    caller: CallerContext,
    Path(permission_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    app_state
        .rbac_service
        .delete_permission(caller.tenant_id, permission_id)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
//  ÁREA 2: CARGOS
// =============================================================================

// POST /api/roles
pub async fn create_role(
    State(app_state): State<AppState>,
    caller: CallerContext,
    Json(payload): Json<CreateRolePayload>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let response = app_state
        .rbac_service
        .create_role(caller.tenant_id, &payload.name, &payload.permissions)
        .await?;

    Ok((StatusCode::CREATED, Json(response)))
}

// GET /api/roles?page=0&pageSize=20&textSearch=oper
pub async fn list_roles(
    State(app_state): State<AppState>,
    caller: CallerContext,
    Query(link): Query<PageLink>,
) -> Result<impl IntoResponse, AppError> {
    link.validate()?;

    let page = app_state.rbac_service.list_roles(caller.tenant_id, &link).await?;

    Ok(Json(page))
}

// DELETE /api/roles/{role_id}
pub async fn delete_role(
    State(app_state): State<AppState>,
    caller: CallerContext,
    Path(role_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let removed = app_state
        .rbac_service
        .delete_role(caller.tenant_id, role_id)
        .await?;

    Ok(Json(json!({ "grantsRemoved": removed })))
}

// GET /api/roles/{role_id}/permissions?page=0&pageSize=20
pub async fn list_role_permissions(
    State(app_state): State<AppState>,
    caller: CallerContext,
    Path(role_id): Path<Uuid>,
    Query(link): Query<PageLink>,
) -> Result<impl IntoResponse, AppError> {
    link.validate()?;

    let page = app_state
        .rbac_service
        .list_role_permissions(caller.tenant_id, role_id, &link)
        .await?;

    Ok(Json(page))
}

// POST /api/roles/{role_id}/permissions/{name}
pub async fn add_role_permission(
    State(app_state): State<AppState>,
    caller: CallerContext,
    Path((role_id, name)): Path<(Uuid, String)>,
) -> Result<impl IntoResponse, AppError> {
    app_state
        .rbac_service
        .add_permission_to_role(caller.tenant_id, role_id, &name)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

// DELETE /api/roles/{role_id}/permissions/{name}
pub async fn remove_role_permission(
    State(app_state): State<AppState>,
    caller: CallerContext,
    Path((role_id, name)): Path<(Uuid, String)>,
) -> Result<impl IntoResponse, AppError> {
    app_state
        .rbac_service
        .remove_permission_from_role(caller.tenant_id, role_id, &name)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
//  ÁREA 3: ATRIBUIÇÕES
// =============================================================================

// POST /api/roles/{role_id}/assignments
pub async fn assign_role(
    State(app_state): State<AppState>,
    caller: CallerContext,
    Path(role_id): Path<Uuid>,
    Json(payload): Json<AssignRolePayload>,
) -> Result<impl IntoResponse, AppError> {
    let grants = app_state
        .rbac_service
        .assign_role_to_user(
            caller.tenant_id,
            role_id,
            payload.user_id,
            payload.entity_id,
            payload.entity_type,
        )
        .await?;

    Ok((StatusCode::CREATED, Json(grants)))
}

// DELETE /api/roles/{role_id}/assignments/{user_id}
pub async fn unassign_role(
    State(app_state): State<AppState>,
    caller: CallerContext,
    Path((role_id, user_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, AppError> {
    let removed = app_state
        .rbac_service
        .unassign_role_from_user(caller.tenant_id, role_id, user_id)
        .await?;

    Ok(Json(json!({ "grantsRemoved": removed })))
}

// GET /api/users/{user_id}/permissions?page=0&pageSize=20
pub async fn list_user_grants(
    State(app_state): State<AppState>,
    caller: CallerContext,
    Path(user_id): Path<Uuid>,
    Query(link): Query<PageLink>,
) -> Result<impl IntoResponse, AppError> {
    link.validate()?;

    let page = app_state
        .rbac_service
        .list_user_grants(caller.tenant_id, user_id, &link)
        .await?;

    Ok(Json(page))
}

// POST /api/user-permissions
pub async fn grant_permissions(
    State(app_state): State<AppState>,
    caller: CallerContext,
    Json(payload): Json<Vec<GrantPermissionPayload>>,
) -> Result<impl IntoResponse, AppError> {
    for grant in &payload {
        grant.validate()?;
    }

    let saved = app_state
        .rbac_service
        .grant_permissions(caller.tenant_id, &payload)
        .await?;

    Ok((StatusCode::CREATED, Json(saved)))
}

// DELETE /api/user-permissions?userId=..&entityId=..&permissionId=..
pub async fn revoke_grant(
    State(app_state): State<AppState>,
    caller: CallerContext,
    Query(query): Query<RevokeGrantQuery>,
) -> Result<impl IntoResponse, AppError> {
    let removed = app_state
        .rbac_service
        .revoke_grant(caller.tenant_id, query.user_id, query.entity_id, query.permission_id)
        .await?;

    Ok(Json(json!({ "grantsRemoved": removed })))
}
