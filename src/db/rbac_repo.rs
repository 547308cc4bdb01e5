// src/db/rbac_repo.rs

use async_trait::async_trait;
use sqlx::{Executor, PgPool, Postgres};
use uuid::Uuid;

use crate::common::error::AppError;
use crate::db::stores::{GrantStore, PermissionStore, RoleStore};
use crate::models::{
    entity::NULL_CUSTOMER_ID,
    page::{PageData, PageLink},
    rbac::{
        NewGrant, Permission, ResolvedGrant, ResolvedGrantRow, RevocationSummary, Role,
        UserPermission, UserPermissionRow,
    },
    relation::EntityKind,
};

const GRANT_COLUMNS: &str =
    "up.id, up.user_id, up.permission_id, up.role_id, up.entity_id, up.entity_type, up.api_url, up.created_time";

#[derive(Clone)]
pub struct RbacRepository {
    pool: PgPool,
}

impl RbacRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // Vincular Cargo <-> Permissão (em massa, usando UNNEST)
    async fn assign_permissions<'e, E>(
        &self,
        executor: E,
        role_id: Uuid,
        permission_ids: &[Uuid],
    ) -> Result<(), AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query(
            r#"
            INSERT INTO role_permission (role_id, permission_id)
            SELECT $1, unnest($2::uuid[])
            ON CONFLICT DO NOTHING
            "#,
        )
            .bind(role_id)
            .bind(permission_ids)
            .execute(executor)
            .await?;

        Ok(())
    }

    async fn resolved_grants(&self, filter: &str, user_id: Uuid, bind: GrantFilter<'_>)
    -> Result<Vec<ResolvedGrant>, AppError> {
        let sql = format!(
            r#"
            SELECT {GRANT_COLUMNS}, p.name AS permission_name
            FROM user_permission up
            JOIN permission p ON p.id = up.permission_id
            WHERE up.user_id = $1 AND {filter}
            ORDER BY up.created_time
            "#
        );

        let query = sqlx::query_as::<_, ResolvedGrantRow>(&sql).bind(user_id);
        let query = match bind {
            GrantFilter::Entity(entity_id) => query.bind(entity_id),
            GrantFilter::ApiUrl(api_url) => query.bind(api_url),
        };

        query
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(ResolvedGrant::try_from)
            .collect()
    }
}

enum GrantFilter<'a> {
    Entity(Uuid),
    ApiUrl(&'a str),
}

// `textSearch` vira padrão ILIKE; vazio conta como ausente.
fn search_pattern(link: &PageLink) -> Option<String> {
    link.text_search
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(|s| format!("%{}%", s))
}

fn unique_violation(e: sqlx::Error, message: String) -> AppError {
    if let sqlx::Error::Database(db_err) = &e {
        if db_err.is_unique_violation() {
            return AppError::Conflict(message);
        }
    }
    e.into()
}

#[async_trait]
impl PermissionStore for RbacRepository {
    async fn find_by_name(
        &self,
        tenant_id: Uuid,
        name: &str,
    ) -> Result<Option<Permission>, AppError> {
        let permission = sqlx::query_as::<_, Permission>(
            "SELECT id, tenant_id, name, created_time FROM permission WHERE tenant_id = $1 AND lower(name) = lower($2)",
        )
            .bind(tenant_id)
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;

        Ok(permission)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Permission>, AppError> {
        let permission = sqlx::query_as::<_, Permission>(
            "SELECT id, tenant_id, name, created_time FROM permission WHERE id = $1",
        )
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(permission)
    }

    async fn insert(&self, tenant_id: Uuid, name: &str) -> Result<Permission, AppError> {
        sqlx::query_as::<_, Permission>(
            r#"
            INSERT INTO permission (id, tenant_id, name)
            VALUES ($1, $2, $3)
            RETURNING id, tenant_id, name, created_time
            "#,
        )
            .bind(Uuid::new_v4())
            .bind(tenant_id)
            .bind(name)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| unique_violation(e, format!("Já existe uma permissão chamada '{}'.", name)))
    }

    async fn find_page(
        &self,
        tenant_id: Uuid,
        link: &PageLink,
    ) -> Result<PageData<Permission>, AppError> {
        let search = search_pattern(link);

        let total: i64 = sqlx::query_scalar(
            "SELECT count(*) FROM permission WHERE tenant_id = $1 AND ($2::text IS NULL OR name ILIKE $2)",
        )
            .bind(tenant_id)
            .bind(search.as_deref())
            .fetch_one(&self.pool)
            .await?;

        let data = sqlx::query_as::<_, Permission>(
            r#"
            SELECT id, tenant_id, name, created_time
            FROM permission
            WHERE tenant_id = $1 AND ($2::text IS NULL OR name ILIKE $2)
            ORDER BY name
            LIMIT $3 OFFSET $4
            "#,
        )
            .bind(tenant_id)
            .bind(search.as_deref())
            .bind(link.limit())
            .bind(link.offset())
            .fetch_all(&self.pool)
            .await?;

        Ok(PageData::new(data, total.max(0) as u64, link))
    }

    async fn delete_unreferenced(&self, id: Uuid) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        let in_role: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM role_permission WHERE permission_id = $1)",
        )
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;
        if in_role {
            return Err(AppError::Conflict(
                "A permissão está atribuída a um cargo e não pode ser removida.".into(),
            ));
        }

        let in_grant: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM user_permission WHERE permission_id = $1)",
        )
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;
        if in_grant {
            return Err(AppError::Conflict(
                "A permissão está atribuída a um usuário e não pode ser removida.".into(),
            ));
        }

        let deleted = sqlx::query("DELETE FROM permission WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                // Corrida com uma concessão criada entre a checagem e o DELETE
                if let sqlx::Error::Database(db_err) = &e {
                    if db_err.is_foreign_key_violation() {
                        return AppError::Conflict("A permissão ainda está em uso.".into());
                    }
                }
                AppError::from(e)
            })?
            .rows_affected();

        if deleted == 0 {
            return Err(AppError::NotFound(format!("Permissão {} não encontrada.", id)));
        }

        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl RoleStore for RbacRepository {
    async fn create_with_permissions(
        &self,
        tenant_id: Uuid,
        name: &str,
        permission_ids: &[Uuid],
    ) -> Result<Role, AppError> {
        // 1. Inicia Transação
        let mut tx = self.pool.begin().await?;

        // 2. Cria o Cargo
        let role = sqlx::query_as::<_, Role>(
            r#"
            INSERT INTO role (id, tenant_id, name)
            VALUES ($1, $2, $3)
            RETURNING id, tenant_id, name, created_time
            "#,
        )
            .bind(Uuid::new_v4())
            .bind(tenant_id)
            .bind(name)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| unique_violation(e, "Já existe um cargo com esse nome.".into()))?;

        // 3. Salva o Vínculo
        if !permission_ids.is_empty() {
            self.assign_permissions(&mut *tx, role.id, permission_ids).await?;
        }

        // 4. Commit
        tx.commit().await?;
        Ok(role)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Role>, AppError> {
        let role = sqlx::query_as::<_, Role>(
            "SELECT id, tenant_id, name, created_time FROM role WHERE id = $1",
        )
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(role)
    }

    async fn add_permission(&self, role_id: Uuid, permission_id: Uuid) -> Result<(), AppError> {
        self.assign_permissions(&self.pool, role_id, &[permission_id]).await
    }

    async fn remove_permission(&self, role_id: Uuid, permission_id: Uuid) -> Result<(), AppError> {
        sqlx::query("DELETE FROM role_permission WHERE role_id = $1 AND permission_id = $2")
            .bind(role_id)
            .bind(permission_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn permission_ids(&self, role_id: Uuid) -> Result<Vec<Uuid>, AppError> {
        let ids = sqlx::query_scalar::<_, Uuid>(
            "SELECT permission_id FROM role_permission WHERE role_id = $1",
        )
            .bind(role_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(ids)
    }

    async fn find_page(&self, tenant_id: Uuid, link: &PageLink) -> Result<PageData<Role>, AppError> {
        let search = search_pattern(link);

        let total: i64 = sqlx::query_scalar(
            "SELECT count(*) FROM role WHERE tenant_id = $1 AND ($2::text IS NULL OR name ILIKE $2)",
        )
            .bind(tenant_id)
            .bind(search.as_deref())
            .fetch_one(&self.pool)
            .await?;

        let data = sqlx::query_as::<_, Role>(
            r#"
            SELECT id, tenant_id, name, created_time
            FROM role
            WHERE tenant_id = $1 AND ($2::text IS NULL OR name ILIKE $2)
            ORDER BY name
            LIMIT $3 OFFSET $4
            "#,
        )
            .bind(tenant_id)
            .bind(search.as_deref())
            .bind(link.limit())
            .bind(link.offset())
            .fetch_all(&self.pool)
            .await?;

        Ok(PageData::new(data, total.max(0) as u64, link))
    }

    async fn permission_page(
        &self,
        role_id: Uuid,
        link: &PageLink,
    ) -> Result<PageData<Permission>, AppError> {
        let search = search_pattern(link);

        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT count(*)
            FROM role_permission rp
            JOIN permission p ON p.id = rp.permission_id
            WHERE rp.role_id = $1 AND ($2::text IS NULL OR p.name ILIKE $2)
            "#,
        )
            .bind(role_id)
            .bind(search.as_deref())
            .fetch_one(&self.pool)
            .await?;

        let data = sqlx::query_as::<_, Permission>(
            r#"
            SELECT p.id, p.tenant_id, p.name, p.created_time
            FROM role_permission rp
            JOIN permission p ON p.id = rp.permission_id
            WHERE rp.role_id = $1 AND ($2::text IS NULL OR p.name ILIKE $2)
            ORDER BY p.name
            LIMIT $3 OFFSET $4
            "#,
        )
            .bind(role_id)
            .bind(search.as_deref())
            .bind(link.limit())
            .bind(link.offset())
            .fetch_all(&self.pool)
            .await?;

        Ok(PageData::new(data, total.max(0) as u64, link))
    }

    async fn delete(&self, role_id: Uuid) -> Result<u64, AppError> {
        let mut tx = self.pool.begin().await?;

        // 1. Concessões que nasceram do cargo
        let grants_removed = sqlx::query("DELETE FROM user_permission WHERE role_id = $1")
            .bind(role_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        // 2. O cargo (role_permission vai junto por CASCADE)
        let deleted = sqlx::query("DELETE FROM role WHERE id = $1")
            .bind(role_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if deleted == 0 {
            return Err(AppError::NotFound(format!("Cargo {} não encontrado.", role_id)));
        }

        tx.commit().await?;
        Ok(grants_removed)
    }
}

#[async_trait]
impl GrantStore for RbacRepository {
    async fn find_by_user_and_entity(
        &self,
        user_id: Uuid,
        entity_id: Uuid,
    ) -> Result<Vec<ResolvedGrant>, AppError> {
        self.resolved_grants("up.entity_id = $2", user_id, GrantFilter::Entity(entity_id))
            .await
    }

    async fn find_by_user_and_api_url(
        &self,
        user_id: Uuid,
        api_url: &str,
    ) -> Result<Vec<ResolvedGrant>, AppError> {
        self.resolved_grants("up.api_url = $2", user_id, GrantFilter::ApiUrl(api_url))
            .await
    }

    async fn find_entity_ids(
        &self,
        user_id: Uuid,
        permission_id: Uuid,
        kind: EntityKind,
    ) -> Result<Vec<Uuid>, AppError> {
        let ids = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT entity_id
            FROM user_permission
            WHERE user_id = $1
              AND permission_id = $2
              AND entity_type = $3
              AND entity_id IS NOT NULL
            ORDER BY created_time
            "#,
        )
            .bind(user_id)
            .bind(permission_id)
            .bind(kind.as_str())
            .fetch_all(&self.pool)
            .await?;

        Ok(ids)
    }

    async fn insert_all(&self, grants: Vec<NewGrant>) -> Result<Vec<UserPermission>, AppError> {
        let mut tx = self.pool.begin().await?;
        let mut saved = Vec::with_capacity(grants.len());

        for grant in grants {
            let row = sqlx::query_as::<_, UserPermissionRow>(
                r#"
                INSERT INTO user_permission (id, user_id, permission_id, role_id, entity_id, entity_type, api_url)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                RETURNING id, user_id, permission_id, role_id, entity_id, entity_type, api_url, created_time
                "#,
            )
                .bind(Uuid::new_v4())
                .bind(grant.user_id)
                .bind(grant.permission_id)
                .bind(grant.role_id)
                .bind(grant.entity_id)
                .bind(grant.entity_type.map(|k| k.as_str()))
                .bind(grant.api_url.as_deref())
                .fetch_one(&mut *tx)
                .await?;

            saved.push(UserPermission::try_from(row)?);
        }

        tx.commit().await?;
        Ok(saved)
    }

    async fn delete_by_user_and_role(&self, user_id: Uuid, role_id: Uuid) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM user_permission WHERE user_id = $1 AND role_id = $2")
            .bind(user_id)
            .bind(role_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn delete_one(
        &self,
        user_id: Uuid,
        entity_id: Uuid,
        permission_id: Uuid,
    ) -> Result<u64, AppError> {
        let result = sqlx::query(
            "DELETE FROM user_permission WHERE user_id = $1 AND entity_id = $2 AND permission_id = $3",
        )
            .bind(user_id)
            .bind(entity_id)
            .bind(permission_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn find_page_by_user(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
        link: &PageLink,
    ) -> Result<PageData<ResolvedGrant>, AppError> {
        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT count(*)
            FROM user_permission up
            JOIN permission p ON p.id = up.permission_id AND p.tenant_id = $2
            WHERE up.user_id = $1
            "#,
        )
            .bind(user_id)
            .bind(tenant_id)
            .fetch_one(&self.pool)
            .await?;

        let sql = format!(
            r#"
            SELECT {GRANT_COLUMNS}, p.name AS permission_name
            FROM user_permission up
            JOIN permission p ON p.id = up.permission_id AND p.tenant_id = $2
            WHERE up.user_id = $1
            ORDER BY up.created_time DESC
            LIMIT $3 OFFSET $4
            "#
        );
        let data = sqlx::query_as::<_, ResolvedGrantRow>(&sql)
            .bind(user_id)
            .bind(tenant_id)
            .bind(link.limit())
            .bind(link.offset())
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(ResolvedGrant::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(PageData::new(data, total.max(0) as u64, link))
    }

    async fn revoke_entity_access(
        &self,
        tenant_id: Uuid,
        entity_id: Uuid,
        permission_id: Uuid,
        acting_user_id: Uuid,
    ) -> Result<RevocationSummary, AppError> {
        // Tudo ou nada: se qualquer passo falhar, o drop do `tx` faz rollback.
        let mut tx = self.pool.begin().await?;

        let by_permission =
            sqlx::query("DELETE FROM user_permission WHERE permission_id = $1 AND entity_id = $2")
                .bind(permission_id)
                .bind(entity_id)
                .execute(&mut *tx)
                .await?
                .rows_affected();

        let by_user = sqlx::query("DELETE FROM user_permission WHERE user_id = $1 AND entity_id = $2")
            .bind(acting_user_id)
            .bind(entity_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        let mut detached = 0;
        for table in ["asset", "device"] {
            let sql = format!("UPDATE {table} SET customer_id = $3 WHERE id = $1 AND tenant_id = $2");
            detached += sqlx::query(&sql)
                .bind(entity_id)
                .bind(tenant_id)
                .bind(NULL_CUSTOMER_ID)
                .execute(&mut *tx)
                .await?
                .rows_affected();
        }

        tx.commit().await?;

        Ok(RevocationSummary {
            grants_removed: by_permission + by_user,
            detached: detached > 0,
        })
    }
}
