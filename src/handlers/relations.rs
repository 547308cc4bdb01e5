// src/handlers/relations.rs

use axum::{
    extract::{Query, State},
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
    models::relation::RootSelector,
    services::relation_service::ResolveRequest,
};

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RelationQuery {
    #[validate(length(min = 1, max = 255, message = "O perfil não pode ser vazio."))]
    pub profile: Option<String>,
    pub asset_id: Option<Uuid>,

    #[serde(default = "default_depth")]
    pub depth: usize,

    pub customer_id: Option<Uuid>,
}

fn default_depth() -> usize {
    1
}

impl RelationQuery {
    fn selector(&self) -> Result<RootSelector, AppError> {
        match (&self.profile, self.asset_id) {
            (Some(profile), None) => Ok(RootSelector::Profile(profile.clone())),
            (None, Some(id)) => Ok(RootSelector::Entity(id)),
            _ => Err(AppError::InvalidArgument(
                "Informe exatamente um entre 'profile' e 'assetId'.".into(),
            )),
        }
    }

    fn into_request(self, caller: &CallerContext) -> Result<ResolveRequest, AppError> {
        Ok(ResolveRequest {
            selector: self.selector()?,
            max_depth: self.depth,
            tenant_id: caller.tenant_id,
            // Usuário de cliente só enxerga o próprio cliente.
            customer_id: caller.customer_scope(self.customer_id),
        })
    }
}

// GET /api/relations?profile=Building&depth=2
pub async fn get_relations(
    State(app_state): State<AppState>,
    caller: CallerContext,
    Query(query): Query<RelationQuery>,
) -> Result<impl IntoResponse, AppError> {
    query.validate()?;
    let request = query.into_request(&caller)?;

    let ctx = CallContext::with_timeout(app_state.settings.request_timeout);
    let roots = app_state.relation_service.resolve(&request, &ctx).await?;

    Ok(Json(roots))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::FromRequestParts;

    fn query(profile: Option<&str>, asset_id: Option<Uuid>) -> RelationQuery {
        RelationQuery {
            profile: profile.map(str::to_string),
            asset_id,
            depth: default_depth(),
            customer_id: None,
        }
    }

    #[test]
    fn exactly_one_selector_is_accepted() {
        let id = Uuid::new_v4();

        assert_eq!(
            query(Some("Building"), None).selector().unwrap(),
            RootSelector::Profile("Building".into())
        );
        assert_eq!(query(None, Some(id)).selector().unwrap(), RootSelector::Entity(id));
        assert!(query(None, None).selector().is_err());
        assert!(query(Some("Building"), Some(id)).selector().is_err());
    }

    async fn request_from(uri: &str, headers: &[(&str, String)]) -> Result<ResolveRequest, AppError> {
        let mut builder = axum::http::Request::builder().uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, value.as_str());
        }
        let (mut parts, _) = builder.body(()).unwrap().into_parts();

        let caller = CallerContext::from_request_parts(&mut parts, &()).await?;
        let Query(query) = Query::<RelationQuery>::try_from_uri(&parts.uri).unwrap();
        query.into_request(&caller)
    }

    #[tokio::test]
    async fn customer_header_wins_over_the_query() {
        let (tenant, user) = (Uuid::new_v4(), Uuid::new_v4());
        let (own, asked) = (Uuid::new_v4(), Uuid::new_v4());
        let uri = format!("/api/relations?profile=Building&depth=2&customerId={}", asked);
        let identity = [("x-tenant-id", tenant.to_string()), ("x-user-id", user.to_string())];
        let mut as_customer = identity.to_vec();
        as_customer.push(("x-customer-id", own.to_string()));

        let pinned = request_from(&uri, &as_customer).await.unwrap();
        let requested = request_from(&uri, &identity).await.unwrap();

        assert_eq!(pinned.customer_id, Some(own));
        assert_eq!(pinned.max_depth, 2);
        assert_eq!(pinned.tenant_id, tenant);
        assert_eq!(requested.customer_id, Some(asked));
    }
}
