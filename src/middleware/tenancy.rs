// src/middleware/tenancy.rs

use axum::{extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

use crate::common::error::AppError;

// Cabeçalhos preenchidos pelo gateway (identidade já verificada lá)
const TENANT_ID_HEADER: &str = "x-tenant-id";
const USER_ID_HEADER: &str = "x-user-id";
const CUSTOMER_ID_HEADER: &str = "x-customer-id";

/// Quem está chamando: tenant, usuário e, para usuários de cliente, o cliente.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallerContext {
    pub tenant_id: Uuid,
    pub user_id: Uuid,
    pub customer_id: Option<Uuid>,
}

impl CallerContext {
    pub fn is_customer_user(&self) -> bool {
        self.customer_id.is_some()
    }

    /// Cliente efetivo de uma consulta: usuário de cliente fica preso ao próprio
    /// cliente, o `customerId` pedido só vale para usuários do tenant.
    pub fn customer_scope(&self, requested: Option<Uuid>) -> Option<Uuid> {
        self.customer_id.or(requested)
    }
}

impl<S> FromRequestParts<S> for CallerContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(CallerContext {
            tenant_id: required_uuid(parts, TENANT_ID_HEADER)?,
            user_id: required_uuid(parts, USER_ID_HEADER)?,
            customer_id: optional_uuid(parts, CUSTOMER_ID_HEADER)?,
        })
    }
}

fn required_uuid(parts: &Parts, header: &str) -> Result<Uuid, AppError> {
    optional_uuid(parts, header)?.ok_or_else(|| {
        AppError::InvalidArgument(format!("O cabeçalho {} é obrigatório.", header))
    })
}

fn optional_uuid(parts: &Parts, header: &str) -> Result<Option<Uuid>, AppError> {
    let Some(value) = parts.headers.get(header) else {
        return Ok(None);
    };

    let raw = value.to_str().map_err(|_| {
        AppError::InvalidArgument(format!("Cabeçalho {} contém caracteres inválidos.", header))
    })?;

    Uuid::parse_str(raw.trim())
        .map(Some)
        .map_err(|_| AppError::InvalidArgument(format!("Cabeçalho {} inválido (não é um UUID).", header)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn extract(headers: &[(&str, &str)]) -> Result<CallerContext, AppError> {
        let mut builder = Request::builder().uri("/api/relations");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let (mut parts, _) = builder.body(()).unwrap().into_parts();
        CallerContext::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn reads_all_headers() {
        let (tenant, user, customer) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let (t, u, c) = (tenant.to_string(), user.to_string(), customer.to_string());

        let caller = extract(&[
            (TENANT_ID_HEADER, t.as_str()),
            (USER_ID_HEADER, u.as_str()),
            (CUSTOMER_ID_HEADER, c.as_str()),
        ])
        .await
        .unwrap();

        assert_eq!(caller.tenant_id, tenant);
        assert_eq!(caller.user_id, user);
        assert!(caller.is_customer_user());
    }

    #[tokio::test]
    async fn customer_header_is_optional() {
        let (t, u) = (Uuid::new_v4().to_string(), Uuid::new_v4().to_string());

        let caller = extract(&[(TENANT_ID_HEADER, t.as_str()), (USER_ID_HEADER, u.as_str())])
            .await
            .unwrap();

        assert_eq!(caller.customer_id, None);
    }

    #[tokio::test]
    async fn missing_or_bad_tenant_is_rejected() {
        let user = Uuid::new_v4().to_string();

        let missing = extract(&[(USER_ID_HEADER, user.as_str())]).await;
        let bad = extract(&[(TENANT_ID_HEADER, "loja-1"), (USER_ID_HEADER, user.as_str())]).await;

        assert!(matches!(missing, Err(AppError::InvalidArgument(_))));
        assert!(matches!(bad, Err(AppError::InvalidArgument(_))));
    }

    #[test]
    fn customer_header_overrides_the_requested_customer() {
        let (own, asked) = (Uuid::new_v4(), Uuid::new_v4());
        let customer_user = CallerContext {
            tenant_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            customer_id: Some(own),
        };
        let tenant_user = CallerContext {
            customer_id: None,
            ..customer_user
        };

        assert_eq!(customer_user.customer_scope(Some(asked)), Some(own));
        assert_eq!(customer_user.customer_scope(None), Some(own));
        assert_eq!(tenant_user.customer_scope(Some(asked)), Some(asked));
        assert_eq!(tenant_user.customer_scope(None), None);
    }
}
