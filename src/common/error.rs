use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

// Nosso tipo de erro, com `thiserror` para melhor ergonomia.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Erro de validação")]
    ValidationError(#[from] validator::ValidationErrors),

    #[error("Não encontrado: {0}")]
    NotFound(String),

    #[error("Argumento inválido: {0}")]
    InvalidArgument(String),

    // Falha de autorização (403, não 404)
    #[error("Acesso negado: {0}")]
    Denied(String),

    #[error("Conflito: {0}")]
    Conflict(String),

    // Falha de um armazenamento externo (arestas, atributos, entidades). Pode ser repetida.
    #[error("Falha no armazenamento externo: {0}")]
    Upstream(String),

    #[error("Prazo da requisição esgotado")]
    DeadlineExceeded,

    #[error("Requisição cancelada")]
    Cancelled,

    #[error("Erro de banco de dados")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Erro interno do servidor")]
    InternalServerError(#[from] anyhow::Error),
}

impl AppError {
    /// O chamador pode simplesmente tentar de novo.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::Upstream(_) | AppError::DatabaseError(_) | AppError::DeadlineExceeded
        )
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            // Retorna todos os detalhes da validação.
            AppError::ValidationError(errors) => {
                let mut details = std::collections::HashMap::new();
                for (field, field_errors) in errors.field_errors() {
                    let messages: Vec<String> = field_errors
                        .iter()
                        .filter_map(|e| e.message.as_ref().map(|m| m.to_string()))
                        .collect();
                    details.insert(field.to_string(), messages);
                }
                let body = Json(json!({
                    "error": "Um ou mais campos são inválidos.",
                    "details": details,
                }));
                return (StatusCode::BAD_REQUEST, body).into_response();
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::InvalidArgument(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Denied(msg) => (StatusCode::FORBIDDEN, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::DeadlineExceeded => (
                StatusCode::GATEWAY_TIMEOUT,
                "A requisição excedeu o tempo limite.".to_string(),
            ),
            AppError::Cancelled => (
                StatusCode::REQUEST_TIMEOUT,
                "A requisição foi cancelada.".to_string(),
            ),
            ref e @ (AppError::Upstream(_) | AppError::DatabaseError(_)) => {
                tracing::error!("Falha em armazenamento externo: {}", e);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Serviço temporariamente indisponível. Tente novamente.".to_string(),
                )
            }
            // O `tracing` loga a mensagem detalhada que `thiserror` nos deu.
            ref e => {
                tracing::error!("Erro Interno do Servidor: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Ocorreu um erro inesperado.".to_string(),
                )
            }
        };

        let body = Json(json!({ "error": error_message }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn denied_and_not_found_map_to_different_statuses() {
        let denied = AppError::Denied("x".into()).into_response();
        let missing = AppError::NotFound("x".into()).into_response();
        assert_eq!(denied.status(), StatusCode::FORBIDDEN);
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn store_failures_are_retryable() {
        assert!(AppError::Upstream("edge store down".into()).is_retryable());
        assert!(AppError::DeadlineExceeded.is_retryable());
        assert!(!AppError::Conflict("in use".into()).is_retryable());
        assert_eq!(
            AppError::Upstream("x".into()).into_response().status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
