// src/common/call_context.rs

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::common::error::AppError;

/// Prazo e cancelamento de uma chamada, fornecidos por quem chama.
///
/// Tudo o que a chamada constrói é descartado quando o prazo expira ou o
/// token é cancelado; nenhuma árvore parcial sobrevive.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    deadline: Option<Instant>,
    cancel: CancellationToken,
}

impl CallContext {
    pub fn new(deadline: Option<Instant>, cancel: CancellationToken) -> Self {
        Self { deadline, cancel }
    }

    /// Prazo relativo a partir de agora, com um token próprio.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::new(Some(Instant::now() + timeout), CancellationToken::new())
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Executa `fut` respeitando o cancelamento e o prazo desta chamada.
    pub async fn run<T, F>(&self, fut: F) -> Result<T, AppError>
    where
        F: Future<Output = Result<T, AppError>>,
    {
        let deadline = self.deadline;
        let bounded = async move {
            match deadline {
                Some(at) => tokio::time::timeout_at(at, fut)
                    .await
                    .map_err(|_| AppError::DeadlineExceeded)?,
                None => fut.await,
            }
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(AppError::Cancelled),
            result = bounded => result,
        }
    }
}
