//! Seams between the pipeline and the language models it talks to.
//!
//! The orchestrator only ever holds `Arc<dyn TextModel>` and
//! `Arc<dyn LocalModel>`, so tests swap in scripted models and the binary
//! plugs in the real HTTP clients.

use async_trait::async_trait;
use claude::{Claude, Request, Response};
use ollama::{GenerateRequest, GenerateResponse, Ollama};
use std::future::Future;
use std::time::Duration;

/// A remote chat model (the storyteller and the judge).
#[async_trait]
pub trait TextModel: Send + Sync {
    async fn complete(&self, request: Request) -> Result<Response, claude::Error>;

    /// Model name recorded alongside generated stories.
    fn name(&self) -> &str;
}

#[async_trait]
impl TextModel for Claude {
    async fn complete(&self, request: Request) -> Result<Response, claude::Error> {
        Claude::complete(self, request).await
    }

    fn name(&self) -> &str {
        self.model()
    }
}

/// A locally hosted completion model used when the remote path is down.
#[async_trait]
pub trait LocalModel: Send + Sync {
    async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse, ollama::Error>;

    fn name(&self) -> &str;

    /// Check that the model can serve requests before using it.
    async fn ensure_ready(&self) -> Result<(), ollama::Error> {
        Ok(())
    }
}

#[async_trait]
impl LocalModel for Ollama {
    async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse, ollama::Error> {
        Ollama::generate(self, request).await
    }

    fn name(&self) -> &str {
        self.model()
    }

    async fn ensure_ready(&self) -> Result<(), ollama::Error> {
        if !self.has_model().await? {
            tracing::warn!(
                host = %self.host(),
                model = %self.model(),
                "local model not pulled; run `ollama pull {}`",
                self.model()
            );
        }
        Ok(())
    }
}

/// Bound a remote call by `limit`, mapping expiry to the caller's timeout error.
pub(crate) async fn bounded<T, E, F>(limit: Duration, on_timeout: E, fut: F) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(on_timeout),
    }
}
