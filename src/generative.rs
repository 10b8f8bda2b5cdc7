//! Model handles.
//!
//! The generative model and the embedding model are external services.
//! They are injected through an explicitly constructed `ModelContext` and
//! are always optional: without them the pipeline ranks by formula and
//! skips evidence retrieval.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use crate::evidence::{Embedder, KnowledgeRetriever};
use crate::{Error, Result};

/// A text-generation service: prompt in, raw completion out.
#[async_trait]
pub trait ExplanationSource: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// Plain functions and closures are sources, handy for tests and for
/// wrapping synchronous clients.
#[async_trait]
impl<F> ExplanationSource for F
where
    F: Fn(&str) -> Result<String> + Send + Sync,
{
    async fn generate(&self, prompt: &str) -> Result<String> {
        self(prompt)
    }
}

/// Optional model handles, passed by reference through the pipeline.
#[derive(Clone, Default)]
pub struct ModelContext {
    pub explanation: Option<Arc<dyn ExplanationSource>>,
    pub embedder: Option<Arc<dyn Embedder>>,
    /// Indexed documents searched when a request carries no evidence.
    pub knowledge: Option<Arc<KnowledgeRetriever>>,
}

impl ModelContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_explanation(mut self, source: impl ExplanationSource + 'static) -> Self {
        self.explanation = Some(Arc::new(source));
        self
    }

    pub fn with_embedder(mut self, embedder: impl Embedder + 'static) -> Self {
        self.embedder = Some(Arc::new(embedder));
        self
    }

    pub fn with_knowledge(mut self, retriever: KnowledgeRetriever) -> Self {
        self.knowledge = Some(Arc::new(retriever));
        self
    }
}

impl std::fmt::Debug for ModelContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelContext")
            .field("explanation", &self.explanation.is_some())
            .field("embedder", &self.embedder.is_some())
            .field("knowledge", &self.knowledge.as_ref().map(|k| k.len()))
            .finish()
    }
}

/// Call the source, bounded by `limit`. Timeouts become `GenerativeTimeout`.
pub async fn generate_within(source: &dyn ExplanationSource, prompt: &str, limit: Duration) -> Result<String> {
    match tokio::time::timeout(limit, source.generate(prompt)).await {
        Ok(Ok(text)) => Ok(text),
        Ok(Err(e)) => {
            warn!(error = %e, "generative source failed");
            Err(match e {
                Error::GenerativeSource(_) | Error::GenerativeTimeout(_) => e,
                other => Error::GenerativeSource(other.to_string()),
            })
        }
        Err(_) => {
            warn!(?limit, "generative source timed out");
            Err(Error::GenerativeTimeout(limit))
        }
    }
}
