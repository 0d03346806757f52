//! Collaborator contracts for retrieval and generation backends.
//!
//! Vector stores and model runtimes live outside this crate; they plug in by
//! implementing these traits. Their failures are opaque `anyhow` errors.

use async_trait::async_trait;
use anyhow::Result;
use futures::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};

/// A retrieved piece of source text and where it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub text: String,
    pub source: String,
}

impl RetrievedChunk {
    pub fn new(text: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            source: source.into(),
        }
    }
}

/// Incremental text fragments produced by a streaming generation.
pub type FragmentStream = BoxStream<'static, Result<String>>;

/// Similarity search over an external knowledge store.
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Return up to `k` chunks relevant to `query`, best match first.
    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<RetrievedChunk>>;

    /// The name of this retriever implementation.
    fn name(&self) -> &str;
}

/// Text generation by a language model.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Generate a complete answer for `prompt` at the given sampling `temperature`.
    async fn generate(&self, prompt: &str, temperature: f64) -> Result<String>;

    /// Generate an answer as a stream of fragments.
    ///
    /// Backends without native streaming yield the whole answer as one fragment.
    async fn stream(&self, prompt: &str, temperature: f64) -> Result<FragmentStream> {
        let text = self.generate(prompt, temperature).await?;
        Ok(stream::once(async move { Ok(text) }).boxed())
    }

    /// Model identifier recorded alongside generated messages.
    fn model(&self) -> &str;
}
