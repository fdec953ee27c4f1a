//! Collaborator interfaces consumed by the pipeline.
//!
//! Production implementations live in `enhancer-providers` (HTTP) and
//! `enhancer-storage` (libSQL); tests swap in scripted fakes.

use async_trait::async_trait;

use crate::error::{ProviderError, Result};
use crate::types::{Article, EnhancementResult, ModuleId, ModuleRecord, SearchSnippet, VideoRef};

/// Text generation backend.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Generate text for `prompt`, optionally grounded by `context`.
    async fn generate(
        &self,
        prompt: &str,
        context: Option<&str>,
    ) -> std::result::Result<String, ProviderError>;
}

/// Ranked web search.
#[async_trait]
pub trait WebSearch: Send + Sync {
    async fn search(&self, query: &str) -> std::result::Result<Vec<SearchSnippet>, ProviderError>;
}

/// Encyclopedia article lookup. `Ok(None)` means "no article", not a failure.
#[async_trait]
pub trait Encyclopedia: Send + Sync {
    async fn resolve(&self, term: &str) -> std::result::Result<Option<Article>, ProviderError>;
}

/// Ranked video search.
#[async_trait]
pub trait VideoSearch: Send + Sync {
    async fn search(&self, query: &str) -> std::result::Result<Vec<VideoRef>, ProviderError>;
}

/// Module persistence owned by the surrounding LMS.
#[async_trait]
pub trait ModuleStore: Send + Sync {
    async fn get_module(&self, id: &ModuleId) -> Result<ModuleRecord>;

    /// Overwrite the enrichment fields of a module. `source_content` is the
    /// raw content the enrichment was produced from, which may differ from
    /// what is stored by the time the write lands.
    async fn update_module_enrichment(
        &self,
        id: &ModuleId,
        source_content: &str,
        result: &EnhancementResult,
    ) -> Result<()>;
}
