//! HTTP implementations of the external services the pipeline depends on.
//!
//! Each client maps transport and status failures onto [`ProviderError`]
//! variants; retrying is left to the caller.
//!
//! [`ProviderError`]: enhancer_shared::ProviderError

mod http;

pub mod llm;
pub mod websearch;
pub mod wikipedia;
pub mod youtube;

use std::sync::Arc;

use tracing::info;

use enhancer_shared::{AppConfig, Encyclopedia, LanguageModel, Result, VideoSearch, WebSearch};

pub use llm::OpenRouterClient;
pub use websearch::GoogleSearchClient;
pub use wikipedia::WikipediaClient;
pub use youtube::YouTubeClient;

/// One client per external service, ready to hand to the pipeline.
#[derive(Clone)]
pub struct Providers {
    pub llm: Arc<dyn LanguageModel>,
    pub search: Arc<dyn WebSearch>,
    pub encyclopedia: Arc<dyn Encyclopedia>,
    pub video: Arc<dyn VideoSearch>,
}

impl Providers {
    /// Build every client from config. Fails if an API key env var is unset.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let retry = &config.retry;
        let providers = Self {
            llm: Arc::new(OpenRouterClient::from_config(&config.llm, retry.llm.timeout())?),
            search: Arc::new(GoogleSearchClient::from_config(
                &config.search,
                retry.search.timeout(),
            )?),
            encyclopedia: Arc::new(WikipediaClient::from_config(
                &config.encyclopedia,
                retry.encyclopedia.timeout(),
            )?),
            video: Arc::new(YouTubeClient::from_config(&config.video, retry.video.timeout())?),
        };

        info!(
            model = %config.llm.model,
            encyclopedia = %config.encyclopedia.base_url,
            "providers configured"
        );
        Ok(providers)
    }
}
