//! Shared types, error model, configuration, and collaborator traits for the enhancer.
//!
//! This crate is the foundation depended on by all other enhancer crates.
//! It provides:
//! - [`EnhancerError`] / [`ProviderError`]: the unified error types
//! - Domain types ([`EnhancementTask`], [`EnhancementResult`], [`KeyConcept`], [`QueueSnapshot`])
//! - Configuration ([`AppConfig`], [`PipelineConfig`], config loading)
//! - Collaborator traits ([`LanguageModel`], [`WebSearch`], [`Encyclopedia`], [`VideoSearch`], [`ModuleStore`])

pub mod config;
pub mod error;
pub mod services;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, EncyclopediaConfig, LlmConfig, PipelineConfig, QueueConfig, RetryConfig,
    RetrySettings, SearchConfig, StorageConfig, VideoConfig, config_dir, config_file_path,
    init_config, load_config, load_config_from, read_secret, validate_api_keys,
};
pub use error::{EnhancerError, ProviderError, Result};
pub use services::{Encyclopedia, LanguageModel, ModuleStore, VideoSearch, WebSearch};
pub use types::{
    Article, EnhancementResult, EnhancementTask, KeyConcept, ModuleId, ModuleRecord,
    QueueSnapshot, QueuedEntry, SearchSnippet, Stage, TaskId, TaskOutcome, TaskStatus, VideoRef,
    WikiLink,
};
