//! Enhancement pipeline and task queue.
//!
//! This crate turns a raw LMS module into an [`EnhancementResult`]: field
//! detection, search-query shaping, detailed and concise generation,
//! encyclopedia linking, per-concept videos, and diagram cleanup. The
//! [`TaskQueue`] runs one pipeline at a time and persists successful results.
//!
//! [`EnhancementResult`]: enhancer_shared::EnhancementResult

pub mod concepts;
pub mod field;
pub mod linker;
pub mod pipeline;
pub mod prompts;
pub mod query;
pub mod queue;
pub mod retry;
pub mod video;

#[cfg(test)]
mod testing;

pub use field::{FieldDetector, FieldProfile};
pub use linker::{LinkedText, WikipediaLinker};
pub use pipeline::{EnhancementPipeline, ProgressReporter, SilentProgress};
pub use query::{QueryMode, QueryOptimizer};
pub use queue::{TaskQueue, WorkerHandle};
pub use retry::RetryPolicy;
pub use video::{EnrichedConcepts, VideoEnricher};
