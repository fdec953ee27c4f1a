//! Markdown passes used by the enhancement pipeline.
//!
//! - [`sanitize`] repairs Mermaid diagram blocks produced by the language model
//! - [`find_emphasis_spans`] / [`rewrite_as_links`] locate bold terms and turn them into links
//! - [`fenced_ranges`] reports code fences so other passes can leave them alone

mod fence;

pub mod diagram;
pub mod emphasis;

pub use diagram::{DEFAULT_DECLARATION, sanitize};
pub use emphasis::{EmphasisSpan, find_emphasis_spans, rewrite_as_links};
pub use fence::fenced_ranges;
