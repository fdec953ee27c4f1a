//! Core domain types for module enhancement.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Opaque identifier of a learning module owned by the surrounding LMS.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModuleId(pub String);

impl ModuleId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ModuleId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ModuleId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for ModuleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A UUID v7 wrapper for queued tasks (time-sortable).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Stages and statuses
// ---------------------------------------------------------------------------

/// One ordered step of the enhancement pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    DetailedContent,
    ConciseContent,
    KeywordLinking,
    VideoEnrichment,
    DiagramSanitization,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DetailedContent => "detailed_content",
            Self::ConciseContent => "concise_content",
            Self::KeywordLinking => "keyword_linking",
            Self::VideoEnrichment => "video_enrichment",
            Self::DiagramSanitization => "diagram_sanitization",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a queued task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "queued" => Ok(Self::Queued),
            "running" => Ok(Self::Running),
            "succeeded" => Ok(Self::Succeeded),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown task status: {other}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Module records (storage collaborator)
// ---------------------------------------------------------------------------

/// Raw module fields as read from storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleRecord {
    pub id: ModuleId,
    pub title: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profession_name: Option<String>,
}

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

/// Unit of queued work. Inputs are captured at enqueue time and never change.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnhancementTask {
    pub id: TaskId,
    pub module_id: ModuleId,
    pub title: String,
    pub raw_content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject_context: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profession_context: Option<String>,
    pub status: TaskStatus,
    pub queued_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<EnhancementResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl EnhancementTask {
    /// Create a freshly queued task.
    pub fn new(
        module_id: ModuleId,
        title: impl Into<String>,
        raw_content: impl Into<String>,
        subject_context: Option<String>,
        profession_context: Option<String>,
    ) -> Self {
        Self {
            id: TaskId::new(),
            module_id,
            title: title.into(),
            raw_content: raw_content.into(),
            subject_context,
            profession_context,
            status: TaskStatus::Queued,
            queued_at: Utc::now(),
            started_at: None,
            finished_at: None,
            result: None,
            error: None,
        }
    }
}

impl From<ModuleRecord> for EnhancementTask {
    fn from(module: ModuleRecord) -> Self {
        Self::new(
            module.id,
            module.title,
            module.content,
            module.subject_name,
            module.profession_name,
        )
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Encyclopedia link attached to a concept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WikiLink {
    pub text: String,
    pub url: String,
    pub description: String,
}

/// Video reference attached to a concept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoRef {
    pub title: String,
    pub video_id: String,
    pub url: String,
    pub description: String,
}

/// A notable term extracted from generated content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyConcept {
    pub concept: String,
    pub definition: String,
    #[serde(default)]
    pub wikipedia_links: Vec<WikiLink>,
    #[serde(default)]
    pub youtube_videos: Vec<VideoRef>,
}

impl KeyConcept {
    pub fn new(concept: impl Into<String>, definition: impl Into<String>) -> Self {
        Self {
            concept: concept.into(),
            definition: definition.into(),
            wikipedia_links: Vec::new(),
            youtube_videos: Vec::new(),
        }
    }
}

/// Output written back to the module record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnhancementResult {
    pub concise_content: String,
    pub detailed_content: String,
    #[serde(default)]
    pub key_concepts: Vec<KeyConcept>,
    /// Stages that fell back to a safe default instead of completing.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub degraded_stages: Vec<Stage>,
}

// ---------------------------------------------------------------------------
// External service payloads
// ---------------------------------------------------------------------------

/// One ranked web search hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchSnippet {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

/// A resolved encyclopedia article.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
    pub title: String,
    pub url: String,
}

// ---------------------------------------------------------------------------
// Queue views
// ---------------------------------------------------------------------------

/// A waiting task and its 1-based position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedEntry {
    pub module_id: ModuleId,
    pub position: usize,
}

/// Point-in-time view of the queue; derived on demand, never stored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueSnapshot {
    pub running_task_id: Option<TaskId>,
    pub running_module_id: Option<ModuleId>,
    pub queued_count: usize,
    pub queue: Vec<QueuedEntry>,
}

impl QueueSnapshot {
    pub fn is_idle(&self) -> bool {
        self.running_task_id.is_none() && self.queue.is_empty()
    }
}

/// Terminal record of a finished task, kept in a short history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskOutcome {
    pub task_id: TaskId,
    pub module_id: ModuleId,
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub degraded_stages: Vec<Stage>,
    pub finished_at: DateTime<Utc>,
}
