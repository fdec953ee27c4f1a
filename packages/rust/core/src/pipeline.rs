//! Five-stage enhancement of one module.
//!
//! Order is fixed: detailed content, concise content, keyword linking, video
//! enrichment, diagram sanitization. Only the first stage is fatal. Every
//! later stage degrades to the best partial result and records itself in
//! [`EnhancementResult::degraded_stages`].

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use enhancer_shared::{
    Encyclopedia, EnhancementResult, EnhancementTask, EnhancerError, LanguageModel, ModuleId,
    PipelineConfig, Result, SearchSnippet, Stage, TaskOutcome, VideoSearch, WebSearch,
};

use crate::concepts::{attach_links, extract_key_concepts};
use crate::field::{FieldDetector, FieldProfile};
use crate::linker::{LookupCache, WikipediaLinker};
use crate::prompts::{concise_prompt, detailed_prompt, grounding_context};
use crate::query::{QueryMode, QueryOptimizer};
use crate::retry::RetryPolicy;
use crate::video::VideoEnricher;

// ---------------------------------------------------------------------------
// Progress reporting
// ---------------------------------------------------------------------------

/// Callback interface for queue and stage progress.
pub trait ProgressReporter: Send + Sync {
    /// A task left the queue and is now running.
    fn task_started(&self, task: &EnhancementTask);
    /// A pipeline stage is starting.
    fn stage(&self, module_id: &ModuleId, stage: Stage);
    /// A task reached a terminal state.
    fn task_finished(&self, outcome: &TaskOutcome);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn task_started(&self, _task: &EnhancementTask) {}
    fn stage(&self, _module_id: &ModuleId, _stage: Stage) {}
    fn task_finished(&self, _outcome: &TaskOutcome) {}
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

pub struct EnhancementPipeline {
    llm: Arc<dyn LanguageModel>,
    search: Arc<dyn WebSearch>,
    linker: WikipediaLinker,
    videos: VideoEnricher,
    detector: FieldDetector,
    queries: QueryOptimizer,
    llm_policy: RetryPolicy,
    search_policy: RetryPolicy,
    config: PipelineConfig,
}

impl EnhancementPipeline {
    pub fn new(
        llm: Arc<dyn LanguageModel>,
        search: Arc<dyn WebSearch>,
        encyclopedia: Arc<dyn Encyclopedia>,
        video: Arc<dyn VideoSearch>,
        config: PipelineConfig,
    ) -> Self {
        let linker = WikipediaLinker::new(
            encyclopedia,
            RetryPolicy::from(config.retry.encyclopedia),
            config.lookup_delay,
        );
        let videos = VideoEnricher::new(
            video,
            RetryPolicy::from(config.retry.video),
            config.video_delay,
            config.videos_per_concept,
            config.max_concepts,
        );
        Self {
            llm,
            search,
            linker,
            videos,
            detector: FieldDetector::new(),
            queries: QueryOptimizer::new(),
            llm_policy: RetryPolicy::from(config.retry.llm),
            search_policy: RetryPolicy::from(config.retry.search),
            config,
        }
    }

    /// Replace the built-in field profiles.
    pub fn with_detector(mut self, detector: FieldDetector) -> Self {
        self.detector = detector;
        self
    }

    pub fn detector(&self) -> &FieldDetector {
        &self.detector
    }

    /// Run every stage with no progress reporting and no cancellation.
    pub async fn run(&self, task: &EnhancementTask) -> Result<EnhancementResult> {
        let (_keep, shutdown) = watch::channel(false);
        self.run_with(task, &SilentProgress, &shutdown).await
    }

    /// Run every stage. `shutdown` is checked between stages; once it reads
    /// `true` the run stops with [`EnhancerError::Cancelled`].
    #[instrument(skip_all, fields(module_id = %task.module_id, task_id = %task.id))]
    pub async fn run_with(
        &self,
        task: &EnhancementTask,
        progress: &dyn ProgressReporter,
        shutdown: &watch::Receiver<bool>,
    ) -> Result<EnhancementResult> {
        let start = Instant::now();
        let field = self.detector.detect(
            &task.title,
            &task.raw_content,
            task.subject_context.as_deref(),
            task.profession_context.as_deref(),
        );
        info!(field = field.name, "enhancement started");

        let mut degraded: Vec<Stage> = Vec::new();

        // 1. Detailed content (fatal on failure)
        enter(Stage::DetailedContent, &task.module_id, progress, shutdown)?;
        let detailed = self.detailed_content(task, field).await?;
        let mut concepts = extract_key_concepts(&detailed, self.config.max_concepts);
        debug!(concepts = concepts.len(), "key concepts extracted");

        // 2. Concise content
        enter(Stage::ConciseContent, &task.module_id, progress, shutdown)?;
        let concise = match self.concise_content(task, field).await {
            Some(text) => text,
            None => {
                degraded.push(Stage::ConciseContent);
                task.raw_content.clone()
            }
        };
        let (concise_len, detailed_len) = (concise.chars().count(), detailed.chars().count());
        if concise_len >= detailed_len {
            warn!(
                concise_len,
                detailed_len, "concise content is not shorter than detailed content"
            );
        }

        // 3. Keyword linking
        enter(Stage::KeywordLinking, &task.module_id, progress, shutdown)?;
        let mut cache = LookupCache::new();
        let max_keywords = self.config.max_keywords;
        let detailed = self
            .linker
            .link_with_cache(&detailed, field, max_keywords, &mut cache)
            .await;
        let concise = self
            .linker
            .link_with_cache(&concise, field, max_keywords, &mut cache)
            .await;
        attach_links(&mut concepts, &detailed.links);
        attach_links(&mut concepts, &concise.links);

        // 4. Video enrichment
        enter(Stage::VideoEnrichment, &task.module_id, progress, shutdown)?;
        let enriched = self
            .videos
            .enrich_concepts(concepts, &task.title, &task.raw_content, field)
            .await;
        if enriched.failed > 0 {
            degraded.push(Stage::VideoEnrichment);
        }

        // 5. Diagram sanitization
        enter(Stage::DiagramSanitization, &task.module_id, progress, shutdown)?;
        let result = EnhancementResult {
            concise_content: enhancer_markdown::sanitize(&concise.text),
            detailed_content: enhancer_markdown::sanitize(&detailed.text),
            key_concepts: enriched.concepts,
            degraded_stages: degraded,
        };

        info!(
            concepts = result.key_concepts.len(),
            links = detailed.links.len() + concise.links.len(),
            degraded = result.degraded_stages.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "enhancement finished"
        );
        Ok(result)
    }

    async fn detailed_content(&self, task: &EnhancementTask, field: &FieldProfile) -> Result<String> {
        let context = self.grounding(QueryMode::Detailed, task, field).await;
        let prompt = detailed_prompt(task, field);
        let llm = &self.llm;

        let text = self
            .llm_policy
            .run("llm", || llm.generate(&prompt, context.as_deref()))
            .await
            .map_err(|e| EnhancerError::fatal(Stage::DetailedContent, e.to_string()))?;

        if text.trim().is_empty() {
            return Err(EnhancerError::fatal(
                Stage::DetailedContent,
                "model returned empty content",
            ));
        }
        Ok(text)
    }

    /// `None` means the caller should fall back to the raw content.
    async fn concise_content(&self, task: &EnhancementTask, field: &FieldProfile) -> Option<String> {
        let context = self.grounding(QueryMode::Concise, task, field).await;
        let prompt = concise_prompt(task, field, self.config.concise_max_words);
        let llm = &self.llm;

        match self
            .llm_policy
            .run("llm", || llm.generate(&prompt, context.as_deref()))
            .await
        {
            Ok(text) if !text.trim().is_empty() => Some(text),
            Ok(_) => {
                warn!("concise generation returned nothing, using raw content");
                None
            }
            Err(e) => {
                warn!(error = %e, "concise generation failed, using raw content");
                None
            }
        }
    }

    /// Search context for a generation stage. Failed queries are skipped.
    async fn grounding(
        &self,
        mode: QueryMode,
        task: &EnhancementTask,
        field: &FieldProfile,
    ) -> Option<String> {
        let queries = self
            .queries
            .build_queries(mode, &task.title, &task.raw_content, field);
        let mut seen: HashSet<String> = HashSet::new();
        let mut snippets: Vec<SearchSnippet> = Vec::new();
        let search = &self.search;

        for query in queries.iter().take(self.config.queries_per_stage) {
            match self.search_policy.run("search", || search.search(query)).await {
                Ok(found) => {
                    snippets.extend(found.into_iter().filter(|s| seen.insert(s.url.clone())))
                }
                Err(e) => warn!(%query, error = %e, "grounding search failed"),
            }
        }

        debug!(?mode, snippets = snippets.len(), "grounding collected");
        grounding_context(&snippets)
    }
}

fn enter(
    stage: Stage,
    module_id: &ModuleId,
    progress: &dyn ProgressReporter,
    shutdown: &watch::Receiver<bool>,
) -> Result<()> {
    if *shutdown.borrow() {
        info!(%stage, "shutdown requested, abandoning task");
        return Err(EnhancerError::Cancelled);
    }
    debug!(%stage, "stage started");
    progress.stage(module_id, stage);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use crate::testing::{ScriptedLlm, pipeline_with, task};

    fn raw() -> &'static str {
        "Az AWI hegesztés volfrámelektródával és védőgázzal dolgozik. A varrat minősége \
         a gázvédelemtől függ."
    }

    #[tokio::test]
    async fn full_run_links_enriches_and_sanitizes() {
        let pipeline = pipeline_with(Arc::new(ScriptedLlm::default()), false);
        let result = pipeline.run(&task("m1", raw())).await.unwrap();

        assert!(result.degraded_stages.is_empty());
        assert!(result.detailed_content.contains(
            "**[hegesztés](https://hu.wikipedia.org/wiki/Hegesztés)**"
        ));
        assert!(result.concise_content.contains("**[védőgáz](https://hu.wikipedia.org/wiki/Védőgáz)**"));

        let names: Vec<_> = result.key_concepts.iter().map(|c| c.concept.as_str()).collect();
        assert_eq!(names, vec!["Hegesztés", "Védőgáz"]);
        assert_eq!(result.key_concepts[0].wikipedia_links.len(), 1);
        assert!(result.key_concepts.iter().all(|c| !c.youtube_videos.is_empty()));
    }

    #[tokio::test]
    async fn diagrams_are_clean_after_linking() {
        let pipeline = pipeline_with(Arc::new(ScriptedLlm::default()), false);
        let result = pipeline.run(&task("m1", raw())).await.unwrap();

        let text = &result.detailed_content;
        let open = text.find("```mermaid").unwrap();
        let close = open + text[open + 3..].find("```").unwrap() + 3;
        let block = &text[open..close];
        assert!(!block.contains("]("));
        assert!(!block.contains('"'));
        assert_eq!(block.matches("graph TD").count(), 1);
    }

    #[tokio::test]
    async fn detailed_failure_is_fatal() {
        let llm = Arc::new(ScriptedLlm {
            fail_marker: Some("HIBÁS"),
            ..ScriptedLlm::default()
        });
        let err = pipeline_with(llm.clone(), false)
            .run(&task("m1", "HIBÁS modul tartalma"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EnhancerError::FatalStage {
                stage: Stage::DetailedContent,
                ..
            }
        ));
        // Non-transient failure, no retries and no concise call.
        assert_eq!(llm.prompts.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn empty_detailed_output_is_fatal() {
        let llm = Arc::new(ScriptedLlm {
            detailed: "  \n".into(),
            ..ScriptedLlm::default()
        });
        let err = pipeline_with(llm, false).run(&task("m1", raw())).await.unwrap_err();
        assert!(err.to_string().contains("detailed_content"));
    }

    #[tokio::test]
    async fn concise_failure_falls_back_to_raw() {
        let llm = Arc::new(ScriptedLlm {
            fail_concise: true,
            ..ScriptedLlm::default()
        });
        let result = pipeline_with(llm, false).run(&task("m1", raw())).await.unwrap();
        assert_eq!(result.degraded_stages, vec![Stage::ConciseContent]);
        assert!(result.concise_content.starts_with("Az AWI hegesztés"));
        assert!(!result.detailed_content.is_empty());
    }

    #[tokio::test]
    async fn search_outage_does_not_block_generation() {
        let pipeline = pipeline_with(Arc::new(ScriptedLlm::default()), true);
        let result = pipeline.run(&task("m1", raw())).await.unwrap();
        assert!(result.degraded_stages.is_empty());
        assert!(!result.key_concepts.is_empty());
    }

    #[tokio::test]
    async fn concise_is_shorter_across_fixtures() {
        let fixtures = [
            ("AWI hegesztés", raw()),
            ("Ipari robotok", "A robotkar szervomotorokkal és szenzorokkal mozog."),
            ("Kelt tészták", "Az élesztő a kelesztés során gázt termel."),
        ];
        let pipeline = pipeline_with(Arc::new(ScriptedLlm::default()), false);
        for (title, content) in fixtures {
            let mut t = task("m1", content);
            t.title = title.into();
            let result = pipeline.run(&t).await.unwrap();
            assert!(
                result.concise_content.chars().count() < result.detailed_content.chars().count(),
                "{title}"
            );
        }
    }

    #[tokio::test]
    async fn shutdown_stops_before_next_stage() {
        struct Recorder(Mutex<Vec<Stage>>);
        impl ProgressReporter for Recorder {
            fn task_started(&self, _task: &EnhancementTask) {}
            fn stage(&self, _module_id: &ModuleId, stage: Stage) {
                self.0.lock().unwrap().push(stage);
            }
            fn task_finished(&self, _outcome: &TaskOutcome) {}
        }

        let (tx, rx) = watch::channel(true);
        let recorder = Recorder(Mutex::new(Vec::new()));
        let pipeline = pipeline_with(Arc::new(ScriptedLlm::default()), false);
        let err = pipeline
            .run_with(&task("m1", raw()), &recorder, &rx)
            .await
            .unwrap_err();
        assert!(matches!(err, EnhancerError::Cancelled));
        assert!(recorder.0.lock().unwrap().is_empty());
        drop(tx);
    }

    #[tokio::test]
    async fn stages_report_in_order() {
        struct Recorder(Mutex<Vec<Stage>>);
        impl ProgressReporter for Recorder {
            fn task_started(&self, _task: &EnhancementTask) {}
            fn stage(&self, _module_id: &ModuleId, stage: Stage) {
                self.0.lock().unwrap().push(stage);
            }
            fn task_finished(&self, _outcome: &TaskOutcome) {}
        }

        let (_tx, rx) = watch::channel(false);
        let recorder = Recorder(Mutex::new(Vec::new()));
        pipeline_with(Arc::new(ScriptedLlm::default()), false)
            .run_with(&task("m1", raw()), &recorder, &rx)
            .await
            .unwrap();
        assert_eq!(
            *recorder.0.lock().unwrap(),
            vec![
                Stage::DetailedContent,
                Stage::ConciseContent,
                Stage::KeywordLinking,
                Stage::VideoEnrichment,
                Stage::DiagramSanitization,
            ]
        );
    }
}
