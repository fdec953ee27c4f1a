//! Scripted collaborators shared by the pipeline and queue tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Semaphore, mpsc};

use enhancer_shared::{
    Article, Encyclopedia, EnhancementResult, EnhancementTask, EnhancerError, LanguageModel,
    ModuleId, ModuleRecord, ModuleStore, PipelineConfig, ProviderError, Result, SearchSnippet,
    VideoRef, VideoSearch, WebSearch,
};

use crate::pipeline::EnhancementPipeline;

pub(crate) const DETAILED: &str = "\
# AWI hegesztés részletesen

A **hegesztés** során két fémet oldhatatlanul kötünk össze. A **védőgáz** óvja az
ömledéket, a **volfrámelektróda** pedig nem olvad le. Gyakorlati példa: egy
rozsdamentes cső tompavarratának elkészítése lépésről lépésre, a gázmennyiség
beállításától a varrat ellenőrzéséig.

```mermaid
graph TD graph TD
A[\"Előkészítés\"] --> B[[Hegesztés](https://hu.wikipedia.org/wiki/Hegeszt%C3%A9s)]
```

## Kulcsfogalmak

- **Hegesztés**: Fémek oldhatatlan kötése hő hatására.
- **Védőgáz**: Az ívet és az ömledéket védő inert gáz.
- **hegesztés**: Ismétlés.
";

pub(crate) const CONCISE: &str = "Az AWI **hegesztés** **védőgáz** alatt, nem leolvadó elektródával dolgozik.";

/// Marker that appears only in the detailed-content prompt.
const DETAILED_MARKER: &str = "## Kulcsfogalmak";

/// Language model answering from fixed texts. Fails the detailed prompt for
/// modules whose raw content contains `fail_marker`.
pub(crate) struct ScriptedLlm {
    pub detailed: String,
    pub concise: String,
    pub fail_marker: Option<&'static str>,
    pub fail_concise: bool,
    /// When set, each detailed call signals `entered` then waits for a permit.
    pub gate: Option<(mpsc::UnboundedSender<()>, Arc<Semaphore>)>,
    pub prompts: Mutex<Vec<String>>,
}

impl Default for ScriptedLlm {
    fn default() -> Self {
        Self {
            detailed: DETAILED.into(),
            concise: CONCISE.into(),
            fail_marker: None,
            fail_concise: false,
            gate: None,
            prompts: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl LanguageModel for ScriptedLlm {
    async fn generate(
        &self,
        prompt: &str,
        _context: Option<&str>,
    ) -> std::result::Result<String, ProviderError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        let detailed = prompt.contains(DETAILED_MARKER);

        if detailed {
            if let Some((entered, gate)) = &self.gate {
                let _ = entered.send(());
                let permit = gate.acquire().await.map_err(|_| ProviderError::Timeout)?;
                permit.forget();
            }
            if self.fail_marker.is_some_and(|m| prompt.contains(m)) {
                return Err(ProviderError::InvalidResponse("model refused".into()));
            }
            Ok(self.detailed.clone())
        } else if self.fail_concise {
            Err(ProviderError::RateLimited)
        } else {
            Ok(self.concise.clone())
        }
    }
}

pub(crate) struct StaticSearch {
    pub fail: bool,
}

#[async_trait]
impl WebSearch for StaticSearch {
    async fn search(&self, query: &str) -> std::result::Result<Vec<SearchSnippet>, ProviderError> {
        if self.fail {
            return Err(ProviderError::NoResults);
        }
        Ok(vec![SearchSnippet {
            title: format!("Találat: {query}"),
            url: format!("https://example.hu/{}", query.len()),
            snippet: "Háttér.".into(),
        }])
    }
}

/// Resolves terms from a fixed table and records every call.
pub(crate) struct TableEncyclopedia {
    table: HashMap<String, std::result::Result<Option<Article>, ProviderError>>,
    calls: Mutex<Vec<String>>,
}

impl TableEncyclopedia {
    pub fn new(
        entries: Vec<(&str, std::result::Result<Option<Article>, ProviderError>)>,
    ) -> Arc<Self> {
        Arc::new(Self {
            table: entries
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
            calls: Mutex::new(Vec::new()),
        })
    }

    /// Table where each title resolves to its Hungarian Wikipedia URL.
    pub fn articles(titles: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            table: titles
                .iter()
                .map(|t| (t.to_lowercase(), article(t)))
                .collect(),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

pub(crate) fn article(title: &str) -> std::result::Result<Option<Article>, ProviderError> {
    Ok(Some(Article {
        title: title.into(),
        url: format!("https://hu.wikipedia.org/wiki/{}", title.replace(' ', "_")),
    }))
}

#[async_trait]
impl Encyclopedia for TableEncyclopedia {
    async fn resolve(&self, term: &str) -> std::result::Result<Option<Article>, ProviderError> {
        self.calls.lock().unwrap().push(term.to_string());
        self.table
            .get(&term.to_lowercase())
            .cloned()
            .unwrap_or(Ok(None))
    }
}

/// Two videos per query, ids derived from the query text.
pub(crate) struct EchoVideos;

#[async_trait]
impl VideoSearch for EchoVideos {
    async fn search(&self, query: &str) -> std::result::Result<Vec<VideoRef>, ProviderError> {
        Ok((0..2)
            .map(|n| {
                let id = format!("{}-{n}", query.replace(' ', "_"));
                VideoRef {
                    title: format!("{query} #{n}"),
                    url: format!("https://www.youtube.com/watch?v={id}"),
                    video_id: id,
                    description: String::new(),
                }
            })
            .collect())
    }
}

/// In-memory module store. With a gate, each write signals `entered` with the
/// module id and waits for a permit before completing.
#[derive(Default)]
pub(crate) struct MemoryStore {
    pub modules: Mutex<HashMap<ModuleId, ModuleRecord>>,
    /// Module id, source content and result of every completed write.
    pub writes: Mutex<Vec<(ModuleId, String, EnhancementResult)>>,
    pub gate: Option<(mpsc::UnboundedSender<ModuleId>, Arc<Semaphore>)>,
    /// Error message returned by every write, when set.
    pub fail_writes: Option<String>,
}

impl MemoryStore {
    pub fn written_ids(&self) -> Vec<ModuleId> {
        self.writes
            .lock()
            .unwrap()
            .iter()
            .map(|(id, _, _)| id.clone())
            .collect()
    }
}

#[async_trait]
impl ModuleStore for MemoryStore {
    async fn get_module(&self, id: &ModuleId) -> Result<ModuleRecord> {
        self.modules
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| EnhancerError::ModuleNotFound(id.clone()))
    }

    async fn update_module_enrichment(
        &self,
        id: &ModuleId,
        source_content: &str,
        result: &EnhancementResult,
    ) -> Result<()> {
        if let Some((entered, gate)) = &self.gate {
            let _ = entered.send(id.clone());
            let permit = gate
                .acquire()
                .await
                .map_err(|e| EnhancerError::storage(e.to_string()))?;
            permit.forget();
        }
        if let Some(message) = &self.fail_writes {
            return Err(EnhancerError::storage(message));
        }
        self.writes
            .lock()
            .unwrap()
            .push((id.clone(), source_content.to_string(), result.clone()));
        Ok(())
    }
}

/// Config with no inter-call delays and fast retries.
pub(crate) fn fast_config() -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.lookup_delay = Duration::ZERO;
    config.video_delay = Duration::ZERO;
    for settings in [
        &mut config.retry.llm,
        &mut config.retry.search,
        &mut config.retry.encyclopedia,
        &mut config.retry.video,
    ] {
        settings.base_delay_ms = 1;
        settings.timeout_secs = 5;
    }
    config
}

pub(crate) fn pipeline_with(llm: Arc<ScriptedLlm>, search_fails: bool) -> EnhancementPipeline {
    EnhancementPipeline::new(
        llm,
        Arc::new(StaticSearch { fail: search_fails }),
        TableEncyclopedia::articles(&["Hegesztés", "Védőgáz"]),
        Arc::new(EchoVideos),
        fast_config(),
    )
}

pub(crate) fn task(id: &str, raw: &str) -> EnhancementTask {
    EnhancementTask::new(
        ModuleId::from(id),
        "AWI hegesztés",
        raw,
        Some("Fémipar".into()),
        Some("Hegesztő".into()),
    )
}
