//! Per-concept video enrichment.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, instrument, warn};

use enhancer_shared::{KeyConcept, VideoSearch};

use crate::field::FieldProfile;
use crate::query::QueryOptimizer;
use crate::retry::RetryPolicy;

/// Categories used per module.
const MAX_CATEGORIES: usize = 3;

/// Attaches ranked videos to key concepts, one search per concept.
pub struct VideoEnricher {
    search: Arc<dyn VideoSearch>,
    policy: RetryPolicy,
    delay: Duration,
    per_concept: usize,
    max_concepts: usize,
    queries: QueryOptimizer,
}

/// Outcome of an enrichment pass.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichedConcepts {
    pub concepts: Vec<KeyConcept>,
    /// Concepts whose search failed outright.
    pub failed: usize,
}

impl VideoEnricher {
    pub fn new(
        search: Arc<dyn VideoSearch>,
        policy: RetryPolicy,
        delay: Duration,
        per_concept: usize,
        max_concepts: usize,
    ) -> Self {
        Self {
            search,
            policy,
            delay,
            per_concept,
            max_concepts,
            queries: QueryOptimizer::new(),
        }
    }

    /// 2–3 search categories: the profile's, or title terms for the general field.
    pub fn categories(&self, title: &str, content: &str, field: &FieldProfile) -> Vec<String> {
        if !field.categories.is_empty() {
            return field
                .categories
                .iter()
                .take(MAX_CATEGORIES)
                .map(|c| (*c).to_string())
                .collect();
        }
        self.queries
            .key_terms(title, content, field)
            .into_iter()
            .take(MAX_CATEGORIES)
            .collect()
    }

    fn query_for(&self, concept: &str, category: Option<&str>) -> String {
        let raw = match category {
            Some(cat) if !concept.to_lowercase().contains(&cat.to_lowercase()) => {
                format!("{concept} {cat}")
            }
            _ => concept.to_string(),
        };
        self.queries.trim(&raw).unwrap_or(raw)
    }

    /// Populate `youtube_videos` on up to `max_concepts` concepts. A failed
    /// search leaves that concept's list empty and moves on. Concepts past the
    /// cap are returned untouched.
    #[instrument(skip_all, fields(field = field.name, concepts = concepts.len()))]
    pub async fn enrich_concepts(
        &self,
        mut concepts: Vec<KeyConcept>,
        title: &str,
        content: &str,
        field: &FieldProfile,
    ) -> EnrichedConcepts {
        let categories = self.categories(title, content, field);
        let mut seen_ids: HashSet<String> = HashSet::new();
        let mut failed = 0usize;

        for (i, concept) in concepts.iter_mut().take(self.max_concepts).enumerate() {
            if i > 0 && !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }

            let category = (!categories.is_empty())
                .then(|| categories[i % categories.len()].as_str());
            let query = self.query_for(&concept.concept, category);
            let search = &self.search;

            match self.policy.run("video", || search.search(&query)).await {
                Ok(videos) => {
                    concept.youtube_videos = videos
                        .into_iter()
                        .filter(|v| seen_ids.insert(v.video_id.clone()))
                        .take(self.per_concept)
                        .collect();
                    debug!(
                        concept = %concept.concept,
                        found = concept.youtube_videos.len(),
                        "videos attached"
                    );
                }
                Err(e) => {
                    failed += 1;
                    concept.youtube_videos.clear();
                    warn!(concept = %concept.concept, %query, error = %e, "video search failed");
                }
            }
        }

        EnrichedConcepts { concepts, failed }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use enhancer_shared::{ProviderError, VideoRef};

    use crate::field::{FieldDetector, GENERAL};

    fn video(id: &str) -> VideoRef {
        VideoRef {
            title: format!("Videó {id}"),
            video_id: id.into(),
            url: format!("https://www.youtube.com/watch?v={id}"),
            description: String::new(),
        }
    }

    /// Fails for queries containing `fail_on`, otherwise returns three videos
    /// derived from the query.
    struct ScriptedVideos {
        fail_on: &'static str,
        queries: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl VideoSearch for ScriptedVideos {
        async fn search(&self, query: &str) -> Result<Vec<VideoRef>, ProviderError> {
            self.queries.lock().unwrap().push(query.to_string());
            if query.contains(self.fail_on) {
                return Err(ProviderError::QuotaExceeded);
            }
            let stem: String = query.chars().filter(char::is_ascii_alphanumeric).take(6).collect();
            Ok((0..3).map(|n| video(&format!("{stem}{n}"))).collect())
        }
    }

    fn enricher(search: Arc<ScriptedVideos>, per_concept: usize) -> VideoEnricher {
        VideoEnricher::new(
            search,
            RetryPolicy::new(2, Duration::from_millis(1), Duration::from_secs(1)),
            Duration::ZERO,
            per_concept,
            8,
        )
    }

    #[tokio::test]
    async fn isolated_failure_per_concept() {
        let search = Arc::new(ScriptedVideos {
            fail_on: "Szenzor",
            queries: Mutex::new(Vec::new()),
        });
        let concepts = vec![
            KeyConcept::new("Robotkar", "a"),
            KeyConcept::new("Szenzor", "b"),
            KeyConcept::new("Aktuator", "c"),
        ];
        let detector = FieldDetector::new();
        let out = enricher(search.clone(), 2)
            .enrich_concepts(concepts, "Ipari robotok", "", detector.profile("robotika"))
            .await;

        assert_eq!(out.concepts.len(), 3);
        assert_eq!(out.failed, 1);
        assert_eq!(out.concepts[0].youtube_videos.len(), 2);
        assert!(out.concepts[1].youtube_videos.is_empty());
        assert_eq!(out.concepts[2].youtube_videos.len(), 2);

        let queries = search.queries.lock().unwrap().clone();
        assert_eq!(queries[0], "Robotkar robotika");
        assert_eq!(queries[1], "Szenzor automatizálás");
        assert_eq!(queries[2], "Aktuator ipari robotok");
    }

    #[tokio::test]
    async fn respects_concept_cap() {
        let search = Arc::new(ScriptedVideos {
            fail_on: "\u{0}",
            queries: Mutex::new(Vec::new()),
        });
        let concepts: Vec<_> = (0..5).map(|i| KeyConcept::new(format!("Fogalom{i}"), "")).collect();
        let enricher = VideoEnricher::new(
            search.clone(),
            RetryPolicy::new(1, Duration::ZERO, Duration::from_secs(1)),
            Duration::ZERO,
            1,
            2,
        );
        let out = enricher
            .enrich_concepts(concepts, "Történelem", "", &GENERAL)
            .await;
        assert_eq!(search.queries.lock().unwrap().len(), 2);
        assert_eq!(out.concepts.len(), 5);
        assert!(out.concepts[4].youtube_videos.is_empty());
    }

    #[test]
    fn general_field_categories_come_from_title() {
        let search = Arc::new(ScriptedVideos {
            fail_on: "",
            queries: Mutex::new(Vec::new()),
        });
        let cats = enricher(search, 2).categories("A reformkor gazdasága", "", &GENERAL);
        assert_eq!(cats, vec!["reformkor", "gazdasága"]);
    }
}
