//! libSQL storage for modules and their enrichment.
//!
//! The [`Storage`] struct wraps a local libSQL database holding module raw
//! fields, the enrichment written back by the pipeline, and a history of
//! enhancement runs. It implements [`ModuleStore`] so the task queue can read
//! and write through it.
//!
//! Enrichment writes overwrite the previous values, so re-running a module is
//! always safe.

mod migrations;

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database, params};
use sha2::{Digest, Sha256};
use tracing::{debug, info};
use uuid::Uuid;

use enhancer_shared::{
    EnhancementResult, EnhancerError, KeyConcept, ModuleId, ModuleRecord, ModuleStore, Result,
    Stage, TaskId, TaskOutcome, TaskStatus,
};

/// SHA-256 of module content, hex encoded.
pub fn content_hash(content: &str) -> String {
    let digest = Sha256::digest(content.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| EnhancerError::storage(format!("invalid date '{s}': {e}")))
}

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// One line of `module list`.
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleSummary {
    pub id: ModuleId,
    pub title: String,
    pub subject_name: Option<String>,
    pub profession_name: Option<String>,
    pub enriched_at: Option<DateTime<Utc>>,
    /// Enriched, but the raw content changed afterwards.
    pub stale: bool,
}

/// Enrichment currently stored for a module.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredEnrichment {
    pub result: EnhancementResult,
    /// Hash of the raw content the enrichment was produced from.
    pub enriched_hash: String,
    pub enriched_at: DateTime<Utc>,
}

impl StoredEnrichment {
    /// Whether this enrichment was produced from `content`.
    pub fn is_current(&self, content: &str) -> bool {
        self.enriched_hash == content_hash(content)
    }
}

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| EnhancerError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(EnhancerError::storage)?;
        let conn = db.connect().map_err(EnhancerError::storage)?;

        let storage = Self {
            db,
            conn,
            readonly: false,
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open an existing database without write access.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(EnhancerError::storage)?;
        let conn = db.connect().map_err(EnhancerError::storage)?;

        Ok(Self {
            db,
            conn,
            readonly: true,
        })
    }

    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        EnhancerError::storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Current schema version, or 0 before the first migration.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => match rows.next().await {
                Ok(Some(row)) => row.get::<u32>(0).unwrap_or(0),
                _ => 0,
            },
            Err(_) => 0,
        }
    }

    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(EnhancerError::storage("database is opened in read-only mode"));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Modules
    // -----------------------------------------------------------------------

    /// Insert a module or replace its raw fields. Stored enrichment is kept
    /// and becomes stale if the content changed.
    pub async fn upsert_module(&self, module: &ModuleRecord) -> Result<()> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO modules (id, title, content, subject_name, profession_name, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(id) DO UPDATE SET
                   title = excluded.title,
                   content = excluded.content,
                   subject_name = excluded.subject_name,
                   profession_name = excluded.profession_name,
                   updated_at = excluded.updated_at",
                params![
                    module.id.as_str(),
                    module.title.as_str(),
                    module.content.as_str(),
                    module.subject_name.as_deref(),
                    module.profession_name.as_deref(),
                    now.as_str(),
                    now.as_str(),
                ],
            )
            .await
            .map_err(EnhancerError::storage)?;
        debug!(module_id = %module.id, "module upserted");
        Ok(())
    }

    /// Raw fields of a module, or `None` if unknown.
    pub async fn find_module(&self, id: &ModuleId) -> Result<Option<ModuleRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, title, content, subject_name, profession_name
                 FROM modules WHERE id = ?1",
                params![id.as_str()],
            )
            .await
            .map_err(EnhancerError::storage)?;

        match rows.next().await.map_err(EnhancerError::storage)? {
            Some(row) => Ok(Some(ModuleRecord {
                id: ModuleId(row.get::<String>(0).map_err(EnhancerError::storage)?),
                title: row.get::<String>(1).map_err(EnhancerError::storage)?,
                content: row.get::<String>(2).map_err(EnhancerError::storage)?,
                subject_name: row.get::<String>(3).ok(),
                profession_name: row.get::<String>(4).ok(),
            })),
            None => Ok(None),
        }
    }

    /// All modules ordered by title.
    pub async fn list_modules(&self) -> Result<Vec<ModuleSummary>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, title, subject_name, profession_name, enriched_at, enriched_hash, content
                 FROM modules ORDER BY title, id",
                params![],
            )
            .await
            .map_err(EnhancerError::storage)?;

        let mut modules = Vec::new();
        while let Some(row) = rows.next().await.map_err(EnhancerError::storage)? {
            let enriched_at = match row.get::<String>(4).ok() {
                Some(s) => Some(parse_timestamp(&s)?),
                None => None,
            };
            let enriched_hash = row.get::<String>(5).ok();
            let content = row.get::<String>(6).map_err(EnhancerError::storage)?;
            let stale = enriched_hash.is_some_and(|h| h != content_hash(&content));

            modules.push(ModuleSummary {
                id: ModuleId(row.get::<String>(0).map_err(EnhancerError::storage)?),
                title: row.get::<String>(1).map_err(EnhancerError::storage)?,
                subject_name: row.get::<String>(2).ok(),
                profession_name: row.get::<String>(3).ok(),
                enriched_at,
                stale,
            });
        }
        Ok(modules)
    }

    // -----------------------------------------------------------------------
    // Enrichment
    // -----------------------------------------------------------------------

    /// Overwrite the enrichment columns of an existing module. The stored
    /// hash is taken from `source_content`, so an enrichment of content that
    /// has since been replaced is reported as stale.
    pub async fn save_enrichment(
        &self,
        id: &ModuleId,
        source_content: &str,
        result: &EnhancementResult,
    ) -> Result<()> {
        self.check_writable()?;

        let concepts_json = serde_json::to_string(&result.key_concepts)
            .map_err(|e| EnhancerError::storage(format!("serialize key concepts: {e}")))?;
        let degraded_json = serde_json::to_string(&result.degraded_stages)
            .map_err(|e| EnhancerError::storage(format!("serialize stages: {e}")))?;
        let hash = content_hash(source_content);
        let now = Utc::now().to_rfc3339();

        let updated = self
            .conn
            .execute(
                "UPDATE modules SET
                   concise_content = ?2,
                   detailed_content = ?3,
                   key_concepts_json = ?4,
                   degraded_json = ?5,
                   enriched_hash = ?6,
                   enriched_at = ?7,
                   updated_at = ?7
                 WHERE id = ?1",
                params![
                    id.as_str(),
                    result.concise_content.as_str(),
                    result.detailed_content.as_str(),
                    concepts_json.as_str(),
                    degraded_json.as_str(),
                    hash.as_str(),
                    now.as_str(),
                ],
            )
            .await
            .map_err(EnhancerError::storage)?;
        if updated == 0 {
            return Err(EnhancerError::ModuleNotFound(id.clone()));
        }

        info!(
            module_id = %id,
            concepts = result.key_concepts.len(),
            "enrichment saved"
        );
        Ok(())
    }

    /// Stored enrichment, or `None` if the module was never enriched.
    pub async fn get_enrichment(&self, id: &ModuleId) -> Result<Option<StoredEnrichment>> {
        let mut rows = self
            .conn
            .query(
                "SELECT concise_content, detailed_content, key_concepts_json, enriched_hash, enriched_at,
                        degraded_json
                 FROM modules WHERE id = ?1 AND enriched_at IS NOT NULL",
                params![id.as_str()],
            )
            .await
            .map_err(EnhancerError::storage)?;

        let Some(row) = rows.next().await.map_err(EnhancerError::storage)? else {
            return Ok(None);
        };

        let concepts_json = row.get::<String>(2).unwrap_or_else(|_| "[]".into());
        let key_concepts: Vec<KeyConcept> = serde_json::from_str(&concepts_json)
            .map_err(|e| EnhancerError::storage(format!("corrupt key concepts for {id}: {e}")))?;
        let enriched_at: String = row.get(4).map_err(EnhancerError::storage)?;
        let degraded_json = row.get::<String>(5).unwrap_or_else(|_| "[]".into());
        let degraded_stages: Vec<Stage> = serde_json::from_str(&degraded_json)
            .map_err(|e| EnhancerError::storage(format!("corrupt stage list for {id}: {e}")))?;

        Ok(Some(StoredEnrichment {
            result: EnhancementResult {
                concise_content: row.get::<String>(0).unwrap_or_default(),
                detailed_content: row.get::<String>(1).unwrap_or_default(),
                key_concepts,
                degraded_stages,
            },
            enriched_hash: row.get::<String>(3).unwrap_or_default(),
            enriched_at: parse_timestamp(&enriched_at)?,
        }))
    }

    // -----------------------------------------------------------------------
    // Run history
    // -----------------------------------------------------------------------

    /// Persist a finished task. Re-recording the same task overwrites it.
    pub async fn record_outcome(&self, outcome: &TaskOutcome) -> Result<()> {
        self.check_writable()?;
        let task_id = outcome.task_id.to_string();
        let degraded = serde_json::to_string(&outcome.degraded_stages)
            .map_err(|e| EnhancerError::storage(format!("serialize stages: {e}")))?;
        self.conn
            .execute(
                "INSERT INTO enhancement_runs (task_id, module_id, status, error, degraded_json, finished_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(task_id) DO UPDATE SET
                   status = excluded.status,
                   error = excluded.error,
                   degraded_json = excluded.degraded_json,
                   finished_at = excluded.finished_at",
                params![
                    task_id.as_str(),
                    outcome.module_id.as_str(),
                    outcome.status.as_str(),
                    outcome.error.as_deref(),
                    degraded.as_str(),
                    outcome.finished_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(EnhancerError::storage)?;
        Ok(())
    }

    /// Most recent runs for a module, newest first.
    pub async fn recent_runs(&self, id: &ModuleId, limit: u32) -> Result<Vec<TaskOutcome>> {
        let mut rows = self
            .conn
            .query(
                "SELECT task_id, module_id, status, error, degraded_json, finished_at
                 FROM enhancement_runs WHERE module_id = ?1
                 ORDER BY finished_at DESC LIMIT ?2",
                params![id.as_str(), i64::from(limit)],
            )
            .await
            .map_err(EnhancerError::storage)?;

        let mut runs = Vec::new();
        while let Some(row) = rows.next().await.map_err(EnhancerError::storage)? {
            runs.push(row_to_outcome(&row)?);
        }
        Ok(runs)
    }
}

fn row_to_outcome(row: &libsql::Row) -> Result<TaskOutcome> {
    let task_id: String = row.get(0).map_err(EnhancerError::storage)?;
    let status: String = row.get(2).map_err(EnhancerError::storage)?;
    let degraded: String = row.get(4).map_err(EnhancerError::storage)?;
    let finished_at: String = row.get(5).map_err(EnhancerError::storage)?;

    let degraded_stages: Vec<Stage> = serde_json::from_str(&degraded)
        .map_err(|e| EnhancerError::storage(format!("corrupt stage list: {e}")))?;

    Ok(TaskOutcome {
        task_id: TaskId(
            Uuid::parse_str(&task_id)
                .map_err(|e| EnhancerError::storage(format!("invalid task id: {e}")))?,
        ),
        module_id: ModuleId(row.get::<String>(1).map_err(EnhancerError::storage)?),
        status: status.parse::<TaskStatus>().map_err(EnhancerError::storage)?,
        error: row.get::<String>(3).ok(),
        degraded_stages,
        finished_at: parse_timestamp(&finished_at)?,
    })
}

#[async_trait]
impl ModuleStore for Storage {
    async fn get_module(&self, id: &ModuleId) -> Result<ModuleRecord> {
        self.find_module(id)
            .await?
            .ok_or_else(|| EnhancerError::ModuleNotFound(id.clone()))
    }

    async fn update_module_enrichment(
        &self,
        id: &ModuleId,
        source_content: &str,
        result: &EnhancementResult,
    ) -> Result<()> {
        self.save_enrichment(id, source_content, result).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use enhancer_shared::{VideoRef, WikiLink};

    /// Create a temp file storage for testing.
    async fn test_storage() -> Storage {
        let tmp = std::env::temp_dir().join(format!("enhancer_test_{}.db", Uuid::now_v7()));
        Storage::open(&tmp).await.expect("open test db")
    }

    fn module(id: &str, content: &str) -> ModuleRecord {
        ModuleRecord {
            id: ModuleId::from(id),
            title: format!("Modul {id}"),
            content: content.into(),
            subject_name: Some("Fémipar".into()),
            profession_name: None,
        }
    }

    fn result() -> EnhancementResult {
        let mut concept = KeyConcept::new("Hegesztés", "Fémek oldhatatlan kötése.");
        concept.wikipedia_links.push(WikiLink {
            text: "hegesztés".into(),
            url: "https://hu.wikipedia.org/wiki/Hegesztés".into(),
            description: "Wikipédia: Hegesztés".into(),
        });
        concept.youtube_videos.push(VideoRef {
            title: "AWI".into(),
            video_id: "abc".into(),
            url: "https://www.youtube.com/watch?v=abc".into(),
            description: String::new(),
        });
        EnhancementResult {
            concise_content: "Rövid.".into(),
            detailed_content: "Hosszú és részletes.".into(),
            key_concepts: vec![concept],
            degraded_stages: Vec::new(),
        }
    }

    #[tokio::test]
    async fn open_and_migrate() {
        let storage = test_storage().await;
        assert_eq!(storage.get_schema_version().await, 3);
    }

    #[tokio::test]
    async fn idempotent_migration() {
        let tmp = std::env::temp_dir().join(format!("enhancer_test_{}.db", Uuid::now_v7()));
        let first = Storage::open(&tmp).await.unwrap();
        drop(first);
        let second = Storage::open(&tmp).await.unwrap();
        assert_eq!(second.get_schema_version().await, 3);
    }

    #[tokio::test]
    async fn module_upsert_and_find() {
        let storage = test_storage().await;
        storage.upsert_module(&module("m1", "eredeti")).await.unwrap();

        let found = storage.find_module(&"m1".into()).await.unwrap().unwrap();
        assert_eq!(found.content, "eredeti");
        assert_eq!(found.subject_name.as_deref(), Some("Fémipar"));
        assert_eq!(found.profession_name, None);

        storage.upsert_module(&module("m1", "új")).await.unwrap();
        let found = storage.find_module(&"m1".into()).await.unwrap().unwrap();
        assert_eq!(found.content, "új");

        assert!(storage.find_module(&"nincs".into()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn enrichment_round_trip_and_staleness() {
        let storage = test_storage().await;
        let id = ModuleId::from("m1");
        storage.upsert_module(&module("m1", "eredeti")).await.unwrap();
        assert!(storage.get_enrichment(&id).await.unwrap().is_none());

        storage
            .save_enrichment(&id, "eredeti", &result())
            .await
            .unwrap();
        let stored = storage.get_enrichment(&id).await.unwrap().unwrap();
        assert_eq!(stored.result, result());
        assert!(stored.is_current("eredeti"));

        let listed = storage.list_modules().await.unwrap();
        assert!(listed[0].enriched_at.is_some());
        assert!(!listed[0].stale);

        storage.upsert_module(&module("m1", "módosított")).await.unwrap();
        let listed = storage.list_modules().await.unwrap();
        assert!(listed[0].stale);
        // Previous enrichment survives a raw-content update
        assert!(storage.get_enrichment(&id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn enrichment_of_replaced_content_is_stale() {
        let storage = test_storage().await;
        let id = ModuleId::from("m1");
        storage.upsert_module(&module("m1", "régi")).await.unwrap();
        // Re-import lands while the task for "régi" is still running
        storage.upsert_module(&module("m1", "új")).await.unwrap();
        storage.save_enrichment(&id, "régi", &result()).await.unwrap();

        let stored = storage.get_enrichment(&id).await.unwrap().unwrap();
        assert!(stored.is_current("régi"));
        assert!(!stored.is_current("új"));
        assert!(storage.list_modules().await.unwrap()[0].stale);
    }

    #[tokio::test]
    async fn degraded_stages_are_stored() {
        let storage = test_storage().await;
        let id = ModuleId::from("m1");
        storage.upsert_module(&module("m1", "x")).await.unwrap();
        let mut degraded = result();
        degraded.degraded_stages = vec![Stage::ConciseContent, Stage::VideoEnrichment];
        storage.save_enrichment(&id, "x", &degraded).await.unwrap();

        let stored = storage.get_enrichment(&id).await.unwrap().unwrap();
        assert_eq!(
            stored.result.degraded_stages,
            vec![Stage::ConciseContent, Stage::VideoEnrichment]
        );

        // A clean re-run clears the record
        storage.save_enrichment(&id, "x", &result()).await.unwrap();
        let stored = storage.get_enrichment(&id).await.unwrap().unwrap();
        assert!(stored.result.degraded_stages.is_empty());
    }

    #[tokio::test]
    async fn enrichment_for_unknown_module_fails() {
        let storage = test_storage().await;
        let err = storage
            .save_enrichment(&"nincs".into(), "x", &result())
            .await
            .unwrap_err();
        assert!(matches!(err, EnhancerError::ModuleNotFound(_)));
    }

    #[tokio::test]
    async fn module_store_trait() {
        let storage: Arc<dyn ModuleStore> = Arc::new(test_storage().await);
        let err = storage.get_module(&"m1".into()).await.unwrap_err();
        assert!(matches!(err, EnhancerError::ModuleNotFound(_)));

        // Second write overwrites the first
        let concrete = test_storage().await;
        concrete.upsert_module(&module("m2", "x")).await.unwrap();
        let store: &dyn ModuleStore = &concrete;
        store
            .update_module_enrichment(&"m2".into(), "x", &result())
            .await
            .unwrap();
        let mut second = result();
        second.concise_content = "Másik.".into();
        store
            .update_module_enrichment(&"m2".into(), "x", &second)
            .await
            .unwrap();
        let stored = concrete.get_enrichment(&"m2".into()).await.unwrap().unwrap();
        assert_eq!(stored.result.concise_content, "Másik.");
    }

    #[tokio::test]
    async fn list_orders_by_title() {
        let storage = test_storage().await;
        storage.upsert_module(&module("b", "x")).await.unwrap();
        storage.upsert_module(&module("a", "y")).await.unwrap();
        let ids: Vec<String> = storage
            .list_modules()
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.id.0)
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn run_history() {
        let storage = test_storage().await;
        let id = ModuleId::from("m1");
        let older = TaskOutcome {
            task_id: TaskId::new(),
            module_id: id.clone(),
            status: TaskStatus::Failed,
            error: Some("detailed_content stage failed: timeout".into()),
            degraded_stages: Vec::new(),
            finished_at: Utc::now() - chrono::Duration::minutes(5),
        };
        let newer = TaskOutcome {
            task_id: TaskId::new(),
            module_id: id.clone(),
            status: TaskStatus::Succeeded,
            error: None,
            degraded_stages: vec![Stage::VideoEnrichment],
            finished_at: Utc::now(),
        };
        storage.record_outcome(&older).await.unwrap();
        storage.record_outcome(&newer).await.unwrap();

        let runs = storage.recent_runs(&id, 10).await.unwrap();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].status, TaskStatus::Succeeded);
        assert_eq!(runs[0].degraded_stages, vec![Stage::VideoEnrichment]);
        assert_eq!(runs[1].error.as_deref(), older.error.as_deref());
    }

    #[test]
    fn hash_is_hex_sha256() {
        let h = content_hash("abc");
        assert_eq!(
            h,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[tokio::test]
    async fn readonly_rejects_writes() {
        let tmp = std::env::temp_dir().join(format!("enhancer_test_{}.db", Uuid::now_v7()));
        let rw = Storage::open(&tmp).await.unwrap();
        rw.upsert_module(&module("m1", "x")).await.unwrap();
        drop(rw);

        let ro = Storage::open_readonly(&tmp).await.unwrap();
        assert!(ro.find_module(&"m1".into()).await.unwrap().is_some());
        let result = ro.upsert_module(&module("m2", "y")).await;
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("read-only"));
    }
}
