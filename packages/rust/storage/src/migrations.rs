//! SQL migration definitions for the enhancer database.
//!
//! Migrations are applied in order on database open. Each migration records
//! its own version in `schema_migrations`.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            description: "Initial schema: modules with enrichment columns",
            sql: r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS modules (
    id                TEXT PRIMARY KEY,
    title             TEXT NOT NULL,
    content           TEXT NOT NULL,
    subject_name      TEXT,
    profession_name   TEXT,
    concise_content   TEXT,
    detailed_content  TEXT,
    key_concepts_json TEXT,
    enriched_hash     TEXT,
    enriched_at       TEXT,
    created_at        TEXT NOT NULL,
    updated_at        TEXT NOT NULL
);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
        },
        Migration {
            version: 2,
            description: "Enhancement run history",
            sql: r#"
CREATE TABLE IF NOT EXISTS enhancement_runs (
    task_id        TEXT PRIMARY KEY,
    module_id      TEXT NOT NULL,
    status         TEXT NOT NULL,
    error          TEXT,
    degraded_json  TEXT NOT NULL DEFAULT '[]',
    finished_at    TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_runs_module ON enhancement_runs(module_id, finished_at);

INSERT INTO schema_migrations (version) VALUES (2);
"#,
        },
        Migration {
            version: 3,
            description: "Degraded stages of the stored enrichment",
            sql: r#"
ALTER TABLE modules ADD COLUMN degraded_json TEXT NOT NULL DEFAULT '[]';

INSERT INTO schema_migrations (version) VALUES (3);
"#,
        },
    ]
}
