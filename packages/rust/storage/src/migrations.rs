//! SQL migration definitions for the generated-file registry.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a batch of SQL statements.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial schema: generated_files",
        sql: r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- One row per exported document
CREATE TABLE IF NOT EXISTS generated_files (
    id          TEXT PRIMARY KEY,
    source      TEXT NOT NULL,
    input       TEXT NOT NULL,
    output_path TEXT NOT NULL,
    created_at  TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_generated_files_created ON generated_files(created_at);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
