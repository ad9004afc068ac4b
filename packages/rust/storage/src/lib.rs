//! libSQL-backed registry of generated documents.
//!
//! Every successful run can be recorded with a random identifier so exported
//! files can be listed and looked up later. All writers go through one
//! database file, so concurrent runs never clobber each other's entries.

mod migrations;

use std::path::Path;

use chrono::{DateTime, Utc};
use libsql::{Connection, Database, Row, params};

use autoblog_shared::{AutoblogError, GeneratedFile, Result, RunId, SourceType};

/// Handle to the registry database.
pub struct Registry {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
}

fn storage_err(e: impl std::fmt::Display) -> AutoblogError {
    AutoblogError::Storage(e.to_string())
}

impl Registry {
    /// Open or create a registry at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| AutoblogError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(storage_err)?;
        let conn = db.connect().map_err(storage_err)?;

        let registry = Self {
            db,
            conn,
            readonly: false,
        };
        registry.run_migrations().await?;
        Ok(registry)
    }

    /// Open an existing registry for listing only.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(AutoblogError::Storage(format!(
                "no registry at {}",
                path.display()
            )));
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(storage_err)?;
        let conn = db.connect().map_err(storage_err)?;

        Ok(Self {
            db,
            conn,
            readonly: true,
        })
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        AutoblogError::Storage(format!(
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
            Err(_) => 0, // table doesn't exist yet
        }
    }

    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(AutoblogError::Storage(
                "registry is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Generated files
    // -----------------------------------------------------------------------

    /// Record an exported document.
    pub async fn record(&self, file: &GeneratedFile) -> Result<()> {
        self.check_writable()?;
        self.conn
            .execute(
                "INSERT INTO generated_files (id, source, input, output_path, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    file.id.to_string(),
                    file.source.as_str(),
                    file.input.as_str(),
                    file.output_path.as_str(),
                    file.created_at.to_rfc3339()
                ],
            )
            .await
            .map_err(storage_err)?;
        tracing::debug!(id = %file.id, "recorded generated file");
        Ok(())
    }

    /// Look up one record by ID.
    pub async fn get(&self, id: &RunId) -> Result<Option<GeneratedFile>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, source, input, output_path, created_at
                 FROM generated_files WHERE id = ?1",
                params![id.to_string()],
            )
            .await
            .map_err(storage_err)?;

        match rows.next().await.map_err(storage_err)? {
            Some(row) => Ok(Some(row_to_file(&row)?)),
            None => Ok(None),
        }
    }

    /// List records, newest first.
    pub async fn list(&self, limit: u32) -> Result<Vec<GeneratedFile>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, source, input, output_path, created_at
                 FROM generated_files ORDER BY created_at DESC, id DESC LIMIT ?1",
                params![i64::from(limit)],
            )
            .await
            .map_err(storage_err)?;

        let mut files = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            files.push(row_to_file(&row)?);
        }
        Ok(files)
    }
}

fn row_to_file(row: &Row) -> Result<GeneratedFile> {
    let id: String = row.get(0).map_err(storage_err)?;
    let source: String = row.get(1).map_err(storage_err)?;
    let created_at: String = row.get(4).map_err(storage_err)?;

    Ok(GeneratedFile {
        id: id
            .parse()
            .map_err(|e| AutoblogError::Storage(format!("bad id '{id}': {e}")))?,
        source: source.parse::<SourceType>().map_err(AutoblogError::Storage)?,
        input: row.get(2).map_err(storage_err)?,
        output_path: row.get(3).map_err(storage_err)?,
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .map_err(|e| AutoblogError::Storage(format!("bad timestamp '{created_at}': {e}")))?
            .with_timezone(&Utc),
    })
}
