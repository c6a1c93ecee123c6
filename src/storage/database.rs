//! SQLite database management with migrations
//!
//! Provides structured storage for documents, chunks, annotations and cached embeddings

use crate::error::{ContractIqError, Result};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;
use std::path::Path;

/// Database connection pool
pub type DbPool = Pool<SqliteConnectionManager>;

/// Pooled connection handed out by [`Database::get_conn`]
pub type DbConn = r2d2::PooledConnection<SqliteConnectionManager>;

/// Database manager with migration support
#[derive(Clone)]
pub struct Database {
    pool: DbPool,
}

impl Database {
    /// Open (or create) the database file and bring the schema up to date
    pub fn new(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ContractIqError::Io {
                source: e,
                context: format!("Failed to create database directory: {:?}", parent),
            })?;
        }

        // Pragmas are per-connection, so every pooled connection gets them
        let manager = SqliteConnectionManager::file(db_path).with_init(|conn| {
            conn.execute_batch(
                "
                PRAGMA journal_mode = WAL;
                PRAGMA synchronous = NORMAL;
                PRAGMA foreign_keys = ON;
                PRAGMA busy_timeout = 5000;
                ",
            )
        });

        let pool = Pool::builder().max_size(16).build(manager).map_err(|e| {
            ContractIqError::StoreUnavailable(format!("Failed to create connection pool: {}", e))
        })?;

        let db = Self { pool };
        db.migrate()?;

        Ok(db)
    }

    /// Get a connection from the pool
    pub fn get_conn(&self) -> Result<DbConn> {
        self.pool.get().map_err(|e| {
            ContractIqError::StoreUnavailable(format!("Failed to get connection: {}", e))
        })
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.get_conn()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            )",
            [],
        )?;

        let current_version: i32 = conn.query_row(
            "SELECT COALESCE(MAX(version), 0) FROM _migrations",
            [],
            |row| row.get(0),
        )?;

        for (version, migration) in MIGRATIONS.iter().enumerate() {
            let version = version as i32 + 1;

            if version > current_version {
                tracing::info!("Applying migration {}", version);

                conn.execute_batch(migration)?;
                conn.execute(
                    "INSERT INTO _migrations (version, applied_at) VALUES (?1, datetime('now'))",
                    params![version],
                )?;
            }
        }

        Ok(())
    }
}

/// Database migrations (each string is one migration)
const MIGRATIONS: &[&str] = &[
    // Migration 1: Initial schema
    r#"
    -- Contracts, keyed by the digest of their title
    CREATE TABLE documents (
        doc_id TEXT PRIMARY KEY,
        title TEXT NOT NULL,
        source TEXT NOT NULL,
        raw_path TEXT,
        created_at TEXT DEFAULT CURRENT_TIMESTAMP
    );

    CREATE INDEX idx_documents_title ON documents(title);

    -- Overlapping character windows of each contract
    CREATE TABLE chunks (
        chunk_id TEXT PRIMARY KEY,
        doc_id TEXT NOT NULL,
        chunk_index INTEGER NOT NULL,
        start_char INTEGER NOT NULL,
        end_char INTEGER NOT NULL,
        text TEXT NOT NULL,
        FOREIGN KEY (doc_id) REFERENCES documents(doc_id)
    );

    CREATE INDEX idx_chunks_doc_id ON chunks(doc_id);

    -- CUAD clause annotations (answer texts/starts stored as JSON arrays)
    CREATE TABLE annotations (
        annotation_id TEXT PRIMARY KEY,
        doc_id TEXT NOT NULL,
        label TEXT NOT NULL,
        context TEXT,
        answer_texts_json TEXT NOT NULL,
        answer_starts_json TEXT NOT NULL,
        FOREIGN KEY (doc_id) REFERENCES documents(doc_id)
    );

    CREATE INDEX idx_ann_doc_id ON annotations(doc_id);
    CREATE INDEX idx_ann_label ON annotations(label);

    -- Cached chunk embeddings (little-endian f32 blobs)
    CREATE TABLE embeddings (
        chunk_id TEXT PRIMARY KEY,
        doc_id TEXT NOT NULL,
        model TEXT NOT NULL,
        dimension INTEGER NOT NULL,
        vector BLOB NOT NULL,
        created_at INTEGER NOT NULL,
        FOREIGN KEY (chunk_id) REFERENCES chunks(chunk_id) ON DELETE CASCADE
    );

    CREATE INDEX idx_embeddings_model ON embeddings(model);
    "#,
];
