//! SQLite-backed corpus queries

use super::records::{Annotation, Chunk, CorpusStats, Document, StoredEmbedding};
use super::{CorpusStore, Database};
use crate::error::{ContractIqError, Result};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::collections::HashMap;

/// Ids per `IN (...)` query, kept below SQLite's host parameter limit
const ID_BATCH_SIZE: usize = 500;

const CHUNK_COLUMNS: &str = "chunk_id, doc_id, chunk_index, start_char, end_char, text";

/// Corpus façade over the SQLite database
#[derive(Clone)]
pub struct SqliteCorpus {
    database: Database,
}

impl SqliteCorpus {
    pub fn new(database: Database) -> Self {
        Self { database }
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    /// Insert a document unless one with the same id exists. Returns true when inserted.
    pub fn upsert_document(&self, document: &Document) -> Result<bool> {
        let conn = self.database.get_conn()?;
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO documents (doc_id, title, source, raw_path)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                document.doc_id,
                document.title,
                document.source,
                document.raw_path
            ],
        )?;
        Ok(inserted > 0)
    }

    /// Insert chunks in one transaction, ignoring ids already present.
    /// Returns the number of new rows.
    pub fn upsert_chunks(&self, chunks: &[Chunk]) -> Result<usize> {
        let mut conn = self.database.get_conn()?;
        let tx = conn.transaction()?;
        let mut inserted = 0;

        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO chunks
                 (chunk_id, doc_id, chunk_index, start_char, end_char, text)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for chunk in chunks {
                inserted += stmt.execute(params![
                    chunk.chunk_id,
                    chunk.doc_id,
                    chunk.chunk_index as i64,
                    chunk.start_char as i64,
                    chunk.end_char as i64,
                    chunk.text
                ])?;
            }
        }

        tx.commit()?;
        Ok(inserted)
    }

    pub fn get_document(&self, doc_id: &str) -> Result<Option<Document>> {
        let conn = self.database.get_conn()?;
        let document = conn
            .query_row(
                "SELECT doc_id, title, source, raw_path FROM documents WHERE doc_id = ?1",
                params![doc_id],
                document_from_row,
            )
            .optional()?;
        Ok(document)
    }

    /// Page through documents ordered by title, optionally filtered by a title substring
    pub fn list_documents(
        &self,
        limit: usize,
        offset: usize,
        title_contains: Option<&str>,
    ) -> Result<Vec<Document>> {
        let conn = self.database.get_conn()?;
        let pattern = title_contains.map(|q| format!("%{}%", q));

        let mut stmt = conn.prepare(
            "SELECT doc_id, title, source, raw_path
             FROM documents
             WHERE (?1 IS NULL OR title LIKE ?1)
             ORDER BY title
             LIMIT ?2 OFFSET ?3",
        )?;
        let documents = stmt
            .query_map(
                params![pattern, limit as i64, offset as i64],
                document_from_row,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(documents)
    }

    /// Chunks of one document in reading order
    pub fn fetch_chunks_for_doc(&self, doc_id: &str, limit: usize) -> Result<Vec<Chunk>> {
        let conn = self.database.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {CHUNK_COLUMNS} FROM chunks WHERE doc_id = ?1 ORDER BY chunk_index LIMIT ?2"
        ))?;
        let chunks = stmt
            .query_map(params![doc_id, limit as i64], chunk_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(chunks)
    }

    /// Ids of every stored chunk of one document, in reading order
    pub fn chunk_ids_for_doc(&self, doc_id: &str) -> Result<Vec<String>> {
        let conn = self.database.get_conn()?;
        let mut stmt =
            conn.prepare("SELECT chunk_id FROM chunks WHERE doc_id = ?1 ORDER BY chunk_index")?;
        let ids = stmt
            .query_map(params![doc_id], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;

        Ok(ids)
    }

    /// Chunks after `after_rowid` in storage order, with their rowids, for batch indexing
    pub fn fetch_chunk_page(&self, after_rowid: i64, limit: usize) -> Result<Vec<(i64, Chunk)>> {
        let conn = self.database.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT rowid, {CHUNK_COLUMNS} FROM chunks WHERE rowid > ?1 ORDER BY rowid LIMIT ?2"
        ))?;
        let page = stmt
            .query_map(params![after_rowid, limit as i64], |row| {
                let rowid: i64 = row.get(0)?;
                let chunk = Chunk {
                    chunk_id: row.get(1)?,
                    doc_id: row.get(2)?,
                    chunk_index: row.get::<_, i64>(3)? as usize,
                    start_char: row.get::<_, i64>(4)? as usize,
                    end_char: row.get::<_, i64>(5)? as usize,
                    text: row.get(6)?,
                };
                Ok((rowid, chunk))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(page)
    }

    /// Every document keyed by doc_id
    pub fn documents_by_id(&self) -> Result<HashMap<String, Document>> {
        let conn = self.database.get_conn()?;
        let mut stmt = conn.prepare("SELECT doc_id, title, source, raw_path FROM documents")?;
        let documents = stmt
            .query_map([], document_from_row)?
            .map(|row| row.map(|doc| (doc.doc_id.clone(), doc)))
            .collect::<rusqlite::Result<HashMap<String, Document>>>()?;

        Ok(documents)
    }

    /// Insert an annotation unless it exists. Returns true when inserted.
    pub fn upsert_annotation(&self, annotation: &Annotation) -> Result<bool> {
        let texts = serde_json::to_string(&annotation.answer_texts).map_err(|e| {
            ContractIqError::Json {
                source: e,
                context: "Failed to encode annotation answer texts".to_string(),
            }
        })?;
        let starts = serde_json::to_string(&annotation.answer_starts).map_err(|e| {
            ContractIqError::Json {
                source: e,
                context: "Failed to encode annotation answer starts".to_string(),
            }
        })?;

        let conn = self.database.get_conn()?;
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO annotations
             (annotation_id, doc_id, label, context, answer_texts_json, answer_starts_json)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                annotation.annotation_id,
                annotation.doc_id,
                annotation.label,
                annotation.context,
                texts,
                starts
            ],
        )?;
        Ok(inserted > 0)
    }

    /// Annotations of one document ordered by label
    pub fn fetch_annotations_for_doc(
        &self,
        doc_id: &str,
        label_contains: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Annotation>> {
        let conn = self.database.get_conn()?;
        let pattern = label_contains.map(|q| format!("%{}%", q));

        let mut stmt = conn.prepare(
            "SELECT annotation_id, doc_id, label, context, answer_texts_json, answer_starts_json
             FROM annotations
             WHERE doc_id = ?1 AND (?2 IS NULL OR label LIKE ?2)
             ORDER BY label
             LIMIT ?3",
        )?;
        let rows = stmt
            .query_map(params![doc_id, pattern, limit as i64], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter()
            .map(|(annotation_id, doc_id, label, context, texts, starts)| {
                let answer_texts = serde_json::from_str(&texts).map_err(|e| ContractIqError::Json {
                    source: e,
                    context: format!("Corrupt answer texts for annotation {}", annotation_id),
                })?;
                let answer_starts =
                    serde_json::from_str(&starts).map_err(|e| ContractIqError::Json {
                        source: e,
                        context: format!("Corrupt answer starts for annotation {}", annotation_id),
                    })?;
                Ok(Annotation {
                    annotation_id,
                    doc_id,
                    label,
                    context,
                    answer_texts,
                    answer_starts,
                })
            })
            .collect()
    }

    /// Cache embeddings for a batch of chunks, replacing earlier vectors of the same chunk
    pub fn save_embeddings(&self, model: &str, items: &[(&Chunk, &[f32])]) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        let mut conn = self.database.get_conn()?;
        let tx = conn.transaction()?;

        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO embeddings
                 (chunk_id, doc_id, model, dimension, vector, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for (chunk, vector) in items {
                stmt.execute(params![
                    chunk.chunk_id,
                    chunk.doc_id,
                    model,
                    vector.len() as i64,
                    encode_vector(vector),
                    now
                ])?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    /// All cached embeddings produced by `model`
    pub fn load_embeddings(&self, model: &str) -> Result<Vec<StoredEmbedding>> {
        let conn = self.database.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT chunk_id, doc_id, vector FROM embeddings WHERE model = ?1 ORDER BY rowid",
        )?;
        let embeddings = stmt
            .query_map(params![model], |row| {
                let blob: Vec<u8> = row.get(2)?;
                Ok(StoredEmbedding {
                    chunk_id: row.get(0)?,
                    doc_id: row.get(1)?,
                    vector: decode_vector(&blob),
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(embeddings)
    }

    pub fn stats(&self) -> Result<CorpusStats> {
        let conn = self.database.get_conn()?;
        let count = |table: &str| -> rusqlite::Result<usize> {
            let n: i64 =
                conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?;
            Ok(n as usize)
        };

        Ok(CorpusStats {
            documents: count("documents")?,
            chunks: count("chunks")?,
            annotations: count("annotations")?,
            embeddings: count("embeddings")?,
        })
    }
}

impl CorpusStore for SqliteCorpus {
    fn fetch_chunks_by_ids(&self, ids: &[String]) -> Result<Vec<Chunk>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let conn = self.database.get_conn()?;
        let mut chunks = Vec::with_capacity(ids.len());
        for batch in ids.chunks(ID_BATCH_SIZE) {
            let rows = query_chunks_in(&conn, batch)
                .map_err(|e| ContractIqError::StoreUnavailable(e.to_string()))?;
            chunks.extend(rows);
        }

        Ok(chunks)
    }
}

fn query_chunks_in(conn: &Connection, ids: &[String]) -> rusqlite::Result<Vec<Chunk>> {
    let placeholders = vec!["?"; ids.len()].join(", ");
    let mut stmt = conn.prepare(&format!(
        "SELECT {CHUNK_COLUMNS} FROM chunks WHERE chunk_id IN ({placeholders})"
    ))?;
    let chunks = stmt
        .query_map(params_from_iter(ids.iter()), chunk_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(chunks)
}

fn chunk_from_row(row: &Row) -> rusqlite::Result<Chunk> {
    Ok(Chunk {
        chunk_id: row.get(0)?,
        doc_id: row.get(1)?,
        chunk_index: row.get::<_, i64>(2)? as usize,
        start_char: row.get::<_, i64>(3)? as usize,
        end_char: row.get::<_, i64>(4)? as usize,
        text: row.get(5)?,
    })
}

fn document_from_row(row: &Row) -> rusqlite::Result<Document> {
    Ok(Document {
        doc_id: row.get(0)?,
        title: row.get(1)?,
        source: row.get(2)?,
        raw_path: row.get(3)?,
    })
}

fn encode_vector(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn decode_vector(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}
