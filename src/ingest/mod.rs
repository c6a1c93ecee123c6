//! Corpus ingestion
//!
//! Contract text files become one document row and a sequence of chunk rows each. Ids
//! are content-addressed so ingesting the same file again inserts nothing new.

pub mod chunker;
pub mod cuad;
pub mod ids;

pub use chunker::{ChunkSpan, Chunker};
pub use cuad::{import_annotations, AnnotationImportReport};
pub use ids::{annotation_id, chunk_id, document_id};

use crate::error::{ContractIqError, Result};
use crate::storage::{Chunk, Document, SqliteCorpus};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Source tag stored on documents from the CUAD release
pub const DEFAULT_SOURCE: &str = "cuad-v1";

/// Outcome of ingesting one document
#[derive(Debug, Clone)]
pub struct IngestOutcome {
    pub doc_id: String,
    pub document_inserted: bool,
    pub chunks: usize,
    pub chunks_inserted: usize,
    /// The title was already stored with different chunks; nothing was written
    pub conflicting: bool,
}

/// Totals for a directory ingestion
#[derive(Debug, Clone, Default)]
pub struct IngestReport {
    pub files: usize,
    pub documents_inserted: usize,
    pub chunks_total: usize,
    pub chunks_inserted: usize,
    pub files_failed: usize,
    /// Files skipped because another file has the same title
    pub duplicate_titles: usize,
    /// Files whose title is stored with different text
    pub conflicting: usize,
}

pub struct Ingestor {
    corpus: SqliteCorpus,
    chunker: Chunker,
    source: String,
}

impl Ingestor {
    pub fn new(corpus: SqliteCorpus, chunker: Chunker, source: impl Into<String>) -> Self {
        Self {
            corpus,
            chunker,
            source: source.into(),
        }
    }

    /// Store a document and its chunks
    ///
    /// A title that is already stored keeps its chunks. When the new text would produce a
    /// different chunk set the call writes nothing and reports a conflict.
    pub fn ingest_text(
        &self,
        title: &str,
        text: &str,
        raw_path: Option<&Path>,
    ) -> Result<IngestOutcome> {
        if title.trim().is_empty() {
            return Err(ContractIqError::InvalidArgument(
                "document title must not be empty".to_string(),
            ));
        }

        let doc_id = document_id(title);
        let document = Document {
            doc_id: doc_id.clone(),
            title: title.to_string(),
            source: self.source.clone(),
            raw_path: raw_path.map(|p| p.display().to_string()),
        };
        let document_inserted = self.corpus.upsert_document(&document)?;

        let chunks: Vec<Chunk> = self
            .chunker
            .chunk(text)
            .into_iter()
            .map(|span| Chunk {
                chunk_id: chunk_id(&doc_id, span.chunk_index, span.start_char, span.end_char),
                doc_id: doc_id.clone(),
                chunk_index: span.chunk_index,
                start_char: span.start_char,
                end_char: span.end_char,
                text: span.text,
            })
            .collect();

        if !document_inserted {
            let mut stored = self.corpus.chunk_ids_for_doc(&doc_id)?;
            let mut incoming: Vec<String> = chunks.iter().map(|c| c.chunk_id.clone()).collect();
            stored.sort();
            incoming.sort();
            if !stored.is_empty() && stored != incoming {
                warn!(
                    "{} ({}) is already stored with different text or chunking, skipping",
                    title, doc_id
                );
                return Ok(IngestOutcome {
                    doc_id,
                    document_inserted,
                    chunks: chunks.len(),
                    chunks_inserted: 0,
                    conflicting: true,
                });
            }
        }

        let chunks_inserted = self.corpus.upsert_chunks(&chunks)?;

        debug!(
            "Ingested {} ({}): {} chunks, {} new",
            title,
            doc_id,
            chunks.len(),
            chunks_inserted
        );

        Ok(IngestOutcome {
            doc_id,
            document_inserted,
            chunks: chunks.len(),
            chunks_inserted,
            conflicting: false,
        })
    }

    /// Ingest one file. The title is the file name without extension.
    pub fn ingest_file(&self, path: &Path) -> Result<IngestOutcome> {
        let title = file_title(path).ok_or_else(|| {
            ContractIqError::InvalidArgument(format!("No file name in {}", path.display()))
        })?;

        let bytes = std::fs::read(path).map_err(|e| ContractIqError::Io {
            source: e,
            context: format!("Failed to read {}", path.display()),
        })?;
        let text = decode_ignoring_invalid(&bytes);

        self.ingest_text(&title, &text, Some(path))
    }

    /// Ingest every `.txt` file under `root`, in path order.
    ///
    /// Titles are unique: when several files share a stem the last path wins. Unreadable
    /// files are logged and counted. Store failures abort.
    pub fn ingest_directory(&self, root: &Path) -> Result<IngestReport> {
        if !root.is_dir() {
            return Err(ContractIqError::InvalidArgument(format!(
                "{} is not a directory",
                root.display()
            )));
        }

        let files = find_text_files(root);
        let titled = unique_titles(&files);
        info!("Ingesting {} text files from {}", titled.len(), root.display());

        let mut report = IngestReport {
            duplicate_titles: files.len() - titled.len(),
            ..Default::default()
        };
        for path in &titled {
            report.files += 1;
            match self.ingest_file(path) {
                Ok(outcome) => {
                    if outcome.document_inserted {
                        report.documents_inserted += 1;
                    }
                    if outcome.conflicting {
                        report.conflicting += 1;
                    }
                    report.chunks_total += outcome.chunks;
                    report.chunks_inserted += outcome.chunks_inserted;
                }
                Err(ContractIqError::Io { source, context }) => {
                    warn!("{}: {}", context, source);
                    report.files_failed += 1;
                }
                Err(e) => return Err(e),
            }
        }

        info!(
            "Ingestion complete: {} files, {} new documents, {} new chunks ({} total), {} failed",
            report.files,
            report.documents_inserted,
            report.chunks_inserted,
            report.chunks_total,
            report.files_failed
        );

        Ok(report)
    }
}

/// All `.txt` files below `root`, sorted
fn find_text_files(root: &Path) -> Vec<PathBuf> {
    let mut txt_files = Vec::new();

    for entry in WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
        let path = entry.path();
        if path.is_file() && path.extension().map(|ext| ext == "txt").unwrap_or(false) {
            txt_files.push(path.to_path_buf());
        }
    }

    txt_files.sort();
    txt_files
}

fn file_title(path: &Path) -> Option<String> {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
}

/// One path per title, keeping the last of `files` for each, in path order
fn unique_titles(files: &[PathBuf]) -> Vec<PathBuf> {
    let mut by_title: HashMap<String, &PathBuf> = HashMap::new();
    for path in files {
        let Some(title) = file_title(path) else {
            continue;
        };
        if let Some(previous) = by_title.insert(title.clone(), path) {
            warn!(
                "Title '{}' appears more than once: using {}, skipping {}",
                title,
                path.display(),
                previous.display()
            );
        }
    }

    let mut unique: Vec<PathBuf> = by_title.into_values().cloned().collect();
    unique.sort();
    unique
}

/// UTF-8 decode that skips invalid byte sequences instead of replacing them
fn decode_ignoring_invalid(bytes: &[u8]) -> String {
    let mut text = String::with_capacity(bytes.len());
    for chunk in bytes.utf8_chunks() {
        text.push_str(chunk.valid());
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Database;
    use tempfile::TempDir;

    fn ingestor(temp: &TempDir) -> Ingestor {
        let corpus = SqliteCorpus::new(Database::new(&temp.path().join("corpus.db")).unwrap());
        Ingestor::new(corpus, Chunker::new(10, 3).unwrap(), DEFAULT_SOURCE)
    }

    #[test]
    fn test_ingest_text_builds_chunk_ids() {
        let temp = TempDir::new().unwrap();
        let ingestor = ingestor(&temp);

        let outcome = ingestor
            .ingest_text("Supply Agreement", "abcdefghijklmnop", None)
            .unwrap();
        assert_eq!(outcome.doc_id, document_id("Supply Agreement"));
        assert!(outcome.document_inserted);
        assert_eq!(outcome.chunks, 2);

        let chunks = ingestor
            .corpus
            .fetch_chunks_for_doc(&outcome.doc_id, 10)
            .unwrap();
        assert_eq!(chunks[0].chunk_id, chunk_id(&outcome.doc_id, 0, 0, 10));
        assert_eq!(chunks[1].chunk_id, chunk_id(&outcome.doc_id, 1, 7, 16));
        assert_eq!(chunks[1].text, "hijklmnop");
    }

    #[test]
    fn test_reingest_inserts_nothing() {
        let temp = TempDir::new().unwrap();
        let ingestor = ingestor(&temp);

        ingestor.ingest_text("Lease", "0123456789abcdef", None).unwrap();
        let again = ingestor.ingest_text("Lease", "0123456789abcdef", None).unwrap();

        assert!(!again.document_inserted);
        assert_eq!(again.chunks_inserted, 0);
        assert_eq!(again.chunks, 2);
    }

    #[test]
    fn test_changed_text_under_stored_title_is_not_merged() {
        let temp = TempDir::new().unwrap();
        let ingestor = ingestor(&temp);

        let first = ingestor.ingest_text("Lease", "abcdefghijkl", None).unwrap();
        let changed = ingestor
            .ingest_text("Lease", "ABCDEFGHIJKLMNOP", None)
            .unwrap();

        assert!(!first.conflicting);
        assert!(changed.conflicting);
        assert_eq!(changed.chunks_inserted, 0);

        let stored = ingestor.corpus.fetch_chunks_for_doc(&first.doc_id, 10).unwrap();
        assert_eq!(stored.len(), first.chunks);
        assert!(stored.iter().all(|c| c.text.chars().all(|ch| ch.is_lowercase())));
    }

    #[test]
    fn test_unique_titles_keeps_last_path() {
        let files = vec![
            PathBuf::from("/corpus/a/Lease.txt"),
            PathBuf::from("/corpus/b/Lease.txt"),
            PathBuf::from("/corpus/b/Supply.txt"),
        ];
        assert_eq!(
            unique_titles(&files),
            vec![
                PathBuf::from("/corpus/b/Lease.txt"),
                PathBuf::from("/corpus/b/Supply.txt"),
            ]
        );
    }

    #[test]
    fn test_empty_title_rejected() {
        let temp = TempDir::new().unwrap();
        let ingestor = ingestor(&temp);
        assert!(matches!(
            ingestor.ingest_text("  ", "text", None),
            Err(ContractIqError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_invalid_utf8_bytes_are_skipped() {
        assert_eq!(decode_ignoring_invalid(b"gov\xffern\xc3\xa9d"), "governéd");
        assert_eq!(decode_ignoring_invalid(b""), "");
    }

    #[test]
    fn test_find_text_files_sorted_and_recursive() {
        let temp = TempDir::new().unwrap();
        let nested = temp.path().join("part_b");
        std::fs::create_dir(&nested).unwrap();
        std::fs::write(nested.join("b.txt"), "b").unwrap();
        std::fs::write(temp.path().join("a.txt"), "a").unwrap();
        std::fs::write(temp.path().join("notes.md"), "skip").unwrap();

        let files = find_text_files(temp.path());
        assert_eq!(files.len(), 2);
        assert!(files[0].ends_with("a.txt"));
        assert!(files[1].ends_with("part_b/b.txt"));
    }
}
