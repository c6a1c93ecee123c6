//! Content-addressed identifiers
//!
//! Ids are truncated SHA-256 digests over `::`-joined fields. The same logical entity always
//! maps to the same id, which turns re-ingestion into an idempotent upsert.

use sha2::{Digest, Sha256};

/// Hex characters kept from the digest (64 bits)
pub const ID_HEX_LEN: usize = 16;

const FIELD_SEPARATOR: &str = "::";

fn digest(raw: &str) -> String {
    let mut hex = format!("{:x}", Sha256::digest(raw.as_bytes()));
    hex.truncate(ID_HEX_LEN);
    hex
}

/// Id of a document, derived from its title
pub fn document_id(title: &str) -> String {
    digest(title)
}

/// Id of a chunk, derived from its document and position
pub fn chunk_id(doc_id: &str, chunk_index: usize, start_char: usize, end_char: usize) -> String {
    let raw = [
        doc_id.to_string(),
        chunk_index.to_string(),
        start_char.to_string(),
        end_char.to_string(),
    ]
    .join(FIELD_SEPARATOR);
    digest(&raw)
}

/// Id of a CUAD annotation (one per document and question)
pub fn annotation_id(doc_id: &str, question: &str) -> String {
    digest(&format!("{doc_id}{FIELD_SEPARATOR}{question}"))
}
