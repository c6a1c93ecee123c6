//! CUAD annotation import
//!
//! `CUAD_v1.json` follows the SQuAD layout: documents with paragraphs, each paragraph a
//! context plus question/answer sets. Every question becomes one annotation labelled
//! with the question text. Answer offsets are relative to the paragraph context.

use super::ids::{annotation_id, document_id};
use crate::error::{ContractIqError, Result};
use crate::storage::{Annotation, SqliteCorpus};
use serde::Deserialize;
use std::collections::HashSet;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug, Deserialize)]
struct Dataset {
    #[serde(default)]
    data: Vec<DatasetDocument>,
}

#[derive(Debug, Deserialize)]
struct DatasetDocument {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    paragraphs: Vec<Paragraph>,
}

#[derive(Debug, Deserialize)]
struct Paragraph {
    #[serde(default)]
    context: String,
    #[serde(default)]
    qas: Vec<QuestionAnswers>,
}

#[derive(Debug, Deserialize)]
struct QuestionAnswers {
    #[serde(default)]
    question: String,
    #[serde(default)]
    answers: Vec<AnswerSpan>,
}

#[derive(Debug, Deserialize)]
struct AnswerSpan {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    answer_start: Option<i64>,
}

#[derive(Debug, Clone, Default)]
pub struct AnnotationImportReport {
    pub inserted: usize,
    pub already_present: usize,
    /// Annotations whose document has not been ingested
    pub unknown_document: usize,
}

/// Flatten a parsed dataset into annotation records
fn annotations_from(dataset: Dataset) -> Vec<Annotation> {
    let mut annotations = Vec::new();

    for document in dataset.data {
        let Some(title) = document.title.filter(|t| !t.is_empty()) else {
            continue;
        };
        let doc_id = document_id(&title);

        for paragraph in document.paragraphs {
            for qa in paragraph.qas {
                let (answer_texts, answer_starts) = qa
                    .answers
                    .into_iter()
                    .filter_map(|a| Some((a.text?, a.answer_start?)))
                    .unzip();

                annotations.push(Annotation {
                    annotation_id: annotation_id(&doc_id, &qa.question),
                    doc_id: doc_id.clone(),
                    label: qa.question,
                    context: Some(paragraph.context.clone()),
                    answer_texts,
                    answer_starts,
                });
            }
        }
    }

    annotations
}

/// Parse a SQuAD-layout JSON document
pub fn parse_annotations(json: &str) -> Result<Vec<Annotation>> {
    let dataset: Dataset = serde_json::from_str(json).map_err(|e| ContractIqError::Json {
        source: e,
        context: "Invalid CUAD annotation file".to_string(),
    })?;
    Ok(annotations_from(dataset))
}

/// Import annotations from `path` into the corpus
///
/// Annotations for documents that are not in the corpus are skipped.
pub fn import_annotations(corpus: &SqliteCorpus, path: &Path) -> Result<AnnotationImportReport> {
    let file = File::open(path).map_err(|e| ContractIqError::Io {
        source: e,
        context: format!("Failed to open {}", path.display()),
    })?;
    let dataset: Dataset =
        serde_json::from_reader(BufReader::new(file)).map_err(|e| ContractIqError::Json {
            source: e,
            context: format!("Invalid CUAD annotation file {}", path.display()),
        })?;

    let known: HashSet<String> = corpus.documents_by_id()?.into_keys().collect();
    let mut report = AnnotationImportReport::default();

    for annotation in annotations_from(dataset) {
        if !known.contains(&annotation.doc_id) {
            report.unknown_document += 1;
            continue;
        }
        if corpus.upsert_annotation(&annotation)? {
            report.inserted += 1;
        } else {
            report.already_present += 1;
        }
    }

    if report.unknown_document > 0 {
        warn!(
            "Skipped {} annotations for documents that are not ingested",
            report.unknown_document
        );
    }
    info!(
        "Annotation import complete: {} inserted, {} already present",
        report.inserted, report.already_present
    );

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{Database, Document};
    use tempfile::TempDir;

    const SAMPLE: &str = r#"{
        "version": "aok_v1.0",
        "data": [
            {
                "title": "ACME_SUPPLY_AGREEMENT",
                "paragraphs": [{
                    "context": "This Agreement is governed by the laws of Delaware.",
                    "qas": [
                        {
                            "id": "ACME__Governing Law",
                            "question": "Highlight the parts (if any) of this contract related to \"Governing Law\"",
                            "answers": [{"text": "laws of Delaware", "answer_start": 34}],
                            "is_impossible": false
                        },
                        {
                            "id": "ACME__Cap On Liability",
                            "question": "Highlight the parts (if any) of this contract related to \"Cap On Liability\"",
                            "answers": [],
                            "is_impossible": true
                        }
                    ]
                }]
            },
            {
                "title": "UNKNOWN_LEASE",
                "paragraphs": [{"context": "", "qas": [{"question": "Parties", "answers": []}]}]
            },
            {"paragraphs": []}
        ]
    }"#;

    #[test]
    fn test_parse_squad_layout() {
        let annotations = parse_annotations(SAMPLE).unwrap();
        assert_eq!(annotations.len(), 3);

        let governing = &annotations[0];
        assert_eq!(governing.doc_id, document_id("ACME_SUPPLY_AGREEMENT"));
        assert_eq!(
            governing.annotation_id,
            annotation_id(&governing.doc_id, &governing.label)
        );
        assert_eq!(governing.answer_texts, vec!["laws of Delaware".to_string()]);
        assert_eq!(governing.answer_starts, vec![34]);
        assert!(annotations[1].answer_texts.is_empty());
    }

    #[test]
    fn test_import_skips_unknown_documents() {
        let temp = TempDir::new().unwrap();
        let corpus = SqliteCorpus::new(Database::new(&temp.path().join("c.db")).unwrap());
        corpus
            .upsert_document(&Document {
                doc_id: document_id("ACME_SUPPLY_AGREEMENT"),
                title: "ACME_SUPPLY_AGREEMENT".to_string(),
                source: "cuad-v1".to_string(),
                raw_path: None,
            })
            .unwrap();

        let path = temp.path().join("CUAD_v1.json");
        std::fs::write(&path, SAMPLE).unwrap();

        let report = import_annotations(&corpus, &path).unwrap();
        assert_eq!(report.inserted, 2);
        assert_eq!(report.unknown_document, 1);

        let again = import_annotations(&corpus, &path).unwrap();
        assert_eq!(again.inserted, 0);
        assert_eq!(again.already_present, 2);

        let governing = corpus
            .fetch_annotations_for_doc(&document_id("ACME_SUPPLY_AGREEMENT"), Some("Governing"), 10)
            .unwrap();
        assert_eq!(governing.len(), 1);
    }

    #[test]
    fn test_invalid_file_rejected() {
        assert!(matches!(
            parse_annotations("[1, 2"),
            Err(ContractIqError::Json { .. })
        ));
    }
}
