//! Parsing raw model output into answers
//!
//! Model output is untrusted input. Under the JSON contract it is validated against
//! the answer schema and rejected when it does not match; nothing is coerced or
//! repaired.

use super::ResponseContract;
use crate::error::{ContractIqError, Result};
use crate::storage::Chunk;
use serde::{Deserialize, Serialize};

/// Answer text the model uses when the chunks do not answer the question
pub const NOT_FOUND_ANSWER: &str = "NOT FOUND";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Citation {
    pub chunk_id: String,
    pub quote: String,
    pub answer_span: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ParsedAnswer {
    pub answer: String,
    pub citations: Vec<Citation>,
}

impl ParsedAnswer {
    pub fn is_not_found(&self) -> bool {
        self.answer.trim() == NOT_FOUND_ANSWER && self.citations.is_empty()
    }
}

/// Parse raw model output under `contract`
pub fn parse_response(contract: ResponseContract, raw: &str) -> Result<ParsedAnswer> {
    match contract {
        ResponseContract::Json => parse_json(raw),
        ResponseContract::Plain => Ok(ParsedAnswer {
            answer: raw.to_string(),
            citations: Vec::new(),
        }),
    }
}

/// Parse the object spanning the first `{` to the last `}` of `raw`.
///
/// Prose around the object is ignored.
pub fn parse_json(raw: &str) -> Result<ParsedAnswer> {
    let trimmed = raw.trim();
    let (Some(open), Some(close)) = (trimmed.find('{'), trimmed.rfind('}')) else {
        return Err(ContractIqError::malformed("no JSON object found", raw));
    };
    if close < open {
        return Err(ContractIqError::malformed("no JSON object found", raw));
    }

    let parsed: ParsedAnswer = serde_json::from_str(&trimmed[open..=close])
        .map_err(|e| ContractIqError::malformed(format!("invalid answer JSON: {}", e), raw))?;

    for (i, citation) in parsed.citations.iter().enumerate() {
        if !citation.quote.contains(&citation.answer_span) {
            return Err(ContractIqError::malformed(
                format!("citation {} answer_span is not part of its quote", i),
                raw,
            ));
        }
    }

    Ok(parsed)
}

/// Check every citation against the chunks the model was shown.
///
/// A citation must name one of `chunks` and quote that chunk's text verbatim.
pub fn verify_citations(answer: &ParsedAnswer, chunks: &[Chunk], raw: &str) -> Result<()> {
    for (i, citation) in answer.citations.iter().enumerate() {
        let Some(chunk) = chunks.iter().find(|c| c.chunk_id == citation.chunk_id) else {
            return Err(ContractIqError::malformed(
                format!(
                    "citation {} references chunk {} which was not retrieved",
                    i, citation.chunk_id
                ),
                raw,
            ));
        };
        if !chunk.text.contains(&citation.quote) {
            return Err(ContractIqError::malformed(
                format!(
                    "citation {} quote does not appear in chunk {}",
                    i, citation.chunk_id
                ),
                raw,
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const DELAWARE: &str = r#"{"answer":"Delaware","citations":[{"chunk_id":"abc123","quote":"Governed by Delaware law.","answer_span":"Delaware"}]}"#;

    fn delaware() -> ParsedAnswer {
        ParsedAnswer {
            answer: "Delaware".to_string(),
            citations: vec![Citation {
                chunk_id: "abc123".to_string(),
                quote: "Governed by Delaware law.".to_string(),
                answer_span: "Delaware".to_string(),
            }],
        }
    }

    fn assert_malformed(result: Result<ParsedAnswer>) {
        assert!(
            matches!(result, Err(ContractIqError::MalformedGenerationOutput { .. })),
            "expected malformed output, got {:?}",
            result
        );
    }

    #[test]
    fn test_well_formed_json() {
        assert_eq!(parse_json(DELAWARE).unwrap(), delaware());
    }

    #[test]
    fn test_surrounding_prose_tolerated() {
        let raw = format!("Here is the answer:\n```json\n{}\n```\nHope that helps.", DELAWARE);
        assert_eq!(parse_json(&raw).unwrap(), delaware());
    }

    #[test]
    fn test_no_braces() {
        assert_malformed(parse_json("The agreement is governed by Delaware law."));
        assert_malformed(parse_json("} backwards {"));
        assert_malformed(parse_json(""));
    }

    #[test]
    fn test_invalid_json() {
        assert_malformed(parse_json(r#"{"answer": "Delaware", "citations": [}"#));
    }

    #[test]
    fn test_schema_violations_rejected() {
        // Missing citations
        assert_malformed(parse_json(r#"{"answer":"Delaware"}"#));
        // Wrong type
        assert_malformed(parse_json(r#"{"answer":42,"citations":[]}"#));
        // Unknown field
        assert_malformed(parse_json(
            r#"{"answer":"Delaware","citations":[],"confidence":0.9}"#,
        ));
        // Citation missing answer_span
        assert_malformed(parse_json(
            r#"{"answer":"x","citations":[{"chunk_id":"c","quote":"q"}]}"#,
        ));
    }

    #[test]
    fn test_answer_span_must_be_in_quote() {
        assert_malformed(parse_json(
            r#"{"answer":"New York","citations":[{"chunk_id":"c1","quote":"Governed by Delaware law.","answer_span":"New York"}]}"#,
        ));
    }

    #[test]
    fn test_not_found_sentinel() {
        let parsed = parse_json(r#"{"answer":"NOT FOUND","citations":[]}"#).unwrap();
        assert!(parsed.is_not_found());
        assert!(!delaware().is_not_found());
    }

    #[test]
    fn test_plain_contract_never_fails() {
        let raw = "  I cannot find it in the provided text. {";
        let parsed = parse_response(ResponseContract::Plain, raw).unwrap();
        assert_eq!(parsed.answer, raw);
        assert!(parsed.citations.is_empty());
    }

    #[test]
    fn test_verify_citations() {
        let chunk = Chunk {
            chunk_id: "abc123".to_string(),
            doc_id: "doc".to_string(),
            chunk_index: 0,
            start_char: 0,
            end_char: 60,
            text: "12. This Agreement shall be Governed by Delaware law. 13. Notices.".to_string(),
        };

        assert!(verify_citations(&delaware(), &[chunk.clone()], DELAWARE).is_ok());

        let mut foreign = delaware();
        foreign.citations[0].chunk_id = "zzz999".to_string();
        assert!(verify_citations(&foreign, &[chunk.clone()], DELAWARE).is_err());

        let mut paraphrased = delaware();
        paraphrased.citations[0].quote = "Delaware law governs.".to_string();
        assert!(verify_citations(&paraphrased, &[chunk], DELAWARE).is_err());
    }
}
