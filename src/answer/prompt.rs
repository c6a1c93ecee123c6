//! Prompt templates, one per response contract

use super::ResponseContract;
use crate::storage::Chunk;

/// Schema the model must answer with under the JSON contract
pub const ANSWER_SCHEMA: &str = r#"{"answer": "string", "citations": [{"chunk_id":"string","quote":"string","answer_span":"string"}]}"#;

/// Exact reply for questions the chunks cannot answer
pub const NOT_FOUND_SENTINEL: &str = r#"{"answer":"NOT FOUND","citations":[]}"#;

const CHUNK_SEPARATOR: &str = "\n---\n";

/// Build the single prompt sent to the model.
///
/// Chunks appear in the order given, each tagged with its id and carrying its text
/// verbatim.
pub fn build_prompt(contract: ResponseContract, question: &str, chunks: &[Chunk]) -> String {
    let context = render_chunks(chunks);
    match contract {
        ResponseContract::Json => json_prompt(question, &context),
        ResponseContract::Plain => plain_prompt(question, &context),
    }
}

fn render_chunks(chunks: &[Chunk]) -> String {
    chunks
        .iter()
        .map(|chunk| format!("[chunk_id={}]\n{}\n", chunk.chunk_id, chunk.text))
        .collect::<Vec<_>>()
        .join(CHUNK_SEPARATOR)
}

fn json_prompt(question: &str, context: &str) -> String {
    format!(
        "You are a careful contract analyst.\n\
         Answer the question using ONLY the provided chunks. Do not use outside knowledge.\n\
         Every citation must name the chunk_id it comes from. The quote must be copied \
         verbatim from that chunk and answer_span must be an exact substring of the quote.\n\
         If the chunks do not contain the answer, reply with exactly:\n\
         {NOT_FOUND_SENTINEL}\n\
         \n\
         Respond with a single JSON object and nothing else, matching this schema:\n\
         {ANSWER_SCHEMA}\n\
         \n\
         Question: {question}\n\
         \n\
         Chunks:\n\
         {context}"
    )
}

fn plain_prompt(question: &str, context: &str) -> String {
    format!(
        "You are a careful contract analyst.\n\
         Answer the question using ONLY the provided chunks.\n\
         If you cannot find the answer, say you cannot find it in the provided text.\n\
         \n\
         Question: {question}\n\
         \n\
         Chunks:\n\
         {context}\n\
         \n\
         Return:\n\
         1) Answer (1-3 sentences)\n\
         2) Citations: list of chunk_id(s) you used"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(id: &str, text: &str) -> Chunk {
        Chunk {
            chunk_id: id.to_string(),
            doc_id: "doc".to_string(),
            chunk_index: 0,
            start_char: 0,
            end_char: text.chars().count(),
            text: text.to_string(),
        }
    }

    #[test]
    fn test_json_prompt_carries_schema_and_sentinel() {
        let prompt = build_prompt(
            ResponseContract::Json,
            "What law governs?",
            &[chunk("c1", "Governed by Delaware law.")],
        );

        assert!(prompt.contains(ANSWER_SCHEMA));
        assert!(prompt.contains(NOT_FOUND_SENTINEL));
        assert!(prompt.contains("Question: What law governs?"));
        assert!(prompt.contains("[chunk_id=c1]\nGoverned by Delaware law.\n"));
    }

    #[test]
    fn test_chunks_keep_order_and_text() {
        let text_b = "  Section 2.\n\tIndented  text  ";
        let prompt = build_prompt(
            ResponseContract::Plain,
            "q",
            &[chunk("b", text_b), chunk("a", "first")],
        );

        let pos_b = prompt.find("[chunk_id=b]").unwrap();
        let pos_a = prompt.find("[chunk_id=a]").unwrap();
        assert!(pos_b < pos_a);
        assert!(prompt.contains(text_b));
        assert!(prompt.contains(CHUNK_SEPARATOR));
    }

    #[test]
    fn test_last_chunk_keeps_trailing_whitespace() {
        let last = "Notices shall be in writing.  \n\n";
        let prompt = build_prompt(
            ResponseContract::Json,
            "q",
            &[chunk("c1", "first"), chunk("c2", last)],
        );
        assert!(prompt.ends_with(&format!("[chunk_id=c2]\n{}\n", last)));
    }

    #[test]
    fn test_plain_prompt_asks_for_chunk_ids() {
        let prompt = build_prompt(ResponseContract::Plain, "q", &[]);
        assert!(prompt.starts_with("You are a careful contract analyst."));
        assert!(prompt.contains("Citations: list of chunk_id(s) you used"));
        assert!(!prompt.contains(ANSWER_SCHEMA));
    }

    #[test]
    fn test_prompt_is_deterministic() {
        let chunks = [chunk("c1", "one"), chunk("c2", "two")];
        assert_eq!(
            build_prompt(ResponseContract::Json, "q", &chunks),
            build_prompt(ResponseContract::Json, "q", &chunks)
        );
    }
}
