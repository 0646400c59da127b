//! Grounded prompt assembly.

use crate::processing::Chunk;

/// Phrase the model is told to answer with when the context does not cover the question.
pub const UNKNOWN_ANSWER: &str = "I don't know.";

/// Build the prompt sent to the language model.
///
/// Chunk texts are joined with a blank line into one context block. Nothing is truncated; an
/// oversized context surfaces as a generation error.
pub fn build_prompt(query: &str, chunks: &[Chunk]) -> String {
    let context = chunks
        .iter()
        .map(|chunk| chunk.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "You are a helpful assistant. Use the following context to answer the question.\n\
         Answer only from the context. If you don't find relevant information in the context, \
         say \"{UNKNOWN_ANSWER}\"\n\
         \n\
         Context:\n\
         {context}\n\
         \n\
         Question:\n\
         {query}\n"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_joins_chunks_with_blank_lines_and_ends_with_question() {
        let chunks = vec![
            Chunk::new("First fact.", "doc.pdf", Some(1)),
            Chunk::new("Second fact.", "doc.pdf", Some(2)),
        ];
        let prompt = build_prompt("What is X?", &chunks);

        assert!(prompt.contains("Context:\nFirst fact.\n\nSecond fact.\n"));
        assert!(prompt.trim_end().ends_with("Question:\nWhat is X?"));
        assert!(prompt.contains(UNKNOWN_ANSWER));
    }

    #[test]
    fn prompt_is_deterministic() {
        let chunks = vec![Chunk::new("Only fact.", "doc.pdf", None)];
        assert_eq!(build_prompt("q", &chunks), build_prompt("q", &chunks));
    }

    #[test]
    fn prompt_with_no_chunks_still_carries_instructions() {
        let prompt = build_prompt("Anything?", &[]);
        assert!(prompt.starts_with("You are a helpful assistant."));
        assert!(prompt.contains("Context:\n\n"));
    }
}
