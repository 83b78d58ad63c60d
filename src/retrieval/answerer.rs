//! Answer generation from retrieved chunks and recent conversation turns.

use tracing::{debug, info};

use super::retriever::RetrievalResult;
use super::RagError;
use crate::context::{ChatHistory, ChatTurn};
use crate::llm::{ChatMessage, ChatModel};

/// Reply when retrieval found nothing. The model is not consulted.
pub const NO_INFORMATION_MESSAGE: &str = "I couldn't find any relevant information on this topic.";

/// Render results as `Title:`/`Content:` blocks separated by blank lines.
pub fn build_context(results: &[RetrievalResult]) -> String {
    results
        .iter()
        .map(|r| format!("Title: {}\nContent: {}", r.title, r.content))
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn build_prompt(context: &str, history: &ChatHistory, query: &str) -> String {
    format!(
        "You are an AI assistant with access to the following document information.\n\n\
         Context:\n{context}\n\n\
         Chat History:\n{history}\n\n\
         Answer the user's question using only the provided context. \
         If the answer isn't in the context, say \"I don't know.\"\n\n\
         User's Question: {query}\n\
         Answer:",
        history = history.render(),
    )
}

/// Generate an answer. The turn is recorded in `history` before the prompt
/// is built, so the prompt's history includes the current question.
pub fn answer(
    model: &dyn ChatModel,
    history: &mut ChatHistory,
    query: &str,
    results: &[RetrievalResult],
) -> Result<String, RagError> {
    if results.is_empty() {
        info!(query = %query, "No relevant chunks, returning fallback answer");
        return Ok(NO_INFORMATION_MESSAGE.to_string());
    }

    let context = build_context(results);
    if let Some(evicted) = history.push(ChatTurn::new(query, context.as_str())) {
        debug!(query = %evicted.query, "Evicted oldest history turn");
    }

    let prompt = build_prompt(&context, history, query);
    debug!(prompt_chars = prompt.len(), turns = history.len(), "Generating answer");

    model
        .chat(&[ChatMessage::user(prompt)])
        .map_err(RagError::GenerationUnavailable)
}
