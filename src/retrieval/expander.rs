//! Query expansion: ask the chat model for reworded variants of a query.

use tracing::info;

use crate::llm::{ChatMessage, ChatModel, LlmError};

/// Variants requested per query.
pub const DEFAULT_EXPANSIONS: usize = 5;

pub fn expansion_prompt(query: &str, count: usize) -> String {
    format!(
        "You are a search optimization assistant. Generate {count} different reworded versions \
         of the following query while keeping the same intent:\n\n\
         Query: \"{query}\"\n\n\
         Ensure the variations cover different phrasing but do not change the original meaning.\n\
         Output them as a numbered list."
    )
}

/// Parse a numbered-list reply into at most `count` expansions.
///
/// Line `i` (1-based, counting blank lines too) has a leading `"i."` removed.
/// Blank lines are dropped.
pub fn parse_expansions(reply: &str, count: usize) -> Vec<String> {
    reply
        .trim()
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            let line = line.trim();
            let marker = format!("{}.", i + 1);
            line.strip_prefix(marker.as_str()).unwrap_or(line).trim().to_string()
        })
        .filter(|line| !line.is_empty())
        .take(count)
        .collect()
}

/// One chat call; a short reply yields fewer expansions, never an error.
pub fn expand_query(model: &dyn ChatModel, query: &str, count: usize) -> Result<Vec<String>, LlmError> {
    let reply = model.chat(&[ChatMessage::user(expansion_prompt(query, count))])?;
    let expansions = parse_expansions(&reply, count);
    info!(query = %query, expansions = ?expansions, "Expanded query");
    Ok(expansions)
}
