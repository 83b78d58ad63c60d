//! Context Management Module
//!
//! Token accounting for chunk budgets and the bounded chat history that
//! chains recent turns into answer prompts.

pub mod history;
pub mod tokens;

pub use history::{ChatHistory, ChatTurn, DEFAULT_HISTORY_TURNS};
pub use tokens::{count_tokens, estimate_tokens_quick, Cl100kCounter, TokenCounter};
