//! Bounded chat history used for context chaining.
//!
//! The history is a plain FIFO of turns. Rendering into prompt text happens
//! only when a prompt is assembled.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Default number of turns kept for context chaining.
pub const DEFAULT_HISTORY_TURNS: usize = 3;

/// One answered question and the context that was used to answer it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub query: String,
    pub context: String,
    pub asked_at: DateTime<Utc>,
}

impl ChatTurn {
    pub fn new(query: impl Into<String>, context: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            context: context.into(),
            asked_at: Utc::now(),
        }
    }

    /// Prompt form of a single turn.
    pub fn render(&self) -> String {
        format!("User: {}\nBot: {}", self.query, self.context)
    }
}

/// Capacity-bounded FIFO of chat turns. The oldest turn is evicted first.
#[derive(Debug, Clone)]
pub struct ChatHistory {
    turns: VecDeque<ChatTurn>,
    capacity: usize,
}

impl Default for ChatHistory {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_HISTORY_TURNS)
    }
}

impl ChatHistory {
    /// A zero capacity is bumped to one so the current turn is always kept.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            turns: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a turn, returning the evicted oldest turn if the buffer was full.
    pub fn push(&mut self, turn: ChatTurn) -> Option<ChatTurn> {
        let evicted = if self.turns.len() == self.capacity {
            self.turns.pop_front()
        } else {
            None
        };
        self.turns.push_back(turn);
        evicted
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Turns from oldest to newest.
    pub fn turns(&self) -> impl Iterator<Item = &ChatTurn> {
        self.turns.iter()
    }

    /// Prompt form of the whole history: turns concatenated back to back,
    /// with no separator between consecutive turns.
    pub fn render(&self) -> String {
        self.turns.iter().map(ChatTurn::render).collect()
    }
}
