//! Retrieval-Augmented Answering
//!
//! Query expansion, multi-query search and context-chained answer
//! generation, tied together by [`RagSession`].

pub mod answerer;
pub mod expander;
pub mod retriever;

use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::config::RetrievalConfig;
use crate::context::ChatHistory;
use crate::index::{IndexError, VectorStore};
use crate::llm::{ChatModel, Embedder, LlmError};

pub use answerer::{answer, build_context, build_prompt, NO_INFORMATION_MESSAGE};
pub use expander::{expand_query, parse_expansions, DEFAULT_EXPANSIONS};
pub use retriever::{dedup_by_content, Retrieval, RetrievalResult, Retriever};

#[derive(Error, Debug)]
pub enum RagError {
    #[error("Retrieval unavailable: {0}")]
    RetrievalUnavailable(#[source] LlmError),
    #[error("Generation unavailable: {0}")]
    GenerationUnavailable(#[source] LlmError),
    #[error("Index error: {0}")]
    Index(#[from] IndexError),
}

/// Reply to one question.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Answer {
    pub text: String,
    pub expansions: Vec<String>,
    pub sources: Vec<RetrievalResult>,
}

/// Everything needed to answer questions against a built index. History
/// persists across `ask` calls until cleared.
pub struct RagSession {
    chat: Box<dyn ChatModel>,
    embedder: Box<dyn Embedder>,
    store: VectorStore,
    history: ChatHistory,
    settings: RetrievalConfig,
}

impl RagSession {
    pub fn new(
        chat: Box<dyn ChatModel>,
        embedder: Box<dyn Embedder>,
        store: VectorStore,
        settings: RetrievalConfig,
    ) -> Self {
        Self {
            chat,
            embedder,
            store,
            history: ChatHistory::with_capacity(settings.history_turns),
            settings,
        }
    }

    pub fn history(&self) -> &ChatHistory {
        &self.history
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
        info!("Chat history cleared");
    }

    pub fn retrieve(&self, query: &str) -> Result<Retrieval, RagError> {
        let retriever = Retriever {
            chat: self.chat.as_ref(),
            embedder: self.embedder.as_ref(),
            index: self.store.index(),
            records: self.store.records(),
        };
        retriever.retrieve(query, self.settings.top_k, self.settings.expansions)
    }

    /// Retrieve, then answer with the accumulated history.
    pub fn ask(&mut self, query: &str) -> Result<Answer, RagError> {
        let Retrieval { expansions, results } = self.retrieve(query)?;
        let text = answer(self.chat.as_ref(), &mut self.history, query, &results)?;
        Ok(Answer { text, expansions, sources: results })
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::cell::RefCell;
    use std::collections::VecDeque;

    use crate::llm::{ChatMessage, ChatModel, LlmError};

    /// Chat model that replays canned replies and records every request.
    pub struct ScriptedChat {
        replies: RefCell<VecDeque<String>>,
        requests: RefCell<Vec<Vec<ChatMessage>>>,
        fail: bool,
    }

    impl ScriptedChat {
        pub fn new(replies: &[&str]) -> Self {
            Self {
                replies: RefCell::new(replies.iter().map(|r| r.to_string()).collect()),
                requests: RefCell::new(Vec::new()),
                fail: false,
            }
        }

        pub fn failing() -> Self {
            Self { fail: true, ..Self::new(&[]) }
        }

        pub fn call_count(&self) -> usize {
            self.requests.borrow().len()
        }

        /// Content of the last message of request `n`.
        pub fn prompt(&self, n: usize) -> String {
            self.requests.borrow()[n]
                .last()
                .map(|m| m.content.clone())
                .unwrap_or_default()
        }
    }

    impl ChatModel for ScriptedChat {
        fn chat(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
            self.requests.borrow_mut().push(messages.to_vec());
            if self.fail {
                return Err(LlmError::Status { status: 503, body: "unavailable".into() });
            }
            Ok(self.replies.borrow_mut().pop_front().unwrap_or_default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::ScriptedChat;
    use super::*;
    use crate::index::{FlatL2Index, IndexedChunk};
    use crate::llm::{Embedder, HashingEmbedder};
    use std::rc::Rc;

    /// Shares one scripted model between the session and the test.
    struct SharedChat(Rc<ScriptedChat>);

    impl ChatModel for SharedChat {
        fn chat(&self, messages: &[crate::llm::ChatMessage]) -> Result<String, LlmError> {
            self.0.chat(messages)
        }
    }

    fn store(embedder: &HashingEmbedder, texts: &[(&str, &str)]) -> VectorStore {
        let mut index = FlatL2Index::new(embedder.dimension());
        let mut records = Vec::new();
        for (title, text) in texts {
            index.add(&embedder.embed(text).unwrap()).unwrap();
            records.push(IndexedChunk {
                title: title.to_string(),
                filename: "policy.json".to_string(),
                text: text.to_string(),
            });
        }
        VectorStore::new(index, records).unwrap()
    }

    fn session(chat: Rc<ScriptedChat>, settings: RetrievalConfig) -> RagSession {
        let embedder = HashingEmbedder::default();
        let store = store(
            &embedder,
            &[
                ("Annual Leave", "Staff receive 25 days of annual leave"),
                ("Sick Leave", "Sick leave requires a doctor's note"),
                ("Expenses", "Submit receipts within 30 days"),
            ],
        );
        RagSession::new(Box::new(SharedChat(chat)), Box::new(embedder), store, settings)
    }

    #[test]
    fn test_ask_retrieves_and_answers() {
        let chat = Rc::new(ScriptedChat::new(&[
            "1. annual leave days\n2. vacation allowance",
            "You receive 25 days.",
        ]));
        let settings = RetrievalConfig { top_k: 1, ..RetrievalConfig::default() };
        let mut session = session(chat.clone(), settings);

        let reply = session.ask("How much annual leave?").unwrap();
        assert_eq!(reply.text, "You receive 25 days.");
        assert_eq!(reply.expansions, vec!["annual leave days", "vacation allowance"]);
        assert_eq!(reply.sources[0].title, "Annual Leave");
        assert_eq!(chat.call_count(), 2);
        assert_eq!(session.history().len(), 1);
    }

    #[test]
    fn test_history_persists_until_cleared() {
        let chat = Rc::new(ScriptedChat::new(&["1. leave", "a1", "1. sick", "a2"]));
        let mut session = session(chat.clone(), RetrievalConfig::default());

        session.ask("leave?").unwrap();
        session.ask("sick?").unwrap();
        assert_eq!(session.history().len(), 2);
        assert!(chat.prompt(3).contains("User: leave?\n"));

        session.clear_history();
        assert!(session.history().is_empty());
    }

    #[test]
    fn test_no_expansions_gives_fallback_without_answer_call() {
        let chat = Rc::new(ScriptedChat::new(&[""]));
        let mut session = session(chat.clone(), RetrievalConfig::default());

        let reply = session.ask("anything").unwrap();
        assert_eq!(reply.text, NO_INFORMATION_MESSAGE);
        assert!(reply.sources.is_empty());
        assert_eq!(chat.call_count(), 1);
        assert!(session.history().is_empty());
    }

    #[test]
    fn test_history_capacity_from_settings() {
        let chat = Rc::new(ScriptedChat::new(&[]));
        let settings = RetrievalConfig { history_turns: 2, ..RetrievalConfig::default() };
        assert_eq!(session(chat, settings).history().capacity(), 2);
    }
}
