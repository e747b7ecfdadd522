use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, info};

use crate::models::chat::{ChatMessage, ConversationId};

/// Bounded, ordered per-conversation message history.
///
/// Each conversation keeps at most `window_size` messages. Appends go to the
/// tail; once the window is exceeded the oldest messages are dropped from the
/// head. Writers to the same conversation are serialized by the DashMap shard
/// lock, so a reader never observes a half-evicted history.
#[derive(Clone)]
pub struct ConversationMemory {
    /// conversation_id -> history (oldest first)
    storage: Arc<DashMap<ConversationId, VecDeque<ChatMessage>>>,
    window_size: usize,
}

impl ConversationMemory {
    pub fn new(window_size: usize) -> Self {
        info!("Initializing conversation memory (window_size={})", window_size);
        Self {
            storage: Arc::new(DashMap::new()),
            window_size,
        }
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Append at the tail, creating the history on first use, then evict
    /// from the head until the window holds.
    pub fn append(&self, conversation_id: &ConversationId, message: ChatMessage) {
        let mut history = self
            .storage
            .entry(conversation_id.clone())
            .or_insert_with(|| VecDeque::with_capacity(self.window_size + 1));

        Self::push_bounded(&mut history, message, self.window_size);
        debug!(
            "Appended to conversation {} (len={})",
            conversation_id,
            history.len()
        );
    }

    /// Current history, oldest first. Empty when the conversation is unknown.
    pub fn get(&self, conversation_id: &ConversationId) -> Vec<ChatMessage> {
        self.storage
            .get(conversation_id)
            .map(|history| history.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Append and read back under a single lock, so the returned history
    /// always ends with `message` and reflects no concurrent partial update.
    pub fn append_and_get(
        &self,
        conversation_id: &ConversationId,
        message: ChatMessage,
    ) -> Vec<ChatMessage> {
        let mut history = self
            .storage
            .entry(conversation_id.clone())
            .or_insert_with(|| VecDeque::with_capacity(self.window_size + 1));

        Self::push_bounded(&mut history, message, self.window_size);
        history.iter().cloned().collect()
    }

    /// Number of conversations with at least one message
    pub fn conversation_count(&self) -> usize {
        self.storage.len()
    }

    pub fn stats(&self) -> MemoryStats {
        MemoryStats {
            conversations: self.storage.len(),
            messages: self.storage.iter().map(|entry| entry.value().len()).sum(),
            window_size: self.window_size,
        }
    }

    fn push_bounded(history: &mut VecDeque<ChatMessage>, message: ChatMessage, window: usize) {
        history.push_back(message);
        while history.len() > window {
            history.pop_front();
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryStats {
    pub conversations: usize,
    pub messages: usize,
    pub window_size: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::chat::Role;
    use std::thread;

    fn contents(history: &[ChatMessage]) -> Vec<String> {
        history.iter().map(|m| m.content().to_string()).collect()
    }

    #[test]
    fn test_get_unknown_conversation_is_empty() {
        let memory = ConversationMemory::new(10);
        assert!(memory.get(&"nobody".into()).is_empty());
        assert_eq!(memory.conversation_count(), 0);
    }

    #[test]
    fn test_user_then_assistant_kept_in_order() {
        let memory = ConversationMemory::new(10);
        let id = ConversationId::from("default");

        memory.append(&id, ChatMessage::user("hi"));
        memory.append(&id, ChatMessage::assistant("hello"));

        let history = memory.get(&id);
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role(), Role::User);
        assert_eq!(history[0].content(), "hi");
        assert_eq!(history[1].role(), Role::Assistant);
        assert_eq!(history[1].content(), "hello");
    }

    #[test]
    fn test_eleven_alternating_messages_drop_the_first() {
        let memory = ConversationMemory::new(10);
        let id = ConversationId::from("default");

        for i in 1..=11 {
            let message = if i % 2 == 1 {
                ChatMessage::user(format!("m{}", i))
            } else {
                ChatMessage::assistant(format!("m{}", i))
            };
            memory.append(&id, message);
        }

        let history = memory.get(&id);
        let expected: Vec<String> = (2..=11).map(|i| format!("m{}", i)).collect();
        assert_eq!(history.len(), 10);
        assert_eq!(contents(&history), expected);
        assert_eq!(history[0].role(), Role::Assistant);
    }

    #[test]
    fn test_window_keeps_last_w_for_any_overflow() {
        for window in [1usize, 3, 10] {
            for n in 0..(window * 3) {
                let memory = ConversationMemory::new(window);
                let id = ConversationId::from("c");
                for i in 0..n {
                    memory.append(&id, ChatMessage::user(i.to_string()));
                }

                let expected: Vec<String> = (n.saturating_sub(window)..n)
                    .map(|i| i.to_string())
                    .collect();
                assert_eq!(contents(&memory.get(&id)), expected, "window={} n={}", window, n);
            }
        }
    }

    #[test]
    fn test_conversations_are_isolated() {
        let memory = ConversationMemory::new(2);
        let a = ConversationId::from("a");
        let b = ConversationId::from("b");

        memory.append(&a, ChatMessage::user("a1"));
        memory.append(&a, ChatMessage::user("a2"));
        memory.append(&a, ChatMessage::user("a3"));
        memory.append(&b, ChatMessage::user("b1"));

        assert_eq!(contents(&memory.get(&a)), vec!["a2", "a3"]);
        assert_eq!(contents(&memory.get(&b)), vec!["b1"]);

        let stats = memory.stats();
        assert_eq!(stats.conversations, 2);
        assert_eq!(stats.messages, 3);
    }

    #[test]
    fn test_append_and_get_ends_with_appended_message() {
        let memory = ConversationMemory::new(3);
        let id = ConversationId::from("default");

        memory.append(&id, ChatMessage::user("1"));
        memory.append(&id, ChatMessage::assistant("2"));
        memory.append(&id, ChatMessage::user("3"));

        let history = memory.append_and_get(&id, ChatMessage::assistant("4"));
        assert_eq!(contents(&history), vec!["2", "3", "4"]);
        assert_eq!(contents(&memory.get(&id)), vec!["2", "3", "4"]);
    }

    #[test]
    fn test_concurrent_appends_stay_bounded_and_ordered() {
        const WRITERS: usize = 8;
        const PER_WRITER: usize = 200;
        const WINDOW: usize = 10;

        let memory = ConversationMemory::new(WINDOW);
        let id = ConversationId::from("shared");

        let handles: Vec<_> = (0..WRITERS)
            .map(|writer| {
                let memory = memory.clone();
                let id = id.clone();
                thread::spawn(move || {
                    for seq in 0..PER_WRITER {
                        let history =
                            memory.append_and_get(&id, ChatMessage::user(format!("{}:{}", writer, seq)));
                        assert!(history.len() <= WINDOW);
                        assert_eq!(
                            history.last().map(|m| m.content().to_string()),
                            Some(format!("{}:{}", writer, seq))
                        );

                        let snapshot = memory.get(&id);
                        assert!(snapshot.len() <= WINDOW);
                        assert_in_writer_order(&snapshot);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        let history = memory.get(&id);
        assert_eq!(history.len(), WINDOW);
        assert_in_writer_order(&history);
    }

    /// Messages from the same writer must appear with increasing sequence.
    fn assert_in_writer_order(history: &[ChatMessage]) {
        let mut last_seen = std::collections::HashMap::new();
        for message in history {
            let (writer, seq) = message.content().split_once(':').unwrap();
            let seq: usize = seq.parse().unwrap();
            if let Some(prev) = last_seen.insert(writer.to_string(), seq) {
                assert!(prev < seq, "writer {} out of order: {} then {}", writer, prev, seq);
            }
        }
    }
}
