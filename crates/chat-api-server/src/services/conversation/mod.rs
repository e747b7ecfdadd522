//! Conversation memory management module
//!
//! Provides in-memory conversation state with:
//! - Thread-safe per-conversation storage (DashMap)
//! - Count-based sliding window (oldest messages evicted first)

mod memory;

pub use memory::{ConversationMemory, MemoryStats};

pub use crate::models::chat::{ChatMessage, ConversationId};
