pub mod chat_service;
pub mod conversation;
pub mod llm_service;
pub mod prompt_template;

pub use chat_service::ChatService;
pub use conversation::ConversationMemory;
pub use llm_service::{LlmProvider, LlmService, ProviderError};
pub use prompt_template::{PromptTemplate, TemplateError};
