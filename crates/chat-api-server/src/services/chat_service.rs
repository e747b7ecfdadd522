use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::models::chat::{ChatMessage, ConversationId};
use crate::services::conversation::ConversationMemory;
use crate::services::llm_service::LlmProvider;
use crate::services::prompt_template::{PromptTemplate, INPUT_VARIABLE};
use crate::utils::error::ApiError;
use crate::utils::limiters::Limiters;

/// Request path: render prompt, record the user turn, ask the model with the
/// trimmed history, record the reply.
pub struct ChatService {
    template: PromptTemplate,
    memory: ConversationMemory,
    llm_provider: Arc<dyn LlmProvider>,
    limiters: Limiters,
    default_conversation_id: ConversationId,
    max_message_chars: usize,
}

impl ChatService {
    pub fn new(
        template: PromptTemplate,
        memory: ConversationMemory,
        llm_provider: Arc<dyn LlmProvider>,
        limiters: Limiters,
        default_conversation_id: ConversationId,
        max_message_chars: usize,
    ) -> Self {
        Self {
            template,
            memory,
            llm_provider,
            limiters,
            default_conversation_id,
            max_message_chars,
        }
    }

    pub fn memory(&self) -> &ConversationMemory {
        &self.memory
    }

    /// Blank or missing ids fall back to the configured default conversation
    pub fn resolve_conversation(&self, requested: Option<&str>) -> ConversationId {
        match requested.map(str::trim) {
            Some(id) if !id.is_empty() => ConversationId::new(id),
            _ => self.default_conversation_id.clone(),
        }
    }

    pub fn validate_message(&self, message: &str) -> Result<(), ApiError> {
        if message.trim().is_empty() {
            return Err(ApiError::BadRequest("message must not be empty".to_string()));
        }

        let chars = message.chars().count();
        if chars > self.max_message_chars {
            return Err(ApiError::BadRequest(format!(
                "message is {} characters, limit is {}",
                chars, self.max_message_chars
            )));
        }

        Ok(())
    }

    pub async fn respond(
        &self,
        conversation_id: &ConversationId,
        user_input: &str,
    ) -> Result<String, ApiError> {
        let start_time = Instant::now();
        self.validate_message(user_input)?;

        let system_text = self
            .template
            .render(&HashMap::from([(INPUT_VARIABLE, user_input)]))?;

        // Busy requests never reach memory
        let (_permit, waited) = self.limiters.acquire_llm().await?;
        if waited.as_millis() > 100 {
            warn!("Waited {}ms for an LLM slot", waited.as_millis());
        }

        // User turn and history read happen under one lock
        let history = self
            .memory
            .append_and_get(conversation_id, ChatMessage::user(user_input));

        debug!(
            "Conversation {}: sending {} history messages, system prompt {} chars",
            conversation_id,
            history.len(),
            system_text.chars().count()
        );

        let llm_start = Instant::now();
        let reply = self.llm_provider.complete(&system_text, &history).await?;
        let llm_ms = llm_start.elapsed().as_millis();

        self.memory
            .append(conversation_id, ChatMessage::assistant(reply.clone()));

        info!(
            "Conversation {}: reply {} chars (llm={}ms, total={}ms)",
            conversation_id,
            reply.chars().count(),
            llm_ms,
            start_time.elapsed().as_millis()
        );

        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LimitsConfig;
    use crate::models::chat::Role;
    use crate::services::llm_service::{MockLlmProvider, ProviderError};

    fn service_with(provider: MockLlmProvider, window: usize) -> ChatService {
        ChatService::new(
            PromptTemplate::new("Answer: {input}"),
            ConversationMemory::new(window),
            Arc::new(provider),
            Limiters::new(&LimitsConfig::default()),
            ConversationId::from("default"),
            100,
        )
    }

    #[tokio::test]
    async fn test_respond_records_both_turns() {
        let mut provider = MockLlmProvider::new();
        provider
            .expect_complete()
            .withf(|system_text, history| {
                system_text == "Answer: 2+2"
                    && history.len() == 1
                    && history[0].role() == Role::User
                    && history[0].content() == "2+2"
            })
            .times(1)
            .returning(|_, _| Ok("4".to_string()));

        let service = service_with(provider, 10);
        let id = ConversationId::from("default");

        let reply = service.respond(&id, "2+2").await.unwrap();
        assert_eq!(reply, "4");

        let history = service.memory().get(&id);
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].content(), "2+2");
        assert_eq!(history[1].role(), Role::Assistant);
        assert_eq!(history[1].content(), "4");
    }

    #[tokio::test]
    async fn test_history_sent_to_provider_is_trimmed() {
        let mut provider = MockLlmProvider::new();
        provider
            .expect_complete()
            .withf(|_, history| history.len() <= 3)
            .times(3)
            .returning(|_, history| Ok(format!("echo {}", history.len())));

        let service = service_with(provider, 3);
        let id = ConversationId::from("default");

        for question in ["a", "b", "c"] {
            service.respond(&id, question).await.unwrap();
        }

        let history: Vec<String> = service
            .memory()
            .get(&id)
            .iter()
            .map(|m| m.content().to_string())
            .collect();
        assert_eq!(history, vec!["echo 3", "c", "echo 3"]);
    }

    #[tokio::test]
    async fn test_blank_message_is_rejected_before_any_work() {
        let mut provider = MockLlmProvider::new();
        provider.expect_complete().never();

        let service = service_with(provider, 10);
        let id = ConversationId::from("default");

        let err = service.respond(&id, "   ").await.unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));

        let err = service.respond(&id, &"x".repeat(101)).await.unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));

        assert!(service.memory().get(&id).is_empty());
    }

    #[tokio::test]
    async fn test_provider_failure_keeps_user_turn_only() {
        let mut provider = MockLlmProvider::new();
        provider
            .expect_complete()
            .times(1)
            .returning(|_, _| Err(ProviderError::QuotaExceeded("rate limited".to_string())));

        let service = service_with(provider, 10);
        let id = ConversationId::from("default");

        let err = service.respond(&id, "hello").await.unwrap_err();
        assert!(matches!(err, ApiError::Provider(ProviderError::QuotaExceeded(_))));

        let history = service.memory().get(&id);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].role(), Role::User);
    }

    #[tokio::test]
    async fn test_busy_limiter_leaves_memory_untouched() {
        let mut provider = MockLlmProvider::new();
        provider.expect_complete().never();

        let limiters = Limiters::new(&LimitsConfig {
            llm_concurrency: 1,
            acquire_timeout_ms: 10,
        });
        let (held, _) = limiters.acquire_llm().await.unwrap();

        let service = ChatService::new(
            PromptTemplate::new("Answer: {input}"),
            ConversationMemory::new(10),
            Arc::new(provider),
            limiters,
            ConversationId::from("default"),
            100,
        );
        let id = ConversationId::from("default");

        for _ in 0..3 {
            let err = service.respond(&id, "hello").await.unwrap_err();
            assert!(matches!(err, ApiError::Busy(_)));
        }
        assert!(service.memory().get(&id).is_empty());
        assert_eq!(service.memory().conversation_count(), 0);

        drop(held);
    }

    #[tokio::test]
    async fn test_template_without_input_fails_render() {
        let mut provider = MockLlmProvider::new();
        provider.expect_complete().never();

        let service = ChatService::new(
            PromptTemplate::new("Context: {context}\nQ: {input}"),
            ConversationMemory::new(10),
            Arc::new(provider),
            Limiters::new(&LimitsConfig::default()),
            ConversationId::from("default"),
            100,
        );

        let err = service
            .respond(&ConversationId::from("default"), "hi")
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Template(_)));
    }

    #[test]
    fn test_resolve_conversation_falls_back_to_default() {
        let service = service_with(MockLlmProvider::new(), 10);

        assert_eq!(service.resolve_conversation(None).as_str(), "default");
        assert_eq!(service.resolve_conversation(Some("  ")).as_str(), "default");
        assert_eq!(service.resolve_conversation(Some(" user-42 ")).as_str(), "user-42");
    }
}
