use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

use chat_api_server::config::Settings;
use chat_api_server::logging::init_logger;
use chat_api_server::models::ConversationId;
use chat_api_server::routes::build_router;
use chat_api_server::services::prompt_template::INPUT_VARIABLE;
use chat_api_server::services::{ChatService, ConversationMemory, LlmService, PromptTemplate};
use chat_api_server::shutdown::shutdown_signal;
use chat_api_server::state::AppState;
use chat_api_server::utils::Limiters;

#[tokio::main]
async fn main() -> Result<()> {
    init_logger()?;

    info!("🚀 Starting Chat API Server...");

    let settings = Settings::load().context("failed to load configuration")?;
    info!("✅ Configuration loaded");

    let template = PromptTemplate::load(&settings.prompts.system_prompt_path, &[INPUT_VARIABLE])?;
    let memory = ConversationMemory::new(settings.memory.window_size);
    let llm_service = Arc::new(LlmService::new(settings.llm.clone())?);
    let limiters = Limiters::new(&settings.limits);

    let chat_service = Arc::new(ChatService::new(
        template,
        memory,
        llm_service,
        limiters,
        ConversationId::new(settings.memory.default_conversation_id.clone()),
        settings.chat.max_message_chars,
    ));

    let app = build_router(AppState::new(chat_service));

    let addr = SocketAddr::from((
        settings.server.host.parse::<std::net::IpAddr>()?,
        settings.server.port,
    ));

    info!("🎯 Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}
