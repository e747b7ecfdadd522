use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use std::sync::Arc;
use tracing::{debug, info};

use crate::models::chat::{ChatRequest, ChatResponse};
use crate::services::ChatService;
use crate::utils::error::ApiError;

/// POST /chat
pub async fn chat_handler(
    State(chat_service): State<Arc<ChatService>>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, ApiError> {
    let Json(request) = payload.map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;

    let request_id = uuid::Uuid::new_v4();
    let conversation_id = chat_service.resolve_conversation(request.conversation_id.as_deref());

    info!(
        "Chat request: id={}, conversation={}, message_chars={}",
        request_id,
        conversation_id,
        request.message_chars()
    );
    debug!("Chat request {} message: {}", request_id, request.message);

    let result = chat_service
        .respond(&conversation_id, &request.message)
        .await?;

    Ok(Json(ChatResponse { result }))
}
