use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::services::ChatService;

#[derive(Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub status: String,
    pub conversations: usize,
    pub messages: usize,
    pub window_size: usize,
}

pub async fn health_check() -> (StatusCode, Json<HealthResponse>) {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "healthy".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }),
    )
}

pub async fn readiness_check(
    State(chat_service): State<Arc<ChatService>>,
) -> (StatusCode, Json<ReadinessResponse>) {
    let stats = chat_service.memory().stats();
    (
        StatusCode::OK,
        Json(ReadinessResponse {
            status: "ready".to_string(),
            conversations: stats.conversations,
            messages: stats.messages,
            window_size: stats.window_size,
        }),
    )
}
