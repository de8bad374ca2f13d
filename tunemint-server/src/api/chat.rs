//! Community chat

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use tunemint_common::events::AppEvent;
use tunemint_common::models::{ChatMessage, TradeOffer};
use tunemint_common::wallet::normalize_address;

use crate::error::{ApiError, ApiResult};
use crate::AppState;

const DEFAULT_LIMIT: usize = 50;
const MAX_LIMIT: usize = 200;
const MAX_TEXT_CHARS: usize = 1000;
/// Messages kept in the history file
const HISTORY_CAP: usize = 500;

#[derive(Debug, Deserialize)]
pub struct ChatQuery {
    pub limit: Option<usize>,
    pub since: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct ChatPage {
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Deserialize)]
pub struct PostMessage {
    pub sender: String,
    pub text: String,
    #[serde(default)]
    pub trade: Option<TradeOffer>,
}

/// GET /api/community/chat
pub async fn get_messages(
    State(state): State<AppState>,
    Query(query): Query<ChatQuery>,
) -> ApiResult<Json<ChatPage>> {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let log = state.tables.chat.load().await?;
    Ok(Json(ChatPage {
        messages: log.recent(limit, query.since),
    }))
}

/// POST /api/community/chat
pub async fn post_message(
    State(state): State<AppState>,
    Json(req): Json<PostMessage>,
) -> ApiResult<(StatusCode, Json<ChatMessage>)> {
    let sender = normalize_address(&req.sender)?;

    let text = req.text.trim().to_string();
    if text.is_empty() {
        return Err(ApiError::BadRequest("Message text is required".to_string()));
    }
    if text.chars().count() > MAX_TEXT_CHARS {
        return Err(ApiError::BadRequest(format!(
            "Message longer than {} characters",
            MAX_TEXT_CHARS
        )));
    }
    if let Some(trade) = &req.trade {
        if !(trade.price.is_finite() && trade.price > 0.0) {
            return Err(ApiError::BadRequest("Trade price must be positive".to_string()));
        }
    }

    state
        .chat_limiter
        .check(&format!("chat:{}", sender))
        .await
        .into_result()?;

    let message = ChatMessage {
        id: Uuid::new_v4(),
        sender,
        text,
        timestamp: Utc::now(),
        trade: req.trade,
    };

    let stored = message.clone();
    state
        .tables
        .chat
        .update(move |log| {
            log.push(stored, HISTORY_CAP);
            Ok(())
        })
        .await?;

    debug!(message_id = %message.id, sender = %message.sender, "Chat message posted");
    state.event_bus.emit_lossy(AppEvent::ChatPosted {
        message_id: message.id,
        sender: message.sender.clone(),
        timestamp: message.timestamp,
    });

    Ok((StatusCode::CREATED, Json(message)))
}
