//! services/api/src/web/chat.rs
//!
//! Handlers for practice chats and their message history.

use crate::error::ApiResult;
use crate::web::{middleware::Identity, state::AppState};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    Extension,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use talki_core::{
    domain::{Chat, Message},
    ports::{PortError, PortResult},
};
use tracing::{error, info};
use utoipa::ToSchema;
use uuid::Uuid;

/// First message of every chat, stored with the `system` sender.
const GREETING: &str = "Hello";

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateChatRequest {
    pub material_id: Uuid,
    #[serde(default)]
    pub detail: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MessageResponse {
    pub id: Uuid,
    pub chat_id: Uuid,
    pub uid: Option<String>,
    pub content: String,
    /// `user`, `bot` or `system`.
    pub sender_type: String,
    pub created_at: DateTime<Utc>,
}

impl From<Message> for MessageResponse {
    fn from(message: Message) -> Self {
        Self {
            id: message.id,
            chat_id: message.chat_id,
            uid: message.owner_uid,
            content: message.content,
            sender_type: message.sender.to_string(),
            created_at: message.created_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ChatResponse {
    pub id: Uuid,
    pub material_id: Uuid,
    pub uid: String,
    pub detail: String,
    pub pending: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Only filled in where the endpoint says so.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub messages: Option<Vec<MessageResponse>>,
}

impl ChatResponse {
    fn new(chat: Chat, messages: Option<Vec<Message>>) -> Self {
        Self {
            id: chat.id,
            material_id: chat.material_id,
            uid: chat.owner_uid,
            detail: chat.detail,
            pending: chat.pending,
            created_at: chat.created_at,
            updated_at: chat.updated_at,
            messages: messages.map(|m| m.into_iter().map(MessageResponse::from).collect()),
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SendMessageRequest {
    pub content: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SendMessageResponse {
    pub response: String,
}

/// Loads a chat for reading. Someone else's chat looks exactly like a missing one.
async fn owned_chat(app_state: &AppState, chat_id: Uuid, owner_uid: &str) -> PortResult<Chat> {
    let chat = app_state.chats.get_chat_by_id(chat_id).await?;
    if chat.owner_uid != owner_uid {
        return Err(PortError::NotFound(format!("chat {}", chat_id)));
    }
    Ok(chat)
}

/// Open a chat about one of the caller's materials.
#[utoipa::path(
    post,
    path = "/chat",
    request_body = CreateChatRequest,
    responses(
        (status = 201, description = "Chat created with its greeting", body = ChatResponse),
        (status = 404, description = "No such material for this user")
    )
)]
pub async fn create_chat_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<CreateChatRequest>,
) -> ApiResult<(StatusCode, Json<ChatResponse>)> {
    let material = app_state
        .materials
        .get_material(req.material_id, &identity.0)
        .await?;

    let detail = req.detail.unwrap_or_else(|| material.title.clone());
    let chat = app_state
        .chats
        .create_chat(material.id, &identity.0, &detail)
        .await?;
    let greeting = match app_state
        .messages
        .create_message(Message::system(chat.id, &identity.0, GREETING))
        .await
    {
        Ok(greeting) => greeting,
        Err(e) => {
            // A chat without its greeting is not kept.
            if let Err(cleanup) = app_state.chats.delete_chat(chat.id).await {
                error!("Failed to remove unseeded chat {}: {}", chat.id, cleanup);
            }
            return Err(e.into());
        }
    };

    info!("Chat {} opened on material {} for {}", chat.id, material.id, identity.0);
    Ok((
        StatusCode::CREATED,
        Json(ChatResponse::new(chat, Some(vec![greeting]))),
    ))
}

/// The chat attached to a material.
#[utoipa::path(
    get,
    path = "/materials/{id}/chat",
    params(("id" = Uuid, Path, description = "Material id")),
    responses(
        (status = 200, description = "The material's chat", body = ChatResponse),
        (status = 404, description = "No chat for this material")
    )
)]
pub async fn get_chat_by_material_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(material_id): Path<Uuid>,
) -> ApiResult<Json<ChatResponse>> {
    let chat = app_state
        .chats
        .get_chat_by_material(material_id, &identity.0)
        .await?;
    Ok(Json(ChatResponse::new(chat, None)))
}

#[utoipa::path(
    get,
    path = "/chat/{chat_id}",
    params(("chat_id" = Uuid, Path, description = "Chat id")),
    responses(
        (status = 200, description = "The chat with its full history", body = ChatResponse),
        (status = 404, description = "No such chat for this user")
    )
)]
pub async fn get_chat_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(chat_id): Path<Uuid>,
) -> ApiResult<Json<ChatResponse>> {
    let chat = owned_chat(&app_state, chat_id, &identity.0).await?;
    let messages = app_state.messages.get_messages(chat.id).await?;
    Ok(Json(ChatResponse::new(chat, Some(messages))))
}

/// A chat's messages, oldest first.
#[utoipa::path(
    get,
    path = "/chat/{chat_id}/messages",
    params(("chat_id" = Uuid, Path, description = "Chat id")),
    responses(
        (status = 200, description = "Messages, oldest first", body = [MessageResponse]),
        (status = 404, description = "No such chat for this user")
    )
)]
pub async fn list_messages_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(chat_id): Path<Uuid>,
) -> ApiResult<Json<Vec<MessageResponse>>> {
    let chat = owned_chat(&app_state, chat_id, &identity.0).await?;
    let messages = app_state.messages.get_messages(chat.id).await?;
    Ok(Json(messages.into_iter().map(MessageResponse::from).collect()))
}

/// Send one user message and wait for the bot's reply.
#[utoipa::path(
    post,
    path = "/chat/{chat_id}/chat",
    params(("chat_id" = Uuid, Path, description = "Chat id")),
    request_body = SendMessageRequest,
    responses(
        (status = 200, description = "The bot's reply", body = SendMessageResponse),
        (status = 400, description = "Blank content"),
        (status = 403, description = "Chat belongs to another user"),
        (status = 404, description = "No such chat"),
        (status = 502, description = "The generation service failed or timed out")
    )
)]
pub async fn send_message_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(chat_id): Path<Uuid>,
    Json(req): Json<SendMessageRequest>,
) -> ApiResult<Json<SendMessageResponse>> {
    let response = app_state
        .chat_orchestrator
        .send_message(chat_id, &identity.0, &req.content)
        .await?;
    Ok(Json(SendMessageResponse { response }))
}
