//! crates/talki_core/src/chat_turn.rs
//!
//! Drives one user turn of a chat: the user's message is stored first, the chat
//! is marked pending, the history is replayed to the generation service, and the
//! reply is stored as a bot message. A turn always leaves the chat not pending.

use crate::domain::Message;
use crate::locks::KeyedLocks;
use crate::ports::{ChatStore, GenerationService, MessageStore, PortError, PortResult};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

#[derive(Clone)]
pub struct ChatOrchestrator {
    chats: Arc<dyn ChatStore>,
    messages: Arc<dyn MessageStore>,
    generator: Arc<dyn GenerationService>,
    reply_timeout: Duration,
    locks: Arc<KeyedLocks>,
}

impl ChatOrchestrator {
    pub fn new(
        chats: Arc<dyn ChatStore>,
        messages: Arc<dyn MessageStore>,
        generator: Arc<dyn GenerationService>,
        reply_timeout: Duration,
    ) -> Self {
        Self {
            chats,
            messages,
            generator,
            reply_timeout,
            locks: Arc::new(KeyedLocks::new()),
        }
    }

    /// Processes one message from `owner_uid` on `chat_id` and returns the bot's reply.
    ///
    /// Turns on the same chat are serialized. A failed generation leaves the user's
    /// message stored but adds no bot message. Once started, a turn runs to the end
    /// even if the returned future is dropped.
    pub async fn send_message(
        &self,
        chat_id: Uuid,
        owner_uid: &str,
        content: &str,
    ) -> PortResult<String> {
        if content.trim().is_empty() {
            return Err(PortError::Validation(
                "message content cannot be empty".to_string(),
            ));
        }

        let span = info_span!("chat_turn", %chat_id, owner = %owner_uid);
        let turn = self.clone();
        let owner_uid = owner_uid.to_string();
        let content = content.to_string();

        // The turn runs detached so a dropped caller cannot stop it between
        // setting and clearing the pending flag.
        let handle = tokio::spawn(
            async move { turn.run_turn(chat_id, &owner_uid, &content).await }.instrument(span),
        );
        match handle.await {
            Ok(result) => result,
            Err(e) => {
                error!("Chat turn for {} died: {}", chat_id, e);
                self.clear_pending(chat_id).await;
                Err(PortError::Unexpected(format!("chat turn failed: {}", e)))
            }
        }
    }

    async fn run_turn(&self, chat_id: Uuid, owner_uid: &str, content: &str) -> PortResult<String> {
        let _guard = self.locks.lock(chat_id).await;

        let chat = self.chats.get_chat_by_id(chat_id).await?;
        if chat.owner_uid != owner_uid {
            error!("Chat {} does not belong to {}", chat_id, owner_uid);
            return Err(PortError::Unauthorized);
        }

        // Loaded before the new message is stored so it is only sent once.
        let history = self.messages.get_messages(chat_id).await?;

        self.messages
            .create_message(Message::from_user(chat_id, owner_uid, content))
            .await?;
        info!("User message stored.");

        self.chats.set_chat_pending(chat_id, true).await?;

        let started = Instant::now();
        let reply = match timeout(
            self.reply_timeout,
            self.generator.send_message(&history, content),
        )
        .await
        {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => {
                self.clear_pending(chat_id).await;
                error!("Generation failed for chat {}: {}", chat_id, e);
                return Err(match e {
                    PortError::Generation(_) => e,
                    other => PortError::Generation(other.to_string()),
                });
            }
            Err(_) => {
                self.clear_pending(chat_id).await;
                error!(
                    "Generation for chat {} timed out after {:?}",
                    chat_id, self.reply_timeout
                );
                return Err(PortError::Generation(format!(
                    "no reply within {:?}",
                    self.reply_timeout
                )));
            }
        };
        info!("⏱️ Reply took: {:?}", started.elapsed());

        let stored = self
            .messages
            .create_message(Message::from_bot(chat_id, &reply))
            .await;
        self.clear_pending(chat_id).await;
        stored?;

        Ok(reply)
    }

    async fn clear_pending(&self, chat_id: Uuid) {
        if let Err(e) = self.chats.set_chat_pending(chat_id, false).await {
            error!("Failed to clear pending flag on chat {}: {}", chat_id, e);
        }
    }
}
