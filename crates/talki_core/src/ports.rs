//! crates/talki_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of specific external implementations like databases or APIs.

use crate::domain::{Chat, Material, MaterialStatus, MaterialUpdate, Message, NewMaterial, Phrase};
use async_trait::async_trait;
use uuid::Uuid;

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PortError {
    #[error("Invalid input: {0}")]
    Validation(String),
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Generation service failed: {0}")]
    Generation(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Store Ports
//=========================================================================================

#[async_trait]
pub trait MaterialStore: Send + Sync {
    /// Persists a new material with status `processing`.
    async fn create_material(&self, material: NewMaterial) -> PortResult<Material>;

    /// Fetches a material owned by `owner_uid`. A material owned by someone else
    /// is reported as `NotFound`.
    async fn get_material(&self, material_id: Uuid, owner_uid: &str) -> PortResult<Material>;

    async fn list_materials(
        &self,
        owner_uid: &str,
        title_search: Option<&str>,
    ) -> PortResult<Vec<Material>>;

    async fn update_material(
        &self,
        material_id: Uuid,
        owner_uid: &str,
        update: MaterialUpdate,
    ) -> PortResult<Material>;

    /// Deletes the material together with its phrases, chats and messages.
    async fn delete_material(&self, material_id: Uuid, owner_uid: &str) -> PortResult<()>;

    /// Single-row atomic write of the status field.
    async fn update_material_status(
        &self,
        material_id: Uuid,
        status: MaterialStatus,
    ) -> PortResult<()>;

    async fn get_material_status(
        &self,
        material_id: Uuid,
        owner_uid: &str,
    ) -> PortResult<MaterialStatus>;
}

#[async_trait]
pub trait PhraseStore: Send + Sync {
    async fn create_phrase(&self, phrase: Phrase) -> PortResult<()>;

    async fn get_phrases_for_material(&self, material_id: Uuid) -> PortResult<Vec<Phrase>>;

    /// Removes every phrase attached to the material, returning how many were deleted.
    async fn delete_phrases_for_material(&self, material_id: Uuid) -> PortResult<u64>;
}

#[async_trait]
pub trait ChatStore: Send + Sync {
    async fn create_chat(
        &self,
        material_id: Uuid,
        owner_uid: &str,
        detail: &str,
    ) -> PortResult<Chat>;

    /// Fetches a chat regardless of owner; callers check ownership themselves.
    async fn get_chat_by_id(&self, chat_id: Uuid) -> PortResult<Chat>;

    async fn get_chat_by_material(&self, material_id: Uuid, owner_uid: &str) -> PortResult<Chat>;

    /// Single-row atomic write of the pending flag.
    async fn set_chat_pending(&self, chat_id: Uuid, pending: bool) -> PortResult<()>;

    /// Removes a chat and its messages.
    async fn delete_chat(&self, chat_id: Uuid) -> PortResult<()>;
}

#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Appends a message. Fails with `NotFound` if the chat does not exist.
    async fn create_message(&self, message: Message) -> PortResult<Message>;

    /// Returns the chat's messages, oldest first.
    async fn get_messages(&self, chat_id: Uuid) -> PortResult<Vec<Message>>;
}

//=========================================================================================
// Service Ports
//=========================================================================================

#[async_trait]
pub trait GenerationService: Send + Sync {
    /// Produces study phrases from a block of source text.
    ///
    /// The reply must be a well-formed list of strings; anything else is a
    /// `PortError::Generation`, never a partial result.
    async fn generate_phrases(&self, source_text: &str) -> PortResult<Vec<String>>;

    /// Replays `history` as the conversation so far, appends `content` as the newest
    /// user turn, and returns exactly one reply.
    async fn send_message(&self, history: &[Message], content: &str) -> PortResult<String>;
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Maps an authentication token to the owner identity it belongs to.
    async fn resolve_identity(&self, token: &str) -> PortResult<String>;
}
