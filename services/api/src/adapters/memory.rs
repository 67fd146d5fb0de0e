//! services/api/src/adapters/memory.rs
//!
//! An in-process implementation of every store port. Used when no
//! `DATABASE_URL` is configured, and as the store behind the test suite.
//! Nothing survives a restart.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use talki_core::domain::{
    Chat, Material, MaterialStatus, MaterialUpdate, Message, NewMaterial, Phrase,
};
use talki_core::ports::{
    ChatStore, IdentityProvider, MaterialStore, MessageStore, PhraseStore, PortError, PortResult,
};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    materials: HashMap<Uuid, Material>,
    phrases: Vec<Phrase>,
    chats: HashMap<Uuid, Chat>,
    /// Insertion order is the message order.
    messages: Vec<Message>,
    tokens: HashMap<String, String>,
}

/// A store that keeps everything in memory behind a single lock.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `token` resolve to `owner_uid`.
    pub async fn register_token(&self, token: &str, owner_uid: &str) {
        self.tables
            .write()
            .await
            .tokens
            .insert(token.to_string(), owner_uid.to_string());
    }
}

fn material_not_found(material_id: Uuid) -> PortError {
    PortError::NotFound(format!("Material {} not found", material_id))
}

fn chat_not_found(chat_id: Uuid) -> PortError {
    PortError::NotFound(format!("Chat {} not found", chat_id))
}

//=========================================================================================
// `MaterialStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl MaterialStore for InMemoryStore {
    async fn create_material(&self, material: NewMaterial) -> PortResult<Material> {
        let now = Utc::now();
        let material = Material {
            id: Uuid::new_v4(),
            owner_uid: material.owner_uid,
            title: material.title,
            content: material.content,
            status: MaterialStatus::Processing,
            created_at: now,
            updated_at: now,
        };
        self.tables
            .write()
            .await
            .materials
            .insert(material.id, material.clone());
        Ok(material)
    }

    async fn get_material(&self, material_id: Uuid, owner_uid: &str) -> PortResult<Material> {
        self.tables
            .read()
            .await
            .materials
            .get(&material_id)
            .filter(|m| m.owner_uid == owner_uid)
            .cloned()
            .ok_or_else(|| material_not_found(material_id))
    }

    async fn list_materials(
        &self,
        owner_uid: &str,
        title_search: Option<&str>,
    ) -> PortResult<Vec<Material>> {
        let needle = title_search.map(str::to_lowercase);
        let tables = self.tables.read().await;
        let mut materials: Vec<Material> = tables
            .materials
            .values()
            .filter(|m| m.owner_uid == owner_uid)
            .filter(|m| match &needle {
                Some(needle) => m.title.to_lowercase().contains(needle.as_str()),
                None => true,
            })
            .cloned()
            .collect();
        materials.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(materials)
    }

    async fn update_material(
        &self,
        material_id: Uuid,
        owner_uid: &str,
        update: MaterialUpdate,
    ) -> PortResult<Material> {
        let mut tables = self.tables.write().await;
        let material = tables
            .materials
            .get_mut(&material_id)
            .filter(|m| m.owner_uid == owner_uid)
            .ok_or_else(|| material_not_found(material_id))?;
        if let Some(title) = update.title {
            material.title = title;
        }
        if let Some(content) = update.content {
            material.content = content;
        }
        material.updated_at = Utc::now();
        Ok(material.clone())
    }

    async fn delete_material(&self, material_id: Uuid, owner_uid: &str) -> PortResult<()> {
        let mut tables = self.tables.write().await;
        let owned = tables
            .materials
            .get(&material_id)
            .is_some_and(|m| m.owner_uid == owner_uid);
        if !owned {
            return Err(material_not_found(material_id));
        }

        tables.materials.remove(&material_id);
        tables.phrases.retain(|p| p.material_id != material_id);
        let chat_ids: Vec<Uuid> = tables
            .chats
            .values()
            .filter(|c| c.material_id == material_id)
            .map(|c| c.id)
            .collect();
        tables.chats.retain(|_, c| c.material_id != material_id);
        tables.messages.retain(|m| !chat_ids.contains(&m.chat_id));
        Ok(())
    }

    async fn update_material_status(
        &self,
        material_id: Uuid,
        status: MaterialStatus,
    ) -> PortResult<()> {
        let mut tables = self.tables.write().await;
        let material = tables
            .materials
            .get_mut(&material_id)
            .ok_or_else(|| material_not_found(material_id))?;
        material.status = status;
        material.updated_at = Utc::now();
        Ok(())
    }

    async fn get_material_status(
        &self,
        material_id: Uuid,
        owner_uid: &str,
    ) -> PortResult<MaterialStatus> {
        self.get_material(material_id, owner_uid)
            .await
            .map(|m| m.status)
    }
}

//=========================================================================================
// `PhraseStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl PhraseStore for InMemoryStore {
    async fn create_phrase(&self, phrase: Phrase) -> PortResult<()> {
        let mut tables = self.tables.write().await;
        if !tables.materials.contains_key(&phrase.material_id) {
            return Err(material_not_found(phrase.material_id));
        }
        tables.phrases.push(phrase);
        Ok(())
    }

    async fn get_phrases_for_material(&self, material_id: Uuid) -> PortResult<Vec<Phrase>> {
        Ok(self
            .tables
            .read()
            .await
            .phrases
            .iter()
            .filter(|p| p.material_id == material_id)
            .cloned()
            .collect())
    }

    async fn delete_phrases_for_material(&self, material_id: Uuid) -> PortResult<u64> {
        let mut tables = self.tables.write().await;
        let before = tables.phrases.len();
        tables.phrases.retain(|p| p.material_id != material_id);
        Ok((before - tables.phrases.len()) as u64)
    }
}

//=========================================================================================
// `ChatStore` and `MessageStore` Trait Implementations
//=========================================================================================

#[async_trait]
impl ChatStore for InMemoryStore {
    async fn create_chat(
        &self,
        material_id: Uuid,
        owner_uid: &str,
        detail: &str,
    ) -> PortResult<Chat> {
        let mut tables = self.tables.write().await;
        if !tables.materials.contains_key(&material_id) {
            return Err(material_not_found(material_id));
        }
        let now = Utc::now();
        let chat = Chat {
            id: Uuid::new_v4(),
            material_id,
            owner_uid: owner_uid.to_string(),
            detail: detail.to_string(),
            pending: false,
            created_at: now,
            updated_at: now,
        };
        tables.chats.insert(chat.id, chat.clone());
        Ok(chat)
    }

    async fn get_chat_by_id(&self, chat_id: Uuid) -> PortResult<Chat> {
        self.tables
            .read()
            .await
            .chats
            .get(&chat_id)
            .cloned()
            .ok_or_else(|| chat_not_found(chat_id))
    }

    async fn get_chat_by_material(&self, material_id: Uuid, owner_uid: &str) -> PortResult<Chat> {
        self.tables
            .read()
            .await
            .chats
            .values()
            .filter(|c| c.material_id == material_id && c.owner_uid == owner_uid)
            .min_by_key(|c| c.created_at)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("No chat for material {}", material_id)))
    }

    async fn set_chat_pending(&self, chat_id: Uuid, pending: bool) -> PortResult<()> {
        let mut tables = self.tables.write().await;
        let chat = tables
            .chats
            .get_mut(&chat_id)
            .ok_or_else(|| chat_not_found(chat_id))?;
        chat.pending = pending;
        chat.updated_at = Utc::now();
        Ok(())
    }

    async fn delete_chat(&self, chat_id: Uuid) -> PortResult<()> {
        let mut tables = self.tables.write().await;
        if tables.chats.remove(&chat_id).is_none() {
            return Err(chat_not_found(chat_id));
        }
        tables.messages.retain(|m| m.chat_id != chat_id);
        Ok(())
    }
}

#[async_trait]
impl MessageStore for InMemoryStore {
    async fn create_message(&self, message: Message) -> PortResult<Message> {
        let mut tables = self.tables.write().await;
        if !tables.chats.contains_key(&message.chat_id) {
            return Err(chat_not_found(message.chat_id));
        }
        tables.messages.push(message.clone());
        Ok(message)
    }

    async fn get_messages(&self, chat_id: Uuid) -> PortResult<Vec<Message>> {
        Ok(self
            .tables
            .read()
            .await
            .messages
            .iter()
            .filter(|m| m.chat_id == chat_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl IdentityProvider for InMemoryStore {
    async fn resolve_identity(&self, token: &str) -> PortResult<String> {
        self.tables
            .read()
            .await
            .tokens
            .get(token)
            .cloned()
            .ok_or(PortError::Unauthorized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use talki_core::domain::{Importance, SenderType};

    fn new_material(owner: &str, title: &str) -> NewMaterial {
        NewMaterial {
            owner_uid: owner.to_string(),
            title: title.to_string(),
            content: "The sky is blue.".to_string(),
        }
    }

    fn phrase_for(material_id: Uuid, text: &str) -> Phrase {
        Phrase {
            id: Uuid::new_v4(),
            material_id,
            text: text.to_string(),
            importance: Importance::High,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn materials_are_scoped_to_their_owner() {
        let store = InMemoryStore::new();
        let material = store.create_material(new_material("alice", "Sky")).await.unwrap();
        assert_eq!(material.status, MaterialStatus::Processing);

        assert!(store.get_material(material.id, "alice").await.is_ok());
        assert!(matches!(
            store.get_material(material.id, "bob").await,
            Err(PortError::NotFound(_))
        ));
        assert!(store.list_materials("bob", None).await.unwrap().is_empty());
        assert!(matches!(
            store.delete_material(material.id, "bob").await,
            Err(PortError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn title_search_is_case_insensitive() {
        let store = InMemoryStore::new();
        store.create_material(new_material("alice", "Blue Sky")).await.unwrap();
        store.create_material(new_material("alice", "Green Grass")).await.unwrap();

        let found = store.list_materials("alice", Some("sky")).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].title, "Blue Sky");
        assert_eq!(store.list_materials("alice", None).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn partial_updates_keep_untouched_fields() {
        let store = InMemoryStore::new();
        let material = store.create_material(new_material("alice", "Sky")).await.unwrap();

        let updated = store
            .update_material(
                material.id,
                "alice",
                MaterialUpdate {
                    title: Some("Ocean".to_string()),
                    content: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.title, "Ocean");
        assert_eq!(updated.content, "The sky is blue.");
    }

    #[tokio::test]
    async fn deleting_a_material_cascades() {
        let store = InMemoryStore::new();
        let material = store.create_material(new_material("alice", "Sky")).await.unwrap();
        store.create_phrase(phrase_for(material.id, "sky")).await.unwrap();
        let chat = store.create_chat(material.id, "alice", "").await.unwrap();
        store
            .create_message(Message::from_user(chat.id, "alice", "Hello"))
            .await
            .unwrap();

        store.delete_material(material.id, "alice").await.unwrap();

        assert!(store.get_phrases_for_material(material.id).await.unwrap().is_empty());
        assert!(store.get_chat_by_id(chat.id).await.is_err());
        assert!(store.get_messages(chat.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn phrases_require_an_existing_material() {
        let store = InMemoryStore::new();
        assert!(matches!(
            store.create_phrase(phrase_for(Uuid::new_v4(), "orphan")).await,
            Err(PortError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn messages_keep_insertion_order() {
        let store = InMemoryStore::new();
        let material = store.create_material(new_material("alice", "Sky")).await.unwrap();
        let chat = store.create_chat(material.id, "alice", "").await.unwrap();

        for (i, text) in ["one", "two", "three"].iter().enumerate() {
            let message = if i % 2 == 0 {
                Message::from_user(chat.id, "alice", text)
            } else {
                Message::from_bot(chat.id, text)
            };
            store.create_message(message).await.unwrap();
        }

        let history = store.get_messages(chat.id).await.unwrap();
        let contents: Vec<&str> = history.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["one", "two", "three"]);
        assert_eq!(history[1].sender, SenderType::Bot);
    }

    #[tokio::test]
    async fn messages_require_an_existing_chat() {
        let store = InMemoryStore::new();
        assert!(matches!(
            store
                .create_message(Message::from_user(Uuid::new_v4(), "alice", "Hello"))
                .await,
            Err(PortError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn deleting_a_chat_drops_its_messages() {
        let store = InMemoryStore::new();
        let material = store.create_material(new_material("alice", "Sky")).await.unwrap();
        let chat = store.create_chat(material.id, "alice", "Sky").await.unwrap();
        store
            .create_message(Message::system(chat.id, "alice", "Hello"))
            .await
            .unwrap();

        store.delete_chat(chat.id).await.unwrap();

        assert!(matches!(
            store.get_chat_by_id(chat.id).await,
            Err(PortError::NotFound(_))
        ));
        assert!(store.get_messages(chat.id).await.unwrap().is_empty());
        assert!(matches!(
            store.delete_chat(chat.id).await,
            Err(PortError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn tokens_resolve_to_their_owner() {
        let store = InMemoryStore::new();
        store.register_token("secret", "alice").await;
        assert_eq!(store.resolve_identity("secret").await.unwrap(), "alice");
        assert_eq!(
            store.resolve_identity("unknown").await,
            Err(PortError::Unauthorized)
        );
    }
}
