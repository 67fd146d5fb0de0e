//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the store ports from the `core` crate. It handles all interactions
//! with the PostgreSQL database using `sqlx`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use talki_core::domain::{
    Chat, Material, MaterialStatus, MaterialUpdate, Message, NewMaterial, Phrase,
};
use talki_core::ports::{
    ChatStore, IdentityProvider, MaterialStore, MessageStore, PhraseStore, PortError, PortResult,
};
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements every store port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

fn not_found_or_unexpected(what: String) -> impl FnOnce(sqlx::Error) -> PortError {
    move |e| match e {
        sqlx::Error::RowNotFound => PortError::NotFound(what),
        _ => PortError::Unexpected(e.to_string()),
    }
}

fn parse_column<T>(raw: &str) -> PortResult<T>
where
    T: std::str::FromStr<Err = String>,
{
    raw.parse::<T>().map_err(PortError::Unexpected)
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

const MATERIAL_COLUMNS: &str = "id, owner_uid, title, content, status, created_at, updated_at";
const CHAT_COLUMNS: &str = "id, material_id, owner_uid, detail, pending, created_at, updated_at";
const MESSAGE_COLUMNS: &str = "id, chat_id, owner_uid, content, sender_type, created_at";

#[derive(FromRow)]
struct MaterialRecord {
    id: Uuid,
    owner_uid: String,
    title: String,
    content: String,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}
impl MaterialRecord {
    fn to_domain(self) -> PortResult<Material> {
        Ok(Material {
            id: self.id,
            owner_uid: self.owner_uid,
            title: self.title,
            content: self.content,
            status: parse_column(&self.status)?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(FromRow)]
struct PhraseRecord {
    id: Uuid,
    material_id: Uuid,
    text: String,
    importance: String,
    created_at: DateTime<Utc>,
}
impl PhraseRecord {
    fn to_domain(self) -> PortResult<Phrase> {
        Ok(Phrase {
            id: self.id,
            material_id: self.material_id,
            text: self.text,
            importance: parse_column(&self.importance)?,
            created_at: self.created_at,
        })
    }
}

#[derive(FromRow)]
struct ChatRecord {
    id: Uuid,
    material_id: Uuid,
    owner_uid: String,
    detail: String,
    pending: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}
impl ChatRecord {
    fn to_domain(self) -> Chat {
        Chat {
            id: self.id,
            material_id: self.material_id,
            owner_uid: self.owner_uid,
            detail: self.detail,
            pending: self.pending,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(FromRow)]
struct MessageRecord {
    id: Uuid,
    chat_id: Uuid,
    owner_uid: Option<String>,
    content: String,
    sender_type: String,
    created_at: DateTime<Utc>,
}
impl MessageRecord {
    fn to_domain(self) -> PortResult<Message> {
        Ok(Message {
            id: self.id,
            chat_id: self.chat_id,
            owner_uid: self.owner_uid,
            content: self.content,
            sender: parse_column(&self.sender_type)?,
            created_at: self.created_at,
        })
    }
}

//=========================================================================================
// `MaterialStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl MaterialStore for DbAdapter {
    async fn create_material(&self, material: NewMaterial) -> PortResult<Material> {
        let record = sqlx::query_as::<_, MaterialRecord>(&format!(
            "INSERT INTO materials (id, owner_uid, title, content, status) VALUES ($1, $2, $3, $4, $5) RETURNING {}",
            MATERIAL_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(&material.owner_uid)
        .bind(&material.title)
        .bind(&material.content)
        .bind(MaterialStatus::Processing.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;
        record.to_domain()
    }

    async fn get_material(&self, material_id: Uuid, owner_uid: &str) -> PortResult<Material> {
        let record = sqlx::query_as::<_, MaterialRecord>(&format!(
            "SELECT {} FROM materials WHERE id = $1 AND owner_uid = $2",
            MATERIAL_COLUMNS
        ))
        .bind(material_id)
        .bind(owner_uid)
        .fetch_one(&self.pool)
        .await
        .map_err(not_found_or_unexpected(format!("Material {} not found", material_id)))?;
        record.to_domain()
    }

    async fn list_materials(
        &self,
        owner_uid: &str,
        title_search: Option<&str>,
    ) -> PortResult<Vec<Material>> {
        let records = sqlx::query_as::<_, MaterialRecord>(&format!(
            "SELECT {} FROM materials WHERE owner_uid = $1 AND ($2::TEXT IS NULL OR title ILIKE '%' || $2 || '%') ORDER BY created_at DESC",
            MATERIAL_COLUMNS
        ))
        .bind(owner_uid)
        .bind(title_search)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        records.into_iter().map(|r| r.to_domain()).collect()
    }

    async fn update_material(
        &self,
        material_id: Uuid,
        owner_uid: &str,
        update: MaterialUpdate,
    ) -> PortResult<Material> {
        let record = sqlx::query_as::<_, MaterialRecord>(&format!(
            "UPDATE materials SET title = COALESCE($3, title), content = COALESCE($4, content), updated_at = now() WHERE id = $1 AND owner_uid = $2 RETURNING {}",
            MATERIAL_COLUMNS
        ))
        .bind(material_id)
        .bind(owner_uid)
        .bind(update.title)
        .bind(update.content)
        .fetch_one(&self.pool)
        .await
        .map_err(not_found_or_unexpected(format!("Material {} not found", material_id)))?;
        record.to_domain()
    }

    async fn delete_material(&self, material_id: Uuid, owner_uid: &str) -> PortResult<()> {
        // Phrases, chats and messages go with it through ON DELETE CASCADE.
        let result = sqlx::query("DELETE FROM materials WHERE id = $1 AND owner_uid = $2")
            .bind(material_id)
            .bind(owner_uid)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Material {} not found", material_id)));
        }
        Ok(())
    }

    async fn update_material_status(
        &self,
        material_id: Uuid,
        status: MaterialStatus,
    ) -> PortResult<()> {
        let result =
            sqlx::query("UPDATE materials SET status = $2, updated_at = now() WHERE id = $1")
                .bind(material_id)
                .bind(status.as_str())
                .execute(&self.pool)
                .await
                .map_err(unexpected)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Material {} not found", material_id)));
        }
        Ok(())
    }

    async fn get_material_status(
        &self,
        material_id: Uuid,
        owner_uid: &str,
    ) -> PortResult<MaterialStatus> {
        let status: String =
            sqlx::query_scalar("SELECT status FROM materials WHERE id = $1 AND owner_uid = $2")
                .bind(material_id)
                .bind(owner_uid)
                .fetch_one(&self.pool)
                .await
                .map_err(not_found_or_unexpected(format!(
                    "Material {} not found",
                    material_id
                )))?;
        parse_column(&status)
    }
}

//=========================================================================================
// `PhraseStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl PhraseStore for DbAdapter {
    async fn create_phrase(&self, phrase: Phrase) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO phrases (id, material_id, text, importance, created_at) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(phrase.id)
        .bind(phrase.material_id)
        .bind(&phrase.text)
        .bind(phrase.importance.as_str())
        .bind(phrase.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
                PortError::NotFound(format!("Material {} not found", phrase.material_id))
            }
            other => unexpected(other),
        })?;
        Ok(())
    }

    async fn get_phrases_for_material(&self, material_id: Uuid) -> PortResult<Vec<Phrase>> {
        let records = sqlx::query_as::<_, PhraseRecord>(
            "SELECT id, material_id, text, importance, created_at FROM phrases WHERE material_id = $1 ORDER BY created_at ASC",
        )
        .bind(material_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        records.into_iter().map(|r| r.to_domain()).collect()
    }

    async fn delete_phrases_for_material(&self, material_id: Uuid) -> PortResult<u64> {
        let result = sqlx::query("DELETE FROM phrases WHERE material_id = $1")
            .bind(material_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(result.rows_affected())
    }
}

//=========================================================================================
// `ChatStore` and `MessageStore` Trait Implementations
//=========================================================================================

#[async_trait]
impl ChatStore for DbAdapter {
    async fn create_chat(
        &self,
        material_id: Uuid,
        owner_uid: &str,
        detail: &str,
    ) -> PortResult<Chat> {
        let record = sqlx::query_as::<_, ChatRecord>(&format!(
            "INSERT INTO chats (id, material_id, owner_uid, detail) VALUES ($1, $2, $3, $4) RETURNING {}",
            CHAT_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(material_id)
        .bind(owner_uid)
        .bind(detail)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
                PortError::NotFound(format!("Material {} not found", material_id))
            }
            other => unexpected(other),
        })?;
        Ok(record.to_domain())
    }

    async fn get_chat_by_id(&self, chat_id: Uuid) -> PortResult<Chat> {
        let record = sqlx::query_as::<_, ChatRecord>(&format!(
            "SELECT {} FROM chats WHERE id = $1",
            CHAT_COLUMNS
        ))
        .bind(chat_id)
        .fetch_one(&self.pool)
        .await
        .map_err(not_found_or_unexpected(format!("Chat {} not found", chat_id)))?;
        Ok(record.to_domain())
    }

    async fn get_chat_by_material(&self, material_id: Uuid, owner_uid: &str) -> PortResult<Chat> {
        let record = sqlx::query_as::<_, ChatRecord>(&format!(
            "SELECT {} FROM chats WHERE material_id = $1 AND owner_uid = $2 ORDER BY created_at ASC LIMIT 1",
            CHAT_COLUMNS
        ))
        .bind(material_id)
        .bind(owner_uid)
        .fetch_one(&self.pool)
        .await
        .map_err(not_found_or_unexpected(format!(
            "No chat for material {}",
            material_id
        )))?;
        Ok(record.to_domain())
    }

    async fn set_chat_pending(&self, chat_id: Uuid, pending: bool) -> PortResult<()> {
        let result =
            sqlx::query("UPDATE chats SET pending = $2, updated_at = now() WHERE id = $1")
                .bind(chat_id)
                .bind(pending)
                .execute(&self.pool)
                .await
                .map_err(unexpected)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Chat {} not found", chat_id)));
        }
        Ok(())
    }

    async fn delete_chat(&self, chat_id: Uuid) -> PortResult<()> {
        // Messages go with it through ON DELETE CASCADE.
        let result = sqlx::query("DELETE FROM chats WHERE id = $1")
            .bind(chat_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Chat {} not found", chat_id)));
        }
        Ok(())
    }
}

#[async_trait]
impl MessageStore for DbAdapter {
    async fn create_message(&self, message: Message) -> PortResult<Message> {
        let record = sqlx::query_as::<_, MessageRecord>(&format!(
            "INSERT INTO messages (id, chat_id, owner_uid, content, sender_type, created_at) VALUES ($1, $2, $3, $4, $5, $6) RETURNING {}",
            MESSAGE_COLUMNS
        ))
        .bind(message.id)
        .bind(message.chat_id)
        .bind(&message.owner_uid)
        .bind(&message.content)
        .bind(message.sender.as_str())
        .bind(message.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
                PortError::NotFound(format!("Chat {} not found", message.chat_id))
            }
            other => unexpected(other),
        })?;
        record.to_domain()
    }

    async fn get_messages(&self, chat_id: Uuid) -> PortResult<Vec<Message>> {
        let records = sqlx::query_as::<_, MessageRecord>(&format!(
            "SELECT {} FROM messages WHERE chat_id = $1 ORDER BY created_at ASC, seq ASC",
            MESSAGE_COLUMNS
        ))
        .bind(chat_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        records.into_iter().map(|r| r.to_domain()).collect()
    }
}

//=========================================================================================
// `IdentityProvider` Trait Implementation
//=========================================================================================

#[async_trait]
impl IdentityProvider for DbAdapter {
    async fn resolve_identity(&self, token: &str) -> PortResult<String> {
        let owner_uid: Option<String> = sqlx::query_scalar(
            "SELECT owner_uid FROM auth_sessions WHERE id = $1 AND expires_at > now()",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;

        owner_uid.ok_or(PortError::Unauthorized)
    }
}
