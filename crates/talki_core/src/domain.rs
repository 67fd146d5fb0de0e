//! crates/talki_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any database or serialization format.

use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

//=========================================================================================
// Materials
//=========================================================================================

/// The processing state of a material's phrase generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MaterialStatus {
    Processing,
    Completed,
    Failed,
}

impl MaterialStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MaterialStatus::Processing => "processing",
            MaterialStatus::Completed => "completed",
            MaterialStatus::Failed => "failed",
        }
    }

    /// True once the pipeline is done with the material, successfully or not.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, MaterialStatus::Processing)
    }
}

impl fmt::Display for MaterialStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MaterialStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "processing" => Ok(MaterialStatus::Processing),
            "completed" => Ok(MaterialStatus::Completed),
            "failed" => Ok(MaterialStatus::Failed),
            other => Err(format!("unknown material status '{}'", other)),
        }
    }
}

/// A unit of reading content submitted by a user for study.
#[derive(Debug, Clone)]
pub struct Material {
    pub id: Uuid,
    pub owner_uid: String,
    pub title: String,
    pub content: String,
    pub status: MaterialStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The fields a user supplies when submitting a material.
#[derive(Debug, Clone)]
pub struct NewMaterial {
    pub owner_uid: String,
    pub title: String,
    pub content: String,
}

/// A partial edit of a material. `None` leaves the field untouched.
#[derive(Debug, Clone, Default)]
pub struct MaterialUpdate {
    pub title: Option<String>,
    pub content: Option<String>,
}

//=========================================================================================
// Phrases
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Importance {
    High,
    Medium,
    Low,
}

impl Importance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Importance::High => "high",
            Importance::Medium => "medium",
            Importance::Low => "low",
        }
    }
}

impl fmt::Display for Importance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Importance {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "high" => Ok(Importance::High),
            "medium" => Ok(Importance::Medium),
            "low" => Ok(Importance::Low),
            other => Err(format!("unknown importance '{}'", other)),
        }
    }
}

/// A generated vocabulary unit derived from a material's content.
#[derive(Debug, Clone)]
pub struct Phrase {
    pub id: Uuid,
    pub material_id: Uuid,
    pub text: String,
    pub importance: Importance,
    pub created_at: DateTime<Utc>,
}

//=========================================================================================
// Chats and Messages
//=========================================================================================

/// A conversational session anchored to a material.
#[derive(Debug, Clone)]
pub struct Chat {
    pub id: Uuid,
    pub material_id: Uuid,
    pub owner_uid: String,
    pub detail: String,
    /// Set while a generation round-trip is in flight for this chat.
    pub pending: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SenderType {
    User,
    Bot,
    System,
}

impl SenderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SenderType::User => "user",
            SenderType::Bot => "bot",
            SenderType::System => "system",
        }
    }
}

impl fmt::Display for SenderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SenderType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(SenderType::User),
            "bot" => Ok(SenderType::Bot),
            "system" => Ok(SenderType::System),
            other => Err(format!("unknown sender type '{}'", other)),
        }
    }
}

/// A single entry in a chat's append-only history.
#[derive(Debug, Clone)]
pub struct Message {
    pub id: Uuid,
    pub chat_id: Uuid,
    /// `None` for bot messages.
    pub owner_uid: Option<String>,
    pub content: String,
    pub sender: SenderType,
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Builds a message authored by a user.
    pub fn from_user(chat_id: Uuid, owner_uid: &str, content: &str) -> Self {
        Self::build(chat_id, Some(owner_uid.to_string()), content, SenderType::User)
    }

    /// Builds a reply from the generation service. Bot messages carry no owner.
    pub fn from_bot(chat_id: Uuid, content: &str) -> Self {
        Self::build(chat_id, None, content, SenderType::Bot)
    }

    pub fn system(chat_id: Uuid, owner_uid: &str, content: &str) -> Self {
        Self::build(chat_id, Some(owner_uid.to_string()), content, SenderType::System)
    }

    fn build(chat_id: Uuid, owner_uid: Option<String>, content: &str, sender: SenderType) -> Self {
        Self {
            id: Uuid::new_v4(),
            chat_id,
            owner_uid,
            content: content.to_string(),
            sender,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_its_wire_name() {
        for status in [
            MaterialStatus::Processing,
            MaterialStatus::Completed,
            MaterialStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<MaterialStatus>(), Ok(status));
        }
        assert!("done".parse::<MaterialStatus>().is_err());
    }

    #[test]
    fn only_processing_is_non_terminal() {
        assert!(!MaterialStatus::Processing.is_terminal());
        assert!(MaterialStatus::Completed.is_terminal());
        assert!(MaterialStatus::Failed.is_terminal());
    }

    #[test]
    fn bot_messages_have_no_owner() {
        let chat_id = Uuid::new_v4();
        let bot = Message::from_bot(chat_id, "Hi");
        assert_eq!(bot.sender, SenderType::Bot);
        assert!(bot.owner_uid.is_none());

        let user = Message::from_user(chat_id, "uid-1", "Hello");
        assert_eq!(user.sender, SenderType::User);
        assert_eq!(user.owner_uid.as_deref(), Some("uid-1"));
    }
}
