use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Read status of a contact message as stored upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Unread,
    Read,
    Replied,
    Archived,
}

impl Default for MessageStatus {
    fn default() -> Self {
        Self::Unread
    }
}

/// Which vertical of the site an inquiry is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemType {
    Property,
    Food,
    Store,
    Project,
    Blog,
    General,
}

impl ItemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Property => "property",
            Self::Food => "food",
            Self::Store => "store",
            Self::Project => "project",
            Self::Blog => "blog",
            Self::General => "general",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Normal,
    High,
    Urgent,
}

impl Default for Priority {
    fn default() -> Self {
        Self::Normal
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Inquiry,
    Response,
    Notification,
    General,
}

impl Default for MessageType {
    fn default() -> Self {
        Self::Inquiry
    }
}

/// Joined sender/recipient profile, when the upstream select embeds it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

/// A contact message row as returned by the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactMessage {
    pub id: String,
    pub sender_id: String,
    pub recipient_id: String,
    pub subject: String,
    pub message: String,
    #[serde(default)]
    pub status: MessageStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_type: Option<ItemType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_message_id: Option<String>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub message_type: MessageType,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender: Option<ContactInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient: Option<ContactInfo>,
}

/// Payload for creating a message upstream (replies).
#[derive(Debug, Clone, Serialize)]
pub struct NewMessage {
    pub sender_id: String,
    pub recipient_id: String,
    pub subject: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_type: Option<ItemType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_message_id: Option<String>,
    pub message_type: MessageType,
    pub status: MessageStatus,
}
