use serde::Serialize;

use super::ContactMessage;

/// A derived conversation thread. Never persisted and never parsed back:
/// threads are rebuilt from the flat message list on every fetch.
#[derive(Debug, Clone, Serialize)]
pub struct MessageThread {
    /// The upstream `thread_id`, or a synthetic key when none was assigned.
    pub id: String,
    /// `[sender_id, recipient_id]` of the thread's last message.
    pub participants: [String; 2],
    /// All messages sharing this thread key, in fetch order.
    pub messages: Vec<ContactMessage>,
    pub last_message: Box<ContactMessage>,
    pub unread_count: usize,
}
