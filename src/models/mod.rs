pub mod contact_messages;
pub mod threads;

pub use contact_messages::{
    ContactInfo, ContactMessage, ItemType, MessageStatus, MessageType, NewMessage, Priority,
};
pub use threads::MessageThread;
