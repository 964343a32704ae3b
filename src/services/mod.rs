pub mod message_store;
pub mod thread_service;
