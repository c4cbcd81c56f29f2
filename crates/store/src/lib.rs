//! Message persistence for the consultation chat.
//!
//! The chat core only appends and reads; nothing here updates or deletes a
//! stored message.

pub mod error;
pub mod store;
pub mod store_memory;
pub mod store_sqlite;

pub use {
    error::StoreError, store::MessageStore, store_memory::MemoryMessageStore,
    store_sqlite::SqliteMessageStore,
};
