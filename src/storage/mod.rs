//! Storage backends implementing the [`DocumentStore`](crate::core::DocumentStore) trait

pub mod memory;

pub use memory::MemoryStore;
