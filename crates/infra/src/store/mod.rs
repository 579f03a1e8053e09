//! Persistence boundary for decision subjects and the accounts they touch.

pub mod in_memory;
pub mod r#trait;

pub use in_memory::InMemoryDecisionStore;
pub use r#trait::{
    CommitBatch, DecisionStore, PrincipalUpdate, StoreError, StoredEvent, UncommittedEvent,
};
