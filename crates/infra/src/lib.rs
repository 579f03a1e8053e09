//! Infrastructure layer: decision store and workflow engine.

pub mod engine;
pub mod store;


pub use engine::{AdvisoryReceipt, WorkflowEngine, WorkflowError};
pub use store::{
    CommitBatch, DecisionStore, InMemoryDecisionStore, PrincipalUpdate, StoreError, StoredEvent,
    UncommittedEvent,
};
