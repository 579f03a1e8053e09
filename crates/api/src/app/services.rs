use std::sync::Arc;

use serde_json::Value as JsonValue;

use kacaf_auth::Principal;
use kacaf_events::{EventEnvelope, InMemoryEventBus};
use kacaf_infra::{InMemoryDecisionStore, WorkflowEngine};

pub type NotificationBus = InMemoryEventBus<EventEnvelope<JsonValue>>;

pub type Engine = WorkflowEngine<Arc<InMemoryDecisionStore>, Arc<NotificationBus>>;

/// Shared state behind every handler.
pub struct AppServices {
    engine: Engine,
}

impl AppServices {
    pub fn in_memory(principals: Vec<Principal>) -> Self {
        let count = principals.len();
        let store = Arc::new(InMemoryDecisionStore::with_principals(principals));
        let bus = Arc::new(NotificationBus::new());
        tracing::info!(principals = count, "in-memory decision store ready");

        Self {
            engine: WorkflowEngine::new(store, bus),
        }
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Notification channel; subscribers see every committed subject event.
    pub fn notifications(&self) -> &Arc<NotificationBus> {
        self.engine.bus()
    }
}
