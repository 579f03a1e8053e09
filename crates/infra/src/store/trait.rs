use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;
use uuid::Uuid;

use kacaf_auth::{MembershipType, Principal, PrincipalId};
use kacaf_core::{ExpectedVersion, SubjectId};
use std::sync::Arc;

/// An event ready to be appended to a subject stream (no sequence number yet).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UncommittedEvent {
    pub event_id: Uuid,
    pub subject_id: SubjectId,
    pub aggregate_type: String,

    pub event_type: String,
    pub event_version: u32,
    pub occurred_at: DateTime<Utc>,

    pub payload: JsonValue,
}

/// A persisted event in a subject's append-only stream.
///
/// Sequence numbers start at 1, increase by one per event and never change.
/// The last sequence number of a stream is its version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEvent {
    pub event_id: Uuid,
    pub subject_id: SubjectId,
    pub aggregate_type: String,

    pub sequence_number: u64,

    pub event_type: String,
    pub event_version: u32,
    pub occurred_at: DateTime<Utc>,

    pub payload: JsonValue,
}

impl StoredEvent {
    pub fn stream_version(&self) -> u64 {
        self.sequence_number
    }

    /// Convert into the envelope handed to the notification bus.
    pub fn to_envelope(&self) -> kacaf_events::EventEnvelope<JsonValue> {
        kacaf_events::EventEnvelope::new(
            self.event_id,
            self.subject_id,
            self.aggregate_type.clone(),
            self.event_type.clone(),
            self.sequence_number,
            self.payload.clone(),
        )
    }
}

impl UncommittedEvent {
    /// Serialize a typed domain event, keeping the metadata needed to read it back.
    pub fn from_typed<E>(
        subject_id: SubjectId,
        aggregate_type: impl Into<String>,
        event_id: Uuid,
        event: &E,
    ) -> Result<Self, StoreError>
    where
        E: kacaf_events::Event + Serialize,
    {
        let payload = serde_json::to_value(event)
            .map_err(|e| StoreError::InvalidAppend(format!("payload serialization failed: {e}")))?;

        Ok(Self {
            event_id,
            subject_id,
            aggregate_type: aggregate_type.into(),
            event_type: event.event_type().to_string(),
            event_version: event.version(),
            occurred_at: event.occurred_at(),
            payload,
        })
    }
}

/// Account change that must land in the same commit as a decision.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PrincipalUpdate {
    /// Approved membership application: set the type and mark verified.
    GrantMembership {
        principal_id: PrincipalId,
        membership_type: MembershipType,
        verified_at: DateTime<Utc>,
    },
}

impl PrincipalUpdate {
    pub fn principal_id(&self) -> PrincipalId {
        match self {
            PrincipalUpdate::GrantMembership { principal_id, .. } => *principal_id,
        }
    }

    pub fn apply_to(&self, principal: &mut Principal) {
        match self {
            PrincipalUpdate::GrantMembership {
                membership_type,
                verified_at,
                ..
            } => principal.apply_membership_approval(*membership_type, *verified_at),
        }
    }
}

/// One transactional unit: events for a single subject plus an optional
/// account change. Either all of it is applied or none of it.
#[derive(Debug, Clone, PartialEq)]
pub struct CommitBatch {
    pub subject_id: SubjectId,
    pub expected_version: ExpectedVersion,
    pub events: Vec<UncommittedEvent>,
    pub principal_update: Option<PrincipalUpdate>,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("optimistic concurrency check failed: {0}")]
    Concurrency(String),

    #[error("principal {0} not found")]
    PrincipalNotFound(PrincipalId),

    #[error("aggregate type mismatch: {0}")]
    AggregateTypeMismatch(String),

    #[error("invalid append: {0}")]
    InvalidAppend(String),

    #[error("storage backend failure: {0}")]
    Backend(String),
}

/// Persistence boundary for principals and subject streams.
///
/// `commit` is the only write path for subjects. Implementations must check
/// `expected_version`, append the events and apply the principal update as a
/// single atomic step, and must not mutate anything when any part fails.
pub trait DecisionStore: Send + Sync {
    fn load_principal(&self, id: PrincipalId) -> Result<Option<Principal>, StoreError>;

    /// Insert or replace an account record.
    fn save_principal(&self, principal: Principal) -> Result<(), StoreError>;

    /// Full stream for a subject, in sequence order. Empty if never submitted.
    fn load_stream(&self, subject_id: SubjectId) -> Result<Vec<StoredEvent>, StoreError>;

    fn commit(&self, batch: CommitBatch) -> Result<Vec<StoredEvent>, StoreError>;

    /// Every subject with at least one event, in subject id order.
    fn subject_ids(&self) -> Result<Vec<SubjectId>, StoreError>;
}

impl<S> DecisionStore for Arc<S>
where
    S: DecisionStore + ?Sized,
{
    fn load_principal(&self, id: PrincipalId) -> Result<Option<Principal>, StoreError> {
        (**self).load_principal(id)
    }

    fn save_principal(&self, principal: Principal) -> Result<(), StoreError> {
        (**self).save_principal(principal)
    }

    fn load_stream(&self, subject_id: SubjectId) -> Result<Vec<StoredEvent>, StoreError> {
        (**self).load_stream(subject_id)
    }

    fn commit(&self, batch: CommitBatch) -> Result<Vec<StoredEvent>, StoreError> {
        (**self).commit(batch)
    }

    fn subject_ids(&self) -> Result<Vec<SubjectId>, StoreError> {
        (**self).subject_ids()
    }
}
