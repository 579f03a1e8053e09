use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use kacaf_auth::{Principal, PrincipalId};
use kacaf_core::SubjectId;

use super::r#trait::{CommitBatch, DecisionStore, StoreError, StoredEvent};

#[derive(Debug, Default)]
struct State {
    principals: HashMap<PrincipalId, Principal>,
    // Ordered by subject id; client-chosen ids need not be time-ordered.
    streams: BTreeMap<SubjectId, Vec<StoredEvent>>,
}

/// In-memory decision store.
///
/// A single lock covers principals and streams, which is what makes a
/// commit with a principal update atomic. Intended for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryDecisionStore {
    state: RwLock<State>,
}

impl InMemoryDecisionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_principals(principals: impl IntoIterator<Item = Principal>) -> Self {
        let state = State {
            principals: principals.into_iter().map(|p| (p.id, p)).collect(),
            streams: BTreeMap::new(),
        };
        Self {
            state: RwLock::new(state),
        }
    }

    fn current_version(stream: &[StoredEvent]) -> u64 {
        stream.last().map(|e| e.sequence_number).unwrap_or(0)
    }

    fn poisoned() -> StoreError {
        StoreError::Backend("lock poisoned".to_string())
    }
}

impl DecisionStore for InMemoryDecisionStore {
    fn load_principal(&self, id: PrincipalId) -> Result<Option<Principal>, StoreError> {
        let state = self.state.read().map_err(|_| Self::poisoned())?;
        Ok(state.principals.get(&id).cloned())
    }

    fn save_principal(&self, principal: Principal) -> Result<(), StoreError> {
        let mut state = self.state.write().map_err(|_| Self::poisoned())?;
        state.principals.insert(principal.id, principal);
        Ok(())
    }

    fn load_stream(&self, subject_id: SubjectId) -> Result<Vec<StoredEvent>, StoreError> {
        let state = self.state.read().map_err(|_| Self::poisoned())?;
        Ok(state.streams.get(&subject_id).cloned().unwrap_or_default())
    }

    fn commit(&self, batch: CommitBatch) -> Result<Vec<StoredEvent>, StoreError> {
        let CommitBatch {
            subject_id,
            expected_version,
            events,
            principal_update,
        } = batch;

        let Some(first) = events.first() else {
            if principal_update.is_some() {
                return Err(StoreError::InvalidAppend(
                    "principal update without events".to_string(),
                ));
            }
            return Ok(vec![]);
        };
        let aggregate_type = first.aggregate_type.clone();

        for (idx, e) in events.iter().enumerate() {
            if e.subject_id != subject_id {
                return Err(StoreError::InvalidAppend(format!(
                    "batch event {idx} targets subject {} instead of {subject_id}",
                    e.subject_id
                )));
            }
            if e.aggregate_type != aggregate_type {
                return Err(StoreError::AggregateTypeMismatch(format!(
                    "batch contains multiple aggregate_types (index {idx})"
                )));
            }
        }

        let mut state = self.state.write().map_err(|_| Self::poisoned())?;
        let State {
            principals,
            streams,
        } = &mut *state;

        // Every check happens before the first mutation.
        let current = streams
            .get(&subject_id)
            .map(|s| Self::current_version(s))
            .unwrap_or(0);
        if !expected_version.matches(current) {
            return Err(StoreError::Concurrency(format!(
                "expected {expected_version:?}, found {current}"
            )));
        }

        if let Some(existing) = streams.get(&subject_id).and_then(|s| s.first()) {
            if existing.aggregate_type != aggregate_type {
                return Err(StoreError::AggregateTypeMismatch(format!(
                    "stream aggregate_type is '{}', attempted append with '{}'",
                    existing.aggregate_type, aggregate_type
                )));
            }
        }

        if let Some(update) = &principal_update {
            let principal_id = update.principal_id();
            let principal = principals
                .get_mut(&principal_id)
                .ok_or(StoreError::PrincipalNotFound(principal_id))?;
            update.apply_to(principal);
        }

        let stream = streams.entry(subject_id).or_default();
        let mut next = current + 1;
        let mut committed = Vec::with_capacity(events.len());
        for e in events {
            let stored = StoredEvent {
                event_id: e.event_id,
                subject_id: e.subject_id,
                aggregate_type: e.aggregate_type,
                sequence_number: next,
                event_type: e.event_type,
                event_version: e.event_version,
                occurred_at: e.occurred_at,
                payload: e.payload,
            };
            next += 1;
            stream.push(stored.clone());
            committed.push(stored);
        }

        Ok(committed)
    }

    fn subject_ids(&self) -> Result<Vec<SubjectId>, StoreError> {
        let state = self.state.read().map_err(|_| Self::poisoned())?;
        Ok(state.streams.keys().copied().collect())
    }
}
