//! Decision workflow engine.
//!
//! Drives the `DecisionSubject` aggregate against a [`DecisionStore`]:
//!
//! ```text
//! request
//!   -> resolve capabilities (once)
//!   -> load + rehydrate subject
//!   -> authorize
//!   -> handle command (pure, produces events)
//!   -> commit (version check + append + principal update, atomically)
//!   -> publish committed events (best-effort)
//! ```
//!
//! Authorization always runs before the state check, so a caller without
//! authority learns nothing about whether a subject is already decided.

use chrono::Utc;
use serde_json::Value as JsonValue;
use thiserror::Error;
use uuid::Uuid;

use kacaf_auth::{
    authorize_with, resolve_capabilities, Action, Authorization, CapabilitySet, DenyReason,
    Principal, PrincipalId, Resource, Visibility,
};
use kacaf_core::{Aggregate, AggregateRoot, DomainError, ExpectedVersion, SubjectId, SubjectKind};
use kacaf_decisions::{
    AdvisoryTally, Decision, DecideSubject, DecisionSubject, Opinion, RecordAdvisoryInput,
    SubjectCommand, SubjectDetails, SubjectEvent, SubjectStatus, SubmitSubject,
};
use kacaf_events::{EventBus, EventEnvelope};

use crate::store::{CommitBatch, DecisionStore, PrincipalUpdate, StoreError, StoredEvent, UncommittedEvent};

/// Attempts for a decide whose commit lost a version race.
const DECIDE_ATTEMPTS: usize = 2;

/// Attempts for advisory input; principals only touch their own entry.
const ADVISORY_ATTEMPTS: usize = 3;

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("forbidden: {0}")]
    Forbidden(DenyReason),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("subject already decided")]
    AlreadyDecided,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflicting concurrent update")]
    ConflictingUpdate,

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("store failure: {0}")]
    Store(#[source] StoreError),

    #[error("failed to read decision log: {0}")]
    Deserialize(String),
}

impl WorkflowError {
    /// Business outcomes, as opposed to infrastructure faults.
    pub fn is_expected(&self) -> bool {
        !matches!(self, WorkflowError::Store(_) | WorkflowError::Deserialize(_))
    }
}

impl From<DomainError> for WorkflowError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => WorkflowError::Validation(msg),
            DomainError::InvalidState(msg) => WorkflowError::InvalidState(msg),
            DomainError::AlreadyDecided => WorkflowError::AlreadyDecided,
            DomainError::NotFound => WorkflowError::NotFound("subject".to_string()),
            DomainError::Conflict(_) => WorkflowError::ConflictingUpdate,
        }
    }
}

impl From<StoreError> for WorkflowError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Concurrency(_) => WorkflowError::ConflictingUpdate,
            StoreError::PrincipalNotFound(id) => WorkflowError::NotFound(format!("principal {id}")),
            other => WorkflowError::Store(other),
        }
    }
}

/// Result of recording advisory input.
///
/// Advising does not imply read access: `subject` is only populated when the
/// advisor may also read the subject.
#[derive(Debug, Clone, PartialEq)]
pub struct AdvisoryReceipt {
    pub subject_id: SubjectId,
    pub status: SubjectStatus,
    pub tally: AdvisoryTally,
    pub subject: Option<DecisionSubject>,
}

impl AdvisoryReceipt {
    fn new(subject: DecisionSubject, readable: bool) -> Self {
        Self {
            subject_id: subject.id_typed(),
            status: subject.status(),
            tally: subject.tally(),
            subject: readable.then_some(subject),
        }
    }
}

/// Orchestrates submit / advise / decide over an injected store and bus.
#[derive(Debug)]
pub struct WorkflowEngine<S, B> {
    store: S,
    bus: B,
}

impl<S, B> WorkflowEngine<S, B> {
    pub fn new(store: S, bus: B) -> Self {
        Self { store, bus }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn into_parts(self) -> (S, B) {
        (self.store, self.bus)
    }
}

impl<S, B> WorkflowEngine<S, B>
where
    S: DecisionStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Look up the account behind an authenticated identity.
    pub fn principal(&self, id: PrincipalId) -> Result<Option<Principal>, WorkflowError> {
        self.store.load_principal(id).map_err(log_fault)
    }

    /// Create a new subject in `Pending`.
    #[tracing::instrument(
        skip_all,
        fields(actor = ?actor.map(|p| p.id), subject_id = %subject_id, kind = %kind)
    )]
    pub fn submit(
        &self,
        actor: Option<&Principal>,
        subject_id: SubjectId,
        kind: SubjectKind,
        details: SubjectDetails,
    ) -> Result<DecisionSubject, WorkflowError> {
        let result = self
            .try_submit(actor, subject_id, kind, details)
            .map_err(|e| match e {
                // Lost a race against an identical submit.
                WorkflowError::ConflictingUpdate => {
                    WorkflowError::InvalidState("subject already submitted".to_string())
                }
                other => other,
            });

        let subject = log_outcome("submit", result)?;
        tracing::info!(subject_id = %subject_id, kind = %kind, "subject submitted");
        Ok(subject)
    }

    /// Record (or replace) the caller's advisory opinion on a subject.
    #[tracing::instrument(
        skip_all,
        fields(actor = ?actor.map(|p| p.id), subject_id = %subject_id)
    )]
    pub fn add_advisory_input(
        &self,
        actor: Option<&Principal>,
        subject_id: SubjectId,
        opinion: Opinion,
    ) -> Result<AdvisoryReceipt, WorkflowError> {
        let caps = resolve_capabilities(actor);

        let mut attempt = 0;
        let result = loop {
            attempt += 1;
            match self.try_advise(actor, &caps, subject_id, opinion.clone()) {
                Err(WorkflowError::ConflictingUpdate) if attempt < ADVISORY_ATTEMPTS => {
                    tracing::debug!(attempt, "advisory input lost a version race; retrying");
                }
                other => break other,
            }
        };

        let subject = log_outcome("add_advisory_input", result)?;
        tracing::info!(
            subject_id = %subject_id,
            entries = subject.advisory_input().len(),
            "advisory input recorded"
        );

        let readable = authorize_with(actor, &caps, &Action::Read, Some(&subject.as_resource()))
            .is_allowed();
        Ok(AdvisoryReceipt::new(subject, readable))
    }

    /// Record the final ruling. Approving a membership application updates
    /// the applicant in the same commit.
    #[tracing::instrument(
        skip_all,
        fields(actor = ?actor.map(|p| p.id), subject_id = %subject_id, decision = %decision)
    )]
    pub fn decide(
        &self,
        actor: Option<&Principal>,
        subject_id: SubjectId,
        decision: Decision,
        comments: Option<String>,
    ) -> Result<DecisionSubject, WorkflowError> {
        let caps = resolve_capabilities(actor);

        let mut attempt = 0;
        let result = loop {
            attempt += 1;
            match self.try_decide(actor, &caps, subject_id, decision, comments.clone()) {
                Err(WorkflowError::ConflictingUpdate) if attempt < DECIDE_ATTEMPTS => {
                    tracing::debug!(attempt, "decide lost a version race; retrying");
                }
                Err(WorkflowError::ConflictingUpdate) => {
                    // Final re-read: a concurrent winner means this one is a duplicate.
                    break match self.load_existing(subject_id) {
                        Ok(subject) if subject.is_decided() => Err(WorkflowError::AlreadyDecided),
                        Ok(_) => Err(WorkflowError::ConflictingUpdate),
                        Err(e) => Err(e),
                    };
                }
                other => break other,
            }
        };

        let subject = log_outcome("decide", result)?;
        tracing::info!(
            subject_id = %subject_id,
            decision = %decision,
            decided_by = ?subject.decided_by(),
            "subject decided"
        );
        Ok(subject)
    }

    /// Read a single subject, subject to its visibility.
    pub fn load_subject(
        &self,
        actor: Option<&Principal>,
        subject_id: SubjectId,
    ) -> Result<DecisionSubject, WorkflowError> {
        let caps = resolve_capabilities(actor);
        let result = self.load_existing(subject_id).and_then(|subject| {
            check(actor, &caps, &Action::Read, Some(&subject.as_resource()))?;
            Ok(subject)
        });
        log_outcome("load_subject", result)
    }

    /// Undecided subjects in subject id order. Executive or staff only.
    pub fn pending_subjects(
        &self,
        actor: Option<&Principal>,
        kind: Option<SubjectKind>,
    ) -> Result<Vec<DecisionSubject>, WorkflowError> {
        let caps = resolve_capabilities(actor);
        let queue = Resource::unowned(Visibility::Executive);
        log_outcome("pending_subjects", check(actor, &caps, &Action::Read, Some(&queue)))?;

        let ids = self.store.subject_ids().map_err(log_fault)?;
        let mut pending = Vec::new();
        for id in ids {
            let subject = self.load(id)?;
            if subject.is_decided() {
                continue;
            }
            if kind.is_some_and(|k| subject.kind() != Some(k)) {
                continue;
            }
            pending.push(subject);
        }
        Ok(pending)
    }

    fn try_submit(
        &self,
        actor: Option<&Principal>,
        subject_id: SubjectId,
        kind: SubjectKind,
        details: SubjectDetails,
    ) -> Result<DecisionSubject, WorkflowError> {
        let caps = resolve_capabilities(actor);
        check(actor, &caps, &Action::Submit(kind), None)?;

        let subject = self.load(subject_id)?;
        let command = SubjectCommand::Submit(SubmitSubject {
            subject_id,
            kind,
            submitted_by: actor.map(|p| p.id),
            details,
            occurred_at: Utc::now(),
        });

        self.execute(subject, &command, ExpectedVersion::NoStream, None)
    }

    fn try_advise(
        &self,
        actor: Option<&Principal>,
        caps: &CapabilitySet,
        subject_id: SubjectId,
        opinion: Opinion,
    ) -> Result<DecisionSubject, WorkflowError> {
        let subject = self.load_existing(subject_id)?;
        let kind = subject_kind(&subject)?;
        check(actor, caps, &Action::Advise(kind), None)?;
        // Advise is never granted to anonymous callers.
        let Some(principal) = actor else {
            return Err(WorkflowError::Forbidden(DenyReason::InsufficientRole));
        };

        let command = SubjectCommand::AddAdvisoryInput(RecordAdvisoryInput {
            subject_id,
            principal: principal.id,
            opinion,
            occurred_at: Utc::now(),
        });
        let expected = ExpectedVersion::Exact(subject.version());

        self.execute(subject, &command, expected, None)
    }

    fn try_decide(
        &self,
        actor: Option<&Principal>,
        caps: &CapabilitySet,
        subject_id: SubjectId,
        decision: Decision,
        comments: Option<String>,
    ) -> Result<DecisionSubject, WorkflowError> {
        let subject = self.load_existing(subject_id)?;
        let kind = subject_kind(&subject)?;
        check(actor, caps, &Action::Decide(kind), None)?;
        let Some(principal) = actor else {
            return Err(WorkflowError::Forbidden(DenyReason::InsufficientRole));
        };

        let occurred_at = Utc::now();
        let update = subject
            .membership_grant(decision)
            .map(|grant| PrincipalUpdate::GrantMembership {
                principal_id: grant.applicant,
                membership_type: grant.membership_type,
                verified_at: occurred_at,
            });

        let command = SubjectCommand::Decide(DecideSubject {
            subject_id,
            decided_by: principal.id,
            decision,
            comments,
            occurred_at,
        });
        let expected = ExpectedVersion::Exact(subject.version());

        self.execute(subject, &command, expected, update)
    }

    /// Handle, commit and publish one command against an already loaded subject.
    fn execute(
        &self,
        subject: DecisionSubject,
        command: &SubjectCommand,
        expected: ExpectedVersion,
        principal_update: Option<PrincipalUpdate>,
    ) -> Result<DecisionSubject, WorkflowError> {
        let decided = subject.handle(command)?;
        if decided.is_empty() {
            return Ok(subject);
        }

        let subject_id = subject.id_typed();
        let mut next = subject;
        for event in &decided {
            next.apply(event);
        }
        let aggregate_type = subject_kind(&next)?.aggregate_type();

        let events = decided
            .iter()
            .map(|ev| UncommittedEvent::from_typed(subject_id, aggregate_type.clone(), Uuid::now_v7(), ev))
            .collect::<Result<Vec<_>, _>>()
            .map_err(log_fault)?;

        let committed = self
            .store
            .commit(CommitBatch {
                subject_id,
                expected_version: expected,
                events,
                principal_update,
            })
            .map_err(log_fault)?;

        self.publish(&committed);
        Ok(next)
    }

    fn publish(&self, committed: &[StoredEvent]) {
        for stored in committed {
            if let Err(err) = self.bus.publish(stored.to_envelope()) {
                tracing::warn!(
                    subject_id = %stored.subject_id,
                    event_type = %stored.event_type,
                    error = ?err,
                    "notification publish failed; decision stands"
                );
            }
        }
    }

    fn load_existing(&self, subject_id: SubjectId) -> Result<DecisionSubject, WorkflowError> {
        let subject = self.load(subject_id)?;
        if !subject.exists() {
            return Err(WorkflowError::NotFound(format!("subject {subject_id}")));
        }
        Ok(subject)
    }

    fn load(&self, subject_id: SubjectId) -> Result<DecisionSubject, WorkflowError> {
        let history = self.store.load_stream(subject_id).map_err(log_fault)?;
        validate_loaded_stream(subject_id, &history).map_err(log_fault)?;

        let mut subject = DecisionSubject::empty(subject_id);
        for stored in history {
            let event: SubjectEvent = serde_json::from_value(stored.payload)
                .map_err(|e| log_fault(WorkflowError::Deserialize(e.to_string())))?;
            subject.apply(&event);
        }
        Ok(subject)
    }
}

fn check(
    actor: Option<&Principal>,
    caps: &CapabilitySet,
    action: &Action,
    resource: Option<&Resource>,
) -> Result<(), WorkflowError> {
    match authorize_with(actor, caps, action, resource) {
        Authorization::Allow => Ok(()),
        Authorization::Deny(reason) => Err(WorkflowError::Forbidden(reason)),
    }
}

fn subject_kind(subject: &DecisionSubject) -> Result<SubjectKind, WorkflowError> {
    subject
        .kind()
        .ok_or_else(|| WorkflowError::NotFound(format!("subject {}", subject.id_typed())))
}

fn validate_loaded_stream(subject_id: SubjectId, stream: &[StoredEvent]) -> Result<(), WorkflowError> {
    let mut last = 0u64;
    for (idx, e) in stream.iter().enumerate() {
        if e.subject_id != subject_id {
            return Err(WorkflowError::Store(StoreError::InvalidAppend(format!(
                "loaded stream contains wrong subject_id at index {idx}"
            ))));
        }
        if e.sequence_number != last + 1 {
            return Err(WorkflowError::Store(StoreError::InvalidAppend(format!(
                "non-contiguous sequence_number in loaded stream (last={last}, found={})",
                e.sequence_number
            ))));
        }
        last = e.sequence_number;
    }
    Ok(())
}

fn log_fault<E: Into<WorkflowError>>(err: E) -> WorkflowError {
    let err = err.into();
    if !err.is_expected() {
        tracing::error!(error = %err, "decision store fault");
    }
    err
}

fn log_outcome<T>(operation: &'static str, result: Result<T, WorkflowError>) -> Result<T, WorkflowError> {
    if let Err(err) = &result {
        if err.is_expected() {
            tracing::debug!(operation, error = %err, "request rejected");
        }
    }
    result
}
