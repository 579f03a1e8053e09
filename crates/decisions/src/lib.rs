//! `kacaf-decisions`: the decision-subject aggregate.
//!
//! A subject is any record awaiting one final ruling (membership
//! application, disciplinary action, resolution, expense, budget, feedback).
//! Its state is rebuilt from an append-only event log; this crate holds the
//! pure state machine only. Authorization and persistence live in
//! `kacaf-auth` and `kacaf-infra`.

pub mod details;
pub mod opinion;
pub mod subject;

pub use details::{DisciplinaryActionType, SubjectDetails};
pub use opinion::{AdvisoryEntry, AdvisoryTally, Opinion, Stance};
pub use subject::{
    allowed_decisions, AdvisoryRecorded, Decision, DecideSubject, DecisionSubject, MembershipGrant,
    RecordAdvisoryInput, SubjectCommand, SubjectDecided, SubjectEvent, SubjectStatus,
    SubjectSubmitted, SubmitSubject,
};
