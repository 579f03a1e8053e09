use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use kacaf_auth::{MembershipType, PrincipalId, Resource, Visibility};
use kacaf_core::{Aggregate, AggregateRoot, DomainError, SubjectId, SubjectKind};
use kacaf_events::Event;

use crate::details::SubjectDetails;
use crate::opinion::{AdvisoryEntry, AdvisoryTally, Opinion};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubjectStatus {
    Pending,
    UnderReview,
    Decided,
}

/// The final ruling on a subject.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Approved,
    Rejected,
    Referred,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Approved => "approved",
            Decision::Rejected => "rejected",
            Decision::Referred => "referred",
        }
    }
}

impl core::fmt::Display for Decision {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Decision {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "approved" => Ok(Decision::Approved),
            "rejected" => Ok(Decision::Rejected),
            "referred" => Ok(Decision::Referred),
            other => Err(DomainError::validation(format!("unknown decision '{other}'"))),
        }
    }
}

/// Decision options a subject kind accepts.
pub fn allowed_decisions(kind: SubjectKind) -> &'static [Decision] {
    match kind {
        SubjectKind::Resolution | SubjectKind::DisciplinaryAction => {
            &[Decision::Approved, Decision::Rejected, Decision::Referred]
        }
        SubjectKind::MembershipApplication
        | SubjectKind::ExpenseApproval
        | SubjectKind::BudgetApproval
        | SubjectKind::Feedback => &[Decision::Approved, Decision::Rejected],
    }
}

/// Account change implied by approving a membership application.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct MembershipGrant {
    pub applicant: PrincipalId,
    pub membership_type: MembershipType,
}

/// Aggregate root: DecisionSubject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DecisionSubject {
    id: SubjectId,
    kind: Option<SubjectKind>,
    status: SubjectStatus,
    details: Option<SubjectDetails>,
    submitted_by: Option<PrincipalId>,
    submitted_at: Option<DateTime<Utc>>,
    advisory_input: Vec<AdvisoryEntry>,
    decision: Option<Decision>,
    decided_by: Option<PrincipalId>,
    decided_at: Option<DateTime<Utc>>,
    decision_comments: Option<String>,
    version: u64,
    #[serde(skip)]
    submitted: bool,
}

impl DecisionSubject {
    /// Create an empty, not-yet-submitted subject for rehydration.
    pub fn empty(id: SubjectId) -> Self {
        Self {
            id,
            kind: None,
            status: SubjectStatus::Pending,
            details: None,
            submitted_by: None,
            submitted_at: None,
            advisory_input: Vec::new(),
            decision: None,
            decided_by: None,
            decided_at: None,
            decision_comments: None,
            version: 0,
            submitted: false,
        }
    }

    /// Rebuild a subject by folding its event log.
    pub fn rehydrate<'a>(id: SubjectId, events: impl IntoIterator<Item = &'a SubjectEvent>) -> Self {
        let mut subject = Self::empty(id);
        for event in events {
            subject.apply(event);
        }
        subject
    }

    pub fn exists(&self) -> bool {
        self.submitted
    }

    pub fn id_typed(&self) -> SubjectId {
        self.id
    }

    pub fn kind(&self) -> Option<SubjectKind> {
        self.kind
    }

    pub fn status(&self) -> SubjectStatus {
        self.status
    }

    pub fn is_decided(&self) -> bool {
        self.status == SubjectStatus::Decided
    }

    pub fn details(&self) -> Option<&SubjectDetails> {
        self.details.as_ref()
    }

    pub fn submitted_by(&self) -> Option<PrincipalId> {
        self.submitted_by
    }

    pub fn submitted_at(&self) -> Option<DateTime<Utc>> {
        self.submitted_at
    }

    pub fn advisory_input(&self) -> &[AdvisoryEntry] {
        &self.advisory_input
    }

    pub fn tally(&self) -> AdvisoryTally {
        AdvisoryTally::from_entries(&self.advisory_input)
    }

    pub fn decision(&self) -> Option<Decision> {
        self.decision
    }

    pub fn decided_by(&self) -> Option<PrincipalId> {
        self.decided_by
    }

    pub fn decided_at(&self) -> Option<DateTime<Utc>> {
        self.decided_at
    }

    pub fn decision_comments(&self) -> Option<&str> {
        self.decision_comments.as_deref()
    }

    /// Policy view of this subject.
    ///
    /// Applications and disciplinary actions are owned by the principal they
    /// concern; everything else by the submitter. Disciplinary actions and
    /// feedback are only visible to the executive and staff.
    pub fn as_resource(&self) -> Resource {
        let owner = self
            .details
            .as_ref()
            .and_then(SubjectDetails::concerned_principal)
            .or(self.submitted_by);

        let visibility = match self.kind {
            Some(SubjectKind::DisciplinaryAction) | Some(SubjectKind::Feedback) => {
                Visibility::Executive
            }
            Some(_) => Visibility::Members,
            None => Visibility::Restricted,
        };

        Resource { owner, visibility }
    }

    /// Account change to commit together with `decision`, if any.
    pub fn membership_grant(&self, decision: Decision) -> Option<MembershipGrant> {
        match (&self.details, decision) {
            (
                Some(SubjectDetails::MembershipApplication {
                    applicant,
                    applied_membership_type,
                    ..
                }),
                Decision::Approved,
            ) => Some(MembershipGrant {
                applicant: *applicant,
                membership_type: *applied_membership_type,
            }),
            _ => None,
        }
    }
}

impl AggregateRoot for DecisionSubject {
    type Id = SubjectId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: SubmitSubject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitSubject {
    pub subject_id: SubjectId,
    pub kind: SubjectKind,
    pub submitted_by: Option<PrincipalId>,
    pub details: SubjectDetails,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordAdvisoryInput.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordAdvisoryInput {
    pub subject_id: SubjectId,
    pub principal: PrincipalId,
    pub opinion: Opinion,
    pub occurred_at: DateTime<Utc>,
}

/// Command: DecideSubject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecideSubject {
    pub subject_id: SubjectId,
    pub decided_by: PrincipalId,
    pub decision: Decision,
    pub comments: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubjectCommand {
    Submit(SubmitSubject),
    AddAdvisoryInput(RecordAdvisoryInput),
    Decide(DecideSubject),
}

/// Event: SubjectSubmitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectSubmitted {
    pub subject_id: SubjectId,
    pub kind: SubjectKind,
    pub submitted_by: Option<PrincipalId>,
    pub details: SubjectDetails,
    pub occurred_at: DateTime<Utc>,
}

/// Event: AdvisoryRecorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvisoryRecorded {
    pub subject_id: SubjectId,
    pub principal: PrincipalId,
    pub opinion: Opinion,
    pub occurred_at: DateTime<Utc>,
}

/// Event: SubjectDecided.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectDecided {
    pub subject_id: SubjectId,
    pub decision: Decision,
    pub decided_by: PrincipalId,
    pub comments: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubjectEvent {
    Submitted(SubjectSubmitted),
    AdvisoryRecorded(AdvisoryRecorded),
    Decided(SubjectDecided),
}

impl Event for SubjectEvent {
    fn event_type(&self) -> &'static str {
        match self {
            SubjectEvent::Submitted(_) => "decisions.subject.submitted",
            SubjectEvent::AdvisoryRecorded(_) => "decisions.subject.advisory_recorded",
            SubjectEvent::Decided(_) => "decisions.subject.decided",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            SubjectEvent::Submitted(e) => e.occurred_at,
            SubjectEvent::AdvisoryRecorded(e) => e.occurred_at,
            SubjectEvent::Decided(e) => e.occurred_at,
        }
    }
}

impl Aggregate for DecisionSubject {
    type Command = SubjectCommand;
    type Event = SubjectEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            SubjectEvent::Submitted(e) => {
                self.id = e.subject_id;
                self.kind = Some(e.kind);
                self.details = Some(e.details.clone());
                self.submitted_by = e.submitted_by;
                self.submitted_at = Some(e.occurred_at);
                self.status = SubjectStatus::Pending;
                self.submitted = true;
            }
            SubjectEvent::AdvisoryRecorded(e) => {
                let entry = AdvisoryEntry {
                    principal: e.principal,
                    opinion: e.opinion.clone(),
                    recorded_at: e.occurred_at,
                };
                // One entry per principal; a repeat keeps its original position.
                match self
                    .advisory_input
                    .iter_mut()
                    .find(|existing| existing.principal == e.principal)
                {
                    Some(existing) => *existing = entry,
                    None => self.advisory_input.push(entry),
                }
                if self.status == SubjectStatus::Pending {
                    self.status = SubjectStatus::UnderReview;
                }
            }
            SubjectEvent::Decided(e) => {
                self.decision = Some(e.decision);
                self.decided_by = Some(e.decided_by);
                self.decided_at = Some(e.occurred_at);
                self.decision_comments = e.comments.clone();
                self.status = SubjectStatus::Decided;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            SubjectCommand::Submit(cmd) => self.handle_submit(cmd),
            SubjectCommand::AddAdvisoryInput(cmd) => self.handle_advisory(cmd),
            SubjectCommand::Decide(cmd) => self.handle_decide(cmd),
        }
    }
}

impl DecisionSubject {
    fn ensure_subject_id(&self, subject_id: SubjectId) -> Result<(), DomainError> {
        if self.id != subject_id {
            return Err(DomainError::validation("subject_id mismatch"));
        }
        Ok(())
    }

    fn handle_submit(&self, cmd: &SubmitSubject) -> Result<Vec<SubjectEvent>, DomainError> {
        if self.submitted {
            return Err(DomainError::invalid_state("subject already submitted"));
        }
        self.ensure_subject_id(cmd.subject_id)?;

        if cmd.details.kind() != cmd.kind {
            return Err(DomainError::validation(format!(
                "details describe a {} but the subject is a {}",
                cmd.details.kind(),
                cmd.kind
            )));
        }
        cmd.details.validate()?;

        if let SubjectDetails::MembershipApplication { applicant, .. } = &cmd.details {
            if cmd.submitted_by != Some(*applicant) {
                return Err(DomainError::validation(
                    "a membership application must be filed by the applicant",
                ));
            }
        }

        Ok(vec![SubjectEvent::Submitted(SubjectSubmitted {
            subject_id: cmd.subject_id,
            kind: cmd.kind,
            submitted_by: cmd.submitted_by,
            details: cmd.details.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_advisory(&self, cmd: &RecordAdvisoryInput) -> Result<Vec<SubjectEvent>, DomainError> {
        if !self.submitted {
            return Err(DomainError::not_found());
        }
        self.ensure_subject_id(cmd.subject_id)?;

        if self.is_decided() {
            return Err(DomainError::invalid_state(
                "advisory input is closed once a subject is decided",
            ));
        }

        Ok(vec![SubjectEvent::AdvisoryRecorded(AdvisoryRecorded {
            subject_id: cmd.subject_id,
            principal: cmd.principal,
            opinion: cmd.opinion.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_decide(&self, cmd: &DecideSubject) -> Result<Vec<SubjectEvent>, DomainError> {
        if !self.submitted {
            return Err(DomainError::not_found());
        }
        self.ensure_subject_id(cmd.subject_id)?;

        if self.is_decided() {
            return Err(DomainError::AlreadyDecided);
        }

        let kind = self.kind.ok_or_else(DomainError::not_found)?;
        if !allowed_decisions(kind).contains(&cmd.decision) {
            return Err(DomainError::validation(format!(
                "'{}' is not a valid decision for {}",
                cmd.decision, kind
            )));
        }

        Ok(vec![SubjectEvent::Decided(SubjectDecided {
            subject_id: cmd.subject_id,
            decision: cmd.decision,
            decided_by: cmd.decided_by,
            comments: cmd.comments.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opinion::Stance;
    use proptest::prelude::*;

    fn resolution() -> SubjectDetails {
        SubjectDetails::Resolution {
            title: "Annual general meeting date".into(),
            description: "Hold the AGM on the first Saturday of March".into(),
        }
    }

    fn submit(id: SubjectId, details: SubjectDetails) -> SubjectCommand {
        submit_by(id, details, Some(PrincipalId::new()))
    }

    fn submit_by(
        id: SubjectId,
        details: SubjectDetails,
        submitted_by: Option<PrincipalId>,
    ) -> SubjectCommand {
        SubjectCommand::Submit(SubmitSubject {
            subject_id: id,
            kind: details.kind(),
            submitted_by,
            details,
            occurred_at: Utc::now(),
        })
    }

    fn advise(id: SubjectId, principal: PrincipalId, stance: Stance) -> SubjectCommand {
        SubjectCommand::AddAdvisoryInput(RecordAdvisoryInput {
            subject_id: id,
            principal,
            opinion: Opinion::new(stance),
            occurred_at: Utc::now(),
        })
    }

    fn decide(id: SubjectId, decision: Decision) -> SubjectCommand {
        SubjectCommand::Decide(DecideSubject {
            subject_id: id,
            decided_by: PrincipalId::new(),
            decision,
            comments: Some("Carried".into()),
            occurred_at: Utc::now(),
        })
    }

    fn execute(subject: &mut DecisionSubject, cmd: &SubjectCommand) -> Result<(), DomainError> {
        for event in subject.handle(cmd)? {
            subject.apply(&event);
        }
        Ok(())
    }

    fn submitted(details: SubjectDetails) -> DecisionSubject {
        let id = SubjectId::new();
        let mut subject = DecisionSubject::empty(id);
        execute(&mut subject, &submit(id, details)).unwrap();
        subject
    }

    fn application(applicant: PrincipalId) -> SubjectDetails {
        SubjectDetails::MembershipApplication {
            applicant,
            applied_membership_type: MembershipType::Executive,
            motivation: "Served on the events committee".into(),
        }
    }

    #[test]
    fn submit_creates_pending_subject() {
        let subject = submitted(resolution());
        assert!(subject.exists());
        assert_eq!(subject.status(), SubjectStatus::Pending);
        assert_eq!(subject.kind(), Some(SubjectKind::Resolution));
        assert_eq!(subject.version(), 1);
    }

    #[test]
    fn second_submit_is_invalid_state() {
        let mut subject = submitted(resolution());
        let id = subject.id_typed();
        let err = execute(&mut subject, &submit(id, resolution())).unwrap_err();
        assert!(matches!(err, DomainError::InvalidState(_)));
    }

    #[test]
    fn details_must_match_kind() {
        let id = SubjectId::new();
        let subject = DecisionSubject::empty(id);
        let cmd = SubjectCommand::Submit(SubmitSubject {
            subject_id: id,
            kind: SubjectKind::BudgetApproval,
            submitted_by: None,
            details: resolution(),
            occurred_at: Utc::now(),
        });
        assert!(matches!(subject.handle(&cmd), Err(DomainError::Validation(_))));
    }

    #[test]
    fn first_advisory_input_moves_to_under_review() {
        let mut subject = submitted(resolution());
        let id = subject.id_typed();
        execute(&mut subject, &advise(id, PrincipalId::new(), Stance::Support)).unwrap();

        assert_eq!(subject.status(), SubjectStatus::UnderReview);
        assert_eq!(subject.decision(), None);
    }

    #[test]
    fn repeated_advisory_input_replaces_in_place() {
        let mut subject = submitted(resolution());
        let id = subject.id_typed();
        let first = PrincipalId::new();
        let second = PrincipalId::new();

        execute(&mut subject, &advise(id, first, Stance::Support)).unwrap();
        execute(&mut subject, &advise(id, second, Stance::Abstain)).unwrap();
        execute(&mut subject, &advise(id, first, Stance::Oppose)).unwrap();

        let entries = subject.advisory_input();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].principal, first);
        assert_eq!(entries[0].opinion.stance, Stance::Oppose);
        assert_eq!(subject.tally().oppose, 1);
        assert_eq!(subject.tally().support, 0);
    }

    #[test]
    fn decide_is_terminal() {
        let mut subject = submitted(resolution());
        let id = subject.id_typed();
        execute(&mut subject, &decide(id, Decision::Referred)).unwrap();

        assert_eq!(subject.status(), SubjectStatus::Decided);
        assert_eq!(subject.decision(), Some(Decision::Referred));
        assert_eq!(subject.decision_comments(), Some("Carried"));

        let err = execute(&mut subject, &decide(id, Decision::Approved)).unwrap_err();
        assert_eq!(err, DomainError::AlreadyDecided);
        assert_eq!(subject.decision(), Some(Decision::Referred));

        let err = execute(&mut subject, &advise(id, PrincipalId::new(), Stance::Support)).unwrap_err();
        assert!(matches!(err, DomainError::InvalidState(_)));
    }

    #[test]
    fn decision_must_be_allowed_for_kind() {
        let subject = submitted(SubjectDetails::ExpenseApproval {
            description: "Printer toner".into(),
            amount_cents: 4_500,
            currency: "KES".into(),
        });
        let err = subject
            .handle(&decide(subject.id_typed(), Decision::Referred))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn unsubmitted_subject_is_not_found() {
        let id = SubjectId::new();
        let subject = DecisionSubject::empty(id);
        assert_eq!(
            subject.handle(&decide(id, Decision::Approved)).unwrap_err(),
            DomainError::NotFound
        );
    }

    #[test]
    fn approved_application_yields_membership_grant() {
        let applicant = PrincipalId::new();
        let id = SubjectId::new();
        let mut subject = DecisionSubject::empty(id);
        execute(&mut subject, &submit_by(id, application(applicant), Some(applicant))).unwrap();

        assert_eq!(
            subject.membership_grant(Decision::Approved),
            Some(MembershipGrant {
                applicant,
                membership_type: MembershipType::Executive
            })
        );
        assert_eq!(subject.membership_grant(Decision::Rejected), None);
        assert_eq!(subject.as_resource().owner, Some(applicant));
    }

    #[test]
    fn application_must_be_filed_by_applicant() {
        let applicant = PrincipalId::new();
        let id = SubjectId::new();
        let subject = DecisionSubject::empty(id);

        let on_behalf = submit_by(id, application(applicant), Some(PrincipalId::new()));
        assert!(matches!(subject.handle(&on_behalf), Err(DomainError::Validation(_))));

        let anonymous = submit_by(id, application(applicant), None);
        assert!(matches!(subject.handle(&anonymous), Err(DomainError::Validation(_))));
    }

    #[test]
    fn feedback_is_executive_visible() {
        let subject = submitted(SubjectDetails::Feedback {
            subject: "Hall booking".into(),
            message: "Who do I contact?".into(),
            contact_email: None,
        });
        assert_eq!(subject.as_resource().visibility, Visibility::Executive);
    }

    #[test]
    fn rehydrate_replays_log() {
        let id = SubjectId::new();
        let mut live = DecisionSubject::empty(id);
        let mut log = Vec::new();
        for cmd in [
            submit(id, resolution()),
            advise(id, PrincipalId::new(), Stance::Support),
            decide(id, Decision::Approved),
        ] {
            for event in live.handle(&cmd).unwrap() {
                live.apply(&event);
                log.push(event);
            }
        }

        let replayed = DecisionSubject::rehydrate(id, &log);
        assert_eq!(replayed, live);
        assert_eq!(replayed.status(), SubjectStatus::Decided);
        assert_eq!(replayed.version(), 3);
        assert_eq!(replayed.advisory_input().len(), 1);
    }

    fn stance_strategy() -> impl Strategy<Value = Stance> {
        prop_oneof![Just(Stance::Support), Just(Stance::Oppose), Just(Stance::Abstain)]
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        #[test]
        fn one_advisory_entry_per_principal(
            inputs in prop::collection::vec((0usize..4, stance_strategy()), 1..20)
        ) {
            let principals: Vec<PrincipalId> = (0..4).map(|_| PrincipalId::new()).collect();
            let mut subject = submitted(resolution());
            let id = subject.id_typed();

            for (who, stance) in &inputs {
                execute(&mut subject, &advise(id, principals[*who], *stance)).unwrap();
            }

            let mut expected_order: Vec<usize> = Vec::new();
            for (who, _) in &inputs {
                if !expected_order.contains(who) {
                    expected_order.push(*who);
                }
            }

            let entries = subject.advisory_input();
            prop_assert_eq!(entries.len(), expected_order.len());
            for (entry, who) in entries.iter().zip(&expected_order) {
                prop_assert_eq!(entry.principal, principals[*who]);
                let last = inputs.iter().rev().find(|(w, _)| w == who).map(|(_, s)| *s);
                prop_assert_eq!(Some(entry.opinion.stance), last);
            }
            prop_assert_eq!(subject.tally().total() as usize, entries.len());
            prop_assert!(subject.decision().is_none());
        }
    }
}
