use serde::{Deserialize, Serialize};

use kacaf_auth::{resolve_capabilities, MembershipType, Principal, PrincipalId};
use kacaf_core::{SubjectId, SubjectKind};
use kacaf_decisions::{AdvisoryTally, DecisionSubject, Stance, SubjectDetails, SubjectStatus};
use kacaf_infra::AdvisoryReceipt;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct SubmitSubjectRequest {
    /// Client-chosen id; generated when absent. Resubmitting a taken id is an
    /// `invalid_state` conflict.
    pub id: Option<SubjectId>,
    pub kind: SubjectKind,
    pub details: SubjectDetails,
}

#[derive(Debug, Deserialize)]
pub struct AdviceRequest {
    pub stance: Stance,
    pub note: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DecisionRequest {
    /// Parsed by the handler so unknown options surface as validation errors.
    pub decision: String,
    pub comments: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PendingQuery {
    pub kind: Option<SubjectKind>,
}

#[derive(Debug, Deserialize)]
pub struct AuthorizationQuery {
    /// `read`, `submit`, `advise`, `decide`, or a full action name such as `decide:resolution`.
    pub action: String,
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
pub struct SubjectView<'a> {
    #[serde(flatten)]
    pub subject: &'a DecisionSubject,
    pub tally: AdvisoryTally,
}

impl<'a> SubjectView<'a> {
    pub fn new(subject: &'a DecisionSubject) -> Self {
        Self {
            subject,
            tally: subject.tally(),
        }
    }
}

/// Advice acknowledgement for callers who may not read the subject itself.
#[derive(Debug, Serialize)]
pub struct AdviceAck {
    pub id: SubjectId,
    pub status: SubjectStatus,
    pub tally: AdvisoryTally,
}

impl From<&AdvisoryReceipt> for AdviceAck {
    fn from(receipt: &AdvisoryReceipt) -> Self {
        Self {
            id: receipt.subject_id,
            status: receipt.status,
            tally: receipt.tally,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct WhoAmI {
    pub principal_id: Option<PrincipalId>,
    pub display_name: Option<String>,
    pub membership_type: Option<MembershipType>,
    pub is_verified: bool,
    pub is_superuser: bool,
    pub capabilities: Vec<&'static str>,
}

impl WhoAmI {
    pub fn from_principal(principal: Option<&Principal>) -> Self {
        Self {
            principal_id: principal.map(|p| p.id),
            display_name: principal.map(|p| p.display_name.clone()),
            membership_type: principal.map(|p| p.membership_type),
            is_verified: principal.is_some_and(|p| p.is_verified),
            is_superuser: principal.is_some_and(|p| p.is_superuser),
            capabilities: resolve_capabilities(principal).names(),
        }
    }
}
