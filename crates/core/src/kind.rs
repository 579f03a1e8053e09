//! Kinds of records that require a single final ruling.

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// The decision-subject variants known to the workflow.
///
/// Shared between the policy evaluator (who may decide what) and the
/// workflow (what a subject looks like), hence it lives in core.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubjectKind {
    MembershipApplication,
    DisciplinaryAction,
    Resolution,
    ExpenseApproval,
    BudgetApproval,
    /// Public-facing feedback/contact message; anyone may submit.
    Feedback,
}

impl SubjectKind {
    pub const ALL: [SubjectKind; 6] = [
        SubjectKind::MembershipApplication,
        SubjectKind::DisciplinaryAction,
        SubjectKind::Resolution,
        SubjectKind::ExpenseApproval,
        SubjectKind::BudgetApproval,
        SubjectKind::Feedback,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SubjectKind::MembershipApplication => "membership_application",
            SubjectKind::DisciplinaryAction => "disciplinary_action",
            SubjectKind::Resolution => "resolution",
            SubjectKind::ExpenseApproval => "expense_approval",
            SubjectKind::BudgetApproval => "budget_approval",
            SubjectKind::Feedback => "feedback",
        }
    }

    /// Whether anonymous callers may submit this kind.
    pub fn accepts_public_submission(&self) -> bool {
        matches!(self, SubjectKind::Feedback)
    }

    /// Stream/aggregate type name used when persisting events.
    pub fn aggregate_type(&self) -> String {
        format!("decisions.{}", self.as_str())
    }
}

impl core::fmt::Display for SubjectKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubjectKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SubjectKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| DomainError::validation(format!("unknown subject kind '{s}'")))
    }
}
