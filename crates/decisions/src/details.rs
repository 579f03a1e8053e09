use serde::{Deserialize, Serialize};

use kacaf_auth::{MembershipType, PrincipalId};
use kacaf_core::{DomainError, DomainResult, SubjectKind};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisciplinaryActionType {
    Warning,
    Suspension,
    Expulsion,
    Reprimand,
}

/// Kind-specific payload of a decision subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SubjectDetails {
    MembershipApplication {
        applicant: PrincipalId,
        applied_membership_type: MembershipType,
        motivation: String,
    },
    DisciplinaryAction {
        member: PrincipalId,
        action_type: DisciplinaryActionType,
        grounds: String,
    },
    Resolution {
        title: String,
        description: String,
    },
    ExpenseApproval {
        description: String,
        amount_cents: u64,
        currency: String,
    },
    BudgetApproval {
        name: String,
        total_amount_cents: u64,
        currency: String,
    },
    Feedback {
        subject: String,
        message: String,
        #[serde(default)]
        contact_email: Option<String>,
    },
}

impl SubjectDetails {
    pub fn kind(&self) -> SubjectKind {
        match self {
            SubjectDetails::MembershipApplication { .. } => SubjectKind::MembershipApplication,
            SubjectDetails::DisciplinaryAction { .. } => SubjectKind::DisciplinaryAction,
            SubjectDetails::Resolution { .. } => SubjectKind::Resolution,
            SubjectDetails::ExpenseApproval { .. } => SubjectKind::ExpenseApproval,
            SubjectDetails::BudgetApproval { .. } => SubjectKind::BudgetApproval,
            SubjectDetails::Feedback { .. } => SubjectKind::Feedback,
        }
    }

    /// The principal a subject is about, if any.
    pub fn concerned_principal(&self) -> Option<PrincipalId> {
        match self {
            SubjectDetails::MembershipApplication { applicant, .. } => Some(*applicant),
            SubjectDetails::DisciplinaryAction { member, .. } => Some(*member),
            _ => None,
        }
    }

    pub fn validate(&self) -> DomainResult<()> {
        match self {
            SubjectDetails::MembershipApplication { motivation, .. } => {
                require_text("motivation", motivation)
            }
            SubjectDetails::DisciplinaryAction { grounds, .. } => require_text("grounds", grounds),
            SubjectDetails::Resolution { title, description } => {
                require_text("title", title)?;
                require_text("description", description)
            }
            SubjectDetails::ExpenseApproval {
                description,
                amount_cents,
                currency,
            } => {
                require_text("description", description)?;
                require_positive("amount_cents", *amount_cents)?;
                require_currency(currency)
            }
            SubjectDetails::BudgetApproval {
                name,
                total_amount_cents,
                currency,
            } => {
                require_text("name", name)?;
                require_positive("total_amount_cents", *total_amount_cents)?;
                require_currency(currency)
            }
            SubjectDetails::Feedback {
                subject,
                message,
                contact_email,
            } => {
                require_text("subject", subject)?;
                require_text("message", message)?;
                match contact_email {
                    Some(email) if !email.contains('@') => {
                        Err(DomainError::validation("contact_email is not an email address"))
                    }
                    _ => Ok(()),
                }
            }
        }
    }
}

fn require_text(field: &str, value: &str) -> DomainResult<()> {
    if value.trim().is_empty() {
        return Err(DomainError::validation(format!("{field} cannot be empty")));
    }
    Ok(())
}

fn require_positive(field: &str, value: u64) -> DomainResult<()> {
    if value == 0 {
        return Err(DomainError::validation(format!("{field} must be positive")));
    }
    Ok(())
}

// ISO 4217 shape only.
fn require_currency(code: &str) -> DomainResult<()> {
    if code.len() != 3 || !code.chars().all(|c| c.is_ascii_uppercase()) {
        return Err(DomainError::validation(format!(
            "currency must be a three-letter code, got '{code}'"
        )));
    }
    Ok(())
}
