use core::str::FromStr;

use serde::{Deserialize, Serialize};

use kacaf_core::{DomainError, SubjectKind};

use crate::capabilities::{resolve_capabilities, Capability, CapabilitySet};
use crate::principal::{Principal, PrincipalId};

/// What the caller wants to do.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Action {
    Read,
    WriteOwn,
    WriteAny,
    /// Record the final ruling on a subject of this kind.
    Decide(SubjectKind),
    /// Create a new subject of this kind.
    Submit(SubjectKind),
    /// Add a non-binding opinion to a subject of this kind.
    Advise(SubjectKind),
}

impl Action {
    pub fn name(&self) -> String {
        match self {
            Action::Read => "read".to_string(),
            Action::WriteOwn => "write-own".to_string(),
            Action::WriteAny => "write-any".to_string(),
            Action::Decide(kind) => format!("decide:{kind}"),
            Action::Submit(kind) => format!("submit:{kind}"),
            Action::Advise(kind) => format!("advise:{kind}"),
        }
    }
}

impl core::fmt::Display for Action {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.name())
    }
}

impl FromStr for Action {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "read" => return Ok(Action::Read),
            "write-own" => return Ok(Action::WriteOwn),
            "write-any" => return Ok(Action::WriteAny),
            _ => {}
        }

        let (verb, kind) = s
            .split_once(':')
            .ok_or_else(|| DomainError::validation(format!("unknown action '{s}'")))?;
        let kind: SubjectKind = kind.parse()?;

        match verb {
            "decide" => Ok(Action::Decide(kind)),
            "submit" => Ok(Action::Submit(kind)),
            "advise" => Ok(Action::Advise(kind)),
            _ => Err(DomainError::validation(format!("unknown action '{s}'"))),
        }
    }
}

/// Who may read a resource beyond its owner.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Public,
    Members,
    Executive,
    Restricted,
}

/// The target of an action, reduced to what the policy needs.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Resource {
    pub owner: Option<PrincipalId>,
    pub visibility: Visibility,
}

impl Resource {
    pub fn public() -> Self {
        Self {
            owner: None,
            visibility: Visibility::Public,
        }
    }

    pub fn owned_by(owner: PrincipalId, visibility: Visibility) -> Self {
        Self {
            owner: Some(owner),
            visibility,
        }
    }

    pub fn unowned(visibility: Visibility) -> Self {
        Self {
            owner: None,
            visibility,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    InsufficientRole,
    NotAuthorized,
}

impl DenyReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DenyReason::InsufficientRole => "insufficient_role",
            DenyReason::NotAuthorized => "not_authorized",
        }
    }
}

impl core::fmt::Display for DenyReason {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Authorization {
    Allow,
    Deny(DenyReason),
}

impl Authorization {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Authorization::Allow)
    }

    pub fn into_result(self) -> Result<(), DenyReason> {
        match self {
            Authorization::Allow => Ok(()),
            Authorization::Deny(reason) => Err(reason),
        }
    }
}

/// Which row of the rule table produced a verdict.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyRule {
    Superuser,
    PublicRead,
    WriteOwn,
    WriteAny,
    Decide,
    ScopedRead,
    Submit,
    Advise,
    Default,
}

/// The capability that carries final-decision authority for a subject kind.
pub fn required_authority(kind: SubjectKind) -> Capability {
    match kind {
        SubjectKind::MembershipApplication
        | SubjectKind::DisciplinaryAction
        | SubjectKind::Resolution => Capability::Chairperson,
        SubjectKind::ExpenseApproval | SubjectKind::BudgetApproval => Capability::FinancialManager,
        SubjectKind::Feedback => Capability::Staff,
    }
}

/// Authorize an action, resolving capabilities from the principal.
///
/// - No IO
/// - No panics
/// - Pure policy check; `None` is the anonymous caller
pub fn authorize(
    principal: Option<&Principal>,
    action: &Action,
    resource: Option<&Resource>,
) -> Authorization {
    let caps = resolve_capabilities(principal);
    authorize_with(principal, &caps, action, resource)
}

/// Same as [`authorize`] with capabilities resolved once by the caller.
pub fn authorize_with(
    principal: Option<&Principal>,
    caps: &CapabilitySet,
    action: &Action,
    resource: Option<&Resource>,
) -> Authorization {
    evaluate(principal, caps, action, resource).1
}

fn evaluate(
    principal: Option<&Principal>,
    caps: &CapabilitySet,
    action: &Action,
    resource: Option<&Resource>,
) -> (PolicyRule, Authorization) {
    use Authorization::{Allow, Deny};

    let caller = principal.map(|p| p.id);
    let by_role = |granted: bool| if granted { Allow } else { Deny(DenyReason::InsufficientRole) };

    if principal.is_some_and(|p| p.is_superuser) {
        return (PolicyRule::Superuser, Allow);
    }

    match (action, resource) {
        (Action::Read, Some(r)) if r.visibility == Visibility::Public => (PolicyRule::PublicRead, Allow),
        (Action::WriteOwn, r) => {
            let owns = caller.is_some() && r.and_then(|r| r.owner) == caller;
            let verdict = if owns { Allow } else { Deny(DenyReason::NotAuthorized) };
            (PolicyRule::WriteOwn, verdict)
        }
        (Action::WriteAny, _) => (PolicyRule::WriteAny, by_role(caps.contains(Capability::Staff))),
        (Action::Decide(kind), _) => (
            PolicyRule::Decide,
            by_role(caps.contains(required_authority(*kind))),
        ),
        (Action::Read, Some(r)) => {
            if caller.is_some() && r.owner == caller {
                return (PolicyRule::ScopedRead, Allow);
            }
            let verdict = match r.visibility {
                Visibility::Public => Allow,
                Visibility::Members => by_role(caps.contains(Capability::Member)),
                Visibility::Executive => by_role(
                    caps.contains(Capability::Executive) || caps.contains(Capability::Staff),
                ),
                Visibility::Restricted => Deny(DenyReason::NotAuthorized),
            };
            (PolicyRule::ScopedRead, verdict)
        }
        (Action::Submit(kind), _) => (
            PolicyRule::Submit,
            by_role(kind.accepts_public_submission() || caps.contains(Capability::Member)),
        ),
        (Action::Advise(_), _) => (
            PolicyRule::Advise,
            by_role(caps.contains(Capability::Member) || caps.contains(Capability::Executive)),
        ),
        (Action::Read, None) => (PolicyRule::Default, Deny(DenyReason::NotAuthorized)),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Authorization Explanation (Audit Trail)
// ─────────────────────────────────────────────────────────────────────────────

/// Detailed explanation of an authorization decision.
#[derive(Debug, Clone, Serialize)]
pub struct AuthorizationExplanation {
    pub action: String,
    pub granted: bool,
    pub rule: PolicyRule,
    pub reason: String,
    /// `None` for anonymous callers.
    pub principal: Option<PrincipalState>,
    pub denial: Option<DenialDetails>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PrincipalState {
    pub principal_id: PrincipalId,
    pub is_superuser: bool,
    pub capabilities: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DenialDetails {
    pub reason: DenyReason,
    pub message: String,
    pub suggestions: Vec<String>,
}

/// Explain why an authorization decision was made (or would be made).
///
/// Produces the same verdict as [`authorize`], plus the rule that fired and
/// what the caller would need to be granted access.
pub fn explain_authorization(
    principal: Option<&Principal>,
    action: &Action,
    resource: Option<&Resource>,
) -> AuthorizationExplanation {
    let caps = resolve_capabilities(principal);
    let (rule, verdict) = evaluate(principal, &caps, action, resource);

    let state = principal.map(|p| PrincipalState {
        principal_id: p.id,
        is_superuser: p.is_superuser,
        capabilities: caps.names().into_iter().map(str::to_string).collect(),
    });

    let reason = match (rule, verdict) {
        (PolicyRule::Superuser, _) => "Principal is a platform superuser".to_string(),
        (PolicyRule::PublicRead, _) => "Resource is public".to_string(),
        (_, Authorization::Allow) => format!("Rule '{}' grants '{}'", rule_name(rule), action),
        (_, Authorization::Deny(reason)) => {
            format!("Rule '{}' denies '{}': {}", rule_name(rule), action, reason)
        }
    };

    let denial = match verdict {
        Authorization::Allow => None,
        Authorization::Deny(reason) => Some(DenialDetails {
            reason,
            message: denial_message(action, principal.is_none()),
            suggestions: suggestions(action, principal.is_none()),
        }),
    };

    AuthorizationExplanation {
        action: action.name(),
        granted: verdict.is_allowed(),
        rule,
        reason,
        principal: state,
        denial,
    }
}

fn rule_name(rule: PolicyRule) -> &'static str {
    match rule {
        PolicyRule::Superuser => "superuser",
        PolicyRule::PublicRead => "public_read",
        PolicyRule::WriteOwn => "write_own",
        PolicyRule::WriteAny => "write_any",
        PolicyRule::Decide => "decide",
        PolicyRule::ScopedRead => "scoped_read",
        PolicyRule::Submit => "submit",
        PolicyRule::Advise => "advise",
        PolicyRule::Default => "default",
    }
}

fn denial_message(action: &Action, anonymous: bool) -> String {
    if anonymous {
        return format!("Anonymous callers may not perform '{action}'");
    }
    match action {
        Action::Decide(kind) => format!(
            "Deciding {} requires the '{}' capability",
            kind,
            required_authority(*kind)
        ),
        Action::WriteAny => "Writing other principals' records requires the 'staff' capability".to_string(),
        Action::WriteOwn => "Only the owner may modify this record".to_string(),
        Action::Read => "The resource is not visible to this principal".to_string(),
        Action::Submit(kind) => format!("Submitting {kind} requires membership"),
        Action::Advise(kind) => format!("Advising on {kind} requires membership"),
    }
}

fn suggestions(action: &Action, anonymous: bool) -> Vec<String> {
    let mut out = Vec::new();
    if anonymous {
        out.push("Authenticate with a bearer token".to_string());
    }
    match action {
        Action::Decide(kind) => {
            let needed = required_authority(*kind);
            out.push(format!(
                "Route the subject to the principal holding '{needed}' with an active seat"
            ));
            out.push("Check that the executive position has not been deactivated".to_string());
        }
        Action::WriteAny => out.push("Ask a staff member to make the change".to_string()),
        _ => {}
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::principal::ExecutivePosition;

    fn member() -> Principal {
        Principal::member(PrincipalId::new())
    }

    fn seated(position: ExecutivePosition) -> Principal {
        member().with_position(position, true)
    }

    #[test]
    fn superuser_overrides_every_rule() {
        let root = member().superuser();
        for action in [
            Action::WriteAny,
            Action::Decide(SubjectKind::MembershipApplication),
            Action::Read,
        ] {
            assert_eq!(authorize(Some(&root), &action, None), Authorization::Allow);
        }
    }

    #[test]
    fn anyone_reads_public_resources() {
        let public = Resource::public();
        assert!(authorize(None, &Action::Read, Some(&public)).is_allowed());
        assert!(authorize(Some(&member()), &Action::Read, Some(&public)).is_allowed());
    }

    #[test]
    fn write_own_requires_ownership() {
        let owner = member();
        let other = member();
        let resource = Resource::owned_by(owner.id, Visibility::Members);

        assert!(authorize(Some(&owner), &Action::WriteOwn, Some(&resource)).is_allowed());
        assert_eq!(
            authorize(Some(&other), &Action::WriteOwn, Some(&resource)),
            Authorization::Deny(DenyReason::NotAuthorized)
        );
        assert_eq!(
            authorize(None, &Action::WriteOwn, Some(&Resource::public())),
            Authorization::Deny(DenyReason::NotAuthorized)
        );
    }

    #[test]
    fn write_any_requires_staff() {
        assert!(authorize(Some(&member().staff()), &Action::WriteAny, None).is_allowed());
        assert!(!authorize(Some(&member()), &Action::WriteAny, None).is_allowed());
    }

    #[test]
    fn treasurer_decides_expenses_but_not_applications() {
        let treasurer = seated(ExecutivePosition::Treasurer);

        assert!(authorize(Some(&treasurer), &Action::Decide(SubjectKind::ExpenseApproval), None).is_allowed());
        assert!(authorize(Some(&treasurer), &Action::Decide(SubjectKind::BudgetApproval), None).is_allowed());
        assert_eq!(
            authorize(Some(&treasurer), &Action::Decide(SubjectKind::MembershipApplication), None),
            Authorization::Deny(DenyReason::InsufficientRole)
        );
    }

    #[test]
    fn chairperson_decides_everything_governance_and_finance() {
        let chair = seated(ExecutivePosition::Chairperson);
        for kind in [
            SubjectKind::MembershipApplication,
            SubjectKind::DisciplinaryAction,
            SubjectKind::Resolution,
            SubjectKind::ExpenseApproval,
            SubjectKind::BudgetApproval,
        ] {
            assert!(authorize(Some(&chair), &Action::Decide(kind), None).is_allowed(), "{kind}");
        }
        assert!(!authorize(Some(&chair), &Action::Decide(SubjectKind::Feedback), None).is_allowed());
    }

    #[test]
    fn inactive_chair_cannot_decide() {
        let former = member().with_position(ExecutivePosition::Chairperson, false);
        assert_eq!(
            authorize(Some(&former), &Action::Decide(SubjectKind::Resolution), None),
            Authorization::Deny(DenyReason::InsufficientRole)
        );
    }

    #[test]
    fn anonymous_may_submit_feedback_only() {
        assert!(authorize(None, &Action::Submit(SubjectKind::Feedback), None).is_allowed());
        assert!(!authorize(None, &Action::Submit(SubjectKind::Resolution), None).is_allowed());
        assert!(!authorize(None, &Action::Decide(SubjectKind::Feedback), None).is_allowed());
        assert!(!authorize(None, &Action::Advise(SubjectKind::Feedback), None).is_allowed());
    }

    #[test]
    fn scoped_reads_follow_visibility() {
        let exec_only = Resource::unowned(Visibility::Executive);
        let members = Resource::unowned(Visibility::Members);
        let restricted_owned = Resource::owned_by(PrincipalId::new(), Visibility::Restricted);

        assert!(!authorize(Some(&member()), &Action::Read, Some(&exec_only)).is_allowed());
        assert!(authorize(Some(&seated(ExecutivePosition::Secretary)), &Action::Read, Some(&exec_only)).is_allowed());
        assert!(authorize(Some(&member().staff()), &Action::Read, Some(&exec_only)).is_allowed());
        assert!(authorize(Some(&member()), &Action::Read, Some(&members)).is_allowed());
        assert!(!authorize(None, &Action::Read, Some(&members)).is_allowed());
        assert!(!authorize(Some(&member()), &Action::Read, Some(&restricted_owned)).is_allowed());
    }

    #[test]
    fn owner_reads_own_restricted_resource() {
        let owner = member();
        let resource = Resource::owned_by(owner.id, Visibility::Restricted);
        assert!(authorize(Some(&owner), &Action::Read, Some(&resource)).is_allowed());
    }

    #[test]
    fn read_without_resource_falls_through_to_default() {
        assert_eq!(
            authorize(Some(&member()), &Action::Read, None),
            Authorization::Deny(DenyReason::NotAuthorized)
        );
    }

    #[test]
    fn action_names_parse_back() {
        for action in [
            Action::Read,
            Action::WriteOwn,
            Action::WriteAny,
            Action::Decide(SubjectKind::BudgetApproval),
            Action::Submit(SubjectKind::Feedback),
            Action::Advise(SubjectKind::Resolution),
        ] {
            assert_eq!(action.name().parse::<Action>().unwrap(), action);
        }
        assert!("approve:resolution".parse::<Action>().is_err());
        assert!("decide".parse::<Action>().is_err());
    }

    #[test]
    fn explanation_names_missing_capability() {
        let treasurer = seated(ExecutivePosition::Treasurer);
        let explanation = explain_authorization(
            Some(&treasurer),
            &Action::Decide(SubjectKind::Resolution),
            None,
        );

        assert!(!explanation.granted);
        assert_eq!(explanation.rule, PolicyRule::Decide);
        let denial = explanation.denial.unwrap();
        assert_eq!(denial.reason, DenyReason::InsufficientRole);
        assert!(denial.message.contains("chairperson"));
        let state = explanation.principal.unwrap();
        assert!(state.capabilities.contains(&"treasurer".to_string()));
    }

    #[test]
    fn explanation_matches_verdict_for_anonymous() {
        let explanation = explain_authorization(None, &Action::Submit(SubjectKind::Feedback), None);
        assert!(explanation.granted);
        assert!(explanation.principal.is_none());
        assert!(explanation.denial.is_none());
    }
}
