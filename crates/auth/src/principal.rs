use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use kacaf_core::PrincipalId;

/// Membership category held by an account.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MembershipType {
    #[default]
    Ordinary,
    Executive,
    Honorary,
}

/// Executive committee seats.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutivePosition {
    Chairperson,
    ViceChairperson,
    Secretary,
    AssistantSecretary,
    Treasurer,
    OrganizingSecretary,
    CommitteeMember,
}

impl ExecutivePosition {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutivePosition::Chairperson => "chairperson",
            ExecutivePosition::ViceChairperson => "vice_chairperson",
            ExecutivePosition::Secretary => "secretary",
            ExecutivePosition::AssistantSecretary => "assistant_secretary",
            ExecutivePosition::Treasurer => "treasurer",
            ExecutivePosition::OrganizingSecretary => "organizing_secretary",
            ExecutivePosition::CommitteeMember => "committee_member",
        }
    }
}

/// A registered account as seen by the authorization layer.
///
/// Owned by the account subsystem; the role registry only reads it. The
/// single write path used by the workflow is [`Principal::apply_membership_approval`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: PrincipalId,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub is_staff: bool,
    #[serde(default)]
    pub is_superuser: bool,
    #[serde(default)]
    pub membership_type: MembershipType,
    #[serde(default)]
    pub executive_position: Option<ExecutivePosition>,
    #[serde(default)]
    pub position_active: bool,
    #[serde(default)]
    pub is_verified: bool,
    #[serde(default)]
    pub verified_at: Option<DateTime<Utc>>,
}

impl Principal {
    /// A plain ordinary member with no seat and no staff flags.
    pub fn member(id: PrincipalId) -> Self {
        Self {
            id,
            display_name: String::new(),
            email: String::new(),
            is_staff: false,
            is_superuser: false,
            membership_type: MembershipType::Ordinary,
            executive_position: None,
            position_active: false,
            is_verified: false,
            verified_at: None,
        }
    }

    pub fn with_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = display_name.into();
        self
    }

    /// Seat the principal on the executive committee.
    pub fn with_position(mut self, position: ExecutivePosition, active: bool) -> Self {
        self.executive_position = Some(position);
        self.position_active = active;
        self
    }

    pub fn staff(mut self) -> Self {
        self.is_staff = true;
        self
    }

    pub fn superuser(mut self) -> Self {
        self.is_superuser = true;
        self
    }

    /// Whether the principal currently occupies `position`.
    ///
    /// An inactive or expired seat never counts.
    pub fn holds(&self, position: ExecutivePosition) -> bool {
        self.position_active && self.executive_position == Some(position)
    }

    /// Effect of an approved membership application. Idempotent.
    pub fn apply_membership_approval(&mut self, membership_type: MembershipType, at: DateTime<Utc>) {
        self.membership_type = membership_type;
        self.is_verified = true;
        self.verified_at = Some(at);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inactive_seat_is_not_held() {
        let p = Principal::member(PrincipalId::new())
            .with_position(ExecutivePosition::Chairperson, false);
        assert!(!p.holds(ExecutivePosition::Chairperson));
    }

    #[test]
    fn membership_approval_is_idempotent() {
        let at = Utc::now();
        let mut p = Principal::member(PrincipalId::new());
        p.apply_membership_approval(MembershipType::Honorary, at);
        let once = p.clone();
        p.apply_membership_approval(MembershipType::Honorary, at);

        assert_eq!(p, once);
        assert!(p.is_verified);
        assert_eq!(p.verified_at, Some(at));
    }

    #[test]
    fn deserializes_with_defaults() {
        let id = PrincipalId::new();
        let p: Principal = serde_json::from_value(serde_json::json!({
            "id": id.to_string(),
            "executive_position": "treasurer",
            "position_active": true,
        }))
        .unwrap();

        assert_eq!(p.membership_type, MembershipType::Ordinary);
        assert!(p.holds(ExecutivePosition::Treasurer));
        assert!(!p.is_staff);
    }
}
