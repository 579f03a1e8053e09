//! Role registry: principal attributes -> capability tags.
//!
//! Capabilities are derived on every call from the principal's current
//! attributes and never persisted, so a seat change takes effect on the next
//! request.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::principal::{ExecutivePosition, Principal};

/// A derived permission tag (not a stored role name).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Member,
    Staff,
    Executive,
    Chairperson,
    Treasurer,
    FinancialManager,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Member => "member",
            Capability::Staff => "staff",
            Capability::Executive => "executive",
            Capability::Chairperson => "chairperson",
            Capability::Treasurer => "treasurer",
            Capability::FinancialManager => "financial_manager",
        }
    }
}

impl core::fmt::Display for Capability {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered set of capabilities held by one principal for one request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CapabilitySet(BTreeSet<Capability>);

impl CapabilitySet {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn contains(&self, capability: Capability) -> bool {
        self.0.contains(&capability)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Capability> + '_ {
        self.0.iter().copied()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.iter().map(|c| c.as_str()).collect()
    }

    fn insert(&mut self, capability: Capability) {
        self.0.insert(capability);
    }
}

impl FromIterator<Capability> for CapabilitySet {
    fn from_iter<I: IntoIterator<Item = Capability>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Resolve the capability set of a (possibly anonymous) principal.
///
/// Superuser status is deliberately absent here; the policy evaluator applies
/// it as an override.
pub fn resolve_capabilities(principal: Option<&Principal>) -> CapabilitySet {
    let mut caps = CapabilitySet::empty();
    let Some(p) = principal else {
        return caps;
    };

    caps.insert(Capability::Member);

    if p.is_staff {
        caps.insert(Capability::Staff);
    }

    if p.position_active && p.executive_position.is_some() {
        caps.insert(Capability::Executive);
    }

    let chair = p.holds(ExecutivePosition::Chairperson);
    let treasurer = p.holds(ExecutivePosition::Treasurer);

    if chair {
        caps.insert(Capability::Chairperson);
    }
    if treasurer {
        caps.insert(Capability::Treasurer);
    }
    if chair || treasurer {
        caps.insert(Capability::FinancialManager);
    }

    caps
}
