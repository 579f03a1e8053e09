use kacaf_auth::{Principal, PrincipalId};

/// Caller identity for a request. `None` means anonymous.
///
/// Holds the account as loaded at request start; capabilities are derived
/// from it per operation and never cached here.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PrincipalContext {
    principal: Option<Principal>,
}

impl PrincipalContext {
    pub fn anonymous() -> Self {
        Self { principal: None }
    }

    pub fn authenticated(principal: Principal) -> Self {
        Self {
            principal: Some(principal),
        }
    }

    pub fn principal(&self) -> Option<&Principal> {
        self.principal.as_ref()
    }

    pub fn principal_id(&self) -> Option<PrincipalId> {
        self.principal.as_ref().map(|p| p.id)
    }

    pub fn is_anonymous(&self) -> bool {
        self.principal.is_none()
    }
}
