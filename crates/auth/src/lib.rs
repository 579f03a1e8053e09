//! `kacaf-auth`: role registry and policy evaluator.
//!
//! Pure functions over principal attributes: no storage, no HTTP. Request
//! handlers resolve the caller's `Principal`, derive a `CapabilitySet` and ask
//! `authorize` for a verdict.

pub mod authorize;
pub mod capabilities;
pub mod claims;
pub mod principal;

pub use authorize::{
    authorize, authorize_with, explain_authorization, required_authority, Action, Authorization,
    AuthorizationExplanation, DenialDetails, DenyReason, PolicyRule, PrincipalState, Resource,
    Visibility,
};
pub use capabilities::{resolve_capabilities, Capability, CapabilitySet};
pub use claims::{validate_claims, Hs256JwtValidator, JwtClaims, JwtValidator, TokenValidationError};
pub use principal::{ExecutivePosition, MembershipType, Principal, PrincipalId};
