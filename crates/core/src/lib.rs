//! `kacaf-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives shared by the authorization
//! and decision-workflow crates (no infrastructure concerns).

pub mod aggregate;
pub mod error;
pub mod id;
pub mod kind;

pub use aggregate::{Aggregate, AggregateRoot, ExpectedVersion};
pub use error::{DomainError, DomainResult};
pub use id::{PrincipalId, SubjectId};
pub use kind::SubjectKind;
