//! `scholaris-core`: shared domain primitives.
//!
//! Identifiers, the domain error model and the aggregate contract. No IO.

pub mod aggregate;
pub mod error;
pub mod id;

pub use aggregate::{Aggregate, AggregateRoot};
pub use error::{DomainError, DomainResult};
pub use id::{IdentityId, SchoolId};
