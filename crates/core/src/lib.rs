//! `propcrm-core`: domain building blocks shared by every crate.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod aggregate;
pub mod error;
pub mod id;
pub mod money;
pub mod value_object;

pub use aggregate::{Aggregate, AggregateRoot, ExpectedVersion};
pub use error::{DomainError, DomainResult};
pub use id::{AggregateId, OpportunityId, OrganizationId, PropertyId, ProspectId, UserId};
pub use money::{Currency, Money, Percentage};
pub use value_object::ValueObject;
