//! `quickdrop-core`: shared domain primitives for the delivery marketplace.
//!
//! Pure domain code only: identifiers, the error model, aggregate traits and
//! money. Nothing in here performs IO.

pub mod aggregate;
pub mod error;
pub mod id;
pub mod money;

pub use aggregate::{Aggregate, AggregateRoot, ExpectedVersion};
pub use error::{DomainError, DomainResult};
pub use id::{AggregateId, TenantId, UserId};
pub use money::Money;
