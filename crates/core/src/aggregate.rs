//! Aggregate traits shared by every event-sourced model in the marketplace.

use crate::error::{DomainError, DomainResult};

/// Identity and version of an aggregate.
pub trait AggregateRoot {
    /// Strongly-typed aggregate identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    fn id(&self) -> &Self::Id;

    /// Number of events applied so far (the stream revision).
    fn version(&self) -> u64;
}

/// Optimistic concurrency expectation for an append.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ExpectedVersion {
    /// Append regardless of the current stream revision.
    Any,
    /// Append only if the stream is exactly at this revision.
    Exact(u64),
}

impl ExpectedVersion {
    pub fn matches(self, actual: u64) -> bool {
        match self {
            ExpectedVersion::Any => true,
            ExpectedVersion::Exact(v) => v == actual,
        }
    }

    pub fn check(self, actual: u64) -> DomainResult<()> {
        if self.matches(actual) {
            Ok(())
        } else {
            Err(DomainError::conflict(format!(
                "stream moved on (expected: {self:?}, actual: {actual})"
            )))
        }
    }
}

/// Decide/evolve contract for event-sourced aggregates.
///
/// `handle` inspects current state and returns the events a command produces,
/// without mutating anything. `apply` folds one event into state and bumps the
/// version by one. Neither may perform IO.
pub trait Aggregate: AggregateRoot {
    type Command: Clone + core::fmt::Debug;
    type Event: Clone + core::fmt::Debug;
    type Error: core::fmt::Debug;

    fn apply(&mut self, event: &Self::Event);

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error>;
}
