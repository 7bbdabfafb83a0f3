use quickdrop_core::Aggregate;

/// Decide and evolve in one step, without a store.
///
/// Runs `handle` and then `apply`s each resulting event to `aggregate`.
/// Domain unit tests use this to drive an aggregate through a lifecycle;
/// production code goes through the command dispatcher so events are persisted.
pub fn execute<A>(aggregate: &mut A, command: &A::Command) -> Result<Vec<A::Event>, A::Error>
where
    A: Aggregate,
{
    let events = aggregate.handle(command)?;
    for ev in &events {
        aggregate.apply(ev);
    }
    Ok(events)
}
