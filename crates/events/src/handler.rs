/// Execute an aggregate command deterministically (no IO, no storage).
///
/// Decide first, then apply each decided event. If `handle` rejects the
/// command nothing is applied, so the aggregate is left exactly as it was.
///
/// Useful for domain tests and replay tooling; the service layer goes through
/// the dispatcher so events are persisted and published as well.
pub fn execute<A>(aggregate: &mut A, command: &A::Command) -> Result<Vec<A::Event>, A::Error>
where
    A: tipjar_core::Aggregate,
{
    let events = A::handle(aggregate, command)?;
    for ev in &events {
        A::apply(aggregate, ev);
    }
    Ok(events)
}
