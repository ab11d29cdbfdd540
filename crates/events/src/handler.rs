/// Execute an aggregate command in memory: decide, then evolve.
///
/// Returns the emitted events. On error the aggregate is untouched, because
/// `handle` never mutates and `apply` only runs once every event is decided.
///
/// For the persisted pipeline (store append + bus publish) use the
/// infrastructure `CommandDispatcher`.
pub fn execute<A>(aggregate: &mut A, command: &A::Command) -> Result<Vec<A::Event>, A::Error>
where
    A: propcrm_core::Aggregate,
{
    let events = A::handle(aggregate, command)?;
    for ev in &events {
        A::apply(aggregate, ev);
    }
    Ok(events)
}
