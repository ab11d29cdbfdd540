use propcrm_core::AggregateId;

/// A command targets exactly one aggregate instance.
///
/// Commands express intent and are never persisted; the events they produce
/// are. Rejected commands leave no trace in the stream.
pub trait Command: Clone + core::fmt::Debug + Send + Sync + 'static {
    fn target_aggregate_id(&self) -> AggregateId;
}
