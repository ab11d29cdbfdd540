use chrono::{DateTime, Utc};

/// A domain event: an immutable, versioned, append-only fact.
///
/// Offer events double as the audit trail, so an event is never rewritten once
/// appended.
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Stable event name (e.g. `"offers.offer.stage_changed"`).
    fn event_type(&self) -> &'static str;

    /// Schema version for this event type.
    fn version(&self) -> u32;

    /// When the change happened (business time).
    fn occurred_at(&self) -> DateTime<Utc>;
}
