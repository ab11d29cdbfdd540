//! Command execution pipeline for event-sourced aggregates.
//!
//! ```text
//! Command
//!   ↓
//! 1. Load events from store (organization-scoped)
//!   ↓
//! 2. Validate the loaded stream, check the caller's expected version
//!   ↓
//! 3. Rehydrate aggregate (apply historical events)
//!   ↓
//! 4. Handle command (pure decision logic, produces events)
//!   ↓
//! 5. Append to store (optimistic concurrency on the loaded version)
//!   ↓
//! 6. Publish committed events to the bus
//! ```
//!
//! No IO of its own; it composes `EventStore` and `EventBus`.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use propcrm_core::{Aggregate, AggregateId, DomainError, ExpectedVersion, OrganizationId};
use propcrm_events::{Command, EventBus, EventEnvelope, OrganizationScoped};
use propcrm_offers::{OfferError, OfferStage};

use crate::event_store::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};

#[derive(Debug, Error)]
pub enum DispatchError {
    /// Stale expected version or duplicate creation.
    #[error("concurrency conflict: {0}")]
    Concurrency(String),

    /// Cross-organization or cross-aggregate stream mixing.
    #[error("organization isolation violation: {0}")]
    OrganizationIsolation(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    #[error("not found")]
    NotFound,

    /// Target stage not permitted from the current stage. Nothing was written.
    #[error("illegal transition from {from} to {to}")]
    IllegalTransition { from: OfferStage, to: OfferStage },

    #[error("invalid offer stage: {0:?}")]
    InvalidStage(String),

    /// Historical payload could not be decoded into the aggregate's event type.
    #[error("failed to deserialize stored event: {0}")]
    Deserialize(String),

    #[error(transparent)]
    Store(EventStoreError),

    /// Publication failed after a successful append (at-least-once; a retry may duplicate).
    #[error("event publication failed: {0}")]
    Publish(String),
}

impl From<EventStoreError> for DispatchError {
    fn from(value: EventStoreError) -> Self {
        match value {
            EventStoreError::Concurrency(msg) => DispatchError::Concurrency(msg),
            EventStoreError::OrganizationIsolation(msg) => {
                DispatchError::OrganizationIsolation(msg)
            }
            other => DispatchError::Store(other),
        }
    }
}

impl From<DomainError> for DispatchError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) => DispatchError::Validation(msg),
            DomainError::InvariantViolation(msg) => DispatchError::InvariantViolation(msg),
            DomainError::Conflict(msg) => DispatchError::Concurrency(msg),
            DomainError::NotFound => DispatchError::NotFound,
            DomainError::InvalidId(msg) => DispatchError::Validation(msg),
        }
    }
}

impl From<OfferError> for DispatchError {
    fn from(value: OfferError) -> Self {
        match value {
            OfferError::InvalidStage(stage) => DispatchError::InvalidStage(stage),
            OfferError::IllegalTransition { from, to } => {
                DispatchError::IllegalTransition { from, to }
            }
            OfferError::Domain(err) => err.into(),
        }
    }
}

/// Outcome of a successful dispatch.
#[derive(Debug, Clone)]
pub struct Dispatched<A: Aggregate> {
    /// Aggregate state after the new events were applied.
    pub aggregate: A,
    /// Events decided by the aggregate, in order.
    pub events: Vec<A::Event>,
    /// The same events as stored (with sequence numbers).
    pub committed: Vec<StoredEvent>,
}

/// Reusable command execution engine.
///
/// Publishing happens only after the append succeeded; if it then fails the
/// events are already durable and the error is still returned.
#[derive(Debug)]
pub struct CommandDispatcher<S, B> {
    store: S,
    bus: B,
}

impl<S, B> CommandDispatcher<S, B> {
    pub fn new(store: S, bus: B) -> Self {
        Self { store, bus }
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

impl<S, B> CommandDispatcher<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Rehydrate an aggregate without running a command.
    ///
    /// Returns a fresh `make_aggregate` instance (version 0) when the stream is empty.
    pub fn load<A>(
        &self,
        organization_id: OrganizationId,
        aggregate_id: AggregateId,
        make_aggregate: impl FnOnce(OrganizationId, AggregateId) -> A,
    ) -> Result<A, DispatchError>
    where
        A: Aggregate,
        A::Event: DeserializeOwned,
    {
        let history = self.store.load_stream(organization_id, aggregate_id)?;
        validate_loaded_stream(organization_id, aggregate_id, &history)?;

        let mut aggregate = make_aggregate(organization_id, aggregate_id);
        apply_history(&mut aggregate, &history)?;
        Ok(aggregate)
    }

    /// Dispatch a command against whatever the current version is.
    pub fn dispatch<A>(
        &self,
        organization_id: OrganizationId,
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        command: A::Command,
        make_aggregate: impl FnOnce(OrganizationId, AggregateId) -> A,
    ) -> Result<Dispatched<A>, DispatchError>
    where
        A: Aggregate,
        A::Command: Command + OrganizationScoped,
        A::Event: propcrm_events::Event + Serialize + DeserializeOwned,
        A::Error: Into<DispatchError>,
    {
        self.dispatch_expecting(
            organization_id,
            aggregate_id,
            aggregate_type,
            command,
            ExpectedVersion::Any,
            make_aggregate,
        )
    }

    /// Dispatch a command, failing with `Concurrency` unless the stream is at
    /// `expected` (the version the caller last saw).
    pub fn dispatch_expecting<A>(
        &self,
        organization_id: OrganizationId,
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        command: A::Command,
        expected: ExpectedVersion,
        make_aggregate: impl FnOnce(OrganizationId, AggregateId) -> A,
    ) -> Result<Dispatched<A>, DispatchError>
    where
        A: Aggregate,
        A::Command: Command + OrganizationScoped,
        A::Event: propcrm_events::Event + Serialize + DeserializeOwned,
        A::Error: Into<DispatchError>,
    {
        if command.organization_id() != organization_id {
            return Err(DispatchError::OrganizationIsolation(format!(
                "command belongs to organization {}, dispatched to {organization_id}",
                command.organization_id()
            )));
        }
        if command.target_aggregate_id() != aggregate_id {
            return Err(DispatchError::Validation(format!(
                "command targets aggregate {}, dispatched to {aggregate_id}",
                command.target_aggregate_id()
            )));
        }

        // 1) Load history (organization-scoped)
        let history = self.store.load_stream(organization_id, aggregate_id)?;
        validate_loaded_stream(organization_id, aggregate_id, &history)?;
        let current = stream_version(&history);
        expected.check(current)?;

        // 2) Rehydrate aggregate
        let mut aggregate = make_aggregate(organization_id, aggregate_id);
        apply_history(&mut aggregate, &history)?;

        // 3) Decide events (no mutation)
        let decided = aggregate
            .handle(&command)
            .map_err(Into::<DispatchError>::into)?;
        if decided.is_empty() {
            debug!(%organization_id, %aggregate_id, "command produced no events");
            return Ok(Dispatched {
                aggregate,
                events: vec![],
                committed: vec![],
            });
        }

        // 4) Persist (append-only, optimistic on the loaded version)
        let aggregate_type = aggregate_type.into();
        let uncommitted = decided
            .iter()
            .map(|ev| {
                UncommittedEvent::from_typed(
                    organization_id,
                    aggregate_id,
                    aggregate_type.clone(),
                    Uuid::now_v7(),
                    ev,
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        let committed = self.store.append(uncommitted, ExpectedVersion::Exact(current))?;
        for ev in &decided {
            aggregate.apply(ev);
        }
        debug!(
            %organization_id,
            %aggregate_id,
            aggregate_type = %aggregate_type,
            count = committed.len(),
            "events appended"
        );

        // 5) Publish committed events (after append)
        for stored in &committed {
            self.bus
                .publish(stored.to_envelope())
                .map_err(|e| DispatchError::Publish(format!("{e:?}")))?;
        }

        Ok(Dispatched {
            aggregate,
            events: decided,
            committed,
        })
    }
}

fn stream_version(stream: &[StoredEvent]) -> u64 {
    stream.last().map(|e| e.sequence_number).unwrap_or(0)
}

fn validate_loaded_stream(
    organization_id: OrganizationId,
    aggregate_id: AggregateId,
    stream: &[StoredEvent],
) -> Result<(), DispatchError> {
    let mut last = 0u64;
    for (idx, e) in stream.iter().enumerate() {
        if e.organization_id != organization_id {
            return Err(DispatchError::OrganizationIsolation(format!(
                "loaded stream contains wrong organization_id at index {idx}"
            )));
        }
        if e.aggregate_id != aggregate_id {
            return Err(DispatchError::OrganizationIsolation(format!(
                "loaded stream contains wrong aggregate_id at index {idx}"
            )));
        }
        if e.sequence_number != last + 1 {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(format!(
                "gap or reordering in loaded stream (last={last}, found={})",
                e.sequence_number
            ))));
        }
        last = e.sequence_number;
    }
    Ok(())
}

fn apply_history<A>(aggregate: &mut A, history: &[StoredEvent]) -> Result<(), DispatchError>
where
    A: Aggregate,
    A::Event: DeserializeOwned,
{
    for stored in history {
        let ev: A::Event = serde_json::from_value(stored.payload.clone())
            .map_err(|e| DispatchError::Deserialize(e.to_string()))?;
        aggregate.apply(&ev);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::{NaiveDate, TimeZone, Utc};
    use propcrm_core::{
        AggregateRoot, Currency, Money, OpportunityId, Percentage, PropertyId, ProspectId, UserId,
    };
    use propcrm_events::InMemoryEventBus;
    use propcrm_offers::{
        AGGREGATE_TYPE, ApplyTransition, CreateOffer, Offer, OfferCommand, OfferEvent, OfferId,
    };

    use crate::event_store::InMemoryEventStore;

    type Bus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;
    type Dispatcher = CommandDispatcher<Arc<InMemoryEventStore>, Bus>;

    const ORG: OrganizationId = OrganizationId::new(3);

    fn offer_id() -> OfferId {
        OfferId::new(AggregateId::new(42))
    }

    fn setup() -> (Dispatcher, Arc<InMemoryEventStore>, Bus) {
        let store = Arc::new(InMemoryEventStore::new());
        let bus = Arc::new(InMemoryEventBus::new());
        (CommandDispatcher::new(store.clone(), bus.clone()), store, bus)
    }

    fn create() -> OfferCommand {
        OfferCommand::CreateOffer(CreateOffer {
            organization_id: ORG,
            offer_id: offer_id(),
            opportunity_id: OpportunityId::new(1),
            property_id: PropertyId::new(2),
            prospect_id: ProspectId::new(3),
            agent_id: UserId::new(4),
            supervisor_id: None,
            amount: Money::new(1_000_000, Currency::CLP),
            commission: Percentage::from_percent(3).unwrap(),
            expiration_date: NaiveDate::from_ymd_opt(2026, 12, 31).unwrap(),
            swap: false,
            observation: None,
            changed_by: "agent".to_string(),
            occurred_at: Utc.with_ymd_and_hms(2026, 10, 1, 9, 0, 0).unwrap(),
        })
    }

    fn transition(target: OfferStage) -> OfferCommand {
        OfferCommand::ApplyTransition(ApplyTransition {
            organization_id: ORG,
            offer_id: offer_id(),
            target,
            changed_by: "agent".to_string(),
            occurred_at: Utc.with_ymd_and_hms(2026, 10, 2, 9, 0, 0).unwrap(),
        })
    }

    fn make(_: OrganizationId, id: AggregateId) -> Offer {
        Offer::empty(OfferId::new(id))
    }

    #[test]
    fn dispatch_appends_then_publishes() {
        let (dispatcher, store, bus) = setup();
        let sub = bus.subscribe();

        let out = dispatcher
            .dispatch(ORG, offer_id().0, AGGREGATE_TYPE, create(), make)
            .unwrap();
        assert_eq!(out.committed.len(), 1);
        assert_eq!(out.aggregate.version(), 1);

        let env = sub.try_recv().unwrap();
        assert_eq!(env.organization_id(), ORG);
        assert_eq!(env.sequence_number(), 1);
        assert_eq!(env.event_type(), "offers.offer.created");
        assert_eq!(store.load_stream(ORG, offer_id().0).unwrap().len(), 1);
    }

    #[test]
    fn illegal_transition_writes_nothing() {
        let (dispatcher, store, bus) = setup();
        dispatcher
            .dispatch(ORG, offer_id().0, AGGREGATE_TYPE, create(), make)
            .unwrap();
        let sub = bus.subscribe();

        let err = dispatcher
            .dispatch(ORG, offer_id().0, AGGREGATE_TYPE, transition(OfferStage::Finalized), make)
            .unwrap_err();
        assert!(matches!(
            err,
            DispatchError::IllegalTransition {
                from: OfferStage::Draft,
                to: OfferStage::Finalized
            }
        ));
        assert_eq!(store.load_stream(ORG, offer_id().0).unwrap().len(), 1);
        assert!(sub.try_recv().is_err());
    }

    #[test]
    fn stale_expected_version_is_a_conflict() {
        let (dispatcher, _store, _bus) = setup();
        dispatcher
            .dispatch(ORG, offer_id().0, AGGREGATE_TYPE, create(), make)
            .unwrap();
        dispatcher
            .dispatch_expecting(
                ORG,
                offer_id().0,
                AGGREGATE_TYPE,
                transition(OfferStage::Submitted),
                ExpectedVersion::Exact(1),
                make,
            )
            .unwrap();

        let err = dispatcher
            .dispatch_expecting(
                ORG,
                offer_id().0,
                AGGREGATE_TYPE,
                transition(OfferStage::Accepted),
                ExpectedVersion::Exact(1),
                make,
            )
            .unwrap_err();
        assert!(matches!(err, DispatchError::Concurrency(_)));
    }

    #[test]
    fn load_rehydrates_without_writing() {
        let (dispatcher, store, _bus) = setup();
        dispatcher
            .dispatch(ORG, offer_id().0, AGGREGATE_TYPE, create(), make)
            .unwrap();
        dispatcher
            .dispatch(ORG, offer_id().0, AGGREGATE_TYPE, transition(OfferStage::Submitted), make)
            .unwrap();

        let offer: Offer = dispatcher.load(ORG, offer_id().0, make).unwrap();
        assert_eq!(offer.stage(), OfferStage::Submitted);
        assert_eq!(offer.version(), 2);

        let missing: Offer = dispatcher.load(ORG, AggregateId::new(999), make).unwrap();
        assert!(!missing.is_created());
        assert_eq!(store.load_organization(ORG).unwrap().len(), 2);
    }

    #[test]
    fn other_organizations_see_an_empty_stream() {
        let (dispatcher, _store, _bus) = setup();
        dispatcher
            .dispatch(ORG, offer_id().0, AGGREGATE_TYPE, create(), make)
            .unwrap();

        let other = OrganizationId::new(4);
        let command = OfferCommand::ApplyTransition(ApplyTransition {
            organization_id: other,
            offer_id: offer_id(),
            target: OfferStage::Submitted,
            changed_by: "agent".to_string(),
            occurred_at: Utc.with_ymd_and_hms(2026, 10, 2, 9, 0, 0).unwrap(),
        });
        let err = dispatcher
            .dispatch(other, offer_id().0, AGGREGATE_TYPE, command, make)
            .unwrap_err();
        assert!(matches!(err, DispatchError::NotFound));
    }

    #[test]
    fn command_must_belong_to_the_dispatched_organization() {
        let (dispatcher, store, bus) = setup();
        let sub = bus.subscribe();
        let foreign = OrganizationId::new(99);

        let err = dispatcher
            .dispatch(foreign, offer_id().0, AGGREGATE_TYPE, create(), make)
            .unwrap_err();
        assert!(matches!(err, DispatchError::OrganizationIsolation(_)));
        assert!(store.load_organization(foreign).unwrap().is_empty());
        assert!(store.load_organization(ORG).unwrap().is_empty());
        assert!(sub.try_recv().is_err());
    }

    #[test]
    fn command_must_target_the_dispatched_aggregate() {
        let (dispatcher, _store, _bus) = setup();
        let err = dispatcher
            .dispatch(ORG, AggregateId::new(7), AGGREGATE_TYPE, create(), make)
            .unwrap_err();
        assert!(matches!(err, DispatchError::Validation(_)));
    }

    #[test]
    fn stored_payloads_decode_back_to_offer_events() {
        let (dispatcher, store, _bus) = setup();
        dispatcher
            .dispatch(ORG, offer_id().0, AGGREGATE_TYPE, create(), make)
            .unwrap();

        let stored = store.load_stream(ORG, offer_id().0).unwrap();
        assert_eq!(stored[0].event_type, "offers.offer.created");
        let ev: OfferEvent = serde_json::from_value(stored[0].payload.clone()).unwrap();
        assert!(matches!(ev, OfferEvent::OfferCreated(_)));
    }
}
