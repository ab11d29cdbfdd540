//! Full pipeline: OfferService → EventStore → EventBus → ProjectionWorker → OfferBoard.
//!
//! Verifies:
//! - commands update the board through the bus
//! - organizations stay isolated
//! - the board can be rebuilt from the store and ends up identical

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chrono::{NaiveDate, TimeZone, Utc};
use serde_json::Value as JsonValue;

use propcrm_core::{
    Currency, ExpectedVersion, Money, OpportunityId, OrganizationId, Percentage, PropertyId,
    ProspectId, UserId,
};
use propcrm_events::{EventEnvelope, InMemoryEventBus};
use propcrm_offers::{AuditAction, OfferId, OfferStage};

use crate::command_dispatcher::CommandDispatcher;
use crate::config::Config;
use crate::event_store::{EventStore, InMemoryEventStore};
use crate::offer_service::{NewOffer, OfferService, RequestContext};
use crate::projections::{OfferBoardProjection, OfferSummary};
use crate::read_model::InMemoryOrganizationStore;
use crate::workers::{ProjectionWorker, WorkerHandle};

type Bus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;
type Board = OfferBoardProjection<Arc<InMemoryOrganizationStore<OfferId, OfferSummary>>>;

struct Harness {
    store: Arc<InMemoryEventStore>,
    service: OfferService<Arc<InMemoryEventStore>, Bus>,
    board: Arc<Board>,
    worker: WorkerHandle,
}

fn setup() -> Harness {
    let store = Arc::new(InMemoryEventStore::new());
    let bus: Bus = Arc::new(InMemoryEventBus::new());
    let board: Arc<Board> = Arc::new(OfferBoardProjection::new(Arc::new(
        InMemoryOrganizationStore::new(),
    )));

    let sink = board.clone();
    let worker = ProjectionWorker::spawn(
        "offer-board",
        &bus,
        None,
        move |env: EventEnvelope<JsonValue>| sink.apply_envelope(&env),
    )
    .unwrap();

    let service = OfferService::new(CommandDispatcher::new(store.clone(), bus), Config::default());

    Harness {
        store,
        service,
        board,
        worker,
    }
}

/// Poll until `check` holds; the worker applies events on its own thread.
fn eventually(check: impl Fn() -> bool) {
    for _ in 0..200 {
        if check() {
            return;
        }
        thread::sleep(Duration::from_millis(10));
    }
    panic!("condition not reached in time");
}

fn ctx(org: u64) -> RequestContext {
    RequestContext::at(
        OrganizationId::new(org),
        "maria",
        Utc.with_ymd_and_hms(2026, 10, 19, 9, 0, 0).unwrap(),
    )
}

fn new_offer(agent: u64, swap: bool) -> NewOffer {
    NewOffer {
        opportunity_id: OpportunityId::new(11),
        property_id: PropertyId::new(22),
        prospect_id: ProspectId::new(33),
        agent_id: UserId::new(agent),
        supervisor_id: None,
        amount: Money::new(1_000_000, Currency::CLP),
        commission: Some(Percentage::from_percent(3).unwrap()),
        expiration_date: NaiveDate::from_ymd_opt(2026, 11, 30).unwrap(),
        swap,
        observation: None,
    }
}

#[test]
fn board_follows_the_offer_lifecycle() {
    let h = setup();
    let org = OrganizationId::new(1);

    let id = h.service.create_offer(&ctx(1), new_offer(5, false)).unwrap().id_typed();
    for target in [
        OfferStage::Submitted,
        OfferStage::Accepted,
        OfferStage::PendingOwnerApproval,
        OfferStage::Finalized,
    ] {
        h.service
            .apply_transition(&ctx(1), id, target, ExpectedVersion::Any)
            .unwrap();
    }

    eventually(|| h.board.get(org, &id).is_some_and(|r| r.stage == OfferStage::Finalized));

    let row = h.board.get(org, &id).unwrap();
    assert_eq!(row.commission_amount, Money::new(30_000, Currency::CLP));
    assert_eq!(h.board.stage_counts(org)[&OfferStage::Finalized], 1);

    let trail = h.service.audit_log(org, id).unwrap();
    assert_eq!(trail.len(), 5);
    assert_eq!(trail[0].action, AuditAction::Created);
    assert!(trail[1..].iter().all(|a| a.action == AuditAction::StateChange));

    h.worker.shutdown();
}

#[test]
fn illegal_transition_leaves_store_and_board_alone() {
    let h = setup();
    let org = OrganizationId::new(1);

    let id = h.service.create_offer(&ctx(1), new_offer(5, false)).unwrap().id_typed();
    h.service
        .apply_transition(&ctx(1), id, OfferStage::Submitted, ExpectedVersion::Exact(1))
        .unwrap();
    eventually(|| h.board.get(org, &id).is_some_and(|r| r.stage == OfferStage::Submitted));

    assert!(h
        .service
        .apply_transition(&ctx(1), id, OfferStage::Finalized, ExpectedVersion::Exact(2))
        .is_err());

    assert_eq!(h.store.load_stream(org, id.0).unwrap().len(), 2);
    assert_eq!(h.board.get(org, &id).unwrap().stage, OfferStage::Submitted);
    assert_eq!(h.service.audit_log(org, id).unwrap().len(), 2);

    h.worker.shutdown();
}

#[test]
fn organizations_are_isolated() {
    let h = setup();

    let a = h.service.create_offer(&ctx(1), new_offer(5, false)).unwrap().id_typed();
    let b = h.service.create_offer(&ctx(2), new_offer(5, true)).unwrap().id_typed();

    eventually(|| h.board.list(OrganizationId::new(2)).len() == 1);
    eventually(|| h.board.list(OrganizationId::new(1)).len() == 1);

    assert!(h.board.get(OrganizationId::new(1), &b).is_none());
    assert!(h.board.get(OrganizationId::new(2), &a).is_none());
    assert!(h.service.get(OrganizationId::new(2), a).is_err());

    h.worker.shutdown();
}

#[test]
fn rebuild_from_store_matches_live_board() {
    let h = setup();
    let org = OrganizationId::new(1);

    let first = h.service.create_offer(&ctx(1), new_offer(5, true)).unwrap().id_typed();
    let second = h.service.create_offer(&ctx(1), new_offer(6, false)).unwrap().id_typed();
    h.service
        .apply_transition(&ctx(1), first, OfferStage::Submitted, ExpectedVersion::Any)
        .unwrap();
    h.service.delete(&ctx(1), second).unwrap();

    eventually(|| h.board.get(org, &second).is_some_and(|r| !r.active));
    let live = h.board.list(org);

    let rebuilt: Board = OfferBoardProjection::new(Arc::new(InMemoryOrganizationStore::new()));
    let envelopes = h
        .store
        .load_organization(org)
        .unwrap()
        .iter()
        .map(|stored| stored.to_envelope())
        .collect::<Vec<_>>();
    rebuilt.rebuild_from_scratch(envelopes).unwrap();

    assert_eq!(rebuilt.list(org), live);
    assert_eq!(rebuilt.by_agent(org, UserId::new(5)).len(), 1);
    assert!(rebuilt.by_agent(org, UserId::new(6)).is_empty());

    h.worker.shutdown();
}
